/*!
 * Job lifecycle events and token usage accounting.
 *
 * Both sinks are fire-and-forget: implementations must not block, and a
 * failing sink is logged by the caller and otherwise ignored.
 */

use anyhow::{Result, anyhow};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Lifecycle events of a translation job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobEvent {
    /// The job started or resumed
    Started {
        /// Job id
        job_id: String,
        /// First segment that will be translated
        first_segment: usize,
    },
    /// A segment was translated and checkpointed
    SegmentCompleted {
        /// Job id
        job_id: String,
        /// Segment index
        index: usize,
        /// Percent complete, when the total is known
        percent: Option<u8>,
    },
    /// A segment fell back to the minimal prompt
    SegmentDegraded {
        /// Job id
        job_id: String,
        /// Segment index
        index: usize,
    },
    /// The job finished and the output was written
    Completed {
        /// Job id
        job_id: String,
        /// Output artifact
        output_path: String,
    },
    /// The job failed
    Failed {
        /// Job id
        job_id: String,
        /// Last committed segment
        last_completed: Option<usize>,
        /// Error summary
        error: String,
    },
    /// The job was cancelled between segments
    Cancelled {
        /// Job id
        job_id: String,
        /// Last committed segment
        last_completed: Option<usize>,
    },
}

impl JobEvent {
    /// Event kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::SegmentCompleted { .. } => "segment_completed",
            Self::SegmentDegraded { .. } => "segment_degraded",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Receiver of job lifecycle events
pub trait EventSink: Send + Sync + Debug {
    /// Deliver an event without blocking
    fn notify(&self, event: &JobEvent) -> Result<()>;
}

/// Deliver an event, logging and discarding sink failures.
pub fn notify_quietly(sink: &dyn EventSink, event: &JobEvent) {
    if let Err(e) = sink.notify(event) {
        warn!("Event sink rejected {} event: {}", event.kind(), e);
    }
}

/// Event sink writing to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn notify(&self, event: &JobEvent) -> Result<()> {
        match event {
            JobEvent::Failed { job_id, error: message, .. } => error!("Job {} failed: {}", job_id, message),
            JobEvent::SegmentCompleted { .. } => debug!("{}", serde_json::to_string(event)?),
            _ => info!("{}", serde_json::to_string(event)?),
        }
        Ok(())
    }
}

/// Event sink forwarding to a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::Sender<JobEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiving end of its channel
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<JobEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn notify(&self, event: &JobEvent) -> Result<()> {
        self.sender
            .try_send(event.clone())
            .map_err(|e| anyhow!("event channel unavailable: {}", e))
    }
}

/// A token usage record for one successful model call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageRecord {
    /// Model that served the call
    pub model: String,
    /// Prompt tokens
    pub prompt_tokens: u64,
    /// Completion tokens
    pub completion_tokens: u64,
    /// Total tokens
    pub total_tokens: u64,
}

/// Receiver of token usage records
pub trait UsageSink: Send + Sync + Debug {
    /// Record usage without blocking
    fn record(&self, usage: &UsageRecord) -> Result<()>;
}

/// Token usage statistics
#[derive(Debug, Clone)]
pub struct TokenUsageStats {
    /// Number of prompt tokens
    pub prompt_tokens: u64,

    /// Number of completion tokens
    pub completion_tokens: u64,

    /// Total number of tokens
    pub total_tokens: u64,

    /// Number of successful calls
    pub calls: u64,

    /// Start time of token tracking
    pub start_time: Instant,

    /// Total time spent on API requests
    pub api_duration: Duration,

    /// Provider name
    pub provider: String,

    /// Model name
    pub model: String,
}

impl Default for TokenUsageStats {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenUsageStats {
    /// Create a new empty token usage stats instance
    pub fn new() -> Self {
        Self::with_provider_info(String::new(), String::new())
    }

    /// Create new token usage stats with provider info
    pub fn with_provider_info(provider: String, model: String) -> Self {
        Self {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            calls: 0,
            start_time: Instant::now(),
            api_duration: Duration::from_secs(0),
            provider,
            model,
        }
    }

    /// Add a usage record
    pub fn add(&mut self, usage: &UsageRecord) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total_tokens;
        self.calls += 1;
        if self.model.is_empty() {
            self.model = usage.model.clone();
        }
    }

    /// Calculate tokens per minute rate
    pub fn tokens_per_minute(&self) -> f64 {
        let duration_minutes = if self.api_duration.as_secs_f64() > 0.0 {
            self.api_duration.as_secs_f64() / 60.0
        } else {
            self.start_time.elapsed().as_secs_f64() / 60.0
        };

        if duration_minutes > 0.0 {
            self.total_tokens as f64 / duration_minutes
        } else {
            0.0
        }
    }

    /// Generate a summary of token usage
    pub fn summary(&self) -> String {
        let elapsed_minutes = self.start_time.elapsed().as_secs_f64() / 60.0;

        format!(
            "Token Usage Summary:\n\
             Provider: {}\n\
             Model: {}\n\
             Calls: {}\n\
             Prompt tokens: {}\n\
             Completion tokens: {}\n\
             Total tokens: {}\n\
             Elapsed time: {:.2} minutes\n\
             Tokens per minute: {:.2}",
            self.provider,
            self.model,
            self.calls,
            self.prompt_tokens,
            self.completion_tokens,
            self.total_tokens,
            elapsed_minutes,
            self.tokens_per_minute()
        )
    }
}

/// Usage sink accumulating into shared `TokenUsageStats`
#[derive(Debug, Clone, Default)]
pub struct UsageStatsSink {
    stats: Arc<Mutex<TokenUsageStats>>,
}

impl UsageStatsSink {
    /// Create a sink for a provider
    pub fn new(provider: &str) -> Self {
        Self {
            stats: Arc::new(Mutex::new(TokenUsageStats::with_provider_info(
                provider.to_string(),
                String::new(),
            ))),
        }
    }

    /// Snapshot of the accumulated statistics
    pub fn snapshot(&self) -> TokenUsageStats {
        self.stats.lock().clone()
    }

    /// Add time spent waiting on the backend
    pub fn add_api_duration(&self, duration: Duration) {
        self.stats.lock().api_duration += duration;
    }
}

impl UsageSink for UsageStatsSink {
    fn record(&self, usage: &UsageRecord) -> Result<()> {
        self.stats.lock().add(usage);
        Ok(())
    }
}

/// Usage sink forwarding to a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelUsageSink {
    sender: mpsc::Sender<UsageRecord>,
}

impl ChannelUsageSink {
    /// Create a sink and the receiving end of its channel
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<UsageRecord>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl UsageSink for ChannelUsageSink {
    fn record(&self, usage: &UsageRecord) -> Result<()> {
        self.sender
            .try_send(usage.clone())
            .map_err(|e| anyhow!("usage channel unavailable: {}", e))
    }
}
