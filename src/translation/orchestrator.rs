/*!
 * Per-job translation state machine.
 *
 * Segments are translated strictly in order. Each segment moves through
 * `Pending → GuidesBuilt → Prompted → Translating` and ends in `Succeeded`
 * (checkpoint written, state advanced) or `HardFailed` (job aborts). A
 * content-safety block moves the segment into `SoftRetry(n)`, which
 * regenerates from a progressively softened prompt; after the last soft
 * retry one minimal prompt is tried before giving up.
 *
 * The cumulative glossary and character styles are owned by the single
 * control loop; outside readers see them only through the checkpoint store.
 */

use log::{debug, info, warn};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::{ProviderError, SafetyFailure, TranslationError};
use crate::session::CheckpointStore;
use crate::translation::assembler::DocumentAssembler;
use crate::translation::context::{
    AnalysisContext, CoreStyleDefiner, DEFAULT_CORE_STYLE, DynamicGuideBuilder, opening_sample,
};
use crate::translation::diagnostics::{DiagnosticsWriter, EscalationOutcome, ProhibitedContentRecord};
use crate::translation::document::{Segment, TranslatedDocument, TranslatedSegment};
use crate::translation::events::{EventSink, JobEvent, LogEventSink, notify_quietly};
use crate::translation::prompts::{PromptBuilder, PromptInput, PromptSanitizer, context_tail};
use crate::translation::state::{Glossary, JobCheckpoint, TranslationState};

/// Lifecycle of one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentPhase {
    Pending,
    GuidesBuilt,
    Prompted,
    Translating,
    Succeeded,
    /// Regenerating from a softened prompt (attempt number)
    SoftRetry(u32),
    HardFailed,
}

impl SegmentPhase {
    /// Whether the segment has left the state machine
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::HardFailed)
    }
}

impl fmt::Display for SegmentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::GuidesBuilt => write!(f, "guides_built"),
            Self::Prompted => write!(f, "prompted"),
            Self::Translating => write!(f, "translating"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::SoftRetry(attempt) => write!(f, "soft_retry({})", attempt),
            Self::HardFailed => write!(f, "hard_failed"),
        }
    }
}

/// Result of one generation attempt
#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    Success(String),
    /// The backend refused the prompt on content grounds
    SafetyBlocked { attempt: u32, error: ProviderError },
    /// Anything else; the gateway has already retried
    Fatal(ProviderError),
}

impl GenerationOutcome {
    fn from_result(attempt: u32, result: Result<String, ProviderError>) -> Self {
        match result {
            Ok(text) => Self::Success(text),
            Err(error) if error.is_prohibited() => Self::SafetyBlocked { attempt, error },
            Err(error) => Self::Fatal(error),
        }
    }
}

/// Cooperative cancellation, checked between segments
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the current segment is not committed.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Called with the completion percentage after each committed segment
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Tunables of the orchestration loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Softened retries after the first block; retry `n` uses `soften(prompt, n)`
    pub max_soft_retries: u32,
    /// Length of the previous-segment tails given as context
    pub context_tail_chars: usize,
    /// Length of the opening sample used to define the core style
    pub style_sample_chars: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_soft_retries: 3,
            context_tail_chars: 500,
            style_sample_chars: 3000,
        }
    }
}

/// Summary of a finished job
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: String,
    pub output_path: PathBuf,
    pub core_style: String,
    /// Cumulative state after the last segment
    pub state: TranslationState,
    pub total_segments: usize,
    /// Segments restored from the checkpoint store instead of translated
    pub resumed_segments: usize,
    /// Segments produced by the minimal prompt
    pub degraded_segments: Vec<usize>,
}

struct Generated {
    text: String,
    degraded: bool,
}

/// Sequential segment translator for one job
#[derive(Clone)]
pub struct TranslationOrchestrator {
    job_id: String,
    context: AnalysisContext,
    prompts: PromptBuilder,
    sanitizer: PromptSanitizer,
    store: Arc<dyn CheckpointStore>,
    events: Arc<dyn EventSink>,
    diagnostics: DiagnosticsWriter,
    settings: OrchestratorSettings,
    protagonist: String,
    world_context: bool,
    resume: Option<JobCheckpoint>,
    style_override: Option<String>,
    glossary_seed: Glossary,
    cancellation: CancellationFlag,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for TranslationOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationOrchestrator")
            .field("job_id", &self.job_id)
            .field("settings", &self.settings)
            .field("protagonist", &self.protagonist)
            .field("world_context", &self.world_context)
            .field("resume", &self.resume.as_ref().map(|c| c.last_successful_segment_index))
            .finish_non_exhaustive()
    }
}

impl TranslationOrchestrator {
    /// Create an orchestrator for a job.
    pub fn new(job_id: &str, context: AnalysisContext, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            job_id: job_id.to_string(),
            prompts: PromptBuilder::new(context.catalog.clone(), &context.target_language),
            sanitizer: PromptSanitizer::new(context.catalog.clone()),
            context,
            store,
            events: Arc::new(LogEventSink),
            diagnostics: DiagnosticsWriter::log_only(),
            settings: OrchestratorSettings::default(),
            protagonist: String::new(),
            world_context: false,
            resume: None,
            style_override: None,
            glossary_seed: Glossary::new(),
            cancellation: CancellationFlag::new(),
            progress: None,
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the sanitizer, e.g. to use a custom euphemism table.
    pub fn with_sanitizer(mut self, sanitizer: PromptSanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsWriter) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Track speech registers of this character.
    pub fn with_protagonist(mut self, protagonist: &str) -> Self {
        self.protagonist = protagonist.trim().to_string();
        self
    }

    /// Attach world context summaries to translated segments.
    pub fn with_world_context(mut self, enabled: bool) -> Self {
        self.world_context = enabled;
        self
    }

    /// Continue after a checkpoint: earlier segments are restored, not translated.
    pub fn resume_from(mut self, checkpoint: JobCheckpoint) -> Self {
        self.resume = Some(checkpoint);
        self
    }

    /// Use this core style instead of deriving one.
    pub fn with_style_override(mut self, core_style: &str) -> Self {
        self.style_override = Some(core_style.to_string()).filter(|s| !s.trim().is_empty());
        self
    }

    /// Known terms to start the glossary with.
    pub fn with_glossary_seed(mut self, glossary: Glossary) -> Self {
        self.glossary_seed = glossary;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Whether character speech registers are tracked; needs a protagonist name.
    pub fn tracks_character_styles(&self) -> bool {
        !self.protagonist.is_empty()
    }

    /// Translate `segments` into `assembler`.
    ///
    /// `segments` is consumed lazily in order and must yield exactly `total`
    /// segments indexed from 0. Lifecycle events are emitted for start, each
    /// commit and the outcome. On failure the last committed segment is
    /// reported and the job can be resumed from the checkpoint store.
    pub async fn run<I>(
        &self,
        segments: I,
        total: usize,
        assembler: &mut dyn DocumentAssembler,
    ) -> Result<JobReport, TranslationError>
    where
        I: IntoIterator<Item = Segment>,
    {
        let first = self.resume.as_ref().map(JobCheckpoint::next_segment_index).unwrap_or(0);
        let mut last_completed = self.resume.as_ref().map(|c| c.last_successful_segment_index);

        notify_quietly(
            self.events.as_ref(),
            &JobEvent::Started {
                job_id: self.job_id.clone(),
                first_segment: first,
            },
        );

        let result = self
            .run_segments(segments.into_iter(), total, assembler, first, &mut last_completed)
            .await;

        let event = match &result {
            Ok(report) => JobEvent::Completed {
                job_id: self.job_id.clone(),
                output_path: report.output_path.display().to_string(),
            },
            Err(TranslationError::Cancelled { last_completed }) => JobEvent::Cancelled {
                job_id: self.job_id.clone(),
                last_completed: *last_completed,
            },
            Err(e) => JobEvent::Failed {
                job_id: self.job_id.clone(),
                last_completed,
                error: e.to_string(),
            },
        };
        notify_quietly(self.events.as_ref(), &event);

        result
    }

    async fn run_segments(
        &self,
        mut segments: impl Iterator<Item = Segment>,
        total: usize,
        assembler: &mut dyn DocumentAssembler,
        first: usize,
        last_completed: &mut Option<usize>,
    ) -> Result<JobReport, TranslationError> {
        if first > total {
            return Err(TranslationError::DataIntegrity(format!(
                "checkpoint is past the end of the document ({} segments, resuming at {})",
                total, first
            )));
        }

        let restored = self.restore_output(assembler, first).await?;
        let mut state = match &self.resume {
            Some(checkpoint) => checkpoint.state(),
            None => TranslationState::default(),
        };
        state.glossary.merge_additive(&self.glossary_seed);

        let opening = take_opening(&mut segments, self.settings.style_sample_chars);
        let core_style = if first < total {
            self.resolve_core_style(&opening).await?
        } else {
            DEFAULT_CORE_STYLE.to_string()
        };

        if first > 0 {
            info!("Job {}: resuming at segment {}/{}", self.job_id, first + 1, total);
        } else {
            info!("Job {}: translating {} segments", self.job_id, total);
        }
        if !self.tracks_character_styles() {
            info!("Job {}: no protagonist name set, character speech styles are not tracked", self.job_id);
        }

        let guides = self.guide_builder();
        let mut translated = TranslatedDocument::starting_at(first);
        let mut previous: Option<(String, String)> = None;

        for (position, segment) in opening.into_iter().chain(segments).enumerate() {
            if segment.index != position || position >= total {
                return Err(TranslationError::DataIntegrity(format!(
                    "segment at position {} has index {} ({} segments expected)",
                    position, segment.index, total
                )));
            }
            if position < first {
                if position + 1 == first {
                    previous = restored.last().map(|last| (segment.text, last.text.clone()));
                }
                continue;
            }

            if self.cancellation.is_cancelled() {
                info!("Job {} cancelled before segment {}", self.job_id, segment.index);
                return Err(TranslationError::Cancelled {
                    last_completed: *last_completed,
                });
            }

            let (translated_segment, next_state) = self
                .translate_segment(&guides, &segment, &core_style, state, previous.as_ref())
                .await?;

            // A cancellation requested while the model was busy discards the segment.
            if self.cancellation.is_cancelled() {
                info!("Job {} cancelled during segment {}", self.job_id, segment.index);
                return Err(TranslationError::Cancelled {
                    last_completed: *last_completed,
                });
            }

            let checkpoint = JobCheckpoint::new(segment.index, &next_state);
            self.store.save(&self.job_id, &checkpoint, &translated_segment).await?;
            assembler.append(&translated_segment).await?;
            *last_completed = Some(segment.index);
            state = next_state;

            self.report_commit(&translated_segment, total);
            previous = Some((segment.text, translated_segment.text.clone()));
            translated.push(translated_segment)?;
        }

        translated.verify_complete(total)?;
        let output_path = assembler.finalize().await?;

        let degraded_segments = restored
            .iter()
            .chain(translated.segments())
            .filter(|s| s.degraded)
            .map(|s| s.index)
            .collect();

        Ok(JobReport {
            job_id: self.job_id.clone(),
            output_path,
            core_style,
            state,
            total_segments: total,
            resumed_segments: restored.len(),
            degraded_segments,
        })
    }

    /// Re-append committed segments of a resumed job.
    async fn restore_output(
        &self,
        assembler: &mut dyn DocumentAssembler,
        first: usize,
    ) -> Result<Vec<TranslatedSegment>, TranslationError> {
        if first == 0 {
            return Ok(Vec::new());
        }

        let restored: Vec<TranslatedSegment> = self
            .store
            .load_segments(&self.job_id)
            .await?
            .into_iter()
            .take_while(|segment| segment.index < first)
            .collect();
        if restored.len() != first || restored.iter().enumerate().any(|(i, s)| s.index != i) {
            return Err(TranslationError::DataIntegrity(format!(
                "checkpoint at segment {} but {} committed translations are stored",
                first - 1,
                restored.len()
            )));
        }

        for segment in &restored {
            assembler.append(segment).await?;
        }
        debug!("Restored {} committed segments", restored.len());
        Ok(restored)
    }

    /// Core style: the override, the one stored for the job, or a fresh definition.
    async fn resolve_core_style(&self, segments: &[Segment]) -> Result<String, TranslationError> {
        if let Some(style) = &self.style_override {
            self.store.save_core_style(&self.job_id, style).await?;
            return Ok(style.clone());
        }
        if let Some(style) = self.store.load_core_style(&self.job_id).await? {
            debug!("Reusing the stored core style");
            return Ok(style);
        }

        let sample = opening_sample(segments, self.settings.style_sample_chars);
        let style = CoreStyleDefiner::new(self.context.clone()).define(&sample).await?;
        self.store.save_core_style(&self.job_id, &style).await?;
        Ok(style)
    }

    fn guide_builder(&self) -> DynamicGuideBuilder {
        let builder = DynamicGuideBuilder::new(self.context.clone(), &self.protagonist);
        if self.world_context {
            builder.with_world_context(self.context.clone())
        } else {
            builder
        }
    }

    fn trace(&self, index: usize, phase: SegmentPhase) {
        if phase.is_terminal() {
            info!("Segment {}: {}", index, phase);
        } else {
            debug!("Segment {}: {}", index, phase);
        }
    }

    async fn translate_segment(
        &self,
        guides: &DynamicGuideBuilder,
        segment: &Segment,
        core_style: &str,
        state: TranslationState,
        previous: Option<&(String, String)>,
    ) -> Result<(TranslatedSegment, TranslationState), TranslationError> {
        self.trace(segment.index, SegmentPhase::Pending);

        let previous_source = previous.map(|(source, _)| source.as_str());
        let built = guides.build(&segment.text, core_style, state, previous_source).await;
        self.trace(segment.index, SegmentPhase::GuidesBuilt);

        let tail = self.settings.context_tail_chars;
        let prompt = self.prompts.build(&PromptInput {
            core_style,
            deviation_note: built.deviation_note.as_deref(),
            glossary: &built.state.glossary,
            character_styles: &built.state.character_styles,
            source_segment: &segment.text,
            previous_source_tail: previous_source.map(|source| context_tail(source, tail)),
            previous_translation_tail: previous.map(|(_, translation)| context_tail(translation, tail)),
            protagonist_name: &self.protagonist,
        })?;
        self.trace(segment.index, SegmentPhase::Prompted);

        let generated = match self.generate_with_ladder(segment, &prompt, &built.state).await {
            Ok(generated) => generated,
            Err(e) => {
                self.trace(segment.index, SegmentPhase::HardFailed);
                return Err(e);
            }
        };
        self.trace(segment.index, SegmentPhase::Succeeded);

        let mut translated = TranslatedSegment::new(segment.index, generated.text);
        translated.degraded = generated.degraded;
        translated.chapter = segment.chapter.clone();
        translated.annotations.world_context = built.world_context;

        Ok((translated, built.state))
    }

    async fn generate(&self, prompt: &str, attempt: u32) -> GenerationOutcome {
        GenerationOutcome::from_result(attempt, self.context.gateway.generate_text(prompt).await)
    }

    /// Generation with the content-safety ladder.
    async fn generate_with_ladder(
        &self,
        segment: &Segment,
        prompt: &str,
        state: &TranslationState,
    ) -> Result<Generated, TranslationError> {
        let soft_retries = self.settings.max_soft_retries;
        // Initial try, every softened retry, then the minimal prompt
        let total_attempts = soft_retries + 2;
        let mut block_reasons = Vec::new();

        for attempt in 0..=soft_retries {
            self.trace(
                segment.index,
                if attempt == 0 { SegmentPhase::Translating } else { SegmentPhase::SoftRetry(attempt) },
            );

            match self.generate(&self.sanitizer.soften(prompt, attempt), attempt).await {
                GenerationOutcome::Success(text) => return Ok(Generated { text, degraded: false }),
                GenerationOutcome::Fatal(error) => return Err(TranslationError::Provider(error)),
                GenerationOutcome::SafetyBlocked { attempt: blocked, error } => {
                    warn!(
                        "Segment {} blocked on attempt {}/{}: {}",
                        segment.index,
                        blocked + 1,
                        total_attempts,
                        error
                    );
                    block_reasons.push(block_reason(&error));
                }
            }
        }

        warn!("Segment {}: soft retries exhausted, trying the minimal prompt", segment.index);
        let minimal = self
            .sanitizer
            .minimal_prompt(&segment.text, self.prompts.target_language())?;

        match self.generate(&minimal, soft_retries + 1).await {
            GenerationOutcome::Success(text) => {
                self.record_escalation(segment, total_attempts, block_reasons, EscalationOutcome::Recovered, state)
                    .await;
                Ok(Generated { text, degraded: true })
            }
            GenerationOutcome::SafetyBlocked { error, .. } => {
                block_reasons.push(block_reason(&error));
                self.record_escalation(segment, total_attempts, block_reasons, EscalationOutcome::Failed, state)
                    .await;
                Err(TranslationError::ProhibitedContent(Box::new(SafetyFailure {
                    segment_index: segment.index,
                    attempts: total_attempts,
                    prompt: minimal,
                    source_text: segment.text.clone(),
                    glossary: state.glossary.clone(),
                    character_styles: state.character_styles.clone(),
                    cause: error,
                })))
            }
            GenerationOutcome::Fatal(error) => Err(TranslationError::Provider(error)),
        }
    }

    async fn record_escalation(
        &self,
        segment: &Segment,
        attempts: u32,
        block_reasons: Vec<String>,
        outcome: EscalationOutcome,
        state: &TranslationState,
    ) {
        let record = ProhibitedContentRecord::new(
            &self.job_id,
            segment.index,
            attempts,
            block_reasons,
            outcome,
            &segment.text,
            &state.glossary,
            &state.character_styles,
        );
        self.diagnostics.write(&record).await;
    }

    fn report_commit(&self, segment: &TranslatedSegment, total: usize) {
        let percent = percent_complete(segment.index, total);

        if segment.degraded {
            notify_quietly(
                self.events.as_ref(),
                &JobEvent::SegmentDegraded {
                    job_id: self.job_id.clone(),
                    index: segment.index,
                },
            );
        }
        notify_quietly(
            self.events.as_ref(),
            &JobEvent::SegmentCompleted {
                job_id: self.job_id.clone(),
                index: segment.index,
                percent: Some(percent),
            },
        );

        if let Some(progress) = &self.progress {
            progress(percent);
        }
    }
}

/// Pull segments off the front until they cover the style sample.
fn take_opening(segments: &mut impl Iterator<Item = Segment>, sample_chars: usize) -> Vec<Segment> {
    let mut opening = Vec::new();
    let mut covered = 0;
    while covered <= sample_chars {
        let Some(segment) = segments.next() else {
            break;
        };
        covered += segment.text.chars().count() + segment.trailing_separator.chars().count();
        opening.push(segment);
    }
    opening
}

fn block_reason(error: &ProviderError) -> String {
    match error {
        ProviderError::ProhibitedContent { reason } => reason.clone(),
        other => other.to_string(),
    }
}

fn percent_complete(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (((index + 1) * 100) / total).min(100) as u8
}
