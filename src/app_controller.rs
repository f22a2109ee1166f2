use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app_config::{Config, TranslationProvider};
use crate::database::{DatabaseConnection, JobStatus, Repository};
use crate::errors::TranslationError;
use crate::file_utils::{FileManager, ParsedDocument};
use crate::language_utils;
use crate::providers::Backend;
use crate::providers::gemini::Gemini;
use crate::providers::openrouter::OpenRouter;
use crate::session::{ActiveJob, CheckpointStore, JobCreateParams, JobManager};
use crate::translation::assembler::{BufferedAssembler, DocumentAssembler, PlainTextAssembler};
use crate::translation::context::AnalysisContext;
use crate::translation::diagnostics::DiagnosticsWriter;
use crate::translation::document::Segment;
use crate::translation::events::{LogEventSink, UsageStatsSink};
use crate::translation::gateway::ModelGateway;
use crate::translation::orchestrator::{CancellationFlag, JobReport, ProgressCallback, TranslationOrchestrator};
use crate::translation::prompts::{PromptCatalog, PromptSanitizer};
use crate::translation::segmenter::SegmentSplitter;
use crate::translation::state::Glossary;

// @module: Application controller for document translation

/// One document translation
#[derive(Clone, Default)]
pub struct TranslateRequest {
    /// Document to translate
    pub document_path: PathBuf,
    /// Where the output goes; next to the document when absent
    pub output_dir: Option<PathBuf>,
    /// Overrides `pipeline.target_segment_size`
    pub target_segment_size: Option<usize>,
    /// Job to continue; must exist. Without it a matching unfinished job is resumed automatically
    pub resume_job_id: Option<String>,
    /// Always start a new job, ignoring unfinished ones
    pub fresh: bool,
    /// Core narrative style used verbatim instead of asking the model
    pub style_override: Option<String>,
    /// Terms known before the first segment
    pub glossary_seed: Option<Glossary>,
    /// Called with the completion percentage after each committed segment
    pub progress: Option<ProgressCallback>,
}

impl TranslateRequest {
    /// Request for a document with every option at its default
    pub fn new(document_path: impl Into<PathBuf>) -> Self {
        Self {
            document_path: document_path.into(),
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for TranslateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslateRequest")
            .field("document_path", &self.document_path)
            .field("output_dir", &self.output_dir)
            .field("target_segment_size", &self.target_segment_size)
            .field("resume_job_id", &self.resume_job_id)
            .field("fresh", &self.fresh)
            .field("style_override", &self.style_override.is_some())
            .field("glossary_seed", &self.glossary_seed.as_ref().map(Glossary::len))
            .finish()
    }
}

/// Main application controller for document translation
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Primary model backend
    backend: Backend,
    // @field: Same backend with the backup credential
    backup_backend: Option<Backend>,
    // @field: Immutable prompt templates
    catalog: Arc<PromptCatalog>,
    // @field: Job database access
    jobs: JobManager,
    // @field: Shared cancellation flag, set from the signal handler
    cancellation: CancellationFlag,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let backend = Self::build_backend(&config, &config.translation.get_api_key())?;
        let backup_backend = config
            .translation
            .get_backup_api_key()
            .map(|key| Self::build_backend(&config, &key))
            .transpose()?;

        let repo = match &config.pipeline.database_path {
            Some(path) => Repository::new(DatabaseConnection::new(path)?),
            None => Repository::new_default()?,
        };

        let mut controller = Self::with_parts(config, backend, JobManager::new(repo))?;
        controller.backup_backend = backup_backend;
        Ok(controller)
    }

    /// Create a controller over an explicit backend and job manager
    pub fn with_parts(config: Config, backend: Backend, jobs: JobManager) -> Result<Self> {
        let catalog = match &config.pipeline.prompt_catalog_path {
            Some(path) => PromptCatalog::from_json_file(path)?,
            None => PromptCatalog::default(),
        };
        catalog.validate()?;

        Ok(Self {
            config,
            backend,
            backup_backend: None,
            catalog: Arc::new(catalog),
            jobs,
            cancellation: CancellationFlag::new(),
        })
    }

    /// Build the backend for the configured provider with a given credential
    pub fn build_backend(config: &Config, credential: &str) -> Result<Backend> {
        let translation = &config.translation;
        let model = translation.get_model();
        let timeout_secs = translation.get_timeout_secs();

        let backend = match translation.provider {
            TranslationProvider::Gemini => Backend::StructuredCapable(Arc::new(Gemini::new(
                credential,
                model,
                translation.get_endpoint(),
                timeout_secs,
            ))),
            TranslationProvider::Vertex => {
                let provider_config = translation
                    .get_active_provider_config()
                    .context("Missing provider configuration for vertex")?;
                let project = provider_config
                    .project
                    .clone()
                    .context("A Google Cloud project is required for the Vertex provider")?;
                let location = provider_config.location.clone().unwrap_or_else(|| "us-central1".to_string());
                Backend::StructuredCapable(Arc::new(Gemini::vertex(project, location, credential, model, timeout_secs)))
            }
            TranslationProvider::OpenRouter => Backend::FreeTextOnly(Arc::new(OpenRouter::new(
                credential,
                model,
                translation.get_endpoint(),
                timeout_secs,
            ))),
        };

        Ok(backend)
    }

    /// Flag that stops running jobs between segments
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    /// Job manager over the controller's database
    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    /// Translate one document, resuming an unfinished job for it when one exists
    ///
    /// Returns the path of the written translation.
    pub async fn translate(&self, request: TranslateRequest) -> Result<PathBuf, TranslationError> {
        let document_path = &request.document_path;
        if !document_path.is_file() {
            return Err(TranslationError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Input file does not exist: {:?}", document_path),
            )));
        }

        let format = FileManager::detect_format(document_path);
        if !format.is_supported() {
            return Err(TranslationError::Configuration(format!(
                "Unsupported document format {:?}: {:?}",
                format, document_path
            )));
        }

        let document = FileManager::parse_document(document_path)
            .map_err(|e| TranslationError::Io(std::io::Error::other(e.to_string())))?;

        let segment_size = request
            .target_segment_size
            .unwrap_or(self.config.pipeline.target_segment_size);
        if segment_size == 0 {
            return Err(TranslationError::Configuration(
                "target segment size must be greater than zero".to_string(),
            ));
        }
        let splitter = SegmentSplitter::new(segment_size);
        let joined = (!document.has_chapter_titles()).then(|| document.joined_text());
        let total_segments = Self::document_segments(&splitter, &document, joined.as_deref()).count();
        info!(
            "{}: {} segments of up to {} characters",
            document_path.display(),
            total_segments,
            segment_size
        );

        let job = self.open_job(&request, total_segments).await?;

        let output_dir = request
            .output_dir
            .clone()
            .or_else(|| document_path.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        let output_path = FileManager::generate_output_path(
            document_path,
            &output_dir,
            &self.config.target_language,
            format.output_extension(),
        );

        let mut assembler: Box<dyn DocumentAssembler> = if document.has_chapter_titles() {
            Box::new(BufferedAssembler::new(&output_path))
        } else {
            Box::new(PlainTextAssembler::create(&output_path).await?)
        };

        let usage = UsageStatsSink::new(self.config.translation.provider.display_name());
        let orchestrator = self.build_orchestrator(&job, &request, usage.clone())?;

        info!(
            "litrans: {} - {}",
            self.config.translation.provider.display_name(),
            self.config.translation.get_model()
        );

        let segments = Self::document_segments(&splitter, &document, joined.as_deref());
        let result = orchestrator.run(segments, total_segments, assembler.as_mut()).await;
        self.record_outcome(&job, &result).await;

        let stats = usage.snapshot();
        if stats.total_tokens > 0 {
            info!("{}", stats.summary());
        }

        let report = result?;
        if !report.degraded_segments.is_empty() {
            warn!(
                "Segments translated with the minimal prompt: {:?}",
                report.degraded_segments
            );
        }
        info!("Success: {}", report.output_path.display());

        Ok(report.output_path)
    }

    /// Lazy segments of a parsed document: `joined` text when given, else chapter by chapter
    fn document_segments<'a>(
        splitter: &SegmentSplitter,
        document: &'a ParsedDocument,
        joined: Option<&'a str>,
    ) -> Box<dyn Iterator<Item = Segment> + Send + 'a> {
        match joined {
            Some(text) => Box::new(splitter.split(text)),
            None => Box::new(splitter.split_chapters(&document.chapters)),
        }
    }

    async fn open_job(&self, request: &TranslateRequest, total_segments: usize) -> Result<ActiveJob, TranslationError> {
        let persistence = |e: anyhow::Error| TranslationError::Persistence(e.to_string());

        if let Some(job_id) = &request.resume_job_id {
            let info = self
                .jobs
                .get_job(job_id)
                .await
                .map_err(persistence)?
                .ok_or_else(|| TranslationError::JobNotFound(job_id.clone()))?;
            if info.total_segments != total_segments as i64 {
                return Err(TranslationError::DataIntegrity(format!(
                    "job {} has {} segments, the document now splits into {}",
                    job_id, info.total_segments, total_segments
                )));
            }
            let checkpoint = self
                .jobs
                .checkpoint_store()
                .load(job_id)
                .await?;
            self.jobs
                .repository()
                .update_job_status(job_id, JobStatus::InProgress, None)
                .await
                .map_err(persistence)?;
            return Ok(ActiveJob { info, checkpoint });
        }

        let params = JobCreateParams::new(
            request.document_path.clone(),
            &self.config.source_language,
            &self.config.target_language,
            &self.config.translation.provider.to_lowercase_string(),
            &self.config.translation.get_model(),
            total_segments,
        );

        if request.fresh {
            let info = self.jobs.create_job(&params).await.map_err(persistence)?;
            return Ok(ActiveJob { info, checkpoint: None });
        }

        self.jobs.resume_or_create(&params).await.map_err(persistence)
    }

    fn build_orchestrator(
        &self,
        job: &ActiveJob,
        request: &TranslateRequest,
        usage: UsageStatsSink,
    ) -> Result<TranslationOrchestrator, TranslationError> {
        let target_language = language_utils::prompt_language_name(&self.config.target_language)
            .map_err(|e| TranslationError::Configuration(e.to_string()))?;

        let mut gateway = ModelGateway::new(self.backend.clone(), self.config.gateway_settings(), Arc::new(usage));
        if let Some(backup) = &self.backup_backend {
            gateway = gateway.with_backup(backup.clone());
        }

        let pipeline = &self.config.pipeline;
        let sanitizer = match &pipeline.euphemisms {
            Some(table) => PromptSanitizer::with_euphemisms(self.catalog.clone(), table.clone()),
            None => PromptSanitizer::new(self.catalog.clone()),
        };
        let diagnostics = match &pipeline.diagnostics_dir {
            Some(dir) => DiagnosticsWriter::new(dir),
            None => DiagnosticsWriter::log_only(),
        };

        let context = AnalysisContext::new(gateway, self.catalog.clone(), &target_language);
        let store = Arc::new(self.jobs.checkpoint_store());

        let mut orchestrator = TranslationOrchestrator::new(&job.info.id, context, store)
            .with_settings(pipeline.orchestrator_settings())
            .with_sanitizer(sanitizer)
            .with_events(Arc::new(LogEventSink))
            .with_diagnostics(diagnostics)
            .with_world_context(pipeline.enable_world_context)
            .with_cancellation(self.cancellation.clone());

        if let Some(protagonist) = &pipeline.protagonist_name {
            orchestrator = orchestrator.with_protagonist(protagonist);
        }
        if let Some(checkpoint) = &job.checkpoint {
            orchestrator = orchestrator.resume_from(checkpoint.clone());
        }
        if let Some(style) = &request.style_override {
            orchestrator = orchestrator.with_style_override(style);
        }
        if let Some(seed) = &request.glossary_seed {
            orchestrator = orchestrator.with_glossary_seed(seed.clone());
        }
        if let Some(progress) = &request.progress {
            orchestrator = orchestrator.with_progress(progress.clone());
        }

        Ok(orchestrator)
    }

    /// Store the final job status; bookkeeping failures are only logged
    async fn record_outcome(&self, job: &ActiveJob, result: &Result<JobReport, TranslationError>) {
        let job_id = &job.info.id;
        let recorded = match result {
            Ok(report) => self.jobs.complete_job(job_id, &report.output_path).await,
            Err(TranslationError::Cancelled { .. }) => self.jobs.cancel_job(job_id).await,
            Err(e) => self.jobs.fail_job(job_id, &e.to_string()).await,
        };

        if let Err(e) = recorded {
            warn!("Failed to record status of job {}: {}", job.info.short_id(), e);
        }
    }

    /// Translate one document with a progress bar
    ///
    /// The document is skipped when its translation already exists, unless
    /// `force_overwrite` is set or an unfinished job for it is waiting to resume.
    pub async fn run(&self, request: TranslateRequest, force_overwrite: bool) -> Result<()> {
        let multi_progress = MultiProgress::new();
        self.run_with_progress(request, &multi_progress, force_overwrite).await
    }

    async fn run_with_progress(
        &self,
        mut request: TranslateRequest,
        multi_progress: &MultiProgress,
        force_overwrite: bool,
    ) -> Result<()> {
        let start_time = std::time::Instant::now();
        let input_file = request.document_path.clone();

        let output_dir = request
            .output_dir
            .clone()
            .or_else(|| input_file.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        FileManager::ensure_dir(&output_dir)?;

        let format = FileManager::detect_format(&input_file);
        let output_path = FileManager::generate_output_path(
            &input_file,
            &output_dir,
            &self.config.target_language,
            format.output_extension(),
        );
        if output_path.exists() && !force_overwrite && !self.has_unfinished_job(&input_file).await? {
            warn!(
                "Skipping {}, translation already exists (use -f to force overwrite)",
                input_file.display()
            );
            return Ok(());
        }

        let progress_bar = multi_progress.add(ProgressBar::new(100));
        let template_result = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}% {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(template_result.progress_chars("█▓▒░"));
        progress_bar.set_message("Translating");

        let pb = progress_bar.clone();
        request.output_dir = Some(output_dir);
        request.progress = Some(Arc::new(move |percent| pb.set_position(u64::from(percent))));

        let result = self.translate(request).await;
        progress_bar.finish_and_clear();
        result.with_context(|| format!("Failed to translate {}", input_file.display()))?;

        info!("Translation completed in {}.", Self::format_duration(start_time.elapsed()));
        Ok(())
    }

    /// Whether a resumable job exists for the document at this path
    async fn has_unfinished_job(&self, document_path: &Path) -> Result<bool> {
        let path = document_path.to_string_lossy();
        let jobs = self.jobs.list_jobs(None).await?;
        Ok(jobs
            .iter()
            .any(|job| job.status.is_resumable() && job.source_file_path == path))
    }

    // Format duration in a human-readable format (HH:MM:SS)
    fn format_duration(duration: std::time::Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }

    /// Run the workflow in folder mode, processing every supported document in a directory
    /// Documents that already have a translation are skipped
    pub async fn run_folder(&self, input_dir: PathBuf, force_overwrite: bool) -> Result<()> {
        let start_time = std::time::Instant::now();

        if !input_dir.exists() {
            return Err(anyhow::anyhow!("Input directory does not exist: {:?}", input_dir));
        }

        let documents = FileManager::find_documents(&input_dir, &self.config.target_language)?;
        if documents.is_empty() {
            return Err(anyhow::anyhow!("No supported documents found in directory: {:?}", input_dir));
        }

        let multi_progress = MultiProgress::new();
        let folder_pb = multi_progress.add(ProgressBar::new(documents.len() as u64));
        let template_result = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        folder_pb.set_style(template_result.progress_chars("█▓▒░"));
        folder_pb.set_message("Processing files");

        let mut success_count = 0;
        let mut error_count = 0;

        for document in documents.iter() {
            if self.cancellation.is_cancelled() {
                warn!("Cancelled, {} documents left untouched", documents.len() - success_count - error_count);
                break;
            }

            let file_name = document
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            folder_pb.set_message(format!("Processing: {}", file_name));

            let request = TranslateRequest::new(document);
            match self.run_with_progress(request, &multi_progress, force_overwrite).await {
                Ok(_) => success_count += 1,
                Err(e) => {
                    error!("Error processing file {}: {:#}", file_name, e);
                    error_count += 1;
                }
            }

            folder_pb.inc(1);
        }

        folder_pb.finish_with_message("Folder processing complete");

        info!(
            "Folder processing completed: {} processed, {} errors in {}",
            success_count,
            error_count,
            Self::format_duration(start_time.elapsed())
        );

        Ok(())
    }
}
