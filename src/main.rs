// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info, warn};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use litrans::app_config::{Config, LogLevel, TranslationProvider};
use litrans::app_controller::{Controller, TranslateRequest};
use litrans::database::JobStatus;
use litrans::file_utils::FileManager;
use litrans::translation::Glossary;

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Gemini,
    OpenRouter,
    Vertex,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Gemini => TranslationProvider::Gemini,
            CliTranslationProvider::OpenRouter => TranslationProvider::OpenRouter,
            CliTranslationProvider::Vertex => TranslationProvider::Vertex,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

/// CLI filter for the status listing
#[derive(Debug, Clone, ValueEnum)]
enum CliJobStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl From<CliJobStatus> for JobStatus {
    fn from(status: CliJobStatus) -> Self {
        match status {
            CliJobStatus::InProgress => JobStatus::InProgress,
            CliJobStatus::Completed => JobStatus::Completed,
            CliJobStatus::Failed => JobStatus::Failed,
            CliJobStatus::Cancelled => JobStatus::Cancelled,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a document or every document in a directory
    Translate(TranslateArgs),

    /// List translation jobs recorded in the job database
    Status {
        /// Only show jobs with this status
        #[arg(long, value_enum)]
        filter: Option<CliJobStatus>,

        /// Configuration file path
        #[arg(short, long, default_value = "conf.json")]
        config_path: PathBuf,
    },

    /// Generate shell completions for litrans
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct TranslateArgs {
    /// Input document or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Directory for the translated output (defaults to the document's directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// API key or access token for the provider
    #[arg(long, env = "LITRANS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Source language code (e.g., 'en', 'ja', 'fr')
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language code (e.g., 'ko', 'es', 'de')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Target segment size in characters
    #[arg(long)]
    segment_size: Option<usize>,

    /// Continue the job with this id
    #[arg(long, conflicts_with = "fresh")]
    resume: Option<String>,

    /// Start a new job even when an unfinished one exists for the document
    #[arg(long)]
    fresh: bool,

    /// File holding a core narrative style to use instead of asking the model
    #[arg(long)]
    style_file: Option<PathBuf>,

    /// JSON object of source terms to translations known up front
    #[arg(long)]
    glossary_file: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// litrans - literary translation with large language models
///
/// Translates novels and other long-form prose segment by segment, keeping a
/// glossary and character speech styles consistent across the whole book.
#[derive(Parser, Debug)]
#[command(name = "litrans")]
#[command(version)]
#[command(about = "Segment-by-segment literary translation with LLMs")]
#[command(long_about = "litrans translates long-form prose with large language models, one segment at a time,
carrying a glossary, character speech styles and the narrative style from segment to segment.

EXAMPLES:
    litrans translate novel.txt                        # Translate using default config
    litrans translate -f novel.md                      # Force overwrite existing output
    litrans translate -p openrouter -m some/model novel.txt
    litrans translate -s en -t ko novel.txt            # Translate from English to Korean
    litrans translate --resume 3f2a... novel.txt       # Continue an interrupted job
    litrans translate --log-level debug books/         # Process an entire directory
    litrans status --filter failed                     # List failed jobs
    litrans completions bash > litrans.bash            # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. If the file does not exist,
    a default one is created. API keys may also come from GEMINI_API_KEY,
    OPENROUTER_API_KEY or VERTEX_ACCESS_TOKEN.

SUPPORTED PROVIDERS:
    gemini     - Google Gemini API (structured output)
    vertex     - Gemini on Vertex AI (structured output)
    openrouter - OpenRouter chat completions (free text)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Marker and color for log level
    fn decoration(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("❌", "1;31"),
            Level::Warn => ("🚧", "1;33"),
            Level::Info => ("  ", "1;32"),
            Level::Debug => ("🔍", "1;36"),
            Level::Trace => ("📋", "1;35"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (marker, color) = Self::decoration(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "\x1B[{}m{} {} {}\x1B[0m", color, now, marker, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The level is lowered or raised once the config is known
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "litrans", &mut std::io::stdout());
            Ok(())
        }
        Commands::Status { filter, config_path } => run_status(filter.map(Into::into), &config_path).await,
        Commands::Translate(args) => run_translate(args).await,
    }
}

async fn run_status(filter: Option<JobStatus>, config_path: &Path) -> Result<()> {
    let config = Config::load_or_create(config_path)?;
    log::set_max_level(config.log_level.to_level_filter());

    let jobs = match &config.pipeline.database_path {
        Some(path) => litrans::session::JobManager::new(litrans::database::Repository::new(
            litrans::database::DatabaseConnection::new(path)?,
        )),
        None => litrans::session::JobManager::new_default()?,
    };

    let connection = jobs.repository().connection();
    info!("{} ({})", connection.path().display(), connection.stats().await?);

    let listed = jobs.list_jobs(filter).await?;
    if listed.is_empty() {
        info!("No translation jobs found");
        return Ok(());
    }

    let mut stdout = std::io::stdout();
    for job in listed {
        writeln!(stdout, "{}", job)?;
        if let Some(error) = &job.last_error {
            writeln!(stdout, "    last error: {}", error)?;
        }
    }

    Ok(())
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    // If log level is set via command line, apply it immediately
    if let Some(cmd_log_level) = &options.log_level {
        let level: LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let mut config = Config::load_or_create(&options.config_path)?;

    // Override config with CLI options if provided
    if let Some(provider) = &options.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(model) = &options.model {
        config.translation.set_model(model);
    }
    if let Some(source_lang) = &options.source_language {
        config.source_language = source_lang.clone();
    }
    if let Some(target_lang) = &options.target_language {
        config.target_language = target_lang.clone();
    }
    if let Some(size) = options.segment_size {
        config.pipeline.target_segment_size = size;
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }

    config.apply_env_credentials();
    if let Some(api_key) = &options.api_key {
        config.translation.set_api_key(api_key);
    }

    // Validate the configuration after loading and overriding
    config.validate().context("Configuration validation failed")?;

    if options.log_level.is_none() {
        log::set_max_level(config.log_level.to_level_filter());
    }

    let style_override = options
        .style_file
        .as_ref()
        .map(FileManager::read_to_string)
        .transpose()?
        .map(|style| style.trim().to_string())
        .filter(|style| !style.is_empty());
    let glossary_seed = options.glossary_file.as_deref().map(read_glossary).transpose()?;

    let controller = Controller::with_config(config)?;

    let cancellation = controller.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current segment");
            cancellation.cancel();
        }
    });

    if options.input_path.is_file() {
        let mut request = TranslateRequest::new(&options.input_path);
        request.output_dir = options.output_dir.clone();
        request.resume_job_id = options.resume.clone();
        request.fresh = options.fresh;
        request.style_override = style_override;
        request.glossary_seed = glossary_seed;

        let force = options.force_overwrite || options.resume.is_some();
        controller.run(request, force).await?;
    } else if options.input_path.is_dir() {
        if options.resume.is_some() {
            return Err(anyhow!("--resume takes a single document, not a directory"));
        }
        controller.run_folder(options.input_path.clone(), options.force_overwrite).await?;
    } else {
        return Err(anyhow!("Input path does not exist: {:?}", options.input_path));
    }

    Ok(())
}

/// Read a glossary seed from a JSON object of term pairs
fn read_glossary(path: &Path) -> Result<Glossary> {
    let content = FileManager::read_to_string(path)?;
    let pairs: BTreeMap<String, String> = serde_json::from_str(&content)
        .with_context(|| format!("Glossary file must be a JSON object of strings: {}", path.display()))?;
    Ok(Glossary::from_pairs(pairs))
}
