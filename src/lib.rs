/*!
 * # litrans - literary translation with large language models
 *
 * A Rust library for translating novels and other long-form prose segment by
 * segment, keeping terminology and voice consistent across the whole book.
 *
 * ## Features
 *
 * - Paragraph-aware segmentation of plain text and Markdown chapters
 * - A glossary, character speech styles and a core narrative style carried
 *   from segment to segment
 * - Model access through Gemini, Vertex AI or OpenRouter, with retries,
 *   backup credentials and structured JSON output where supported
 * - Content-safety escalation with sanitized and minimal prompts
 * - Checkpointed jobs in SQLite that resume after a crash or a block
 * - ISO 639-1 and ISO 639-2 language code support
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `translation`: The translation pipeline:
 *   - `translation::segmenter`: Splitting text into segments
 *   - `translation::gateway`: Retrying access to the model backends
 *   - `translation::prompts`: Prompt catalog, builder and sanitizer
 *   - `translation::context`: Glossary, style and guide analyzers
 *   - `translation::orchestrator`: The per-job state machine
 *   - `translation::assembler`: Output writers
 * - `session`: Job lifecycle and checkpoint stores
 * - `database`: SQLite persistence for jobs and checkpoints
 * - `file_utils`: File system operations and document parsing
 * - `app_controller`: Main application controller
 * - `language_utils`: ISO language code utilities
 * - `providers`: Client implementations for the model backends:
 *   - `providers::gemini`: Gemini and Vertex AI client
 *   - `providers::openrouter`: OpenRouter client
 *   - `providers::mock`: Scripted backend for tests
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod database;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod providers;
pub mod session;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::{Controller, TranslateRequest};
pub use errors::{AppError, ProviderError, TranslationError};
pub use language_utils::{get_language_name, language_codes_match, normalize_to_part2t};
pub use session::{CheckpointStore, JobManager};
pub use translation::{Segment, SegmentSplitter, TranslationOrchestrator};
