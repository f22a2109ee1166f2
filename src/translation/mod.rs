/*!
 * Segment-by-segment literary translation.
 *
 * This module contains the translation pipeline. It is split into several
 * submodules:
 *
 * - `segmenter`: splitting normalized text into size-bounded segments
 * - `document`: source and translated segment model
 * - `state`: glossary, character styles and checkpoints
 * - `gateway`: retrying, rotating access to the model backends
 * - `json_repair`: lenient parsing of model JSON output
 * - `prompts`: prompt catalog, builder and sanitizer
 * - `context`: per-segment analyzers and the dynamic guide builder
 * - `orchestrator`: the per-job state machine
 * - `assembler`: output writers
 * - `diagnostics`: content-safety escalation records
 * - `events`: job events and token usage sinks
 */

// Re-export main types for easier usage
pub use self::assembler::{BufferedAssembler, DocumentAssembler, PlainTextAssembler};
pub use self::document::{ChapterInfo, Segment, TranslatedDocument, TranslatedSegment};
pub use self::gateway::{GatewaySettings, ModelGateway};
pub use self::orchestrator::{
    CancellationFlag, JobReport, OrchestratorSettings, ProgressCallback, TranslationOrchestrator,
};
pub use self::segmenter::{SegmentSplitter, SourceFormat};
pub use self::state::{CharacterStyleMap, Glossary, JobCheckpoint, TranslationState};

// Submodules
pub mod assembler;
pub mod context;
pub mod diagnostics;
pub mod document;
pub mod events;
pub mod gateway;
pub mod json_repair;
pub mod orchestrator;
pub mod prompts;
pub mod segmenter;
pub mod state;
