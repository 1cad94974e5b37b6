//! Compaction: summarize older context into a single message.
//!
//! - [`state`]: per-session UI state machine
//! - [`traits`]: summarizer, model catalog and UI sink seams
//! - [`orchestrator`]: decision, single-flight execution and atomic commit

pub mod orchestrator;
pub mod state;
pub mod traits;

pub use orchestrator::{
    CompactionCheck, CompactionDeps, CompactionOptions, CompactionOrchestrator, CompactionOutcome,
    summary_message,
};
pub use state::{CompactionStatus, CompactionUiState};
pub use traits::{
    CompactionUiSink, ExtractiveSummarizer, ModelCatalog, NoopUiSink, StaticModelCatalog,
    SummaryGenerator, SummaryRequest,
};
