//! # strand-core
//!
//! Shared vocabulary for strand: the conversation data model that the fork
//! engine, thread archive, context builder and compaction orchestrator all
//! operate on.
//!
//! - **Branded IDs**: `SessionId`, `MessageId`, `ThreadId`, `BranchId`
//! - **Messages**: `Message` with typed `ContentPart`s and per-tokenizer token counts
//! - **Session model**: `Session`, `Timeline`, `SessionThread`, `MessageForkEntry`,
//!   `CompactionPoint`
//! - **Errors**: `StrandError` via `thiserror`
//! - **Logging**: `tracing` subscriber setup and log capture for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod session;

pub use errors::{Result, StrandError};
pub use ids::{BranchId, MessageId, SessionId, ThreadId};
pub use messages::{
    ContentPart, Message, MessageFile, MessageLink, MessageRole, TokenizerKind, ToolCallState,
};
pub use session::{
    BranchSlot, CompactionPoint, ForkBranch, ForkInvariantError, MessageForkEntry, Session,
    SessionSettings, SessionThread, Timeline, TimelineRef, latest_compaction_point,
};
