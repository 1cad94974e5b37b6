//! # strand-session
//!
//! Session-shape mutations for strand.
//!
//! - [`SessionStore`]: the atomic read/patch boundary sessions live behind,
//!   with [`MemorySessionStore`] as the in-process implementation
//! - [`forks`]: pure fork transforms over one timeline
//! - [`ForkEngine`]: fork transforms committed as store patches
//! - [`ThreadArchive`]: archiving and restoring timelines as threads
//! - [`GenerationRegistry`]: cancellation hooks for streaming messages

#![deny(unsafe_code)]

pub mod engine;
pub mod errors;
pub mod forks;
pub mod generation;
pub mod store;
pub mod threads;

pub use engine::{ForkEngine, ForkOutcome};
pub use errors::{Result, StoreError};
pub use forks::{ForkDirection, ForkInfo};
pub use generation::GenerationRegistry;
pub use store::{MemorySessionStore, PatchResult, SessionPatch, SessionStore};
pub use threads::{ThreadArchive, ThreadOutcome};
