//! Session aggregate: live timeline, archived threads, forks and compaction
//! checkpoints.
//!
//! A [`Session`] exclusively owns its live [`Timeline`] and a list of archived
//! [`SessionThread`]s. Every timeline (live or archived) carries its own fork
//! map and its own compaction points, so forks and compaction never cross a
//! thread boundary.
//!
//! ## Fork representation
//!
//! A [`MessageForkEntry`] hangs off an anchor message. Exactly one of its
//! branches is live at a time and that branch is never stored: its content is
//! whatever follows the anchor in the timeline. [`BranchSlot`] makes this
//! explicit: the live branch is [`BranchSlot::Inline`], all others are
//! [`BranchSlot::Stored`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BranchId, MessageId, SessionId, ThreadId};
use crate::messages::{Message, MessageRole, TokenizerKind};

// ─────────────────────────────────────────────────────────────────────────────
// Compaction points
// ─────────────────────────────────────────────────────────────────────────────

/// Checkpoint recording that every non-summary message up to and including
/// `boundary_message_id` is condensed into `summary_message_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionPoint {
    /// Last original message covered by the summary.
    pub boundary_message_id: MessageId,
    /// The synthetic summary message.
    pub summary_message_id: MessageId,
    /// When the checkpoint was committed.
    pub created_at: DateTime<Utc>,
}

/// Select the compaction point with the greatest `created_at`.
///
/// Linear reduction that keeps the first-seen maximum: with colliding
/// timestamps the earliest entry in list order wins.
#[must_use]
pub fn latest_compaction_point(points: &[CompactionPoint]) -> Option<&CompactionPoint> {
    points.iter().fold(None, |best: Option<&CompactionPoint>, point| match best {
        Some(current) if point.created_at > current.created_at => Some(point),
        Some(current) => Some(current),
        None => Some(point),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Forks
// ─────────────────────────────────────────────────────────────────────────────

/// Storage of one branch of a fork entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchSlot {
    /// The live branch; its content is the timeline tail after the anchor.
    Inline,
    /// An out-of-line branch holding its own continuation.
    Stored(Vec<Message>),
}

impl BranchSlot {
    /// Whether this is the live slot.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline)
    }
}

/// One alternative continuation of an anchor message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForkBranch {
    /// Branch ID.
    pub id: BranchId,
    /// Where the branch content lives.
    pub slot: BranchSlot,
}

impl ForkBranch {
    /// A new live branch.
    #[must_use]
    pub fn inline() -> Self {
        Self {
            id: BranchId::new(),
            slot: BranchSlot::Inline,
        }
    }

    /// A new out-of-line branch.
    #[must_use]
    pub fn stored(messages: Vec<Message>) -> Self {
        Self {
            id: BranchId::new(),
            slot: BranchSlot::Stored(messages),
        }
    }
}

/// Violation of the fork entry invariants.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ForkInvariantError {
    /// Entry has no branches.
    #[error("fork entry has no branches")]
    Empty,
    /// `position` is not a valid index.
    #[error("fork position {position} out of bounds for {len} branches")]
    PositionOutOfBounds {
        /// Current position.
        position: usize,
        /// Number of branches.
        len: usize,
    },
    /// Not exactly one inline branch.
    #[error("expected exactly one inline branch, found {count}")]
    InlineCount {
        /// Number of inline branches found.
        count: usize,
    },
    /// The inline branch is not at `position`.
    #[error("inline branch at {inline_at} but position is {position}")]
    InlineMisplaced {
        /// Current position.
        position: usize,
        /// Index of the inline branch.
        inline_at: usize,
    },
}

/// Branches hanging off one anchor message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageForkEntry {
    /// Index of the live branch in `lists`.
    pub position: usize,
    /// All branches, in creation order.
    pub lists: Vec<ForkBranch>,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

impl MessageForkEntry {
    /// Number of branches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Whether the entry has no branches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Verify the structural invariants of this entry.
    pub fn check(&self) -> Result<(), ForkInvariantError> {
        if self.lists.is_empty() {
            return Err(ForkInvariantError::Empty);
        }
        if self.position >= self.lists.len() {
            return Err(ForkInvariantError::PositionOutOfBounds {
                position: self.position,
                len: self.lists.len(),
            });
        }
        let inline: Vec<usize> = self
            .lists
            .iter()
            .enumerate()
            .filter(|(_, b)| b.slot.is_inline())
            .map(|(i, _)| i)
            .collect();
        match inline.as_slice() {
            [only] if *only == self.position => Ok(()),
            [only] => Err(ForkInvariantError::InlineMisplaced {
                position: self.position,
                inline_at: *only,
            }),
            other => Err(ForkInvariantError::InlineCount { count: other.len() }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Timeline
// ─────────────────────────────────────────────────────────────────────────────

/// An ordered message sequence together with its fork map and compaction
/// checkpoints.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timeline {
    /// Messages in conversation order.
    pub messages: Vec<Message>,
    /// Fork entries keyed by anchor message ID.
    #[serde(rename = "messageForksHash")]
    pub forks: HashMap<MessageId, MessageForkEntry>,
    /// Compaction checkpoints in commit order.
    pub compaction_points: Vec<CompactionPoint>,
}

impl Timeline {
    /// A timeline holding only the given messages.
    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Index of a message in the inline sequence.
    #[must_use]
    pub fn index_of(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.id == id)
    }

    /// Whether the inline sequence contains a message.
    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.index_of(id).is_some()
    }

    /// The leading system message, if the timeline starts with one.
    #[must_use]
    pub fn system_message(&self) -> Option<&Message> {
        self.messages.first().filter(|m| m.is_system())
    }

    /// Latest compaction point (first-seen maximum on ties).
    #[must_use]
    pub fn latest_compaction_point(&self) -> Option<&CompactionPoint> {
        latest_compaction_point(&self.compaction_points)
    }

    /// Verify every fork entry's invariants.
    pub fn check_forks(&self) -> Result<(), ForkInvariantError> {
        self.forks.values().try_for_each(MessageForkEntry::check)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Threads and sessions
// ─────────────────────────────────────────────────────────────────────────────

/// An archived timeline snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionThread {
    /// Thread ID.
    pub id: ThreadId,
    /// Display name.
    pub name: String,
    /// The archived timeline with its own forks and compaction points.
    #[serde(flatten)]
    pub timeline: Timeline,
    /// When the snapshot was taken.
    pub created_at: DateTime<Utc>,
}

/// Per-session overrides. `None` inherits the global setting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Auto-compaction toggle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_compaction: Option<bool>,
    /// Maximum number of non-system messages sent as context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_context_message_count: Option<usize>,
    /// Roles allowed into the context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_filter: Option<Vec<MessageRole>>,
    /// Compaction threshold fraction of the context window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compaction_threshold: Option<f64>,
    /// Model provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Model identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Tokenizer used for token accounting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<TokenizerKind>,
}

/// Which timeline of a session an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimelineRef {
    /// The live timeline.
    Live,
    /// The archived thread at this index of `Session::threads`.
    Thread(usize),
}

/// Aggregate root.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session ID.
    pub id: SessionId,
    /// Session display name.
    pub name: String,
    /// Display name of the live thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_name: Option<String>,
    /// The live timeline.
    #[serde(flatten)]
    pub timeline: Timeline,
    /// Archived threads, oldest first.
    #[serde(default)]
    pub threads: Vec<SessionThread>,
    /// Per-session overrides.
    #[serde(default)]
    pub settings: SessionSettings,
    /// Incremented on every committed patch.
    #[serde(default)]
    pub revision: u64,
    /// Time of the last committed patch.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create an empty session.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            name: name.into(),
            thread_name: None,
            timeline: Timeline::default(),
            threads: Vec::new(),
            settings: SessionSettings::default(),
            revision: 0,
            updated_at: Utc::now(),
        }
    }

    /// Create a session whose live timeline holds `messages`.
    #[must_use]
    pub fn with_messages(name: impl Into<String>, messages: Vec<Message>) -> Self {
        let mut session = Self::new(name);
        session.timeline = Timeline::from_messages(messages);
        session
    }

    /// Live messages.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.timeline.messages
    }

    /// Find the timeline whose inline sequence contains `id`.
    ///
    /// The live timeline is searched first, then threads in order; the first
    /// match wins.
    #[must_use]
    pub fn locate(&self, id: &MessageId) -> Option<TimelineRef> {
        if self.timeline.contains(id) {
            return Some(TimelineRef::Live);
        }
        self.threads
            .iter()
            .position(|t| t.timeline.contains(id))
            .map(TimelineRef::Thread)
    }

    /// Borrow a timeline by reference.
    #[must_use]
    pub fn timeline(&self, at: TimelineRef) -> Option<&Timeline> {
        match at {
            TimelineRef::Live => Some(&self.timeline),
            TimelineRef::Thread(i) => self.threads.get(i).map(|t| &t.timeline),
        }
    }

    /// Mutably borrow a timeline by reference.
    pub fn timeline_mut(&mut self, at: TimelineRef) -> Option<&mut Timeline> {
        match at {
            TimelineRef::Live => Some(&mut self.timeline),
            TimelineRef::Thread(i) => self.threads.get_mut(i).map(|t| &mut t.timeline),
        }
    }

    /// Record a committed change.
    pub fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Utc::now();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
