// Core domain types shared across the Redline workspace.
//
// All entities serialize to the stable transport shape used in the shared
// collaborative maps: camelCase field names, lowercase status/kind
// discriminants. Anchor tokens are opaque base64 strings produced by the
// engine's anchor codec and must never be parsed by anything else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An edit-resilient reference to a document span.
///
/// `start` and `end` are opaque position tokens: each encodes "the point
/// adjacent to a specific CRDT item, in a given direction", so the anchor
/// keeps pointing at the same passage as unrelated edits shift absolute
/// offsets around it.
#[derive(Debug, Clone, Hash, Serialize, Deserialize, PartialEq, Eq)]
pub struct Anchor {
    pub start: String,
    pub end: String,
}

/// A reviewer comment attached to a document span.
#[derive(Debug, Clone, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub author_name: String,
    pub resolved: bool,
    pub anchor: Anchor,
}

/// Proposal lifecycle state. `Approved` is terminal; withdrawal removes the
/// entity from the map instead of transitioning it.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Approved,
}

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProposalKind {
    Insert,
    Delete,
}

impl ProposalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Delete => "delete",
        }
    }
}

/// A tracked insert or delete awaiting approval or withdrawal.
///
/// `text` caches the rendered content of the anchored span at the time the
/// proposal was created or last merged.
#[derive(Debug, Clone, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProposedChange {
    pub id: String,
    pub author_name: String,
    pub status: ProposalStatus,
    pub kind: ProposalKind,
    pub text: String,
    pub anchor: Anchor,
}

impl ProposedChange {
    pub fn is_pending(&self) -> bool {
        self.status == ProposalStatus::Pending
    }
}

/// How local edits are applied: directly, or routed through proposals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    Direct,
    Propose,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HistoryKind {
    CommentCreated,
    CommentResolved,
    CommentDeleted,

    ProposalInsertCreated,
    ProposalInsertApproved,
    ProposalInsertDeleted,

    ProposalDeleteCreated,
    ProposalDeleteApproved,
    ProposalDeleteDeleted,

    TextInserted,
    TextDeleted,
}

/// Per-kind payload of a history entry.
///
/// Untagged: the field sets are disjoint enough to discriminate (proposal
/// payloads carry `proposalId`, comment payloads `commentId`, free-text
/// payloads only `text`). Variant order matters for deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum HistoryPayload {
    #[serde(rename_all = "camelCase")]
    Proposal { proposal_id: String, kind: ProposalKind, text: String },
    #[serde(rename_all = "camelCase")]
    Comment { comment_id: String, text: String },
    Text { text: String },
}

impl HistoryPayload {
    /// The payload's display text, whatever the variant.
    pub fn text(&self) -> &str {
        match self {
            Self::Proposal { text, .. } | Self::Comment { text, .. } | Self::Text { text } => text,
        }
    }
}

/// Why a document snapshot was captured. Mirrors the host lifecycle moments
/// that trigger a capture; `ManualGroupSplit` marks a user-requested cut.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotReason {
    Interval,
    Mounted,
    Unmounted,
    RouteChange,
    BeforeUnload,
    VisibilityHidden,
    ManualGroupSplit,
}

/// One captured state of the document content, grouped into time windows by
/// `group_id` so a burst of captures reads as a single step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub group_id: String,
    pub reason: SnapshotReason,
    pub text: String,
}

/// One entry in the append-only activity ledger.
///
/// Entries are immutable once written, with one exception: a free-text entry
/// may be replaced in place (same id) while it is still the current typing
/// run for its author.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub kind: HistoryKind,
    pub created_at: DateTime<Utc>,
    pub user_name: String,
    pub payload: HistoryPayload,
}
