// Engine error types.
//
// Anchor failures and stale entities are recovered where they are detected
// and never cross the engine boundary as errors. The one caller-visible
// condition is a guard rejection: the attempted edit is discarded before it
// touches the document.

use thiserror::Error;

/// Failure to decode an opaque anchor token.
///
/// Callers treat a failed decode as "anchor unusable": the owning entity is
/// orphaned for display purposes, not deleted.
#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("anchor token is not valid base64")]
    Transport(#[from] base64::DecodeError),

    #[error("anchor token payload is malformed")]
    Payload(#[from] yrs::encoding::read::Error),
}

/// An edit refused by the conflict guard. No document state was changed;
/// the caller must retry or cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EditRejected {
    #[error("edit overlaps a pending proposal under review")]
    PendingProposalOverlap,

    #[error("typing over a selection must go through a delete proposal first")]
    SelectionReplaceInProposeMode,

    #[error("cannot insert inside text already proposed for deletion")]
    InsertInsidePendingDelete,
}
