// redline-engine: reviewer annotations over a collaboratively edited text.
//
// Layers inline comments and tracked insert/delete proposals on top of a
// yrs (Yjs-compatible) document. Anchors are sticky indices: they keep
// pointing at the meaning of a passage while concurrent edits shift
// absolute offsets elsewhere. The engine is synchronous and event-driven;
// replication of the shared maps and text is yrs's job, per-key
// last-writer-wins for map entries.

pub mod anchor;
pub mod comments;
pub mod decorations;
pub mod doc;
pub mod error;
pub mod guard;
pub mod history;
pub mod proposals;
pub mod resolve;
pub mod session;
pub mod snapshots;

pub use doc::DocContext;
pub use error::{AnchorError, EditRejected};
pub use session::EditorSession;
