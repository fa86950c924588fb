// Shared-document context built on yrs (y-crdt Rust bindings).
//
// One `DocContext` wraps the collaborative document and the shared
// structures the engine works against: the content text plus the comment,
// proposal and history maps. Map values are stored as JSON strings in the
// stable transport shape; yrs replicates them per-key, last-writer-wins.
// Offsets are UTF-16 code units, matching Yjs clients.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{
    Doc, GetString, Map, MapRef, Observable, OffsetKind, Options, ReadTxn, StateVector, Text,
    TextRef, Transact, TransactionMut, Update,
};

use redline_common::range::TextRange;

pub const CONTENT_KEY: &str = "content";
pub const COMMENTS_KEY: &str = "comments";
pub const PROPOSALS_KEY: &str = "proposedChanges";
pub const HISTORY_KEY: &str = "history";
pub const SNAPSHOTS_KEY: &str = "snapshots";

/// Handle to the shared document and its annotation maps.
///
/// Constructed once and passed into every engine component; components never
/// look the document up from ambient scope. Cloning is cheap (all handles
/// are reference-counted) and clones address the same document.
#[derive(Clone)]
pub struct DocContext {
    doc: Doc,
    content: TextRef,
    comments: MapRef,
    proposals: MapRef,
    history: MapRef,
    snapshots: MapRef,
}

impl DocContext {
    /// Create a context over a fresh empty document.
    pub fn new() -> Self {
        Self::from_doc(Doc::with_options(doc_options(None)))
    }

    /// Create a context with a fixed client ID (for deterministic testing).
    pub fn with_client_id(client_id: u64) -> Self {
        Self::from_doc(Doc::with_options(doc_options(Some(client_id))))
    }

    /// Load a context from a full binary document state.
    pub fn from_state(data: &[u8]) -> Result<Self> {
        let ctx = Self::new();
        ctx.apply_update(data).context("failed to load document state")?;
        Ok(ctx)
    }

    fn from_doc(doc: Doc) -> Self {
        let content = doc.get_or_insert_text(CONTENT_KEY);
        let comments = doc.get_or_insert_map(COMMENTS_KEY);
        let proposals = doc.get_or_insert_map(PROPOSALS_KEY);
        let history = doc.get_or_insert_map(HISTORY_KEY);
        let snapshots = doc.get_or_insert_map(SNAPSHOTS_KEY);
        Self { doc, content, comments, proposals, history, snapshots }
    }

    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    pub fn content(&self) -> &TextRef {
        &self.content
    }

    pub fn comments(&self) -> &MapRef {
        &self.comments
    }

    pub fn proposals(&self) -> &MapRef {
        &self.proposals
    }

    pub fn history(&self) -> &MapRef {
        &self.history
    }

    pub fn snapshots(&self) -> &MapRef {
        &self.snapshots
    }

    // ── Replication boundary ─────────────────────────────────────────

    /// Apply an incremental binary update from another replica.
    pub fn apply_update(&self, data: &[u8]) -> Result<()> {
        let update = Update::decode_v1(data).context("failed to decode update")?;
        self.doc.transact_mut().apply_update(update).context("failed to apply update")?;
        Ok(())
    }

    /// Encode the full document state as a binary blob.
    pub fn encode_state(&self) -> Vec<u8> {
        self.doc.transact().encode_state_as_update_v1(&StateVector::default())
    }

    /// Encode the state vector (logical timestamp) for the sync protocol.
    pub fn encode_state_vector(&self) -> Vec<u8> {
        self.doc.transact().state_vector().encode_v1()
    }

    /// Compute a diff containing all changes since the given state vector.
    pub fn encode_diff(&self, remote_sv: &[u8]) -> Result<Vec<u8>> {
        let sv = StateVector::decode_v1(remote_sv).context("failed to decode state vector")?;
        Ok(self.doc.transact().encode_diff_v1(&sv))
    }

    // ── Content text ─────────────────────────────────────────────────

    /// Content length in UTF-16 code units.
    pub fn text_len<T: ReadTxn>(&self, txn: &T) -> u32 {
        self.content.len(txn)
    }

    pub fn text_string<T: ReadTxn>(&self, txn: &T) -> String {
        self.content.get_string(txn)
    }

    /// Content of `range` against the current document state.
    pub fn text_slice<T: ReadTxn>(&self, txn: &T, range: TextRange) -> String {
        slice_utf16(&self.content.get_string(txn), range)
    }

    /// Insert `chunk` at `at`, clamped to the document end.
    ///
    /// With `remove_range` below this is the only way the engine physically
    /// mutates document text (proposal approval and withdrawal).
    pub fn insert_at(&self, txn: &mut TransactionMut<'_>, at: u32, chunk: &str) {
        let at = at.min(self.content.len(txn));
        self.content.insert(txn, at, chunk);
    }

    /// Remove `range` from the content, clamped to the document end.
    pub fn remove_range(&self, txn: &mut TransactionMut<'_>, range: TextRange) {
        let len = self.content.len(txn);
        let from = range.from.min(len);
        let to = range.to.min(len);
        if from < to {
            self.content.remove_range(txn, from, to - from);
        }
    }

    // ── Reactive triggers ────────────────────────────────────────────

    pub fn on_content_change(
        &self,
        f: impl Fn() + Send + Sync + 'static,
    ) -> yrs::Subscription {
        self.content.observe(move |_txn, _event| f())
    }

    pub fn on_comments_change(
        &self,
        f: impl Fn() + Send + Sync + 'static,
    ) -> yrs::Subscription {
        self.comments.observe(move |_txn, _event| f())
    }

    pub fn on_proposals_change(
        &self,
        f: impl Fn() + Send + Sync + 'static,
    ) -> yrs::Subscription {
        self.proposals.observe(move |_txn, _event| f())
    }
}

impl Default for DocContext {
    fn default() -> Self {
        Self::new()
    }
}

fn doc_options(client_id: Option<u64>) -> Options {
    let mut options = Options { offset_kind: OffsetKind::Utf16, ..Default::default() };
    if let Some(client_id) = client_id {
        options.client_id = client_id;
    }
    options
}

// ── JSON map entries ─────────────────────────────────────────────────

/// Read and decode one entry from a shared map. Undecodable values (written
/// by a foreign or newer client) are skipped with a warning, not errors.
pub fn map_get<T, R>(txn: &R, map: &MapRef, key: &str) -> Option<T>
where
    T: DeserializeOwned,
    R: ReadTxn,
{
    let raw = map.get(txn, key)?.to_string(txn);
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(%key, %error, "skipping undecodable shared map entry");
            None
        }
    }
}

/// Encode and write one entry into a shared map (per-key LWW on merge).
pub fn map_insert<T: Serialize>(txn: &mut TransactionMut<'_>, map: &MapRef, key: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(raw) => {
            map.insert(txn, key, raw);
        }
        Err(error) => warn!(%key, %error, "failed to encode shared map entry"),
    }
}

/// Remove one entry; `false` if it was already gone.
pub fn map_remove(txn: &mut TransactionMut<'_>, map: &MapRef, key: &str) -> bool {
    map.remove(txn, key).is_some()
}

/// Remove every entry from a shared map.
pub fn map_clear(txn: &mut TransactionMut<'_>, map: &MapRef) {
    let keys: Vec<String> = map.iter(txn).map(|(key, _)| key.to_string()).collect();
    for key in keys {
        map.remove(txn, &key);
    }
}

/// Decode every entry of a shared map, in map iteration order.
///
/// Iteration order is implementation-defined and not stable across
/// replicas; callers needing an order must sort by an explicit field.
pub fn map_values<T, R>(txn: &R, map: &MapRef) -> Vec<T>
where
    T: DeserializeOwned,
    R: ReadTxn,
{
    map.iter(txn)
        .filter_map(|(key, value)| {
            let raw = value.to_string(txn);
            match serde_json::from_str(&raw) {
                Ok(decoded) => Some(decoded),
                Err(error) => {
                    warn!(%key, %error, "skipping undecodable shared map entry");
                    None
                }
            }
        })
        .collect()
}

/// Substring by UTF-16 code-unit offsets, the unit yrs reports for this
/// document configuration.
pub fn slice_utf16(s: &str, range: TextRange) -> String {
    if range.is_empty() {
        return String::new();
    }
    let units: Vec<u16> =
        s.encode_utf16().skip(range.from as usize).take(range.len() as usize).collect();
    String::from_utf16_lossy(&units)
}
