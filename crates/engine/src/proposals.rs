// Proposal engine: tracked insert/delete changes and their lifecycle.
//
// Per entity the state machine is `pending → approved` (terminal) or
// `pending → removed` (withdrawal); nothing re-enters pending. The engine
// also owns this session's "active proposal" pointer, which is what lets a
// run of keystrokes collapse into one pending proposal instead of one
// entity per keystroke.
//
// Two replicas may independently run the merge algorithm and both "win",
// producing two entities for one logical edit. That is an accepted
// eventual-consistency artifact; everything downstream recomputes
// idempotently and never assumes a single active proposal across replicas.

use tracing::warn;
use uuid::Uuid;
use yrs::{Transact, TransactionMut};

use redline_common::range::TextRange;
use redline_common::types::{ProposalKind, ProposalStatus, ProposedChange};

use crate::anchor::anchor_from_range;
use crate::doc::{map_get, map_insert, map_remove, map_values, slice_utf16, DocContext};
use crate::history::HistoryLedger;
use crate::resolve::resolve_anchor;

#[derive(Debug, Clone)]
pub struct ProposalConfig {
    /// Adjacency tolerance for merging, in positions. Ranges measured at
    /// different moments can be off by one, so the default of 1 lets
    /// back-to-back keystrokes coalesce.
    pub merge_gap: u32,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self { merge_gap: 1 }
    }
}

/// One proposal engine per editing session.
pub struct ProposalEngine {
    ctx: DocContext,
    author: String,
    config: ProposalConfig,
    active_proposal_id: Option<String>,
}

impl ProposalEngine {
    pub fn new(ctx: DocContext, author: &str) -> Self {
        Self::with_config(ctx, author, ProposalConfig::default())
    }

    pub fn with_config(ctx: DocContext, author: &str, config: ProposalConfig) -> Self {
        Self { ctx, author: author.to_string(), config, active_proposal_id: None }
    }

    pub fn active_proposal_id(&self) -> Option<&str> {
        self.active_proposal_id.as_deref()
    }

    /// Drop the active-proposal pointer (mode switch, cursor jump). The
    /// next recorded edit starts a new proposal.
    pub fn clear_active(&mut self) {
        self.active_proposal_id = None;
    }

    pub fn get(&self, id: &str) -> Option<ProposedChange> {
        let txn = self.ctx.doc().transact();
        map_get(&txn, self.ctx.proposals(), id)
    }

    /// All proposals, in map iteration order (not stable across replicas).
    pub fn list_all(&self) -> Vec<ProposedChange> {
        let txn = self.ctx.doc().transact();
        map_values(&txn, self.ctx.proposals())
    }

    /// Record locally typed text as an insert proposal. `range` is the span
    /// the insertion occupies in the current (post-edit) document.
    ///
    /// Returns the id of the proposal that now covers the edit, or `None`
    /// when the span could not be anchored.
    pub fn record_insertion(
        &mut self,
        ledger: &HistoryLedger,
        range: TextRange,
    ) -> Option<String> {
        if range.is_empty() {
            return None;
        }
        let doc = self.ctx.doc().clone();
        let mut txn = doc.transact_mut();
        self.merge_or_create(&mut txn, ledger, ProposalKind::Insert, range)
    }

    /// Mark existing text for deletion. `range` is measured before any
    /// mutation; the text stays in the document until the proposal is
    /// approved.
    pub fn propose_deletion(
        &mut self,
        ledger: &HistoryLedger,
        range: TextRange,
    ) -> Option<String> {
        if range.is_empty() {
            return None;
        }
        let doc = self.ctx.doc().clone();
        let mut txn = doc.transact_mut();
        self.merge_or_create(&mut txn, ledger, ProposalKind::Delete, range)
    }

    /// Merge-or-create, executed atomically. If this session's active
    /// proposal is still pending, has the same kind, and resolves adjacent
    /// to (or overlapping) the new range, the existing entity is rewritten
    /// in place over the union; otherwise a new entity is minted and
    /// becomes active. Either path touches exactly one ledger entry.
    fn merge_or_create(
        &mut self,
        txn: &mut TransactionMut<'_>,
        ledger: &HistoryLedger,
        kind: ProposalKind,
        range: TextRange,
    ) -> Option<String> {
        if let Some(id) = self.try_merge(txn, ledger, kind, range) {
            return Some(id);
        }

        let Some(anchor) = anchor_from_range(txn, self.ctx.content(), range) else {
            warn!(?range, ?kind, "failed to anchor edit, proposal not created");
            return None;
        };

        let change = ProposedChange {
            id: Uuid::new_v4().to_string(),
            author_name: self.author.clone(),
            status: ProposalStatus::Pending,
            kind,
            text: slice_utf16(&self.ctx.text_string(txn), range),
            anchor,
        };

        map_insert(txn, self.ctx.proposals(), &change.id, &change);
        ledger.log_proposal_created(txn, kind, &change.id, &change.text);
        self.active_proposal_id = Some(change.id.clone());
        Some(change.id)
    }

    fn try_merge(
        &mut self,
        txn: &mut TransactionMut<'_>,
        ledger: &HistoryLedger,
        kind: ProposalKind,
        range: TextRange,
    ) -> Option<String> {
        let current_id = self.active_proposal_id.clone()?;
        let existing: ProposedChange = map_get(txn, self.ctx.proposals(), &current_id)?;
        if !existing.is_pending() || existing.kind != kind {
            return None;
        }

        let existing_range = resolve_anchor(txn, &existing.anchor)?;
        if !existing_range.adjacent_within(range, self.config.merge_gap) {
            return None;
        }

        let union = existing_range.union(range);
        let anchor = anchor_from_range(txn, self.ctx.content(), union)?;
        let text = slice_utf16(&self.ctx.text_string(txn), union);

        let updated = ProposedChange { anchor, text: text.clone(), ..existing };
        map_insert(txn, self.ctx.proposals(), &current_id, &updated);
        ledger.update_proposal_text(txn, kind, &current_id, &text);
        Some(current_id)
    }

    /// Approve a proposal. For delete proposals the anchored range is
    /// physically removed from the document; if the anchor no longer
    /// resolves, the status still flips but the removal is skipped. Stale
    /// ids are silent no-ops.
    pub fn approve(&mut self, ledger: &HistoryLedger, id: &str) {
        let mut txn = self.ctx.doc().transact_mut();
        let Some(change) = map_get::<ProposedChange, _>(&txn, self.ctx.proposals(), id) else {
            return;
        };

        if change.kind == ProposalKind::Delete {
            match resolve_anchor(&txn, &change.anchor) {
                Some(range) => self.ctx.remove_range(&mut txn, range),
                None => {
                    warn!(%id, "delete proposal anchor did not resolve, approving without removal")
                }
            }
        }

        let updated = ProposedChange { status: ProposalStatus::Approved, ..change.clone() };
        map_insert(&mut txn, self.ctx.proposals(), id, &updated);
        ledger.log_proposal_approved(&mut txn, change.kind, id, &change.text);

        if self.active_proposal_id.as_deref() == Some(id) {
            self.active_proposal_id = None;
        }
    }

    /// Withdraw a proposal: remove the entity, and for a still-pending
    /// insert proposal also remove the provisional text it had introduced.
    pub fn withdraw(&mut self, ledger: &HistoryLedger, id: &str) {
        let mut txn = self.ctx.doc().transact_mut();
        let Some(change) = map_get::<ProposedChange, _>(&txn, self.ctx.proposals(), id) else {
            return;
        };

        if change.kind == ProposalKind::Insert && change.is_pending() {
            match resolve_anchor(&txn, &change.anchor) {
                Some(range) => self.ctx.remove_range(&mut txn, range),
                None => warn!(%id, "insert proposal anchor did not resolve, nothing to undo"),
            }
        }

        map_remove(&mut txn, self.ctx.proposals(), id);
        ledger.log_proposal_withdrawn(&mut txn, change.kind, id, &change.text);

        if self.active_proposal_id.as_deref() == Some(id) {
            self.active_proposal_id = None;
        }
    }
}
