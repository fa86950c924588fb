// Editor session: one author's synchronous view over a shared document.
//
// Binds the stores, the proposal engine, the guard, the decoration engine
// and the ledger to a single document context and a single mode switch.
// Host editors talk to this type only; the components underneath stay
// independently testable.

use yrs::Transact;

use redline_common::range::TextRange;
use redline_common::types::{
    Comment, EditorMode, HistoryEntry, ProposedChange, SnapshotEntry, SnapshotReason,
};

use crate::comments::CommentStore;
use crate::decorations::{Decoration, DecorationEngine};
use crate::doc::DocContext;
use crate::error::EditRejected;
use crate::guard::{ConflictGuard, EditIntent};
use crate::history::{HistoryLedger, LedgerConfig};
use crate::proposals::{ProposalConfig, ProposalEngine};
use crate::snapshots::{SnapshotConfig, SnapshotStore};

/// Per-session tuning, forwarded to the underlying components.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub proposal: ProposalConfig,
    pub ledger: LedgerConfig,
    pub snapshot: SnapshotConfig,
}

pub struct EditorSession {
    ctx: DocContext,
    mode: EditorMode,
    comments: CommentStore,
    proposals: ProposalEngine,
    guard: ConflictGuard,
    decorations: DecorationEngine,
    ledger: HistoryLedger,
    snapshots: SnapshotStore,
}

impl EditorSession {
    pub fn new(ctx: DocContext, author: &str) -> Self {
        Self::with_config(ctx, author, SessionConfig::default())
    }

    pub fn with_config(ctx: DocContext, author: &str, config: SessionConfig) -> Self {
        Self {
            comments: CommentStore::new(ctx.clone(), author),
            proposals: ProposalEngine::with_config(ctx.clone(), author, config.proposal),
            guard: ConflictGuard::new(ctx.clone()),
            decorations: DecorationEngine::new(ctx.clone()),
            ledger: HistoryLedger::with_config(&ctx, author, config.ledger),
            snapshots: SnapshotStore::with_config(ctx.clone(), config.snapshot),
            mode: EditorMode::Direct,
            ctx,
        }
    }

    pub fn context(&self) -> &DocContext {
        &self.ctx
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    /// Switch editing modes. The active proposal and any open typing run
    /// belong to the mode they started in, so both are dropped.
    pub fn set_mode(&mut self, mode: EditorMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        self.proposals.clear_active();
        self.ledger.reset_run_grouping();
    }

    // ── Text edits ───────────────────────────────────────────────────

    /// Insert `content` at `at`. In propose mode the text lands in the
    /// document immediately but is tracked by a pending insert proposal.
    pub fn insert_text(&mut self, at: u32, content: &str) -> Result<(), EditRejected> {
        let len = utf16_len(content);
        if len == 0 {
            return Ok(());
        }
        // Clamp before vetting and tracking, so the range the guard sees and
        // the range handed to the proposal engine and ledger is the one
        // actually edited.
        let at = at.min(self.doc_len());
        self.guard.check(self.mode, &EditIntent::insertion(at, len))?;

        match self.mode {
            EditorMode::Direct => {
                let mut txn = self.ctx.doc().transact_mut();
                self.ctx.insert_at(&mut txn, at, content);
                let range = TextRange { from: at, to: at + len };
                self.ledger.log_text_inserted(&mut txn, range, content);
            }
            EditorMode::Propose => {
                {
                    let mut txn = self.ctx.doc().transact_mut();
                    self.ctx.insert_at(&mut txn, at, content);
                }
                let range = TextRange { from: at, to: at + len };
                self.proposals.record_insertion(&self.ledger, range);
            }
        }
        Ok(())
    }

    /// Delete `range`. In propose mode the text stays in place and a
    /// pending delete proposal marks it instead.
    pub fn delete_range(&mut self, range: TextRange) -> Result<(), EditRejected> {
        let range = self.clamp_range(range);
        if range.is_empty() {
            return Ok(());
        }
        self.guard.check(self.mode, &EditIntent::deletion(range))?;

        match self.mode {
            EditorMode::Direct => {
                let mut txn = self.ctx.doc().transact_mut();
                let removed = self.ctx.text_slice(&txn, range);
                self.ctx.remove_range(&mut txn, range);
                self.ledger.log_text_deleted(&mut txn, range, &removed);
            }
            EditorMode::Propose => {
                self.proposals.propose_deletion(&self.ledger, range);
            }
        }
        Ok(())
    }

    /// Type over a non-empty selection. Rejected in propose mode; a
    /// reviewer must mark the deletion and insert separately so both
    /// halves stay individually reviewable.
    pub fn replace_selection(&mut self, range: TextRange, content: &str) -> Result<(), EditRejected> {
        let range = self.clamp_range(range);
        let len = utf16_len(content);
        self.guard.check(self.mode, &EditIntent::replacement(range, len))?;

        let mut txn = self.ctx.doc().transact_mut();
        let removed = self.ctx.text_slice(&txn, range);
        self.ctx.remove_range(&mut txn, range);
        if !removed.is_empty() {
            self.ledger.log_text_deleted(&mut txn, range, &removed);
        }
        if len > 0 {
            self.ctx.insert_at(&mut txn, range.from, content);
            let inserted = TextRange { from: range.from, to: range.from + len };
            self.ledger.log_text_inserted(&mut txn, inserted, content);
        }
        Ok(())
    }

    fn doc_len(&self) -> u32 {
        let txn = self.ctx.doc().transact();
        self.ctx.text_len(&txn)
    }

    fn clamp_range(&self, range: TextRange) -> TextRange {
        let len = self.doc_len();
        TextRange { from: range.from.min(len), to: range.to.min(len) }
    }

    // ── Comments ─────────────────────────────────────────────────────

    pub fn create_comment(&self, selection: TextRange, text: &str) -> Option<Comment> {
        self.comments.create(&self.ledger, selection, text)
    }

    pub fn set_comment_resolved(&self, id: &str, resolved: bool) {
        self.comments.set_resolved(&self.ledger, id, resolved);
    }

    pub fn delete_comment(&self, id: &str) {
        self.comments.remove(&self.ledger, id);
    }

    pub fn comment(&self, id: &str) -> Option<Comment> {
        self.comments.get(id)
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.comments.list_all()
    }

    // ── Proposals ────────────────────────────────────────────────────

    pub fn approve_proposal(&mut self, id: &str) {
        self.proposals.approve(&self.ledger, id);
    }

    pub fn withdraw_proposal(&mut self, id: &str) {
        self.proposals.withdraw(&self.ledger, id);
    }

    pub fn proposal(&self, id: &str) -> Option<ProposedChange> {
        self.proposals.get(id)
    }

    pub fn proposals(&self) -> Vec<ProposedChange> {
        self.proposals.list_all()
    }

    pub fn active_proposal_id(&self) -> Option<&str> {
        self.proposals.active_proposal_id()
    }

    // ── Projections ──────────────────────────────────────────────────

    pub fn text(&self) -> String {
        let txn = self.ctx.doc().transact();
        self.ctx.text_string(&txn)
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        let txn = self.ctx.doc().transact();
        self.ledger.list(&txn)
    }

    /// Empty the shared activity ledger for every replica.
    pub fn clear_history(&mut self) {
        let mut txn = self.ctx.doc().transact_mut();
        self.ledger.clear(&mut txn);
    }

    // ── Snapshots ────────────────────────────────────────────────────

    /// Capture the current content; `None` when it matches the latest
    /// snapshot.
    pub fn capture_snapshot(&mut self, reason: SnapshotReason) -> Option<SnapshotEntry> {
        self.snapshots.capture(reason)
    }

    pub fn snapshots(&self) -> Vec<SnapshotEntry> {
        self.snapshots.list()
    }

    /// Cut the snapshot grouping window; the next capture starts a group.
    pub fn start_new_snapshot_group(&mut self) {
        self.snapshots.start_new_grouping();
    }

    /// Recompute and return the current highlight spans.
    pub fn decorations(&mut self) -> &[Decoration] {
        let comments = self.comments.list_all();
        let proposals = self.proposals.list_all();
        let active = self.proposals.active_proposal_id().map(str::to_string);
        self.decorations.compute(&comments, &proposals, active.as_deref())
    }

    /// Innermost decoration covering `offset`, from the last recompute.
    pub fn decoration_at(&self, offset: u32) -> Option<&Decoration> {
        self.decorations.hit_test(offset)
    }

    /// Call after applying a remote update so the next decoration pass
    /// rebuilds instead of trusting its cache.
    pub fn note_remote_change(&mut self) {
        self.decorations.invalidate();
    }
}

fn utf16_len(s: &str) -> u32 {
    s.encode_utf16().count() as u32
}
