// Conflict guard: transaction-time filter protecting pending proposals.
//
// Runs before an edit is applied; a rejection discards the edit with no
// data change. In direct mode nothing may touch a range someone else is
// mid-review on. In propose mode, typing over a selection must route
// through the delete+insert proposal flow, and nothing may be typed inside
// text already marked for removal.

use yrs::Transact;

use redline_common::range::TextRange;
use redline_common::types::{EditorMode, ProposalKind, ProposedChange};

use crate::doc::{map_values, DocContext};
use crate::error::EditRejected;
use crate::resolve::resolve_anchor;

/// One primitive operation of an attempted edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    /// Insertion of `len` units at `at`, measured post-edit.
    Insert { at: u32, len: u32 },
    /// Removal of `range`, measured pre-edit.
    Delete { range: TextRange },
}

impl EditOp {
    fn span(self) -> TextRange {
        match self {
            Self::Insert { at, len } => TextRange { from: at, to: at + len },
            Self::Delete { range } => range,
        }
    }

    fn is_insert(self) -> bool {
        matches!(self, Self::Insert { .. })
    }
}

/// An edit attempt as seen by the guard.
#[derive(Debug, Clone)]
pub struct EditIntent {
    pub ops: Vec<EditOp>,
    /// Whether the editor selection was empty when the edit was made.
    pub selection_empty: bool,
}

impl EditIntent {
    pub fn insertion(at: u32, len: u32) -> Self {
        Self { ops: vec![EditOp::Insert { at, len }], selection_empty: true }
    }

    pub fn deletion(range: TextRange) -> Self {
        Self { ops: vec![EditOp::Delete { range }], selection_empty: true }
    }

    /// Replace a non-empty selection: delete plus insert in one intent.
    pub fn replacement(range: TextRange, inserted_len: u32) -> Self {
        Self {
            ops: vec![
                EditOp::Delete { range },
                EditOp::Insert { at: range.from, len: inserted_len },
            ],
            selection_empty: false,
        }
    }

    fn has_insertion(&self) -> bool {
        self.ops.iter().any(|op| op.is_insert())
    }
}

pub struct ConflictGuard {
    ctx: DocContext,
}

impl ConflictGuard {
    pub fn new(ctx: DocContext) -> Self {
        Self { ctx }
    }

    /// Vet an edit against the currently pending proposals. `Ok(())` means
    /// the edit may be applied; an error means it must be discarded before
    /// any document write.
    pub fn check(&self, mode: EditorMode, intent: &EditIntent) -> Result<(), EditRejected> {
        if intent.ops.is_empty() {
            return Ok(());
        }

        let txn = self.ctx.doc().transact();
        let pending: Vec<ProposedChange> = map_values::<ProposedChange, _>(&txn, self.ctx.proposals())
            .into_iter()
            .filter(|change| change.is_pending())
            .collect();

        let mut all_ranges = Vec::new();
        let mut delete_ranges = Vec::new();
        for change in &pending {
            let Some(range) = resolve_anchor(&txn, &change.anchor) else { continue };
            all_ranges.push(range);
            if change.kind == ProposalKind::Delete {
                delete_ranges.push(range);
            }
        }

        match mode {
            EditorMode::Direct => {
                for op in &intent.ops {
                    let span = op.span();
                    if all_ranges.iter().any(|r| span.intersects(*r)) {
                        return Err(EditRejected::PendingProposalOverlap);
                    }
                }
                Ok(())
            }
            EditorMode::Propose => {
                if intent.has_insertion() && !intent.selection_empty {
                    return Err(EditRejected::SelectionReplaceInProposeMode);
                }
                for op in &intent.ops {
                    if !op.is_insert() {
                        continue;
                    }
                    let span = op.span();
                    if delete_ranges.iter().any(|r| span.intersects(*r)) {
                        return Err(EditRejected::InsertInsidePendingDelete);
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryLedger;
    use crate::proposals::ProposalEngine;

    fn setup(content: &str) -> (DocContext, ConflictGuard, ProposalEngine, HistoryLedger) {
        let ctx = DocContext::new();
        {
            let mut txn = ctx.doc().transact_mut();
            ctx.insert_at(&mut txn, 0, content);
        }
        let guard = ConflictGuard::new(ctx.clone());
        let engine = ProposalEngine::new(ctx.clone(), "bob");
        let ledger = HistoryLedger::new(&ctx, "bob");
        (ctx, guard, engine, ledger)
    }

    fn r(from: u32, to: u32) -> TextRange {
        TextRange { from, to }
    }

    #[test]
    fn everything_passes_with_no_pending_proposals() {
        let (_ctx, guard, _engine, _ledger) = setup("plain text");
        assert!(guard.check(EditorMode::Direct, &EditIntent::insertion(3, 2)).is_ok());
        assert!(guard.check(EditorMode::Propose, &EditIntent::insertion(3, 2)).is_ok());
        assert!(guard.check(EditorMode::Direct, &EditIntent::deletion(r(0, 4))).is_ok());
    }

    #[test]
    fn direct_mode_blocks_edits_inside_any_pending_proposal() {
        let (_ctx, guard, mut engine, ledger) = setup("0123456789abcdef");
        engine.propose_deletion(&ledger, r(4, 9)).unwrap();

        assert_eq!(
            guard.check(EditorMode::Direct, &EditIntent::deletion(r(6, 8))),
            Err(EditRejected::PendingProposalOverlap)
        );
        assert_eq!(
            guard.check(EditorMode::Direct, &EditIntent::insertion(5, 1)),
            Err(EditRejected::PendingProposalOverlap)
        );
        // Outside the proposal: allowed.
        assert!(guard.check(EditorMode::Direct, &EditIntent::deletion(r(10, 12))).is_ok());
    }

    #[test]
    fn propose_mode_blocks_selection_replacement() {
        let (_ctx, guard, _engine, _ledger) = setup("0123456789");
        assert_eq!(
            guard.check(EditorMode::Propose, &EditIntent::replacement(r(2, 6), 1)),
            Err(EditRejected::SelectionReplaceInProposeMode)
        );
        // The same replacement is fine in direct mode.
        assert!(guard.check(EditorMode::Direct, &EditIntent::replacement(r(2, 6), 1)).is_ok());
    }

    #[test]
    fn propose_mode_blocks_typing_inside_pending_delete() {
        let (_ctx, guard, mut engine, ledger) = setup("0123456789abcdef");
        engine.propose_deletion(&ledger, r(4, 9)).unwrap();

        assert_eq!(
            guard.check(EditorMode::Propose, &EditIntent::insertion(6, 1)),
            Err(EditRejected::InsertInsidePendingDelete)
        );
        // Typing elsewhere is fine; so is a plain deletion over the range
        // (it will merge into the proposal upstream).
        assert!(guard.check(EditorMode::Propose, &EditIntent::insertion(12, 1)).is_ok());
        assert!(guard.check(EditorMode::Propose, &EditIntent::deletion(r(5, 7))).is_ok());
    }

    #[test]
    fn propose_mode_allows_typing_inside_pending_insert() {
        let (ctx, guard, mut engine, ledger) = setup("ab");
        {
            let mut txn = ctx.doc().transact_mut();
            ctx.insert_at(&mut txn, 1, "XYZ");
        }
        engine.record_insertion(&ledger, r(1, 4)).unwrap();

        // Continuing to type inside one's own pending insert is the normal
        // merge flow, not a conflict.
        assert!(guard.check(EditorMode::Propose, &EditIntent::insertion(2, 1)).is_ok());
    }

    #[test]
    fn approved_proposals_do_not_block() {
        let (_ctx, guard, mut engine, ledger) = setup("0123456789abcdef");
        let id = engine.propose_deletion(&ledger, r(4, 9)).unwrap();
        engine.approve(&ledger, &id);

        assert!(guard.check(EditorMode::Direct, &EditIntent::insertion(4, 1)).is_ok());
    }
}
