// Comment store: CRUD over reviewer comments in the shared map.
//
// Every mutation is read-replace-write on the whole entity inside one
// transaction, and emits exactly one ledger entry. Operating on an id a
// concurrent writer already removed is a silent no-op.

use tracing::{debug, warn};
use uuid::Uuid;
use yrs::Transact;

use redline_common::range::TextRange;
use redline_common::types::Comment;

use crate::anchor::anchor_from_range;
use crate::doc::{map_get, map_insert, map_remove, map_values, DocContext};
use crate::history::HistoryLedger;

pub struct CommentStore {
    ctx: DocContext,
    author: String,
}

impl CommentStore {
    pub fn new(ctx: DocContext, author: &str) -> Self {
        Self { ctx, author: author.to_string() }
    }

    /// Create a comment over a live selection.
    ///
    /// Empty selections and empty (or whitespace-only) text are rejected as
    /// no-ops, not errors. Returns the stored comment on success.
    pub fn create(
        &self,
        ledger: &HistoryLedger,
        selection: TextRange,
        text: &str,
    ) -> Option<Comment> {
        let text = text.trim();
        if text.is_empty() {
            debug!("comment text is empty, comment not created");
            return None;
        }
        if selection.is_empty() {
            debug!("selection is empty, comment not created");
            return None;
        }

        let mut txn = self.ctx.doc().transact_mut();
        let Some(anchor) = anchor_from_range(&mut txn, self.ctx.content(), selection) else {
            warn!(?selection, "failed to anchor selection, comment not created");
            return None;
        };

        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            author_name: self.author.clone(),
            resolved: false,
            anchor,
        };

        map_insert(&mut txn, self.ctx.comments(), &comment.id, &comment);
        ledger.log_comment_created(&mut txn, &comment.id, &comment.text);
        Some(comment)
    }

    /// Toggle the resolved flag by whole-entity replacement.
    pub fn set_resolved(&self, ledger: &HistoryLedger, id: &str, resolved: bool) {
        let mut txn = self.ctx.doc().transact_mut();
        let Some(existing) = map_get::<Comment, _>(&txn, self.ctx.comments(), id) else {
            return;
        };

        let updated = Comment { resolved, ..existing };
        map_insert(&mut txn, self.ctx.comments(), id, &updated);
        ledger.log_comment_resolved(&mut txn, id, &updated.text);
    }

    pub fn remove(&self, ledger: &HistoryLedger, id: &str) {
        let mut txn = self.ctx.doc().transact_mut();
        let Some(existing) = map_get::<Comment, _>(&txn, self.ctx.comments(), id) else {
            return;
        };

        map_remove(&mut txn, self.ctx.comments(), id);
        ledger.log_comment_deleted(&mut txn, id, &existing.text);
    }

    pub fn get(&self, id: &str) -> Option<Comment> {
        let txn = self.ctx.doc().transact();
        map_get(&txn, self.ctx.comments(), id)
    }

    /// All comments, in map iteration order. The order is
    /// implementation-defined and not stable across replicas.
    pub fn list_all(&self) -> Vec<Comment> {
        let txn = self.ctx.doc().transact();
        map_values(&txn, self.ctx.comments())
    }
}
