// Decoration engine: renderable highlight spans for comments and pending
// proposals.
//
// Recomputation is demand-driven with a cheap path: when the document
// state, the entity set and the active entity are all unchanged since the
// last compute and no explicit invalidation was requested, the previous
// decoration set is returned verbatim. Anchors re-resolve through the
// document's sticky indices, so a recompute after an edit is already the
// "reposition by edit mapping" of the underlying store.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use yrs::updates::encoder::Encode;
use yrs::{ReadTxn, Transact};

use redline_common::range::TextRange;
use redline_common::types::{Comment, ProposalKind, ProposedChange};

use crate::doc::DocContext;
use crate::resolve::resolve_anchor;

/// What a highlight span points at. Consumed exhaustively by click
/// resolution; the variant doubles as the style tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecorationTarget {
    Comment(String),
    ProposalInsert(String),
    ProposalDelete(String),
}

impl DecorationTarget {
    pub fn entity_id(&self) -> &str {
        match self {
            Self::Comment(id) | Self::ProposalInsert(id) | Self::ProposalDelete(id) => id,
        }
    }
}

/// One renderable highlight span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub range: TextRange,
    pub target: DecorationTarget,
    /// Set on the entity currently selected in the UI.
    pub active: bool,
}

pub struct DecorationEngine {
    ctx: DocContext,
    cache: Vec<Decoration>,
    last_doc_state: Option<Vec<u8>>,
    last_inputs: Option<u64>,
    invalidated: bool,
}

impl DecorationEngine {
    pub fn new(ctx: DocContext) -> Self {
        Self { ctx, cache: Vec::new(), last_doc_state: None, last_inputs: None, invalidated: true }
    }

    /// Force the next `compute` to rebuild from scratch.
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    /// Compute highlight spans for the given entities.
    ///
    /// Resolved comments, non-pending proposals and entities whose anchor no
    /// longer resolves are skipped (orphans are hidden, never deleted).
    /// Output is ordered by `(from, to)`.
    pub fn compute(
        &mut self,
        comments: &[Comment],
        proposals: &[ProposedChange],
        active_id: Option<&str>,
    ) -> &[Decoration] {
        let doc = self.ctx.doc().clone();
        let txn = doc.transact();
        let doc_state = txn.state_vector().encode_v1();
        let inputs = fingerprint(comments, proposals, active_id);

        let unchanged = !self.invalidated
            && self.last_doc_state.as_deref() == Some(doc_state.as_slice())
            && self.last_inputs == Some(inputs);
        if unchanged {
            return &self.cache;
        }

        let mut decorations = Vec::new();

        for comment in comments {
            if comment.resolved {
                continue;
            }
            let Some(range) = resolve_anchor(&txn, &comment.anchor) else { continue };
            decorations.push(Decoration {
                range,
                target: DecorationTarget::Comment(comment.id.clone()),
                active: active_id == Some(comment.id.as_str()),
            });
        }

        for change in proposals {
            if !change.is_pending() {
                continue;
            }
            let Some(range) = resolve_anchor(&txn, &change.anchor) else { continue };
            let target = match change.kind {
                ProposalKind::Insert => DecorationTarget::ProposalInsert(change.id.clone()),
                ProposalKind::Delete => DecorationTarget::ProposalDelete(change.id.clone()),
            };
            decorations.push(Decoration {
                range,
                target,
                active: active_id == Some(change.id.as_str()),
            });
        }

        decorations.sort_by_key(|d| (d.range.from, d.range.to));

        self.cache = decorations;
        self.last_doc_state = Some(doc_state);
        self.last_inputs = Some(inputs);
        self.invalidated = false;
        &self.cache
    }

    /// The decoration set from the last `compute`.
    pub fn current(&self) -> &[Decoration] {
        &self.cache
    }

    /// Click resolution: the innermost (shortest) decoration covering
    /// `offset`. Among equally short covers the most recently computed one
    /// wins, i.e. the later element of the computed order.
    pub fn hit_test(&self, offset: u32) -> Option<&Decoration> {
        self.cache
            .iter()
            .rev()
            .filter(|d| d.range.contains(offset))
            .min_by_key(|d| d.range.len())
    }
}

fn fingerprint(comments: &[Comment], proposals: &[ProposedChange], active_id: Option<&str>) -> u64 {
    let mut hasher = DefaultHasher::new();
    comments.hash(&mut hasher);
    proposals.hash(&mut hasher);
    active_id.hash(&mut hasher);
    hasher.finish()
}
