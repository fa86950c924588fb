// Activity ledger: append-only log with local run coalescing.
//
// Structural events (comment and proposal lifecycle) each get a permanent
// entry. Free-text inserts and deletes coalesce into typing runs: while the
// previous entry for this (author, kind) is recent enough and the edited
// region is adjacent to the run, the entry is replaced in place with
// concatenated text instead of appending a duplicate per keystroke.
//
// Run pointers are session-local. Two replicas logging concurrently can
// each maintain their own run; per-key LWW on the shared map resolves the
// entries themselves.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use yrs::{MapRef, ReadTxn, TransactionMut};

use redline_common::range::TextRange;
use redline_common::types::{HistoryEntry, HistoryKind, HistoryPayload, ProposalKind};

use crate::doc::{map_clear, map_get, map_insert, map_values, DocContext};

/// Tuning knobs for run coalescing.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Maximum age of the current run entry for a new edit to extend it.
    pub run_window: Duration,
    /// Also require the new range to pass the gap-1 adjacency test against
    /// the run's accumulated region. Without this, a fast typist editing
    /// two unrelated places within the window would merge them; matching on
    /// time alone is the historical behavior, kept switchable.
    pub require_adjacent_region: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { run_window: Duration::seconds(30), require_adjacent_region: true }
    }
}

/// One open typing run: the entry it extends and the region covered so far.
#[derive(Debug, Clone)]
struct RunState {
    entry_id: String,
    range: TextRange,
    last_at: DateTime<Utc>,
}

/// Session-local writer over the shared history map.
pub struct HistoryLedger {
    history: MapRef,
    user_name: String,
    config: LedgerConfig,
    last_insert_run: Option<RunState>,
    last_delete_run: Option<RunState>,
}

impl HistoryLedger {
    pub fn new(ctx: &DocContext, user_name: &str) -> Self {
        Self::with_config(ctx, user_name, LedgerConfig::default())
    }

    pub fn with_config(ctx: &DocContext, user_name: &str, config: LedgerConfig) -> Self {
        Self {
            history: ctx.history().clone(),
            user_name: user_name.to_string(),
            config,
            last_insert_run: None,
            last_delete_run: None,
        }
    }

    /// All entries, oldest first (ties broken by id for stability).
    pub fn list<T: ReadTxn>(&self, txn: &T) -> Vec<HistoryEntry> {
        let mut entries: Vec<HistoryEntry> = map_values(txn, &self.history);
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    /// Break run continuity (cursor jump, mode switch). The next free-text
    /// event starts a fresh entry.
    pub fn reset_run_grouping(&mut self) {
        self.last_insert_run = None;
        self.last_delete_run = None;
    }

    /// Remove every entry from the shared history map. Replicates like any
    /// other map mutation; open typing runs are dropped with the entries
    /// they pointed at.
    pub fn clear(&mut self, txn: &mut TransactionMut<'_>) {
        map_clear(txn, &self.history);
        self.reset_run_grouping();
    }

    // ── Structural events (never coalesced) ──────────────────────────

    pub fn log_comment_created(&self, txn: &mut TransactionMut<'_>, comment_id: &str, text: &str) {
        self.push_entry(txn, HistoryKind::CommentCreated, comment_payload(comment_id, text));
    }

    pub fn log_comment_resolved(&self, txn: &mut TransactionMut<'_>, comment_id: &str, text: &str) {
        self.push_entry(txn, HistoryKind::CommentResolved, comment_payload(comment_id, text));
    }

    pub fn log_comment_deleted(&self, txn: &mut TransactionMut<'_>, comment_id: &str, text: &str) {
        self.push_entry(txn, HistoryKind::CommentDeleted, comment_payload(comment_id, text));
    }

    pub fn log_proposal_created(
        &self,
        txn: &mut TransactionMut<'_>,
        kind: ProposalKind,
        proposal_id: &str,
        text: &str,
    ) {
        let entry_kind = match kind {
            ProposalKind::Insert => HistoryKind::ProposalInsertCreated,
            ProposalKind::Delete => HistoryKind::ProposalDeleteCreated,
        };
        self.push_entry(txn, entry_kind, proposal_payload(kind, proposal_id, text));
    }

    pub fn log_proposal_approved(
        &self,
        txn: &mut TransactionMut<'_>,
        kind: ProposalKind,
        proposal_id: &str,
        text: &str,
    ) {
        let entry_kind = match kind {
            ProposalKind::Insert => HistoryKind::ProposalInsertApproved,
            ProposalKind::Delete => HistoryKind::ProposalDeleteApproved,
        };
        self.push_entry(txn, entry_kind, proposal_payload(kind, proposal_id, text));
    }

    pub fn log_proposal_withdrawn(
        &self,
        txn: &mut TransactionMut<'_>,
        kind: ProposalKind,
        proposal_id: &str,
        text: &str,
    ) {
        let entry_kind = match kind {
            ProposalKind::Insert => HistoryKind::ProposalInsertDeleted,
            ProposalKind::Delete => HistoryKind::ProposalDeleteDeleted,
        };
        self.push_entry(txn, entry_kind, proposal_payload(kind, proposal_id, text));
    }

    /// Rewrite the payload text of the latest `Proposal*Created` entry for
    /// `proposal_id`. This is the ledger half of proposal merging: a merged
    /// keystroke extends the creation entry instead of appending a new one.
    pub fn update_proposal_text(
        &self,
        txn: &mut TransactionMut<'_>,
        kind: ProposalKind,
        proposal_id: &str,
        text: &str,
    ) {
        let wanted = match kind {
            ProposalKind::Insert => HistoryKind::ProposalInsertCreated,
            ProposalKind::Delete => HistoryKind::ProposalDeleteCreated,
        };

        let entries: Vec<HistoryEntry> = map_values(txn, &self.history);
        let target = entries
            .into_iter()
            .filter(|entry| {
                entry.kind == wanted
                    && matches!(
                        &entry.payload,
                        HistoryPayload::Proposal { proposal_id: pid, .. } if pid == proposal_id
                    )
            })
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let Some(mut entry) = target else { return };
        entry.payload = proposal_payload(kind, proposal_id, text);
        let key = entry.id.clone();
        map_insert(txn, &self.history, &key, &entry);
    }

    // ── Free-text events (run-coalesced) ─────────────────────────────

    pub fn log_text_inserted(&mut self, txn: &mut TransactionMut<'_>, range: TextRange, text: &str) {
        self.log_text_inserted_at(txn, range, text, Utc::now());
    }

    pub fn log_text_deleted(&mut self, txn: &mut TransactionMut<'_>, range: TextRange, text: &str) {
        self.log_text_deleted_at(txn, range, text, Utc::now());
    }

    /// Clock-explicit variant of `log_text_inserted`, for deterministic
    /// window tests.
    pub fn log_text_inserted_at(
        &mut self,
        txn: &mut TransactionMut<'_>,
        range: TextRange,
        text: &str,
        at: DateTime<Utc>,
    ) {
        if text.is_empty() || range.is_empty() {
            return;
        }
        let run = self.last_insert_run.clone();
        match self.coalesce(txn, HistoryKind::TextInserted, run, range, text, at) {
            Some(updated) => self.last_insert_run = Some(updated),
            None => {
                let entry = self.push_entry_at(txn, HistoryKind::TextInserted, text_payload(text), at);
                self.last_insert_run = Some(RunState { entry_id: entry.id, range, last_at: at });
            }
        }
    }

    /// Clock-explicit variant of `log_text_deleted`.
    pub fn log_text_deleted_at(
        &mut self,
        txn: &mut TransactionMut<'_>,
        range: TextRange,
        text: &str,
        at: DateTime<Utc>,
    ) {
        if text.is_empty() || range.is_empty() {
            return;
        }
        let run = self.last_delete_run.clone();
        match self.coalesce(txn, HistoryKind::TextDeleted, run, range, text, at) {
            Some(updated) => self.last_delete_run = Some(updated),
            None => {
                let entry = self.push_entry_at(txn, HistoryKind::TextDeleted, text_payload(text), at);
                self.last_delete_run = Some(RunState { entry_id: entry.id, range, last_at: at });
            }
        }
    }

    /// Try to extend the current run. Returns the updated run state on
    /// success, `None` when a fresh entry is needed.
    fn coalesce(
        &self,
        txn: &mut TransactionMut<'_>,
        kind: HistoryKind,
        run: Option<RunState>,
        range: TextRange,
        text: &str,
        at: DateTime<Utc>,
    ) -> Option<RunState> {
        let run = run?;

        if at.signed_duration_since(run.last_at) > self.config.run_window {
            return None;
        }
        if self.config.require_adjacent_region && !run.range.adjacent_within(range, 1) {
            return None;
        }

        // The run entry may have been pruned by a concurrent writer; fall
        // back to a fresh entry rather than resurrecting it.
        let mut entry: HistoryEntry = map_get(txn, &self.history, &run.entry_id)?;
        if entry.kind != kind {
            return None;
        }

        let HistoryPayload::Text { text: existing } = &entry.payload else { return None };
        entry.payload = text_payload(&format!("{existing}{text}"));
        map_insert(txn, &self.history, &run.entry_id, &entry);

        let merged_range = run.range.union(range);
        Some(RunState { entry_id: run.entry_id, range: merged_range, last_at: at })
    }

    fn push_entry(
        &self,
        txn: &mut TransactionMut<'_>,
        kind: HistoryKind,
        payload: HistoryPayload,
    ) -> HistoryEntry {
        self.push_entry_at(txn, kind, payload, Utc::now())
    }

    fn push_entry_at(
        &self,
        txn: &mut TransactionMut<'_>,
        kind: HistoryKind,
        payload: HistoryPayload,
        at: DateTime<Utc>,
    ) -> HistoryEntry {
        let entry = HistoryEntry {
            id: Uuid::new_v4().to_string(),
            kind,
            created_at: at,
            user_name: self.user_name.clone(),
            payload,
        };
        let key = entry.id.clone();
        map_insert(txn, &self.history, &key, &entry);
        entry
    }
}

fn comment_payload(comment_id: &str, text: &str) -> HistoryPayload {
    HistoryPayload::Comment { comment_id: comment_id.to_string(), text: text.to_string() }
}

fn proposal_payload(kind: ProposalKind, proposal_id: &str, text: &str) -> HistoryPayload {
    HistoryPayload::Proposal {
        proposal_id: proposal_id.to_string(),
        kind,
        text: text.to_string(),
    }
}

fn text_payload(text: &str) -> HistoryPayload {
    HistoryPayload::Text { text: text.to_string() }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use yrs::Transact;

    use super::*;

    fn setup() -> (DocContext, HistoryLedger) {
        let ctx = DocContext::new();
        let ledger = HistoryLedger::new(&ctx, "alice");
        (ctx, ledger)
    }

    fn t(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + millis).single().expect("valid timestamp")
    }

    fn r(from: u32, to: u32) -> TextRange {
        TextRange { from, to }
    }

    #[test]
    fn adjacent_inserts_within_window_coalesce() {
        let (ctx, mut ledger) = setup();
        {
            let mut txn = ctx.doc().transact_mut();
            ledger.log_text_inserted_at(&mut txn, r(5, 6), "h", t(0));
            ledger.log_text_inserted_at(&mut txn, r(6, 7), "i", t(500));
        }

        let txn = ctx.doc().transact();
        let entries = ledger.list(&txn);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, HistoryKind::TextInserted);
        assert_eq!(entries[0].payload.text(), "hi");
    }

    #[test]
    fn inserts_outside_window_stay_separate() {
        let (ctx, mut ledger) = setup();
        {
            let mut txn = ctx.doc().transact_mut();
            ledger.log_text_inserted_at(&mut txn, r(5, 6), "h", t(0));
            // Five minutes later, same place: new run.
            ledger.log_text_inserted_at(&mut txn, r(6, 7), "i", t(300_000));
        }

        let txn = ctx.doc().transact();
        let entries = ledger.list(&txn);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].payload.text(), "h");
        assert_eq!(entries[1].payload.text(), "i");
    }

    #[test]
    fn distant_region_breaks_run_when_contiguity_required() {
        let (ctx, mut ledger) = setup();
        {
            let mut txn = ctx.doc().transact_mut();
            ledger.log_text_inserted_at(&mut txn, r(5, 6), "a", t(0));
            ledger.log_text_inserted_at(&mut txn, r(40, 41), "b", t(100));
        }

        let txn = ctx.doc().transact();
        assert_eq!(ledger.list(&txn).len(), 2);
    }

    #[test]
    fn distant_region_coalesces_when_contiguity_disabled() {
        let ctx = DocContext::new();
        let config =
            LedgerConfig { require_adjacent_region: false, ..LedgerConfig::default() };
        let mut ledger = HistoryLedger::with_config(&ctx, "alice", config);
        {
            let mut txn = ctx.doc().transact_mut();
            ledger.log_text_inserted_at(&mut txn, r(5, 6), "a", t(0));
            ledger.log_text_inserted_at(&mut txn, r(40, 41), "b", t(100));
        }

        let txn = ctx.doc().transact();
        let entries = ledger.list(&txn);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload.text(), "ab");
    }

    #[test]
    fn deletes_coalesce_independently_of_inserts() {
        let (ctx, mut ledger) = setup();
        {
            let mut txn = ctx.doc().transact_mut();
            ledger.log_text_inserted_at(&mut txn, r(5, 6), "x", t(0));
            ledger.log_text_deleted_at(&mut txn, r(5, 6), "x", t(100));
            ledger.log_text_deleted_at(&mut txn, r(4, 5), "w", t(200));
        }

        let txn = ctx.doc().transact();
        let entries = ledger.list(&txn);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, HistoryKind::TextInserted);
        assert_eq!(entries[1].kind, HistoryKind::TextDeleted);
        assert_eq!(entries[1].payload.text(), "xw");
    }

    #[test]
    fn reset_breaks_the_current_run() {
        let (ctx, mut ledger) = setup();
        {
            let mut txn = ctx.doc().transact_mut();
            ledger.log_text_inserted_at(&mut txn, r(5, 6), "a", t(0));
            ledger.reset_run_grouping();
            ledger.log_text_inserted_at(&mut txn, r(6, 7), "b", t(100));
        }

        let txn = ctx.doc().transact();
        assert_eq!(ledger.list(&txn).len(), 2);
    }

    #[test]
    fn structural_events_never_coalesce() {
        let (ctx, ledger) = setup();
        {
            let mut txn = ctx.doc().transact_mut();
            ledger.log_comment_created(&mut txn, "c-1", "note");
            ledger.log_comment_created(&mut txn, "c-1", "note");
            ledger.log_proposal_created(&mut txn, ProposalKind::Insert, "p-1", "abc");
        }

        let txn = ctx.doc().transact();
        let entries = ledger.list(&txn);
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn empty_text_or_range_is_ignored() {
        let (ctx, mut ledger) = setup();
        {
            let mut txn = ctx.doc().transact_mut();
            ledger.log_text_inserted_at(&mut txn, r(5, 5), "x", t(0));
            ledger.log_text_inserted_at(&mut txn, r(5, 6), "", t(0));
        }

        let txn = ctx.doc().transact();
        assert!(ledger.list(&txn).is_empty());
    }

    #[test]
    fn clear_empties_the_map_and_breaks_runs() {
        let (ctx, mut ledger) = setup();
        {
            let mut txn = ctx.doc().transact_mut();
            ledger.log_text_inserted_at(&mut txn, r(0, 1), "a", t(0));
            ledger.log_comment_created(&mut txn, "c-1", "note");
            ledger.clear(&mut txn);

            // A post-clear keystroke starts fresh instead of extending the
            // removed run.
            ledger.log_text_inserted_at(&mut txn, r(1, 2), "b", t(100));
        }

        let txn = ctx.doc().transact();
        let entries = ledger.list(&txn);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload.text(), "b");
    }

    #[test]
    fn update_proposal_text_rewrites_latest_created_entry() {
        let (ctx, ledger) = setup();
        {
            let mut txn = ctx.doc().transact_mut();
            ledger.log_proposal_created(&mut txn, ProposalKind::Insert, "p-1", "a");
            ledger.update_proposal_text(&mut txn, ProposalKind::Insert, "p-1", "abc");
            // Unknown proposal id: silent no-op.
            ledger.update_proposal_text(&mut txn, ProposalKind::Insert, "p-9", "zzz");
        }

        let txn = ctx.doc().transact();
        let entries = ledger.list(&txn);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, HistoryKind::ProposalInsertCreated);
        assert_eq!(entries[0].payload.text(), "abc");
    }

    #[test]
    fn list_orders_by_timestamp() {
        let (ctx, mut ledger) = setup();
        {
            let mut txn = ctx.doc().transact_mut();
            ledger.log_text_inserted_at(&mut txn, r(0, 1), "b", t(1_000));
            ledger.reset_run_grouping();
            ledger.log_text_inserted_at(&mut txn, r(10, 11), "a", t(0));
        }

        let txn = ctx.doc().transact();
        let entries = ledger.list(&txn);
        assert_eq!(entries[0].payload.text(), "a");
        assert_eq!(entries[1].payload.text(), "b");
    }
}
