// Snapshot store: periodic captures of the document content.
//
// Captures land in the shared snapshots map and replicate like any other
// entity; the browseable listing groups them into time windows via a group
// id that lives only in this session's memory and rotates after a maximum
// age. A capture that would repeat the latest stored content is skipped, so
// idle intervals cost nothing.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use yrs::{MapRef, Transact};

use redline_common::types::{SnapshotEntry, SnapshotReason};

use crate::doc::{map_insert, map_values, DocContext};

#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Maximum age of the current group before a capture starts a new one.
    pub group_max_age: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { group_max_age: Duration::hours(1) }
    }
}

/// The session-local grouping window.
#[derive(Debug, Clone)]
struct GroupState {
    group_id: String,
    started_at: DateTime<Utc>,
}

impl GroupState {
    fn fresh(at: DateTime<Utc>) -> Self {
        Self { group_id: Uuid::new_v4().to_string(), started_at: at }
    }
}

pub struct SnapshotStore {
    ctx: DocContext,
    snapshots: MapRef,
    config: SnapshotConfig,
    group: GroupState,
}

impl SnapshotStore {
    pub fn new(ctx: DocContext) -> Self {
        Self::with_config(ctx, SnapshotConfig::default())
    }

    pub fn with_config(ctx: DocContext, config: SnapshotConfig) -> Self {
        let snapshots = ctx.snapshots().clone();
        Self { ctx, snapshots, config, group: GroupState::fresh(Utc::now()) }
    }

    /// Start a new group immediately, regardless of the current group's age.
    pub fn start_new_grouping(&mut self) {
        self.group = GroupState::fresh(Utc::now());
    }

    /// Capture the current document content.
    ///
    /// Skipped (returns `None`) when the content matches the latest stored
    /// snapshot. The capture joins the current group unless the group has
    /// outlived `group_max_age`, in which case a new group starts with it.
    pub fn capture(&mut self, reason: SnapshotReason) -> Option<SnapshotEntry> {
        self.capture_at(reason, Utc::now())
    }

    /// Clock-explicit variant of `capture`, for deterministic window tests.
    pub fn capture_at(&mut self, reason: SnapshotReason, at: DateTime<Utc>) -> Option<SnapshotEntry> {
        if at.signed_duration_since(self.group.started_at) > self.config.group_max_age {
            self.group = GroupState::fresh(at);
        }

        let mut txn = self.ctx.doc().transact_mut();
        let text = self.ctx.text_string(&txn);

        let latest = map_values::<SnapshotEntry, _>(&txn, &self.snapshots)
            .into_iter()
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        if latest.is_some_and(|last| last.text == text) {
            return None;
        }

        let entry = SnapshotEntry {
            id: Uuid::new_v4().to_string(),
            created_at: at,
            group_id: self.group.group_id.clone(),
            reason,
            text,
        };
        let key = entry.id.clone();
        map_insert(&mut txn, &self.snapshots, &key, &entry);
        Some(entry)
    }

    /// All snapshots, oldest first (ties broken by id for stability).
    pub fn list(&self) -> Vec<SnapshotEntry> {
        let txn = self.ctx.doc().transact();
        let mut entries: Vec<SnapshotEntry> = map_values(&txn, &self.snapshots);
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        entries
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn seeded(content: &str) -> DocContext {
        let ctx = DocContext::new();
        let mut txn = ctx.doc().transact_mut();
        ctx.insert_at(&mut txn, 0, content);
        drop(txn);
        ctx
    }

    fn t(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + millis).single().expect("valid timestamp")
    }

    fn edit(ctx: &DocContext, at: u32, chunk: &str) {
        let mut txn = ctx.doc().transact_mut();
        ctx.insert_at(&mut txn, at, chunk);
    }

    #[test]
    fn capture_stores_the_current_content() {
        let ctx = seeded("hello");
        let mut store = SnapshotStore::new(ctx);

        let entry = store.capture_at(SnapshotReason::Mounted, t(0)).expect("first capture");
        assert_eq!(entry.text, "hello");
        assert_eq!(entry.reason, SnapshotReason::Mounted);
        assert_eq!(store.list(), vec![entry]);
    }

    #[test]
    fn unchanged_content_is_not_captured_twice() {
        let ctx = seeded("hello");
        let mut store = SnapshotStore::new(ctx);

        assert!(store.capture_at(SnapshotReason::Interval, t(0)).is_some());
        assert!(store.capture_at(SnapshotReason::Interval, t(1_000)).is_none());
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn captures_within_the_window_share_a_group() {
        let ctx = seeded("hello");
        let mut store = SnapshotStore::new(ctx.clone());

        let first = store.capture_at(SnapshotReason::Interval, t(0)).unwrap();
        edit(&ctx, 5, "!");
        let second = store.capture_at(SnapshotReason::Interval, t(60_000)).unwrap();

        assert_eq!(first.group_id, second.group_id);
    }

    #[test]
    fn group_rotates_after_max_age() {
        let ctx = seeded("hello");
        let mut store = SnapshotStore::new(ctx.clone());

        let first = store.capture_at(SnapshotReason::Interval, t(0)).unwrap();
        edit(&ctx, 5, "!");
        // Two hours later: past the one-hour default.
        let second = store
            .capture_at(SnapshotReason::Interval, t(2 * 60 * 60 * 1_000))
            .unwrap();

        assert_ne!(first.group_id, second.group_id);
    }

    #[test]
    fn start_new_grouping_forces_a_fresh_group() {
        let ctx = seeded("hello");
        let mut store = SnapshotStore::new(ctx.clone());

        let first = store.capture_at(SnapshotReason::Interval, t(0)).unwrap();
        edit(&ctx, 5, "!");
        store.start_new_grouping();
        let second = store
            .capture_at(SnapshotReason::ManualGroupSplit, t(1_000))
            .unwrap();

        assert_ne!(first.group_id, second.group_id);
    }

    #[test]
    fn list_is_ordered_oldest_first() {
        let ctx = seeded("a");
        let mut store = SnapshotStore::new(ctx.clone());

        store.capture_at(SnapshotReason::Mounted, t(0)).unwrap();
        edit(&ctx, 1, "b");
        store.capture_at(SnapshotReason::Interval, t(1_000)).unwrap();
        edit(&ctx, 2, "c");
        store.capture_at(SnapshotReason::Unmounted, t(2_000)).unwrap();

        let texts: Vec<String> = store.list().into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["a", "ab", "abc"]);
    }

    #[test]
    fn snapshots_replicate_between_contexts() {
        let ctx = seeded("hello");
        let mut store = SnapshotStore::new(ctx.clone());
        store.capture_at(SnapshotReason::BeforeUnload, t(0)).unwrap();

        let remote = DocContext::from_state(&ctx.encode_state()).unwrap();
        let remote_store = SnapshotStore::new(remote);
        assert_eq!(remote_store.list().len(), 1);
        assert_eq!(remote_store.list()[0].text, "hello");
    }
}
