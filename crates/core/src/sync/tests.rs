use std::sync::Arc;

use chrono::Utc;

use super::test_support::{note, ts, TestNote};
use super::*;
use crate::config::SyncSettings;
use crate::errors::RemoteStoreError;
use crate::storage::MemoryStore;

struct Harness {
    local: Arc<MemoryStore>,
    remote: Arc<MemoryRemoteStore>,
    orchestrator: SyncOrchestrator,
}

fn harness() -> Harness {
    let local = Arc::new(MemoryStore::new());
    let remote = Arc::new(MemoryRemoteStore::new());
    let orchestrator =
        SyncOrchestrator::new(local.clone(), remote.clone(), &SyncSettings::default());
    Harness {
        local,
        remote,
        orchestrator,
    }
}

async fn raw(local: &MemoryStore, key: &str) -> Option<String> {
    local.get(key).await.expect("read local")
}

#[tokio::test]
async fn newer_remote_version_replaces_cached_one() {
    let h = harness();
    h.remote.set_online(false);
    h.orchestrator
        .save(note("1", 10, "local"))
        .await
        .expect("save");
    h.remote.set_online(true);
    h.remote.insert_row(
        TableName::BudgetItems,
        serde_json::to_value(note("1", 20, "remote")).expect("row"),
    );

    let report = h.orchestrator.sync::<TestNote>("u1").await.expect("sync");

    assert_eq!(report.records, vec![note("1", 20, "remote")]);
    let cached: Vec<TestNote> = h.orchestrator.load().await.expect("load");
    assert_eq!(cached[0].updated_at, ts(20));
}

#[tokio::test]
async fn offline_save_reaches_remote_after_flush() {
    let h = harness();
    h.remote.set_online(false);
    let before = h.orchestrator.pending_count().await.expect("pending");

    h.orchestrator
        .save(note("7", 100, "offline"))
        .await
        .expect("save");

    let cached: Vec<TestNote> = h.orchestrator.load().await.expect("load");
    assert_eq!(cached, vec![note("7", 100, "offline")]);
    assert_eq!(
        h.orchestrator.pending_count().await.expect("pending"),
        before + 1
    );
    assert!(!h.remote.contains(TableName::BudgetItems, "7"));

    h.remote.set_online(true);
    let report = h.orchestrator.flush().await.expect("flush");

    assert_eq!(report.replayed, 1);
    assert_eq!(h.orchestrator.pending_count().await.expect("pending"), 0);
    assert!(h.remote.contains(TableName::BudgetItems, "7"));
    assert_eq!(
        h.orchestrator
            .record_state(TableName::BudgetItems, "7")
            .await
            .expect("state"),
        Some(RecordSyncState::Synced)
    );
}

#[tokio::test]
async fn failed_fetch_leaves_cache_and_watermark_untouched() {
    let h = harness();
    h.remote.insert_row(
        TableName::BudgetItems,
        serde_json::to_value(note("1", 5, "seed")).expect("row"),
    );
    h.orchestrator
        .sync::<TestNote>("u1")
        .await
        .expect("first sync");

    let cache_key = TableName::BudgetItems.cache_key();
    let cache_before = raw(&h.local, &cache_key).await;
    let watermark_before = h
        .orchestrator
        .watermark("u1", TableName::BudgetItems)
        .await
        .expect("watermark");
    assert!(watermark_before.is_some());

    h.remote
        .set_failure(Some(RemoteStoreError::transport("connection reset")));
    let report = h.orchestrator.sync::<TestNote>("u1").await.expect("sync");

    assert!(report.is_stale());
    assert_eq!(report.records, vec![note("1", 5, "seed")]);
    assert_eq!(raw(&h.local, &cache_key).await, cache_before);
    assert_eq!(
        h.orchestrator
            .watermark("u1", TableName::BudgetItems)
            .await
            .expect("watermark"),
        watermark_before
    );
}

#[tokio::test]
async fn repeated_sync_without_remote_changes_is_stable() {
    let h = harness();
    for (id, secs) in [("a", 1), ("b", 2), ("c", 3)] {
        h.remote.insert_row(
            TableName::BudgetItems,
            serde_json::to_value(note(id, secs, id)).expect("row"),
        );
    }
    h.orchestrator
        .save(note("local", 50, "local only"))
        .await
        .expect("save");

    let first = h.orchestrator.sync::<TestNote>("u1").await.expect("first");
    let second = h.orchestrator.sync::<TestNote>("u1").await.expect("second");

    assert_eq!(first.records, second.records);
    let ids = second
        .records
        .iter()
        .map(|record| record.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["local", "a", "b", "c"]);
}

#[tokio::test]
async fn flush_never_touches_the_cache() {
    let h = harness();
    h.remote.set_online(false);
    h.orchestrator
        .save(note("1", 10, "queued"))
        .await
        .expect("save");
    let cache_key = TableName::BudgetItems.cache_key();
    let cache_before = raw(&h.local, &cache_key).await;

    h.remote.set_online(true);
    h.orchestrator.flush().await.expect("flush");

    assert_eq!(raw(&h.local, &cache_key).await, cache_before);
}

#[tokio::test]
async fn sync_is_scoped_per_table() {
    let h = harness();
    h.remote.insert_row(
        TableName::BudgetItems,
        serde_json::to_value(note("1", 10, "note")).expect("row"),
    );
    h.orchestrator
        .sync::<TestNote>("u1")
        .await
        .expect("sync");

    assert!(h
        .orchestrator
        .watermark("u1", TableName::ScheduleItems)
        .await
        .expect("watermark")
        .is_none());
    assert!(raw(&h.local, &TableName::ScheduleItems.cache_key())
        .await
        .is_none());
    let stamp = raw(&h.local, &TableName::BudgetItems.cache_timestamp_key())
        .await
        .expect("cache timestamp");
    assert!(chrono::DateTime::parse_from_rfc3339(&stamp).expect("rfc3339") <= Utc::now());
}

#[tokio::test]
async fn queued_save_does_not_overwrite_newer_remote_row() {
    let h = harness();
    h.remote.set_online(false);
    h.orchestrator
        .save(note("1", 10, "local"))
        .await
        .expect("offline save");
    h.remote.set_online(true);
    h.remote.insert_row(
        TableName::BudgetItems,
        serde_json::to_value(note("1", 20, "remote")).expect("row"),
    );

    h.orchestrator
        .sync::<TestNote>("u1")
        .await
        .expect("first sync");
    assert_eq!(h.orchestrator.pending_count().await.expect("pending"), 0);

    let flushed = h.orchestrator.flush().await.expect("flush");
    assert_eq!(flushed.replayed, 0);
    let report = h
        .orchestrator
        .sync::<TestNote>("u1")
        .await
        .expect("second sync");

    assert_eq!(report.records, vec![note("1", 20, "remote")]);
    let rows = h.remote.rows(TableName::BudgetItems);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["body"], "remote");
    let stored: TestNote = serde_json::from_value(rows[0].clone()).expect("decode");
    assert_eq!(stored.updated_at, ts(20));
    assert_eq!(
        h.orchestrator
            .record_state(TableName::BudgetItems, "1")
            .await
            .expect("state"),
        Some(RecordSyncState::Synced)
    );
}

#[tokio::test]
async fn watermarks_are_kept_per_owner() {
    let h = harness();
    h.remote.insert_row(
        TableName::BudgetItems,
        serde_json::to_value(note("1", 5, "first owner")).expect("row"),
    );
    let mut other = note("2", 5, "second owner");
    other.owner_id = "u2".to_string();
    h.remote.insert_row(
        TableName::BudgetItems,
        serde_json::to_value(&other).expect("row"),
    );

    h.orchestrator
        .sync::<TestNote>("u1")
        .await
        .expect("sync u1");
    assert_eq!(
        h.orchestrator
            .watermark("u2", TableName::BudgetItems)
            .await
            .expect("watermark"),
        None
    );

    let report = h
        .orchestrator
        .sync::<TestNote>("u2")
        .await
        .expect("sync u2");
    assert_eq!(report.pulled_count, 1);
    assert!(report.records.contains(&other));
}
