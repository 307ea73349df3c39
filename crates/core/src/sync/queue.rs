//! Persistent FIFO of mutations that have not reached the remote store.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{debug, error, warn};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::{read_json, write_json};
use super::{
    record_state_key, FlushReport, LocalStore, RecordSyncState, RemoteResult, RemoteStore,
    RetryPolicy, SyncOperation, SyncQueueEntry, SyncQueueStatus, SyncRetryClass, TableName,
    Timestamp, RECORD_STATE_KEY, SYNC_DEAD_LETTER_KEY, SYNC_QUEUE_KEY,
};
use crate::errors::{Error, Result};

type RecordStates = BTreeMap<String, RecordSyncState>;

/// Queue of pending remote mutations plus the dead-letter list and the
/// per-record sync state ledger.
///
/// All three live in the local store and are guarded by one async mutex, so
/// a flush never interleaves with an enqueue.
pub struct SyncQueue {
    store: Arc<dyn LocalStore>,
    policy: RetryPolicy,
    guard: Mutex<()>,
}

impl SyncQueue {
    pub fn new(store: Arc<dyn LocalStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            guard: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn entries(&self) -> Result<Vec<SyncQueueEntry>> {
        let _guard = self.guard.lock().await;
        self.load_queue().await
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.entries().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn dead_letters(&self) -> Result<Vec<SyncQueueEntry>> {
        let _guard = self.guard.lock().await;
        self.load_dead_letters().await
    }

    /// True when the queue still holds a mutation for this record.
    pub async fn has_entries_for(&self, table: TableName, record_id: &str) -> Result<bool> {
        Ok(self
            .entries()
            .await?
            .iter()
            .any(|entry| entry.table == table && entry.record_id == record_id))
    }

    /// True when at least one entry may be replayed at `now`.
    pub async fn has_due_entries(&self, now: Timestamp) -> Result<bool> {
        Ok(self.entries().await?.iter().any(|entry| entry.is_due(now)))
    }

    /// Appends a mutation to the tail of the queue and marks the record pending.
    pub async fn enqueue(
        &self,
        table: TableName,
        record_id: &str,
        payload: serde_json::Value,
        operation: SyncOperation,
        last_error: Option<String>,
    ) -> Result<SyncQueueEntry> {
        let _guard = self.guard.lock().await;
        let entry = new_entry(table, record_id, payload, operation, SyncQueueStatus::Pending);
        let entry = SyncQueueEntry {
            last_error,
            ..entry
        };

        let mut queue = self.load_queue().await?;
        queue.push(entry.clone());
        write_json(self.store.as_ref(), SYNC_QUEUE_KEY, &queue).await?;

        let state = match operation {
            SyncOperation::Delete => RecordSyncState::PendingDelete,
            SyncOperation::Insert | SyncOperation::Update => RecordSyncState::Pending,
        };
        self.update_state(entry.record_key(), Some(state)).await?;

        debug!(
            "[SyncQueue] Enqueued {:?} for {}:{} (queue length {})",
            operation,
            table,
            record_id,
            queue.len()
        );
        Ok(entry)
    }

    /// Records a mutation the remote store refused outright.
    pub async fn dead_letter(
        &self,
        table: TableName,
        record_id: &str,
        payload: serde_json::Value,
        operation: SyncOperation,
        reason: String,
    ) -> Result<SyncQueueEntry> {
        let _guard = self.guard.lock().await;
        let status = SyncQueueStatus::Failed {
            reason: reason.clone(),
            attempts: 1,
        };
        let entry = SyncQueueEntry {
            last_error: Some(reason),
            ..new_entry(table, record_id, payload, operation, status)
        };

        let mut dead = self.load_dead_letters().await?;
        dead.push(entry.clone());
        write_json(self.store.as_ref(), SYNC_DEAD_LETTER_KEY, &dead).await?;
        self.update_state(entry.record_key(), Some(RecordSyncState::Rejected))
            .await?;

        error!(
            "[SyncQueue] Dead-lettered {:?} for {}:{}: {}",
            operation,
            table,
            record_id,
            entry.last_error.as_deref().unwrap_or_default()
        );
        Ok(entry)
    }

    /// Moves a dead letter back to the tail of the queue with a fresh retry budget.
    pub async fn retry_dead_letter(&self, entry_id: &str) -> Result<()> {
        let _guard = self.guard.lock().await;
        let mut dead = self.load_dead_letters().await?;
        let position = dead
            .iter()
            .position(|entry| entry.entry_id == entry_id)
            .ok_or_else(|| Error::not_found(format!("Dead letter '{}'", entry_id)))?;
        let mut entry = dead.remove(position);
        entry.status = SyncQueueStatus::Pending;
        entry.next_retry_at = None;

        let mut queue = self.load_queue().await?;
        queue.push(entry.clone());
        write_json(self.store.as_ref(), SYNC_QUEUE_KEY, &queue).await?;
        write_json(self.store.as_ref(), SYNC_DEAD_LETTER_KEY, &dead).await?;

        let state = match entry.operation {
            SyncOperation::Delete => RecordSyncState::PendingDelete,
            SyncOperation::Insert | SyncOperation::Update => RecordSyncState::Pending,
        };
        self.update_state(entry.record_key(), Some(state)).await
    }

    pub async fn discard_dead_letter(&self, entry_id: &str) -> Result<()> {
        let _guard = self.guard.lock().await;
        let mut dead = self.load_dead_letters().await?;
        let before = dead.len();
        dead.retain(|entry| entry.entry_id != entry_id);
        if dead.len() == before {
            return Err(Error::not_found(format!("Dead letter '{}'", entry_id)));
        }
        write_json(self.store.as_ref(), SYNC_DEAD_LETTER_KEY, &dead).await
    }

    pub async fn record_state(
        &self,
        table: TableName,
        record_id: &str,
    ) -> Result<Option<RecordSyncState>> {
        let _guard = self.guard.lock().await;
        let states = self.load_states().await?;
        Ok(states.get(&record_state_key(table, record_id)).copied())
    }

    /// States of every tracked record of `table`, keyed by record id.
    pub async fn record_states(
        &self,
        table: TableName,
    ) -> Result<HashMap<String, RecordSyncState>> {
        let _guard = self.guard.lock().await;
        let prefix = format!("{}:", table.as_str());
        Ok(self
            .load_states()
            .await?
            .into_iter()
            .filter_map(|(key, state)| {
                key.strip_prefix(&prefix)
                    .map(|record_id| (record_id.to_string(), state))
            })
            .collect())
    }

    pub async fn set_record_state(
        &self,
        table: TableName,
        record_id: &str,
        state: Option<RecordSyncState>,
    ) -> Result<()> {
        let _guard = self.guard.lock().await;
        self.update_state(record_state_key(table, record_id), state)
            .await
    }

    /// Drops queued inserts and updates of a record whose remote row won the
    /// merge, so a later flush cannot push the older payload over it.
    ///
    /// A queued delete for the record is kept. Returns how many entries were
    /// removed.
    pub async fn discard_superseded(&self, table: TableName, record_id: &str) -> Result<usize> {
        let _guard = self.guard.lock().await;
        let mut queue = self.load_queue().await?;
        let before = queue.len();
        queue.retain(|entry| {
            entry.table != table
                || entry.record_id != record_id
                || entry.operation == SyncOperation::Delete
        });
        let removed = before - queue.len();
        if removed == 0 {
            return Ok(0);
        }
        write_json(self.store.as_ref(), SYNC_QUEUE_KEY, &queue).await?;

        let still_queued = queue
            .iter()
            .any(|entry| entry.table == table && entry.record_id == record_id);
        if !still_queued {
            self.update_state(record_state_key(table, record_id), Some(RecordSyncState::Synced))
                .await?;
        }
        debug!(
            "[SyncQueue] Discarded {} superseded mutation(s) for {}:{}",
            removed, table, record_id
        );
        Ok(removed)
    }

    /// Replays queued mutations in enqueue order.
    ///
    /// Successful entries leave the queue. Failed or not-yet-due entries stay
    /// at their original position, and every later entry for the same record
    /// is held behind them.
    pub async fn flush(&self, remote: &dyn RemoteStore, now: Timestamp) -> Result<FlushReport> {
        let _guard = self.guard.lock().await;
        let queue = self.load_queue().await?;
        let mut report = FlushReport::default();
        if queue.is_empty() {
            return Ok(report);
        }

        let mut states = self.load_states().await?;
        let mut dead = self.load_dead_letters().await?;
        let mut kept: Vec<SyncQueueEntry> = Vec::with_capacity(queue.len());
        let mut held: HashSet<String> = HashSet::new();
        let mut replayed: Vec<(String, SyncOperation)> = Vec::new();

        let mut pending = queue.into_iter();
        while let Some(mut entry) = pending.next() {
            let key = entry.record_key();
            if held.contains(&key) || !entry.is_due(now) {
                held.insert(key);
                report.skipped += 1;
                kept.push(entry);
                continue;
            }

            let err = match replay(remote, &entry).await {
                Ok(()) => {
                    report.replayed += 1;
                    replayed.push((key, entry.operation));
                    continue;
                }
                Err(err) => err,
            };

            match err.retry_class() {
                SyncRetryClass::Retryable => {
                    let attempts = entry.status.attempts() + 1;
                    if self.policy.is_exhausted(attempts) {
                        error!(
                            "[SyncQueue] Giving up on {:?} for {}:{} after {} attempts: {}",
                            entry.operation, entry.table, entry.record_id, attempts, err
                        );
                        entry.status = SyncQueueStatus::Failed {
                            reason: format!("Retry limit reached after {} attempts", attempts),
                            attempts,
                        };
                        entry.next_retry_at = None;
                        entry.last_error = Some(err.to_string());
                        states.insert(key, RecordSyncState::Rejected);
                        dead.push(entry);
                        report.dead_lettered += 1;
                    } else {
                        let delay = self.policy.backoff_seconds(attempts - 1);
                        warn!(
                            "[SyncQueue] Replay of {}:{} failed (attempt {}), retrying in {}s: {}",
                            entry.table, entry.record_id, attempts, delay, err
                        );
                        entry.status = SyncQueueStatus::Retrying { count: attempts };
                        entry.next_retry_at = Some(now + Duration::seconds(delay));
                        entry.last_error = Some(err.to_string());
                        held.insert(key);
                        kept.push(entry);
                        report.retried += 1;
                    }
                }
                SyncRetryClass::Permanent => {
                    error!(
                        "[SyncQueue] Remote rejected {:?} for {}:{}: {}",
                        entry.operation, entry.table, entry.record_id, err
                    );
                    entry.status = SyncQueueStatus::Failed {
                        reason: err.to_string(),
                        attempts: entry.status.attempts() + 1,
                    };
                    entry.next_retry_at = None;
                    entry.last_error = Some(err.to_string());
                    states.insert(key, RecordSyncState::Rejected);
                    dead.push(entry);
                    report.dead_lettered += 1;
                }
                SyncRetryClass::ReauthRequired => {
                    warn!("[SyncQueue] Auth error during flush, pausing replay: {}", err);
                    entry.next_retry_at =
                        Some(now + Duration::seconds(self.policy.reauth_delay_secs));
                    entry.last_error = Some(err.to_string());
                    kept.push(entry);
                    report.reauth_required = true;
                    for rest in pending.by_ref() {
                        report.skipped += 1;
                        kept.push(rest);
                    }
                }
            }
        }

        let kept_keys: HashSet<String> = kept.iter().map(SyncQueueEntry::record_key).collect();
        for (key, operation) in replayed {
            if kept_keys.contains(&key) {
                continue;
            }
            match operation {
                SyncOperation::Delete => {
                    states.remove(&key);
                }
                SyncOperation::Insert | SyncOperation::Update => {
                    states.insert(key, RecordSyncState::Synced);
                }
            }
        }

        report.remaining = kept.len();
        write_json(self.store.as_ref(), SYNC_QUEUE_KEY, &kept).await?;
        write_json(self.store.as_ref(), SYNC_DEAD_LETTER_KEY, &dead).await?;
        write_json(self.store.as_ref(), RECORD_STATE_KEY, &states).await?;

        debug!(
            "[SyncQueue] Flush complete replayed={} retried={} skipped={} dead={} remaining={}",
            report.replayed,
            report.retried,
            report.skipped,
            report.dead_lettered,
            report.remaining
        );
        Ok(report)
    }

    async fn load_queue(&self) -> Result<Vec<SyncQueueEntry>> {
        Ok(read_json(self.store.as_ref(), SYNC_QUEUE_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn load_dead_letters(&self) -> Result<Vec<SyncQueueEntry>> {
        Ok(read_json(self.store.as_ref(), SYNC_DEAD_LETTER_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn load_states(&self) -> Result<RecordStates> {
        Ok(read_json(self.store.as_ref(), RECORD_STATE_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn update_state(&self, key: String, state: Option<RecordSyncState>) -> Result<()> {
        let mut states = self.load_states().await?;
        match state {
            Some(state) => {
                states.insert(key, state);
            }
            None => {
                states.remove(&key);
            }
        }
        write_json(self.store.as_ref(), RECORD_STATE_KEY, &states).await
    }
}

fn new_entry(
    table: TableName,
    record_id: &str,
    payload: serde_json::Value,
    operation: SyncOperation,
    status: SyncQueueStatus,
) -> SyncQueueEntry {
    SyncQueueEntry {
        entry_id: Uuid::now_v7().to_string(),
        table,
        record_id: record_id.to_string(),
        payload,
        operation,
        enqueued_at: Utc::now(),
        status,
        next_retry_at: None,
        last_error: None,
    }
}

async fn replay(remote: &dyn RemoteStore, entry: &SyncQueueEntry) -> RemoteResult<()> {
    match entry.operation {
        SyncOperation::Delete => remote.delete(entry.table, &entry.record_id).await,
        SyncOperation::Insert | SyncOperation::Update => {
            remote.upsert(entry.table, &entry.payload).await
        }
    }
}
