//! Local-first reconciliation of the per-table caches with the remote store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, warn};
use tokio::sync::Mutex;

use super::store::{read_json, write_json};
use super::{
    merge_with, should_replace, FlushReport, LocalStore, RecordSyncState, RemoteFilter, RemoteStore,
    SyncOperation, SyncOutcome, SyncPhase, SyncQueue, SyncQueueEntry, SyncRecord, SyncReport,
    SyncRetryClass, TableName, TieBreak, Timestamp, LAST_SYNC_KEY, SYNC_TABLES,
};
use crate::config::SyncSettings;
use crate::errors::{Error, RemoteStoreError, Result};

const TABLE_COUNT: usize = SYNC_TABLES.len();

type Watermarks = BTreeMap<String, Timestamp>;

/// Watermarks are per owner so a user switch on one device never reuses
/// another user's pull position.
fn watermark_key(owner_id: &str, table: TableName) -> String {
    format!("{}:{}", owner_id, table.as_str())
}

/// Coordinates the local cache, the remote store and the sync queue.
///
/// Every operation on a table runs under that table's lock, so a `sync`
/// and a `save` on the same table never interleave. Queue access happens
/// only while the table lock is held or from `flush`, which takes the queue
/// lock alone.
pub struct SyncOrchestrator {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    queue: SyncQueue,
    tie_break: TieBreak,
    table_locks: [Mutex<()>; TABLE_COUNT],
    phases: StdMutex<[SyncPhase; TABLE_COUNT]>,
}

impl SyncOrchestrator {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            queue: SyncQueue::new(Arc::clone(&local), settings.retry),
            local,
            remote,
            tie_break: settings.tie_break,
            table_locks: std::array::from_fn(|_| Mutex::new(())),
            phases: StdMutex::new([SyncPhase::Idle; TABLE_COUNT]),
        }
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Current stage of the sync cycle for `table`.
    pub fn phase(&self, table: TableName) -> SyncPhase {
        self.phases
            .lock()
            .map(|phases| phases[table.index()])
            .unwrap_or(SyncPhase::Idle)
    }

    /// Cached records of `T`'s table. Never touches the network.
    pub async fn load<T: SyncRecord>(&self) -> Result<Vec<T>> {
        let _table_guard = self.table_locks[T::TABLE.index()].lock().await;
        self.read_cache(T::TABLE).await
    }

    /// Pulls remote changes for `owner_id` and merges them into the cache.
    ///
    /// A failed fetch is not an error: the cached records come back with a
    /// [`SyncOutcome::Stale`] outcome and the watermark stays where it was.
    pub async fn sync<T: SyncRecord>(&self, owner_id: &str) -> Result<SyncReport<T>> {
        let table = T::TABLE;
        let _table_guard = self.table_locks[table.index()].lock().await;
        let phase = PhaseGuard::enter(self, table);

        let cached: Vec<T> = self.read_cache(table).await?;
        let mut watermarks = self.load_watermarks().await?;
        let mark_key = watermark_key(owner_id, table);
        let since = watermarks
            .get(&mark_key)
            .copied()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let fetch_started_at = Utc::now();

        let filter = RemoteFilter::owned_by(owner_id).updated_after(since);
        let rows = match self.remote.select(table, &filter).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(
                    "[Sync] Fetch of {} failed, serving {} cached records: {}",
                    table,
                    cached.len(),
                    err
                );
                return Ok(SyncReport {
                    records: cached,
                    pulled_count: 0,
                    outcome: SyncOutcome::Stale {
                        error: err.to_string(),
                    },
                });
            }
        };

        phase.advance(SyncPhase::Merging);
        let states = self.queue.record_states(table).await?;
        let pulled: Vec<T> = decode_rows::<T>(table, rows)
            .into_iter()
            .filter(|record| states.get(record.id()) != Some(&RecordSyncState::PendingDelete))
            .collect();
        let pulled_count = pulled.len();

        let cached_stamps: HashMap<&str, Timestamp> = cached
            .iter()
            .map(|record| (record.id(), record.updated_at()))
            .collect();
        for record in &pulled {
            if states.get(record.id()) != Some(&RecordSyncState::Pending) {
                continue;
            }
            let Some(&cached_at) = cached_stamps.get(record.id()) else {
                continue;
            };
            if should_replace(cached_at, record.updated_at(), self.tie_break) {
                self.queue.discard_superseded(table, record.id()).await?;
            }
        }
        let merged = merge_with(cached, pulled, self.tie_break);

        phase.advance(SyncPhase::Persisting);
        self.write_cache(table, &merged).await?;
        watermarks.insert(mark_key, fetch_started_at);
        write_json(self.local.as_ref(), LAST_SYNC_KEY, &watermarks).await?;

        debug!(
            "[Sync] {} synced pulled={} total={} watermark={}",
            table,
            pulled_count,
            merged.len(),
            fetch_started_at.to_rfc3339()
        );
        Ok(SyncReport {
            records: merged,
            pulled_count,
            outcome: SyncOutcome::Fresh,
        })
    }

    /// Writes `record` to the cache and pushes it to the remote store.
    ///
    /// Network failures never fail the save: the mutation is queued (or
    /// dead-lettered when the remote store refuses it) and the returned
    /// record is the version now in the cache.
    pub async fn save<T: SyncRecord>(&self, mut record: T) -> Result<T> {
        if record.id().trim().is_empty() {
            return Err(Error::validation("Record id must not be empty"));
        }
        let table = T::TABLE;
        let _table_guard = self.table_locks[table.index()].lock().await;

        let mut cached: Vec<T> = self.read_cache(table).await?;
        let operation = match cached.iter().position(|r| r.id() == record.id()) {
            Some(idx) => {
                let previous = cached[idx].updated_at();
                if record.updated_at() <= previous {
                    record.set_updated_at(previous + Duration::milliseconds(1));
                }
                cached[idx] = record.clone();
                SyncOperation::Update
            }
            None => {
                cached.push(record.clone());
                SyncOperation::Insert
            }
        };
        self.write_cache(table, &cached).await?;

        let payload = serde_json::to_value(&record)?;
        let record_id = record.id().to_string();
        self.queue
            .set_record_state(table, &record_id, Some(RecordSyncState::Pending))
            .await?;

        if self.queue.has_entries_for(table, &record_id).await? {
            debug!(
                "[Sync] {}:{} has queued mutations, queueing save behind them",
                table, record_id
            );
            self.queue
                .enqueue(table, &record_id, payload, operation, None)
                .await?;
            return Ok(record);
        }

        let pushed = self.remote.upsert(table, &payload).await;
        self.settle(table, &record_id, payload, operation, pushed)
            .await?;
        Ok(record)
    }

    /// Removes a record from the cache and from the remote store.
    ///
    /// Returns `false` when the record was not cached.
    pub async fn delete<T: SyncRecord>(&self, id: &str) -> Result<bool> {
        let table = T::TABLE;
        let _table_guard = self.table_locks[table.index()].lock().await;

        let mut cached: Vec<T> = self.read_cache(table).await?;
        let before = cached.len();
        cached.retain(|record| record.id() != id);
        if cached.len() == before {
            return Ok(false);
        }
        self.write_cache(table, &cached).await?;
        self.queue
            .set_record_state(table, id, Some(RecordSyncState::PendingDelete))
            .await?;

        let payload = serde_json::json!({ "id": id });
        if self.queue.has_entries_for(table, id).await? {
            self.queue
                .enqueue(table, id, payload, SyncOperation::Delete, None)
                .await?;
            return Ok(true);
        }

        let deleted = self.remote.delete(table, id).await;
        self.settle(table, id, payload, SyncOperation::Delete, deleted)
            .await?;
        Ok(true)
    }

    /// Replays the sync queue against the remote store.
    pub async fn flush(&self) -> Result<FlushReport> {
        self.queue.flush(self.remote.as_ref(), Utc::now()).await
    }

    pub async fn record_state(
        &self,
        table: TableName,
        record_id: &str,
    ) -> Result<Option<RecordSyncState>> {
        self.queue.record_state(table, record_id).await
    }

    /// Time of the last successful fetch start of `owner_id`'s rows of `table`.
    pub async fn watermark(&self, owner_id: &str, table: TableName) -> Result<Option<Timestamp>> {
        Ok(self
            .load_watermarks()
            .await?
            .get(&watermark_key(owner_id, table))
            .copied())
    }

    pub async fn pending_count(&self) -> Result<usize> {
        self.queue.len().await
    }

    pub async fn dead_letters(&self) -> Result<Vec<SyncQueueEntry>> {
        self.queue.dead_letters().await
    }

    /// Records the outcome of a direct push attempt.
    async fn settle(
        &self,
        table: TableName,
        record_id: &str,
        payload: serde_json::Value,
        operation: SyncOperation,
        pushed: std::result::Result<(), RemoteStoreError>,
    ) -> Result<()> {
        let err = match pushed {
            Ok(()) => {
                let state = match operation {
                    SyncOperation::Delete => None,
                    SyncOperation::Insert | SyncOperation::Update => Some(RecordSyncState::Synced),
                };
                return self.queue.set_record_state(table, record_id, state).await;
            }
            Err(err) => err,
        };

        match err.retry_class() {
            SyncRetryClass::Permanent => {
                self.queue
                    .dead_letter(table, record_id, payload, operation, err.to_string())
                    .await?;
            }
            SyncRetryClass::Retryable | SyncRetryClass::ReauthRequired => {
                warn!(
                    "[Sync] Push of {:?} for {}:{} failed, queued for replay: {}",
                    operation, table, record_id, err
                );
                self.queue
                    .enqueue(table, record_id, payload, operation, Some(err.to_string()))
                    .await?;
            }
        }
        Ok(())
    }

    async fn read_cache<T: SyncRecord>(&self, table: TableName) -> Result<Vec<T>> {
        let rows: Vec<serde_json::Value> = read_json(self.local.as_ref(), &table.cache_key())
            .await?
            .unwrap_or_default();
        Ok(decode_rows(table, rows))
    }

    async fn write_cache<T: SyncRecord>(&self, table: TableName, records: &[T]) -> Result<()> {
        write_json(self.local.as_ref(), &table.cache_key(), records).await?;
        self.local
            .set(&table.cache_timestamp_key(), Utc::now().to_rfc3339())
            .await
    }

    async fn load_watermarks(&self) -> Result<Watermarks> {
        Ok(read_json(self.local.as_ref(), LAST_SYNC_KEY)
            .await?
            .unwrap_or_default())
    }

    fn set_phase(&self, table: TableName, phase: SyncPhase) {
        if let Ok(mut phases) = self.phases.lock() {
            phases[table.index()] = phase;
        }
    }
}

/// Decodes rows one by one so a single malformed row does not hide the rest.
fn decode_rows<T: SyncRecord>(table: TableName, rows: Vec<serde_json::Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row) {
            Ok(record) => Some(record),
            Err(err) => {
                error!("[Sync] Dropping malformed {} row: {}", table, err);
                None
            }
        })
        .collect()
}

/// Moves a table through the sync phases and back to `Idle` on drop.
struct PhaseGuard<'a> {
    orchestrator: &'a SyncOrchestrator,
    table: TableName,
}

impl<'a> PhaseGuard<'a> {
    fn enter(orchestrator: &'a SyncOrchestrator, table: TableName) -> Self {
        orchestrator.set_phase(table, SyncPhase::Fetching);
        Self {
            orchestrator,
            table,
        }
    }

    fn advance(&self, phase: SyncPhase) {
        self.orchestrator.set_phase(self.table, phase);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator.set_phase(self.table, SyncPhase::Idle);
    }
}
