//! In-process remote store used by tests and offline demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{RemoteFilter, RemoteResult, RemoteStore, TableName, ID_COLUMN};
use crate::errors::RemoteStoreError;

/// Remote store kept in memory, with a switchable failure mode.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    rows: Mutex<HashMap<TableName, Vec<serde_json::Value>>>,
    failure: Mutex<Option<RemoteStoreError>>,
    upsert_calls: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates connectivity. Going offline makes every call fail with a
    /// transport error.
    pub fn set_online(&self, online: bool) {
        let failure = (!online).then(|| RemoteStoreError::transport("network unreachable"));
        self.set_failure(failure);
    }

    /// Makes every call fail with `failure` until cleared.
    pub fn set_failure(&self, failure: Option<RemoteStoreError>) {
        if let Ok(mut guard) = self.failure.lock() {
            *guard = failure;
        }
    }

    pub fn rows(&self, table: TableName) -> Vec<serde_json::Value> {
        self.rows
            .lock()
            .map(|rows| rows.get(&table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn contains(&self, table: TableName, id: &str) -> bool {
        self.rows(table)
            .iter()
            .any(|row| row.get(ID_COLUMN).and_then(|v| v.as_str()) == Some(id))
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Seeds a row without going through the failure switch.
    pub fn insert_row(&self, table: TableName, row: serde_json::Value) {
        if let Ok(mut rows) = self.rows.lock() {
            upsert_row(rows.entry(table).or_default(), row);
        }
    }

    fn check_failure(&self) -> RemoteResult<()> {
        let guard = self
            .failure
            .lock()
            .map_err(|_| RemoteStoreError::transport("remote store lock poisoned"))?;
        match guard.as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

fn row_id(row: &serde_json::Value) -> Option<&str> {
    row.get(ID_COLUMN).and_then(|v| v.as_str())
}

fn upsert_row(rows: &mut Vec<serde_json::Value>, row: serde_json::Value) {
    let id = row_id(&row).map(str::to_string);
    match rows.iter_mut().find(|existing| row_id(existing) == id.as_deref()) {
        Some(existing) => *existing = row,
        None => rows.push(row),
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn select(
        &self,
        table: TableName,
        filter: &RemoteFilter,
    ) -> RemoteResult<Vec<serde_json::Value>> {
        self.check_failure()?;
        Ok(self
            .rows(table)
            .into_iter()
            .filter(|row| filter.matches(row))
            .collect())
    }

    async fn upsert(&self, table: TableName, record: &serde_json::Value) -> RemoteResult<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        if row_id(record).is_none() {
            return Err(RemoteStoreError::InvalidRequest(format!(
                "Row for '{}' has no '{}'",
                table, ID_COLUMN
            )));
        }
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| RemoteStoreError::transport("remote store lock poisoned"))?;
        upsert_row(rows.entry(table).or_default(), record.clone());
        Ok(())
    }

    async fn delete(&self, table: TableName, id: &str) -> RemoteResult<()> {
        self.check_failure()?;
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| RemoteStoreError::transport("remote store lock poisoned"))?;
        if let Some(table_rows) = rows.get_mut(&table) {
            table_rows.retain(|row| row_id(row) != Some(id));
        }
        Ok(())
    }
}
