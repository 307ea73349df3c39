//! Store contracts the orchestrator is built on.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{TableName, Timestamp, OWNER_COLUMN, UPDATED_AT_COLUMN};
use crate::errors::{RemoteStoreError, Result};

/// Result type for remote store calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteStoreError>;

/// String-keyed, string-valued persistent dictionary on the device.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Row filter understood by every remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteFilter {
    /// Equality on the owner column.
    pub owner_id: Option<String>,
    /// Strict greater-than on the `updated_at` column.
    pub updated_after: Option<Timestamp>,
}

impl RemoteFilter {
    pub fn owned_by(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
            updated_after: None,
        }
    }

    pub fn updated_after(mut self, watermark: Timestamp) -> Self {
        self.updated_after = Some(watermark);
        self
    }

    /// Evaluates the filter against a JSON row.
    pub fn matches(&self, row: &serde_json::Value) -> bool {
        if let Some(owner_id) = &self.owner_id {
            if row.get(OWNER_COLUMN).and_then(|v| v.as_str()) != Some(owner_id.as_str()) {
                return false;
            }
        }
        if let Some(watermark) = self.updated_after {
            let updated_at = row
                .get(UPDATED_AT_COLUMN)
                .and_then(|v| v.as_str())
                .and_then(|v| chrono::DateTime::parse_from_rfc3339(v).ok());
            match updated_at {
                Some(value) if value > watermark => {}
                _ => return false,
            }
        }
        true
    }
}

/// Row-oriented network record store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select(
        &self,
        table: TableName,
        filter: &RemoteFilter,
    ) -> RemoteResult<Vec<serde_json::Value>>;

    async fn upsert(&self, table: TableName, record: &serde_json::Value) -> RemoteResult<()>;

    async fn delete(&self, table: TableName, id: &str) -> RemoteResult<()>;
}

/// Reads and decodes a JSON value. Malformed data is logged and treated as absent.
pub(crate) async fn read_json<T: DeserializeOwned>(
    store: &dyn LocalStore,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            log::error!("[Storage] Ignoring malformed value under '{}': {}", key, err);
            Ok(None)
        }
    }
}

pub(crate) async fn write_json<T: Serialize + ?Sized>(
    store: &dyn LocalStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, raw).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_support::ts;
    use serde_json::json;

    #[test]
    fn filter_matches_owner_and_watermark() {
        let row = json!({
            "id": "1",
            "user_id": "u1",
            "updated_at": "1970-01-01T00:00:20Z"
        });

        assert!(RemoteFilter::owned_by("u1").matches(&row));
        assert!(!RemoteFilter::owned_by("u2").matches(&row));
        assert!(RemoteFilter::owned_by("u1").updated_after(ts(10)).matches(&row));
        assert!(!RemoteFilter::owned_by("u1").updated_after(ts(20)).matches(&row));
    }

    #[test]
    fn filter_rejects_rows_without_timestamp() {
        let row = json!({ "id": "1", "user_id": "u1" });
        assert!(!RemoteFilter::owned_by("u1").updated_after(ts(0)).matches(&row));
        assert!(RemoteFilter::default().matches(&row));
    }
}
