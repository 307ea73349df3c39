//! Sync domain models and the typed table registry.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Remote column holding the owning user id.
pub const OWNER_COLUMN: &str = "user_id";
/// Remote column holding the last modification timestamp.
pub const UPDATED_AT_COLUMN: &str = "updated_at";
/// Remote primary key column.
pub const ID_COLUMN: &str = "id";

/// Local key holding the pending mutation queue.
pub const SYNC_QUEUE_KEY: &str = "sync_queue";
/// Local key holding entries that will never be retried automatically.
pub const SYNC_DEAD_LETTER_KEY: &str = "sync_dead_letters";
/// Local key holding the watermark map, keyed by owner and table.
pub const LAST_SYNC_KEY: &str = "last_sync";
/// Local key holding the per-record sync state map.
pub const RECORD_STATE_KEY: &str = "sync_record_state";

/// Timestamp type used for record versions and watermarks.
pub type Timestamp = DateTime<Utc>;

/// Tables that participate in local/remote sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableName {
    Users,
    BudgetItems,
    BudgetCategories,
    BudgetGoals,
    ScheduleItems,
}

/// Canonical list of synced tables.
pub const SYNC_TABLES: [TableName; 5] = [
    TableName::Users,
    TableName::BudgetItems,
    TableName::BudgetCategories,
    TableName::BudgetGoals,
    TableName::ScheduleItems,
];

impl TableName {
    /// Remote table name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::BudgetItems => "budget_items",
            Self::BudgetCategories => "budget_categories",
            Self::BudgetGoals => "budget_goals",
            Self::ScheduleItems => "schedule_items",
        }
    }

    /// Position of the table in [`SYNC_TABLES`].
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn parse(value: &str) -> Option<Self> {
        SYNC_TABLES
            .iter()
            .copied()
            .find(|table| table.as_str() == value)
    }

    /// Local key holding the materialized record list.
    pub fn cache_key(&self) -> String {
        format!("{}_data", self.as_str())
    }

    /// Local key holding the time of the last local cache write.
    pub fn cache_timestamp_key(&self) -> String {
        format!("{}_data_timestamp", self.as_str())
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract for every entity persisted through the sync orchestrator.
///
/// `id` never changes after creation. `updated_at` must grow on every
/// mutation; the orchestrator enforces this on save.
pub trait SyncRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: TableName;

    fn id(&self) -> &str;
    fn owner_id(&self) -> &str;
    fn set_owner_id(&mut self, owner_id: String);
    fn updated_at(&self) -> DateTime<Utc>;
    fn set_updated_at(&mut self, updated_at: DateTime<Utc>);
}

/// Implements [`SyncRecord`] for a struct with `id`, `owner_id` and
/// `updated_at` fields.
#[macro_export]
macro_rules! impl_sync_record {
    ($ty:ty, $table:expr) => {
        impl $crate::sync::SyncRecord for $ty {
            const TABLE: $crate::sync::TableName = $table;

            fn id(&self) -> &str {
                &self.id
            }

            fn owner_id(&self) -> &str {
                &self.owner_id
            }

            fn set_owner_id(&mut self, owner_id: String) {
                self.owner_id = owner_id;
            }

            fn updated_at(&self) -> $crate::sync::Timestamp {
                self.updated_at
            }

            fn set_updated_at(&mut self, updated_at: $crate::sync::Timestamp) {
                self.updated_at = updated_at;
            }
        }
    };
}

/// Supported remote mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Insert,
    Update,
    Delete,
}

/// Lifecycle of a queued mutation.
///
/// `Failed` is terminal: such entries are kept in the dead-letter list and
/// only return to the queue through an explicit retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncQueueStatus {
    Pending,
    Retrying { count: u32 },
    Failed {
        reason: String,
        #[serde(default)]
        attempts: u32,
    },
}

impl SyncQueueStatus {
    /// Number of failed replay attempts so far.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Pending => 0,
            Self::Retrying { count } => *count,
            Self::Failed { attempts, .. } => *attempts,
        }
    }
}

/// A mutation that has not reached the remote store yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueEntry {
    pub entry_id: String,
    pub table: TableName,
    pub record_id: String,
    pub payload: serde_json::Value,
    pub operation: SyncOperation,
    pub enqueued_at: DateTime<Utc>,
    pub status: SyncQueueStatus,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SyncQueueEntry {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at.map(|at| at <= now).unwrap_or(true)
    }

    pub(crate) fn record_key(&self) -> String {
        record_state_key(self.table, &self.record_id)
    }
}

/// Two-phase state of a locally written record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSyncState {
    /// Written locally, remote write not confirmed yet.
    Pending,
    /// Deleted locally, remote delete not confirmed yet.
    PendingDelete,
    /// Remote store confirmed the latest local write.
    Synced,
    /// Remote store refused the latest local write; see dead letters.
    Rejected,
}

pub(crate) fn record_state_key(table: TableName, record_id: &str) -> String {
    format!("{}:{}", table.as_str(), record_id)
}

/// Per-table stage of a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Fetching,
    Merging,
    Persisting,
}

/// Whether a sync returned fresh data or fell back to the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Fresh,
    Stale { error: String },
}

/// Result of one `sync` call.
#[derive(Debug, Clone)]
pub struct SyncReport<T> {
    pub records: Vec<T>,
    pub pulled_count: usize,
    pub outcome: SyncOutcome,
}

impl<T> SyncReport<T> {
    pub fn is_stale(&self) -> bool {
        matches!(self.outcome, SyncOutcome::Stale { .. })
    }
}
