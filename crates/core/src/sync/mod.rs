//! Local-first sync: table registry, merge, queue and orchestrator.

mod background;
mod memory_remote;
mod merge;
mod orchestrator;
mod queue;
mod store;
mod sync_engine;
mod sync_model;
mod sync_scheduler;

pub use background::*;
pub use memory_remote::*;
pub use merge::*;
pub use orchestrator::*;
pub use queue::*;
pub use store::{LocalStore, RemoteFilter, RemoteResult, RemoteStore};
pub use sync_engine::*;
pub use sync_model::*;
pub use sync_scheduler::*;

#[cfg(test)]
mod tests;

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    use super::{TableName, Timestamp};

    /// Minimal record used by the sync tests.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TestNote {
        pub id: String,
        #[serde(rename = "user_id")]
        pub owner_id: String,
        pub updated_at: Timestamp,
        pub body: String,
    }

    crate::impl_sync_record!(TestNote, TableName::BudgetItems);

    pub fn ts(secs: i64) -> Timestamp {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn note(id: &str, secs: i64, body: &str) -> TestNote {
        TestNote {
            id: id.to_string(),
            owner_id: "u1".to_string(),
            updated_at: ts(secs),
            body: body.to_string(),
        }
    }
}
