use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use log::debug;
use tokio::sync::RwLock;

use crate::context::SharedSession;
use crate::errors::{Error, Result};
use crate::sync::{SyncOrchestrator, SyncOutcome, SyncRecord};

#[derive(Debug)]
struct HandleState<T> {
    data: Vec<T>,
    is_loading: bool,
    last_outcome: Option<SyncOutcome>,
}

/// Per-table view of the synced records of the signed-in user.
///
/// Writes stamp the session owner and a fresh `updated_at`, go through the
/// orchestrator, and then refresh `data` from the local cache.
pub struct StorageHandle<T: SyncRecord> {
    orchestrator: Arc<SyncOrchestrator>,
    session: SharedSession,
    state: RwLock<HandleState<T>>,
    _record: PhantomData<fn() -> T>,
}

impl<T: SyncRecord> StorageHandle<T> {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, session: SharedSession) -> Self {
        Self {
            orchestrator,
            session,
            state: RwLock::new(HandleState {
                data: Vec::new(),
                is_loading: false,
                last_outcome: None,
            }),
            _record: PhantomData,
        }
    }

    /// Last loaded records.
    pub async fn data(&self) -> Vec<T> {
        self.state.read().await.data.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.is_loading
    }

    /// Outcome of the last `refresh_data`, `None` before the first one.
    pub async fn last_outcome(&self) -> Option<SyncOutcome> {
        self.state.read().await.last_outcome.clone()
    }

    /// Pulls remote changes and replaces `data` with the merged result.
    pub async fn refresh_data(&self) -> Result<Vec<T>> {
        let owner_id = self.owner_id().await?;
        self.state.write().await.is_loading = true;

        let result = self.orchestrator.sync::<T>(&owner_id).await;

        let mut state = self.state.write().await;
        state.is_loading = false;
        let report = result?;
        state.data = owned_by(report.records, &owner_id);
        state.last_outcome = Some(report.outcome);
        debug!(
            "[Storage] {} refreshed records={} pulled={}",
            T::TABLE,
            state.data.len(),
            report.pulled_count
        );
        Ok(state.data.clone())
    }

    /// Saves `record` as the current user and returns the stored version.
    pub async fn save_data(&self, mut record: T) -> Result<T> {
        let owner_id = self.owner_id().await?;
        record.set_owner_id(owner_id.clone());
        record.set_updated_at(Utc::now());

        let saved = self.orchestrator.save(record).await?;
        self.reload(&owner_id).await?;
        Ok(saved)
    }

    /// Deletes a record of the current user. Returns `false` if it was not cached.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let owner_id = self.owner_id().await?;
        let owned = self
            .state
            .read()
            .await
            .data
            .iter()
            .any(|record| record.id() == id);
        if !owned {
            let cached: Vec<T> = self.orchestrator.load().await?;
            if cached
                .iter()
                .any(|record| record.id() == id && record.owner_id() != owner_id)
            {
                return Err(Error::not_found(format!("{} '{}'", T::TABLE, id)));
            }
        }

        let removed = self.orchestrator.delete::<T>(id).await?;
        self.reload(&owner_id).await?;
        Ok(removed)
    }

    /// Finds a loaded record by id.
    pub async fn get(&self, id: &str) -> Option<T> {
        self.state
            .read()
            .await
            .data
            .iter()
            .find(|record| record.id() == id)
            .cloned()
    }

    /// Drops the in-memory view. The local cache is left intact.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.data.clear();
        state.last_outcome = None;
    }

    async fn reload(&self, owner_id: &str) -> Result<()> {
        let cached: Vec<T> = self.orchestrator.load().await?;
        self.state.write().await.data = owned_by(cached, owner_id);
        Ok(())
    }

    async fn owner_id(&self) -> Result<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|session| session.id.clone())
            .ok_or(Error::Unauthenticated)
    }
}

fn owned_by<T: SyncRecord>(records: Vec<T>, owner_id: &str) -> Vec<T> {
    records
        .into_iter()
        .filter(|record| record.owner_id() == owner_id)
        .collect()
}
