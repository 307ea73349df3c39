//! Periodic queue replay in a background tokio task.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{SyncOrchestrator, SYNC_FLUSH_PENDING_DELAY_MS};
use crate::config::SyncSettings;

/// Smallest delay between two flushes when waiting on a retry deadline.
const MIN_RETRY_WAIT_MS: u64 = 1_000;

/// Owns the background flush loop. Starting and stopping are idempotent.
pub struct BackgroundFlusher {
    orchestrator: Arc<SyncOrchestrator>,
    interval_ms: u64,
    jitter_ms: u64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundFlusher {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, settings: &SyncSettings) -> Self {
        Self {
            orchestrator,
            interval_ms: settings.flush_interval_ms,
            jitter_ms: settings.flush_jitter_ms,
            task: Mutex::new(None),
        }
    }

    /// Spawns the loop unless it is already running.
    pub async fn ensure_started(&self) {
        let mut guard = self.task.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
            guard.take();
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let interval_ms = self.interval_ms;
        let jitter_bound = self.jitter_ms;
        let handle = tokio::spawn(async move {
            loop {
                match orchestrator.flush().await {
                    Ok(report) => {
                        if report.replayed > 0 || report.dead_lettered > 0 {
                            debug!(
                                "[Sync] Background flush replayed={} dead={} remaining={}",
                                report.replayed, report.dead_lettered, report.remaining
                            );
                        }
                        if report.reauth_required {
                            warn!("[Sync] Remote store requires re-authentication");
                        }
                    }
                    Err(err) => warn!("[Sync] Background flush failed: {}", err),
                }

                let delay_ms = next_delay_ms(&orchestrator, interval_ms, jitter_bound).await;
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            }
        });
        info!("[Sync] Background flusher started");
        *guard = Some(handle);
    }

    pub async fn stop(&self) {
        let mut guard = self.task.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
            info!("[Sync] Background flusher stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

/// Interval plus jitter, shortened while queued entries are waiting.
async fn next_delay_ms(orchestrator: &SyncOrchestrator, interval_ms: u64, jitter_bound: u64) -> u64 {
    let jitter_ms = if jitter_bound > 0 {
        Utc::now().timestamp_millis().unsigned_abs() % jitter_bound
    } else {
        0
    };
    let mut delay_ms = interval_ms.saturating_add(jitter_ms);

    let Ok(entries) = orchestrator.queue().entries().await else {
        return delay_ms;
    };
    let now = Utc::now();
    if entries.iter().any(|entry| entry.is_due(now)) {
        return delay_ms.min(SYNC_FLUSH_PENDING_DELAY_MS + (jitter_ms % 500));
    }
    if let Some(next_retry_at) = entries.iter().filter_map(|entry| entry.next_retry_at).min() {
        let wait_ms = (next_retry_at - now).num_milliseconds().max(0) as u64;
        delay_ms = delay_ms.min(wait_ms.saturating_add(jitter_ms).max(MIN_RETRY_WAIT_MS));
    }
    delay_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::sync::test_support::note;
    use crate::sync::MemoryRemoteStore;
    use std::time::Duration;

    fn fast_settings() -> SyncSettings {
        SyncSettings {
            flush_interval_ms: 20,
            flush_jitter_ms: 0,
            ..SyncSettings::default()
        }
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryRemoteStore::new()),
            &fast_settings(),
        ));
        let flusher = BackgroundFlusher::new(orchestrator, &fast_settings());

        assert!(!flusher.is_running().await);
        flusher.ensure_started().await;
        flusher.ensure_started().await;
        assert!(flusher.is_running().await);

        flusher.stop().await;
        flusher.stop().await;
        assert!(!flusher.is_running().await);
    }

    #[tokio::test]
    async fn queued_saves_drain_once_remote_is_back() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::new(MemoryStore::new()),
            remote.clone(),
            &fast_settings(),
        ));
        remote.set_online(false);
        orchestrator.save(note("1", 10, "a")).await.expect("save");
        assert_eq!(orchestrator.pending_count().await.expect("pending"), 1);

        remote.set_online(true);
        let flusher = BackgroundFlusher::new(Arc::clone(&orchestrator), &fast_settings());
        flusher.ensure_started().await;

        let mut drained = false;
        for _ in 0..100 {
            if orchestrator.pending_count().await.expect("pending") == 0 {
                drained = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        flusher.stop().await;

        assert!(drained);
        assert!(remote.contains(crate::sync::TableName::BudgetItems, "1"));
    }
}
