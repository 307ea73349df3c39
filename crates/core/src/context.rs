//! Session-scoped service registry.

use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::budget::BudgetService;
use crate::config::SyncSettings;
use crate::errors::Result;
use crate::profile::ProfileService;
use crate::schedule::{NoOpReminderSink, ReminderSink, ScheduleService};
use crate::sync::{BackgroundFlusher, LocalStore, RemoteStore, SyncOrchestrator};

/// Prefix of the owner id given to a user who continues without an account.
pub const ANONYMOUS_ID_PREFIX: &str = "anonymous_";

/// Local key holding the last active session.
pub const SESSION_KEY: &str = "user";

/// Session shared by every service of a [`SessionContext`].
pub type SharedSession = Arc<RwLock<Option<UserSession>>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub id: String,
    pub email: Option<String>,
    pub is_anonymous: bool,
}

impl UserSession {
    pub fn signed_in(id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: id.into(),
            email,
            is_anonymous: false,
        }
    }

    /// New anonymous identity. Each call yields a distinct owner id; the
    /// saved session keeps it stable across `restore`.
    pub fn anonymous() -> Self {
        Self {
            id: format!("{}{}", ANONYMOUS_ID_PREFIX, Uuid::new_v4()),
            email: None,
            is_anonymous: true,
        }
    }
}

/// Services of one signed-in session, built once and passed to consumers.
///
/// `start` binds a user and launches the background flusher; `end` stops
/// the flusher and forgets the user. Cached data stays on the device.
pub struct SessionContext {
    local: Arc<dyn LocalStore>,
    session: SharedSession,
    orchestrator: Arc<SyncOrchestrator>,
    flusher: BackgroundFlusher,
    budget: BudgetService,
    schedule: ScheduleService,
    profile: ProfileService,
}

impl SessionContext {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        settings: &SyncSettings,
    ) -> Self {
        Self::with_reminder_sink(local, remote, settings, Arc::new(NoOpReminderSink))
    }

    pub fn with_reminder_sink(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        settings: &SyncSettings,
        reminders: Arc<dyn ReminderSink>,
    ) -> Self {
        let session: SharedSession = Arc::new(RwLock::new(None));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::clone(&local),
            remote,
            settings,
        ));
        Self {
            local,
            flusher: BackgroundFlusher::new(Arc::clone(&orchestrator), settings),
            budget: BudgetService::new(Arc::clone(&orchestrator), Arc::clone(&session))
                .with_reminder_sink(Arc::clone(&reminders)),
            schedule: ScheduleService::new(Arc::clone(&orchestrator), Arc::clone(&session))
                .with_reminder_sink(reminders),
            profile: ProfileService::new(Arc::clone(&orchestrator), Arc::clone(&session)),
            orchestrator,
            session,
        }
    }

    /// Binds `user`, starts background replay and pulls every table.
    ///
    /// Remote failures during the initial pull leave the cached data in
    /// place and are only logged.
    pub async fn start(&self, user: UserSession) -> Result<()> {
        info!(
            "[Session] Starting session for {} (anonymous={})",
            user.id, user.is_anonymous
        );
        let raw = serde_json::to_string(&user)?;
        *self.session.write().await = Some(user);
        self.local.set(SESSION_KEY, raw).await?;
        self.flusher.ensure_started().await;

        self.profile.ensure_profile().await?;
        self.budget.refresh().await?;
        self.schedule.refresh().await?;
        Ok(())
    }

    /// Starts the session saved by the last `start`, if any.
    pub async fn restore(&self) -> Result<Option<UserSession>> {
        let Some(raw) = self.local.get(SESSION_KEY).await? else {
            return Ok(None);
        };
        let user: UserSession = match serde_json::from_str(&raw) {
            Ok(user) => user,
            Err(err) => {
                warn!("[Session] Ignoring malformed saved session: {}", err);
                self.local.remove(SESSION_KEY).await?;
                return Ok(None);
            }
        };
        self.start(user.clone()).await?;
        Ok(Some(user))
    }

    /// Stops background replay and signs the user out.
    pub async fn end(&self) -> Result<()> {
        self.flusher.stop().await;
        if let Some(user) = self.session.write().await.take() {
            info!("[Session] Ended session for {}", user.id);
        }
        self.profile.clear().await;
        self.budget.clear().await;
        self.schedule.clear().await;
        self.local.remove(SESSION_KEY).await
    }

    pub async fn current_user(&self) -> Option<UserSession> {
        self.session.read().await.clone()
    }

    pub fn session(&self) -> SharedSession {
        Arc::clone(&self.session)
    }

    pub fn orchestrator(&self) -> Arc<SyncOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn flusher(&self) -> &BackgroundFlusher {
        &self.flusher
    }

    pub fn budget(&self) -> &BudgetService {
        &self.budget
    }

    pub fn schedule(&self) -> &ScheduleService {
        &self.schedule
    }

    pub fn profile(&self) -> &ProfileService {
        &self.profile
    }
}
