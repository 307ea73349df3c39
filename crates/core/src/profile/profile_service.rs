use std::sync::Arc;

use log::debug;

use super::{Preferences, UserProfile};
use crate::context::{SharedSession, UserSession};
use crate::errors::{Error, Result};
use crate::storage::StorageHandle;
use crate::sync::{SyncOrchestrator, SyncOutcome};

/// Profile of the signed-in user.
pub struct ProfileService {
    profiles: StorageHandle<UserProfile>,
    session: SharedSession,
}

impl ProfileService {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, session: SharedSession) -> Self {
        Self {
            profiles: StorageHandle::new(orchestrator, Arc::clone(&session)),
            session,
        }
    }

    /// Syncs the profile and creates it when the user has none yet.
    ///
    /// When the remote store could not be reached the absence of a profile
    /// proves nothing, so a blank one is returned without being saved.
    pub async fn ensure_profile(&self) -> Result<UserProfile> {
        let session = self.session().await?;
        let profiles = self.profiles.refresh_data().await?;
        if let Some(profile) = profiles.into_iter().find(|p| p.id == session.id) {
            return Ok(profile);
        }
        if let Some(SyncOutcome::Stale { error }) = self.profiles.last_outcome().await {
            debug!(
                "[Profile] No cached profile for {} and remote unavailable ({}), not creating one",
                session.id, error
            );
            return Ok(UserProfile::for_session(&session));
        }
        debug!("[Profile] Creating profile for {}", session.id);
        self.profiles
            .save_data(UserProfile::for_session(&session))
            .await
    }

    pub async fn current(&self) -> Result<Option<UserProfile>> {
        let session = self.session().await?;
        Ok(self.profiles.get(&session.id).await)
    }

    pub async fn update_preferences(&self, preferences: Preferences) -> Result<UserProfile> {
        let mut profile = self.require_current().await?;
        profile.preferences = preferences;
        self.profiles.save_data(profile).await
    }

    pub async fn rename(&self, name: &str) -> Result<UserProfile> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("Name must not be empty"));
        }
        let mut profile = self.require_current().await?;
        profile.name = Some(name.to_string());
        self.profiles.save_data(profile).await
    }

    pub(crate) async fn clear(&self) {
        self.profiles.clear().await;
    }

    async fn require_current(&self) -> Result<UserProfile> {
        match self.current().await? {
            Some(profile) => Ok(profile),
            None => self.ensure_profile().await,
        }
    }

    async fn session(&self) -> Result<UserSession> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(Error::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncSettings;
    use crate::profile::{Language, Theme};
    use crate::storage::MemoryStore;
    use crate::sync::{MemoryRemoteStore, TableName};
    use tokio::sync::RwLock;

    fn service(session: Option<UserSession>) -> (Arc<MemoryRemoteStore>, ProfileService) {
        let remote = Arc::new(MemoryRemoteStore::new());
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::new(MemoryStore::new()),
            remote.clone(),
            &SyncSettings::default(),
        ));
        (
            remote,
            ProfileService::new(orchestrator, Arc::new(RwLock::new(session))),
        )
    }

    #[tokio::test]
    async fn ensure_profile_creates_once() {
        let session = UserSession::signed_in("u-42", Some("amal@example.test".to_string()));
        let (remote, service) = service(Some(session));

        let first = service.ensure_profile().await.expect("create");
        let second = service.ensure_profile().await.expect("reuse");

        assert_eq!(first.id, "u-42");
        assert_eq!(first.email.as_deref(), Some("amal@example.test"));
        assert_eq!(second.id, first.id);
        assert_eq!(remote.rows(TableName::Users).len(), 1);
    }

    #[tokio::test]
    async fn preferences_and_name_are_saved() {
        let (_remote, service) = service(Some(UserSession::anonymous()));

        let profile = service
            .update_preferences(Preferences {
                language: Language::Ar,
                theme: Theme::Dark,
                notifications: false,
            })
            .await
            .expect("preferences");
        assert_eq!(profile.preferences.language, Language::Ar);

        let profile = service.rename("  Amal ").await.expect("rename");
        assert_eq!(profile.name.as_deref(), Some("Amal"));
        assert_eq!(profile.preferences.theme, Theme::Dark);
        assert!(matches!(
            service.rename(" ").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_remote_does_not_create_blank_profile() {
        let session = UserSession::signed_in("u-7", None);
        let (remote, service) = service(Some(session));
        remote.set_online(false);

        let placeholder = service.ensure_profile().await.expect("offline ensure");
        assert_eq!(placeholder.id, "u-7");
        assert_eq!(placeholder.name, None);
        assert!(service.current().await.expect("current").is_none());

        remote.set_online(true);
        let mut existing = placeholder.clone();
        existing.name = Some("Bee".to_string());
        existing.updated_at = placeholder.updated_at - chrono::Duration::days(1);
        remote.insert_row(
            TableName::Users,
            serde_json::to_value(&existing).expect("row"),
        );

        let profile = service.ensure_profile().await.expect("online ensure");
        assert_eq!(profile.name.as_deref(), Some("Bee"));
        let rows = remote.rows(TableName::Users);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Bee");
        assert_eq!(remote.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn profile_requires_session() {
        let (_remote, service) = service(None);
        assert!(matches!(
            service.ensure_profile().await,
            Err(Error::Unauthenticated)
        ));
    }
}
