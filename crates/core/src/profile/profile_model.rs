use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::context::UserSession;
use crate::sync::{TableName, Timestamp};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ar,
}

impl Language {
    /// Arabic is laid out right to left.
    pub fn is_rtl(&self) -> bool {
        matches!(self, Self::Ar)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub language: Language,
    pub theme: Theme,
    pub notifications: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            language: Language::default(),
            theme: Theme::default(),
            notifications: true,
        }
    }
}

/// Row of the `users` table. The owner column equals the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(rename = "user_id")]
    pub owner_id: String,
    pub updated_at: Timestamp,
    pub email: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    pub name: Option<String>,
    #[serde(default)]
    pub preferences: Preferences,
}

crate::impl_sync_record!(UserProfile, TableName::Users);

impl UserProfile {
    /// Fresh profile with default preferences for `session`.
    pub fn for_session(session: &UserSession) -> Self {
        Self {
            id: session.id.clone(),
            owner_id: session.id.clone(),
            updated_at: Utc::now(),
            email: session.email.clone(),
            is_anonymous: session.is_anonymous,
            name: None,
            preferences: Preferences::default(),
        }
    }
}
