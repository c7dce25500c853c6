//! The signed-in session and its small UI preferences.
//!
//! A [`Session`] is loaded once, handed to whoever needs it, and written
//! back through [`SessionStore::save`]. Nothing else touches the file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not access session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session file {path} is not valid JSON: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    System,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "Session::default_keep_alive_minutes")]
    pub keep_alive_minutes: u32,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            token: None,
            role: Role::default(),
            theme: Theme::default(),
            keep_alive_minutes: Self::default_keep_alive_minutes(),
        }
    }
}

impl Session {
    fn default_keep_alive_minutes() -> u32 {
        30
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn is_admin(&self) -> bool {
        self.is_authenticated() && self.role == Role::Admin
    }

    /// Forgets the credentials but keeps the UI preferences.
    pub fn sign_out(&mut self) {
        self.token = None;
        self.role = Role::default();
    }
}

/// Partial update of the UI preferences.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesUpdate {
    pub theme: Option<Theme>,
    pub keep_alive_minutes: Option<u32>,
}

impl PreferencesUpdate {
    pub fn apply(self, session: &mut Session) {
        if let Some(theme) = self.theme {
            session.theme = theme;
        }
        if let Some(minutes) = self.keep_alive_minutes {
            session.keep_alive_minutes = minutes;
        }
    }
}

/// Load/save boundary between a [`Session`] and its JSON file.
#[derive(Clone, Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the session; a missing file yields the default session.
    pub async fn load(&self) -> Result<Session, SessionError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No session file, starting signed out");
                return Ok(Session::default());
            }
            Err(source) => {
                return Err(SessionError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&contents).map_err(|source| SessionError::Format {
            path: self.path.clone(),
            source,
        })
    }

    pub async fn save(&self, session: &Session) -> Result<(), SessionError> {
        let json = serde_json::to_string_pretty(session).map_err(|source| SessionError::Format {
            path: self.path.clone(),
            source,
        })?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| SessionError::Io {
                path: self.path.clone(),
                source,
            })?;
        info!(path = %self.path.display(), "Session saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_default_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        let session = store.load().await.unwrap();
        assert_eq!(session, Session::default());
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn save_then_load_keeps_token_and_preferences() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        let session = Session {
            token: Some("abc".into()),
            role: Role::Admin,
            theme: Theme::Dark,
            keep_alive_minutes: 45,
        };
        store.save(&session).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, session);
        assert!(loaded.is_admin());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();
        let result = SessionStore::new(&path).load().await;
        assert!(matches!(result, Err(SessionError::Format { .. })));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let session: Session = serde_json::from_str(r#"{"theme":"dark"}"#).unwrap();
        assert_eq!(session.theme, Theme::Dark);
        assert_eq!(session.keep_alive_minutes, 30);
        assert_eq!(session.role, Role::User);
    }

    #[test]
    fn sign_out_keeps_preferences() {
        let mut session = Session {
            token: Some("abc".into()),
            role: Role::Admin,
            theme: Theme::Dark,
            keep_alive_minutes: 10,
        };
        session.sign_out();
        assert!(!session.is_authenticated());
        assert_eq!(session.theme, Theme::Dark);
        assert_eq!(session.keep_alive_minutes, 10);
    }

    #[test]
    fn preferences_update_only_touches_given_fields() {
        let mut session = Session::default();
        PreferencesUpdate {
            theme: Some(Theme::System),
            keep_alive_minutes: None,
        }
        .apply(&mut session);
        assert_eq!(session.theme, Theme::System);
        assert_eq!(session.keep_alive_minutes, 30);
    }
}
