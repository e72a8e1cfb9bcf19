//! Client-side session: the access/refresh token pair and the logged-in user.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::client::error::ClientResult;
use crate::model::user::UserProfile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: Option<UserProfile>,
}

/// Holds the current session, optionally mirrored to a JSON file so a
/// restarted client stays logged in.
#[derive(Debug, Default)]
pub struct SessionStore {
    current: RwLock<Option<Session>>,
    path: Option<PathBuf>,
}

impl SessionStore {
    /// In-memory only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a previously saved session from `path`, if any. A missing or
    /// unreadable file starts logged out.
    pub async fn persistent(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Session>(&bytes) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "Ignoring corrupt session file");
                    None
                }
            },
            Err(_) => None,
        };
        Self {
            current: RwLock::new(current),
            path: Some(path),
        }
    }

    pub async fn get(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|s| s.refresh_token.clone())
    }

    pub async fn is_logged_in(&self) -> bool {
        self.current.read().await.is_some()
    }

    pub async fn set(&self, session: Session) -> ClientResult<()> {
        let mut current = self.current.write().await;
        if let Some(path) = &self.path {
            tokio::fs::write(path, serde_json::to_vec_pretty(&session)?).await?;
        }
        *current = Some(session);
        Ok(())
    }

    /// Swaps in a rotated token pair, keeping the user.
    pub async fn rotate(&self, access_token: String, refresh_token: String) -> ClientResult<()> {
        let user = self.current.read().await.as_ref().and_then(|s| s.user.clone());
        self.set(Session {
            access_token,
            refresh_token,
            user,
        })
        .await
    }

    pub async fn clear(&self) {
        let mut current = self.current.write().await;
        *current = None;
        if let Some(path) = &self.path {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(error = %e, path = %path.display(), "Failed to remove session file");
                }
            }
        }
        debug!("Session cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(token: &str) -> Session {
        Session {
            access_token: format!("access-{token}"),
            refresh_token: format!("refresh-{token}"),
            user: None,
        }
    }

    #[tokio::test]
    async fn survives_a_restart_when_persistent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = SessionStore::persistent(&path).await;
        assert!(!store.is_logged_in().await);
        store.set(session("a")).await.unwrap();

        let reopened = SessionStore::persistent(&path).await;
        assert_eq!(reopened.get().await, Some(session("a")));

        reopened.clear().await;
        assert!(!path.exists());
        assert!(!SessionStore::persistent(&path).await.is_logged_in().await);
    }

    #[tokio::test]
    async fn rotation_keeps_the_user() {
        let store = SessionStore::new();
        store.set(session("a")).await.unwrap();
        store.rotate("access-b".into(), "refresh-b".into()).await.unwrap();
        assert_eq!(store.access_token().await.as_deref(), Some("access-b"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("refresh-b"));
    }

    #[tokio::test]
    async fn corrupt_file_starts_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(!SessionStore::persistent(&path).await.is_logged_in().await);
    }
}
