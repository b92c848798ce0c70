use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::domain::{User, UserRole};
use tracing::{info, warn};

/// The signed-in user plus the bearer token issued at login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    pub user: User,
    pub token: String,
    pub signed_in_at: DateTime<Utc>,
}

impl UserSession {
    pub fn new(user: User, token: impl Into<String>) -> Self {
        Self {
            user,
            token: token.into(),
            signed_in_at: Utc::now(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user.role == UserRole::Admin
    }
}

/// Holds at most one session, optionally mirrored to a JSON file.
#[derive(Debug, Default)]
pub struct SessionStore {
    current: Option<UserSession>,
    path: Option<PathBuf>,
}

impl SessionStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens a file-backed store. An unreadable or malformed file yields an
    /// empty store.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<UserSession>(&raw) {
                Ok(session) => Some(session),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "discarding corrupt session file");
                    None
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read session file");
                None
            }
        };
        Self {
            current,
            path: Some(path),
        }
    }

    pub fn current(&self) -> Option<&UserSession> {
        self.current.as_ref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn sign_in(&mut self, session: UserSession) -> Result<()> {
        info!(user = %session.user.username, role = session.user.role.as_str(), "signed in");
        self.current = Some(session);
        self.flush()
    }

    pub fn sign_out(&mut self) -> Result<()> {
        if let Some(session) = self.current.take() {
            info!(user = %session.user.username, "signed out");
        }
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        match &self.current {
            Some(session) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create session directory '{}'", parent.display())
                    })?;
                }
                let raw = serde_json::to_string_pretty(session)?;
                std::fs::write(path, raw)
                    .with_context(|| format!("failed to write session file '{}'", path.display()))
            }
            None => match std::fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err).with_context(|| {
                    format!("failed to remove session file '{}'", path.display())
                }),
            },
        }
    }
}
