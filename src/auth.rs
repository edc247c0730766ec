//! Single-account login gate in front of the file commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;

pub const SESSION_FILE: &str = "session.json";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("incorrect email or password")]
    InvalidCredentials,
    #[error("not logged in: run `filedrive login` or pass --email and --password")]
    NotLoggedIn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RememberedSession {
    pub logged_in: bool,
    pub email: String,
}

pub struct AuthGate {
    credentials: AuthConfig,
    session_path: PathBuf,
}

impl AuthGate {
    pub fn new(credentials: AuthConfig, data_dir: &Path) -> Self {
        Self {
            credentials,
            session_path: data_dir.join(SESSION_FILE),
        }
    }

    pub fn verify(&self, email: &str, password: &str) -> Result<(), AuthError> {
        if email == self.credentials.email && password == self.credentials.password {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    /// Check credentials and optionally keep the login for later runs.
    pub fn login(&self, email: &str, password: &str, remember: bool) -> Result<()> {
        self.verify(email, password)?;
        if remember {
            let session = RememberedSession {
                logged_in: true,
                email: email.to_string(),
            };
            if let Some(parent) = self.session_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&self.session_path, serde_json::to_vec_pretty(&session)?)
                .with_context(|| format!("failed to write {}", self.session_path.display()))?;
            tracing::info!(email = %email, "login remembered");
        }
        Ok(())
    }

    pub fn logout(&self) -> Result<bool> {
        match std::fs::remove_file(&self.session_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| {
                format!("failed to remove {}", self.session_path.display())
            }),
        }
    }

    /// A remembered login only counts for the account currently configured.
    pub fn remembered(&self) -> bool {
        std::fs::read(&self.session_path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<RememberedSession>(&bytes).ok())
            .map(|s| s.logged_in && s.email == self.credentials.email)
            .unwrap_or(false)
    }

    /// Admit a caller holding either a remembered login or valid credentials.
    pub fn require(&self, email: Option<&str>, password: Option<&str>) -> Result<(), AuthError> {
        match (email, password) {
            (Some(email), Some(password)) => self.verify(email, password),
            _ if self.remembered() => Ok(()),
            _ => Err(AuthError::NotLoggedIn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gate(tmp: &TempDir) -> AuthGate {
        AuthGate::new(
            AuthConfig {
                email: "me@example.org".into(),
                password: "hunter2".into(),
            },
            tmp.path(),
        )
    }

    #[test]
    fn exact_match_required() {
        let tmp = TempDir::new().unwrap();
        let gate = gate(&tmp);
        assert!(gate.verify("me@example.org", "hunter2").is_ok());
        assert_eq!(
            gate.verify("me@example.org", "Hunter2"),
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            gate.verify("ME@example.org", "hunter2"),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn remember_and_logout() {
        let tmp = TempDir::new().unwrap();
        let gate = gate(&tmp);

        assert_eq!(gate.require(None, None), Err(AuthError::NotLoggedIn));

        gate.login("me@example.org", "hunter2", false).unwrap();
        assert!(!gate.remembered());

        gate.login("me@example.org", "hunter2", true).unwrap();
        assert!(gate.remembered());
        assert!(gate.require(None, None).is_ok());

        assert!(gate.logout().unwrap());
        assert!(!gate.logout().unwrap());
        assert!(!gate.remembered());
    }

    #[test]
    fn explicit_bad_credentials_beat_remembered_session() {
        let tmp = TempDir::new().unwrap();
        let gate = gate(&tmp);
        gate.login("me@example.org", "hunter2", true).unwrap();

        assert_eq!(
            gate.require(Some("me@example.org"), Some("wrong")),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn failed_login_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let gate = gate(&tmp);
        assert!(gate.login("me@example.org", "nope", true).is_err());
        assert!(!tmp.path().join(SESSION_FILE).exists());
    }
}
