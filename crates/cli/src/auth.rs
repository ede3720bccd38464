//! Local key-value storage for the OAuth session, and the identity
//! provider's reputation/profile lookup (spec.md §4.8, §6 Identity
//! provider). Token under `token`, display name under `username`, stored
//! as a small TOML document in the user's config directory.

use std::path::PathBuf;

use ceremony_core::config::ReputationConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no stored session; run `ceremony-cli login` first")]
    MissingToken,

    #[error("identity provider request failed: {0}")]
    Transport(String),

    #[error("identity provider returned an unexpected response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub username: String,
}

pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new() -> Self {
        let path = dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("ceremony-cli")
            .join("session.toml");
        Self { path }
    }

    pub fn load(&self) -> Option<StoredSession> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        toml::from_str(&contents).ok()
    }

    pub fn save(&self, session: &StoredSession) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(session).expect("StoredSession always serializes");
        std::fs::write(&self.path, contents)
    }

    pub fn clear(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityProfile {
    pub login: String,
    pub public_repos: u32,
    pub followers: u32,
    pub following: u32,
}

impl IdentityProfile {
    pub fn meets_threshold(&self, cfg: &ReputationConfig) -> bool {
        self.public_repos >= cfg.min_repos && self.followers >= cfg.min_followers && self.following >= cfg.min_following
    }
}

pub struct IdentityClient {
    client: reqwest::Client,
    base_url: String,
}

impl IdentityClient {
    pub fn new(base_url: String) -> Self {
        Self { client: reqwest::Client::new(), base_url }
    }

    /// `checkGitHubReputation` + user-id resolution in one round trip: the
    /// identity provider's own profile endpoint carries both.
    pub async fn fetch_profile(&self, token: &str) -> Result<IdentityProfile, AuthError> {
        let response = self
            .client
            .get(format!("{}/user", self.base_url))
            .bearer_auth(token)
            .header("User-Agent", "ceremony-cli")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Transport(format!("identity provider returned {}", response.status())));
        }

        response
            .json::<IdentityProfile>()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_check_requires_all_three_minimums() {
        let profile = IdentityProfile { login: "alice".into(), public_repos: 5, followers: 10, following: 3 };
        let cfg = ReputationConfig { min_repos: 5, min_followers: 10, min_following: 3 };
        assert!(profile.meets_threshold(&cfg));

        let under_followers = ReputationConfig { min_repos: 5, min_followers: 11, min_following: 3 };
        assert!(!profile.meets_threshold(&under_followers));
    }

    #[test]
    fn session_round_trips_through_store() {
        let dir = std::env::temp_dir().join(format!("ceremony-cli-test-{}", std::process::id()));
        let store = TokenStore { path: dir.join("session.toml") };
        assert!(store.load().is_none());

        let session = StoredSession { token: "tok".into(), username: "alice".into() };
        store.save(&session).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.token, "tok");
        assert_eq!(loaded.username, "alice");

        store.clear().unwrap();
        assert!(store.load().is_none());
        let _ = std::fs::remove_dir(dir);
    }
}
