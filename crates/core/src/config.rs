//! Configuration (§6). Env-driven, following the `env_or`/`env_opt`
//! helper-pair convention.

use std::env;

use serde::{Deserialize, Serialize};

/// Load `.env` file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ceremony_id: String,
    pub coordination: CoordinationConfig,
    pub reputation: ReputationConfig,
    pub verification: VerificationConfig,
    pub aws: AwsConfig,
    pub identity: IdentityConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            ceremony_id: env_or("CEREMONY_ID", ""),
            coordination: CoordinationConfig::from_env(),
            reputation: ReputationConfig::from_env(),
            verification: VerificationConfig::from_env(),
            aws: AwsConfig::from_env(),
            identity: IdentityConfig::from_env(),
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  ceremony:     id={}", self.ceremony_id);
        tracing::info!("  coordination: base_url={}", self.coordination.base_url);
        tracing::info!(
            "  reputation:   repos>={} followers>={} following>={}",
            self.reputation.min_repos,
            self.reputation.min_followers,
            self.reputation.min_following
        );
        tracing::info!(
            "  aws:          region={} bucket_postfix={}",
            self.aws.region,
            self.aws.bucket_postfix
        );
    }
}

/// Terms table mapping logical collection names to storage paths, plus the
/// coordination store's base URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    pub base_url: String,
    pub ceremonies_term: String,
    pub participants_term: String,
    pub circuits_term: String,
    pub timeouts_term: String,
    pub contributions_term: String,
}

impl CoordinationConfig {
    fn from_env() -> Self {
        Self {
            base_url: env_or("COORDINATION_BASE_URL", "https://ceremony.example/api"),
            ceremonies_term: env_or("TERM_CEREMONIES", "ceremonies"),
            participants_term: env_or("TERM_PARTICIPANTS", "participants"),
            circuits_term: env_or("TERM_CIRCUITS", "circuits"),
            timeouts_term: env_or("TERM_TIMEOUTS", "timeouts"),
            contributions_term: env_or("TERM_CONTRIBUTIONS", "contributions"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationConfig {
    pub min_repos: u32,
    pub min_followers: u32,
    pub min_following: u32,
}

impl ReputationConfig {
    fn from_env() -> Self {
        Self {
            min_repos: env_u32("GITHUB_REPOS", 0),
            min_followers: env_u32("GITHUB_FOLLOWERS", 0),
            min_following: env_u32("GITHUB_FOLLOWING", 0),
        }
    }

    /// Human-readable threshold explanation, used verbatim as the status
    /// message on reputation-gate failure (spec.md §4.8 step 2 / §8
    /// scenario 6).
    pub fn threshold_explanation(&self) -> String {
        format!(
            "your GitHub account does not meet the ceremony's reputation thresholds \
             (requires at least {} repositories, {} followers, {} following)",
            self.min_repos, self.min_followers, self.min_following
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub verify_contribution_url: String,
}

impl VerificationConfig {
    fn from_env() -> Self {
        Self {
            verify_contribution_url: env_or("VERIFY_CONTRIBUTION_URL", ""),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
    pub bucket_postfix: String,
}

impl AwsConfig {
    fn from_env() -> Self {
        Self {
            region: env_or("AWS_REGION", "us-east-1"),
            access_key_id: env_opt("AWS_ACCESS_KEY_ID"),
            secret_access_key: env_opt("AWS_SECRET_ACCESS_KEY"),
            session_token: env_opt("AWS_SESSION_TOKEN"),
            endpoint_url: env_opt("AWS_ENDPOINT_URL"),
            bucket_postfix: env_or("BUCKET_POSTFIX", "-zkeys"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.access_key_id.is_some()
    }
}

/// Identity provider endpoints (§6 Identity provider / §4.7 attestation
/// publish).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub profile_url: String,
    pub attestation_publish_url: String,
}

impl IdentityConfig {
    fn from_env() -> Self {
        Self {
            profile_url: env_or("IDENTITY_BASE_URL", "https://api.github.com"),
            attestation_publish_url: env_or("ATTESTATION_PUBLISH_URL", "https://api.github.com/gists"),
        }
    }
}
