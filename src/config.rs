//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default Discord REST base URL.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Default pending-state marker placed on candidate messages.
pub const DEFAULT_MARKER: &str = "⏳";

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wait between the grant and revoke phases of role mutation.
    pub settle_delay: Duration,
    /// Reaction emoji used as the pending-state marker.
    pub marker_emoji: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(250),
            marker_emoji: DEFAULT_MARKER.to_string(),
        }
    }
}

/// Process configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bot token used for `Authorization: Bot <token>`.
    pub bot_token: SecretString,
    /// Discord REST base URL.
    pub api_base: String,
    /// Path of the libSQL policy database.
    pub db_path: PathBuf,
    /// Port of the ingest HTTP server.
    pub port: u16,
    /// Upper bound on history pages fetched per intro channel.
    pub history_page_limit: usize,
    /// Shared secret the gateway relay must present, if any.
    pub ingest_token: Option<SecretString>,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup("DISCORD_BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("DISCORD_BOT_TOKEN".into()))?;

        let api_base = lookup("DISCORD_API_BASE")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let db_path = lookup("WELCOME_GATE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/welcome-gate.db"));

        let port: u16 = parse_or("WELCOME_GATE_PORT", &lookup, 8080)?;
        let settle_ms: u64 = parse_or("WELCOME_GATE_SETTLE_MS", &lookup, 250)?;
        let history_page_limit: usize = parse_or("WELCOME_GATE_HISTORY_PAGES", &lookup, 100)?;

        let marker_emoji = lookup("WELCOME_GATE_MARKER")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_MARKER.to_string());

        let ingest_token = lookup("WELCOME_GATE_INGEST_TOKEN")
            .filter(|t| !t.is_empty())
            .map(SecretString::from);

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            api_base,
            db_path,
            port,
            history_page_limit,
            ingest_token,
            engine: EngineConfig {
                settle_delay: Duration::from_millis(settle_ms),
                marker_emoji,
            },
        })
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}
