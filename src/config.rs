//! Bot configuration loaded from a TOML file.
//!
//! The `[bot]` section is required (the bot cannot run without a
//! homeserver and token), but every optional key falls back to a default
//! so a minimal config stays minimal. The access token deserializes into a
//! [`SecretString`] and never appears in Debug output or logs.

use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Deserialize)]
pub struct BotConfig {
    pub bot: BotSection,
    #[serde(default)]
    pub rss: RssSection,
}

#[derive(Debug, Deserialize)]
pub struct BotSection {
    /// Homeserver base URL, e.g. `https://matrix.example.org`.
    pub homeserver: String,
    /// The bot's own user id, e.g. `@herald:example.org`.
    pub user_id: String,
    pub access_token: SecretString,
    #[serde(default = "default_database")]
    pub database: String,
    /// Cadence of the host timer that triggers poll cycles. Feeds each
    /// carry their own interval; this only bounds how promptly a due feed
    /// is noticed.
    #[serde(default = "default_poll_tick")]
    pub poll_tick_seconds: u64,
}

fn default_database() -> String {
    "herald.db".to_string()
}

fn default_poll_tick() -> u64 {
    10
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RssSection {
    /// Interval applied to feeds that do not set their own.
    pub default_interval_seconds: Option<u64>,
    /// Feed URL → subscription entry.
    pub feeds: HashMap<String, FeedEntry>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct FeedEntry {
    pub rooms: Vec<String>,
    pub poll_interval_seconds: Option<u64>,
}

impl BotConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
