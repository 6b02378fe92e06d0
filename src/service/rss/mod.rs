//! The feed-polling service: tracks a set of feeds, polls each on its own
//! schedule, and announces new items to subscribed rooms.
//!
//! This is the one service with persisted state. Its config document maps
//! feed URL to per-feed polling state; the scheduler mutates that state on
//! every poll and commits it through the [`ConfigStore`] collaborator.

mod dispatch;
mod scheduler;

pub use dispatch::DeliveryError;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

use crate::client::ChatClient;
use crate::config::RssSection;
use crate::feed::FeedFetcher;
use crate::service::Service;
use crate::storage::{Database, DatabaseError};

pub const SERVICE_TYPE: &str = "rssbot";

/// Poll interval applied when neither the feed entry nor the `[rss]`
/// section configures one.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 600;

// ============================================================================
// Config Types
// ============================================================================

/// Per-feed polling state, one per subscribed URL.
///
/// Serialized as part of the service's config document; every field the
/// scheduler mutates round-trips through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Rooms that receive new items from this feed. May be empty; the
    /// feed is then tracked but silent.
    #[serde(default)]
    pub rooms: Vec<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Unix seconds; the feed is due once wall-clock time reaches this.
    /// Mutated only by the scheduler after a poll attempt.
    #[serde(default)]
    pub next_poll_timestamp: i64,
    /// Item id → last-seen publish timestamp (first-seen wall time when
    /// the feed supplies no date). Bounded by the scheduler's eviction cap.
    #[serde(default)]
    pub seen_items: HashMap<String, i64>,
    /// Fetch-failure streak, drives poll backoff. Reset on success.
    #[serde(default)]
    pub consecutive_failures: u32,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

/// The unit of persistence and of reconfiguration: everything the service
/// knows about its feeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub feeds: HashMap<String, FeedConfig>,
}

impl ServiceConfig {
    /// Validate the whole document. Any violation rejects the
    /// configuration wholesale; there is no partial apply.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (url, feed) in &self.feeds {
            validate_feed_url(url)?;
            if feed.poll_interval_seconds < 1 {
                return Err(ConfigError::IntervalTooSmall(url.clone()));
            }
        }
        Ok(())
    }
}

/// Configuration rejected at creation/update time, never at poll time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid feed URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("unsupported scheme '{scheme}' for feed '{url}' (only http/https)")]
    UnsupportedScheme { url: String, scheme: String },
    #[error("poll interval for feed '{0}' must be at least 1 second")]
    IntervalTooSmall(String),
}

fn validate_feed_url(url_str: &str) -> Result<(), ConfigError> {
    let url = Url::parse(url_str).map_err(|source| ConfigError::InvalidUrl {
        url: url_str.to_string(),
        source,
    })?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::UnsupportedScheme {
            url: url_str.to_string(),
            scheme: scheme.to_string(),
        }),
    }
}

/// Build the initial service document from the bot config file.
///
/// Interval precedence: per-feed, then `[rss] default_interval_seconds`,
/// then the built-in default. Rooms are treated as a set: duplicates in
/// the file collapse and the first occurrence keeps its position.
pub fn service_config_from(section: &RssSection) -> ServiceConfig {
    let default_interval = section
        .default_interval_seconds
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

    let feeds = section
        .feeds
        .iter()
        .map(|(url, entry)| {
            let mut rooms = Vec::with_capacity(entry.rooms.len());
            for room in &entry.rooms {
                if !rooms.contains(room) {
                    rooms.push(room.clone());
                }
            }
            (
                url.clone(),
                FeedConfig {
                    rooms,
                    poll_interval_seconds: entry.poll_interval_seconds.unwrap_or(default_interval),
                    next_poll_timestamp: 0,
                    seen_items: HashMap::new(),
                    consecutive_failures: 0,
                },
            )
        })
        .collect();

    ServiceConfig { feeds }
}

// ============================================================================
// Persistence Collaborator
// ============================================================================

/// Whole-document service configs keyed by service id. [`Database`] is the
/// production implementation; the seam exists so the core never touches
/// the store's internals.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load_config(&self, service_id: &str) -> Result<Option<ServiceConfig>, DatabaseError>;
    async fn store_config(
        &self,
        service_id: &str,
        config: &ServiceConfig,
    ) -> Result<(), DatabaseError>;
}

#[async_trait]
impl ConfigStore for Database {
    async fn load_config(&self, service_id: &str) -> Result<Option<ServiceConfig>, DatabaseError> {
        let Some(raw) = self.load_service_config(service_id).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn store_config(
        &self,
        service_id: &str,
        config: &ServiceConfig,
    ) -> Result<(), DatabaseError> {
        let raw = serde_json::to_string(config)?;
        self.store_service_config(service_id, SERVICE_TYPE, &raw)
            .await
    }
}

// ============================================================================
// Service
// ============================================================================

/// The externally visible service object. Owns the [`ServiceConfig`]
/// exclusively; the scheduler works from snapshots and commits back under
/// the config lock, one feed at a time.
pub struct RssService {
    service_id: String,
    fetcher: FeedFetcher,
    client: Arc<dyn ChatClient>,
    store: Arc<dyn ConfigStore>,
    config: Mutex<ServiceConfig>,
    // Poll cycles never overlap; a tick that arrives mid-cycle is skipped.
    cycle_guard: Mutex<()>,
}

impl RssService {
    /// Create the service, rejecting an invalid configuration wholesale.
    pub fn new(
        service_id: impl Into<String>,
        config: ServiceConfig,
        fetcher: FeedFetcher,
        client: Arc<dyn ChatClient>,
        store: Arc<dyn ConfigStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            service_id: service_id.into(),
            fetcher,
            client,
            store,
            config: Mutex::new(config),
            cycle_guard: Mutex::new(()),
        })
    }

    pub fn id(&self) -> &str {
        &self.service_id
    }

    /// Merge previously persisted state into the freshly configured feed
    /// set, then persist the merged document.
    ///
    /// URLs present in both old and new configuration carry their polling
    /// state over; new URLs initialize with `next_poll_timestamp` = now
    /// (unless the configuration set one explicitly); URLs no longer
    /// configured drop. Removal is only ever a reconfiguration effect,
    /// never a poll side effect.
    pub async fn register(&self) -> Result<(), DatabaseError> {
        let previous = self.store.load_config(&self.service_id).await?;
        let now = Utc::now().timestamp();

        let mut config = self.config.lock().await;
        for (url, feed) in config.feeds.iter_mut() {
            if let Some(old) = previous.as_ref().and_then(|p| p.feeds.get(url)) {
                feed.next_poll_timestamp = old.next_poll_timestamp;
                feed.seen_items = old.seen_items.clone();
                feed.consecutive_failures = old.consecutive_failures;
            } else if feed.next_poll_timestamp == 0 {
                feed.next_poll_timestamp = now;
            }
        }
        self.store.store_config(&self.service_id, &config).await
    }

    /// Read snapshot of the current service configuration.
    pub async fn config(&self) -> ServiceConfig {
        self.config.lock().await.clone()
    }

    /// Atomic read-modify-write of one feed's entry, persisted as a whole
    /// document.
    ///
    /// The config lock is held for the mutation and the store call (the
    /// commit step), never across a network fetch or a chat send.
    async fn commit_feed<F>(&self, url: &str, mutate: F) -> Result<(), DatabaseError>
    where
        F: FnOnce(&mut FeedConfig),
    {
        let mut config = self.config.lock().await;
        let Some(feed) = config.feeds.get_mut(url) else {
            // Feed removed by reconfiguration mid-cycle; nothing to commit.
            return Ok(());
        };
        mutate(feed);
        self.store.store_config(&self.service_id, &config).await
    }
}

#[async_trait]
impl Service for RssService {
    fn id(&self) -> &str {
        &self.service_id
    }

    fn service_type(&self) -> &'static str {
        SERVICE_TYPE
    }

    async fn on_poll(&self) {
        scheduler::poll_cycle(self).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SendError;
    use pretty_assertions::assert_eq;

    struct NullChat;

    #[async_trait]
    impl ChatClient for NullChat {
        async fn send_notice(&self, _room_id: &str, _body: &str) -> Result<(), SendError> {
            Ok(())
        }
    }

    fn feed_config(rooms: Vec<&str>, interval: u64) -> FeedConfig {
        FeedConfig {
            rooms: rooms.into_iter().map(String::from).collect(),
            poll_interval_seconds: interval,
            next_poll_timestamp: 0,
            seen_items: HashMap::new(),
            consecutive_failures: 0,
        }
    }

    fn config_with(url: &str, feed: FeedConfig) -> ServiceConfig {
        let mut feeds = HashMap::new();
        feeds.insert(url.to_string(), feed);
        ServiceConfig { feeds }
    }

    fn service_with(config: ServiceConfig, db: Database) -> Result<RssService, ConfigError> {
        RssService::new(
            "rssbot",
            config,
            FeedFetcher::new(reqwest::Client::new()),
            Arc::new(NullChat),
            Arc::new(db),
        )
    }

    #[test]
    fn test_validate_rejects_malformed_url() {
        let config = config_with("not a url", feed_config(vec![], 60));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_non_http_scheme() {
        let config = config_with("ftp://example.com/feed", feed_config(vec![], 60));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = config_with("https://example.com/feed.xml", feed_config(vec![], 0));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IntervalTooSmall(_))
        ));
    }

    #[test]
    fn test_empty_rooms_are_valid() {
        // A feed may be tracked but silent.
        let config = config_with("https://example.com/feed.xml", feed_config(vec![], 60));
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_register_initializes_next_poll_for_new_feed() {
        let db = Database::open(":memory:").await.unwrap();
        let service = service_with(
            config_with("https://example.com/feed.xml", feed_config(vec![], 60)),
            db,
        )
        .unwrap();

        let before = Utc::now().timestamp();
        service.register().await.unwrap();

        let config = service.config().await;
        let feed = &config.feeds["https://example.com/feed.xml"];
        assert!(feed.next_poll_timestamp >= before);
        assert!(feed.seen_items.is_empty());
    }

    #[tokio::test]
    async fn test_register_carries_state_for_known_feed() {
        let db = Database::open(":memory:").await.unwrap();

        // Persist a previous generation with accumulated state.
        let mut old_feed = feed_config(vec!["!old:example.org"], 60);
        old_feed.next_poll_timestamp = 12345;
        old_feed.seen_items.insert("item-1".to_string(), 99);
        old_feed.consecutive_failures = 2;
        let old = config_with("https://example.com/feed.xml", old_feed);
        ConfigStore::store_config(&db, "rssbot", &old).await.unwrap();

        // Reconfigure: same URL, new rooms, plus a brand-new feed.
        let mut new = config_with(
            "https://example.com/feed.xml",
            feed_config(vec!["!new:example.org"], 120),
        );
        new.feeds.insert(
            "https://other.example/feed.xml".to_string(),
            feed_config(vec![], 60),
        );

        let service = service_with(new, db).unwrap();
        service.register().await.unwrap();

        let config = service.config().await;
        let kept = &config.feeds["https://example.com/feed.xml"];
        // Polling state carried over; rooms and interval come from the new
        // configuration.
        assert_eq!(kept.next_poll_timestamp, 12345);
        assert_eq!(kept.seen_items.get("item-1"), Some(&99));
        assert_eq!(kept.consecutive_failures, 2);
        assert_eq!(kept.rooms, vec!["!new:example.org".to_string()]);
        assert_eq!(kept.poll_interval_seconds, 120);

        let fresh = &config.feeds["https://other.example/feed.xml"];
        assert!(fresh.next_poll_timestamp > 0);
        assert!(fresh.seen_items.is_empty());
    }

    #[tokio::test]
    async fn test_register_drops_removed_feed() {
        let db = Database::open(":memory:").await.unwrap();

        let old = config_with("https://gone.example/feed.xml", feed_config(vec![], 60));
        ConfigStore::store_config(&db, "rssbot", &old).await.unwrap();

        let service = service_with(
            config_with("https://kept.example/feed.xml", feed_config(vec![], 60)),
            db,
        )
        .unwrap();
        service.register().await.unwrap();

        let config = service.config().await;
        assert!(config.feeds.contains_key("https://kept.example/feed.xml"));
        assert!(!config.feeds.contains_key("https://gone.example/feed.xml"));
    }

    #[test]
    fn test_service_config_from_applies_interval_precedence() {
        use crate::config::FeedEntry;

        let mut section = RssSection {
            default_interval_seconds: Some(300),
            feeds: HashMap::new(),
        };
        section.feeds.insert(
            "https://a.example/feed.xml".to_string(),
            FeedEntry {
                rooms: vec!["!r:example.org".to_string(), "!r:example.org".to_string()],
                poll_interval_seconds: Some(60),
            },
        );
        section.feeds.insert(
            "https://b.example/feed.xml".to_string(),
            FeedEntry {
                rooms: vec![],
                poll_interval_seconds: None,
            },
        );

        let config = service_config_from(&section);
        assert_eq!(
            config.feeds["https://a.example/feed.xml"].poll_interval_seconds,
            60
        );
        assert_eq!(
            config.feeds["https://b.example/feed.xml"].poll_interval_seconds,
            300
        );
        // Duplicate rooms collapse.
        assert_eq!(
            config.feeds["https://a.example/feed.xml"].rooms,
            vec!["!r:example.org".to_string()]
        );
    }
}
