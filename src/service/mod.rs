//! Bot service framework seam.
//!
//! A service is a long-lived plugin the bot host drives on a timer. The
//! host knows nothing about what a service does between ticks; it just
//! calls `on_poll` and moves on.

pub mod rss;

use async_trait::async_trait;

#[async_trait]
pub trait Service: Send + Sync {
    /// Stable identifier for this service instance; also its persistence
    /// key.
    fn id(&self) -> &str;

    /// Machine-readable service kind, e.g. `"rssbot"`.
    fn service_type(&self) -> &'static str;

    /// Run one poll cycle. Never returns an error: every failure is
    /// contained and logged, and outcomes are observed through sent
    /// messages and persisted state.
    async fn on_poll(&self);
}
