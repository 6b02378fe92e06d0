//! herald: a Matrix bot that bridges syndication feeds into rooms.
//!
//! The crate is organized around the poll pipeline: [`feed`] fetches and
//! parses remote feeds, [`service::rss`] decides when to poll and which
//! items are new, [`client`] delivers notices to rooms, and [`storage`]
//! persists per-feed state between cycles.

pub mod client;
pub mod config;
pub mod feed;
pub mod service;
pub mod storage;
