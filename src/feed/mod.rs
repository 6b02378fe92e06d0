//! Feed fetching and parsing.
//!
//! [`parser`] turns a raw payload into ordered [`FeedItem`]s; [`fetcher`]
//! owns the single-request HTTP contract around it. Neither holds state;
//! everything the bot remembers about a feed lives in the service layer.

mod fetcher;
mod parser;

pub use fetcher::{FeedFetcher, FetchError};
pub use parser::{parse_feed, FeedItem};
