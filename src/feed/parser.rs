use html_escape::decode_html_entities;
use sha2::{Digest, Sha256};

/// A single entry extracted from a syndication feed.
///
/// Transient: the scheduler only persists the id/timestamp pair it needs
/// for deduplication.
#[derive(Debug, Clone)]
pub struct FeedItem {
    /// Stable identity: feed guid, falling back to link, falling back to a
    /// content hash.
    pub id: String,
    pub title: String,
    pub link: String,
    /// Publish time as Unix seconds, when the feed supplies one.
    pub published_at: Option<i64>,
}

/// Parse a fetched payload into items, in the order the feed lists them.
///
/// Titles frequently carry HTML character references (publishers escape
/// punctuation even inside CDATA, where the XML layer will not touch it),
/// so titles are decoded to their Unicode code points here. By the time an
/// item leaves this function it is plain text.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedItem>, feed_rs::parser::ParseFeedError> {
    let feed = feed_rs::parser::parse(bytes)?;

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();
            let published_at = entry.published.or(entry.updated).map(|dt| dt.timestamp());
            let title = entry
                .title
                .map(|t| decode_html_entities(&t.content).into_owned())
                .unwrap_or_else(|| "Untitled".to_string());

            let existing_id = if entry.id.is_empty() {
                None
            } else {
                Some(entry.id.as_str())
            };
            let id = item_id(existing_id, &link, &title, published_at);

            FeedItem {
                id,
                title,
                link,
                published_at,
            }
        })
        .collect();

    Ok(items)
}

/// Item identity used for deduplication across polls.
///
/// Prefers the guid the feed declares; items without one fall back to the
/// link, and items with neither get a hash of their content so they still
/// dedup stably between polls.
fn item_id(existing: Option<&str>, link: &str, title: &str, published_at: Option<i64>) -> String {
    if let Some(guid) = existing {
        let trimmed = guid.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    if !link.is_empty() {
        return link.to_string();
    }

    let input = format!(
        "{}|{}",
        title,
        published_at.map(|p| p.to_string()).unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}
