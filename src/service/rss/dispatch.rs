use thiserror::Error;

use crate::client::{ChatClient, SendError};
use crate::feed::FeedItem;

/// A single (item, room) delivery that failed. Collected by the caller,
/// never raised as an aggregate; one room's failure must not starve the
/// others.
#[derive(Debug, Error)]
#[error("delivery to {room} failed for '{item_title}'")]
pub struct DeliveryError {
    pub room: String,
    pub item_title: String,
    #[source]
    pub source: SendError,
}

/// Human-readable notice for one feed item.
pub(super) fn format_notice(item: &FeedItem) -> String {
    if item.link.is_empty() {
        item.title.clone()
    } else {
        format!("{}: {}", item.title, item.link)
    }
}

/// Send every new item to every subscribed room.
///
/// Items arrive in announcement order and are delivered sequentially, so
/// each room sees items in feed order. Deduplication already happened in
/// the scheduler; everything passed in here is sent.
pub(super) async fn deliver(
    client: &dyn ChatClient,
    rooms: &[String],
    items: &[FeedItem],
) -> Vec<DeliveryError> {
    let mut failures = Vec::new();

    for item in items {
        let body = format_notice(item);
        for room in rooms {
            if let Err(source) = client.send_notice(room, &body).await {
                failures.push(DeliveryError {
                    room: room.clone(),
                    item_title: item.title.clone(),
                    source,
                });
            }
        }
    }

    failures
}
