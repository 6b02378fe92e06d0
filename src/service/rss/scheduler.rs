use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;

use super::{dispatch, FeedConfig, RssService};
use crate::feed::FeedItem;

/// Upper bound on simultaneous feed fetches within one cycle.
const MAX_CONCURRENT_POLLS: usize = 10;

/// `seen_items` is bounded to `SEEN_CAP_FACTOR ×` the fetched item count,
/// with a floor so tiny feeds keep enough history across layout churn.
const MIN_SEEN_CAP: usize = 30;
const SEEN_CAP_FACTOR: usize = 3;

/// Ceiling for failure backoff; a broken feed is retried at least this
/// often.
const MAX_BACKOFF_SECS: u64 = 6 * 60 * 60;

/// One evaluation pass over all configured feeds.
///
/// Feeds are evaluated independently: one feed failing to fetch or
/// deliver never blocks another feed in the same tick. The config lock is
/// held only to snapshot the due set and, per feed, to commit, never
/// across a fetch or a send.
pub(super) async fn poll_cycle(service: &RssService) {
    // Skip the tick entirely if the previous cycle is still running;
    // overlapping cycles could poll the same feed twice.
    let _cycle = match service.cycle_guard.try_lock() {
        Ok(guard) => guard,
        Err(_) => {
            tracing::warn!(
                service = service.id(),
                "previous poll cycle still running, skipping tick"
            );
            return;
        }
    };

    let now = Utc::now().timestamp();
    let due: Vec<(String, FeedConfig)> = {
        let config = service.config.lock().await;
        config
            .feeds
            .iter()
            .filter(|(_, feed)| feed.next_poll_timestamp <= now)
            .map(|(url, feed)| (url.clone(), feed.clone()))
            .collect()
    };

    if due.is_empty() {
        return;
    }
    tracing::debug!(service = service.id(), due = due.len(), "poll cycle start");

    stream::iter(due)
        .map(|(url, feed)| poll_feed(service, url, feed))
        .buffer_unordered(MAX_CONCURRENT_POLLS)
        .collect::<Vec<()>>()
        .await;
}

/// Poll one due feed: fetch, compute the delta, fan out, commit.
async fn poll_feed(service: &RssService, url: String, feed: FeedConfig) {
    match service.fetcher.fetch(&url).await {
        Ok(items) => {
            let delta = compute_delta(&items, &feed.seen_items);

            if !delta.is_empty() {
                tracing::info!(
                    service = service.id(),
                    feed = %url,
                    new_items = delta.len(),
                    rooms = feed.rooms.len(),
                    "announcing new feed items"
                );
                let failures = dispatch::deliver(service.client.as_ref(), &feed.rooms, &delta).await;
                for failure in &failures {
                    tracing::warn!(
                        service = service.id(),
                        feed = %url,
                        room = %failure.room,
                        error = %failure.source,
                        "notice delivery failed"
                    );
                }
            }

            // Delivery failures do not hold the feed back: the state is
            // committed regardless, and a broken room simply misses
            // notices until its sends succeed again.
            let now = Utc::now().timestamp();
            let committed = service
                .commit_feed(&url, |f| {
                    merge_seen(&mut f.seen_items, &items, now);
                    f.consecutive_failures = 0;
                    f.next_poll_timestamp = now + f.poll_interval_seconds as i64;
                })
                .await;
            if let Err(e) = committed {
                tracing::error!(service = service.id(), feed = %url, error = %e, "feed state commit failed");
            }
        }
        Err(err) => {
            tracing::warn!(service = service.id(), feed = %url, error = %err, "feed fetch failed");

            // Still advance next_poll so a persistently broken feed does
            // not busy-poll; seen_items stays untouched.
            let now = Utc::now().timestamp();
            let committed = service
                .commit_feed(&url, |f| {
                    f.consecutive_failures = f.consecutive_failures.saturating_add(1);
                    let backoff = backoff_secs(f.poll_interval_seconds, f.consecutive_failures);
                    f.next_poll_timestamp = now + backoff as i64;
                })
                .await;
            if let Err(e) = committed {
                tracing::error!(service = service.id(), feed = %url, error = %e, "feed state commit failed");
            }
        }
    }
}

/// Items not yet recorded as seen, or recorded with an older publish time.
///
/// Delivered oldest first when the feed dates every new item; otherwise
/// fetcher order is kept.
fn compute_delta(items: &[FeedItem], seen: &HashMap<String, i64>) -> Vec<FeedItem> {
    let mut delta: Vec<FeedItem> = items
        .iter()
        .filter(|item| match seen.get(&item.id) {
            None => true,
            Some(&recorded) => item.published_at.is_some_and(|p| p > recorded),
        })
        .cloned()
        .collect();

    if !delta.is_empty() && delta.iter().all(|i| i.published_at.is_some()) {
        delta.sort_by_key(|i| i.published_at);
    }
    delta
}

/// Record every fetched item, then bound the map (LRU by publish time).
///
/// Re-recording items still listed in the feed keeps them newest, so
/// eviction only sheds ids that have scrolled out of the feed, so a live
/// item can never be evicted and re-announced.
fn merge_seen(seen: &mut HashMap<String, i64>, items: &[FeedItem], now: i64) {
    for item in items {
        let ts = item.published_at.unwrap_or(now);
        let entry = seen.entry(item.id.clone()).or_insert(ts);
        if ts > *entry {
            *entry = ts;
        }
    }

    let cap = (items.len() * SEEN_CAP_FACTOR).max(MIN_SEEN_CAP);
    if seen.len() > cap {
        let mut by_age: Vec<(String, i64)> = seen.drain().collect();
        by_age.sort_by_key(|&(_, ts)| std::cmp::Reverse(ts));
        by_age.truncate(cap);
        seen.extend(by_age);
    }
}

/// Failure backoff: the configured interval doubled per consecutive
/// failure, capped. The first failure retries after the plain interval.
fn backoff_secs(interval: u64, failures: u32) -> u64 {
    let shift = failures.saturating_sub(1).min(6);
    interval
        .saturating_mul(1u64 << shift)
        .min(MAX_BACKOFF_SECS.max(interval))
}
