//! Helpers for draining envelope streams in tests.

use futures::{Stream, StreamExt};
use std::time::Duration;

/// Default time a test waits for a stream before giving up.
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// Collects every item until the stream ends.
///
/// # Panics
///
/// Panics if the stream does not end within [`STREAM_TIMEOUT`].
pub async fn collect_all<S>(stream: S) -> Vec<S::Item>
where
    S: Stream,
{
    tokio::time::timeout(STREAM_TIMEOUT, stream.collect::<Vec<_>>())
        .await
        .expect("Stream did not end in time")
}

/// Collects exactly `count` items, leaving the stream open.
///
/// # Panics
///
/// Panics if fewer than `count` items arrive within [`STREAM_TIMEOUT`].
pub async fn collect_n<S>(stream: &mut S, count: usize) -> Vec<S::Item>
where
    S: Stream + Unpin,
{
    let mut items = Vec::with_capacity(count);
    while items.len() < count {
        let next = tokio::time::timeout(STREAM_TIMEOUT, stream.next())
            .await
            .expect("Stream stalled");
        match next {
            Some(item) => items.push(item),
            None => panic!(
                "Stream ended after {} items, expected {}",
                items.len(),
                count
            ),
        }
    }
    items
}

/// Asserts that the stream yields nothing within `wait`.
///
/// # Panics
///
/// Panics if an item arrives in time.
pub async fn assert_quiet<S>(stream: &mut S, wait: Duration)
where
    S: Stream + Unpin,
    S::Item: std::fmt::Debug,
{
    if let Ok(Some(item)) = tokio::time::timeout(wait, stream.next()).await {
        panic!("Unexpected item: {:?}", item);
    }
}
