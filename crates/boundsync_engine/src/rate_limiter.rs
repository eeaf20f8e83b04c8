//! Time-windowed, per-key refetch gate.

use crate::clock::{Clock, SystemClock};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Decides whether data for a key is old enough to be fetched again.
///
/// The limiter remembers when each key was last allowed to fetch. A key is
/// allowed again once more than `window` has elapsed, or after [`reset`].
///
/// # Concurrency
///
/// Check and stamp happen under one lock, so concurrent callers asking about
/// the same key within one window get exactly one `true` between them.
/// Entries live in a single map rather than one lock per key; call
/// [`prune`] to drop entries whose window has elapsed.
///
/// [`reset`]: RateLimiter::reset
/// [`prune`]: RateLimiter::prune
///
/// # Example
///
/// ```rust
/// use boundsync_engine::RateLimiter;
/// use std::time::Duration;
///
/// let limiter = RateLimiter::new(Duration::from_secs(600));
/// assert!(limiter.should_fetch(&"octocat"));
/// assert!(!limiter.should_fetch(&"octocat"));
///
/// limiter.reset(&"octocat");
/// assert!(limiter.should_fetch(&"octocat"));
/// ```
pub struct RateLimiter<K> {
    window: Duration,
    clock: Arc<dyn Clock>,
    stamps: Mutex<HashMap<K, Instant>>,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    /// Creates a limiter on the system clock.
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    /// Creates a limiter on a custom clock.
    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            stamps: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configured window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns true if `key` may be fetched now, and if so stamps it.
    pub fn should_fetch(&self, key: &K) -> bool {
        let now = self.clock.now();
        let mut stamps = self.stamps.lock();

        let allowed = match stamps.get(key) {
            None => true,
            Some(last) => now.saturating_duration_since(*last) > self.window,
        };
        if allowed {
            stamps.insert(key.clone(), now);
        }
        allowed
    }

    /// Forgets `key`, so the next [`should_fetch`](Self::should_fetch) returns true.
    pub fn reset(&self, key: &K) {
        if self.stamps.lock().remove(key).is_some() {
            trace!("rate limit entry reset");
        }
    }

    /// Drops every entry whose window has elapsed. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        let now = self.clock.now();
        let mut stamps = self.stamps.lock();
        let before = stamps.len();
        stamps.retain(|_, last| now.saturating_duration_since(*last) <= self.window);
        before - stamps.len()
    }

    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.stamps.lock().len()
    }

    /// Returns true if no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn limiter(window: Duration) -> (RateLimiter<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(window, clock.clone() as Arc<dyn Clock>);
        (limiter, clock)
    }

    #[test]
    fn first_call_allowed_second_denied() {
        let (limiter, _) = limiter(Duration::from_secs(60));
        let key = "octocat".to_string();

        assert!(limiter.should_fetch(&key));
        assert!(!limiter.should_fetch(&key));
    }

    #[test]
    fn allowed_again_only_after_window_elapsed() {
        let (limiter, clock) = limiter(Duration::from_secs(60));
        let key = "octocat".to_string();
        assert!(limiter.should_fetch(&key));

        clock.advance(Duration::from_secs(60));
        assert!(!limiter.should_fetch(&key), "window must be exceeded, not met");

        clock.advance(Duration::from_millis(1));
        assert!(limiter.should_fetch(&key));
        assert!(!limiter.should_fetch(&key));
    }

    #[test]
    fn reset_allows_immediately() {
        let (limiter, _) = limiter(Duration::from_secs(600));
        let key = "octocat".to_string();
        assert!(limiter.should_fetch(&key));

        limiter.reset(&key);
        assert!(limiter.should_fetch(&key));
    }

    #[test]
    fn keys_are_independent() {
        let (limiter, _) = limiter(Duration::from_secs(600));
        assert!(limiter.should_fetch(&"a".to_string()));
        assert!(limiter.should_fetch(&"b".to_string()));
        assert!(!limiter.should_fetch(&"a".to_string()));
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn prune_drops_expired_entries() {
        let (limiter, clock) = limiter(Duration::from_secs(10));
        limiter.should_fetch(&"old".to_string());
        clock.advance(Duration::from_secs(11));
        limiter.should_fetch(&"fresh".to_string());

        assert_eq!(limiter.prune(), 1);
        assert_eq!(limiter.len(), 1);
        assert!(!limiter.should_fetch(&"fresh".to_string()));
    }

    #[test]
    fn concurrent_callers_get_one_permit_per_window() {
        let limiter = Arc::new(RateLimiter::<String>::new(Duration::from_secs(600)));
        let granted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let granted = Arc::clone(&granted);
                thread::spawn(move || {
                    for _ in 0..100 {
                        if limiter.should_fetch(&"shared".to_string()) {
                            granted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(granted.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn allow_deny_reset_cycle(key in "[a-z]{1,12}", window_ms in 1u64..1_000_000) {
            let (limiter, clock) = limiter(Duration::from_millis(window_ms));

            prop_assert!(limiter.should_fetch(&key));
            clock.advance(Duration::from_millis(window_ms - 1));
            prop_assert!(!limiter.should_fetch(&key));

            limiter.reset(&key);
            prop_assert!(limiter.should_fetch(&key));
        }
    }
}
