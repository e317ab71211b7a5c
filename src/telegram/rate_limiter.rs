//! Rate limiting for Telegram API calls and user operations.
//!
//! Two limiters live here:
//! - [`SendPacer`] spaces outgoing sends by a minimum interval and absorbs
//!   Telegram flood waits
//! - [`SlidingWindowLimiter`] caps how many operations of one kind a user may
//!   perform within a trailing time window

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::UserId;

/// Kinds of operation that are rate limited per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Forward,
    Broadcast,
    Backup,
    Login,
}

/// Enforces a minimum interval between outgoing sends.
#[derive(Debug)]
pub struct SendPacer {
    /// Minimum duration between allowed operations.
    min_interval: Duration,

    /// Last time an operation was performed.
    last_operation: Mutex<Option<Instant>>,
}

impl SendPacer {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_operation: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// Waits until a send is allowed, then marks it as performed.
    ///
    /// Returns the duration waited (0 if no wait was needed).
    pub async fn wait_and_acquire(&self) -> Duration {
        let mut last = self.last_operation.lock().await;

        let wait_duration = last.map_or(Duration::ZERO, |last_time| {
            self.min_interval.saturating_sub(last_time.elapsed())
        });

        if !wait_duration.is_zero() {
            debug!("Send pacer: waiting {:?} before next send", wait_duration);
            tokio::time::sleep(wait_duration).await;
        }

        *last = Some(Instant::now());
        wait_duration
    }

    /// Sleeps out a flood wait reported by Telegram and restarts the interval.
    pub async fn handle_flood_wait(&self, wait_seconds: u32) {
        warn!("Received flood wait from Telegram: {} seconds", wait_seconds);
        let mut last = self.last_operation.lock().await;
        tokio::time::sleep(Duration::from_secs(u64::from(wait_seconds))).await;
        *last = Some(Instant::now());
    }
}

/// Sliding-window counter: at most `max_count` operations per key within
/// any trailing `window`.
#[derive(Debug)]
pub struct SlidingWindowLimiter<K = (UserId, OperationKind)> {
    max_count: usize,
    window: Duration,
    entries: Mutex<HashMap<K, VecDeque<Instant>>>,
}

impl<K: Eq + Hash> SlidingWindowLimiter<K> {
    #[must_use]
    pub fn new(max_count: usize, window: Duration) -> Self {
        Self {
            max_count,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records an operation if the key is under its limit.
    ///
    /// Returns `false` (and records nothing) when the limit is reached.
    pub async fn try_acquire(&self, key: K) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let stamps = entries.entry(key).or_default();
        prune(stamps, now, self.window);

        if stamps.len() >= self.max_count {
            return false;
        }
        stamps.push_back(now);
        true
    }

    /// Time until the key may perform another operation.
    pub async fn retry_after(&self, key: &K) -> Duration {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let Some(stamps) = entries.get_mut(key) else {
            return Duration::ZERO;
        };
        prune(stamps, now, self.window);

        if stamps.len() < self.max_count {
            return Duration::ZERO;
        }
        stamps.front().map_or(Duration::ZERO, |oldest| {
            (*oldest + self.window).saturating_duration_since(now)
        })
    }

    /// Drops keys whose window holds no recent operations.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, stamps| {
            prune(stamps, now, self.window);
            !stamps.is_empty()
        });
    }

    /// Number of keys currently tracked.
    pub async fn tracked(&self) -> usize {
        self.entries.lock().await.len()
    }
}

fn prune(stamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while stamps
        .front()
        .is_some_and(|oldest| now.saturating_duration_since(*oldest) >= window)
    {
        stamps.pop_front();
    }
}
