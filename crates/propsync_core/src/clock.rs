//! Time sources.
//!
//! The scheduler only needs a monotonic reading; wall-clock seconds are
//! used for record timestamps and schedule evaluation.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync {
    /// Monotonic time since the clock was created.
    fn now(&self) -> Duration;

    /// Current unix time in seconds.
    fn unix_time(&self) -> u64;
}

/// Clock backed by tokio's instant, so paused test time is honored.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: tokio::time::Instant,
}

impl SystemClock {
    /// Creates a clock starting now.
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn unix_time(&self) -> u64 {
        unix_now()
    }
}

/// Manually advanced clock for tests and simulations.
///
/// Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualTime>>,
}

#[derive(Debug)]
struct ManualTime {
    elapsed: Duration,
    unix_base: u64,
}

impl ManualClock {
    /// Creates a clock at zero elapsed time and the given unix time.
    pub fn new(unix_base: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualTime {
                elapsed: Duration::ZERO,
                unix_base,
            })),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.inner.lock().elapsed += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.inner.lock().elapsed
    }

    fn unix_time(&self) -> u64 {
        let time = self.inner.lock();
        time.unix_base + time.elapsed.as_secs()
    }
}

/// Current unix time in seconds, zero if the system clock is before 1970.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        let shared = clock.clone();

        assert_eq!(clock.now(), Duration::ZERO);
        shared.advance(Duration::from_millis(2_500));
        assert_eq!(clock.now(), Duration::from_millis(2_500));
        assert_eq!(clock.unix_time(), 1_002);
    }

    #[tokio::test(start_paused = true)]
    async fn system_clock_follows_tokio_time() {
        let clock = SystemClock::new();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(clock.now() >= Duration::from_secs(3));
        assert!(clock.unix_time() > 0);
    }
}
