use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic time source shared by the drivers and the pour loop.
///
/// Polling delays, tare settle time and per-ingredient time budgets all go
/// through this trait so tests can run a whole pour without wall-clock waits.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        u64::try_from(dur.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Clock handle as stored by long-lived components.
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// Real-time monotonic clock backed by `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

#[cfg(any(test, feature = "test-clock"))]
pub mod test_clock {
    use super::*;
    use std::sync::Mutex;

    /// Deterministic clock whose time only moves when slept on or advanced.
    ///
    /// `now() = origin + offset`; `sleep(d)` adds `d` to the offset and
    /// returns immediately. Clones share the same offset.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        /// Advance the clock by the given duration.
        pub fn advance(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = off.saturating_add(d);
            }
        }

        /// Total simulated time elapsed since construction.
        pub fn elapsed(&self) -> Duration {
            self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.origin + self.elapsed()
        }

        fn sleep(&self, d: Duration) {
            // Yield so threads polling on a TestClock don't starve each other.
            thread::yield_now();
            self.advance(d);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn sleep_advances_without_waiting() {
            let clock = TestClock::new();
            let start = clock.now();
            clock.sleep(Duration::from_secs(3600));
            assert_eq!(clock.ms_since(start), 3_600_000);
        }

        #[test]
        fn clones_share_time() {
            let a = TestClock::new();
            let b = a.clone();
            a.advance(Duration::from_millis(150));
            assert_eq!(b.elapsed(), Duration::from_millis(150));
        }
    }
}
