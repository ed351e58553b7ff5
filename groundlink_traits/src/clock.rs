use chrono::{DateTime, Utc};
use std::thread;
use std::time::{Duration, Instant};

/// Clock abstraction for the session loop and the uplink scheduler.
///
/// - now(): returns a monotonic Instant (cycle pacing)
/// - utc_now(): wall-clock UTC time (dispatch timestamps, observation windows)
/// - sleep(): sleeps for the provided duration (implementations may simulate)
/// - ms_since(): helper to compute elapsed milliseconds from an epoch Instant
pub trait Clock {
    fn now(&self) -> Instant;
    fn utc_now(&self) -> DateTime<Utc>;
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        dur.as_millis() as u64
    }
}

/// Default real-time clock backed by `Instant` and the system UTC clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
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

    /// Deterministic test clock whose time can be advanced manually.
    ///
    /// now() = origin + offset, utc_now() = origin_utc + offset.
    /// sleep(d) advances internal time by d without actually sleeping.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        origin_utc: DateTime<Utc>,
        offset: std::sync::Arc<std::sync::Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self::starting_at(Utc::now())
        }

        /// Clock whose UTC reading starts at `origin_utc`.
        pub fn starting_at(origin_utc: DateTime<Utc>) -> Self {
            Self {
                origin: Instant::now(),
                origin_utc,
                offset: std::sync::Arc::new(std::sync::Mutex::new(Duration::ZERO)),
            }
        }

        /// Advance the clock by the given duration.
        pub fn advance(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = off.saturating_add(d);
            }
        }

        fn offset(&self) -> Duration {
            self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.origin + self.offset()
        }

        fn utc_now(&self) -> DateTime<Utc> {
            let off = chrono::Duration::from_std(self.offset()).unwrap_or(chrono::Duration::zero());
            self.origin_utc + off
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }
    }

}
