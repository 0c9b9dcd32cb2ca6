//! Time source used by every polling loop.
//!
//! All waits in the protocol engine are bounded busy-polls: check for data,
//! sleep a short interval, compare elapsed time against a deadline. Routing
//! both `now` and `sleep` through [`Clock`] lets tests drive those loops with
//! a virtual clock instead of wall time.

use std::time::{Duration, Instant};

/// Monotonic time source with a blocking sleep.
pub trait Clock: Send {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    /// Block for `duration`.
    fn sleep(&self, duration: Duration);

    /// Time elapsed since `start` (a value previously returned by `now`).
    fn since(&self, start: Duration) -> Duration {
        self.now().saturating_sub(start)
    }
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
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

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

#[cfg(test)]
pub(crate) mod virtual_clock {
    use super::Clock;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    /// Clock that only advances when slept on.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct VirtualClock {
        nanos: Arc<AtomicU64>,
    }

    impl VirtualClock {
        pub(crate) fn new() -> Self {
            Self::default()
        }
    }

    impl Clock for VirtualClock {
        fn now(&self) -> Duration {
            Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
        }

        #[allow(clippy::cast_possible_truncation)]
        fn sleep(&self, duration: Duration) {
            self.nanos
                .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        }
    }
}
