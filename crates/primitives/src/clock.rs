//! Wall clock abstraction so timestamps can be controlled in tests

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time in milliseconds since the unix epoch
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> u64;
}

/// Clock backed by [SystemTime]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "test-utils"))]
mod manual {
    use super::Clock;
    use std::sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    };

    /// Clock that only moves when told to
    #[derive(Debug, Default, Clone)]
    pub struct ManualClock(Arc<AtomicU64>);

    impl ManualClock {
        pub fn new(now: u64) -> Self {
            Self(Arc::new(AtomicU64::new(now)))
        }

        pub fn set(&self, now: u64) {
            self.0.store(now, Ordering::SeqCst);
        }

        pub fn advance(&self, millis: u64) {
            self.0.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }
}
