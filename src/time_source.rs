//! Time source abstraction for real and manually driven time.
//!
//! The controller asks a [`TimeSource`] for "now" instead of reading the system
//! clock, so tests can pin the date a scheduling pass runs for and move time
//! forward together with the manual timer implementation.

use chrono::{DateTime, Utc};

/// Trait for abstracting time operations
pub trait TimeSource: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;

    /// Check if this is a simulated time source
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Real-time implementation that uses actual system time
#[derive(Debug, Default, Clone, Copy)]
pub struct RealTimeSource;

impl TimeSource for RealTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(any(test, feature = "testing-support"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "testing-support"))]
mod manual {
    use super::TimeSource;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Mutex;

    /// Settable clock for tests; time only moves when told to.
    #[derive(Debug)]
    pub struct ManualClock {
        current: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                current: Mutex::new(start),
            }
        }

        /// Set the current time. Moving backwards is allowed.
        pub fn set(&self, time: DateTime<Utc>) {
            *self.current.lock().unwrap_or_else(|e| e.into_inner()) = time;
        }

        pub fn advance(&self, by: Duration) {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            *current += by;
        }
    }

    impl TimeSource for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.current.lock().unwrap_or_else(|e| e.into_inner())
        }

        fn is_simulated(&self) -> bool {
            true
        }
    }
}
