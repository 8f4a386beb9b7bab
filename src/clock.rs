//! Date provider used by the stateful components.
//!
//! Pure functions in this crate take `now`/`at` as an explicit parameter. Components that stamp
//! events on their own (the evaluation aggregator, the exposure logger) take a [`Clock`] instead,
//! so tests can drive time deterministically.

use std::sync::Mutex;

use chrono::Utc;

#[allow(missing_docs)]
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current device time.
    fn now(&self) -> Timestamp;
}

/// Production clock reading the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to. Intended for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> ManualClock {
        ManualClock {
            now: Mutex::new(now),
        }
    }

    /// Advance the clock by `duration`.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self
            .now
            .lock()
            .expect("thread holding clock lock should not panic");
        *now += duration;
    }

    /// Set the clock to an absolute time.
    pub fn set_now(&self, at: Timestamp) {
        let mut now = self
            .now
            .lock()
            .expect("thread holding clock lock should not panic");
        *now = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self
            .now
            .lock()
            .expect("thread holding clock lock should not panic")
    }
}
