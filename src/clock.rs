//! Time source and timestamp formatting.
//!
//! The store asks a [`Clock`] for the current instant instead of calling
//! `SystemTime::now()` directly, so tests can pin and step time.

use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A manually driven clock for tests.
#[derive(Debug)]
pub struct MockClock {
    now: RwLock<SystemTime>,
}

impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        *self.now.read().expect("MockClock lock poisoned")
    }
}

impl MockClock {
    pub fn with_time(time: SystemTime) -> Self {
        Self {
            now: RwLock::new(time),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.write().expect("MockClock lock poisoned");
        *now += duration;
    }

    pub fn set_time(&self, time: SystemTime) {
        *self.now.write().expect("MockClock lock poisoned") = time;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::with_time(SystemTime::UNIX_EPOCH)
    }
}

/// Format `time` as an RFC3339 UTC timestamp with nanosecond precision.
///
/// Trailing zeros of the fractional part are dropped, and the fraction is
/// omitted entirely on whole seconds: `2024-05-01T12:00:00.1234Z`,
/// `2024-05-01T12:00:00Z`.
pub fn format_timestamp(time: SystemTime) -> String {
    let utc: DateTime<Utc> = time.into();
    let mut out = utc.format("%Y-%m-%dT%H:%M:%S").to_string();
    let nanos = utc.timestamp_subsec_nanos();
    if nanos > 0 {
        let fraction = format!("{nanos:09}");
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    out.push('Z');
    out
}
