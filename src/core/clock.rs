//! Clock abstraction for the age-window policy
//!
//! File names encode their creation time, and every rotation or retention
//! decision is an age comparison against "now". Routing "now" through
//! [`DateProvider`] keeps those decisions deterministic under test.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;

/// Source of the current time
pub trait DateProvider: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDateProvider;

impl DateProvider for SystemDateProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock returning consecutive dates spaced by a fixed step
///
/// Each call to [`DateProvider::now`] returns the current date and then moves
/// it forward by `step`. Useful for simulating files created at distinct
/// instants without sleeping.
#[derive(Debug)]
pub struct RelativeDateProvider {
    date: Mutex<DateTime<Utc>>,
    step: chrono::Duration,
}

impl RelativeDateProvider {
    /// Start at `start`, advancing by `step` on every read
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        RelativeDateProvider {
            date: Mutex::new(start),
            step: to_chrono(step),
        }
    }

    /// Start at the current wall-clock time
    pub fn starting_now(step: Duration) -> Self {
        Self::new(Utc::now(), step)
    }

    /// Push time forward without consuming a reading
    pub fn advance(&self, by: Duration) {
        let mut date = self.date.lock();
        *date = date.checked_add_signed(to_chrono(by)).unwrap_or(*date);
    }
}

impl DateProvider for RelativeDateProvider {
    fn now(&self) -> DateTime<Utc> {
        let mut date = self.date.lock();
        let current = *date;
        *date = current.checked_add_signed(self.step).unwrap_or(current);
        current
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Age of something created at `created`, as seen at `now`
///
/// A creation date in the future (clock moved backwards) counts as age zero.
pub(crate) fn age(now: DateTime<Utc>, created: DateTime<Utc>) -> Duration {
    (now - created).to_std().unwrap_or(Duration::ZERO)
}
