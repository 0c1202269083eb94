//! Clock and timezone helpers.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;

use crate::{Error, Result};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
///
/// Used to replay a schedule deterministically.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Wall-clock hour and minute in some timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    pub hour: u32,
    pub minute: u32,
}

/// Resolve an IANA timezone identifier.
pub fn resolve_timezone(timezone: &str) -> Result<Tz> {
    timezone
        .trim()
        .parse::<Tz>()
        .map_err(|_| Error::InvalidTimezone(timezone.to_string()))
}

/// Local hour and minute of `instant` in `timezone`.
///
/// An unknown timezone is reported as [`Error::InvalidTimezone`], never as a
/// fallback offset.
pub fn local_time(timezone: &str, instant: DateTime<Utc>) -> Result<LocalTime> {
    let tz = resolve_timezone(timezone)?;
    let local = instant.with_timezone(&tz);
    Ok(LocalTime {
        hour: local.hour(),
        minute: local.minute(),
    })
}
