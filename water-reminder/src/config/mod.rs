//! Scheduler configuration.
//!
//! Loaded from environment variables (after `.env` has been read), with every
//! value optional:
//! - `REMINDER_HOURS` (`8-20` or `8,12,16`)
//! - `REMINDER_WINDOW_MINUTES`
//! - `REMINDER_EMISSION_PROBABILITY`
//! - `REMINDER_DEDUP_LOCKOUT_MINUTES`
//! - `REMINDER_TICK_INTERVAL_SECS`
//! - `REMINDER_DISPATCH_CONCURRENCY`
//! - `REMINDER_ICON`, `REMINDER_BADGE`

use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Default target hours, 08:00 through 20:00 local time.
pub const DEFAULT_TARGET_HOURS: std::ops::RangeInclusive<u8> = 8..=20;

/// Default half-window around each target hour.
const DEFAULT_HALF_WINDOW_MINUTES: u32 = 15;

/// Default per-tick emission probability.
const DEFAULT_EMISSION_PROBABILITY: f64 = 0.10;

/// Default minimum gap between two deliveries to the same subscription.
const DEFAULT_DEDUP_LOCKOUT_MINUTES: u32 = 50;

/// Default tick interval (60 seconds).
const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;

/// Default number of subscriptions processed concurrently within a tick.
const DEFAULT_DISPATCH_CONCURRENCY: usize = 16;

const DEFAULT_ICON: &str = "/ios/192.png";

/// Reminder schedule and dispatch settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderConfig {
    /// Local hours (0-23) a reminder is due at, ascending.
    pub target_hours: Vec<u8>,
    /// Minutes either side of a target hour that count as on time.
    pub half_window_minutes: u32,
    /// Chance that an eligible subscription is sent to on a given tick.
    pub emission_probability: f64,
    /// Minutes after a delivery during which no further delivery is made.
    pub dedup_lockout_minutes: u32,
    /// How often the scheduler evaluates the registry.
    pub tick_interval: Duration,
    /// Maximum subscriptions processed at once within a tick.
    pub dispatch_concurrency: usize,
    /// Notification icon reference.
    pub icon: String,
    /// Notification badge reference.
    pub badge: String,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            target_hours: DEFAULT_TARGET_HOURS.collect(),
            half_window_minutes: DEFAULT_HALF_WINDOW_MINUTES,
            emission_probability: DEFAULT_EMISSION_PROBABILITY,
            dedup_lockout_minutes: DEFAULT_DEDUP_LOCKOUT_MINUTES,
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
            dispatch_concurrency: DEFAULT_DISPATCH_CONCURRENCY,
            icon: DEFAULT_ICON.to_string(),
            badge: DEFAULT_ICON.to_string(),
        }
    }
}

impl ReminderConfig {
    /// Load config from environment variables, falling back to defaults for
    /// anything unset. Malformed values are configuration errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ReminderConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_string = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(hours) = env_string("REMINDER_HOURS") {
            config.target_hours = parse_hours(&hours)?;
        }
        if let Some(minutes) = env_parse(&env_string, "REMINDER_WINDOW_MINUTES")? {
            config.half_window_minutes = minutes;
        }
        if let Some(p) = env_parse(&env_string, "REMINDER_EMISSION_PROBABILITY")? {
            config.emission_probability = p;
        }
        if let Some(minutes) = env_parse(&env_string, "REMINDER_DEDUP_LOCKOUT_MINUTES")? {
            config.dedup_lockout_minutes = minutes;
        }
        if let Some(secs) = env_parse::<u64>(&env_string, "REMINDER_TICK_INTERVAL_SECS")? {
            config.tick_interval = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse(&env_string, "REMINDER_DISPATCH_CONCURRENCY")? {
            config.dispatch_concurrency = n;
        }
        if let Some(icon) = env_string("REMINDER_ICON") {
            config.icon = icon;
        }
        if let Some(badge) = env_string("REMINDER_BADGE") {
            config.badge = badge;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the scheduler relies on.
    pub fn validate(&self) -> Result<()> {
        if self.target_hours.is_empty() {
            return Err(Error::config("at least one target hour is required"));
        }
        if let Some(hour) = self.target_hours.iter().find(|h| **h > 23) {
            return Err(Error::config(format!("target hour {hour} is out of range 0-23")));
        }
        if self.target_hours.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::config("target hours must be strictly ascending"));
        }
        // Windows of adjacent hours would overlap at 30 minutes or more.
        if self.half_window_minutes >= 30 {
            return Err(Error::config(format!(
                "half window must be below 30 minutes, got {}",
                self.half_window_minutes
            )));
        }
        if !(0.0..=1.0).contains(&self.emission_probability) {
            return Err(Error::config(format!(
                "emission probability must be within [0, 1], got {}",
                self.emission_probability
            )));
        }
        if self.dedup_lockout_minutes == 0 {
            return Err(Error::config("dedup lockout must be positive"));
        }
        if self.tick_interval.is_zero() {
            return Err(Error::config("tick interval must be positive"));
        }
        if self.dispatch_concurrency == 0 {
            return Err(Error::config("dispatch concurrency must be positive"));
        }
        Ok(())
    }

    /// Dedup lockout as a chrono duration.
    pub fn dedup_lockout(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.dedup_lockout_minutes))
    }
}

/// Parse `8-20` (inclusive range) or `8,12,16` into sorted, deduplicated hours.
pub fn parse_hours(input: &str) -> Result<Vec<u8>> {
    let parse_hour = |s: &str| -> Result<u8> {
        let hour = s
            .trim()
            .parse::<u8>()
            .map_err(|_| Error::config(format!("invalid hour '{}' in REMINDER_HOURS", s.trim())))?;
        if hour > 23 {
            return Err(Error::config(format!("hour {hour} is out of range 0-23")));
        }
        Ok(hour)
    };

    let mut hours = Vec::new();
    for part in input.split(',').filter(|p| !p.trim().is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (parse_hour(start)?, parse_hour(end)?);
                if start > end {
                    return Err(Error::config(format!(
                        "hour range {start}-{end} is descending"
                    )));
                }
                hours.extend(start..=end);
            }
            None => hours.push(parse_hour(part)?),
        }
    }

    hours.sort_unstable();
    hours.dedup();
    if hours.is_empty() {
        return Err(Error::config("REMINDER_HOURS is empty"));
    }
    Ok(hours)
}

fn env_parse<T: FromStr>(
    read: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>> {
    match read(name) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::config(format!("invalid value for {name}: '{value}'"))),
        None => Ok(None),
    }
}
