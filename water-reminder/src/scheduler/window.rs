//! Notification window evaluation.
//!
//! A target hour `H` owns the window from `(H-1):(60-W)` to `H:W` in the
//! subscriber's local time, where `W` is the half-window in minutes.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{LocalTime, local_time};

/// Result of evaluating a subscription against the notification windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowMatch {
    pub in_window: bool,
    pub target_hour: Option<u8>,
}

impl WindowMatch {
    pub const OUTSIDE: Self = Self {
        in_window: false,
        target_hour: None,
    };

    fn hit(hour: u8) -> Self {
        Self {
            in_window: true,
            target_hour: Some(hour),
        }
    }
}

/// Evaluator for the per-timezone notification windows.
#[derive(Debug, Clone)]
pub struct WindowEvaluator {
    target_hours: Vec<u8>,
    half_window_minutes: u32,
}

impl WindowEvaluator {
    /// Create an evaluator for ascending `target_hours` and a half-window of
    /// `half_window_minutes` (expected below 30).
    pub fn new(target_hours: Vec<u8>, half_window_minutes: u32) -> Self {
        Self {
            target_hours,
            half_window_minutes,
        }
    }

    /// Evaluate `now` in `timezone`.
    ///
    /// An unresolvable timezone is treated as outside every window. It is
    /// logged at debug since it recurs on every tick; registration already
    /// warns once.
    pub fn evaluate(&self, now: DateTime<Utc>, timezone: &str) -> WindowMatch {
        match local_time(timezone, now) {
            Ok(local) => self.evaluate_local(local),
            Err(e) => {
                debug!(timezone = %timezone, error = %e, "Timezone evaluation failed, treating as outside window");
                WindowMatch::OUTSIDE
            }
        }
    }

    /// Evaluate an already-resolved local time. First matching hour wins.
    pub fn evaluate_local(&self, local: LocalTime) -> WindowMatch {
        let w = self.half_window_minutes;

        for &target in &self.target_hours {
            let target = u32::from(target);
            let preceding = if target == 0 { 23 } else { target - 1 };

            let in_tail = local.hour == preceding && local.minute >= 60u32.saturating_sub(w);
            let in_head = local.hour == target && local.minute <= w;

            if in_tail || in_head {
                return WindowMatch::hit(target as u8);
            }
        }

        WindowMatch::OUTSIDE
    }
}
