//! Duplicate-send suppression.
//!
//! Only elapsed time since the last delivery is considered. The lockout is
//! longer than a window and shorter than the hourly recurrence, so at most one
//! delivery lands in each hourly slot.

use chrono::{DateTime, Duration, Utc};

/// Elapsed-time lockout after a successful delivery.
#[derive(Debug, Clone, Copy)]
pub struct DedupGuard {
    lockout: Duration,
}

impl DedupGuard {
    pub fn new(lockout: Duration) -> Self {
        Self { lockout }
    }

    /// Whether a delivery already covers the window containing `now`.
    pub fn is_satisfied(&self, last_sent: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_sent {
            None => false,
            Some(last_sent) => now.signed_duration_since(last_sent) < self.lockout,
        }
    }
}

impl Default for DedupGuard {
    fn default() -> Self {
        Self::new(Duration::minutes(50))
    }
}
