//! Notification payload delivered to the browser.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// JSON body the service worker turns into a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// Creation time, epoch milliseconds.
    pub timestamp: i64,
}

impl ReminderPayload {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        icon: impl Into<String>,
        badge: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: icon.into(),
            badge: badge.into(),
            timestamp: at.timestamp_millis(),
        }
    }

    /// Serialize, shortening title and body if the result exceeds `max_bytes`.
    pub fn to_bytes_capped(&self, max_bytes: usize) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() <= max_bytes {
            return Ok(bytes);
        }

        let minimal = ReminderPayload {
            title: truncate_string(&self.title, 80),
            body: truncate_string(&self.body, 200),
            ..self.clone()
        };
        let bytes = serde_json::to_vec(&minimal)?;
        if bytes.len() > max_bytes {
            return Err(Error::Other(format!(
                "Payload of {} bytes exceeds limit of {} bytes",
                bytes.len(),
                max_bytes
            )));
        }
        Ok(bytes)
    }
}

fn truncate_string(input: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    let mut iter = input.chars();
    let mut out = String::new();
    for _ in 0..max_chars {
        match iter.next() {
            Some(c) => out.push(c),
            None => return out,
        }
    }
    if iter.next().is_some() {
        out.push('…');
    }
    out
}
