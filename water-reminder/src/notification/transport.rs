//! Push transport abstraction.

use async_trait::async_trait;
use thiserror::Error;

use super::ReminderPayload;
use crate::domain::PushSubscription;

/// Why a delivery did not go through.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The push service says the subscription no longer exists.
    #[error("subscription is gone (status {status})")]
    Gone { status: u16 },
    /// Anything that may succeed on a later attempt.
    #[error("{0}")]
    Transient(String),
}

impl DeliveryError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Whether the subscription should be dropped.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Gone { .. })
    }

    /// Classify an HTTP status returned by a push service.
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        match status {
            404 | 410 => Self::Gone { status },
            _ => Self::Transient(format!("status {} {}", status, detail.into())),
        }
    }
}

/// Delivers a payload to a push subscription.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Get the transport type name.
    fn transport_type(&self) -> &'static str;

    /// Deliver `payload` to `handle`.
    async fn deliver(
        &self,
        handle: &PushSubscription,
        payload: &ReminderPayload,
    ) -> Result<(), DeliveryError>;
}
