//! Notification delivery.
//!
//! - `ReminderPayload`: the JSON the service worker renders
//! - `PushTransport`: delivery capability, with permanent vs transient failures
//! - `WebPushTransport`: VAPID-signed, encrypted Web Push implementation
//! - `Dispatcher`: generates, delivers and applies the outcome to the registry

mod dispatcher;
mod payload;
mod transport;
pub mod web_push;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use payload::ReminderPayload;
pub use transport::{DeliveryError, PushTransport};
pub use web_push::{WebPushConfig, WebPushTransport, validate_subscription};
