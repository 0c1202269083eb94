//! Reminder dispatch.
//!
//! The dispatcher turns a subscription into a delivered reminder:
//! - Generates the body in the subscriber's language
//! - Builds the payload with the localized title
//! - Hands it to the transport
//! - Records success, or prunes the subscription when the push service says
//!   it is gone

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{PushTransport, ReminderPayload};
use crate::domain::{Clock, Subscription};
use crate::message::{MessageGenerator, catalog};
use crate::registry::SubscriptionRegistry;

/// What happened to a single dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The transport accepted the reminder and the send time was recorded.
    Delivered,
    /// The subscription no longer exists at the push service and was removed.
    Pruned,
    /// Delivery failed; the subscription is kept for a later window.
    Failed(String),
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Sends reminders and applies the result to the registry.
pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    transport: Arc<dyn PushTransport>,
    generator: MessageGenerator,
    clock: Arc<dyn Clock>,
    icon: String,
    badge: String,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        transport: Arc<dyn PushTransport>,
        generator: MessageGenerator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            transport,
            generator,
            clock,
            icon: "/ios/192.png".to_string(),
            badge: "/ios/192.png".to_string(),
        }
    }

    /// Set the icon and badge references carried in every payload.
    pub fn with_assets(mut self, icon: impl Into<String>, badge: impl Into<String>) -> Self {
        self.icon = icon.into();
        self.badge = badge.into();
        self
    }

    /// Payload for `subscription` with the given body.
    pub fn build_payload(&self, subscription: &Subscription, body: String) -> ReminderPayload {
        ReminderPayload::new(
            catalog::title(subscription.language()),
            body,
            self.icon.as_str(),
            self.badge.as_str(),
            self.clock.now(),
        )
    }

    /// Generate and deliver one reminder.
    pub async fn dispatch(&self, subscription: &Subscription) -> DispatchOutcome {
        let language = subscription.language();
        let body = self.generator.generate(&subscription.locale).await;
        let payload = self.build_payload(subscription, body);

        match self
            .transport
            .deliver(&subscription.transport_handle, &payload)
            .await
        {
            Ok(()) => {
                let sent_at = self.clock.now();
                if !self.registry.mark_sent(&subscription.id, sent_at) {
                    debug!(subscription_id = %subscription.id, "Subscription removed while sending");
                }
                info!(
                    subscription_id = %subscription.id,
                    timezone = %subscription.timezone,
                    language = %language,
                    body = %payload.body,
                    "Notification sent"
                );
                DispatchOutcome::Delivered
            }
            Err(e) if e.is_permanent() => {
                warn!(
                    subscription_id = %subscription.id,
                    transport = self.transport.transport_type(),
                    error = %e,
                    "Removing invalid subscription"
                );
                self.registry.remove(&subscription.id);
                DispatchOutcome::Pruned
            }
            Err(e) => {
                warn!(
                    subscription_id = %subscription.id,
                    transport = self.transport.transport_type(),
                    error = %e,
                    "Failed to send notification"
                );
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("transport", &self.transport.transport_type())
            .field("generator", &self.generator)
            .field("icon", &self.icon)
            .field("badge", &self.badge)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Language, ManualClock, NewSubscription, PushKeys, PushSubscription};
    use crate::notification::DeliveryError;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;

    struct ScriptedTransport {
        result: Result<(), DeliveryError>,
        delivered: Mutex<Vec<(String, ReminderPayload)>>,
    }

    impl ScriptedTransport {
        fn new(result: Result<(), DeliveryError>) -> Arc<Self> {
            Arc::new(Self {
                result,
                delivered: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PushTransport for ScriptedTransport {
        fn transport_type(&self) -> &'static str {
            "scripted"
        }

        async fn deliver(
            &self,
            handle: &PushSubscription,
            payload: &ReminderPayload,
        ) -> Result<(), DeliveryError> {
            self.delivered
                .lock()
                .push((handle.endpoint.clone(), payload.clone()));
            self.result.clone()
        }
    }

    fn setup(
        locale: &str,
        result: Result<(), DeliveryError>,
    ) -> (Arc<SubscriptionRegistry>, Arc<ScriptedTransport>, Dispatcher, Subscription) {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap();
        let registry = Arc::new(SubscriptionRegistry::new());
        let transport = ScriptedTransport::new(result);
        let clock = Arc::new(ManualClock::new(now));
        let subscription = Subscription::new(
            NewSubscription {
                transport_handle: PushSubscription {
                    endpoint: "https://push.example/abc".to_string(),
                    expiration_time: None,
                    keys: PushKeys {
                        p256dh: "p".to_string(),
                        auth: "a".to_string(),
                    },
                },
                timezone: "Europe/Prague".to_string(),
                locale: locale.to_string(),
            },
            now,
        );
        registry.add(subscription.clone());

        let dispatcher = Dispatcher::new(
            registry.clone(),
            transport.clone(),
            MessageGenerator::fallback_only(),
            clock,
        );
        (registry, transport, dispatcher, subscription)
    }

    #[tokio::test]
    async fn test_success_records_last_sent() {
        let (registry, transport, dispatcher, sub) = setup("en_US", Ok(()));

        let outcome = dispatcher.dispatch(&sub).await;

        assert!(outcome.is_delivered());
        let stored = registry.get(&sub.id).unwrap();
        assert_eq!(
            stored.last_notification_sent,
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap())
        );
        assert_eq!(transport.delivered.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_payload_is_localized() {
        let (_registry, transport, dispatcher, sub) = setup("cs_CZ", Ok(()));

        dispatcher.dispatch(&sub).await;

        let delivered = transport.delivered.lock();
        let (endpoint, payload) = &delivered[0];
        assert_eq!(endpoint, "https://push.example/abc");
        assert_eq!(payload.title, catalog::title(Language::Czech));
        assert!(catalog::fallback_messages(Language::Czech).contains(&payload.body.as_str()));
        assert_eq!(payload.icon, "/ios/192.png");
        assert_eq!(payload.badge, "/ios/192.png");
    }

    #[tokio::test]
    async fn test_gone_prunes_subscription() {
        let (registry, _transport, dispatcher, sub) =
            setup("en_US", Err(DeliveryError::Gone { status: 410 }));

        let outcome = dispatcher.dispatch(&sub).await;

        assert_eq!(outcome, DispatchOutcome::Pruned);
        assert!(!outcome.is_delivered());
        assert!(registry.get(&sub.id).is_none());
    }

    #[tokio::test]
    async fn test_transient_failure_keeps_subscription() {
        let (registry, _transport, dispatcher, sub) =
            setup("en_US", Err(DeliveryError::transient("connection reset")));

        let outcome = dispatcher.dispatch(&sub).await;

        assert!(matches!(outcome, DispatchOutcome::Failed(_)));
        let stored = registry.get(&sub.id).unwrap();
        assert!(stored.last_notification_sent.is_none());
    }
}
