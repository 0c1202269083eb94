//! Registration surface used by the outer layer.
//!
//! Thin wrapper over the registry that validates input, fills defaults and
//! exposes the status and test-send operations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{Clock, NewSubscription, PushSubscription, Subscription, time};
use crate::notification::{DeliveryError, DispatchOutcome, Dispatcher, validate_subscription};
use crate::registry::SubscriptionRegistry;
use crate::{Error, Result};

/// Locale assumed when the client sends none.
pub const DEFAULT_LOCALE: &str = "en_US";

/// Snapshot of the service state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub total_subscriptions: usize,
    pub server_time: DateTime<Utc>,
}

/// Registers, removes and inspects subscriptions.
#[derive(Clone)]
pub struct RegistrationService {
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<Dispatcher>,
    clock: Arc<dyn Clock>,
}

impl RegistrationService {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        dispatcher: Arc<Dispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            clock,
        }
    }

    /// Register a push subscription and return its ID.
    ///
    /// The endpoint must be a URL and the client keys must decode to a P-256
    /// point and a 16-byte auth secret. An unresolvable timezone is accepted;
    /// such a subscription simply never falls inside a window.
    pub fn register(
        &self,
        handle: PushSubscription,
        timezone: &str,
        locale: Option<&str>,
    ) -> Result<String> {
        let timezone = timezone.trim();
        if timezone.is_empty() {
            return Err(Error::validation("timezone is required"));
        }
        if handle.endpoint.trim().is_empty() {
            return Err(Error::validation("subscription endpoint is required"));
        }
        validate_subscription(&handle)?;
        if let Err(e) = time::resolve_timezone(timezone) {
            warn!(timezone = %timezone, error = %e, "Registering subscription with unknown timezone");
        }

        let locale = locale
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_LOCALE);

        let subscription = Subscription::new(
            NewSubscription {
                transport_handle: handle,
                timezone: timezone.to_string(),
                locale: locale.to_string(),
            },
            self.clock.now(),
        );
        Ok(self.registry.add(subscription))
    }

    /// Remove a subscription by ID.
    pub fn unregister(&self, id: &str) -> Result<()> {
        if self.registry.remove(id) {
            Ok(())
        } else {
            Err(Error::not_found("Subscription", id))
        }
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            total_subscriptions: self.registry.count(),
            server_time: self.clock.now(),
        }
    }

    /// Send a reminder right away, ignoring windows, dedup and jitter.
    pub async fn send_test(&self, id: &str) -> Result<()> {
        let subscription = self
            .registry
            .get(id)
            .ok_or_else(|| Error::not_found("Subscription", id))?;

        info!(subscription_id = %id, "Sending test notification");
        match self.dispatcher.dispatch(&subscription).await {
            DispatchOutcome::Delivered => Ok(()),
            DispatchOutcome::Pruned => Err(Error::Other(format!(
                "subscription {id} was rejected by the push service and removed"
            ))),
            DispatchOutcome::Failed(e) => Err(DeliveryError::Transient(e).into()),
        }
    }
}

impl std::fmt::Debug for RegistrationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationService")
            .field("subscriptions", &self.registry.count())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
