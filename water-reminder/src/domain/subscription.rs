//! Subscription entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Language;

/// Browser push subscription, exactly as the client platform reports it.
///
/// The scheduler never looks inside; it is handed to the transport as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    /// Push service URL.
    pub endpoint: String,
    /// Optional expiry reported by the browser (epoch milliseconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<i64>,
    /// Client encryption keys.
    pub keys: PushKeys,
}

/// Client-side keys for payload encryption (base64url, no padding).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Registration input.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub transport_handle: PushSubscription,
    pub timezone: String,
    pub locale: String,
}

/// A registered reminder endpoint and its scheduling state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Registry key, assigned at registration.
    pub id: String,
    /// Delivery address passed unmodified to the transport.
    pub transport_handle: PushSubscription,
    /// IANA timezone identifier.
    pub timezone: String,
    /// Locale tag as supplied by the client.
    pub locale: String,
    /// When the subscription was registered.
    pub registered_at: DateTime<Utc>,
    /// Last successful delivery; only ever moves forward.
    pub last_notification_sent: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Create a fresh subscription with a generated id.
    pub fn new(input: NewSubscription, registered_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            transport_handle: input.transport_handle,
            timezone: input.timezone,
            locale: input.locale,
            registered_at,
            last_notification_sent: None,
        }
    }

    /// Language the reminder text and title are rendered in.
    pub fn language(&self) -> Language {
        Language::from_locale(&self.locale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_subscription_from_browser_json() {
        let json = r#"{
            "endpoint": "https://fcm.googleapis.com/fcm/send/abc",
            "expirationTime": null,
            "keys": { "p256dh": "BKey", "auth": "secret" }
        }"#;

        let sub: PushSubscription = serde_json::from_str(json).unwrap();
        assert_eq!(sub.endpoint, "https://fcm.googleapis.com/fcm/send/abc");
        assert!(sub.expiration_time.is_none());
        assert_eq!(sub.keys.auth, "secret");
    }

    #[test]
    fn test_new_subscription_has_unique_id_and_no_last_sent() {
        let input = NewSubscription {
            transport_handle: PushSubscription {
                endpoint: "https://push.example/1".to_string(),
                expiration_time: None,
                keys: PushKeys {
                    p256dh: "p".to_string(),
                    auth: "a".to_string(),
                },
            },
            timezone: "Europe/Prague".to_string(),
            locale: "cs_CZ".to_string(),
        };

        let a = Subscription::new(input.clone(), Utc::now());
        let b = Subscription::new(input, Utc::now());
        assert_ne!(a.id, b.id);
        assert!(a.last_notification_sent.is_none());
        assert_eq!(a.language(), Language::Czech);
    }
}
