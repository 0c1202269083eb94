//! End-to-end scheduler tests.
//!
//! Drive `Scheduler::run_tick` against a manual clock, a scripted random
//! source and an in-memory transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

use water_reminder::config::ReminderConfig;
use water_reminder::domain::{Clock, Language, ManualClock, PushKeys, PushSubscription};
use water_reminder::message::{MessageGenerator, catalog};
use water_reminder::notification::{DeliveryError, Dispatcher, PushTransport, ReminderPayload};
use water_reminder::registration::RegistrationService;
use water_reminder::registry::SubscriptionRegistry;
use water_reminder::scheduler::{Scheduler, SequenceRandom};

/// Records deliveries and answers per endpoint.
#[derive(Default)]
struct MemoryTransport {
    responses: Mutex<HashMap<String, Result<(), DeliveryError>>>,
    delivered: Mutex<Vec<(String, ReminderPayload)>>,
}

impl MemoryTransport {
    fn respond(&self, endpoint: &str, result: Result<(), DeliveryError>) {
        self.responses.lock().insert(endpoint.to_string(), result);
    }

    fn delivered_to(&self, endpoint: &str) -> usize {
        self.delivered
            .lock()
            .iter()
            .filter(|(e, _)| e == endpoint)
            .count()
    }
}

#[async_trait]
impl PushTransport for MemoryTransport {
    fn transport_type(&self) -> &'static str {
        "memory"
    }

    async fn deliver(
        &self,
        handle: &PushSubscription,
        payload: &ReminderPayload,
    ) -> Result<(), DeliveryError> {
        let result = self
            .responses
            .lock()
            .get(&handle.endpoint)
            .cloned()
            .unwrap_or(Ok(()));
        if result.is_ok() {
            self.delivered
                .lock()
                .push((handle.endpoint.clone(), payload.clone()));
        }
        result
    }
}

struct TestApp<T = MemoryTransport> {
    clock: Arc<ManualClock>,
    registry: Arc<SubscriptionRegistry>,
    transport: Arc<T>,
    registration: RegistrationService,
    scheduler: Scheduler,
}

fn setup(now: DateTime<Utc>, draws: Vec<f64>) -> TestApp {
    setup_with(
        &ReminderConfig::default(),
        Arc::new(MemoryTransport::default()),
        now,
        draws,
    )
}

fn setup_with<T: PushTransport + 'static>(
    config: &ReminderConfig,
    transport: Arc<T>,
    now: DateTime<Utc>,
    draws: Vec<f64>,
) -> TestApp<T> {
    let clock = Arc::new(ManualClock::new(now));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let registry = Arc::new(SubscriptionRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        transport.clone(),
        MessageGenerator::fallback_only(),
        dyn_clock.clone(),
    ));
    let registration =
        RegistrationService::new(registry.clone(), dispatcher.clone(), dyn_clock.clone());
    let scheduler = Scheduler::new(
        config,
        registry.clone(),
        dispatcher,
        dyn_clock,
        Arc::new(SequenceRandom::new(draws)),
    );

    TestApp {
        clock,
        registry,
        transport,
        registration,
        scheduler,
    }
}

fn handle(endpoint: &str) -> PushSubscription {
    PushSubscription {
        endpoint: endpoint.to_string(),
        expiration_time: None,
        keys: PushKeys {
            p256dh: "BNcRdreALRFXTkOOUHK1EtK2wtaz5Ry4YfYCA_0QTpQtUbVlUls0VJXg7A8u-Ts1XbjhazAkj7I99e8QcYP7DkM".to_string(),
            auth: "tBHItJI5svbpez7KI4CCXg".to_string(),
        },
    }
}

mod delivery {
    use super::*;

    #[tokio::test]
    async fn test_one_reminder_per_window() {
        // 07:46 in Prague (CET).
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 6, 46, 0).unwrap();
        let app = setup(start, vec![0.0]);
        let id = app
            .registration
            .register(handle("https://push/prague"), "Europe/Prague", Some("cs_CZ"))
            .unwrap();

        // Tick through the whole 08:00 window.
        for _ in 0..30 {
            app.scheduler.run_tick().await;
            app.clock.advance(Duration::minutes(1));
        }

        assert_eq!(app.transport.delivered_to("https://push/prague"), 1);
        let stored = app.registry.get(&id).unwrap();
        assert_eq!(stored.last_notification_sent, Some(start));

        let delivered = app.transport.delivered.lock();
        let payload = &delivered[0].1;
        assert_eq!(payload.title, catalog::title(Language::Czech));
        assert!(catalog::fallback_messages(Language::Czech).contains(&payload.body.as_str()));
    }

    #[tokio::test]
    async fn test_next_window_is_served_again() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 7, 50, 0).unwrap();
        let app = setup(start, vec![0.0]);
        app.registration
            .register(handle("https://push/utc"), "UTC", None)
            .unwrap();

        app.scheduler.run_tick().await;
        app.clock.set(Utc.with_ymd_and_hms(2024, 1, 15, 8, 50, 0).unwrap());
        app.scheduler.run_tick().await;

        assert_eq!(app.transport.delivered_to("https://push/utc"), 2);
    }

    #[tokio::test]
    async fn test_jitter_spreads_sends() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 7, 50, 0).unwrap();
        // Three misses, then a hit.
        let app = setup(start, vec![0.5, 0.9, 0.2, 0.05]);
        app.registration
            .register(handle("https://push/utc"), "UTC", None)
            .unwrap();

        for expected_deferred in [1, 1, 1] {
            let report = app.scheduler.run_tick().await;
            assert_eq!(report.deferred, expected_deferred);
            app.clock.advance(Duration::minutes(1));
        }
        let report = app.scheduler.run_tick().await;
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn test_empty_registry_does_nothing() {
        let app = setup(Utc.with_ymd_and_hms(2024, 1, 15, 7, 50, 0).unwrap(), vec![0.0]);

        let report = app.scheduler.run_tick().await;

        assert_eq!(report.evaluated, 0);
        assert!(app.transport.delivered.lock().is_empty());
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn test_gone_subscription_is_pruned() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 7, 50, 0).unwrap();
        let app = setup(now, vec![0.0]);
        let gone = app
            .registration
            .register(handle("https://push/gone"), "UTC", None)
            .unwrap();
        let kept = app
            .registration
            .register(handle("https://push/kept"), "UTC", None)
            .unwrap();
        app.transport
            .respond("https://push/gone", Err(DeliveryError::Gone { status: 410 }));

        let report = app.scheduler.run_tick().await;

        assert_eq!(report.pruned, 1);
        assert_eq!(report.delivered, 1);
        assert!(!app.registry.contains(&gone));
        assert!(app.registry.contains(&kept));
        assert_eq!(app.registration.status().total_subscriptions, 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retries_next_tick() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 7, 50, 0).unwrap();
        let app = setup(now, vec![0.0]);
        let id = app
            .registration
            .register(handle("https://push/flaky"), "UTC", None)
            .unwrap();
        app.transport.respond(
            "https://push/flaky",
            Err(DeliveryError::transient("status 503")),
        );

        let report = app.scheduler.run_tick().await;
        assert_eq!(report.failed, 1);
        assert!(app.registry.get(&id).unwrap().last_notification_sent.is_none());

        app.transport.respond("https://push/flaky", Ok(()));
        app.clock.advance(Duration::minutes(1));
        let report = app.scheduler.run_tick().await;
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn test_unknown_timezone_is_inert() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 7, 50, 0).unwrap();
        let app = setup(now, vec![0.0]);
        let bad = app
            .registration
            .register(handle("https://push/bad"), "Not/AZone", None)
            .unwrap();
        app.registration
            .register(handle("https://push/good"), "UTC", None)
            .unwrap();

        for _ in 0..120 {
            app.scheduler.run_tick().await;
            app.clock.advance(Duration::minutes(1));
        }

        assert_eq!(app.transport.delivered_to("https://push/bad"), 0);
        assert!(app.transport.delivered_to("https://push/good") >= 2);
        assert!(app.registry.contains(&bad));
    }

    #[tokio::test]
    async fn test_unregistered_between_ticks_is_not_sent() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 7, 50, 0).unwrap();
        let app = setup(now, vec![0.5, 0.0]);
        let id = app
            .registration
            .register(handle("https://push/leaving"), "UTC", None)
            .unwrap();

        let report = app.scheduler.run_tick().await;
        assert_eq!(report.deferred, 1);

        app.registration.unregister(&id).unwrap();
        let report = app.scheduler.run_tick().await;

        assert_eq!(report.evaluated, 0);
        assert_eq!(app.transport.delivered_to("https://push/leaving"), 0);
    }
}

mod fan_out {
    use super::*;

    /// On its first delivery, unregisters every other subscription.
    #[derive(Default)]
    struct UnsubscribingTransport {
        registry: Mutex<Option<Arc<SubscriptionRegistry>>>,
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PushTransport for UnsubscribingTransport {
        fn transport_type(&self) -> &'static str {
            "unsubscribing"
        }

        async fn deliver(
            &self,
            handle: &PushSubscription,
            _payload: &ReminderPayload,
        ) -> Result<(), DeliveryError> {
            let registry = self.registry.lock().take();
            if let Some(registry) = registry {
                for other in registry.snapshot() {
                    if other.transport_handle.endpoint != handle.endpoint {
                        registry.remove(&other.id);
                    }
                }
            }
            self.delivered.lock().push(handle.endpoint.clone());
            Ok(())
        }
    }

    /// Sleeps before answering and tracks how many deliveries overlap.
    struct SlowTransport {
        delay: std::time::Duration,
        slow_endpoints: Vec<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delivered: Mutex<Vec<String>>,
    }

    impl SlowTransport {
        fn new(delay: std::time::Duration, slow_endpoints: Vec<String>) -> Self {
            Self {
                delay,
                slow_endpoints,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PushTransport for SlowTransport {
        fn transport_type(&self) -> &'static str {
            "slow"
        }

        async fn deliver(
            &self,
            handle: &PushSubscription,
            _payload: &ReminderPayload,
        ) -> Result<(), DeliveryError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            if self.slow_endpoints.contains(&handle.endpoint) {
                tokio::time::sleep(self.delay).await;
            } else {
                tokio::task::yield_now().await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.delivered.lock().push(handle.endpoint.clone());
            Ok(())
        }
    }

    fn register_utc(app: &TestApp<impl PushTransport>, count: usize) -> Vec<String> {
        (0..count)
            .map(|i| {
                let endpoint = format!("https://push/{i}");
                app.registration
                    .register(handle(&endpoint), "UTC", None)
                    .unwrap();
                endpoint
            })
            .collect()
    }

    #[tokio::test]
    async fn test_entries_removed_mid_tick_are_skipped() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 7, 50, 0).unwrap();
        let config = ReminderConfig {
            dispatch_concurrency: 1,
            ..Default::default()
        };
        let app = setup_with(
            &config,
            Arc::new(UnsubscribingTransport::default()),
            now,
            vec![0.0],
        );
        let endpoints = register_utc(&app, 20);
        *app.transport.registry.lock() = Some(app.registry.clone());

        let report = app.scheduler.run_tick().await;

        assert_eq!(report.evaluated, 20);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.vanished, 19);
        assert_eq!(app.registry.count(), 1);

        let delivered = app.transport.delivered.lock();
        assert_eq!(delivered.len(), 1);
        for endpoint in &endpoints {
            assert!(delivered.iter().filter(|e| *e == endpoint).count() <= 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_deliveries_do_not_serialize_the_tick() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 7, 50, 0).unwrap();
        let delay = std::time::Duration::from_secs(30);
        let slow: Vec<String> = (0..4).map(|i| format!("https://push/{i}")).collect();
        let app = setup_with(
            &ReminderConfig::default(),
            Arc::new(SlowTransport::new(delay, slow)),
            now,
            vec![0.0],
        );
        register_utc(&app, 12);

        let started = tokio::time::Instant::now();
        let report = app.scheduler.run_tick().await;
        let elapsed = started.elapsed();

        assert_eq!(report.delivered, 12);
        assert_eq!(app.transport.delivered.lock().len(), 12);
        assert!(elapsed >= delay);
        assert!(elapsed < delay * 2, "tick took {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_deliveries_are_bounded() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 7, 50, 0).unwrap();
        let delay = std::time::Duration::from_secs(1);
        let endpoints: Vec<String> = (0..40).map(|i| format!("https://push/{i}")).collect();
        let config = ReminderConfig {
            dispatch_concurrency: 4,
            ..Default::default()
        };
        let app = setup_with(
            &config,
            Arc::new(SlowTransport::new(delay, endpoints)),
            now,
            vec![0.0],
        );
        register_utc(&app, 40);

        let started = tokio::time::Instant::now();
        let report = app.scheduler.run_tick().await;

        assert_eq!(report.delivered, 40);
        assert_eq!(app.transport.max_in_flight.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() >= delay * 10);
    }
}
