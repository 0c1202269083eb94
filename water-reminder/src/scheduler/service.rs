//! Periodic scheduler loop.
//!
//! The scheduler owns no subscription state. It reads the registry, decides
//! per entry, and leaves every write (last-sent bookkeeping, pruning) to the
//! dispatcher.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{DedupGuard, EmissionPolicy, RandomSource, WindowEvaluator};
use crate::config::ReminderConfig;
use crate::domain::{Clock, Subscription};
use crate::notification::{DispatchOutcome, Dispatcher};
use crate::registry::SubscriptionRegistry;

/// Decision reached for one subscription on one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Not inside any notification window, or the timezone did not resolve.
    OutsideWindow,
    /// A delivery within the lockout already covers this window.
    AlreadySent,
    /// Eligible, but the jitter draw postponed it to a later tick.
    Deferred,
    /// Removed from the registry after the snapshot was taken.
    Vanished,
    /// Reminder delivered.
    Delivered,
    /// The push service rejected the subscription for good; it was removed.
    Pruned,
    /// Delivery failed; the subscription stays for a later window.
    Failed(String),
}

impl From<DispatchOutcome> for EntryOutcome {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Delivered => Self::Delivered,
            DispatchOutcome::Pruned => Self::Pruned,
            DispatchOutcome::Failed(e) => Self::Failed(e),
        }
    }
}

/// Counters for a single tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub evaluated: usize,
    pub outside_window: usize,
    pub already_sent: usize,
    pub deferred: usize,
    pub vanished: usize,
    pub delivered: usize,
    pub pruned: usize,
    pub failed: usize,
}

impl TickReport {
    fn record(&mut self, outcome: &EntryOutcome) {
        self.evaluated += 1;
        match outcome {
            EntryOutcome::OutsideWindow => self.outside_window += 1,
            EntryOutcome::AlreadySent => self.already_sent += 1,
            EntryOutcome::Deferred => self.deferred += 1,
            EntryOutcome::Vanished => self.vanished += 1,
            EntryOutcome::Delivered => self.delivered += 1,
            EntryOutcome::Pruned => self.pruned += 1,
            EntryOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// Number of subscriptions a delivery was attempted for.
    pub fn attempted(&self) -> usize {
        self.delivered + self.pruned + self.failed
    }
}

/// Drives window evaluation, dedup and jitter on a fixed tick.
pub struct Scheduler {
    registry: Arc<SubscriptionRegistry>,
    evaluator: WindowEvaluator,
    guard: DedupGuard,
    policy: EmissionPolicy,
    dispatcher: Arc<Dispatcher>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    concurrency: usize,
}

impl Scheduler {
    pub fn new(
        config: &ReminderConfig,
        registry: Arc<SubscriptionRegistry>,
        dispatcher: Arc<Dispatcher>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            registry,
            evaluator: WindowEvaluator::new(
                config.target_hours.clone(),
                config.half_window_minutes,
            ),
            guard: DedupGuard::new(config.dedup_lockout()),
            policy: EmissionPolicy::new(config.emission_probability, random),
            dispatcher,
            clock,
            tick_interval: config.tick_interval,
            concurrency: config.dispatch_concurrency.max(1),
        }
    }

    /// Evaluate every registered subscription once.
    ///
    /// Window and dedup checks use the instant the tick started. Entries are
    /// processed concurrently, so one slow delivery does not hold up the rest.
    pub async fn run_tick(&self) -> TickReport {
        let mut report = TickReport::default();
        if self.registry.is_empty() {
            return report;
        }

        let now = self.clock.now();
        let snapshot = self.registry.snapshot();
        info!("Checking notifications for {} subscriptions", snapshot.len());

        let outcomes: Vec<EntryOutcome> = stream::iter(snapshot)
            .map(|entry| self.process_entry(entry, now))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in &outcomes {
            report.record(outcome);
        }

        if report.attempted() > 0 {
            info!(
                delivered = report.delivered,
                pruned = report.pruned,
                failed = report.failed,
                deferred = report.deferred,
                "Tick complete"
            );
        } else {
            debug!(?report, "Tick complete");
        }
        report
    }

    async fn process_entry(&self, entry: Subscription, now: DateTime<Utc>) -> EntryOutcome {
        let window = self.evaluator.evaluate(now, &entry.timezone);
        if !window.in_window {
            return EntryOutcome::OutsideWindow;
        }

        // Pick up removals and deliveries that happened after the snapshot.
        let Some(current) = self.registry.get(&entry.id) else {
            debug!(subscription_id = %entry.id, "Subscription removed during tick");
            return EntryOutcome::Vanished;
        };

        if self.guard.is_satisfied(current.last_notification_sent, now) {
            debug!(
                subscription_id = %current.id,
                target_hour = ?window.target_hour,
                "Already notified for this window"
            );
            return EntryOutcome::AlreadySent;
        }

        if !self.policy.should_emit() {
            return EntryOutcome::Deferred;
        }

        debug!(
            subscription_id = %current.id,
            timezone = %current.timezone,
            target_hour = ?window.target_hour,
            "Sending reminder"
        );
        self.dispatcher.dispatch(&current).await.into()
    }

    /// Tick until `cancel` fires. The first evaluation happens one interval
    /// after start.
    pub async fn run(&self, cancel: CancellationToken) {
        let start = tokio::time::Instant::now() + self.tick_interval;
        let mut ticker = tokio::time::interval_at(start, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Scheduler started (tick every {:?}, emission probability {})",
            self.tick_interval,
            self.policy.probability()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Scheduler received cancellation signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_tick().await;
                }
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("evaluator", &self.evaluator)
            .field("guard", &self.guard)
            .field("policy", &self.policy)
            .field("tick_interval", &self.tick_interval)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}
