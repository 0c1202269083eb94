//! Reminder scheduling.
//!
//! Every tick the scheduler walks a snapshot of the registry and, for each
//! subscription, asks in order:
//! 1. Is it inside a notification window in its own timezone? (`window`)
//! 2. Has a delivery already covered this window? (`dedup`)
//! 3. Does the jitter draw say to send on this tick? (`jitter`)
//!
//! Only a subscription that passes all three is handed to the dispatcher.

mod dedup;
mod jitter;
mod service;
mod window;

pub use crate::domain::{RandomSource, SequenceRandom, ThreadRandom};
pub use dedup::DedupGuard;
pub use jitter::EmissionPolicy;
pub use service::{EntryOutcome, Scheduler, TickReport};
pub use window::{WindowEvaluator, WindowMatch};
