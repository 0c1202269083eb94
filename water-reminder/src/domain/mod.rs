//! Domain layer for water-reminder.
//!
//! Entities and value objects shared by the registry, the scheduler and the
//! notification pipeline.

pub mod language;
pub mod random;
pub mod subscription;
pub mod time;

pub use language::Language;
pub use random::{RandomSource, SequenceRandom, ThreadRandom};
pub use subscription::{NewSubscription, PushKeys, PushSubscription, Subscription};
pub use time::{Clock, LocalTime, ManualClock, SystemClock, local_time};
