//! Randomised emission across a window.
//!
//! Each tick an eligible subscription is sent to with probability `p`,
//! independently of previous ticks. Sends for subscriptions sharing a window
//! are therefore spread out instead of all firing on the first tick.

use std::sync::Arc;

use crate::domain::RandomSource;

/// Per-tick Bernoulli trial deciding whether to send now.
#[derive(Clone)]
pub struct EmissionPolicy {
    probability: f64,
    random: Arc<dyn RandomSource>,
}

impl EmissionPolicy {
    pub fn new(probability: f64, random: Arc<dyn RandomSource>) -> Self {
        Self {
            probability,
            random,
        }
    }

    /// Draw once; `true` means send on this tick.
    pub fn should_emit(&self) -> bool {
        self.random.next_f64() < self.probability
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl std::fmt::Debug for EmissionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmissionPolicy")
            .field("probability", &self.probability)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SequenceRandom, ThreadRandom};

    #[test]
    fn test_draw_below_probability_emits() {
        let policy = EmissionPolicy::new(0.10, Arc::new(SequenceRandom::constant(0.05)));
        assert!(policy.should_emit());
    }

    #[test]
    fn test_draw_at_or_above_probability_holds() {
        let policy = EmissionPolicy::new(0.10, Arc::new(SequenceRandom::new(vec![0.10, 0.9])));
        assert!(!policy.should_emit());
        assert!(!policy.should_emit());
    }

    #[test]
    fn test_zero_and_one_probability() {
        let never = EmissionPolicy::new(0.0, Arc::new(SequenceRandom::constant(0.0)));
        assert!(!never.should_emit());

        let always = EmissionPolicy::new(1.0, Arc::new(ThreadRandom));
        for _ in 0..100 {
            assert!(always.should_emit());
        }
    }
}
