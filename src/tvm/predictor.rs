//! Branch prediction table.
//!
//! 2-bit saturating counters indexed by the low bits of the branch PC.
//! Counters start weakly-not-taken. Predictions only ever move counters;
//! they never touch architectural state.

use serde::{Serialize, Deserialize};

/// Default number of counters.
pub const PREDICTOR_ENTRIES: usize = 256;

const WEAKLY_NOT_TAKEN: u8 = 1;
const STRONGLY_TAKEN: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchPredictor {
    counters: Vec<u8>,
    enabled: bool,
}

impl BranchPredictor {
    /// Create a predictor with `entries` counters (rounded up to a power of two).
    pub fn new(entries: usize) -> Self {
        let entries = entries.max(1).next_power_of_two();
        Self {
            counters: vec![WEAKLY_NOT_TAKEN; entries],
            enabled: true,
        }
    }

    /// A predictor that always predicts not-taken.
    pub fn disabled(entries: usize) -> Self {
        let mut predictor = Self::new(entries);
        predictor.enabled = false;
        predictor
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn entries(&self) -> usize {
        self.counters.len()
    }

    #[inline]
    fn index(&self, pc: usize) -> usize {
        pc & (self.counters.len() - 1)
    }

    /// Predict whether the branch at `pc` is taken.
    pub fn predict(&self, pc: usize) -> bool {
        self.enabled && self.counters[self.index(pc)] >= 2
    }

    /// Train the counter for `pc` with the actual outcome.
    pub fn update(&mut self, pc: usize, taken: bool) {
        if !self.enabled {
            return;
        }
        let i = self.index(pc);
        let counter = &mut self.counters[i];
        *counter = if taken {
            (*counter + 1).min(STRONGLY_TAKEN)
        } else {
            counter.saturating_sub(1)
        };
    }

    /// Counter value for `pc` (0..=3).
    pub fn counter(&self, pc: usize) -> u8 {
        self.counters[self.index(pc)]
    }

    /// Return every counter to weakly-not-taken.
    pub fn reset(&mut self) {
        self.counters.fill(WEAKLY_NOT_TAKEN);
    }
}

impl Default for BranchPredictor {
    fn default() -> Self {
        Self::new(PREDICTOR_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_prediction_is_not_taken() {
        let p = BranchPredictor::default();
        assert!(!p.predict(0));
        assert_eq!(p.counter(7), 1);
    }

    #[test]
    fn test_counters_saturate() {
        let mut p = BranchPredictor::new(4);
        for _ in 0..10 {
            p.update(2, true);
        }
        assert_eq!(p.counter(2), 3);
        assert!(p.predict(2));
        // aliasing: 6 shares the slot with 2
        assert!(p.predict(6));
        for _ in 0..10 {
            p.update(2, false);
        }
        assert_eq!(p.counter(2), 0);
    }

    #[test]
    fn test_disabled_never_trains() {
        let mut p = BranchPredictor::disabled(16);
        p.update(1, true);
        p.update(1, true);
        assert!(!p.predict(1));
        assert_eq!(p.counter(1), 1);
    }
}
