//! Round-robin choice among simultaneous emergency lanes.
//!
//! A single counter advances on every pick and is never reset, so the pick
//! is `candidates[counter % candidates.len()]` against whatever candidate
//! set the current tick reports. When the set changes shape between ticks
//! the rotation follows counter parity, not lane identity: a lane can be
//! picked twice in a row if the set grows or shrinks underneath it.

use serde::{Deserialize, Serialize};

/// Stateful round-robin pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbulanceCycler {
    counter: u64,
}

impl AmbulanceCycler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick one of `candidates` and advance. Empty input picks nothing and
    /// leaves the counter alone.
    pub fn next(&mut self, candidates: &[usize]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let idx = (self.counter % candidates.len() as u64) as usize;
        self.counter = self.counter.wrapping_add(1);
        Some(candidates[idx])
    }

    /// Picks made so far.
    #[must_use]
    pub fn counter(&self) -> u64 {
        self.counter
    }
}
