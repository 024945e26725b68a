//! Manual signal overrides with optional expiry.
//!
//! Overrides are kept in insertion order: manual-mode lane selection hands
//! out green in the order operators set them, so iteration order is part of
//! the contract. Re-issuing an override on a lane replaces it in place.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ControlError;

/// Longest override accepted, in seconds (one day).
pub const MAX_OVERRIDE_SECS: i64 = 86_400;

/// Signal state requested by an operator.
///
/// Informational only: both states mark the lane as manually active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalState {
    Green,
    Red,
}

impl std::fmt::Display for SignalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Green => write!(f, "GREEN"),
            Self::Red => write!(f, "RED"),
        }
    }
}

/// A manual override on one lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
    /// Lane index
    pub lane: usize,
    /// Requested state
    pub state: SignalState,
    /// Requested duration in seconds; `None` means indefinite
    pub duration_secs: Option<u32>,
    /// Expiry timestamp (epoch ms); present iff `duration_secs` is
    pub expires_at: Option<u64>,
    /// When the override was applied (epoch ms)
    pub applied_at: u64,
    /// Who issued it
    pub source: String,
}

impl Override {
    /// Whether this override has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Milliseconds until expiry, `None` for indefinite overrides.
    #[must_use]
    pub fn remaining_ms(&self, now: u64) -> Option<u64> {
        self.expires_at.map(|exp| exp.saturating_sub(now))
    }
}

/// Overrides keyed by lane, in insertion order.
#[derive(Debug, Clone)]
pub struct OverrideStore {
    num_lanes: usize,
    entries: Vec<Override>,
}

impl OverrideStore {
    /// Create an empty store for `num_lanes` lanes.
    #[must_use]
    pub fn new(num_lanes: usize) -> Self {
        Self {
            num_lanes,
            entries: Vec::new(),
        }
    }

    /// Apply an override, replacing any existing one on the same lane.
    ///
    /// `duration_secs == 0` means the override never auto-expires. Invalid
    /// input leaves the store untouched.
    pub fn set(
        &mut self,
        lane: usize,
        state: SignalState,
        duration_secs: i64,
        now: u64,
        source: impl Into<String>,
    ) -> Result<Override, ControlError> {
        if lane >= self.num_lanes {
            return Err(ControlError::InvalidLane {
                lane,
                num_lanes: self.num_lanes,
            });
        }
        if !(0..=MAX_OVERRIDE_SECS).contains(&duration_secs) {
            return Err(ControlError::InvalidDuration(duration_secs));
        }

        // Range-checked above, fits in u32.
        let duration = (duration_secs > 0).then_some(duration_secs as u32);
        let entry = Override {
            lane,
            state,
            duration_secs: duration,
            expires_at: duration.map(|secs| now.saturating_add(u64::from(secs) * 1000)),
            applied_at: now,
            source: source.into(),
        };

        info!(
            lane,
            state = %entry.state,
            duration_secs = ?entry.duration_secs,
            source = %entry.source,
            "Override applied"
        );

        match self.entries.iter_mut().find(|e| e.lane == lane) {
            Some(existing) => *existing = entry.clone(),
            None => self.entries.push(entry.clone()),
        }
        Ok(entry)
    }

    /// Remove the override on `lane`. Returns whether one existed.
    pub fn clear(&mut self, lane: usize) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.lane != lane);
        let removed = self.entries.len() != before;
        if removed {
            info!(lane, "Override released");
        }
        removed
    }

    /// Remove every override.
    pub fn clear_all(&mut self) {
        if !self.entries.is_empty() {
            info!(count = self.entries.len(), "All overrides cleared");
        }
        self.entries.clear();
    }

    /// Drop every override whose `expires_at <= now`. Returns the expired lanes.
    pub fn sweep_expired(&mut self, now: u64) -> Vec<usize> {
        let mut expired = Vec::new();
        self.entries.retain(|e| {
            if e.is_expired(now) {
                expired.push(e.lane);
                false
            } else {
                true
            }
        });
        if !expired.is_empty() {
            debug!(lanes = ?expired, "Overrides expired");
        }
        expired
    }

    /// Active overrides, oldest-set lane first.
    #[must_use]
    pub fn active(&self) -> &[Override] {
        &self.entries
    }

    /// Override on `lane`, if any.
    #[must_use]
    pub fn get(&self, lane: usize) -> Option<&Override> {
        self.entries.iter().find(|e| e.lane == lane)
    }

    #[must_use]
    pub fn contains(&self, lane: usize) -> bool {
        self.get(lane).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
