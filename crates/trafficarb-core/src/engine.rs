//! Arbitration engine: turns one tick of sensor readings into an active-lane
//! set and a per-lane green-time allocation.
//!
//! # Tick stages
//!
//! ```text
//! sweep expired overrides
//!   → baseline green time per lane (linear in count, capped at max_green)
//!   → manual overrides (mark lane, optionally pin its time)
//!   → emergency preemption (one lane, max_green, round robin)   ── return
//!   → auto mode: two busiest lanes | manual mode: overridden lanes
//! ```
//!
//! Each stage may override the previous one. The engine owns all mutable
//! state (overrides, round-robin counter, history, mode flag); nothing is
//! global.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::config::EngineConfig;
use crate::cycler::AmbulanceCycler;
use crate::error::{ConfigError, ControlError};
use crate::history::HistoryBuffer;
use crate::overrides::{Override, OverrideStore, SignalState};

/// Override durations above this many seconds pin nothing; the lane keeps
/// its baseline time. Durations up to this limit pin the lane's time clamped
/// into `[min_green, max_green]`, so a 300 s override yields `max_green`
/// (180 s by default) and every lane time stays within the green bounds.
pub const MAX_PINNED_SECS: u32 = 3600;

/// Source recorded for overrides issued without an explicit one.
pub const DEFAULT_SOURCE: &str = "Controller";

/// One lane's detector output for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneReading {
    /// Vehicles detected
    pub vehicles: u32,
    /// Emergency vehicles detected
    pub emergencies: u32,
}

impl LaneReading {
    #[must_use]
    pub fn new(vehicles: u32, emergencies: u32) -> Self {
        Self {
            vehicles,
            emergencies,
        }
    }
}

/// Per-lane readings for one tick, in lane order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    readings: Vec<LaneReading>,
}

impl SensorSnapshot {
    #[must_use]
    pub fn new(readings: Vec<LaneReading>) -> Self {
        Self { readings }
    }

    /// Zip parallel count sequences; the shorter one is zero-padded.
    #[must_use]
    pub fn from_counts(counts: &[u32], emergencies: &[u32]) -> Self {
        let len = counts.len().max(emergencies.len());
        let readings = (0..len)
            .map(|i| {
                LaneReading::new(
                    counts.get(i).copied().unwrap_or(0),
                    emergencies.get(i).copied().unwrap_or(0),
                )
            })
            .collect();
        Self { readings }
    }

    /// Resize to exactly `num_lanes`, padding missing lanes with 0/0.
    #[must_use]
    pub fn padded(mut self, num_lanes: usize) -> Self {
        self.readings.resize(num_lanes, LaneReading::default());
        self
    }

    #[must_use]
    pub fn readings(&self) -> &[LaneReading] {
        &self.readings
    }

    #[must_use]
    pub fn get(&self, lane: usize) -> LaneReading {
        self.readings.get(lane).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn counts(&self) -> Vec<u32> {
        self.readings.iter().map(|r| r.vehicles).collect()
    }

    #[must_use]
    pub fn emergency_counts(&self) -> Vec<u32> {
        self.readings.iter().map(|r| r.emergencies).collect()
    }

    #[must_use]
    pub fn total_vehicles(&self) -> u64 {
        self.readings.iter().map(|r| u64::from(r.vehicles)).sum()
    }

    /// Lanes with at least one emergency vehicle, in index order.
    #[must_use]
    pub fn emergency_lanes(&self) -> Vec<usize> {
        self.readings
            .iter()
            .enumerate()
            .filter(|(_, r)| r.emergencies > 0)
            .map(|(lane, _)| lane)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Which rule decided the active lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Decision {
    /// Emergency preemption granted this lane exclusive green
    Emergency { lane: usize },
    /// Auto mode picked the busiest lanes
    Auto,
    /// Manual mode or active overrides selected the lanes
    Manual,
}

/// Output of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrationResult {
    /// Lanes granted green, no duplicates
    pub active_lanes: Vec<usize>,
    /// Green time per lane in seconds, always within `[min_green, max_green]`
    pub lane_times: Vec<f64>,
    /// Rule that produced `active_lanes`
    pub decision: Decision,
}

impl ArbitrationResult {
    #[must_use]
    pub fn is_active(&self, lane: usize) -> bool {
        self.active_lanes.contains(&lane)
    }
}

/// The arbitration engine.
#[derive(Debug, Clone)]
pub struct ArbitrationEngine {
    config: EngineConfig,
    overrides: OverrideStore,
    cycler: AmbulanceCycler,
    history: HistoryBuffer,
    auto_mode: bool,
    ticks: u64,
}

impl ArbitrationEngine {
    /// Build an engine, validating the bounds in `config`.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            lanes = config.num_lanes,
            min_green = config.min_green,
            max_green = config.max_green,
            max_count = config.max_count,
            history_len = config.history_len,
            auto_mode = config.auto_mode,
            "Arbitration engine created"
        );
        Ok(Self {
            overrides: OverrideStore::new(config.num_lanes),
            history: HistoryBuffer::new(config.num_lanes, config.history_len),
            cycler: AmbulanceCycler::new(),
            auto_mode: config.auto_mode,
            ticks: 0,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn num_lanes(&self) -> usize {
        self.config.num_lanes
    }

    /// Baseline green time for a vehicle count.
    #[must_use]
    pub fn baseline_time(&self, count: u32) -> f64 {
        let EngineConfig {
            min_green,
            max_green,
            max_count,
            ..
        } = self.config;
        let t = min_green + (f64::from(count) / f64::from(max_count)) * (max_green - min_green);
        t.min(max_green)
    }

    /// Run one arbitration tick.
    ///
    /// Sequences shorter than `num_lanes` are zero-padded; extra entries are
    /// ignored. Never fails.
    pub fn tick(&mut self, counts: &[u32], emergency_counts: &[u32], now: u64) -> ArbitrationResult {
        let snapshot = SensorSnapshot::from_counts(counts, emergency_counts);
        self.tick_snapshot(&snapshot, now)
    }

    /// Run one arbitration tick from a snapshot.
    pub fn tick_snapshot(&mut self, snapshot: &SensorSnapshot, now: u64) -> ArbitrationResult {
        let n = self.config.num_lanes;
        if snapshot.len() != n {
            trace!(reported = snapshot.len(), lanes = n, "Sensor snapshot resized");
        }
        let snapshot = snapshot.clone().padded(n);
        let counts = snapshot.counts();
        self.ticks += 1;
        let tick = self.ticks;

        self.overrides.sweep_expired(now);

        let mut lane_times: Vec<f64> = counts.iter().map(|&c| self.baseline_time(c)).collect();

        let mut manual_active = Vec::with_capacity(self.overrides.len());
        for ov in self.overrides.active() {
            manual_active.push(ov.lane);
            if let Some(secs) = ov.duration_secs.filter(|&d| d > 0 && d <= MAX_PINNED_SECS) {
                lane_times[ov.lane] =
                    f64::from(secs).clamp(self.config.min_green, self.config.max_green);
            }
        }

        self.history.push_all(&counts);

        let emergency_lanes = snapshot.emergency_lanes();
        if let Some(chosen) = self.cycler.next(&emergency_lanes) {
            lane_times[chosen] = self.config.max_green;
            info!(
                tick,
                lane = chosen,
                candidates = ?emergency_lanes,
                cycle = self.cycler.counter(),
                "Emergency preemption"
            );
            return ArbitrationResult {
                active_lanes: vec![chosen],
                lane_times,
                decision: Decision::Emergency { lane: chosen },
            };
        }

        let (active_lanes, decision) = if self.auto_mode && self.overrides.is_empty() {
            (busiest_lanes(&counts), Decision::Auto)
        } else {
            (manual_active, Decision::Manual)
        };

        debug!(
            tick,
            active_lanes = ?active_lanes,
            decision = ?decision,
            overrides = self.overrides.len(),
            "Tick arbitrated"
        );

        ArbitrationResult {
            active_lanes,
            lane_times,
            decision,
        }
    }

    /// Apply a manual override issued by the default controller.
    pub fn set_override(
        &mut self,
        lane: usize,
        state: SignalState,
        duration_secs: i64,
        now: u64,
    ) -> Result<Override, ControlError> {
        self.set_override_from(lane, state, duration_secs, now, DEFAULT_SOURCE)
    }

    /// Apply a manual override, recording who issued it.
    pub fn set_override_from(
        &mut self,
        lane: usize,
        state: SignalState,
        duration_secs: i64,
        now: u64,
        source: impl Into<String>,
    ) -> Result<Override, ControlError> {
        self.overrides.set(lane, state, duration_secs, now, source)
    }

    pub fn clear_override(&mut self, lane: usize) -> bool {
        self.overrides.clear(lane)
    }

    pub fn clear_all_overrides(&mut self) {
        self.overrides.clear_all();
    }

    pub fn set_auto_mode(&mut self, enabled: bool) {
        if self.auto_mode != enabled {
            info!(auto_mode = enabled, "Auto mode changed");
        }
        self.auto_mode = enabled;
    }

    #[must_use]
    pub fn auto_mode(&self) -> bool {
        self.auto_mode
    }

    /// Active overrides, oldest-set lane first.
    #[must_use]
    pub fn active_overrides(&self) -> Vec<Override> {
        self.overrides.active().to_vec()
    }

    #[must_use]
    pub fn overrides(&self) -> &OverrideStore {
        &self.overrides
    }

    /// Recent vehicle counts for `lane`, oldest first.
    #[must_use]
    pub fn history(&self, lane: usize) -> Vec<u32> {
        self.history.snapshot(lane)
    }

    #[must_use]
    pub fn history_buffer(&self) -> &HistoryBuffer {
        &self.history
    }

    /// Ticks run so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    #[must_use]
    pub fn emergency_cycle(&self) -> u64 {
        self.cycler.counter()
    }
}

/// The two busiest lanes: stable ascending sort by count, take the last two.
///
/// Ties keep index order, so the higher index wins a tie for the top spot.
/// All-zero counts default to the first two lanes.
fn busiest_lanes(counts: &[u32]) -> Vec<usize> {
    let n = counts.len();
    if counts.iter().all(|&c| c == 0) {
        return (0..n.min(2)).collect();
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&lane| counts[lane]);
    order.split_off(n.saturating_sub(2))
}
