//! Per-tick report for presentation layers.
//!
//! A `TickReport` is a self-contained, serializable picture of one tick:
//! totals, congestion level, and per-lane status. The runtime broadcasts
//! one per tick; the CLI renders it.

use serde::{Deserialize, Serialize};

use crate::congestion::{CongestionLevel, classify};
use crate::engine::{ArbitrationEngine, ArbitrationResult, Decision, SensorSnapshot};
use crate::overrides::SignalState;

/// Display status of one lane for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneStatus {
    pub lane: usize,
    pub vehicles: u32,
    pub emergencies: u32,
    /// Allocated green time in seconds
    pub green_time: f64,
    pub active: bool,
    /// State of the manual override on this lane, if any
    pub manual: Option<SignalState>,
    /// Count reached `max_count`
    pub congested: bool,
}

impl LaneStatus {
    #[must_use]
    pub fn has_emergency(&self) -> bool {
        self.emergencies > 0
    }

    /// Short status tag, most urgent first.
    #[must_use]
    pub fn label(&self) -> &'static str {
        if self.has_emergency() {
            "Priority"
        } else if self.manual.is_some() {
            "Manual"
        } else if self.active {
            "Active"
        } else if self.congested {
            "Congested"
        } else {
            "Idle"
        }
    }
}

/// Everything observable about one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    /// Epoch ms the tick ran at
    pub timestamp: u64,
    pub total_vehicles: u64,
    pub congestion: CongestionLevel,
    pub active_lanes: Vec<usize>,
    pub decision: Decision,
    pub auto_mode: bool,
    /// Emergency banner phase
    pub flash_on: bool,
    pub lanes: Vec<LaneStatus>,
}

impl TickReport {
    /// Assemble a report from the engine state right after `result` was
    /// produced for `snapshot`.
    #[must_use]
    pub fn build(
        tick: u64,
        now: u64,
        engine: &ArbitrationEngine,
        snapshot: &SensorSnapshot,
        result: &ArbitrationResult,
        flash_on: bool,
    ) -> Self {
        let max_count = engine.config().max_count;
        let lanes = (0..engine.num_lanes())
            .map(|lane| {
                let reading = snapshot.get(lane);
                LaneStatus {
                    lane,
                    vehicles: reading.vehicles,
                    emergencies: reading.emergencies,
                    green_time: result.lane_times.get(lane).copied().unwrap_or_default(),
                    active: result.is_active(lane),
                    manual: engine.overrides().get(lane).map(|o| o.state),
                    congested: reading.vehicles >= max_count,
                }
            })
            .collect::<Vec<_>>();
        let total_vehicles = lanes.iter().map(|l| u64::from(l.vehicles)).sum();

        Self {
            tick,
            timestamp: now,
            total_vehicles,
            congestion: classify(total_vehicles),
            active_lanes: result.active_lanes.clone(),
            decision: result.decision,
            auto_mode: engine.auto_mode(),
            flash_on,
            lanes,
        }
    }

    #[must_use]
    pub fn emergency_present(&self) -> bool {
        self.lanes.iter().any(LaneStatus::has_emergency)
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active_lanes.len()
    }
}

/// Emergency banner blink state.
///
/// Flips every tick while an emergency is present and drops to off as soon
/// as none is.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertFlasher {
    on: bool,
}

impl AlertFlasher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one tick and return the new phase.
    pub fn advance(&mut self, emergency_present: bool) -> bool {
        self.on = emergency_present && !self.on;
        self.on
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        self.on
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    const T0: u64 = 1_700_000_000_000;

    fn engine() -> ArbitrationEngine {
        ArbitrationEngine::new(EngineConfig::new(4, 5.0, 180.0, 100, 10)).unwrap()
    }

    #[test]
    fn flasher_toggles_only_during_emergency() {
        let mut f = AlertFlasher::new();
        assert!(f.advance(true));
        assert!(!f.advance(true));
        assert!(f.advance(true));
        assert!(!f.advance(false));
        assert!(!f.advance(false));
        assert!(f.advance(true));
        assert!(f.is_on());
    }

    #[test]
    fn report_reflects_tick() {
        let mut e = engine();
        e.set_override(3, SignalState::Red, 0, T0).unwrap();
        let snapshot = SensorSnapshot::from_counts(&[120, 50, 40, 0], &[0, 0, 0, 0]);
        let result = e.tick_snapshot(&snapshot, T0);
        let report = TickReport::build(1, T0, &e, &snapshot, &result, false);

        assert_eq!(report.total_vehicles, 210);
        assert_eq!(report.congestion, CongestionLevel::Severe);
        assert_eq!(report.active_lanes, vec![3]);
        assert_eq!(report.lanes.len(), 4);
        assert_eq!(report.lanes[0].label(), "Congested");
        assert_eq!(report.lanes[1].label(), "Idle");
        assert_eq!(report.lanes[3].label(), "Manual");
        assert_eq!(report.lanes[3].manual, Some(SignalState::Red));
        assert!(!report.emergency_present());
    }

    #[test]
    fn emergency_lane_is_priority() {
        let mut e = engine();
        let snapshot = SensorSnapshot::from_counts(&[10, 10, 10, 10], &[0, 0, 1, 0]);
        let result = e.tick_snapshot(&snapshot, T0);
        let report = TickReport::build(1, T0, &e, &snapshot, &result, true);

        assert!(report.emergency_present());
        assert_eq!(report.lanes[2].label(), "Priority");
        assert!(report.lanes[2].active);
        assert!((report.lanes[2].green_time - 180.0).abs() < f64::EPSILON);
        assert_eq!(report.active_count(), 1);
        assert!(report.flash_on);
    }

    #[test]
    fn auto_active_lane_label() {
        let mut e = engine();
        let snapshot = SensorSnapshot::from_counts(&[10, 50, 90, 20], &[]);
        let result = e.tick_snapshot(&snapshot, T0);
        let report = TickReport::build(1, T0, &e, &snapshot, &result, false);
        assert_eq!(report.lanes[2].label(), "Active");
        assert_eq!(report.lanes[0].label(), "Idle");
        assert!(report.auto_mode);
    }

    #[test]
    fn report_serializes() {
        let mut e = engine();
        let snapshot = SensorSnapshot::from_counts(&[1, 2, 3, 4], &[]);
        let result = e.tick_snapshot(&snapshot, T0);
        let report = TickReport::build(7, T0, &e, &snapshot, &result, false);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tick"], 7);
        assert_eq!(json["congestion"], "normal");
        assert_eq!(json["decision"]["kind"], "auto");
        let back: TickReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }
}
