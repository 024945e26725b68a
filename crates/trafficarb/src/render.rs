//! Plain-text rendering for reports and command outcomes.
//!
//! Lanes are shown 1-based, matching operator commands.

use std::fmt::Write as _;

use chrono::{DateTime, Local, Utc};
use trafficarb_core::engine::{ArbitrationResult, Decision};
use trafficarb_core::report::TickReport;
use trafficarb_core::runtime::{CommandOutcome, RuntimeStatus, ShutdownSummary};

fn clock_time(epoch_ms: u64) -> String {
    i64::try_from(epoch_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map_or_else(
            || epoch_ms.to_string(),
            |t| t.with_timezone(&Local).format("%H:%M:%S%.3f").to_string(),
        )
}

fn lanes_1based(lanes: &[usize]) -> String {
    let shown: Vec<String> = lanes.iter().map(|l| (l + 1).to_string()).collect();
    format!("[{}]", shown.join(", "))
}

fn decision_label(decision: Decision) -> String {
    match decision {
        Decision::Emergency { lane } => format!("emergency lane {}", lane + 1),
        Decision::Auto => "auto".to_string(),
        Decision::Manual => "manual".to_string(),
    }
}

pub fn tick_report(report: &TickReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "[{}] tick {}  vehicles {} ({})  active {} of {} lanes  {}{}",
        clock_time(report.timestamp),
        report.tick,
        report.total_vehicles,
        report.congestion,
        report.active_count(),
        report.lanes.len(),
        decision_label(report.decision),
        if report.auto_mode { "" } else { "  [auto off]" },
    );
    if report.flash_on {
        let _ = writeln!(out, "  !! EMERGENCY VEHICLE APPROACHING !!");
    }
    for lane in &report.lanes {
        let _ = write!(
            out,
            "  lane {:<2} {:>4} veh  {:>6.1}s  {:<9}",
            lane.lane + 1,
            lane.vehicles,
            lane.green_time,
            lane.label(),
        );
        if let Some(state) = lane.manual {
            let _ = write!(out, "  MANUAL({state})");
        }
        if lane.has_emergency() {
            let _ = write!(out, "  AMBULANCE");
        }
        out.push('\n');
    }
    out
}

pub fn arbitration(result: &ArbitrationResult) -> String {
    let mut out = format!(
        "active {}  ({})\n",
        lanes_1based(&result.active_lanes),
        decision_label(result.decision)
    );
    for (lane, time) in result.lane_times.iter().enumerate() {
        let _ = writeln!(out, "  lane {:<2} {:>6.1}s", lane + 1, time);
    }
    out
}

fn status(status: &RuntimeStatus) -> String {
    let mut out = format!(
        "ticks {}  auto {}  paused {}  history {}/{}\n",
        status.ticks,
        if status.auto_mode { "on" } else { "off" },
        status.paused,
        status.history.depth,
        status.history.capacity,
    );
    if status.overrides.is_empty() {
        out.push_str("  no overrides\n");
    }
    for ov in &status.overrides {
        let expiry = ov
            .expires_at
            .map_or_else(|| "indefinite".to_string(), |t| format!("until {}", clock_time(t)));
        let _ = writeln!(
            out,
            "  lane {:<2} {}  {}  by {}",
            ov.lane + 1,
            ov.state,
            expiry,
            ov.source
        );
    }
    out
}

pub fn outcome(outcome: &CommandOutcome) -> String {
    match outcome {
        CommandOutcome::Applied(ov) => match ov.duration_secs {
            Some(secs) => format!("lane {} forced {} for {secs}s\n", ov.lane + 1, ov.state),
            None => format!("lane {} forced {}\n", ov.lane + 1, ov.state),
        },
        CommandOutcome::Released { lane, existed: true } => format!("lane {} released\n", lane + 1),
        CommandOutcome::Released { lane, existed: false } => {
            format!("lane {} had no override\n", lane + 1)
        }
        CommandOutcome::Cleared => "all overrides cleared\n".to_string(),
        CommandOutcome::AutoMode(true) => "auto mode on\n".to_string(),
        CommandOutcome::AutoMode(false) => "auto mode off\n".to_string(),
        CommandOutcome::Paused => "paused\n".to_string(),
        CommandOutcome::Resumed => "resumed\n".to_string(),
        CommandOutcome::Status(s) => status(s),
    }
}

pub fn summary(summary: &ShutdownSummary) -> String {
    let mut out = format!(
        "stopped after {} ticks ({}s): {} emergency preemptions, {} sensor failures, {} sensor timeouts, {} overrides active\n",
        summary.ticks,
        summary.elapsed_secs,
        summary.emergency_preemptions,
        summary.sensor_failures,
        summary.sensor_timeouts,
        summary.overrides_active,
    );
    for warning in &summary.warnings {
        let _ = writeln!(out, "warning: {warning}");
    }
    out
}
