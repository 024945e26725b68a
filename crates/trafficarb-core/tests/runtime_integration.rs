//! Runtime integration tests: actor loop, control handle, sensor gathering.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;

use trafficarb_core::command::OperatorCommand;
use trafficarb_core::config::{EngineConfig, RuntimeConfig};
use trafficarb_core::engine::{Decision, LaneReading};
use trafficarb_core::error::{ControlError, Error, SensorError};
use trafficarb_core::overrides::SignalState;
use trafficarb_core::report::TickReport;
use trafficarb_core::runtime::{ArbitrationRuntime, CommandOutcome, RuntimeHandle};
use trafficarb_core::sensor::{LaneSensor, ScriptedSensor};

const T0: u64 = 1_700_000_000_000;

fn runtime_config() -> RuntimeConfig {
    RuntimeConfig {
        tick_interval_ms: 10,
        sensor_timeout_ms: 200,
        command_buffer: 16,
        report_buffer: 64,
    }
}

fn scripted(counts: &[u32]) -> Vec<Box<dyn LaneSensor>> {
    counts
        .iter()
        .enumerate()
        .map(|(lane, &c)| Box::new(ScriptedSensor::from_counts(lane, &[c])) as Box<dyn LaneSensor>)
        .collect()
}

fn start(sensors: Vec<Box<dyn LaneSensor>>, clock: Arc<AtomicU64>) -> RuntimeHandle {
    ArbitrationRuntime::new(EngineConfig::default(), runtime_config(), sensors)
        .unwrap()
        .with_clock(move || clock.load(Ordering::SeqCst))
        .start()
}

async fn wait_for(
    rx: &mut broadcast::Receiver<TickReport>,
    pred: impl Fn(&TickReport) -> bool,
) -> TickReport {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(report) if pred(&report) => return report,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("report channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for report")
}

struct SlowSensor {
    lane: usize,
    delay: Duration,
}

impl LaneSensor for SlowSensor {
    fn lane(&self) -> usize {
        self.lane
    }

    fn sample(&self) -> Result<LaneReading, SensorError> {
        std::thread::sleep(self.delay);
        Ok(LaneReading::new(99, 0))
    }
}

/// Blocks far past the sensor deadline and records how many of its
/// samples overlap.
struct HungSensor {
    lane: usize,
    delay: Duration,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl LaneSensor for HungSensor {
    fn lane(&self) -> usize {
        self.lane
    }

    fn sample(&self) -> Result<LaneReading, SensorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(LaneReading::new(77, 0))
    }
}

struct BrokenSensor(usize);

impl LaneSensor for BrokenSensor {
    fn lane(&self) -> usize {
        self.0
    }

    fn sample(&self) -> Result<LaneReading, SensorError> {
        Err(SensorError::Failed {
            lane: self.0,
            reason: "loop detector offline".to_string(),
        })
    }
}

#[tokio::test]
async fn auto_mode_reports_busiest_lanes() {
    let handle = start(scripted(&[10, 50, 90, 20]), Arc::new(AtomicU64::new(T0)));
    let mut rx = handle.subscribe();

    let report = wait_for(&mut rx, |_| true).await;
    assert_eq!(report.active_lanes, vec![1, 2]);
    assert_eq!(report.decision, Decision::Auto);
    assert_eq!(report.total_vehicles, 170);
    assert!((report.lanes[2].green_time - 162.5).abs() < 1e-9);

    let summary = handle.shutdown().await.unwrap();
    assert!(summary.clean);
    assert!(summary.ticks >= 1);
}

#[tokio::test]
async fn override_applies_then_expires() {
    let clock = Arc::new(AtomicU64::new(T0));
    let handle = start(scripted(&[10, 50, 90, 20]), Arc::clone(&clock));
    let mut rx = handle.subscribe();

    handle.set_auto_mode(false).await.unwrap();
    let ov = handle.set_override(2, SignalState::Green, 20).await.unwrap();
    assert_eq!(ov.applied_at, T0);
    assert_eq!(ov.expires_at, Some(T0 + 20_000));
    assert_eq!(ov.source, "Controller");

    let report = wait_for(&mut rx, |r| r.active_lanes == vec![2]).await;
    assert!((report.lanes[2].green_time - 20.0).abs() < f64::EPSILON);
    assert_eq!(report.lanes[2].label(), "Manual");

    clock.store(T0 + 21_000, Ordering::SeqCst);
    let report = wait_for(&mut rx, |r| r.active_lanes.is_empty()).await;
    assert!((report.lanes[2].green_time - 162.5).abs() < 1e-9);
    assert!(handle.active_overrides().await.unwrap().is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn invalid_override_is_rejected_without_change() {
    let handle = start(scripted(&[0; 4]), Arc::new(AtomicU64::new(T0)));
    handle.set_override(1, SignalState::Red, 30).await.unwrap();

    let err = handle
        .set_override(1, SignalState::Green, 90_000)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Control(ControlError::InvalidDuration(90_000))
    ));
    let err = handle.set_override(9, SignalState::Green, 10).await.unwrap_err();
    assert!(matches!(err, Error::Control(ControlError::InvalidLane { .. })));

    let overrides = handle.active_overrides().await.unwrap();
    assert_eq!(overrides.len(), 1);
    assert_eq!(overrides[0].state, SignalState::Red);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn pause_stops_ticking_and_keeps_state() {
    let handle = start(scripted(&[5, 5, 5, 5]), Arc::new(AtomicU64::new(T0)));
    let mut rx = handle.subscribe();
    wait_for(&mut rx, |_| true).await;

    handle.set_override(0, SignalState::Green, 0).await.unwrap();
    handle.pause();
    assert!(handle.is_paused());
    // let any in-flight tick drain
    tokio::time::sleep(Duration::from_millis(50)).await;
    let before = handle.status().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let after = handle.status().await.unwrap();
    assert_eq!(before.ticks, after.ticks);
    assert!(after.paused);
    assert_eq!(after.overrides.len(), 1);

    handle.resume();
    let report = wait_for(&mut rx, |r| r.tick > after.ticks).await;
    assert_eq!(report.active_lanes, vec![0]);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn emergency_preempts_and_alternates() {
    let sensors: Vec<Box<dyn LaneSensor>> = vec![
        Box::new(ScriptedSensor::from_counts(0, &[10])),
        Box::new(ScriptedSensor::new(1, vec![LaneReading::new(20, 1)])),
        Box::new(ScriptedSensor::new(2, vec![LaneReading::new(30, 1)])),
        Box::new(ScriptedSensor::from_counts(3, &[40])),
    ];
    let handle = start(sensors, Arc::new(AtomicU64::new(T0)));
    let mut rx = handle.subscribe();

    let first = wait_for(&mut rx, |_| true).await;
    let second = wait_for(&mut rx, |r| r.tick == first.tick + 1).await;
    for report in [&first, &second] {
        assert_eq!(report.active_lanes.len(), 1);
        assert!(report.emergency_present());
    }
    assert_ne!(first.active_lanes, second.active_lanes);
    assert_ne!(first.flash_on, second.flash_on);

    let summary = handle.shutdown().await.unwrap();
    assert_eq!(summary.emergency_preemptions, summary.ticks);
}

#[tokio::test]
async fn slow_and_broken_sensors_read_as_zero() {
    let sensors: Vec<Box<dyn LaneSensor>> = vec![
        Box::new(ScriptedSensor::from_counts(0, &[60])),
        Box::new(SlowSensor {
            lane: 1,
            delay: Duration::from_millis(400),
        }),
        Box::new(BrokenSensor(2)),
        Box::new(ScriptedSensor::from_counts(3, &[30])),
    ];
    let handle = start(sensors, Arc::new(AtomicU64::new(T0)));
    let mut rx = handle.subscribe();

    let report = wait_for(&mut rx, |_| true).await;
    assert_eq!(report.lanes[1].vehicles, 0);
    assert_eq!(report.lanes[2].vehicles, 0);
    assert_eq!(report.active_lanes, vec![3, 0]);

    let summary = handle.shutdown().await.unwrap();
    assert!(summary.sensor_timeouts >= 1);
    assert!(summary.sensor_failures >= 1);
}

#[tokio::test]
async fn tick_limit_ends_run() {
    let handle = ArbitrationRuntime::new(EngineConfig::default(), runtime_config(), scripted(&[1, 2, 3, 4]))
        .unwrap()
        .with_tick_limit(3)
        .start();
    let mut rx = handle.subscribe();
    wait_for(&mut rx, |r| r.tick == 3).await;

    let summary = handle.shutdown().await.unwrap();
    assert_eq!(summary.ticks, 3);
    assert!(summary.clean);
}

#[tokio::test]
async fn operator_commands_round_trip() {
    let handle = start(scripted(&[10, 50, 90, 20]), Arc::new(AtomicU64::new(T0)));

    let outcome = handle
        .apply("green 4 15".parse::<OperatorCommand>().unwrap())
        .await
        .unwrap();
    assert!(matches!(outcome, CommandOutcome::Applied(ref o) if o.lane == 3));

    let outcome = handle.apply(OperatorCommand::Status).await.unwrap();
    let CommandOutcome::Status(status) = outcome else {
        panic!("expected status");
    };
    assert_eq!(status.overrides.len(), 1);
    assert!(status.auto_mode);

    let outcome = handle.apply(OperatorCommand::Release { lane: 3 }).await.unwrap();
    assert_eq!(outcome, CommandOutcome::Released { lane: 3, existed: true });
    assert_eq!(
        handle.apply(OperatorCommand::Auto(false)).await.unwrap(),
        CommandOutcome::AutoMode(false)
    );
    assert_eq!(handle.apply(OperatorCommand::ClearAll).await.unwrap(), CommandOutcome::Cleared);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn history_is_queryable() {
    let handle = start(scripted(&[7, 8, 9, 10]), Arc::new(AtomicU64::new(T0)));
    let mut rx = handle.subscribe();
    wait_for(&mut rx, |r| r.tick >= 2).await;

    let history = handle.history(2).await.unwrap();
    assert!(history.len() >= 2);
    assert!(history.iter().all(|&c| c == 9));
    assert!(handle.history(42).await.unwrap().is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn calls_after_shutdown_fail() {
    let handle = start(scripted(&[0; 4]), Arc::new(AtomicU64::new(T0)));
    let other = handle.clone();
    handle.shutdown().await.unwrap();

    assert!(matches!(other.shutdown().await, Err(Error::Runtime(_))));
    assert!(matches!(
        other.set_override(0, SignalState::Green, 5).await,
        Err(Error::Runtime(_))
    ));
}

#[tokio::test]
async fn hung_sensor_keeps_one_sample_in_flight() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let sensors: Vec<Box<dyn LaneSensor>> = vec![
        Box::new(ScriptedSensor::from_counts(0, &[40])),
        Box::new(HungSensor {
            lane: 1,
            delay: Duration::from_millis(800),
            running: Arc::clone(&running),
            peak: Arc::clone(&peak),
            calls: Arc::clone(&calls),
        }),
        Box::new(ScriptedSensor::from_counts(2, &[10])),
        Box::new(ScriptedSensor::from_counts(3, &[20])),
    ];
    let config = RuntimeConfig {
        tick_interval_ms: 10,
        sensor_timeout_ms: 20,
        ..runtime_config()
    };
    let handle = ArbitrationRuntime::new(EngineConfig::default(), config, sensors)
        .unwrap()
        .start();
    let mut rx = handle.subscribe();

    // healthy lanes keep reporting while lane 1 is stuck
    let report = wait_for(&mut rx, |r| r.tick >= 20).await;
    assert_eq!(report.lanes[0].vehicles, 40);
    assert_eq!(report.lanes[3].vehicles, 20);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let summary = handle.shutdown().await.unwrap();
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(calls.load(Ordering::SeqCst) <= 2);
    assert!(summary.sensor_timeouts >= 20);
}
