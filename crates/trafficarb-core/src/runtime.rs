//! Arbitration runtime: the tick loop and its control surface.
//!
//! # Architecture
//!
//! ```text
//! LaneSensor × N ──spawn_blocking──► gather (bounded by sensor_timeout,
//!                                    one pending sample per sensor)
//!                                         │
//! RuntimeHandle ──mpsc──► actor ──────────┴──► ArbitrationEngine::tick
//!       ▲                   │                         │
//!       └──── oneshot ──────┘          broadcast ◄── TickReport
//! ```
//!
//! One actor task owns the engine. Control calls from any number of handle
//! clones are queued on an mpsc channel and applied between ticks, each
//! stamped with the clock reading taken when the call was made. Pausing
//! stops ticking but keeps overrides and history.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::command::OperatorCommand;
use crate::config::{EngineConfig, RuntimeConfig};
use crate::engine::{ArbitrationEngine, Decision, LaneReading, SensorSnapshot};
use crate::error::{ConfigError, ControlError, Error, Result, SensorError};
use crate::history::HistoryStats;
use crate::overrides::{Override, SignalState};
use crate::report::{AlertFlasher, TickReport};
use crate::sensor::LaneSensor;

/// How long `shutdown` waits for the actor before giving up on it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Millisecond wall clock used for override stamps and expiry.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Current time as epoch milliseconds.
#[must_use]
pub fn epoch_ms() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// Public types
// =============================================================================

/// Point-in-time view of the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStatus {
    pub ticks: u64,
    pub auto_mode: bool,
    pub paused: bool,
    pub overrides: Vec<Override>,
    pub history: HistoryStats,
    pub emergency_cycle: u64,
}

/// Result of applying an `OperatorCommand`.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Applied(Override),
    Released { lane: usize, existed: bool },
    Cleared,
    AutoMode(bool),
    Paused,
    Resumed,
    Status(RuntimeStatus),
}

/// What the runtime did over its lifetime, returned by `shutdown`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownSummary {
    pub elapsed_secs: u64,
    pub ticks: u64,
    pub emergency_preemptions: u64,
    pub sensor_failures: u64,
    pub sensor_timeouts: u64,
    pub overrides_active: usize,
    /// Actor stopped within the shutdown timeout
    pub clean: bool,
    pub warnings: Vec<String>,
}

// =============================================================================
// Actor messages
// =============================================================================

enum Command {
    SetOverride {
        lane: usize,
        state: SignalState,
        duration_secs: i64,
        source: String,
        at: u64,
        reply: oneshot::Sender<std::result::Result<Override, ControlError>>,
    },
    ClearOverride {
        lane: usize,
        reply: oneshot::Sender<bool>,
    },
    ClearAll {
        reply: oneshot::Sender<()>,
    },
    SetAutoMode {
        enabled: bool,
        reply: oneshot::Sender<()>,
    },
    ActiveOverrides {
        reply: oneshot::Sender<Vec<Override>>,
    },
    History {
        lane: usize,
        reply: oneshot::Sender<Vec<u32>>,
    },
    Status {
        reply: oneshot::Sender<RuntimeStatus>,
    },
    Shutdown,
}

// =============================================================================
// ArbitrationRuntime
// =============================================================================

/// Owns an engine and its sensors until `start` hands them to the actor.
pub struct ArbitrationRuntime {
    engine: ArbitrationEngine,
    sensors: Vec<Arc<dyn LaneSensor>>,
    config: RuntimeConfig,
    clock: Clock,
    max_ticks: Option<u64>,
}

impl ArbitrationRuntime {
    pub fn new(
        engine_config: EngineConfig,
        config: RuntimeConfig,
        sensors: Vec<Box<dyn LaneSensor>>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let engine = ArbitrationEngine::new(engine_config)?;
        let lanes = engine.num_lanes();
        for sensor in sensors.iter().filter(|s| s.lane() >= lanes) {
            warn!(lane = sensor.lane(), lanes, "Sensor for unknown lane will be ignored");
        }
        Ok(Self {
            engine,
            sensors: sensors.into_iter().map(Arc::from).collect(),
            config,
            clock: Arc::new(epoch_ms),
            max_ticks: None,
        })
    }

    /// Replace the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Stop ticking on its own after `ticks` ticks.
    #[must_use]
    pub fn with_tick_limit(mut self, ticks: u64) -> Self {
        self.max_ticks = Some(ticks);
        self
    }

    /// Spawn the actor on the current tokio runtime.
    #[must_use]
    pub fn start(self) -> RuntimeHandle {
        let (command_tx, command_rx) = mpsc::channel(self.config.command_buffer);
        let (report_tx, _) = broadcast::channel(self.config.report_buffer);
        let (pause_tx, pause_rx) = watch::channel(false);

        info!(
            lanes = self.engine.num_lanes(),
            sensors = self.sensors.len(),
            tick_interval_ms = self.config.tick_interval_ms,
            sensor_timeout_ms = self.config.sensor_timeout_ms,
            auto_mode = self.engine.auto_mode(),
            "Arbitration runtime started"
        );

        let clock = Arc::clone(&self.clock);
        let sensor_count = self.sensors.len();
        let actor = Actor {
            engine: self.engine,
            sensors: self.sensors,
            config: self.config,
            clock: self.clock,
            max_ticks: self.max_ticks,
            commands: command_rx,
            reports: report_tx.clone(),
            paused: pause_rx,
            flasher: AlertFlasher::new(),
            stats: ShutdownSummary::default(),
            in_flight: std::iter::repeat_with(|| None).take(sensor_count).collect(),
        };
        let task = tokio::spawn(actor.run());

        RuntimeHandle {
            commands: command_tx,
            reports: report_tx,
            pause: Arc::new(pause_tx),
            clock,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

// =============================================================================
// Actor
// =============================================================================

struct Actor {
    engine: ArbitrationEngine,
    sensors: Vec<Arc<dyn LaneSensor>>,
    config: RuntimeConfig,
    clock: Clock,
    max_ticks: Option<u64>,
    commands: mpsc::Receiver<Command>,
    reports: broadcast::Sender<TickReport>,
    paused: watch::Receiver<bool>,
    flasher: AlertFlasher,
    stats: ShutdownSummary,
    /// Pending sample per sensor, parallel to `sensors`
    in_flight: Vec<Option<JoinHandle<std::result::Result<LaneReading, SensorError>>>>,
}

impl Actor {
    async fn run(mut self) -> ShutdownSummary {
        let started = Instant::now();
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown) => {
                        debug!("Shutdown command received");
                        break;
                    }
                    Some(cmd) => self.handle(cmd),
                    None => {
                        debug!("All runtime handles dropped");
                        break;
                    }
                },
                _ = interval.tick() => {
                    if *self.paused.borrow() {
                        continue;
                    }
                    self.tick().await;
                    if self.max_ticks.is_some_and(|limit| self.engine.ticks() >= limit) {
                        info!(ticks = self.engine.ticks(), "Tick limit reached");
                        break;
                    }
                }
            }
        }

        let mut summary = self.stats;
        summary.elapsed_secs = started.elapsed().as_secs();
        summary.ticks = self.engine.ticks();
        summary.overrides_active = self.engine.overrides().len();
        summary.clean = true;
        info!(
            ticks = summary.ticks,
            emergency_preemptions = summary.emergency_preemptions,
            sensor_failures = summary.sensor_failures,
            "Arbitration runtime stopped"
        );
        summary
    }

    fn handle(&mut self, cmd: Command) {
        // A dropped reply receiver means the caller gave up; nothing to do.
        match cmd {
            Command::SetOverride {
                lane,
                state,
                duration_secs,
                source,
                at,
                reply,
            } => {
                let result = self
                    .engine
                    .set_override_from(lane, state, duration_secs, at, source);
                if let Err(err) = &result {
                    warn!(lane, error = %err, "Override rejected");
                }
                let _ = reply.send(result);
            }
            Command::ClearOverride { lane, reply } => {
                let _ = reply.send(self.engine.clear_override(lane));
            }
            Command::ClearAll { reply } => {
                self.engine.clear_all_overrides();
                let _ = reply.send(());
            }
            Command::SetAutoMode { enabled, reply } => {
                self.engine.set_auto_mode(enabled);
                let _ = reply.send(());
            }
            Command::ActiveOverrides { reply } => {
                let _ = reply.send(self.engine.active_overrides());
            }
            Command::History { lane, reply } => {
                let _ = reply.send(self.engine.history(lane));
            }
            Command::Status { reply } => {
                let _ = reply.send(RuntimeStatus {
                    ticks: self.engine.ticks(),
                    auto_mode: self.engine.auto_mode(),
                    paused: *self.paused.borrow(),
                    overrides: self.engine.active_overrides(),
                    history: self.engine.history_buffer().stats(),
                    emergency_cycle: self.engine.emergency_cycle(),
                });
            }
            Command::Shutdown => {}
        }
    }

    async fn tick(&mut self) {
        let snapshot = self.gather().await;
        let now = (self.clock)();
        let result = self.engine.tick_snapshot(&snapshot, now);
        if matches!(result.decision, Decision::Emergency { .. }) {
            self.stats.emergency_preemptions += 1;
        }
        let flash_on = self.flasher.advance(!snapshot.emergency_lanes().is_empty());
        let report = TickReport::build(
            self.engine.ticks(),
            now,
            &self.engine,
            &snapshot,
            &result,
            flash_on,
        );
        // No subscribers is fine.
        let _ = self.reports.send(report);
    }

    /// Sample every sensor concurrently. Lanes that fail or miss the
    /// deadline read as 0/0.
    ///
    /// Each sensor has at most one sample in flight. A sample that misses
    /// the deadline stays pending and is awaited again next tick instead of
    /// being replaced.
    async fn gather(&mut self) -> SensorSnapshot {
        let lanes = self.engine.num_lanes();
        let mut readings = vec![LaneReading::default(); lanes];
        let deadline = tokio::time::Instant::now() + self.config.sensor_timeout();

        for (sensor, slot) in self.sensors.iter().zip(self.in_flight.iter_mut()) {
            if slot.is_some() {
                debug!(lane = sensor.lane(), "Previous sample still in flight");
                continue;
            }
            let sensor = Arc::clone(sensor);
            *slot = Some(tokio::task::spawn_blocking(move || sensor.sample()));
        }

        let mut failures = 0u64;
        let mut late = 0u64;
        for (sensor, slot) in self.sensors.iter().zip(self.in_flight.iter_mut()) {
            let Some(pending) = slot.as_mut() else {
                continue;
            };
            let lane = sensor.lane();
            let Ok(joined) = timeout_at(deadline, pending).await else {
                late += 1;
                continue;
            };
            *slot = None;
            match joined {
                Ok(Ok(reading)) => {
                    if let Some(out) = readings.get_mut(lane) {
                        *out = reading;
                    }
                }
                Ok(Err(err)) => {
                    failures += 1;
                    warn!(lane, error = %err, "Sensor read failed");
                }
                Err(err) => {
                    failures += 1;
                    warn!(lane, error = %err, "Sensor task panicked");
                }
            }
        }

        self.stats.sensor_failures += failures;
        if late > 0 {
            self.stats.sensor_timeouts += late;
            warn!(
                late,
                timeout_ms = self.config.sensor_timeout_ms,
                "Sensor deadline elapsed"
            );
        }
        SensorSnapshot::new(readings)
    }
}

// =============================================================================
// RuntimeHandle
// =============================================================================

/// Cloneable control surface for a running `ArbitrationRuntime`.
#[derive(Clone)]
pub struct RuntimeHandle {
    commands: mpsc::Sender<Command>,
    reports: broadcast::Sender<TickReport>,
    pause: Arc<watch::Sender<bool>>,
    clock: Clock,
    task: Arc<Mutex<Option<JoinHandle<ShutdownSummary>>>>,
}

impl RuntimeHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| Error::Runtime("arbitration loop is not running".to_string()))?;
        rx.await
            .map_err(|_| Error::Runtime("arbitration loop dropped the request".to_string()))
    }

    /// Apply an override issued by the default controller.
    pub async fn set_override(
        &self,
        lane: usize,
        state: SignalState,
        duration_secs: i64,
    ) -> Result<Override> {
        self.set_override_from(lane, state, duration_secs, crate::engine::DEFAULT_SOURCE)
            .await
    }

    /// Apply an override on behalf of `source`.
    pub async fn set_override_from(
        &self,
        lane: usize,
        state: SignalState,
        duration_secs: i64,
        source: impl Into<String>,
    ) -> Result<Override> {
        let at = (self.clock)();
        let source = source.into();
        let result = self
            .request(|reply| Command::SetOverride {
                lane,
                state,
                duration_secs,
                source,
                at,
                reply,
            })
            .await?;
        Ok(result?)
    }

    pub async fn clear_override(&self, lane: usize) -> Result<bool> {
        self.request(|reply| Command::ClearOverride { lane, reply })
            .await
    }

    pub async fn clear_all_overrides(&self) -> Result<()> {
        self.request(|reply| Command::ClearAll { reply }).await
    }

    pub async fn set_auto_mode(&self, enabled: bool) -> Result<()> {
        self.request(|reply| Command::SetAutoMode { enabled, reply })
            .await
    }

    pub async fn active_overrides(&self) -> Result<Vec<Override>> {
        self.request(|reply| Command::ActiveOverrides { reply })
            .await
    }

    pub async fn history(&self, lane: usize) -> Result<Vec<u32>> {
        self.request(|reply| Command::History { lane, reply }).await
    }

    pub async fn status(&self) -> Result<RuntimeStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Stop ticking. Overrides, history and the emergency cycle persist.
    pub fn pause(&self) {
        if !self.pause.send_replace(true) {
            info!("Arbitration paused");
        }
    }

    pub fn resume(&self) {
        if self.pause.send_replace(false) {
            info!("Arbitration resumed");
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.pause.borrow()
    }

    /// Receive one `TickReport` per tick from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TickReport> {
        self.reports.subscribe()
    }

    /// Run a parsed operator command.
    pub async fn apply(&self, command: OperatorCommand) -> Result<CommandOutcome> {
        Ok(match command {
            OperatorCommand::Set {
                lane,
                state,
                duration_secs,
            } => CommandOutcome::Applied(self.set_override(lane, state, duration_secs).await?),
            OperatorCommand::Release { lane } => CommandOutcome::Released {
                lane,
                existed: self.clear_override(lane).await?,
            },
            OperatorCommand::ClearAll => {
                self.clear_all_overrides().await?;
                CommandOutcome::Cleared
            }
            OperatorCommand::Auto(enabled) => {
                self.set_auto_mode(enabled).await?;
                CommandOutcome::AutoMode(enabled)
            }
            OperatorCommand::Pause => {
                self.pause();
                CommandOutcome::Paused
            }
            OperatorCommand::Resume => {
                self.resume();
                CommandOutcome::Resumed
            }
            OperatorCommand::Status => CommandOutcome::Status(self.status().await?),
        })
    }

    /// Stop the actor and collect its summary.
    ///
    /// Only the first call across all clones gets the summary; later calls
    /// return `Error::Runtime`.
    pub async fn shutdown(&self) -> Result<ShutdownSummary> {
        let task = self
            .task
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::Runtime("runtime already shut down".to_string()))?;

        // The actor may already be gone after reaching its tick limit.
        let _ = self.commands.send(Command::Shutdown).await;
        info!("Shutdown signal sent");

        let abort = task.abort_handle();
        match timeout(SHUTDOWN_TIMEOUT, task).await {
            Ok(Ok(summary)) => Ok(summary),
            Ok(Err(err)) => Err(Error::Runtime(format!("arbitration task failed: {err}"))),
            Err(_) => {
                abort.abort();
                Ok(ShutdownSummary {
                    clean: false,
                    warnings: vec!["Arbitration task did not stop within timeout".to_string()],
                    ..ShutdownSummary::default()
                })
            }
        }
    }
}
