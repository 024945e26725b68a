//! trafficarb-core: Core library for trafficarb
//!
//! This crate decides, once per tick, which lanes of a signalized
//! intersection get green and for how long, given per-lane vehicle counts,
//! emergency-vehicle detections, and operator overrides.
//!
//! # Architecture
//!
//! ```text
//! LaneSensor × N → ArbitrationRuntime → ArbitrationEngine → TickReport
//!                        ↑                    │
//!               RuntimeHandle       OverrideStore / AmbulanceCycler
//!            (operator commands)       / HistoryBuffer
//! ```
//!
//! # Modules
//!
//! - `engine`: Per-tick arbitration (baseline timing, overrides, preemption)
//! - `overrides`: Manual overrides with expiry
//! - `cycler`: Round-robin choice among emergency lanes
//! - `history`: Bounded per-lane count history
//! - `congestion`: Intersection-wide congestion level
//! - `report`: Per-tick presentation report
//! - `sensor`: Lane sensor trait plus simulated and scripted feeds
//! - `command`: Text operator commands
//! - `runtime`: Tokio actor running the tick loop
//! - `config`: Configuration management
//! - `logging`: Structured logging setup
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod command;
pub mod config;
pub mod congestion;
pub mod cycler;
pub mod engine;
pub mod error;
pub mod history;
pub mod logging;
pub mod overrides;
pub mod report;
pub mod runtime;
pub mod sensor;

pub use config::Config;
pub use engine::{ArbitrationEngine, ArbitrationResult, LaneReading, SensorSnapshot};
pub use error::{ConfigError, ControlError, Error, Result};
pub use overrides::SignalState;
pub use runtime::{ArbitrationRuntime, RuntimeHandle, ShutdownSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
