//! Configuration management for trafficarb
//!
//! Handles loading and validation of `trafficarb.toml`. Every key is
//! optional; missing sections fall back to a stock four-lane intersection
//! (5s..180s green, 100-vehicle ceiling, 50-tick history).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::LogConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Arbitration engine parameters
    pub engine: EngineConfig,

    /// Tick loop parameters
    pub runtime: RuntimeConfig,

    /// Simulated sensor feed used by `trafficarb run`
    pub simulation: SimulationConfig,

    /// Logging settings
    pub logging: LogConfig,
}

impl Config {
    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml(&contents)?;
        tracing::debug!(path = %path.display(), lanes = config.engine.num_lanes, "Loaded config");
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML (used by `trafficarb config --default`).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Validate all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        self.runtime.validate()?;
        self.simulation.validate()
    }
}

/// Engine construction parameters, fixed for the engine's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of monitored lanes
    pub num_lanes: usize,
    /// Lower bound of a lane's green time, seconds
    pub min_green: f64,
    /// Upper bound of a lane's green time, seconds
    pub max_green: f64,
    /// Vehicle count that maps to `max_green` in the baseline formula
    pub max_count: u32,
    /// Ring-buffer capacity of the per-lane count history
    pub history_len: usize,
    /// Whether auto mode starts enabled
    pub auto_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_lanes: 4,
            min_green: 5.0,
            max_green: 180.0,
            max_count: 100,
            history_len: 50,
            auto_mode: true,
        }
    }
}

impl EngineConfig {
    /// Create a config with the given bounds and default mode.
    #[must_use]
    pub fn new(
        num_lanes: usize,
        min_green: f64,
        max_green: f64,
        max_count: u32,
        history_len: usize,
    ) -> Self {
        Self {
            num_lanes,
            min_green,
            max_green,
            max_count,
            history_len,
            auto_mode: true,
        }
    }

    /// Check `0 < min_green < max_green`, `max_count > 0`, `history_len > 0`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_green.is_finite() || !self.max_green.is_finite() {
            return Err(ConfigError::NonFiniteGreen);
        }
        if self.min_green <= 0.0 {
            return Err(ConfigError::NonPositiveMinGreen(self.min_green));
        }
        if self.min_green >= self.max_green {
            return Err(ConfigError::GreenBoundsInverted {
                min_green: self.min_green,
                max_green: self.max_green,
            });
        }
        if self.max_count == 0 {
            return Err(ConfigError::ZeroMaxCount);
        }
        if self.history_len == 0 {
            return Err(ConfigError::ZeroHistoryLen);
        }
        Ok(())
    }
}

/// Tick loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Interval between arbitration ticks, milliseconds
    pub tick_interval_ms: u64,
    /// How long a tick waits for lane sensors before reading late lanes as 0/0
    pub sensor_timeout_ms: u64,
    /// Pending control commands before callers back off
    pub command_buffer: usize,
    /// Tick reports retained for slow subscribers
    pub report_buffer: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            sensor_timeout_ms: 500,
            command_buffer: 64,
            report_buffer: 256,
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    #[must_use]
    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "tick_interval_ms",
            });
        }
        if self.sensor_timeout_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "sensor_timeout_ms",
            });
        }
        if self.command_buffer == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "command_buffer",
            });
        }
        if self.report_buffer == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "report_buffer",
            });
        }
        Ok(())
    }
}

/// Simulated detector feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Upper bound of simulated vehicles per lane per tick
    pub max_vehicles: u32,
    /// Chance per lane per tick of an emergency vehicle
    pub emergency_probability: f64,
    /// RNG seed; `None` draws from the OS
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_vehicles: 40,
            emergency_probability: 0.02,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.emergency_probability) {
            return Err(ConfigError::ProbabilityOutOfRange(
                self.emergency_probability,
            ));
        }
        Ok(())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly output
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected pretty or json")),
        }
    }
}
