//! Error types for trafficarb-core

use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for trafficarb-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Rejected control command
    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    /// Unparseable operator command
    #[error("Command error: {0}")]
    Command(#[from] crate::command::CommandParseError),

    /// Lane sensor failures
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Runtime errors (actor gone, channel closed, etc.)
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl Error {
    /// Short hint for operators, when one applies.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Config(err) => Some(err.hint()),
            Self::Control(err) => Some(err.hint()),
            Self::Command(_) => Some("Try `green <lane> [secs]`, `release <lane>`, or `auto on|off`."),
            Self::Sensor(_) => Some("The lane is treated as 0/0 for this tick; check the feed."),
            Self::Runtime(_) => Some("The arbitration loop has stopped; restart `trafficarb run`."),
            Self::Io(_) | Self::Json(_) => None,
        }
    }
}

/// Bad construction parameters or an unreadable config file.
///
/// Fatal: the engine refuses to build.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("min_green must be > 0 (got {0})")]
    NonPositiveMinGreen(f64),

    #[error("min_green ({min_green}) must be below max_green ({max_green})")]
    GreenBoundsInverted { min_green: f64, max_green: f64 },

    #[error("green bounds must be finite")]
    NonFiniteGreen,

    #[error("max_count must be > 0")]
    ZeroMaxCount,

    #[error("history_len must be > 0")]
    ZeroHistoryLen,

    #[error("{field} must be > 0")]
    ZeroInterval { field: &'static str },

    #[error("emergency_probability must be within [0, 1] (got {0})")]
    ProbabilityOutOfRange(f64),

    #[error("config file not found: {0}")]
    FileNotFound(String),

    #[error("failed to read config file: {0}")]
    ReadFailed(String),

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("failed to serialize config: {0}")]
    SerializeError(String),
}

impl ConfigError {
    fn hint(&self) -> &'static str {
        match self {
            Self::FileNotFound(_) => "Run `trafficarb config --default > trafficarb.toml` to create one.",
            Self::ReadFailed(_) => "Check file permissions on the config path.",
            Self::ParseError(_) | Self::SerializeError(_) => {
                "Validate the TOML syntax; every key is optional."
            }
            _ => "Fix the [engine]/[runtime]/[simulation] values and retry.",
        }
    }
}

/// A control call that was rejected. The engine state is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("invalid lane {lane}: intersection has {num_lanes} lanes")]
    InvalidLane { lane: usize, num_lanes: usize },

    #[error("invalid override duration {0}s: expected 0..=86400")]
    InvalidDuration(i64),
}

impl ControlError {
    fn hint(&self) -> &'static str {
        match self {
            Self::InvalidLane { .. } => "Lane numbers start at 1 on the command line.",
            Self::InvalidDuration(_) => "Use 0 for an indefinite override.",
        }
    }
}

/// A lane sensor could not produce a reading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("sensor for lane {lane} has no readings")]
    Exhausted { lane: usize },

    #[error("sensor for lane {lane} failed: {reason}")]
    Failed { lane: usize, reason: String },
}
