//! Text operator commands.
//!
//! ```text
//! green <lane> [secs]    force lane GREEN, optionally for secs
//! red <lane> [secs]      force lane RED, optionally for secs
//! release <lane>         drop the override on lane
//! clear                  drop every override
//! auto on|off            toggle auto mode
//! pause | resume         stop or restart the tick loop
//! status                 print current overrides
//! ```
//!
//! Lanes are 1-based on the wire and 0-based once parsed.

use std::str::FromStr;

use thiserror::Error;

use crate::overrides::SignalState;

/// A parsed operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Set an override; `duration_secs == 0` is indefinite
    Set {
        lane: usize,
        state: SignalState,
        duration_secs: i64,
    },
    Release { lane: usize },
    ClearAll,
    Auto(bool),
    Pause,
    Resume,
    Status,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("'{command}' needs a {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("'{0}' is not a lane number (lanes start at 1)")]
    InvalidLane(String),

    #[error("'{0}' is not a duration in seconds")]
    InvalidDuration(String),

    #[error("expected 'on' or 'off', got '{0}'")]
    InvalidToggle(String),

    #[error("unexpected argument '{0}'")]
    TrailingArgument(String),
}

impl FromStr for OperatorCommand {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let head = words.next().ok_or(CommandParseError::Empty)?;

        let cmd = match head.to_ascii_lowercase().as_str() {
            "green" => parse_set(SignalState::Green, "green", &mut words)?,
            "red" => parse_set(SignalState::Red, "red", &mut words)?,
            "release" => Self::Release {
                lane: parse_lane(words.next(), "release")?,
            },
            "clear" => Self::ClearAll,
            "auto" => {
                let toggle = words.next().ok_or(CommandParseError::MissingArgument {
                    command: "auto",
                    argument: "mode (on|off)",
                })?;
                match toggle.to_ascii_lowercase().as_str() {
                    "on" => Self::Auto(true),
                    "off" => Self::Auto(false),
                    _ => return Err(CommandParseError::InvalidToggle(toggle.to_string())),
                }
            }
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "status" => Self::Status,
            _ => return Err(CommandParseError::Unknown(head.to_string())),
        };

        match words.next() {
            Some(extra) => Err(CommandParseError::TrailingArgument(extra.to_string())),
            None => Ok(cmd),
        }
    }
}

fn parse_set<'a>(
    state: SignalState,
    command: &'static str,
    words: &mut impl Iterator<Item = &'a str>,
) -> Result<OperatorCommand, CommandParseError> {
    let lane = parse_lane(words.next(), command)?;
    let duration_secs = match words.next() {
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| CommandParseError::InvalidDuration(raw.to_string()))?,
        None => 0,
    };
    Ok(OperatorCommand::Set {
        lane,
        state,
        duration_secs,
    })
}

fn parse_lane(word: Option<&str>, command: &'static str) -> Result<usize, CommandParseError> {
    let raw = word.ok_or(CommandParseError::MissingArgument {
        command,
        argument: "lane",
    })?;
    raw.parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .ok_or_else(|| CommandParseError::InvalidLane(raw.to_string()))
}
