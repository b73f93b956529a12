// Grbl line protocol
//
// Commands are single ASCII lines terminated by '\n'. The controller answers
// each one with exactly `ok` or `error:<code>`, and may interleave unsolicited
// lines (startup banner, status reports, feedback messages).

use std::fmt;
use std::time::Duration;

/// Error types for motor controller communication
#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not connected to motor controller")]
    NotConnected,

    #[error("No acknowledgment for '{command}' after {waited:?}")]
    Timeout { command: String, waited: Duration },
}

pub type Result<T> = std::result::Result<T, MotorError>;

/// One inbound line, classified
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Command accepted
    Ok,
    /// Command rejected; holds the whole line, e.g. `error:20`
    Error(String),
    /// Anything else: banner, `[MSG:...]`, `<Idle|...>` status reports
    Other(String),
}

impl Response {
    /// Classify a raw line. Blank lines (including read timeouts) yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            None
        } else if line == "ok" {
            Some(Response::Ok)
        } else if line.starts_with("error") {
            Some(Response::Error(line.to_string()))
        } else {
            Some(Response::Other(line.to_string()))
        }
    }
}

/// Result of a command the controller answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Accepted,
    /// The firmware replied with an `error` line (kept verbatim)
    Rejected(String),
}

impl CommandOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, CommandOutcome::Accepted)
    }
}

/// The handful of instructions the rig issues
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GCode {
    /// G21: programming in millimetres
    Millimeters,
    /// G90: absolute positioning
    AbsolutePositioning,
    /// G1 F..: set feedrate for subsequent moves
    SetFeedrate(f64),
    /// G1 Y.. F..: linear move of the mast drive (Y axis)
    MastMove {
        position: f64,
        feedrate: f64,
    },
}

impl fmt::Display for GCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GCode::Millimeters => f.write_str("G21"),
            GCode::AbsolutePositioning => f.write_str("G90"),
            GCode::SetFeedrate(feed) => write!(f, "G1 F{}", feed),
            GCode::MastMove { position, feedrate } => write!(f, "G1 Y{} F{}", position, feedrate),
        }
    }
}
