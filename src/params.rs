// Measurement parameters, loaded from a JSON file
//
// Every key is optional: missing keys fall back to the built-in defaults and
// each fallback is logged, so a partial file is enough for a run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{COMMAND_TIMEOUT, MOTOR_BAUDRATE, MOTOR_PORT};
use crate::motor::ControllerSettings;

/// HackRF tuning range
pub const MIN_FREQUENCY: f64 = 30e6;
pub const MAX_FREQUENCY: f64 = 6e9;

#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    #[error("Failed to read parameter file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse parameter file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Frequency {0:e} out of range")]
    FrequencyOutOfRange(f64),

    #[error("Invalid parameter {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ParamsError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Params {
    // Motor controller
    pub usb_port: String,
    pub baudrate: u32,

    // Radios (HackRF serial numbers; empty selects the first device)
    pub frequency: f64,
    pub tx_radio_id: String,
    pub rx_radio_id: String,
    pub tx_freq_offset: f64,
    pub rx_freq_offset: f64,
    pub rx_samples: usize,

    // Sweep (degrees)
    pub mast_start_angle: f64,
    pub mast_end_angle: f64,
    pub mast_steps: usize,
    pub arm_start_angle: f64,
    pub arm_end_angle: f64,
    pub arm_steps: usize,

    // Data file: name suffix after the timestamp, and the first line of the file
    pub filename: String,
    pub notes: String,

    // Rig mechanics and timing
    pub mast_units_per_degree: f64,
    pub move_feedrate: f64,
    pub settle_time_s: f64,
    pub tx_latency_s: f64,
    pub command_timeout_s: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            usb_port: MOTOR_PORT.to_string(),
            baudrate: MOTOR_BAUDRATE,
            frequency: 2.4e9,
            tx_radio_id: String::new(),
            rx_radio_id: String::new(),
            tx_freq_offset: 0.0,
            rx_freq_offset: 0.0,
            rx_samples: 10_000,
            mast_start_angle: 0.0,
            mast_end_angle: 360.0,
            mast_steps: 37,
            arm_start_angle: 0.0,
            arm_end_angle: 0.0,
            arm_steps: 1,
            filename: "-pattern.csv".to_string(),
            notes: "Antenna pattern measurement".to_string(),
            // 225 degrees of mast rotation per unit of Y travel
            mast_units_per_degree: 1.0 / 225.0,
            move_feedrate: 0.01,
            settle_time_s: 3.0,
            tx_latency_s: 3.0,
            command_timeout_s: COMMAND_TIMEOUT.as_secs_f64(),
        }
    }
}

impl Params {
    /// Load parameters from `path`, filling gaps from the defaults
    pub fn load(path: &Path) -> Result<Self> {
        let origin = path.display().to_string();
        info!("Loading parameters from {}", origin);

        let text = std::fs::read_to_string(path).map_err(|source| ParamsError::Io {
            path: origin.clone(),
            source,
        })?;
        Self::from_json(&text, &origin)
    }

    /// Parse parameters from JSON text; `origin` names the source in log lines
    pub fn from_json(text: &str, origin: &str) -> Result<Self> {
        let json_err = |source| ParamsError::Json {
            path: origin.to_string(),
            source,
        };

        let given: Map<String, Value> = serde_json::from_str(text).map_err(json_err)?;
        let defaults = match serde_json::to_value(Self::default()).map_err(json_err)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        for key in given.keys() {
            if !defaults.contains_key(key) {
                warn!("Ignoring unknown parameter {} in {}", key, origin);
            }
        }

        let mut merged = Map::new();
        for (key, default) in defaults {
            match given.get(&key) {
                Some(value) => {
                    merged.insert(key, value.clone());
                }
                None => {
                    warn!(
                        "Parameter {} not specified in {}, using default of {}",
                        key, origin, default
                    );
                    merged.insert(key, default);
                }
            }
        }

        let params: Params = serde_json::from_value(Value::Object(merged)).map_err(json_err)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_FREQUENCY..=MAX_FREQUENCY).contains(&self.frequency) {
            return Err(ParamsError::FrequencyOutOfRange(self.frequency));
        }
        if self.mast_steps == 0 {
            return Err(invalid("mast_steps", "must be at least 1"));
        }
        if self.arm_steps == 0 {
            return Err(invalid("arm_steps", "must be at least 1"));
        }
        if self.rx_samples == 0 {
            return Err(invalid("rx_samples", "must be at least 1"));
        }
        for (name, value) in [
            ("settle_time_s", self.settle_time_s),
            ("tx_latency_s", self.tx_latency_s),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(name, "must be a non-negative number of seconds"));
            }
        }
        if !self.command_timeout_s.is_finite() || self.command_timeout_s <= 0.0 {
            return Err(invalid("command_timeout_s", "must be positive"));
        }
        if !self.move_feedrate.is_finite() || self.move_feedrate <= 0.0 {
            return Err(invalid("move_feedrate", "must be positive"));
        }
        Ok(())
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            command_timeout: seconds(self.command_timeout_s),
            ..ControllerSettings::default()
        }
    }

    pub fn settle_time(&self) -> Duration {
        seconds(self.settle_time_s)
    }

    pub fn tx_latency(&self) -> Duration {
        seconds(self.tx_latency_s)
    }

    pub fn tx_frequency(&self) -> f64 {
        self.frequency + self.tx_freq_offset
    }

    pub fn rx_frequency(&self) -> f64 {
        self.frequency + self.rx_freq_offset
    }
}

fn invalid(name: &'static str, reason: &str) -> ParamsError {
    ParamsError::Invalid {
        name,
        reason: reason.to_string(),
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
