//! config.rs
//! Configuration provider: a `serde`-derived tree loaded from YAML, falling
//! back to an in-code default (matching the canonical defaults of the
//! system this pipeline replaces) when the file is missing or malformed.
//! A parse failure is logged and absorbed rather than treated as a fatal
//! startup error — the same recovery policy the rest of the pipeline uses
//! for transient faults.

use std::fs;
use std::path::Path;

use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MotorsConfig {
    pub conveyor_speed: f32,
    pub station_speed: f32,
    pub corner_speed: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationsConfig {
    pub station1_process_time_s: f64,
    pub station2_process_time_s: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CornersConfig {
    pub extend_time_s: f64,
    pub retract_time_s: f64,
    pub final_approach_delay_s: f64,
    pub handshake_timeout_s: f64,
    /// Resolves the PUSHING-state open question (SPEC_FULL §9 / DESIGN.md):
    /// when true, the corner FSM actually parks in `Pushing` and waits for a
    /// re-entrant timer tick before arming the handshake wait; when false
    /// (default) the two transitions collapse into one dispatch step.
    #[serde(default)]
    pub preserve_pushing_state: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CepConfig {
    pub fusion_window_s: f64,
    pub expiry_timeout_s: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub event_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub motors: MotorsConfig,
    pub stations: StationsConfig,
    pub corners: CornersConfig,
    pub cep: CepConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            motors: MotorsConfig {
                conveyor_speed: 0.5,
                station_speed: 0.4,
                corner_speed: 0.7,
            },
            stations: StationsConfig {
                station1_process_time_s: 5.0,
                station2_process_time_s: 7.0,
            },
            corners: CornersConfig {
                extend_time_s: 1.5,
                retract_time_s: 1.5,
                final_approach_delay_s: 0.5,
                handshake_timeout_s: 5.0,
                preserve_pushing_state: false,
            },
            cep: CepConfig {
                fusion_window_s: 2.0,
                expiry_timeout_s: 5.0,
            },
            logging: LoggingConfig {
                event_file: "data/events.csv".to_string(),
            },
        }
    }
}

impl Config {
    /// Loads configuration from `path`. Falls back to [`Config::default`] on
    /// any I/O or parse failure rather than aborting startup, logging the
    /// reason at the appropriate level.
    pub fn load(path: impl AsRef<Path>) -> Config {
        let path = path.as_ref();
        match Self::load_strict(path) {
            Ok(config) => config,
            Err(ConfigError::Io { .. }) => {
                warn!("config file {} not found, using defaults", path.display());
                Config::default()
            }
            Err(e @ ConfigError::Parse { .. }) => {
                error!("error loading config: {e}, using defaults");
                Config::default()
            }
        }
    }

    pub fn load_strict(path: &Path) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
