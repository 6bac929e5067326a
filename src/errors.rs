//! errors.rs
//! Error taxonomy for the fallible boundaries of the system: configuration
//! loading, NFC reads, and activity/time-series CSV export. Each is caught
//! at the call site that already has a recovery policy — these types exist
//! so that policy is explicit rather than buried in string matching.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Error)]
pub enum NfcReadError {
    #[error("NFC read timed out")]
    Timeout,
    #[error("NFC hardware fault: {0}")]
    HardwareFault(String),
}

#[derive(Debug, Error)]
pub enum CsvExportError {
    #[error("csv I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv encoding error: {0}")]
    Csv(#[from] csv::Error),
}
