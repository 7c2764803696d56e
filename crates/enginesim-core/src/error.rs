//! Simulator errors

use thiserror::Error;

/// Errors that can occur while configuring or running a simulation
#[derive(Error, Debug)]
pub enum SimError {
    /// Serial or TCP link could not be opened or configured
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Named serial port does not exist
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Gear index outside the gear table
    #[error("Gear index {index} out of range (table has {len} gears)")]
    GearIndex {
        /// Requested gear
        index: usize,
        /// Number of gears in the table
        len: usize,
    },

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration JSON could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A thread panicked while holding the engine lock
    #[error("Engine state lock poisoned")]
    StatePoisoned,

    /// Worker thread could not be spawned
    #[error("Failed to start {name} worker: {source}")]
    WorkerSpawn {
        /// Thread name
        name: &'static str,
        /// Spawn failure
        source: std::io::Error,
    },

    /// Bridge workers were started twice
    #[error("Telemetry bridge already running")]
    AlreadyRunning,

    /// I/O error on the link or a file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, SimError>;
