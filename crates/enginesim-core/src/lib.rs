//! # enginesim Core Library
//!
//! Hardware-in-the-loop engine signal simulator.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - A coarse engine model (throttle, RPM, MAP voltage, gearbox)
//! - Voltage to 12-bit ADC conversion
//! - Operator key decoding and intent mapping
//! - A telemetry bridge that streams raw sensor readings to an ECU over a
//!   serial (or TCP) link and reports what the ECU sends back
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use enginesim_core::prelude::*;
//!
//! let config = SimConfig::default();
//! let link = open_link(&config.link)?;
//! let mut keys = StdinKeySource::spawn()?;
//! let session = Session::new(config)?;
//! let summary = session.run(link, &mut keys, Arc::new(ConsoleReporter::new(false)))?;
//! println!("stopped: {:?}", summary.reason);
//! ```

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod link;
pub mod report;
pub mod session;
pub mod telemetry;

pub use error::{Result, SimError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::codec::{encode, Calibration, SensorWindow};
    pub use crate::config::{DriverMode, EngineParams, LinkConfig, SensorVoltages, SimConfig};
    pub use crate::engine::{EngineModel, EngineState, GearTable, Phase, SendMode, SharedEngine};
    pub use crate::error::{Result, SimError};
    pub use crate::input::{map_key, Intent, KeyPoll, KeySource, KeyToken, ScriptedKeys, StdinKeySource};
    pub use crate::link::{list_ports, open_link, SerialLink};
    pub use crate::report::{ConsoleReporter, Reporter, Status};
    pub use crate::session::{Session, SessionSummary, StopReason};
    pub use crate::telemetry::{CommandDispatcher, TelemetryBridge, TelemetryFrame};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
