//! Telemetry over the ECU link
//!
//! Frame encoding, the transmit/receive bridge, and the command dispatcher.

mod bridge;
mod dispatcher;
mod frame;

pub(crate) use bridge::pace;
pub use bridge::{BridgeStats, TelemetryBridge};
pub use dispatcher::CommandDispatcher;
pub use frame::TelemetryFrame;
