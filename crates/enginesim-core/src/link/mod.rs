//! ECU link
//!
//! The duplex byte channel to the unit under test and the helpers built on
//! it.

mod lines;
pub mod serial;
mod stream;

pub use lines::LineReader;
pub use serial::{list_ports, open_link, PortInfo};
pub use stream::{SerialChannel, SerialLink, TcpChannel};
