//! Key token to control intent mapping

use serde::{Deserialize, Serialize};

use crate::engine::SendMode;

/// A single decoded operator key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyToken {
    /// Up arrow
    Up,
    /// Down arrow
    Down,
    /// Left arrow
    Left,
    /// Right arrow
    Right,
    /// Any other input, as typed
    Text(String),
}

/// What the operator wants the simulation to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    /// Raise the throttle target one step
    Accelerate,
    /// Lower the throttle target one step
    Brake,
    /// Next higher gear
    ShiftUp,
    /// Next lower gear
    ShiftDown,
    /// Change the transmit override
    ForceMode(SendMode),
    /// Literal command for the ECU
    RawCommand(String),
    /// Key with no meaning
    None,
}

/// Map a key token to an intent.
///
/// - Up/Down: accelerate/brake
/// - Right/Left: shift up/down
/// - `1`..`4`: force TPS min, TPS max, MAP min, MAP max
/// - `5`: back to normal output
/// - other alphanumeric text: forwarded verbatim as a command
pub fn map_key(token: &KeyToken) -> Intent {
    match token {
        KeyToken::Up => Intent::Accelerate,
        KeyToken::Down => Intent::Brake,
        KeyToken::Right => Intent::ShiftUp,
        KeyToken::Left => Intent::ShiftDown,
        KeyToken::Text(text) => match text.as_str() {
            "1" => Intent::ForceMode(SendMode::ForceTpsMin),
            "2" => Intent::ForceMode(SendMode::ForceTpsMax),
            "3" => Intent::ForceMode(SendMode::ForceMapMin),
            "4" => Intent::ForceMode(SendMode::ForceMapMax),
            "5" => Intent::ForceMode(SendMode::Normal),
            t if !t.is_empty() && t.chars().all(char::is_alphanumeric) => {
                Intent::RawCommand(t.to_string())
            }
            _ => Intent::None,
        },
    }
}
