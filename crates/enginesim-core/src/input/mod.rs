//! Operator input
//!
//! Key capture and the mapping from keys to control intents.

mod intent;
mod keys;

pub use intent::{map_key, Intent, KeyToken};
pub use keys::{decode_line, KeyPoll, KeySource, ScriptedKeys, StdinKeySource};
