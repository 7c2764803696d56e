//! Operator key sources
//!
//! Keys are read line by line. A line made only of arrow escape sequences
//! (or the `+ - > <` aliases) yields one directional token per key; anything
//! else is a single text token.

use std::collections::VecDeque;
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use tracing::{debug, warn};

use super::KeyToken;
use crate::error::{Result, SimError};

/// Result of polling a key source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPoll {
    /// A key was pending
    Key(KeyToken),
    /// Nothing pending right now
    Empty,
    /// The source is exhausted; the operator is gone
    Closed,
}

/// Non-blocking source of operator keys
pub trait KeySource {
    /// Return the next pending key without blocking
    fn poll(&mut self) -> KeyPoll;
}

const ESCAPES: [(&str, KeyToken); 8] = [
    ("\u{1b}[A", KeyToken::Up),
    ("\u{1b}[B", KeyToken::Down),
    ("\u{1b}[C", KeyToken::Right),
    ("\u{1b}[D", KeyToken::Left),
    ("\u{1b}OA", KeyToken::Up),
    ("\u{1b}OB", KeyToken::Down),
    ("\u{1b}OC", KeyToken::Right),
    ("\u{1b}OD", KeyToken::Left),
];

fn alias(c: char) -> Option<KeyToken> {
    match c {
        '+' => Some(KeyToken::Up),
        '-' => Some(KeyToken::Down),
        '>' => Some(KeyToken::Right),
        '<' => Some(KeyToken::Left),
        _ => None,
    }
}

fn decode_directional(mut rest: &str) -> Option<Vec<KeyToken>> {
    let mut tokens = Vec::new();
    'outer: while !rest.is_empty() {
        for (seq, token) in ESCAPES.iter() {
            if let Some(tail) = rest.strip_prefix(*seq) {
                tokens.push(token.clone());
                rest = tail;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        let token = chars.next().and_then(alias)?;
        tokens.push(token);
        rest = chars.as_str();
    }
    Some(tokens)
}

/// Decode one line of operator input into key tokens
pub fn decode_line(line: &str) -> Vec<KeyToken> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }
    decode_directional(line).unwrap_or_else(|| vec![KeyToken::Text(line.to_string())])
}

/// Reads stdin on a background thread
pub struct StdinKeySource {
    rx: Receiver<KeyToken>,
}

impl StdinKeySource {
    /// Start the reader thread.
    ///
    /// The thread blocks on stdin and is left detached; it never touches the
    /// serial link.
    pub fn spawn() -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("keys".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            warn!("stdin read failed: {e}");
                            break;
                        }
                    };
                    for token in decode_line(&line) {
                        if tx.send(token).is_err() {
                            return;
                        }
                    }
                }
                debug!("stdin closed");
            })
            .map_err(|source| SimError::WorkerSpawn {
                name: "keys",
                source,
            })?;
        Ok(Self { rx })
    }
}

impl KeySource for StdinKeySource {
    fn poll(&mut self) -> KeyPoll {
        match self.rx.try_recv() {
            Ok(token) => KeyPoll::Key(token),
            Err(TryRecvError::Empty) => KeyPoll::Empty,
            Err(TryRecvError::Disconnected) => KeyPoll::Closed,
        }
    }
}

/// Replays a fixed list of keys, one per poll.
///
/// `None` entries poll as empty, which lets a script skip ticks.
#[derive(Debug, Default)]
pub struct ScriptedKeys {
    script: VecDeque<Option<KeyToken>>,
    close_when_done: bool,
}

impl ScriptedKeys {
    /// Script of keys; `None` entries poll as empty
    pub fn new(script: impl IntoIterator<Item = Option<KeyToken>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            close_when_done: false,
        }
    }

    /// Report `Closed` once the script runs out
    pub fn close_when_done(mut self) -> Self {
        self.close_when_done = true;
        self
    }
}

impl KeySource for ScriptedKeys {
    fn poll(&mut self) -> KeyPoll {
        match self.script.pop_front() {
            Some(Some(token)) => KeyPoll::Key(token),
            Some(None) => KeyPoll::Empty,
            None if self.close_when_done => KeyPoll::Closed,
            None => KeyPoll::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_arrow_escapes() {
        assert_eq!(decode_line("\u{1b}[A"), vec![KeyToken::Up]);
        assert_eq!(
            decode_line("\u{1b}[A\u{1b}[A\u{1b}OC"),
            vec![KeyToken::Up, KeyToken::Up, KeyToken::Right]
        );
        assert_eq!(decode_line("\u{1b}[D\r"), vec![KeyToken::Left]);
    }

    #[test]
    fn test_decode_aliases() {
        assert_eq!(
            decode_line("++>-<"),
            vec![
                KeyToken::Up,
                KeyToken::Up,
                KeyToken::Right,
                KeyToken::Down,
                KeyToken::Left
            ]
        );
    }

    #[test]
    fn test_decode_text() {
        assert_eq!(decode_line(" d "), vec![KeyToken::Text("d".to_string())]);
        assert_eq!(decode_line("+x"), vec![KeyToken::Text("+x".to_string())]);
        assert!(decode_line("   ").is_empty());
    }

    #[test]
    fn test_scripted_keys() {
        let mut keys = ScriptedKeys::new([Some(KeyToken::Up), None]).close_when_done();
        assert_eq!(keys.poll(), KeyPoll::Key(KeyToken::Up));
        assert_eq!(keys.poll(), KeyPoll::Empty);
        assert_eq!(keys.poll(), KeyPoll::Closed);
    }
}
