//! Newline-delimited reader over a [`SerialLink`]

use std::io;
use tracing::warn;

use super::SerialLink;

/// Cap on a partial line; a device that never sends a newline must not grow
/// the buffer without bound
const MAX_PARTIAL_LINE: usize = 4096;

/// Assembles complete text lines from whatever bytes the link has pending
pub struct LineReader {
    link: Box<dyn SerialLink>,
    pending: Vec<u8>,
    /// Skipping the tail of an oversized line up to its newline
    discarding: bool,
}

impl LineReader {
    /// Read lines from `link`
    pub fn new(link: Box<dyn SerialLink>) -> Self {
        Self {
            link,
            pending: Vec::new(),
            discarding: false,
        }
    }

    /// Read the bytes currently available and return every complete,
    /// non-empty line.
    ///
    /// Returns immediately when nothing is pending. Lines are decoded lossily
    /// and trimmed; blank lines are dropped.
    pub fn poll_lines(&mut self) -> io::Result<Vec<String>> {
        self.fill()?;
        Ok(self.take_lines())
    }

    /// Read until nothing more is pending, collecting every line
    pub fn drain(&mut self) -> io::Result<Vec<String>> {
        while self.fill()? {}
        Ok(self.take_lines())
    }

    /// Move pending bytes from the link into the buffer. Returns false when
    /// there was nothing to read.
    fn fill(&mut self) -> io::Result<bool> {
        let available = self.link.bytes_to_read()? as usize;
        if available == 0 {
            return Ok(false);
        }

        let mut buf = vec![0u8; available];
        match self.link.read(&mut buf) {
            Ok(0) => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "link closed")),
            Ok(n) => {
                self.pending.extend_from_slice(&buf[..n]);
                Ok(true)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn take_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            if self.discarding {
                self.discarding = false;
                continue;
            }
            let text = String::from_utf8_lossy(&raw);
            let text = text.trim();
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }

        if self.pending.len() > MAX_PARTIAL_LINE {
            if !self.discarding {
                warn!(
                    bytes = self.pending.len(),
                    "device line exceeds {MAX_PARTIAL_LINE} bytes, dropping it"
                );
            }
            self.pending.clear();
            self.discarding = true;
        }
        lines
    }
}
