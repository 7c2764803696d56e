//! One-shot commands to the ECU

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use super::bridge::{write_line, Counters, SharedReader, SharedWriter};
use crate::error::{Result, SimError};
use crate::report::Reporter;

/// Sends literal commands on the telemetry link and collects the immediate
/// reply
#[derive(Clone)]
pub struct CommandDispatcher {
    writer: SharedWriter,
    reader: SharedReader,
    reporter: Arc<dyn Reporter>,
    settle: Duration,
    counters: Arc<Counters>,
}

impl CommandDispatcher {
    pub(crate) fn new(
        writer: SharedWriter,
        reader: SharedReader,
        reporter: Arc<dyn Reporter>,
        settle: Duration,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            writer,
            reader,
            reporter,
            settle,
            counters,
        }
    }

    /// Write `command` followed by a newline, wait the settle delay, then
    /// drain and report any reply lines.
    ///
    /// The returned lines have already been passed to the reporter.
    pub fn send_command(&self, command: &str) -> Result<Vec<String>> {
        write_line(&self.writer, &format!("{command}\n"))?;
        self.counters.commands_sent.fetch_add(1, Ordering::Relaxed);
        info!(command, "command sent");
        self.reporter.command_sent(command);

        thread::sleep(self.settle);

        let lines = self
            .reader
            .lock()
            .map_err(|_| SimError::SerialError("link reader lock poisoned".to_string()))?
            .drain()?;

        debug!(command, replies = lines.len(), "command reply drained");
        for line in &lines {
            self.counters.lines_received.fetch_add(1, Ordering::Relaxed);
            self.reporter.device_line(line);
        }
        Ok(lines)
    }
}
