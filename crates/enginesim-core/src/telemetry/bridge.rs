//! Telemetry bridge
//!
//! Two worker threads share the ECU link: the transmit loop streams the
//! engine's sensor readings at a fixed period, the receive loop surfaces
//! whatever text the ECU sends back. Writes from the transmit loop and the
//! [`CommandDispatcher`] are serialized by one lock; the line reader sits
//! behind another so it is never driven from two call sites at once.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::{CommandDispatcher, TelemetryFrame};
use crate::config::{LinkConfig, SensorVoltages};
use crate::engine::SharedEngine;
use crate::error::{Result, SimError};
use crate::link::{LineReader, SerialLink};
use crate::report::Reporter;

pub(crate) type SharedWriter = Arc<Mutex<Box<dyn SerialLink>>>;
pub(crate) type SharedReader = Arc<Mutex<LineReader>>;

/// Write one line under the channel lock
pub(crate) fn write_line(writer: &SharedWriter, line: &str) -> io::Result<()> {
    let mut link = writer
        .lock()
        .map_err(|_| io::Error::other("link writer lock poisoned"))?;
    link.write_all(line.as_bytes())?;
    link.flush()
}

/// Cumulative link counters
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub frames_sent: AtomicU64,
    pub write_errors: AtomicU64,
    pub lines_received: AtomicU64,
    pub read_errors: AtomicU64,
    pub commands_sent: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            lines_received: self.lines_received.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of the bridge counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Telemetry lines written
    pub frames_sent: u64,
    /// Telemetry writes that failed
    pub write_errors: u64,
    /// Non-empty lines received
    pub lines_received: u64,
    /// Failed link reads
    pub read_errors: u64,
    /// Commands written by the dispatcher
    pub commands_sent: u64,
}

/// Transmit/receive workers over one ECU link
pub struct TelemetryBridge {
    writer: SharedWriter,
    reader: SharedReader,
    engine: SharedEngine,
    sensors: SensorVoltages,
    config: LinkConfig,
    reporter: Arc<dyn Reporter>,
    stop: Arc<AtomicBool>,
    counters: Arc<Counters>,
    workers: Vec<JoinHandle<()>>,
}

impl TelemetryBridge {
    /// Wrap `link`; workers are not started until [`start`](Self::start)
    pub fn new(
        link: Box<dyn SerialLink>,
        engine: SharedEngine,
        sensors: SensorVoltages,
        config: LinkConfig,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self> {
        let read_handle = link.try_clone()?;
        Ok(Self {
            writer: Arc::new(Mutex::new(link)),
            reader: Arc::new(Mutex::new(LineReader::new(read_handle))),
            engine,
            sensors,
            config,
            reporter,
            stop: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
            workers: Vec::new(),
        })
    }

    /// Handle for one-shot commands on the same link
    pub fn dispatcher(&self) -> CommandDispatcher {
        CommandDispatcher::new(
            self.writer.clone(),
            self.reader.clone(),
            self.reporter.clone(),
            self.config.command_settle(),
            self.counters.clone(),
        )
    }

    /// True between `start` and `stop`
    pub fn is_running(&self) -> bool {
        !self.workers.is_empty()
    }

    /// Counter snapshot
    pub fn stats(&self) -> BridgeStats {
        self.counters.snapshot()
    }

    /// Spawn the transmit and receive workers
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(SimError::AlreadyRunning);
        }
        self.stop.store(false, Ordering::SeqCst);

        let tx = Transmitter {
            writer: self.writer.clone(),
            engine: self.engine.clone(),
            sensors: self.sensors.clone(),
            period: self.config.transmit_period(),
            stop: self.stop.clone(),
            counters: self.counters.clone(),
        };
        let handle = spawn_worker("tx", move || tx.run())?;
        self.workers.push(handle);

        let rx = Receiver {
            reader: self.reader.clone(),
            reporter: self.reporter.clone(),
            period: self.config.receive_poll(),
            stop: self.stop.clone(),
            counters: self.counters.clone(),
        };
        match spawn_worker("rx", move || rx.run()) {
            Ok(handle) => self.workers.push(handle),
            Err(e) => {
                self.stop();
                return Err(e);
            }
        }

        info!(
            period_ms = self.config.transmit_period_ms,
            "telemetry streaming started"
        );
        Ok(())
    }

    /// Signal both workers and wait for them to finish.
    ///
    /// Returns once no worker can touch the link any more.
    pub fn stop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.stop.store(true, Ordering::SeqCst);
        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!(worker = %name, "telemetry worker panicked");
            }
        }

        let stats = self.counters.snapshot();
        info!(
            frames_sent = stats.frames_sent,
            write_errors = stats.write_errors,
            lines_received = stats.lines_received,
            read_errors = stats.read_errors,
            commands_sent = stats.commands_sent,
            "telemetry streaming stopped"
        );
    }
}

impl Drop for TelemetryBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_worker(
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|source| SimError::WorkerSpawn { name, source })
}

/// Sleep until `deadline + period` and return it. A late caller is not
/// made to catch up; the schedule restarts from now.
pub(crate) fn pace(deadline: Instant, period: Duration) -> Instant {
    let next = deadline + period;
    let now = Instant::now();
    if next > now {
        thread::sleep(next - now);
        next
    } else {
        now
    }
}

struct Transmitter {
    writer: SharedWriter,
    engine: SharedEngine,
    sensors: SensorVoltages,
    period: Duration,
    stop: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl Transmitter {
    fn run(self) {
        let mut next_frame = Instant::now();
        while !self.stop.load(Ordering::SeqCst) {
            let state = match self.engine.snapshot() {
                Ok(state) => state,
                Err(e) => {
                    error!("transmit loop stopping: {e}");
                    break;
                }
            };

            let frame = TelemetryFrame::sample(&state, &self.sensors);
            match write_line(&self.writer, &frame.to_line()) {
                Ok(()) => {
                    self.counters.frames_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.counters.write_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("telemetry write failed: {e}");
                }
            }

            next_frame = pace(next_frame, self.period);
        }
        debug!("transmit loop exited");
    }
}

struct Receiver {
    reader: SharedReader,
    reporter: Arc<dyn Reporter>,
    period: Duration,
    stop: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl Receiver {
    fn run(self) {
        // Only the first failure of a streak is a warning; a disconnected
        // device would otherwise log every poll.
        let mut failing = false;

        while !self.stop.load(Ordering::SeqCst) {
            let result = match self.reader.lock() {
                Ok(mut reader) => reader.poll_lines(),
                Err(_) => Err(io::Error::other("link reader lock poisoned")),
            };

            match result {
                Ok(lines) => {
                    if failing {
                        info!("link reads recovered");
                        failing = false;
                    }
                    for line in lines {
                        self.counters.lines_received.fetch_add(1, Ordering::Relaxed);
                        self.reporter.device_line(&line);
                    }
                }
                Err(e) => {
                    self.counters.read_errors.fetch_add(1, Ordering::Relaxed);
                    if failing {
                        debug!("link read failed: {e}");
                    } else {
                        warn!("link read failed: {e}");
                        failing = true;
                    }
                }
            }

            thread::sleep(self.period);
        }
        debug!("receive loop exited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pace_keeps_schedule() {
        let start = Instant::now();
        let period = Duration::from_millis(20);

        let next = pace(start, period);
        assert_eq!(next, start + period);
        assert!(Instant::now() >= next);

        let after = pace(next, period);
        assert!(after >= start + period * 2);
    }

    #[test]
    fn test_pace_restarts_after_overrun() {
        let period = Duration::from_millis(5);
        let Some(late) = Instant::now().checked_sub(Duration::from_millis(50)) else {
            return;
        };

        let before = Instant::now();
        let next = pace(late, period);
        assert!(next >= before, "late deadline must restart from now");
        assert!(next < before + period);
    }
}
