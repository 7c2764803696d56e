#![allow(dead_code)]

use enginesim_core::engine::EngineState;
use enginesim_core::link::SerialLink;
use enginesim_core::report::{Reporter, Status};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct MockState {
    written: Vec<u8>,
    incoming: VecDeque<u8>,
    fail_writes: bool,
    failing_reads: usize,
    echo_commands: bool,
}

/// In-memory link; clones share the same buffers like a real cloned port
#[derive(Clone, Default)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every non-telemetry line with `ok <line>`
    pub fn echoing() -> Self {
        let link = Self::new();
        link.state.lock().unwrap().echo_commands = true;
        link
    }

    pub fn push_incoming(&self, bytes: &[u8]) {
        self.state.lock().unwrap().incoming.extend(bytes);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    /// Make the next `count` availability checks fail
    pub fn fail_next_reads(&self, count: usize) {
        self.state.lock().unwrap().failing_reads = count;
    }

    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().unwrap().written).to_string()
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.written().lines().map(str::to_string).collect()
    }

    pub fn boxed(&self) -> Box<dyn SerialLink> {
        Box::new(self.clone())
    }
}

impl Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.incoming.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(state.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(state.incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable unplugged"));
        }
        state.written.extend_from_slice(buf);
        if state.echo_commands && !buf.starts_with(b"tps_raw") {
            state.incoming.extend(b"ok ");
            state.incoming.extend(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialLink for MockLink {
    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let mut state = self.state.lock().unwrap();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device gone"));
        }
        Ok(state.incoming.len() as u32)
    }

    fn try_clone(&self) -> io::Result<Box<dyn SerialLink>> {
        Ok(Box::new(self.clone()))
    }
}

/// Reporter that records everything it is given
#[derive(Default)]
pub struct MemoryReporter {
    pub states: Mutex<Vec<EngineState>>,
    pub device_lines: Mutex<Vec<String>>,
    pub commands: Mutex<Vec<String>>,
}

impl MemoryReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn device_lines(&self) -> Vec<String> {
        self.device_lines.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl Reporter for MemoryReporter {
    fn status(&self, status: &Status) {
        self.states.lock().unwrap().push(status.state);
    }

    fn device_line(&self, line: &str) {
        self.device_lines.lock().unwrap().push(line.to_string());
    }

    fn command_sent(&self, command: &str) {
        self.commands.lock().unwrap().push(command.to_string());
    }
}

/// Poll `cond` until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
