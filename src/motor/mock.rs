// Scripted transport for protocol tests
//
// Lines queued with `banner` are readable right after open. Each `reply` batch
// becomes readable after the next write, mimicking a controller that answers
// only once it has seen a command.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::grbl::{MotorError, Result};
use super::transport::{Connector, PortSettings, Transport};

#[derive(Debug, Default)]
pub struct MockState {
    pub incoming: VecDeque<String>,
    pub replies: VecDeque<Vec<String>>,
    pub written: Vec<String>,
    pub opened_with: Vec<PortSettings>,
    pub reads: usize,
    pub resets: usize,
    pub open: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    pub state: Arc<Mutex<MockState>>,
    pub fail_open: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Controller that answers the handshake correctly
    pub fn grbl() -> Self {
        Self::new()
            .banner(&["\r\n", "Grbl 1.1f ['$' for help]\r\n"])
            .reply(&["ok\r\n"])
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn banner(self, lines: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.incoming.extend(lines.iter().map(|l| l.to_string()));
        }
        self
    }

    pub fn reply(self, lines: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state
                .replies
                .push_back(lines.iter().map(|l| l.to_string()).collect());
        }
        self
    }

    pub fn written(&self) -> Vec<String> {
        self.state.lock().unwrap().written.clone()
    }

    pub fn reads(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn open(&mut self, settings: &PortSettings) -> Result<MockTransport> {
        if self.fail_open {
            return Err(MotorError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", settings.path),
            )));
        }
        let mut state = self.state.lock().unwrap();
        state.opened_with.push(settings.clone());
        state.open = true;
        Ok(MockTransport {
            state: Arc::clone(&self.state),
        })
    }
}

pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Transport for MockTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .written
            .push(String::from_utf8_lossy(bytes).into_owned());
        if let Some(batch) = state.replies.pop_front() {
            state.incoming.extend(batch);
        }
        Ok(())
    }

    fn read_line(&mut self, _timeout: Duration) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        Ok(state.incoming.pop_front().unwrap_or_default())
    }

    fn reset_buffers(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.incoming.clear();
        state.resets += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().unwrap().open = false;
    }

    fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }
}
