// Serial transport seam
//
// `Connector` opens a `Transport`; the controller only talks to these traits so
// the protocol can run against a real port or a scripted one.

use serialport::{self, ClearBuffer, SerialPort};
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::trace;

use super::grbl::{MotorError, Result};
use crate::config::HANDSHAKE_READ_TIMEOUT;

/// Where and how to open the controller's port
#[derive(Debug, Clone, PartialEq)]
pub struct PortSettings {
    pub path: String,
    pub baudrate: u32,
    pub read_timeout: Duration,
}

impl PortSettings {
    pub fn new(path: &str, baudrate: u32) -> Self {
        Self {
            path: path.to_string(),
            baudrate,
            read_timeout: HANDSHAKE_READ_TIMEOUT,
        }
    }
}

/// Line-oriented duplex channel to the controller
pub trait Transport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read up to and including the next '\n'.
    ///
    /// On timeout returns whatever arrived so far, possibly an empty string.
    fn read_line(&mut self, timeout: Duration) -> Result<String>;

    /// Discard unread input and unsent output
    fn reset_buffers(&mut self) -> Result<()>;

    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Opens transports; open failures surface as errors
pub trait Connector {
    type Transport: Transport;

    fn open(&mut self, settings: &PortSettings) -> Result<Self::Transport>;
}

/// Opens OS serial ports with DTR held low
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    type Transport = SerialTransport;

    fn open(&mut self, settings: &PortSettings) -> Result<SerialTransport> {
        // Toggling DTR resets Arduino-based controllers, so keep it deasserted
        let port = serialport::new(&settings.path, settings.baudrate)
            .timeout(settings.read_timeout)
            .dtr_on_open(false)
            .open()?;

        Ok(SerialTransport::new(port))
    }
}

/// A `serialport` handle plus the bytes read past the last newline
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    pending: Vec<u8>,
}

impl SerialTransport {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self {
            port: Some(port),
            pending: Vec::new(),
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(MotorError::NotConnected)?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 256];

        loop {
            if let Some(line) = self.take_line() {
                return Ok(line);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let port = self.port.as_mut().ok_or(MotorError::NotConnected)?;
            port.set_timeout(remaining)?;
            match port.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    trace!("Read {} bytes from serial", n);
                    self.pending.extend_from_slice(&chunk[..n]);
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(MotorError::Io(e)),
            }
        }

        // Timed out: hand back the partial line
        let partial: Vec<u8> = self.pending.drain(..).collect();
        Ok(String::from_utf8_lossy(&partial).into_owned())
    }

    fn reset_buffers(&mut self) -> Result<()> {
        self.pending.clear();
        let port = self.port.as_mut().ok_or(MotorError::NotConnected)?;
        port.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn close(&mut self) {
        // Dropping the handle closes the OS port
        self.port = None;
        self.pending.clear();
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}
