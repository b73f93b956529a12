// HackRF radios driven through the `hackrf_transfer` command line tool
//
// TX: `hackrf_transfer -c <amplitude>` emits an unmodulated carrier until killed.
// RX: `hackrf_transfer -r - -n <count>` writes interleaved signed 8-bit I/Q to stdout.

use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use tracing::{debug, info, warn};

use super::{RadioError, Receiver, Result, Transmitter};

pub const HACKRF_TRANSFER: &str = "hackrf_transfer";

/// Default sample rate (Hz)
pub const DEFAULT_SAMPLE_RATE: f64 = 2e6;

/// CW amplitude (DC value fed to the DAC, 0-127)
pub const CW_AMPLITUDE: u8 = 127;

// Gains in dB
pub const DEFAULT_TX_VGA_GAIN: u32 = 20;
pub const DEFAULT_RX_LNA_GAIN: u32 = 16;
pub const DEFAULT_RX_VGA_GAIN: u32 = 20;

fn device_args(args: &mut Vec<String>, serial: &str) {
    if !serial.is_empty() {
        args.push("-d".to_string());
        args.push(serial.to_string());
    }
}

/// Carrier source on a HackRF
pub struct HackRfTransmitter {
    pub program: PathBuf,
    pub serial: String,
    pub frequency: f64,
    pub sample_rate: f64,
    pub vga_gain: u32,
    child: Option<Child>,
}

impl HackRfTransmitter {
    pub fn new(serial: &str, frequency: f64) -> Self {
        Self {
            program: PathBuf::from(HACKRF_TRANSFER),
            serial: serial.to_string(),
            frequency,
            sample_rate: DEFAULT_SAMPLE_RATE,
            vga_gain: DEFAULT_TX_VGA_GAIN,
            child: None,
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        device_args(&mut args, &self.serial);
        args.extend([
            "-f".to_string(),
            format!("{:.0}", self.frequency),
            "-s".to_string(),
            format!("{:.0}", self.sample_rate),
            "-x".to_string(),
            self.vga_gain.to_string(),
            "-c".to_string(),
            CW_AMPLITUDE.to_string(),
        ]);
        args
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    fn exited(&self, status: ExitStatus) -> RadioError {
        warn!("Transmitter exited unexpectedly with {}", status);
        RadioError::ToolFailed {
            program: self.program.display().to_string(),
            status,
            stderr: "carrier stopped before it was switched off".to_string(),
        }
    }
}

impl Transmitter for HackRfTransmitter {
    fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }
        info!("Starting transmitter at {:.0} Hz", self.frequency);
        let child = Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| RadioError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;
        self.child = Some(child);
        Ok(())
    }

    fn check(&mut self) -> Result<()> {
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        match child.try_wait()? {
            None => Ok(()),
            Some(status) => {
                self.child = None;
                Err(self.exited(status))
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        info!("Stopping transmitter");
        // The tool only ends on its own when it failed
        if let Some(status) = child.try_wait()? {
            return Err(self.exited(status));
        }
        if let Err(e) = child.kill() {
            if e.kind() != std::io::ErrorKind::InvalidInput {
                return Err(RadioError::Io(e));
            }
        }
        child.wait()?;
        Ok(())
    }
}

impl Drop for HackRfTransmitter {
    fn drop(&mut self) {
        // Never leave a carrier running
        if let Err(e) = self.stop() {
            warn!("Failed to stop transmitter on drop: {}", e);
        }
    }
}

/// Sample capture on a HackRF
pub struct HackRfReceiver {
    pub program: PathBuf,
    pub serial: String,
    pub frequency: f64,
    pub sample_rate: f64,
    pub lna_gain: u32,
    pub vga_gain: u32,
}

impl HackRfReceiver {
    pub fn new(serial: &str, frequency: f64) -> Self {
        Self {
            program: PathBuf::from(HACKRF_TRANSFER),
            serial: serial.to_string(),
            frequency,
            sample_rate: DEFAULT_SAMPLE_RATE,
            lna_gain: DEFAULT_RX_LNA_GAIN,
            vga_gain: DEFAULT_RX_VGA_GAIN,
        }
    }

    fn args(&self, samples: usize) -> Vec<String> {
        let mut args = Vec::new();
        device_args(&mut args, &self.serial);
        args.extend([
            "-f".to_string(),
            format!("{:.0}", self.frequency),
            "-s".to_string(),
            format!("{:.0}", self.sample_rate),
            "-l".to_string(),
            self.lna_gain.to_string(),
            "-g".to_string(),
            self.vga_gain.to_string(),
            "-n".to_string(),
            samples.to_string(),
            "-r".to_string(),
            "-".to_string(),
        ]);
        args
    }
}

impl Receiver for HackRfReceiver {
    fn capture(&mut self, samples: usize) -> Result<Vec<f32>> {
        debug!("Capturing {} samples at {:.0} Hz", samples, self.frequency);
        let output = Command::new(&self.program)
            .args(self.args(samples))
            .stdin(Stdio::null())
            .output()
            .map_err(|source| RadioError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(RadioError::ToolFailed {
                program: self.program.display().to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let magnitudes = iq_magnitudes(&output.stdout);
        if magnitudes.is_empty() {
            return Err(RadioError::EmptyCapture);
        }
        debug!("Read {} samples", magnitudes.len());
        Ok(magnitudes)
    }
}

/// Interleaved signed 8-bit I/Q to magnitudes normalised to full scale.
/// A trailing odd byte is dropped.
pub fn iq_magnitudes(raw: &[u8]) -> Vec<f32> {
    raw.chunks_exact(2)
        .map(|pair| {
            let i = pair[0] as i8 as f32 / 128.0;
            let q = pair[1] as i8 as f32 / 128.0;
            (i * i + q * q).sqrt()
        })
        .collect()
}
