// Radio collaborators for the measurement
//
// The rig needs two things from its SDRs: a carrier that can be switched on
// and off, and a block of received samples at each position. Signal
// processing beyond that lives in the external tools.

pub mod hackrf;

pub use hackrf::{HackRfReceiver, HackRfTransmitter};

#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{program} exited with {status}: {stderr}")]
    ToolFailed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("Receiver returned no samples")]
    EmptyCapture,
}

pub type Result<T> = std::result::Result<T, RadioError>;

/// Continuous-wave source
pub trait Transmitter {
    fn start(&mut self) -> Result<()>;

    /// Fails if the carrier has died since `start`
    fn check(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()>;
}

/// Captures sample magnitudes
pub trait Receiver {
    fn capture(&mut self, samples: usize) -> Result<Vec<f32>>;
}

/// Root-mean-square of a sample vector (RSSI). Empty input gives 0.
pub fn rms(data: &[f32]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let sum: f64 = data.iter().map(|&x| (x as f64) * (x as f64)).sum();
    (sum / data.len() as f64).sqrt()
}
