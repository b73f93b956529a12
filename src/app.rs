// Operator actions shared by the menu and the command line

use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::SINGLE_CAPTURE_SAMPLES;
use crate::datafile::{self, DataFileError};
use crate::params::{Params, ParamsError};
use crate::pattern::{PatternSample, Scale};
use crate::plot;
use crate::radio::{HackRfReceiver, HackRfTransmitter, Transmitter};
use crate::scan::{self, ScanError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Params(#[from] ParamsError),

    #[error(transparent)]
    DataFile(#[from] DataFileError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Where parameters come from, where data goes, and the last scan's results
pub struct Session {
    pub params_file: PathBuf,
    pub data_dir: PathBuf,
    last_run: Option<Vec<PatternSample>>,
}

impl Session {
    pub fn new(params_file: &Path, data_dir: &Path) -> Self {
        Self {
            params_file: params_file.to_path_buf(),
            data_dir: data_dir.to_path_buf(),
            last_run: None,
        }
    }

    fn params(&self) -> Result<Params> {
        Ok(Params::load(&self.params_file)?)
    }

    /// Full pattern measurement; results are kept for `plot_last_run`
    pub fn measure(&mut self) -> Result<&[PatternSample]> {
        let params = self.params()?;
        let samples = scan::run_measurement(&params, &self.data_dir)?;
        let samples = self.last_run.insert(samples);
        Ok(samples.as_slice())
    }

    /// One capture at the current position; RMS of the block
    pub fn single(&self, with_carrier: bool) -> Result<f64> {
        let params = self.params()?;
        let mut rx = HackRfReceiver::new(&params.rx_radio_id, params.rx_frequency());

        let rms = if with_carrier {
            let mut tx = HackRfTransmitter::new(&params.tx_radio_id, params.tx_frequency());
            scan::capture_single(
                Some(&mut tx as &mut dyn Transmitter),
                &mut rx,
                SINGLE_CAPTURE_SAMPLES,
            )?
        } else {
            scan::capture_single(None, &mut rx, SINGLE_CAPTURE_SAMPLES)?
        };
        info!("Single capture RMS {:.3e}", rms);
        Ok(rms)
    }

    pub fn last_run(&self) -> Option<&[PatternSample]> {
        self.last_run.as_deref()
    }

    /// `None` until a scan has completed in this session
    pub fn plot_last_run(&self, title: &str, scale: Scale) -> Option<String> {
        self.last_run().map(|samples| plot::render(samples, title, scale))
    }
}

pub fn plot_file(path: &Path, scale: Scale) -> Result<String> {
    let samples = datafile::read_pattern(path)?;
    Ok(plot::render(&samples, &path.display().to_string(), scale))
}

pub fn plot_files(first: &Path, second: &Path, scale: Scale) -> Result<String> {
    let a = datafile::read_pattern(first)?;
    let b = datafile::read_pattern(second)?;
    Ok(plot::render_comparison(
        (&a[..], &first.display().to_string()),
        (&b[..], &second.display().to_string()),
        scale,
    ))
}
