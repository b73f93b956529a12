// Measurement data files
//
// Layout:
//   line 1: free-form notes
//   line 2: column header (starts with '%')
//   rest:   mast,arm,background,transmission
//
// Every line is flushed as soon as it is written.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::pattern::PatternSample;

pub const HEADER: &str = "% Mast Angle, Arm Angle, Background RSSI, Transmission RSSI";

/// Notes and column header precede the rows
const HEADER_LINES: usize = 2;

/// Timestamp prefix of data file names, e.g. `17-Apr-2023_14-05-09`
pub const TIMESTAMP_FORMAT: &str = "%d-%b-%Y_%H-%M-%S";

#[derive(Debug, thiserror::Error)]
pub enum DataFileError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("Malformed row at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, DataFileError>;

/// File name for a run started now
pub fn timestamped_name(suffix: &str) -> String {
    format!("{}{}", chrono::Local::now().format(TIMESTAMP_FORMAT), suffix)
}

pub struct DataFileWriter<W: Write> {
    rows: csv::Writer<W>,
    path: String,
}

impl DataFileWriter<BufWriter<File>> {
    /// Create `<dir>/<timestamp><suffix>` and write the two header lines
    pub fn create(dir: &Path, suffix: &str, notes: &str) -> Result<Self> {
        let path: PathBuf = dir.join(timestamped_name(suffix));
        let file = File::create(&path).map_err(|source| DataFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!("Writing measurements to {}", path.display());
        Self::new(BufWriter::new(file), &path.display().to_string(), notes)
    }
}

impl<W: Write> DataFileWriter<W> {
    pub fn new(mut out: W, path: &str, notes: &str) -> Result<Self> {
        let io_err = |source| DataFileError::Io {
            path: path.to_string(),
            source,
        };

        // Notes must stay on line 1
        let notes = notes.replace(['\r', '\n'], " ");
        writeln!(out, "{}", notes)
            .and_then(|_| writeln!(out, "{}", HEADER))
            .and_then(|_| out.flush())
            .map_err(io_err)?;

        let rows = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(out);
        Ok(Self {
            rows,
            path: path.to_string(),
        })
    }

    pub fn append(&mut self, sample: &PatternSample) -> Result<()> {
        self.rows
            .serialize(sample)
            .map_err(|source| DataFileError::Csv {
                path: self.path.clone(),
                source,
            })?;
        self.rows.flush().map_err(|source| DataFileError::Io {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn into_inner(self) -> Result<W> {
        let path = self.path;
        self.rows.into_inner().map_err(|e| DataFileError::Io {
            path,
            source: io::Error::new(e.error().kind(), e.error().to_string()),
        })
    }
}

/// Read the samples of a data file
pub fn read_pattern(path: &Path) -> Result<Vec<PatternSample>> {
    let file = File::open(path).map_err(|source| DataFileError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_pattern(BufReader::new(file), &path.display().to_string())
}

/// Parse data file contents. The first two lines are headers; blank lines are skipped.
pub fn parse_pattern<R: BufRead>(mut reader: R, origin: &str) -> Result<Vec<PatternSample>> {
    let mut skipped = String::new();
    for _ in 0..HEADER_LINES {
        reader
            .read_line(&mut skipped)
            .map_err(|source| DataFileError::Io {
                path: origin.to_string(),
                source,
            })?;
    }

    let mut rows = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut samples = Vec::new();
    for record in rows.records() {
        let record = record.map_err(|e| read_error(e, origin))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record.position().map_or(0, |p| p.line() as usize) + HEADER_LINES;
        if record.len() != 4 {
            return Err(DataFileError::Malformed {
                line,
                reason: format!("expected 4 fields, found {}", record.len()),
            });
        }
        let sample: PatternSample = record
            .deserialize(None)
            .map_err(|e| DataFileError::Malformed {
                line,
                reason: e.to_string(),
            })?;
        samples.push(sample);
    }

    Ok(samples)
}

fn read_error(err: csv::Error, origin: &str) -> DataFileError {
    let line = err
        .position()
        .map_or(0, |p| p.line() as usize + HEADER_LINES);
    let reason = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(source) => DataFileError::Io {
            path: origin.to_string(),
            source,
        },
        _ => DataFileError::Malformed { line, reason },
    }
}
