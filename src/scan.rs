// Pattern scan: step the mast, capture at each stop, record RSSI
//
// Ordering per position: move, wait for the mast to settle, capture, append.
// The transmitter runs for the whole sweep and is stopped even when the sweep fails.

use std::io::Write;
use std::path::Path;
use std::thread::sleep;
use tracing::{info, warn};

use crate::datafile::{DataFileError, DataFileWriter};
use crate::motor::{CommandOutcome, Connector, GCode, MotorController, MotorError};
use crate::params::{Params, ParamsError};
use crate::pattern::PatternSample;
use crate::radio::{self, HackRfReceiver, HackRfTransmitter, RadioError, Receiver, Transmitter};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Motor error: {0}")]
    Motor(#[from] MotorError),

    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),

    #[error("Data file error: {0}")]
    DataFile(#[from] DataFileError),

    #[error("Parameter error: {0}")]
    Params(#[from] ParamsError),

    #[error("Motor controller not responding, verify connections")]
    HandshakeFailed,

    #[error("Motor controller rejected '{command}': {reason}")]
    Rejected { command: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// `steps` evenly spaced values from `start` to `end` inclusive
pub fn linspace(start: f64, end: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let last = (steps - 1) as f64;
            (0..steps)
                .map(|i| {
                    if i == steps - 1 {
                        end
                    } else {
                        start + (end - start) * i as f64 / last
                    }
                })
                .collect()
        }
    }
}

/// Send a command and treat a firmware rejection as a scan failure
fn send_checked<C: Connector>(motor: &mut MotorController<C>, code: GCode) -> Result<()> {
    match motor.send(code)? {
        CommandOutcome::Accepted => Ok(()),
        CommandOutcome::Rejected(reason) => Err(ScanError::Rejected {
            command: code.to_string(),
            reason,
        }),
    }
}

/// Millimetre units, absolute positioning
pub fn prepare_motor<C: Connector>(motor: &mut MotorController<C>) -> Result<()> {
    send_checked(motor, GCode::Millimeters)?;
    send_checked(motor, GCode::AbsolutePositioning)
}

/// Connect to the controller named in `params` and put it in absolute millimetre mode
pub fn init_motor(params: &Params) -> Result<MotorController> {
    let mut motor = MotorController::new(&params.usb_port, params.baudrate)
        .with_settings(params.controller_settings());
    if !motor.connect()? {
        return Err(ScanError::HandshakeFailed);
    }
    info!("Motor controller fully connected");
    prepare_motor(&mut motor)?;
    Ok(motor)
}

/// Run the full sweep against an already prepared controller
pub fn run_scan<C: Connector, W: Write>(
    motor: &mut MotorController<C>,
    tx: &mut dyn Transmitter,
    rx: &mut dyn Receiver,
    datafile: &mut DataFileWriter<W>,
    params: &Params,
) -> Result<Vec<PatternSample>> {
    tx.start()?;
    let result = sweep(motor, &mut *tx, rx, datafile, params);
    let stopped = tx.stop();

    let samples = result?;
    stopped?;
    info!("Scan completed: {} positions", samples.len());
    Ok(samples)
}

fn sweep<C: Connector, W: Write>(
    motor: &mut MotorController<C>,
    tx: &mut dyn Transmitter,
    rx: &mut dyn Receiver,
    datafile: &mut DataFileWriter<W>,
    params: &Params,
) -> Result<Vec<PatternSample>> {
    let mast_angles = linspace(params.mast_start_angle, params.mast_end_angle, params.mast_steps);
    let arm_angles = linspace(params.arm_start_angle, params.arm_end_angle, params.arm_steps);
    let mut samples = Vec::with_capacity(mast_angles.len() * arm_angles.len());

    // Transmitter start-up latency
    sleep(params.tx_latency());
    tx.check()?;

    for &mast_angle in &mast_angles {
        // The arm has no drive; its angle is recorded as configured
        for &arm_angle in &arm_angles {
            info!("Target mast angle: {}", mast_angle);
            send_checked(
                motor,
                GCode::MastMove {
                    position: mast_angle * params.mast_units_per_degree,
                    feedrate: params.move_feedrate,
                },
            )?;
            sleep(params.settle_time());

            tx.check()?;
            let data = rx.capture(params.rx_samples)?;
            let transmission_rssi = radio::rms(&data);
            info!(
                "Read {} samples, transmission RSSI {:.3e}",
                data.len(),
                transmission_rssi
            );

            let sample = PatternSample {
                mast_angle,
                arm_angle,
                background_rssi: 0.0,
                transmission_rssi,
            };
            datafile.append(&sample)?;
            samples.push(sample);
        }
    }

    Ok(samples)
}

/// Connect to the rig described by `params`, scan, and write `<dir>/<timestamp><filename>`
pub fn run_measurement(params: &Params, dir: &Path) -> Result<Vec<PatternSample>> {
    let mut motor = init_motor(params)?;
    let mut datafile = DataFileWriter::create(dir, &params.filename, &params.notes)?;
    let mut tx = HackRfTransmitter::new(&params.tx_radio_id, params.tx_frequency());
    let mut rx = HackRfReceiver::new(&params.rx_radio_id, params.rx_frequency());

    let result = run_scan(&mut motor, &mut tx, &mut rx, &mut datafile, params);
    if let Err(e) = &result {
        warn!("Scan stopped early, partial data kept in {}: {}", datafile.path(), e);
    }
    motor.disconnect();
    result
}

/// Capture one block of samples, with or without the carrier, and return its RMS
pub fn capture_single(
    tx: Option<&mut dyn Transmitter>,
    rx: &mut dyn Receiver,
    samples: usize,
) -> Result<f64> {
    let data = match tx {
        Some(tx) => {
            tx.start()?;
            let captured = tx.check().and_then(|_| rx.capture(samples));
            tx.stop()?;
            captured?
        }
        None => rx.capture(samples)?,
    };
    Ok(radio::rms(&data))
}
