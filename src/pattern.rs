// Pattern samples and their normalisation for display

use serde::{Deserialize, Serialize};

/// Floor for normalised levels, in dB below the peak
pub const DB_FLOOR: f64 = -40.0;

/// One rig position and the signal levels measured there
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PatternSample {
    pub mast_angle: f64,
    pub arm_angle: f64,
    pub background_rssi: f64,
    pub transmission_rssi: f64,
}

/// How levels are shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// Raw RSSI
    Linear,
    /// 20·log10(rssi / peak), floored at `DB_FLOOR`
    Decibel,
}

/// Transmission RSSI of each sample on the requested scale
pub fn levels(samples: &[PatternSample], scale: Scale) -> Vec<f64> {
    let rssi = samples.iter().map(|s| s.transmission_rssi);
    match scale {
        Scale::Linear => rssi.collect(),
        Scale::Decibel => {
            let peak = samples
                .iter()
                .map(|s| s.transmission_rssi)
                .fold(0.0_f64, f64::max);
            rssi.map(|r| to_db(r, peak)).collect()
        }
    }
}

fn to_db(rssi: f64, peak: f64) -> f64 {
    if peak <= 0.0 || rssi <= 0.0 {
        return DB_FLOOR;
    }
    (20.0 * (rssi / peak).log10()).max(DB_FLOOR)
}
