// Rig defaults: serial settings, handshake budget, timeouts
use std::time::Duration;

// Serial port for the Grbl motion controller
pub const MOTOR_PORT: &str = "/dev/ttyACM0";
pub const MOTOR_BAUDRATE: u32 = 115_200;

// Firmware banner must contain this marker for the handshake to succeed
pub const FIRMWARE_MARKER: &str = "Grbl 1.1f";

// Handshake: number of line reads to wait for the banner, each bounded by HANDSHAKE_READ_TIMEOUT
pub const HANDSHAKE_ATTEMPTS: u32 = 10;
pub const HANDSHAKE_READ_TIMEOUT: Duration = Duration::from_secs(1);

// Feedrate cap (units/s) applied during the handshake
pub const FEEDRATE_CAP: f64 = 500.0;

// Upper bound on waiting for `ok`/`error` after a command
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

// Parameter file read by the menu and the measurement commands
pub const PARAMS_FILE: &str = "params.json";

// Samples captured by the single measurement/background menu entries
pub const SINGLE_CAPTURE_SAMPLES: usize = 10_000;
