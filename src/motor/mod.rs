// Motor control module for the antenna positioner
//
// Provides:
// - Grbl line protocol (responses, the G-code instructions the rig uses)
// - Serial transport seam with a `serialport` implementation
// - MotorController: handshake and blocking command/acknowledge

mod controller;
pub mod grbl;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use controller::{ControllerSettings, ControllerState, MotorController};
pub use grbl::{CommandOutcome, GCode, MotorError, Response};
pub use transport::{Connector, PortSettings, SerialConnector, SerialTransport, Transport};
