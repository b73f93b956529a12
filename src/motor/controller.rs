// Grbl motion controller: connect handshake and blocking command/acknowledge
//
// One command is in flight at a time; each is written, then lines are read
// until the controller answers `ok` or `error...`.

use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::grbl::{CommandOutcome, GCode, MotorError, Response, Result};
use super::transport::{Connector, PortSettings, SerialConnector, Transport};
use crate::config::{
    COMMAND_TIMEOUT, FEEDRATE_CAP, FIRMWARE_MARKER, HANDSHAKE_ATTEMPTS, HANDSHAKE_READ_TIMEOUT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Disconnected,
    Handshaking,
    Ready,
}

/// Handshake and acknowledgment tuning
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    /// Substring the startup banner must contain
    pub firmware_marker: String,
    pub handshake_attempts: u32,
    /// Bound on each handshake line read
    pub read_timeout: Duration,
    /// Feedrate sent as part of the handshake
    pub feedrate_cap: f64,
    /// Bound on the whole wait for `ok`/`error` after a command
    pub command_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            firmware_marker: FIRMWARE_MARKER.to_string(),
            handshake_attempts: HANDSHAKE_ATTEMPTS,
            read_timeout: HANDSHAKE_READ_TIMEOUT,
            feedrate_cap: FEEDRATE_CAP,
            command_timeout: COMMAND_TIMEOUT,
        }
    }
}

/// Serial-attached motion controller
pub struct MotorController<C: Connector = SerialConnector> {
    connector: C,
    port: PortSettings,
    settings: ControllerSettings,
    transport: Option<C::Transport>,
    state: ControllerState,
}

impl MotorController<SerialConnector> {
    /// Controller for the serial device at `device`. Nothing is opened until `connect`.
    pub fn new(device: &str, baudrate: u32) -> Self {
        Self::with_connector(SerialConnector, PortSettings::new(device, baudrate))
    }
}

impl<C: Connector> MotorController<C> {
    pub fn with_connector(connector: C, port: PortSettings) -> Self {
        Self {
            connector,
            port,
            settings: ControllerSettings::default(),
            transport: None,
            state: ControllerState::Disconnected,
        }
    }

    pub fn with_settings(mut self, settings: ControllerSettings) -> Self {
        self.port.read_timeout = settings.read_timeout;
        self.settings = settings;
        self
    }

    /// Open the port and run the handshake
    ///
    /// Returns `Ok(false)` when the controller is reachable but the banner is
    /// missing or wrong, or the feedrate command is not acknowledged. The port
    /// is closed again in that case. Failing to open the port is an error.
    pub fn connect(&mut self) -> Result<bool> {
        self.disconnect();

        info!(
            "Connecting to motor controller on {} @ {} baud",
            self.port.path, self.port.baudrate
        );
        let transport = self.connector.open(&self.port).map_err(|e| {
            error!(
                "Failed to connect to motor controller on {}, check the port settings: {}",
                self.port.path, e
            );
            e
        })?;
        self.transport = Some(transport);
        self.state = ControllerState::Handshaking;

        match self.handshake() {
            Ok(true) => {
                self.state = ControllerState::Ready;
                info!("Motor controller ready");
                Ok(true)
            }
            Ok(false) => {
                self.disconnect();
                Ok(false)
            }
            Err(e) => {
                self.disconnect();
                Err(e)
            }
        }
    }

    fn handshake(&mut self) -> Result<bool> {
        let transport = self.transport.as_mut().ok_or(MotorError::NotConnected)?;
        let settings = &self.settings;

        // The banner arrives some time after open; poll for it
        let mut banner = String::new();
        for attempt in 1..=settings.handshake_attempts {
            let line = transport.read_line(settings.read_timeout)?;
            if !line.trim().is_empty() {
                banner = line;
                break;
            }
            debug!(
                "No banner yet (attempt {}/{})",
                attempt, settings.handshake_attempts
            );
        }
        info!("Connect response: {}", banner.trim());

        if banner.trim().is_empty() {
            warn!(
                "Motor controller sent no banner after {} attempts",
                settings.handshake_attempts
            );
            return Ok(false);
        }
        if !banner.contains(&settings.firmware_marker) {
            warn!(
                "Unexpected firmware banner {:?}, expected {:?}",
                banner.trim(),
                settings.firmware_marker
            );
            return Ok(false);
        }

        let feedrate = GCode::SetFeedrate(settings.feedrate_cap).to_string();
        debug!("TX: {}", feedrate);
        transport.write_all(format!("{}\n", feedrate).as_bytes())?;
        let response = transport.read_line(settings.read_timeout)?;
        info!("Set feedrate response: {}", response.trim());

        if !response.starts_with("ok") {
            warn!("Feedrate command not acknowledged");
            return Ok(false);
        }

        // Drop anything queued during the handshake
        transport.reset_buffers()?;
        Ok(true)
    }

    /// Close the port. Safe to call when already disconnected.
    pub fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
            info!("Disconnected from motor controller on {}", self.port.path);
        }
        self.state = ControllerState::Disconnected;
    }

    pub fn is_connected(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_open())
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Send one command line and block until the controller answers it
    ///
    /// `ok` yields `Accepted`; an `error...` line yields `Rejected` and is
    /// logged. Unrelated lines are skipped. Gives up with `MotorError::Timeout`
    /// once `command_timeout` has elapsed, and drops the connection: a late
    /// answer would otherwise be taken for the answer to the next command.
    pub fn send_command(&mut self, command: &str) -> Result<CommandOutcome> {
        let result = self.exchange(command);
        if let Err(MotorError::Timeout { .. }) = &result {
            self.disconnect();
        }
        result
    }

    fn exchange(&mut self, command: &str) -> Result<CommandOutcome> {
        if self.state != ControllerState::Ready {
            return Err(MotorError::NotConnected);
        }
        let transport = self.transport.as_mut().ok_or(MotorError::NotConnected)?;
        let timeout = self.settings.command_timeout;

        debug!("TX: {}", command);
        transport.write_all(format!("{}\n", command).as_bytes())?;

        let started = Instant::now();
        loop {
            let waited = started.elapsed();
            if waited >= timeout {
                warn!("No response to '{}' after {:?}", command, waited);
                return Err(MotorError::Timeout {
                    command: command.to_string(),
                    waited,
                });
            }

            // A single read over the whole remaining wait keeps partial lines intact
            let line = transport.read_line(timeout - waited)?;
            match Response::parse(&line) {
                Some(Response::Ok) => {
                    debug!("RX: ok");
                    return Ok(CommandOutcome::Accepted);
                }
                Some(Response::Error(reason)) => {
                    warn!("Motor controller rejected '{}': {}", command, reason);
                    return Ok(CommandOutcome::Rejected(reason));
                }
                Some(Response::Other(text)) => debug!("RX (ignored): {}", text),
                None => {}
            }
        }
    }

    /// Send a typed instruction
    pub fn send(&mut self, code: GCode) -> Result<CommandOutcome> {
        self.send_command(&code.to_string())
    }
}

impl<C: Connector> Drop for MotorController<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use crate::motor::SerialTransport;
    use crate::motor::mock::MockConnector;
    use tracing_test::traced_test;

    fn controller(connector: &MockConnector) -> MotorController<MockConnector> {
        MotorController::with_connector(
            connector.clone(),
            PortSettings::new("/dev/ttyMOCK", 115_200),
        )
    }

    fn ready(connector: &MockConnector) -> MotorController<MockConnector> {
        let mut motor = controller(connector);
        assert!(motor.connect().unwrap());
        motor
    }

    #[test]
    fn test_open_failure_propagates() {
        let connector = MockConnector::failing();
        let mut motor = controller(&connector);

        assert!(matches!(motor.connect(), Err(MotorError::Io(_))));
        assert!(!motor.is_connected());
        assert_eq!(motor.state(), ControllerState::Disconnected);
    }

    #[test]
    fn test_missing_serial_device_fails_to_open() {
        let mut motor = MotorController::new("/dev/antenna-rig-does-not-exist", 115_200);

        assert!(motor.connect().is_err());
        assert!(!motor.is_connected());
    }

    #[test]
    fn test_no_banner_exhausts_retries() {
        let connector = MockConnector::new();
        let mut motor = controller(&connector);

        assert!(!motor.connect().unwrap());
        assert_eq!(connector.reads(), HANDSHAKE_ATTEMPTS as usize);
        // Nothing is sent to a controller that never identified itself
        assert!(connector.written().is_empty());
        assert!(!motor.is_connected());
        assert!(!connector.is_open());
    }

    #[test]
    fn test_banner_on_last_attempt_is_accepted() {
        let blanks = vec!["\r\n"; HANDSHAKE_ATTEMPTS as usize - 1];
        let connector = MockConnector::new()
            .banner(&blanks)
            .banner(&["Grbl 1.1f ['$' for help]\r\n"])
            .reply(&["ok\r\n"]);
        let mut motor = controller(&connector);

        assert!(motor.connect().unwrap());
    }

    #[test]
    fn test_wrong_firmware_is_rejected() {
        let connector = MockConnector::new()
            .banner(&["Grbl 0.9j ['$' for help]\r\n"])
            .reply(&["ok\r\n"]);
        let mut motor = controller(&connector);

        assert!(!motor.connect().unwrap());
        assert!(!motor.is_connected());
    }

    #[test]
    fn test_feedrate_not_acknowledged() {
        let connector = MockConnector::new()
            .banner(&["Grbl 1.1f ['$' for help]\r\n"])
            .reply(&["error:22\r\n"]);
        let mut motor = controller(&connector);

        assert!(!motor.connect().unwrap());
        assert_eq!(connector.written(), vec!["G1 F500\n"]);
        assert!(!motor.is_connected());
        assert_eq!(motor.state(), ControllerState::Disconnected);
    }

    #[test]
    fn test_successful_handshake() {
        let connector = MockConnector::grbl();
        let mut motor = controller(&connector);

        assert!(motor.connect().unwrap());
        assert!(motor.is_connected());
        assert_eq!(motor.state(), ControllerState::Ready);
        assert_eq!(connector.written(), vec!["G1 F500\n"]);
        assert_eq!(connector.state.lock().unwrap().resets, 1);
    }

    #[test]
    fn test_handshake_uses_configured_read_timeout() {
        let connector = MockConnector::grbl();
        let mut motor = controller(&connector).with_settings(ControllerSettings {
            read_timeout: Duration::from_millis(250),
            ..ControllerSettings::default()
        });

        assert!(motor.connect().unwrap());
        let opened = connector.state.lock().unwrap().opened_with.clone();
        assert_eq!(opened[0].read_timeout, Duration::from_millis(250));
        assert_eq!(opened[0].baudrate, 115_200);
    }

    #[test]
    fn test_send_command_ok() {
        let connector = MockConnector::grbl().reply(&["ok\r\n"]);
        let mut motor = ready(&connector);

        let outcome = motor.send_command("G21").unwrap();
        assert_eq!(outcome, CommandOutcome::Accepted);
        assert_eq!(connector.written().last().unwrap(), "G21\n");
    }

    #[test]
    #[traced_test]
    fn test_send_command_error_is_reported() {
        let connector = MockConnector::grbl().reply(&["error: out of range\r\n"]);
        let mut motor = ready(&connector);

        let outcome = motor.send_command("G1 Y999 F0.01").unwrap();
        assert_eq!(
            outcome,
            CommandOutcome::Rejected("error: out of range".to_string())
        );
        assert!(logs_contain("error: out of range"));
        // Still usable afterwards
        assert!(motor.is_connected());
    }

    #[test]
    fn test_send_command_skips_chatter() {
        let connector = MockConnector::grbl().reply(&[
            "[MSG:Pgm End]\r\n",
            "\r\n",
            "<Idle|MPos:0.000,0.000,0.000|FS:0,0>\r\n",
            "ok\r\n",
        ]);
        let mut motor = ready(&connector);

        assert!(motor.send(GCode::AbsolutePositioning).unwrap().is_accepted());
        assert_eq!(connector.written().last().unwrap(), "G90\n");
    }

    #[test]
    fn test_send_command_times_out() {
        let connector = MockConnector::grbl();
        let mut motor = controller(&connector).with_settings(ControllerSettings {
            command_timeout: Duration::from_millis(20),
            ..ControllerSettings::default()
        });
        assert!(motor.connect().unwrap());

        match motor.send_command("G21") {
            Err(MotorError::Timeout { command, waited }) => {
                assert_eq!(command, "G21");
                assert!(waited >= Duration::from_millis(20));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        // A late `ok` must not answer the next command
        assert!(!motor.is_connected());
        assert_eq!(motor.state(), ControllerState::Disconnected);
        assert!(matches!(
            motor.send_command("G90"),
            Err(MotorError::NotConnected)
        ));
        assert_eq!(connector.written().last().unwrap(), "G21\n");
    }

    #[cfg(unix)]
    struct PtyConnector(Option<serialport::TTYPort>);

    #[cfg(unix)]
    impl Connector for PtyConnector {
        type Transport = SerialTransport;

        fn open(&mut self, _settings: &PortSettings) -> Result<SerialTransport> {
            let port = self.0.take().ok_or(MotorError::NotConnected)?;
            Ok(SerialTransport::new(Box::new(port)))
        }
    }

    #[cfg(unix)]
    fn wait_for(port: &mut serialport::TTYPort, needle: &str) {
        use std::io::Read;

        let mut seen = String::new();
        let mut chunk = [0u8; 64];
        while !seen.contains(needle) {
            let n = port.read(&mut chunk).unwrap();
            seen.push_str(&String::from_utf8_lossy(&chunk[..n]));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_ok_split_across_reads_is_accepted() {
        use serialport::SerialPort;
        use std::io::Write;

        let (mut rig, port) = serialport::TTYPort::pair().unwrap();
        rig.set_timeout(Duration::from_secs(5)).unwrap();
        rig.write_all(b"Grbl 1.1f ['$' for help]\n").unwrap();

        let firmware = std::thread::spawn(move || {
            wait_for(&mut rig, "G1 F500");
            rig.write_all(b"ok\n").unwrap();
            wait_for(&mut rig, "G21");
            // The acknowledgment arrives in two pieces, further apart than one handshake read
            std::thread::sleep(Duration::from_millis(50));
            rig.write_all(b"o").unwrap();
            rig.flush().unwrap();
            std::thread::sleep(Duration::from_millis(400));
            rig.write_all(b"k\n").unwrap();
            rig
        });

        let mut motor = MotorController::with_connector(
            PtyConnector(Some(port)),
            PortSettings::new("/dev/ptmx", 115_200),
        )
        .with_settings(ControllerSettings {
            read_timeout: Duration::from_millis(200),
            command_timeout: Duration::from_secs(3),
            ..ControllerSettings::default()
        });

        assert!(motor.connect().unwrap());
        assert_eq!(motor.send_command("G21").unwrap(), CommandOutcome::Accepted);
        assert!(motor.is_connected());
        firmware.join().unwrap();
    }

    #[test]
    fn test_send_without_connect_is_rejected() {
        let connector = MockConnector::new().reply(&["ok\r\n"]);
        let mut motor = controller(&connector);

        for _ in 0..3 {
            assert!(matches!(
                motor.send_command("G21"),
                Err(MotorError::NotConnected)
            ));
        }
        assert!(connector.written().is_empty());
        assert_eq!(connector.reads(), 0);
    }

    #[test]
    fn test_send_after_failed_handshake_is_rejected() {
        let connector = MockConnector::new();
        let mut motor = controller(&connector);
        assert!(!motor.connect().unwrap());

        assert!(matches!(
            motor.send_command("G21"),
            Err(MotorError::NotConnected)
        ));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let connector = MockConnector::grbl();
        let mut motor = ready(&connector);

        motor.disconnect();
        assert!(!motor.is_connected());
        motor.disconnect();
        assert!(!motor.is_connected());
        assert!(!connector.is_open());
        assert!(matches!(
            motor.send_command("G21"),
            Err(MotorError::NotConnected)
        ));
    }

    #[test]
    fn test_drop_closes_port() {
        let connector = MockConnector::grbl();
        {
            let _motor = ready(&connector);
            assert!(connector.is_open());
        }
        assert!(!connector.is_open());
    }
}
