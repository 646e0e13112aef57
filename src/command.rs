use std::{
    net::{Ipv4Addr, SocketAddr, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use crate::{
    commands, env,
    error::{DroneError, Result},
};

/// First sequence number the firmware accepts after a fresh association.
const INITIAL_SEQUENCE: u32 = 10;

/// A drone identified by its IPv4 address. Validated at construction,
/// immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DroneEndpoint {
    addr: Ipv4Addr,
}

impl DroneEndpoint {
    pub fn new(address: &str) -> Result<Self> {
        address
            .parse::<Ipv4Addr>()
            .map(|addr| Self { addr })
            .map_err(|_| DroneError::InvalidAddress(address.to_string()))
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.addr
    }
}

/// Protocol delays and budgets. The firmware tolerates a range of cadences,
/// so everything is a tunable with these nominal defaults.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Period of the command transmitter loop.
    pub transmit_period: Duration,
    /// Period of the telemetry receive loop.
    pub receive_period: Duration,
    /// Pause after each session/profile/application registration step, the
    /// firmware needs time to persist each identifier.
    pub registration_delay: Duration,
    /// Pause between CONFIG_IDS and CONFIG when no telemetry ack is coming.
    pub config_gap: Duration,
    /// Acknowledgment poll increment.
    pub ack_poll: Duration,
    /// Acknowledgment wait budget per configure attempt.
    pub ack_wait: Duration,
    /// Configure attempts when telemetry acknowledgments are active.
    pub ack_retries: u32,
    /// Pause between emergency and land during a reset.
    pub emergency_delay: Duration,
    /// Grace period for a physical landing before channels shut down.
    pub landing_grace: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            transmit_period: Duration::from_millis(30),
            receive_period: Duration::from_millis(50),
            registration_delay: Duration::from_secs(1),
            config_gap: Duration::from_millis(50),
            ack_poll: Duration::from_millis(5),
            ack_wait: Duration::from_millis(500),
            ack_retries: 5,
            emergency_delay: Duration::from_millis(500),
            landing_grace: Duration::from_secs(1),
        }
    }
}

/// The three identifiers registered with the firmware once per channel.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub session: String,
    pub profile: String,
    pub application: String,
}

impl SessionIdentity {
    fn generate() -> Self {
        Self {
            session: random_id(),
            profile: random_id(),
            application: random_id(),
        }
    }
}

fn random_id() -> String {
    format!("{:08x}", rand::random::<u32>())
}

/// One-time registration of the session identity. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigState {
    NotConfigured,
    Configuring,
    Configured,
}

#[derive(Debug)]
struct ChannelInner {
    socket: UdpSocket,
    sequence: u32,
    pending: Option<String>,
}

/// UDP channel to the drone's command port. A background transmitter repeats
/// the pending command at a fixed cadence; the one lock over socket, sequence
/// counter and pending command keeps sends and counter increments atomic
/// relative to each other.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    remote: SocketAddr,
    timing: Timing,
    session: Arc<SessionIdentity>,
    inner: Arc<Mutex<ChannelInner>>,
    config_state: Arc<Mutex<ConfigState>>,
    running: Arc<AtomicBool>,
    command_acked: Arc<AtomicBool>,
    telemetry_active: Arc<AtomicBool>,
}

impl CommandChannel {
    /// Opens the channel to the drone's well-known command port and starts
    /// the transmitter.
    pub fn connect(endpoint: &DroneEndpoint) -> Result<Self> {
        let remote = SocketAddr::from((endpoint.ip(), *env::ENV_ARDRONE_CMD_PORT));
        Self::connect_addr(remote, Timing::default())
    }

    pub fn connect_addr(remote: SocketAddr, timing: Timing) -> Result<Self> {
        let method_name = "connect";
        let socket = open_socket(remote)?;
        let channel = Self {
            remote,
            timing,
            session: Arc::new(SessionIdentity::generate()),
            inner: Arc::new(Mutex::new(ChannelInner {
                socket,
                sequence: INITIAL_SEQUENCE,
                pending: None,
            })),
            config_state: Arc::new(Mutex::new(ConfigState::NotConfigured)),
            running: Arc::new(AtomicBool::new(true)),
            command_acked: Arc::new(AtomicBool::new(false)),
            telemetry_active: Arc::new(AtomicBool::new(false)),
        };
        tracing::debug!(method_name, %remote, "command channel up");
        let transmitter = channel.clone();
        thread::spawn(move || transmitter.transmit_loop());
        Ok(channel)
    }

    /// Replaces the pending command. The transmitter picks it up on its next
    /// tick; non-blocking.
    pub fn set_command(&self, command: String) {
        self.inner.lock().unwrap().pending = Some(command);
    }

    pub fn session(&self) -> &SessionIdentity {
        &self.session
    }

    pub fn sequence(&self) -> u32 {
        self.inner.lock().unwrap().sequence
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Called by the telemetry channel when a decoded packet carries the
    /// command acknowledgment bit.
    pub fn acknowledge_command(&self) {
        self.command_acked.store(true, Ordering::Release);
    }

    /// Toggles the acknowledgment-wait path of `configure`.
    pub fn set_telemetry_active(&self, active: bool) {
        self.telemetry_active.store(active, Ordering::Release);
    }

    pub fn telemetry_active(&self) -> bool {
        self.telemetry_active.load(Ordering::Acquire)
    }

    /// Sends one configuration key/value pair, registering the session
    /// identity first if that has not happened yet. Returns `Ok(false)` only
    /// when telemetry acknowledgments are active and the retry budget ran out
    /// without one.
    pub fn configure(&self, key: &str, value: &str) -> Result<bool> {
        let method_name = "configure";
        self.ensure_registered()?;
        let telemetry = self.telemetry_active();
        let attempts = if telemetry { self.timing.ack_retries } else { 1 };
        let mut acked = false;
        for attempt in 0..attempts {
            {
                let mut inner = self.inner.lock().unwrap();
                let ids = commands::config_ids(
                    inner.sequence,
                    &self.session.session,
                    &self.session.profile,
                    &self.session.application,
                );
                inner.socket.send(ids.as_bytes())?;
                if !telemetry {
                    // no ack will come, give the firmware a moment between
                    // the two datagrams instead
                    thread::sleep(self.timing.config_gap);
                }
                let line = commands::config(inner.sequence + 1, key, value);
                inner.socket.send(line.as_bytes())?;
                inner.sequence += 2;
            }
            if !telemetry || self.wait_for_ack() {
                acked = true;
                break;
            }
            tracing::debug!(method_name, attempt, key, "no acknowledgment, retrying");
        }
        {
            let mut inner = self.inner.lock().unwrap();
            let line = commands::control_ack(inner.sequence);
            inner.socket.send(line.as_bytes())?;
            inner.sequence += 1;
        }
        if !acked {
            tracing::warn!(method_name, key, value, "configuration not acknowledged");
        }
        Ok(acked)
    }

    /// Closes and reopens the UDP association to the same endpoint.
    pub fn reconnect(&self) -> Result<()> {
        let method_name = "reconnect";
        let mut inner = self.inner.lock().unwrap();
        inner.socket = open_socket(self.remote)?;
        tracing::debug!(method_name, remote = %self.remote, "command socket reopened");
        Ok(())
    }

    /// Signals the transmitter to terminate and waits out its last tick.
    pub fn stop(&self) -> bool {
        let method_name = "stop";
        self.running.store(false, Ordering::Release);
        thread::sleep(2 * self.timing.transmit_period);
        self.inner.lock().unwrap().pending = None;
        tracing::debug!(method_name, "command channel stopped");
        true
    }

    fn ensure_registered(&self) -> Result<()> {
        let method_name = "register_session";
        let mut state = self.config_state.lock().unwrap();
        if *state == ConfigState::Configured {
            return Ok(());
        }
        *state = ConfigState::Configuring;
        let steps = [
            ("custom:session_id", self.session.session.as_str()),
            ("custom:profile_id", self.session.profile.as_str()),
            ("custom:application_id", self.session.application.as_str()),
        ];
        for (key, id) in steps {
            tracing::debug!(method_name, key, id, "register");
            {
                let mut inner = self.inner.lock().unwrap();
                let line = commands::config(inner.sequence, key, id);
                inner.socket.send(line.as_bytes())?;
                inner.sequence += 1;
            }
            thread::sleep(self.timing.registration_delay);
        }
        *state = ConfigState::Configured;
        Ok(())
    }

    fn wait_for_ack(&self) -> bool {
        let deadline = Instant::now() + self.timing.ack_wait;
        while Instant::now() < deadline {
            if self.command_acked.swap(false, Ordering::AcqRel) {
                return true;
            }
            thread::sleep(self.timing.ack_poll);
        }
        false
    }

    fn transmit_loop(&self) {
        let method_name = "transmit_loop";
        while self.running.load(Ordering::Acquire) {
            let start = Instant::now();
            {
                let mut inner = self.inner.lock().unwrap();
                if let Err(e) = inner.socket.send(commands::WATCHDOG.as_bytes()) {
                    tracing::warn!(method_name, "watchdog send failed: {e}");
                }
                if let Some(template) = inner.pending.clone() {
                    let line = commands::with_sequence(&template, inner.sequence);
                    inner.sequence += 1;
                    if let Err(e) = inner.socket.send(line.as_bytes()) {
                        tracing::warn!(method_name, "command send failed: {e}");
                    }
                }
            }
            let elapsed = start.elapsed();
            if elapsed < self.timing.transmit_period {
                thread::sleep(self.timing.transmit_period - elapsed);
            }
        }
        tracing::debug!(method_name, "transmitter exiting");
    }

    #[cfg(test)]
    pub(crate) fn mark_registered(&self) {
        *self.config_state.lock().unwrap() = ConfigState::Configured;
    }

    #[cfg(test)]
    pub(crate) fn ack_pending(&self) -> bool {
        self.command_acked.load(Ordering::Acquire)
    }
}

fn open_socket(remote: SocketAddr) -> Result<UdpSocket> {
    UdpSocket::bind(("0.0.0.0", 0))
        .and_then(|socket| socket.connect(remote).map(|_| socket))
        .map_err(|e| DroneError::Connection(format!("command socket to {remote}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_timing() -> Timing {
        Timing {
            registration_delay: Duration::from_millis(50),
            ack_poll: Duration::from_millis(5),
            ack_wait: Duration::from_millis(40),
            ..Timing::default()
        }
    }

    fn listener() -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(300)))
            .unwrap();
        socket
    }

    fn drain(listener: &UdpSocket) -> Vec<String> {
        let mut buff = [0u8; 1024];
        let mut lines = Vec::new();
        while let Ok(n) = listener.recv(&mut buff) {
            lines.push(String::from_utf8_lossy(&buff[..n]).to_string());
        }
        lines
    }

    fn commands_only(lines: Vec<String>) -> Vec<String> {
        lines
            .into_iter()
            .filter(|l| !l.starts_with("AT*COMWDG"))
            .collect()
    }

    #[test]
    fn test_endpoint_validation() {
        assert!(DroneEndpoint::new("192.168.1.1").is_ok());
        assert!(matches!(
            DroneEndpoint::new("300.168.1.1"),
            Err(DroneError::InvalidAddress(_))
        ));
        assert!(matches!(
            DroneEndpoint::new("drone.local"),
            Err(DroneError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_session_identity_is_hex() {
        let identity = SessionIdentity::generate();
        for id in [&identity.session, &identity.profile, &identity.application] {
            assert_eq!(8, id.len());
            assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()), "{id}");
        }
    }

    #[test]
    fn test_sequence_advances_per_transmitted_command() {
        let listener = listener();
        let channel =
            CommandChannel::connect_addr(listener.local_addr().unwrap(), Timing::default())
                .unwrap();
        assert_eq!(INITIAL_SEQUENCE, channel.sequence());

        channel.set_command(commands::ref_command(commands::REF_LAND));
        let mut refs = Vec::new();
        let mut watchdogs = 0;
        let mut buff = [0u8; 1024];
        while refs.len() < 5 {
            let Ok(n) = listener.recv(&mut buff) else { break };
            let line = String::from_utf8_lossy(&buff[..n]).to_string();
            if line.starts_with("AT*REF=") {
                refs.push(line);
            } else {
                assert_eq!(commands::WATCHDOG, line);
                watchdogs += 1;
            }
        }
        channel.stop();
        assert!(watchdogs > 0);
        assert_eq!("AT*REF=10,290717696\r", refs[0]);
        assert_eq!("AT*REF=11,290717696\r", refs[1]);
        assert_eq!("AT*REF=12,290717696\r", refs[2]);

        // counter equals 10 plus the number of transmitted commands
        let late = commands_only(drain(&listener)).len() as u32;
        assert_eq!(INITIAL_SEQUENCE + refs.len() as u32 + late, channel.sequence());
    }

    #[test]
    fn test_configure_without_telemetry() {
        let listener = listener();
        let channel =
            CommandChannel::connect_addr(listener.local_addr().unwrap(), fast_timing()).unwrap();
        channel.mark_registered();

        let acked = channel.configure("control:altitude_max", "3000").unwrap();
        channel.stop();
        assert!(acked);
        assert_eq!(INITIAL_SEQUENCE + 3, channel.sequence());

        let lines = commands_only(drain(&listener));
        assert_eq!(3, lines.len());
        assert!(lines[0].starts_with("AT*CONFIG_IDS=10,"), "{}", lines[0]);
        assert_eq!("AT*CONFIG=11,\"control:altitude_max\",\"3000\"\r", lines[1]);
        assert_eq!("AT*CTRL=12,5,0\r", lines[2]);
    }

    #[test]
    fn test_configure_exhausts_retries_without_ack() {
        let listener = listener();
        let channel =
            CommandChannel::connect_addr(listener.local_addr().unwrap(), fast_timing()).unwrap();
        channel.mark_registered();
        channel.set_telemetry_active(true);

        let acked = channel.configure("general:navdata_demo", "FALSE").unwrap();
        channel.stop();
        assert!(!acked);
        // five attempts of two datagrams each, plus the trailing control ack
        assert_eq!(INITIAL_SEQUENCE + 11, channel.sequence());

        let lines = commands_only(drain(&listener));
        assert_eq!(11, lines.len());
        assert!(lines[9].starts_with("AT*CONFIG=19,"), "{}", lines[9]);
        assert_eq!("AT*CTRL=20,5,0\r", lines[10]);
    }

    #[test]
    fn test_configure_succeeds_on_acknowledgment() {
        let listener = listener();
        let channel =
            CommandChannel::connect_addr(listener.local_addr().unwrap(), fast_timing()).unwrap();
        channel.mark_registered();
        channel.set_telemetry_active(true);

        let acker = channel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(15));
            acker.acknowledge_command();
        });
        let acked = channel.configure("general:navdata_demo", "FALSE").unwrap();
        handle.join().unwrap();
        channel.stop();

        assert!(acked);
        // single attempt plus the trailing control ack
        assert_eq!(INITIAL_SEQUENCE + 3, channel.sequence());
        // the flag is consumed when observed
        assert!(!channel.ack_pending());
    }

    #[test]
    fn test_registration_happens_once() {
        let listener = listener();
        let channel =
            CommandChannel::connect_addr(listener.local_addr().unwrap(), fast_timing()).unwrap();

        channel.configure("control:altitude_max", "2000").unwrap();
        let first = commands_only(drain(&listener));
        assert!(first[0].contains("custom:session_id"), "{}", first[0]);
        assert!(first[1].contains("custom:profile_id"), "{}", first[1]);
        assert!(first[2].contains("custom:application_id"), "{}", first[2]);
        assert!(first[0].contains(&channel.session().session));
        assert_eq!(6, first.len());

        channel.configure("control:altitude_max", "2500").unwrap();
        channel.stop();
        let second = commands_only(drain(&listener));
        assert_eq!(3, second.len());
        assert!(!second.iter().any(|l| l.contains("custom:")));
    }

    #[test]
    fn test_reconnect_keeps_transmitting() {
        let listener = listener();
        let channel =
            CommandChannel::connect_addr(listener.local_addr().unwrap(), Timing::default())
                .unwrap();
        channel.reconnect().unwrap();
        channel.set_command(commands::ref_command(commands::REF_LAND));
        let mut buff = [0u8; 1024];
        let mut seen_ref = false;
        for _ in 0..20 {
            let Ok(n) = listener.recv(&mut buff) else { break };
            if buff[..n].starts_with(b"AT*REF=") {
                seen_ref = true;
                break;
            }
        }
        channel.stop();
        assert!(seen_ref);
    }
}
