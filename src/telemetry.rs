use std::{
    net::{SocketAddr, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
    thread,
};

use crate::{
    command::CommandChannel,
    dump::PacketDumper,
    env,
    error::{DroneError, Result},
    navdata::{self, NavdataPacket},
};

/// Callback invoked with every decoded telemetry packet.
pub type NavdataHandler = Box<dyn Fn(&NavdataPacket) + Send + Sync>;

/// Datagram that switches the firmware's navdata stream on.
const ACTIVATION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// UDP channel bound to the drone's telemetry port. Receives and decodes
/// navdata continuously, forwards packets to the registered callback and
/// signals command acknowledgments back to the command channel.
#[derive(Clone)]
pub struct NavdataChannel {
    remote: SocketAddr,
    socket: Arc<UdpSocket>,
    command: CommandChannel,
    running: Arc<AtomicBool>,
    callback: Arc<RwLock<Option<NavdataHandler>>>,
    last: Arc<RwLock<Option<NavdataPacket>>>,
}

impl NavdataChannel {
    /// Binds the well-known telemetry port, activates the stream and starts
    /// the receive loop.
    pub fn start(
        endpoint: &crate::command::DroneEndpoint,
        command: CommandChannel,
        handler: NavdataHandler,
    ) -> Result<Self> {
        let port = *env::ENV_ARDRONE_NAVDATA_PORT;
        Self::start_addr(SocketAddr::from((endpoint.ip(), port)), port, command, handler)
    }

    pub fn start_addr(
        remote: SocketAddr,
        bind_port: u16,
        command: CommandChannel,
        handler: NavdataHandler,
    ) -> Result<Self> {
        let method_name = "navdata_start";
        let socket = UdpSocket::bind(("0.0.0.0", bind_port))
            .map_err(|e| DroneError::Connection(format!("navdata socket on port {bind_port}: {e}")))?;
        socket.set_nonblocking(true)?;
        let channel = Self {
            remote,
            socket: Arc::new(socket),
            command: command.clone(),
            running: Arc::new(AtomicBool::new(true)),
            callback: Arc::new(RwLock::new(Some(handler))),
            last: Arc::new(RwLock::new(None)),
        };
        command.set_telemetry_active(true);
        channel.send_activation()?;
        tracing::debug!(method_name, %remote, "navdata channel up");
        let receiver = channel.clone();
        thread::spawn(move || receiver.receive_loop());
        Ok(channel)
    }

    /// Replaces the packet callback. The previous one stops being invoked
    /// from the next received datagram on.
    pub fn set_callback(&self, handler: NavdataHandler) {
        *self.callback.write().unwrap() = Some(handler);
    }

    /// Most recently decoded packet, if any arrived yet.
    pub fn last_navdata(&self) -> Option<NavdataPacket> {
        self.last.read().unwrap().clone()
    }

    /// Resends the activation datagram without rebinding the socket.
    pub fn reconnect(&self) -> bool {
        let method_name = "navdata_reconnect";
        match self.send_activation() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(method_name, "activation resend failed: {e}");
                false
            }
        }
    }

    /// Signals the receive loop to terminate; it notifies the command channel
    /// and exits on its next iteration.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn send_activation(&self) -> Result<()> {
        self.socket.send_to(&ACTIVATION, self.remote)?;
        Ok(())
    }

    fn receive_loop(&self) {
        let method_name = "navdata_recv";
        let dumper = PacketDumper::from_env("navdata");
        let mut buff = [0u8; 4096];
        let period = self.command.timing().receive_period;

        loop {
            if !self.running.load(Ordering::Acquire) {
                self.command.set_telemetry_active(false);
                tracing::debug!(method_name, "navdata channel stopped");
                return;
            }
            match self.socket.recv_from(&mut buff) {
                Ok((nread, _)) => {
                    if let Some(ref dumper) = dumper {
                        dumper.dump(&buff[..nread]);
                    }
                    match navdata::decode(&buff[..nread]) {
                        Ok(packet) => self.deliver(packet),
                        // a bad datagram must never stop the control link
                        Err(e) => tracing::warn!(method_name, "skipping packet: {e}"),
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => tracing::warn!(method_name, "udp read error: {e}"),
            }
            thread::sleep(period);
        }
    }

    fn deliver(&self, packet: NavdataPacket) {
        let method_name = "navdata_recv";
        tracing::trace!(method_name, sequence = packet.sequence, flags = ?packet.state.active_flags());
        if packet.state.command_ack {
            self.command.acknowledge_command();
        }
        *self.last.write().unwrap() = Some(packet.clone());
        if let Some(ref handler) = *self.callback.read().unwrap() {
            handler(&packet);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Timing;
    use std::sync::mpsc;
    use std::time::Duration;

    fn fake_drone() -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        socket
    }

    fn navdata_bytes(state_word: u32) -> Vec<u8> {
        let mut buff = Vec::new();
        buff.extend_from_slice(&0x55667788u32.to_le_bytes());
        buff.extend_from_slice(&state_word.to_le_bytes());
        buff.extend_from_slice(&7u32.to_le_bytes());
        buff.extend_from_slice(&0u32.to_le_bytes());
        buff
    }

    fn start_channel(drone: &UdpSocket) -> (CommandChannel, NavdataChannel, mpsc::Receiver<NavdataPacket>) {
        let cmd_listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        let command =
            CommandChannel::connect_addr(cmd_listener.local_addr().unwrap(), Timing::default())
                .unwrap();
        let (tx, rx) = mpsc::channel();
        let handler: NavdataHandler = Box::new(move |packet| {
            let _ = tx.send(packet.clone());
        });
        let channel =
            NavdataChannel::start_addr(drone.local_addr().unwrap(), 0, command.clone(), handler)
                .unwrap();
        (command, channel, rx)
    }

    #[test]
    fn test_activation_decode_and_acknowledgment() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
        let drone = fake_drone();
        let (command, channel, rx) = start_channel(&drone);
        assert!(command.telemetry_active());

        let mut buff = [0u8; 64];
        let (n, client) = drone.recv_from(&mut buff).unwrap();
        assert_eq!(&ACTIVATION, &buff[..n]);

        // garbage first, then a packet with the acknowledgment bit set
        drone.send_to(&[0x01, 0x02, 0x03], client).unwrap();
        drone.send_to(&navdata_bytes(1 << 6), client).unwrap();

        let packet = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(packet.state.command_ack);
        assert_eq!(7, packet.sequence);
        assert!(command.ack_pending());
        assert!(channel.last_navdata().is_some());

        channel.stop();
        thread::sleep(3 * command.timing().receive_period);
        assert!(!command.telemetry_active());
        command.stop();
    }

    #[test]
    fn test_reconnect_resends_activation() {
        let drone = fake_drone();
        let (command, channel, _rx) = start_channel(&drone);

        let mut buff = [0u8; 64];
        let (_, _) = drone.recv_from(&mut buff).unwrap();
        assert!(channel.reconnect());
        let (n, _) = drone.recv_from(&mut buff).unwrap();
        assert_eq!(&ACTIVATION, &buff[..n]);

        channel.stop();
        command.stop();
    }

    #[test]
    fn test_callback_replacement() {
        let drone = fake_drone();
        let (command, channel, rx) = start_channel(&drone);

        let mut buff = [0u8; 64];
        let (_, client) = drone.recv_from(&mut buff).unwrap();

        let (tx2, rx2) = mpsc::channel();
        channel.set_callback(Box::new(move |packet: &NavdataPacket| {
            let _ = tx2.send(packet.sequence);
        }));
        drone.send_to(&navdata_bytes(0), client).unwrap();

        assert_eq!(7, rx2.recv_timeout(Duration::from_secs(2)).unwrap());
        assert!(rx.try_recv().is_err());

        channel.stop();
        command.stop();
    }
}
