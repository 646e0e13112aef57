use std::{
    io::Read,
    net::{SocketAddr, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crate::{
    error::{DroneError, Result},
    VideoPublishChannel,
};

const PROBE_TIMEOUT: Duration = Duration::from_millis(500);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// TCP transport for the drone's video stream. Frames are forwarded raw to
/// an mpsc channel; decoding them is the consumer's business.
#[derive(Debug, Clone)]
pub struct VideoChannel {
    remote: SocketAddr,
    control: SocketAddr,
    running: Arc<AtomicBool>,
}

impl VideoChannel {
    pub fn new(remote: SocketAddr, control: SocketAddr) -> Self {
        Self {
            remote,
            control,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Probes the control port to verify the drone is reachable before
    /// opening the stream.
    pub fn is_reachable(&self) -> bool {
        TcpStream::connect_timeout(&self.control, PROBE_TIMEOUT).is_ok()
    }

    /// Connects the video stream and starts forwarding frames.
    pub fn start(&self, frames: VideoPublishChannel) -> Result<()> {
        let method_name = "video_start";
        let stream = TcpStream::connect_timeout(&self.remote, CONNECT_TIMEOUT)
            .map_err(|e| DroneError::Connection(format!("video stream to {}: {e}", self.remote)))?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        self.running.store(true, Ordering::Release);
        tracing::debug!(method_name, remote = %self.remote, "video channel up");
        let running = self.running.clone();
        thread::spawn(move || receive_loop(stream, frames, running));
        Ok(())
    }

    /// Signals the receive loop to terminate on its next iteration.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

fn receive_loop(mut stream: TcpStream, frames: VideoPublishChannel, running: Arc<AtomicBool>) {
    let method_name = "video_recv";
    let mut buff = [0u8; 4096];
    while running.load(Ordering::Acquire) {
        match stream.read(&mut buff) {
            Ok(0) => {
                tracing::warn!(method_name, "video stream closed by remote");
                return;
            }
            Ok(nread) => {
                if frames.send(buff[..nread].to_vec()).is_err() {
                    tracing::error!(method_name, "video consumer gone");
                    return;
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                tracing::warn!(method_name, "video read error: {e}");
                return;
            }
        }
    }
    tracing::debug!(method_name, "video receiver exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    #[test]
    fn test_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let channel = VideoChannel::new(addr, addr);
        assert!(channel.is_reachable());
    }

    #[test]
    fn test_unreachable_control_port() {
        // bind and drop to get a port that is almost certainly closed
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let channel = VideoChannel::new(addr, addr);
        assert!(!channel.is_reachable());
    }

    #[test]
    fn test_frames_forwarded() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"frame-bytes").unwrap();
            thread::sleep(Duration::from_millis(200));
        });

        let (tx, rx) = crate::video_channel();
        let channel = VideoChannel::new(addr, addr);
        channel.start(tx).unwrap();

        let frame = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(b"frame-bytes".to_vec(), frame);
        channel.stop();
        server.join().unwrap();
    }
}
