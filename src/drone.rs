use std::{net::SocketAddr, thread};

use crate::{
    command::{CommandChannel, DroneEndpoint, Timing},
    commands,
    config::{self, ConfigSetting},
    env,
    error::{DroneError, Result},
    telemetry::{NavdataChannel, NavdataHandler},
    video::VideoChannel,
    VideoRecvChannel,
};

pub const DEFAULT_TRANSLATION_SPEED: f32 = 0.2;
pub const DEFAULT_ROTATION_SPEED: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// The drone's well-known ports.
#[derive(Debug, Clone, Copy)]
pub struct Ports {
    pub command: u16,
    pub navdata: u16,
    pub video: u16,
    pub control: u16,
}

impl Ports {
    pub fn from_env() -> Self {
        Self {
            command: *env::ENV_ARDRONE_CMD_PORT,
            navdata: *env::ENV_ARDRONE_NAVDATA_PORT,
            video: *env::ENV_ARDRONE_VIDEO_PORT,
            control: *env::ENV_ARDRONE_CTRL_PORT,
        }
    }
}

impl Default for Ports {
    fn default() -> Self {
        Self::from_env()
    }
}

/// The public control surface: semantic flight commands translated into the
/// wire format, plus lifecycle management of the underlying channels.
pub struct Drone {
    endpoint: DroneEndpoint,
    ports: Ports,
    timing: Timing,
    state: ConnectionState,
    command: Option<CommandChannel>,
    navdata: Option<NavdataChannel>,
    video: Option<VideoChannel>,
}

impl Drone {
    pub fn new(address: &str) -> Result<Self> {
        Ok(Self::with_ports(
            DroneEndpoint::new(address)?,
            Ports::from_env(),
            Timing::default(),
        ))
    }

    /// Drone at the address configured through the environment.
    pub fn from_env() -> Result<Self> {
        Self::new(&env::ENV_ARDRONE_ADDR)
    }

    pub fn with_ports(endpoint: DroneEndpoint, ports: Ports, timing: Timing) -> Self {
        Self {
            endpoint,
            ports,
            timing,
            state: ConnectionState::Disconnected,
            command: None,
            navdata: None,
            video: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn endpoint(&self) -> DroneEndpoint {
        self.endpoint
    }

    /// Opens the command channel and starts its transmitter.
    pub fn connect(&mut self) -> Result<()> {
        let method_name = "connect";
        if self.state == ConnectionState::Connected {
            return Ok(());
        }
        self.state = ConnectionState::Connecting;
        let remote = SocketAddr::from((self.endpoint.ip(), self.ports.command));
        match CommandChannel::connect_addr(remote, self.timing) {
            Ok(channel) => {
                self.command = Some(channel);
                self.state = ConnectionState::Connected;
                tracing::info!(method_name, %remote, "connected");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Starts the telemetry channel, delivering every decoded packet to the
    /// handler.
    pub fn start_navdata(&mut self, handler: NavdataHandler) -> Result<()> {
        let command = self.command()?.clone();
        let remote = SocketAddr::from((self.endpoint.ip(), self.ports.navdata));
        let channel = NavdataChannel::start_addr(remote, self.ports.navdata, command, handler)?;
        self.navdata = Some(channel);
        Ok(())
    }

    /// Starts the video channel and hands back the frame stream. At most one
    /// video stream is active per drone; a previous one is stopped first.
    pub fn start_video(&mut self) -> Result<VideoRecvChannel> {
        let method_name = "start_video";
        self.command()?;
        if let Some(ref previous) = self.video {
            tracing::warn!(method_name, "replacing active video channel");
            previous.stop();
        }
        let remote = SocketAddr::from((self.endpoint.ip(), self.ports.video));
        let control = SocketAddr::from((self.endpoint.ip(), self.ports.control));
        let channel = VideoChannel::new(remote, control);
        if !channel.is_reachable() {
            return Err(DroneError::Connection(format!(
                "control port {control} unreachable"
            )));
        }
        let (tx, rx) = crate::video_channel();
        channel.start(tx)?;
        self.video = Some(channel);
        Ok(rx)
    }

    pub fn navdata(&self) -> Option<&NavdataChannel> {
        self.navdata.as_ref()
    }

    pub fn takeoff(&self) -> Result<()> {
        let method_name = "takeoff";
        tracing::debug!(method_name, "send");
        self.set_template(commands::ref_command(commands::REF_TAKEOFF))
    }

    pub fn land(&self) -> Result<()> {
        let method_name = "land";
        tracing::debug!(method_name, "send");
        self.set_template(commands::ref_command(commands::REF_LAND))
    }

    pub fn emergency(&self) -> Result<()> {
        let method_name = "emergency";
        tracing::debug!(method_name, "send");
        self.set_template(commands::ref_command(commands::REF_EMERGENCY))
    }

    /// Flat trim; only meaningful on the ground.
    pub fn calibrate(&self) -> Result<()> {
        let method_name = "calibrate";
        tracing::debug!(method_name, "send");
        self.set_template(commands::flat_trim())
    }

    pub fn forward(&self, speed: f32) -> Result<()> {
        self.move_drone(0.0, -speed, 0.0, 0.0)
    }

    pub fn backward(&self, speed: f32) -> Result<()> {
        self.move_drone(0.0, speed, 0.0, 0.0)
    }

    pub fn left(&self, speed: f32) -> Result<()> {
        self.move_drone(-speed, 0.0, 0.0, 0.0)
    }

    pub fn right(&self, speed: f32) -> Result<()> {
        self.move_drone(speed, 0.0, 0.0, 0.0)
    }

    pub fn up(&self, speed: f32) -> Result<()> {
        self.move_drone(0.0, 0.0, speed, 0.0)
    }

    pub fn down(&self, speed: f32) -> Result<()> {
        self.move_drone(0.0, 0.0, -speed, 0.0)
    }

    pub fn rotate_left(&self, speed: f32) -> Result<()> {
        self.move_drone(0.0, 0.0, 0.0, -speed)
    }

    pub fn rotate_right(&self, speed: f32) -> Result<()> {
        self.move_drone(0.0, 0.0, 0.0, speed)
    }

    pub fn hover(&self) -> Result<()> {
        let method_name = "hover";
        tracing::debug!(method_name, "send");
        self.set_template(commands::hover())
    }

    /// Sets a progressive movement command; every component is clamped to
    /// the unit interval the firmware expects.
    pub fn move_drone(
        &self,
        left_right: f32,
        front_back: f32,
        up_down: f32,
        angle_change: f32,
    ) -> Result<()> {
        let method_name = "move";
        tracing::debug!(method_name, left_right, front_back, up_down, angle_change, "update");
        self.set_template(commands::pcmd(
            clamp_unit(left_right),
            clamp_unit(front_back),
            clamp_unit(up_down),
            clamp_unit(angle_change),
        ))
    }

    /// Emergency cutout followed by a landing command once the firmware had
    /// a moment to settle. Best-effort, never raises.
    pub fn reset(&self) {
        let method_name = "reset";
        if let Err(e) = self.emergency() {
            tracing::warn!(method_name, "emergency not sent: {e}");
            return;
        }
        thread::sleep(self.timing.emergency_delay);
        if let Err(e) = self.land() {
            tracing::warn!(method_name, "land not sent: {e}");
        }
    }

    /// Lands, waits out the landing grace period and tears down every
    /// channel. Best-effort, never raises; safe to call on cleanup paths.
    pub fn stop(&mut self) {
        let method_name = "stop";
        if self.land().is_ok() {
            thread::sleep(self.timing.landing_grace);
        }
        if let Some(ref video) = self.video {
            video.stop();
        }
        if let Some(ref navdata) = self.navdata {
            navdata.stop();
        }
        if let Some(ref command) = self.command {
            command.stop();
        }
        self.video = None;
        self.navdata = None;
        self.command = None;
        self.state = ConnectionState::Disconnected;
        tracing::info!(method_name, "disconnected");
    }

    /// Applies the settings in order, one `configure` per expanded pair.
    /// Returns whether every pair was acknowledged (always true while no
    /// telemetry is active).
    pub fn set_config(&self, settings: &[ConfigSetting]) -> Result<bool> {
        let command = self.command()?;
        let mut acked = true;
        for setting in settings {
            for (key, value) in setting.pairs() {
                acked &= command.configure(&key, &value)?;
            }
        }
        Ok(acked)
    }

    /// String-keyed variant of `set_config`. Every key is validated before
    /// any network traffic happens, so an unknown key causes zero sends.
    pub fn set_config_str(&self, options: &[(&str, &str)]) -> Result<bool> {
        let mut settings = Vec::with_capacity(options.len());
        for (key, value) in options {
            settings.push(ConfigSetting::parse(key, value)?);
        }
        self.set_config(&settings)
    }

    /// The configuration keys `set_config_str` accepts.
    pub fn list_config(&self) -> &'static [&'static str] {
        &config::SUPPORTED_KEYS
    }

    fn set_template(&self, template: String) -> Result<()> {
        self.command()?.set_command(template);
        Ok(())
    }

    fn command(&self) -> Result<&CommandChannel> {
        self.command
            .as_ref()
            .ok_or_else(|| DroneError::Precondition("drone is not connected".to_string()))
    }
}

fn clamp_unit(v: f32) -> f32 {
    v.clamp(-1.0, 1.0)
}
