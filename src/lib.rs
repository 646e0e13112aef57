use std::sync::mpsc::{Receiver, Sender};

pub mod command;
pub(crate) mod commands;
pub mod config;
pub mod drone;
pub(crate) mod dump;
pub(crate) mod env;
pub mod error;
pub mod navdata;
pub mod telemetry;
pub(crate) mod utils;
pub mod video;

#[macro_use]
extern crate lazy_static;

pub use command::{CommandChannel, DroneEndpoint, SessionIdentity, Timing};
pub use config::ConfigSetting;
pub use drone::{
    ConnectionState, Drone, Ports, DEFAULT_ROTATION_SPEED, DEFAULT_TRANSLATION_SPEED,
};
pub use error::{DroneError, Result};
pub use navdata::{decode, DroneState, NavdataPacket};
pub use telemetry::{NavdataChannel, NavdataHandler};
pub use video::VideoChannel;

pub type VideoRecvChannel = Receiver<Vec<u8>>;
pub type VideoPublishChannel = Sender<Vec<u8>>;
pub type VideoFrames = (VideoPublishChannel, VideoRecvChannel);

pub fn video_channel() -> VideoFrames {
    std::sync::mpsc::channel()
}
