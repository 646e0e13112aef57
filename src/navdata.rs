// Navdata stream: binary little-endian datagrams on UDP port 5554. A 16-byte
// header (state word, drone-state bitfield, sequence, vision flag) followed
// by option blocks, each `u16 id / u16 size` where size counts the 4-byte
// option header itself.

use crate::error::{DroneError, Result};
use crate::utils;

pub(crate) const OPTION_DEMO: u16 = 0;
pub(crate) const OPTION_VISION_DETECT: u16 = 16;
pub(crate) const OPTION_GPS: u16 = 27;
pub(crate) const OPTION_CHECKSUM: u16 = 65535;

const HEADER_LEN: usize = 16;
const OPTION_HEADER_LEN: usize = 4;

/// The drone-state bitfield, one flag per bit of the header's second word.
/// Bits 14, 18 and 20 are reserved by the firmware and not decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DroneState {
    pub flying: bool,
    pub video_on: bool,
    pub vision_on: bool,
    pub angle_algo: bool,
    pub altitude_algo: bool,
    pub user_feedback: bool,
    pub command_ack: bool,
    pub fw_ok: bool,
    pub fw_new: bool,
    pub fw_update: bool,
    pub navdata_demo: bool,
    pub navdata_bootstrap: bool,
    pub motor_status: bool,
    pub com_lost: bool,
    pub vbat_low: bool,
    pub user_emergency: bool,
    pub timer_elapsed: bool,
    pub too_much_angle: bool,
    pub ultrasound_ok: bool,
    pub cutout: bool,
    pub pic_version_ok: bool,
    pub atcodec_thread_on: bool,
    pub navdata_thread_on: bool,
    pub video_thread_on: bool,
    pub acq_thread_on: bool,
    pub ctrl_watchdog: bool,
    pub adc_watchdog: bool,
    pub com_watchdog: bool,
    pub emergency: bool,
}

impl DroneState {
    pub fn from_word(word: u32) -> Self {
        Self {
            flying: (word & 1) == 1,
            video_on: (word >> 1 & 1) == 1,
            vision_on: (word >> 2 & 1) == 1,
            angle_algo: (word >> 3 & 1) == 1,
            altitude_algo: (word >> 4 & 1) == 1,
            user_feedback: (word >> 5 & 1) == 1,
            command_ack: (word >> 6 & 1) == 1,
            fw_ok: (word >> 7 & 1) == 1,
            fw_new: (word >> 8 & 1) == 1,
            fw_update: (word >> 9 & 1) == 1,
            navdata_demo: (word >> 10 & 1) == 1,
            navdata_bootstrap: (word >> 11 & 1) == 1,
            motor_status: (word >> 12 & 1) == 1,
            com_lost: (word >> 13 & 1) == 1,
            vbat_low: (word >> 15 & 1) == 1,
            user_emergency: (word >> 16 & 1) == 1,
            timer_elapsed: (word >> 17 & 1) == 1,
            too_much_angle: (word >> 19 & 1) == 1,
            ultrasound_ok: (word >> 21 & 1) == 1,
            cutout: (word >> 22 & 1) == 1,
            pic_version_ok: (word >> 23 & 1) == 1,
            atcodec_thread_on: (word >> 24 & 1) == 1,
            navdata_thread_on: (word >> 25 & 1) == 1,
            video_thread_on: (word >> 26 & 1) == 1,
            acq_thread_on: (word >> 27 & 1) == 1,
            ctrl_watchdog: (word >> 28 & 1) == 1,
            adc_watchdog: (word >> 29 & 1) == 1,
            com_watchdog: (word >> 30 & 1) == 1,
            emergency: (word >> 31 & 1) == 1,
        }
    }

    /// Names of the flags currently set, for diagnostics.
    pub fn active_flags(&self) -> Vec<&'static str> {
        let flags = [
            (self.flying, "flying"),
            (self.video_on, "video_on"),
            (self.vision_on, "vision_on"),
            (self.angle_algo, "angle_algo"),
            (self.altitude_algo, "altitude_algo"),
            (self.user_feedback, "user_feedback"),
            (self.command_ack, "command_ack"),
            (self.fw_ok, "fw_ok"),
            (self.fw_new, "fw_new"),
            (self.fw_update, "fw_update"),
            (self.navdata_demo, "navdata_demo"),
            (self.navdata_bootstrap, "navdata_bootstrap"),
            (self.motor_status, "motor_status"),
            (self.com_lost, "com_lost"),
            (self.vbat_low, "vbat_low"),
            (self.user_emergency, "user_emergency"),
            (self.timer_elapsed, "timer_elapsed"),
            (self.too_much_angle, "too_much_angle"),
            (self.ultrasound_ok, "ultrasound_ok"),
            (self.cutout, "cutout"),
            (self.pic_version_ok, "pic_version_ok"),
            (self.atcodec_thread_on, "atcodec_thread_on"),
            (self.navdata_thread_on, "navdata_thread_on"),
            (self.video_thread_on, "video_thread_on"),
            (self.acq_thread_on, "acq_thread_on"),
            (self.ctrl_watchdog, "ctrl_watchdog"),
            (self.adc_watchdog, "adc_watchdog"),
            (self.com_watchdog, "com_watchdog"),
            (self.emergency, "emergency"),
        ];
        flags
            .iter()
            .filter(|(set, _)| *set)
            .map(|(_, name)| *name)
            .collect()
    }
}

/// Flight demo option (id 0): battery, attitude, altitude and speed.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoData {
    pub ctrl_state: u32,
    pub battery_percentage: u32,
    pub theta: i32,
    pub phi: i32,
    pub psi: f32,
    pub altitude: i32,
    pub vx: i32,
    pub vy: i32,
    pub vz: i32,
}

impl DemoData {
    fn decode(id: u16, payload: &[u8]) -> Result<Self> {
        if id != OPTION_DEMO {
            return Err(DroneError::MalformedPacket(format!(
                "flight demo block dispatched with option id {id}, expected {OPTION_DEMO}"
            )));
        }
        Ok(Self {
            ctrl_state: utils::get_u32(payload, 0)?,
            battery_percentage: utils::get_u32(payload, 4)?,
            // theta and phi arrive in millidegrees
            theta: (utils::get_f32(payload, 8)? / 1000.0) as i32,
            phi: (utils::get_f32(payload, 12)? / 1000.0) as i32,
            psi: utils::get_f32(payload, 16)?,
            altitude: utils::get_i32(payload, 20)?,
            vx: utils::get_f32(payload, 24)? as i32,
            vy: utils::get_f32(payload, 28)? as i32,
            vz: utils::get_f32(payload, 32)? as i32,
        })
    }
}

/// Vision detection option (id 16).
// TODO: validate the field offsets against real hardware, the demo and GPS
// blocks are confirmed but this one has only been bench-tested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionDetectData {
    pub nb_detected: u32,
    pub xc: u32,
    pub yc: u32,
    pub width: u32,
    pub height: u32,
    pub distance: u32,
}

impl VisionDetectData {
    fn decode(id: u16, payload: &[u8]) -> Result<Self> {
        if id != OPTION_VISION_DETECT {
            return Err(DroneError::MalformedPacket(format!(
                "vision detect block dispatched with option id {id}, expected {OPTION_VISION_DETECT}"
            )));
        }
        Ok(Self {
            nb_detected: utils::get_u32(payload, 0)?,
            xc: utils::get_u32(payload, 4)?,
            yc: utils::get_u32(payload, 8)?,
            width: utils::get_u32(payload, 12)?,
            height: utils::get_u32(payload, 16)?,
            distance: utils::get_u32(payload, 20)?,
        })
    }
}

/// GPS option (id 27), present on drones with the flight recorder.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsData {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub hdop: f64,
    pub data_available: u8,
    pub zero_validated: u8,
    pub wpt_validated: u8,
}

impl GpsData {
    fn decode(id: u16, payload: &[u8]) -> Result<Self> {
        if id != OPTION_GPS {
            return Err(DroneError::MalformedPacket(format!(
                "gps block dispatched with option id {id}, expected {OPTION_GPS}"
            )));
        }
        Ok(Self {
            latitude: utils::get_f64(payload, 0)?,
            longitude: utils::get_f64(payload, 8)?,
            elevation: utils::get_f64(payload, 16)?,
            hdop: utils::get_f64(payload, 24)?,
            data_available: *payload.get(32).ok_or_else(|| short_gps(payload.len()))?,
            zero_validated: *payload.get(33).ok_or_else(|| short_gps(payload.len()))?,
            wpt_validated: *payload.get(34).ok_or_else(|| short_gps(payload.len()))?,
        })
    }
}

fn short_gps(len: usize) -> DroneError {
    DroneError::MalformedPacket(format!("gps block truncated at {len} bytes"))
}

/// One decoded telemetry datagram.
#[derive(Debug, Clone, PartialEq)]
pub struct NavdataPacket {
    pub header: u32,
    pub state: DroneState,
    pub sequence: u32,
    pub vision_flag: u32,
    pub demo: Option<DemoData>,
    pub vision_detect: Option<VisionDetectData>,
    pub gps: Option<GpsData>,
    /// Option ids and sizes this decoder does not understand, kept for
    /// diagnostic visibility.
    pub unsupported_options: Vec<(u16, u16)>,
}

/// Decodes one navdata datagram. Pure; a short trailing read ends the packet,
/// an option whose declared size overruns the buffer is an error.
pub fn decode(buff: &[u8]) -> Result<NavdataPacket> {
    if buff.len() < HEADER_LEN {
        return Err(DroneError::MalformedPacket(format!(
            "{} bytes received, {HEADER_LEN}-byte header expected",
            buff.len()
        )));
    }
    let mut packet = NavdataPacket {
        header: utils::get_u32(buff, 0)?,
        state: DroneState::from_word(utils::get_u32(buff, 4)?),
        sequence: utils::get_u32(buff, 8)?,
        vision_flag: utils::get_u32(buff, 12)?,
        demo: None,
        vision_detect: None,
        gps: None,
        unsupported_options: Vec::new(),
    };

    let mut offset = HEADER_LEN;
    while buff.len() - offset >= OPTION_HEADER_LEN {
        let id = utils::get_u16(buff, offset)?;
        let size = utils::get_u16(buff, offset + 2)? as usize;
        if size < OPTION_HEADER_LEN {
            return Err(DroneError::MalformedPacket(format!(
                "option {id} declares size {size}, smaller than its own header"
            )));
        }
        if offset + size > buff.len() {
            return Err(DroneError::MalformedPacket(format!(
                "option {id} declares {size} bytes with only {} remaining",
                buff.len() - offset
            )));
        }
        let payload = &buff[offset + OPTION_HEADER_LEN..offset + size];
        match id {
            OPTION_DEMO => packet.demo = Some(DemoData::decode(id, payload)?),
            OPTION_VISION_DETECT => {
                packet.vision_detect = Some(VisionDetectData::decode(id, payload)?)
            }
            OPTION_GPS => packet.gps = Some(GpsData::decode(id, payload)?),
            OPTION_CHECKSUM => {}
            _ => packet.unsupported_options.push((id, size as u16)),
        }
        offset += size;
    }
    Ok(packet)
}
