// Supported configuration operations. Each setting expands to the firmware
// key/value strings sent inside AT*CONFIG; the spellings are part of the wire
// contract and must stay byte-for-byte stable.

use crate::error::{DroneError, Result};
use crate::navdata;

/// Keys accepted by the string-keyed configuration boundary.
pub const SUPPORTED_KEYS: [&str; 7] = [
    "activate_navdata",
    "activate_gps",
    "indoor",
    "outdoor",
    "nervosity_level",
    "max_altitude",
    "detect_tag",
];

// navdata_options masks built from the option ids the codec understands
const NAVDATA_OPTIONS: u32 = 1 << navdata::OPTION_DEMO | 1 << navdata::OPTION_VISION_DETECT;
const NAVDATA_OPTIONS_GPS: u32 = NAVDATA_OPTIONS | 1 << navdata::OPTION_GPS;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigSetting {
    /// Switch the full telemetry stream on (navdata_demo off) or back to the
    /// reduced demo stream.
    ActivateNavdata(bool),
    /// Request the GPS option in the telemetry stream.
    ActivateGps(bool),
    Indoor(bool),
    Outdoor(bool),
    /// Aggressiveness of the flight envelope, 0..=100.
    NervosityLevel(u32),
    /// Altitude ceiling in meters.
    MaxAltitude(u32),
    DetectTag(bool),
}

fn bool_str(v: bool) -> String {
    String::from(if v { "TRUE" } else { "FALSE" })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(DroneError::UnsupportedConfig(format!("{key}={value}"))),
    }
}

fn parse_num(key: &str, value: &str) -> Result<u32> {
    value
        .parse::<u32>()
        .map_err(|_| DroneError::UnsupportedConfig(format!("{key}={value}")))
}

impl ConfigSetting {
    pub fn key(&self) -> &'static str {
        match self {
            Self::ActivateNavdata(_) => "activate_navdata",
            Self::ActivateGps(_) => "activate_gps",
            Self::Indoor(_) => "indoor",
            Self::Outdoor(_) => "outdoor",
            Self::NervosityLevel(_) => "nervosity_level",
            Self::MaxAltitude(_) => "max_altitude",
            Self::DetectTag(_) => "detect_tag",
        }
    }

    /// String-keyed boundary for callers without compile-time settings, e.g.
    /// a CLI. Unknown keys fail before any network traffic happens.
    pub fn parse(key: &str, value: &str) -> Result<Self> {
        match key {
            "activate_navdata" => Ok(Self::ActivateNavdata(parse_bool(key, value)?)),
            "activate_gps" => Ok(Self::ActivateGps(parse_bool(key, value)?)),
            "indoor" => Ok(Self::Indoor(parse_bool(key, value)?)),
            "outdoor" => Ok(Self::Outdoor(parse_bool(key, value)?)),
            "nervosity_level" => Ok(Self::NervosityLevel(parse_num(key, value)?)),
            "max_altitude" => Ok(Self::MaxAltitude(parse_num(key, value)?)),
            "detect_tag" => Ok(Self::DetectTag(parse_bool(key, value)?)),
            other => Err(DroneError::UnsupportedConfig(other.to_string())),
        }
    }

    /// Expands the setting into the firmware `(argument, value)` pairs, in
    /// the order they must be sent.
    pub fn pairs(&self) -> Vec<(String, String)> {
        match *self {
            Self::ActivateNavdata(on) => {
                // navdata_demo FALSE selects the full stream
                vec![("general:navdata_demo".to_string(), bool_str(!on))]
            }
            Self::ActivateGps(on) => {
                let mask = if on { NAVDATA_OPTIONS_GPS } else { NAVDATA_OPTIONS };
                vec![("general:navdata_options".to_string(), mask.to_string())]
            }
            Self::Indoor(on) => outdoor_pairs(!on),
            Self::Outdoor(on) => outdoor_pairs(on),
            Self::NervosityLevel(level) => {
                let level = level.min(100);
                let euler_angle_max = 0.52 * level as f32 / 100.0;
                let vz_max = 200 + 18 * level;
                let yaw = 3.5 * level as f32 / 100.0;
                vec![
                    ("control:euler_angle_max".to_string(), format!("{euler_angle_max:.2}")),
                    ("control:control_vz_max".to_string(), vz_max.to_string()),
                    ("control:control_yaw".to_string(), format!("{yaw:.2}")),
                ]
            }
            Self::MaxAltitude(meters) => {
                vec![("control:altitude_max".to_string(), (meters * 1000).to_string())]
            }
            Self::DetectTag(on) => {
                let detect_type = if on { "10" } else { "3" };
                vec![("detect:detect_type".to_string(), detect_type.to_string())]
            }
        }
    }
}

fn outdoor_pairs(outdoor: bool) -> Vec<(String, String)> {
    vec![
        ("control:outdoor".to_string(), bool_str(outdoor)),
        ("control:flight_without_shell".to_string(), bool_str(outdoor)),
    ]
}
