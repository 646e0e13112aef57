// Command grammar per the AR.Drone Developer Guide: plain ASCII lines,
// carriage-return terminated, sequence number as the first argument.

/// Token replaced by the decimal sequence number right before transmission.
pub(crate) const SEQ_PLACEHOLDER: &str = "#SEQ#";

/// Keepalive sent every transmitter tick. The firmware treats it specially
/// and does not require an increasing sequence number for it.
pub const WATCHDOG: &str = "AT*COMWDG=1\r";

// REF flag words. Bit 9 selects takeoff, bit 8 emergency; the high bits are
// mandated constant by the firmware.
pub const REF_TAKEOFF: u32 = 0b1_0001_0101_0100_0000_0010_0000_0000;
pub const REF_LAND: u32 = 0b1_0001_0101_0100_0000_0000_0000_0000;
pub const REF_EMERGENCY: u32 = 0b1_0001_0101_0100_0000_0001_0000_0000;

/// The firmware expects progressive-command floats as the signed integer
/// holding their IEEE-754 bit pattern.
pub fn f32_bits(v: f32) -> i32 {
    v.to_bits() as i32
}

#[must_use]
pub fn ref_command(flags: u32) -> String {
    format!("AT*REF={SEQ_PLACEHOLDER},{flags}\r")
}

#[must_use]
pub fn pcmd(left_right: f32, front_back: f32, up_down: f32, angle_change: f32) -> String {
    format!(
        "AT*PCMD={SEQ_PLACEHOLDER},1,{},{},{},{}\r",
        f32_bits(left_right),
        f32_bits(front_back),
        f32_bits(up_down),
        f32_bits(angle_change)
    )
}

#[must_use]
pub fn hover() -> String {
    format!("AT*PCMD={SEQ_PLACEHOLDER},0,0,0,0,0\r")
}

#[must_use]
pub fn flat_trim() -> String {
    format!("AT*FTRIM={SEQ_PLACEHOLDER}\r")
}

// Configuration commands carry an explicit sequence number: they are sent
// immediately under the channel lock, not queued for the transmitter.

#[must_use]
pub fn config(seq: u32, key: &str, value: &str) -> String {
    format!("AT*CONFIG={seq},\"{key}\",\"{value}\"\r")
}

#[must_use]
pub fn config_ids(seq: u32, session: &str, profile: &str, application: &str) -> String {
    format!("AT*CONFIG_IDS={seq},\"{session}\",\"{profile}\",\"{application}\"\r")
}

#[must_use]
pub fn control_ack(seq: u32) -> String {
    format!("AT*CTRL={seq},5,0\r")
}

#[must_use]
pub fn with_sequence(template: &str, seq: u32) -> String {
    template.replace(SEQ_PLACEHOLDER, &seq.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_flag_words() {
        assert_eq!(290718208, REF_TAKEOFF);
        assert_eq!(290717696, REF_LAND);
        assert_eq!(290717952, REF_EMERGENCY);
    }

    #[test]
    fn test_ref_command() {
        assert_eq!("AT*REF=#SEQ#,290718208\r", ref_command(REF_TAKEOFF));
        assert_eq!("AT*REF=#SEQ#,290717696\r", ref_command(REF_LAND));
    }

    #[test]
    fn test_float_bit_encoding() {
        assert_eq!(0, f32_bits(0.0));
        assert_eq!(1056964608, f32_bits(0.5));
        assert_eq!(1045220557, f32_bits(0.2));
        assert_eq!(-1085485875, f32_bits(-0.8));
    }

    #[test]
    fn test_pcmd() {
        assert_eq!("AT*PCMD=#SEQ#,1,0,0,0,-1085485875\r", pcmd(0.0, 0.0, 0.0, -0.8));
        assert_eq!("AT*PCMD=#SEQ#,1,1045220557,0,0,0\r", pcmd(0.2, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_hover_has_no_progressive_flag() {
        assert_eq!("AT*PCMD=#SEQ#,0,0,0,0,0\r", hover());
    }

    #[test]
    fn test_flat_trim() {
        assert_eq!("AT*FTRIM=#SEQ#\r", flat_trim());
    }

    #[test]
    fn test_config() {
        assert_eq!(
            "AT*CONFIG=600,\"general:navdata_demo\",\"FALSE\"\r",
            config(600, "general:navdata_demo", "FALSE")
        );
    }

    #[test]
    fn test_config_ids() {
        assert_eq!(
            "AT*CONFIG_IDS=601,\"0a1b2c3d\",\"4e5f6071\",\"8293a4b5\"\r",
            config_ids(601, "0a1b2c3d", "4e5f6071", "8293a4b5")
        );
    }

    #[test]
    fn test_control_ack() {
        assert_eq!("AT*CTRL=42,5,0\r", control_ack(42));
    }

    #[test]
    fn test_watchdog_literal() {
        assert_eq!("AT*COMWDG=1\r", WATCHDOG);
    }

    #[test]
    fn test_sequence_substitution_round_trip() {
        let template = ref_command(REF_LAND);
        let line = with_sequence(&template, 77);
        assert_eq!("AT*REF=77,290717696\r", line);
        // substitution touches only the placeholder position
        assert_eq!(template.replace("#SEQ#", "77"), line);
    }
}
