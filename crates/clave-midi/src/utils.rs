//! MIDI utility functions

/// 7-bit MIDI velocity to the 0..=1 range used by CLAP note events.
#[inline]
pub fn velocity_to_unit(velocity: u8) -> f64 {
    velocity.min(127) as f64 / 127.0
}

#[inline]
pub fn unit_to_velocity(value: f64) -> u8 {
    (value.clamp(0.0, 1.0) * 127.0).round() as u8
}

/// True for status bytes 0x80..=0xEF.
#[inline]
pub fn is_channel_voice_status(status: u8) -> bool {
    (0x80..0xF0).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_velocity_conversion() {
        assert_eq!(velocity_to_unit(0), 0.0);
        assert_eq!(velocity_to_unit(127), 1.0);
        assert_eq!(velocity_to_unit(200), 1.0, "out-of-range velocity clamps");
        assert_eq!(unit_to_velocity(1.0), 127);
        assert_eq!(unit_to_velocity(-3.0), 0);
        assert_eq!(unit_to_velocity(velocity_to_unit(100)), 100);
    }

    #[test]
    fn test_channel_voice_status() {
        assert!(is_channel_voice_status(0x80));
        assert!(is_channel_voice_status(0x9F));
        assert!(is_channel_voice_status(0xEF));
        assert!(!is_channel_voice_status(0x7F));
        assert!(!is_channel_voice_status(0xF0));
        assert!(!is_channel_voice_status(0xF8));
    }
}
