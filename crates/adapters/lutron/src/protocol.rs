//! Lutron integration protocol — `OUTPUT` frames.
//!
//! The bridge reports and accepts frames of the form
//! `<op>OUTPUT,<integration id>,<action>,<params…>\r\n` where `<op>` is `~`
//! (report), `#` (execute) or `?` (query). Action `1` carries a zone level.
//! `DEVICE` frames (keypad buttons, LEDs) are framed but not decoded.

use std::sync::LazyLock;

use regex::bytes::Regex;

use homelink_app::frame_scanner::ScannerConfig;
use homelink_app::producer::FrameDecoder;
use homelink_domain::device::Device;
use homelink_domain::error::{DecodeError, HubError};
use homelink_domain::event::Event;

/// Output action reporting or setting the zone level.
pub const ACTION_LEVEL: &str = "1";

/// Frame keywords recognized on the event stream.
pub const KEYWORDS: [&str; 2] = ["OUTPUT", "DEVICE"];

static OUTPUT_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[~#?]OUTPUT,([^,\r\n]+),([^,\r\n]+),([^\r\n]+)\r\n$")
        .expect("output frame pattern is valid")
});

/// Scanner settings for a bridge's monitoring stream.
#[must_use]
pub fn scanner_config() -> ScannerConfig {
    ScannerConfig::default().with_keywords(KEYWORDS)
}

/// Decodes `OUTPUT` level reports into [`Event::ZoneLevelChanged`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OutputDecoder;

impl FrameDecoder for OutputDecoder {
    fn decode(&self, frame: &[u8], device: &Device) -> Result<Option<Event>, HubError> {
        if frame.get(1..).is_some_and(|rest| rest.starts_with(b"DEVICE")) {
            return Ok(None);
        }
        let caps = OUTPUT_FRAME.captures(frame).ok_or(DecodeError::Malformed)?;
        let field = |i: usize| String::from_utf8_lossy(&caps[i]).into_owned();

        let action = field(2);
        if action != ACTION_LEVEL {
            tracing::trace!(%action, "ignoring output action");
            return Ok(None);
        }

        let address = field(1);
        let zone = device
            .zone_by_address(&address)
            .ok_or(DecodeError::UnknownAddress(address))?;

        let raw = field(3);
        let level: f32 = raw
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .parse()
            .map_err(|_| DecodeError::InvalidLevel(raw.clone()))?;

        Ok(Some(Event::ZoneLevelChanged {
            zone_id: zone.id,
            zone_name: zone.name.clone(),
            level,
        }))
    }
}

#[cfg(test)]
mod tests {
    use homelink_app::frame_scanner::FrameScanner;
    use homelink_domain::zone::Zone;

    use super::*;

    fn bridge() -> Device {
        Device::builder()
            .name("Bridge")
            .model("l-bdgpro2-wh")
            .zone(Zone::builder().address("3").name("Kitchen").build().unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn should_decode_level_report() {
        let device = bridge();
        let event = OutputDecoder
            .decode(b"~OUTPUT,3,1,75.00\r\n", &device)
            .unwrap()
            .unwrap();

        let kitchen = device.zone_by_address("3").unwrap();
        assert_eq!(
            event,
            Event::ZoneLevelChanged {
                zone_id: kitchen.id,
                zone_name: "Kitchen".to_string(),
                level: 75.0,
            }
        );
    }

    #[test]
    fn should_ignore_fade_and_delay_parameters() {
        let event = OutputDecoder
            .decode(b"~OUTPUT,3,1,40.5,00:02\r\n", &bridge())
            .unwrap();
        assert!(matches!(event, Some(Event::ZoneLevelChanged { level, .. }) if (level - 40.5).abs() < f32::EPSILON));
    }

    #[test]
    fn should_reject_unknown_address() {
        let result = OutputDecoder.decode(b"~OUTPUT,99,1,10.00\r\n", &bridge());
        assert!(matches!(
            result,
            Err(HubError::Decode(DecodeError::UnknownAddress(ref a))) if a == "99"
        ));
    }

    #[test]
    fn should_reject_non_numeric_level() {
        let result = OutputDecoder.decode(b"~OUTPUT,3,1,bright\r\n", &bridge());
        assert!(matches!(
            result,
            Err(HubError::Decode(DecodeError::InvalidLevel(_)))
        ));
    }

    #[test]
    fn should_skip_other_actions_and_device_frames() {
        let device = bridge();
        assert!(OutputDecoder
            .decode(b"~OUTPUT,3,29,6\r\n", &device)
            .unwrap()
            .is_none());
        assert!(OutputDecoder
            .decode(b"~DEVICE,1,2,3\r\n", &device)
            .unwrap()
            .is_none());
    }

    #[test]
    fn should_frame_bridge_chatter() {
        let mut scanner = FrameScanner::new(&scanner_config()).unwrap();
        scanner.push(b"GNET> \r\n~OUTPUT,3,1,0.00\r\n~DEVICE,1,4,3\r\n~ERROR,6\r\n");

        assert_eq!(
            scanner.next_frame().as_deref(),
            Some(&b"~OUTPUT,3,1,0.00\r\n"[..])
        );
        assert_eq!(
            scanner.next_frame().as_deref(),
            Some(&b"~DEVICE,1,4,3\r\n"[..])
        );
        assert!(scanner.next_frame().is_none());
    }

    #[test]
    fn should_decode_report_following_truncated_frame() {
        let device = bridge();
        let mut scanner = FrameScanner::new(&scanner_config()).unwrap();
        scanner.push(b"~OUTPUT,4,1,7~OUTPUT,3,1,50.00\r\n");

        let frame = scanner.next_frame().unwrap();
        let event = OutputDecoder.decode(&frame, &device).unwrap();

        assert!(matches!(
            event,
            Some(Event::ZoneLevelChanged { ref zone_name, level, .. })
                if zone_name == "Kitchen" && (level - 50.0).abs() < f32::EPSILON
        ));
    }
}
