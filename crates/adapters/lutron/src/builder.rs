//! Command builder — abstract zone commands to `#OUTPUT` / `?OUTPUT` frames.

use std::sync::LazyLock;

use bytes::Bytes;
use regex::bytes::Regex;

use homelink_app::ports::extension::CommandBuilder;
use homelink_domain::command::{Command, ZoneTarget};
use homelink_domain::device::Device;
use homelink_domain::error::{DecodeError, HubError};
use homelink_domain::zone::MAX_LEVEL;

use crate::protocol::ACTION_LEVEL;

static SET_LEVEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#OUTPUT,([^,\r\n]+),1,([^,\r\n]+)\r\n$").expect("set level pattern is valid")
});

static REQUEST_LEVEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\?OUTPUT,([^,\r\n]+),1\r\n$").expect("request level pattern is valid")
});

/// Query frame asking the bridge for a zone's level.
#[must_use]
pub fn request_level(address: &str) -> Bytes {
    Bytes::from(format!("?OUTPUT,{address},{ACTION_LEVEL}\r\n"))
}

fn set_level(address: &str, level: f32) -> Bytes {
    Bytes::from(format!("#OUTPUT,{address},{ACTION_LEVEL},{level:.2}\r\n"))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OutputCommandBuilder;

impl CommandBuilder for OutputCommandBuilder {
    fn build(&self, command: &Command) -> Result<Bytes, HubError> {
        let address = &command.target().address;
        let wire = match command {
            Command::ZoneSetLevel { level, .. } => set_level(address, *level),
            Command::ZoneTurnOn { .. } => set_level(address, MAX_LEVEL),
            Command::ZoneTurnOff { .. } => set_level(address, 0.0),
            Command::ZoneRequestLevel { .. } => request_level(address),
        };
        Ok(wire)
    }

    fn parse(&self, wire: &[u8], device: &Device) -> Result<Command, HubError> {
        if let Some(caps) = SET_LEVEL.captures(wire) {
            let target = target(device, &caps[1])?;
            let raw = String::from_utf8_lossy(&caps[2]).into_owned();
            let level: f32 = raw.parse().map_err(|_| DecodeError::InvalidLevel(raw))?;
            return Command::set_level(target, level);
        }
        if let Some(caps) = REQUEST_LEVEL.captures(wire) {
            let target = target(device, &caps[1])?;
            return Ok(Command::ZoneRequestLevel { target });
        }
        Err(DecodeError::Malformed.into())
    }
}

fn target(device: &Device, address: &[u8]) -> Result<ZoneTarget, HubError> {
    let address = String::from_utf8_lossy(address);
    device
        .zone_by_address(&address)
        .map(ZoneTarget::from)
        .ok_or_else(|| DecodeError::UnknownAddress(address.into_owned()).into())
}
