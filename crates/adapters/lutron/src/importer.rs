//! Integration report importer.
//!
//! The bridge exports its configuration as JSON:
//!
//! ```json
//! { "LIPIdList": {
//!     "Devices": [{ "ID": 1, "Name": "Smart Bridge", "Buttons": [...] }],
//!     "Zones":   [{ "ID": 2, "Name": "Kitchen" }] } }
//! ```
//!
//! Zones become dimmer zones addressed by their integration id. Keypads and
//! remotes become button sensors. The bridge itself (id 1) is skipped.

use serde::Deserialize;

use homelink_app::ports::extension::Importer;
use homelink_domain::device::Device;
use homelink_domain::error::HubError;
use homelink_domain::sensor::{Sensor, SensorAttr, SensorDataType};
use homelink_domain::zone::{OutputKind, Zone, ZoneType};

use crate::error::LutronError;

const BRIDGE_ID: u32 = 1;

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(rename = "LIPIdList")]
    ids: IdList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IdList {
    #[serde(rename = "Devices")]
    devices: Vec<ReportDevice>,
    #[serde(rename = "Zones")]
    zones: Vec<ReportZone>,
}

#[derive(Debug, Deserialize)]
struct ReportDevice {
    #[serde(rename = "ID")]
    id: u32,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Buttons", default)]
    buttons: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ReportZone {
    #[serde(rename = "ID")]
    id: u32,
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReportImporter;

impl Importer for ReportImporter {
    #[tracing::instrument(skip_all, fields(device = %device.name))]
    fn import(&self, device: &mut Device, source: &str) -> Result<usize, HubError> {
        let report: Report = serde_json::from_str(source).map_err(LutronError::Report)?;

        let mut added = 0;
        for entry in report.ids.zones {
            let address = entry.id.to_string();
            if device.zone_by_address(&address).is_some() {
                tracing::debug!(%address, "zone already present");
                continue;
            }
            let zone = Zone::builder()
                .address(address)
                .name(entry.name)
                .zone_type(ZoneType::Light)
                .output(OutputKind::Continuous)
                .build()?;
            device.add_zone(zone)?;
            added += 1;
        }

        for entry in report.ids.devices {
            if entry.id == BRIDGE_ID || entry.buttons.is_empty() {
                continue;
            }
            let address = entry.id.to_string();
            if device.sensors.values().any(|s| s.address == address) {
                continue;
            }
            let attr = SensorAttr {
                name: "button".to_string(),
                data_type: SensorDataType::Int,
            };
            device.add_sensor(Sensor::new(address, entry.name, attr)?);
        }

        tracing::debug!(added, sensors = device.sensors.len(), "integration report read");
        Ok(added)
    }
}
