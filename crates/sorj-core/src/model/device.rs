// ── `esphome:` section ──

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

/// Sub-device declared under `esphome.devices`. Keys other than the
/// three known ones are kept in `extra` and written back in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Mapping::is_empty",
        with = "super::tagged::mapping"
    )]
    pub extra: Mapping,
}

impl Device {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            area_id: None,
            extra: Mapping::new(),
        }
    }

    pub fn in_area(mut self, area_id: impl Into<String>) -> Self {
        self.area_id = Some(area_id.into());
        self
    }
}

/// The `esphome:` block: owning area, sub-devices, and any other keys
/// (`name`, `friendly_name`, ...) kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(
        default,
        skip_serializing_if = "Mapping::is_empty",
        with = "super::tagged::mapping"
    )]
    pub extra: Mapping,
}

impl Section {
    pub fn new(area: Option<String>) -> Self {
        Self {
            area,
            ..Self::default()
        }
    }
}
