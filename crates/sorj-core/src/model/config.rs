// ── DeviceConfig aggregate ──
//
// One managed file: substitutions, package slots and the `esphome:`
// section, plus any other top-level keys. `substitutions.device_name`
// joins the config to its filename and to the device registry.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use super::device::{Device, Section};
use super::package::Package;
use super::substitutions::{DEVICE_NAME, DEVICE_STATIC_IP, FIXED_MAC, Substitutions};
use super::BASE_FRAGMENT;

/// Slot name of the mandatory base include.
pub const BASE_SLOT: &str = "base";

/// Structural problems found while normalising a parsed tree.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("`{field}` must be a mapping")]
    NotAMapping { field: &'static str },

    #[error("`esphome.devices` must be a sequence")]
    DevicesNotSequence,

    #[error("invalid entry {index} in `esphome.devices`: {reason}")]
    Device { index: usize, reason: String },
}

/// Top-level pieces of a parsed file, packages already resolved.
#[derive(Debug, Default)]
pub struct ParsedConfig {
    pub substitutions: Option<Value>,
    pub packages: IndexMap<String, Package>,
    pub esphome: Option<Value>,
    pub extra: Mapping,
}

/// Typed form of one managed device file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub substitutions: Substitutions,
    #[serde(default)]
    pub packages: IndexMap<String, Package>,
    #[serde(default)]
    pub esphome: Section,
    #[serde(
        default,
        skip_serializing_if = "Mapping::is_empty",
        with = "super::tagged::mapping"
    )]
    pub extra: Mapping,
}

/// Advisory validation outcome. Never blocks a save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub is_valid: bool,
    pub messages: Vec<String>,
}

impl DeviceConfig {
    /// Fresh config for a new board, with the base package slot filled in.
    pub fn new(
        device_name: impl Into<String>,
        mac: impl Into<String>,
        ip: impl Into<String>,
        area: Option<String>,
    ) -> Self {
        let mut packages = IndexMap::new();
        packages.insert(BASE_SLOT.to_owned(), Package::include(BASE_FRAGMENT));
        Self {
            substitutions: Substitutions::new(device_name, mac, ip),
            packages,
            esphome: Section::new(area),
            extra: Mapping::new(),
        }
    }

    /// Normalise a parsed tree into the typed aggregate.
    ///
    /// Every key under `substitutions` is kept, `esphome.devices` entries
    /// become [`Device`] records, and packages are taken as resolved.
    pub fn from_parsed(raw: ParsedConfig) -> Result<Self, ShapeError> {
        let substitutions = match raw.substitutions {
            None => Substitutions::default(),
            Some(Value::Mapping(map)) => map
                .into_iter()
                .filter_map(|(key, value)| key_string(key).map(|key| (key, value)))
                .collect(),
            Some(_) => {
                return Err(ShapeError::NotAMapping {
                    field: "substitutions",
                });
            }
        };

        let esphome = match raw.esphome {
            None => Section::default(),
            Some(Value::Mapping(map)) => section_from_mapping(map)?,
            Some(_) => return Err(ShapeError::NotAMapping { field: "esphome" }),
        };

        Ok(Self {
            substitutions,
            packages: raw.packages,
            esphome,
            extra: raw.extra,
        })
    }

    pub fn device_name(&self) -> &str {
        self.substitutions.device_name()
    }

    /// Insert or replace a package slot.
    pub fn set_package(&mut self, slot: impl Into<String>, package: impl Into<Package>) {
        self.packages.insert(slot.into(), package.into());
    }

    pub fn validate(&self) -> Validation {
        let mut messages = Vec::new();

        for (key, value) in [
            (DEVICE_NAME, self.substitutions.device_name()),
            (FIXED_MAC, self.substitutions.fixed_mac()),
            (DEVICE_STATIC_IP, self.substitutions.device_static_ip()),
        ] {
            if value.trim().is_empty() {
                messages.push(format!("substitutions.{key} is required"));
            }
        }

        let has_base = self.packages.values().any(|pkg| {
            pkg.file()
                .is_some_and(|file| file.to_ascii_lowercase().contains("base.yaml"))
        });
        if !has_base {
            messages.push(format!("packages is missing the base include ({BASE_FRAGMENT})"));
        }

        for (slot, package) in &self.packages {
            if let Some(port) = package.as_port() {
                let missing = port.missing_vars();
                if !missing.is_empty() {
                    messages.push(format!(
                        "packages.{slot} is missing vars: {}",
                        missing.join(", ")
                    ));
                }
            }
        }

        for (index, device) in self.esphome.devices.iter().enumerate() {
            if device.id.trim().is_empty() {
                messages.push(format!("esphome.devices[{index}] has an empty id"));
            }
        }

        Validation {
            is_valid: messages.is_empty(),
            messages,
        }
    }
}

fn key_string(key: Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => {
            tracing::warn!(key = ?other, "Dropping non-scalar substitution key");
            None
        }
    }
}

fn section_from_mapping(map: Mapping) -> Result<Section, ShapeError> {
    let mut section = Section::default();
    for (key, value) in map {
        match key.as_str() {
            Some("area") if value.is_string() => {
                section.area = value.as_str().map(str::to_owned);
            }
            Some("devices") => section.devices = devices_from_value(value)?,
            _ => {
                section.extra.insert(key, value);
            }
        }
    }
    Ok(section)
}

fn devices_from_value(value: Value) -> Result<Vec<Device>, ShapeError> {
    let Value::Sequence(items) = value else {
        return Err(ShapeError::DevicesNotSequence);
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| device_from_value(index, item))
        .collect()
}

fn device_from_value(index: usize, item: Value) -> Result<Device, ShapeError> {
    let Value::Mapping(map) = item else {
        return Err(ShapeError::Device {
            index,
            reason: "must be a mapping".into(),
        });
    };
    let mut device = Device::default();
    for (key, value) in map {
        let label = key.as_str().map(str::to_owned);
        match (label.as_deref(), value) {
            (Some("id"), Value::String(id)) => device.id = id,
            (Some("name"), Value::String(name)) => device.name = name,
            (Some("area_id"), Value::String(area_id)) => device.area_id = Some(area_id),
            (Some(field @ ("id" | "name" | "area_id")), _) => {
                return Err(ShapeError::Device {
                    index,
                    reason: format!("`{field}` must be a string"),
                });
            }
            (_, value) => {
                device.extra.insert(key, value);
            }
        }
    }
    Ok(device)
}
