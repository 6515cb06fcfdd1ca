// ── Managed-file codec ──
//
// Text ⇄ DeviceConfig. Enforces the marker line, prunes null values and
// empty sequences on both sides, and routes `packages:` entries through
// the include resolver.

pub mod resolver;

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

use crate::model::config::ShapeError;
use crate::model::{Device, DeviceConfig, Package, ParsedConfig, Section};
use resolver::ResolveError;

/// Sentinel first line of every file this tool may load or overwrite.
pub const MANAGED_MARKER: &str = "#light_controller_managed_config";

const SUBSTITUTIONS: &str = "substitutions";
const PACKAGES: &str = "packages";
const ESPHOME: &str = "esphome";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("file does not start with the managed-config marker")]
    MissingMarker,

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("document root must be a mapping")]
    NotAMapping,

    #[error("`packages` must be a mapping")]
    PackagesNotMapping,

    #[error("package `{slot}`: {source}")]
    Resolve {
        slot: String,
        #[source]
        source: ResolveError,
    },

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// True when `line` is the marker, ignoring surrounding whitespace and a BOM.
pub fn is_marker_line(line: &str) -> bool {
    line.trim_start_matches('\u{feff}').trim() == MANAGED_MARKER
}

/// True when the first line of `text` is the marker.
pub fn has_marker(text: &str) -> bool {
    text.lines().next().is_some_and(is_marker_line)
}

// ── Load ─────────────────────────────────────────────────────────────

/// Parse a managed file.
pub fn load(text: &str) -> Result<DeviceConfig, CodecError> {
    if !has_marker(text) {
        return Err(CodecError::MissingMarker);
    }

    let mut tree: Value = serde_yaml::from_str(text)?;
    prune(&mut tree);

    let Value::Mapping(root) = tree else {
        return Err(CodecError::NotAMapping);
    };

    let mut parsed = ParsedConfig::default();
    for (key, value) in root {
        match key.as_str() {
            Some(SUBSTITUTIONS) => parsed.substitutions = Some(value),
            Some(ESPHOME) => parsed.esphome = Some(value),
            Some(PACKAGES) => parsed.packages = resolve_packages(value)?,
            _ => {
                parsed.extra.insert(key, value);
            }
        }
    }

    Ok(DeviceConfig::from_parsed(parsed)?)
}

fn resolve_packages(value: Value) -> Result<IndexMap<String, Package>, CodecError> {
    let Value::Mapping(map) = value else {
        return Err(CodecError::PackagesNotMapping);
    };
    map.into_iter()
        .map(|(key, node)| -> Result<(String, Package), CodecError> {
            let slot = match key {
                Value::String(slot) => slot,
                other => serde_yaml::to_string(&other)?.trim_end().to_owned(),
            };
            let package = resolver::resolve_node(node).map_err(|source| CodecError::Resolve {
                slot: slot.clone(),
                source,
            })?;
            Ok((slot, package))
        })
        .collect()
}

// ── Dump ─────────────────────────────────────────────────────────────

/// Serialise a config: marker line, then `substitutions`, `packages`,
/// `esphome`, then any preserved top-level keys.
pub fn dump(config: &DeviceConfig) -> Result<String, CodecError> {
    let mut tree = Value::Mapping(to_tree(config));
    prune(&mut tree);
    let body = serde_yaml::to_string(&tree)?;
    Ok(format!("{MANAGED_MARKER}\n{body}"))
}

fn to_tree(config: &DeviceConfig) -> Mapping {
    let mut root = Mapping::new();

    let substitutions: Mapping = config
        .substitutions
        .iter()
        .map(|(key, value)| (Value::String(key.clone()), value.clone()))
        .collect();
    root.insert(Value::from(SUBSTITUTIONS), Value::Mapping(substitutions));

    let packages: Mapping = config
        .packages
        .iter()
        .map(|(slot, package)| (Value::String(slot.clone()), resolver::represent_node(package)))
        .collect();
    root.insert(Value::from(PACKAGES), Value::Mapping(packages));

    root.insert(Value::from(ESPHOME), Value::Mapping(section_tree(&config.esphome)));

    for (key, value) in &config.extra {
        root.insert(key.clone(), value.clone());
    }
    root
}

fn section_tree(section: &Section) -> Mapping {
    let mut map = Mapping::new();
    if let Some(area) = &section.area {
        map.insert(Value::from("area"), Value::String(area.clone()));
    }
    let devices: Vec<Value> = section.devices.iter().map(device_tree).collect();
    map.insert(Value::from("devices"), Value::Sequence(devices));
    for (key, value) in &section.extra {
        map.insert(key.clone(), value.clone());
    }
    map
}

fn device_tree(device: &Device) -> Value {
    let mut map = Mapping::new();
    map.insert(Value::from("id"), Value::String(device.id.clone()));
    map.insert(Value::from("name"), Value::String(device.name.clone()));
    if let Some(area_id) = &device.area_id {
        map.insert(Value::from("area_id"), Value::String(area_id.clone()));
    }
    for (key, value) in &device.extra {
        map.insert(key.clone(), value.clone());
    }
    Value::Mapping(map)
}

// ── Pruning ──────────────────────────────────────────────────────────

/// Drop mapping entries whose value is null or an empty sequence, at any depth.
pub fn prune(node: &mut Value) {
    match node {
        Value::Mapping(map) => {
            for value in map.values_mut() {
                prune(value);
            }
            map.retain(|_, value| !is_prunable(value));
        }
        Value::Sequence(items) => items.iter_mut().for_each(prune),
        Value::Tagged(tagged) => prune(&mut tagged.value),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}

fn is_prunable(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Sequence(items) => items.is_empty(),
        _ => false,
    }
}
