// ── `!include` resolution ──
//
// Decides from a payload's shape which package it is, and turns a
// package back into the payload to write. One ordered rule table; the
// first rule whose predicate matches wins.

use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::{Mapping, Value};

use crate::model::port::Vars;
use crate::model::{
    INPUT_FRAGMENT, Include, InputPort, OutputPortLight, OutputPortSwitch, Package, Port,
};

/// The one custom tag in the file vocabulary.
pub const INCLUDE_TAG: &str = "!include";

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("`!include` payload must be a string or a mapping, found {found}")]
    UnsupportedPayload { found: &'static str },

    #[error("`vars` of the {fragment} include must be a mapping")]
    VarsNotMapping { fragment: &'static str },

    #[error("{fragment} include is missing required vars: {}", missing.join(", "))]
    MissingVars {
        fragment: &'static str,
        missing: Vec<&'static str>,
    },
}

// ── Rule table ───────────────────────────────────────────────────────

struct Rule {
    name: &'static str,
    matches: fn(&Value) -> bool,
    construct: fn(Value) -> Result<Package, ResolveError>,
    represent: fn(&Package) -> Option<Value>,
}

const RULES: &[Rule] = &[
    Rule {
        name: "path",
        matches: Value::is_string,
        construct: construct_path,
        represent: represent_path,
    },
    Rule {
        name: "light",
        matches: |node| file_segment_is(node, "light_kincony.yaml"),
        construct: construct_light,
        represent: |pkg| match pkg {
            Package::Light(port) => Some(port_node(port)),
            _ => None,
        },
    },
    Rule {
        name: "switch",
        matches: |node| file_segment_is(node, "switch_kincony.yaml"),
        construct: construct_switch,
        represent: |pkg| match pkg {
            Package::Switch(port) => Some(port_node(port)),
            _ => None,
        },
    },
    Rule {
        name: "input",
        matches: |node| file_of(node) == Some(INPUT_FRAGMENT),
        construct: construct_input,
        represent: |pkg| match pkg {
            Package::Input(port) => Some(port_node(port)),
            _ => None,
        },
    },
    Rule {
        name: "mapping",
        matches: Value::is_mapping,
        construct: construct_mapping,
        represent: represent_mapping,
    },
];

// ── Public API ───────────────────────────────────────────────────────

/// Resolve the payload of an `!include` node.
pub fn resolve(payload: Value) -> Result<Package, ResolveError> {
    let Some(rule) = RULES.iter().find(|rule| (rule.matches)(&payload)) else {
        return Err(ResolveError::UnsupportedPayload {
            found: kind_name(&payload),
        });
    };
    tracing::trace!(rule = rule.name, "resolved include payload");
    (rule.construct)(payload)
}

/// Resolve one entry under `packages:`. Untagged entries, and entries
/// carrying some other tag, are kept verbatim as [`Package::Inline`].
pub fn resolve_node(node: Value) -> Result<Package, ResolveError> {
    match node {
        Value::Tagged(tagged) if tagged.tag == INCLUDE_TAG => resolve(tagged.value),
        other => Ok(Package::Inline { payload: other }),
    }
}

/// Payload that [`resolve`] maps back to `package`.
///
/// Returns `None` only for [`Package::Inline`], which has no include payload.
pub fn represent(package: &Package) -> Option<Value> {
    RULES.iter().find_map(|rule| (rule.represent)(package))
}

/// Full node to write for `package`, tag included.
pub fn represent_node(package: &Package) -> Value {
    match (package, represent(package)) {
        (Package::Inline { payload }, _) => payload.clone(),
        (_, Some(payload)) => Value::Tagged(Box::new(TaggedValue {
            tag: Tag::new(INCLUDE_TAG),
            value: payload,
        })),
        (_, None) => Value::Null,
    }
}

// ── Predicates ───────────────────────────────────────────────────────

fn file_of(node: &Value) -> Option<&str> {
    node.as_mapping()?.get("file")?.as_str()
}

/// Last path segment of `file`, compared case-insensitively.
fn file_segment_is(node: &Value, segment: &str) -> bool {
    file_of(node)
        .and_then(|file| file.rsplit(['/', '\\']).next())
        .is_some_and(|last| last.eq_ignore_ascii_case(segment))
}

fn kind_name(node: &Value) -> &'static str {
    match node {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

// ── Constructors ─────────────────────────────────────────────────────

fn construct_path(node: Value) -> Result<Package, ResolveError> {
    match node {
        Value::String(path) => Ok(Package::Include {
            payload: Include::Path(path),
        }),
        other => Err(ResolveError::UnsupportedPayload {
            found: kind_name(&other),
        }),
    }
}

fn construct_mapping(node: Value) -> Result<Package, ResolveError> {
    match node {
        Value::Mapping(map) => Ok(Package::Include {
            payload: Include::Mapping(map),
        }),
        other => Err(ResolveError::UnsupportedPayload {
            found: kind_name(&other),
        }),
    }
}

fn construct_light(node: Value) -> Result<Package, ResolveError> {
    let port = OutputPortLight::from_vars(take_vars(node, "light")?);
    require(port, "light").map(Package::Light)
}

fn construct_switch(node: Value) -> Result<Package, ResolveError> {
    let port = OutputPortSwitch::from_vars(take_vars(node, "switch")?);
    require(port, "switch").map(Package::Switch)
}

fn construct_input(node: Value) -> Result<Package, ResolveError> {
    let port = InputPort::from_vars(take_vars(node, "input")?);
    require(port, "input").map(Package::Input)
}

/// Pull `vars` out of an include mapping. A missing `vars` is an empty set.
fn take_vars(node: Value, fragment: &'static str) -> Result<Vars, ResolveError> {
    let Value::Mapping(mut map) = node else {
        return Err(ResolveError::VarsNotMapping { fragment });
    };
    match map.remove("vars") {
        None | Some(Value::Null) => Ok(Vars::new()),
        Some(Value::Mapping(vars)) => vars
            .into_iter()
            .map(|(key, value)| match key {
                Value::String(key) => Ok((key, value)),
                _ => Err(ResolveError::VarsNotMapping { fragment }),
            })
            .collect(),
        Some(_) => Err(ResolveError::VarsNotMapping { fragment }),
    }
}

fn require<P: Port>(port: P, fragment: &'static str) -> Result<P, ResolveError> {
    let missing = port.missing_vars();
    if missing.is_empty() {
        Ok(port)
    } else {
        Err(ResolveError::MissingVars { fragment, missing })
    }
}

// ── Representers ─────────────────────────────────────────────────────

fn represent_path(package: &Package) -> Option<Value> {
    match package {
        Package::Include {
            payload: Include::Path(path),
        } => Some(Value::String(path.clone())),
        _ => None,
    }
}

fn represent_mapping(package: &Package) -> Option<Value> {
    match package {
        Package::Include {
            payload: Include::Mapping(map),
        } => Some(Value::Mapping(map.clone())),
        _ => None,
    }
}

/// `{file: <fixed fragment>, vars: <vars>}`, nothing else.
fn port_node(port: &dyn Port) -> Value {
    let vars: Mapping = port
        .vars()
        .iter()
        .map(|(key, value)| (Value::String(key.clone()), value.clone()))
        .collect();

    let mut node = Mapping::new();
    node.insert(Value::from("file"), Value::from(port.fragment()));
    node.insert(Value::from("vars"), Value::Mapping(vars));
    Value::Mapping(node)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{BASE_FRAGMENT, LIGHT_FRAGMENT, SWITCH_FRAGMENT};
    use pretty_assertions::assert_eq;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn bare_string_is_path_include() {
        let pkg = resolve(Value::from(BASE_FRAGMENT)).unwrap();
        assert_eq!(pkg, Package::include(BASE_FRAGMENT));
    }

    #[test]
    fn light_matches_on_last_segment_case_insensitive() {
        let pkg = resolve(yaml(
            "file: Packages/Other/LIGHT_KINCONY.YAML\nvars:\n  po_id: po1\n  po_name: Ceiling\n  po_device: kitchen_ceiling\n  po_hub_id: hub1\n  po_ph_id: 1\n",
        ))
        .unwrap();
        assert_eq!(
            pkg,
            Package::Light(OutputPortLight::new("po1", "Ceiling", "kitchen_ceiling", "hub1", 1))
        );
    }

    #[test]
    fn light_in_a_directory_named_like_fragment_is_not_light() {
        let pkg = resolve(yaml("file: light_kincony.yaml/other.yaml\nvars: {}\n")).unwrap();
        assert!(matches!(pkg, Package::Include { payload: Include::Mapping(_) }));
    }

    #[test]
    fn switch_with_optional_vars() {
        let pkg = resolve(yaml(&format!(
            "file: {SWITCH_FRAGMENT}\nvars:\n  po_id: po2\n  po_name: Pump\n  po_icon: mdi:water-pump\n"
        )))
        .unwrap();
        let Package::Switch(port) = pkg else {
            panic!("expected switch");
        };
        assert_eq!(port.icon(), Some("mdi:water-pump"));
        assert_eq!(port.device_class(), None);
    }

    #[test]
    fn none_file_is_input_port() {
        let pkg = resolve(yaml("file: None\nvars:\n  po_id: pi1\n")).unwrap();
        assert_eq!(pkg, Package::Input(InputPort::new("pi1")));
    }

    #[test]
    fn unknown_mapping_is_generic_include() {
        let node = yaml("file: packages/custom/thing.yaml\nvars:\n  x: 1\n");
        let pkg = resolve(node.clone()).unwrap();
        let Package::Include {
            payload: Include::Mapping(map),
        } = &pkg
        else {
            panic!("expected mapping include");
        };
        assert_eq!(Value::Mapping(map.clone()), node);
    }

    #[test]
    fn light_missing_required_vars_fails() {
        let err = resolve(yaml(&format!(
            "file: {LIGHT_FRAGMENT}\nvars:\n  po_id: po1\n  po_name: Ceiling\n"
        )))
        .unwrap_err();
        match err {
            ResolveError::MissingVars { fragment, missing } => {
                assert_eq!(fragment, "light");
                assert_eq!(missing, ["po_device", "po_hub_id", "po_ph_id"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn scalar_vars_fail() {
        let err = resolve(yaml(&format!("file: {SWITCH_FRAGMENT}\nvars: oops\n"))).unwrap_err();
        assert!(matches!(err, ResolveError::VarsNotMapping { fragment: "switch" }));
    }

    #[test]
    fn sequences_and_numbers_are_rejected() {
        assert!(matches!(
            resolve(yaml("[a, b]")),
            Err(ResolveError::UnsupportedPayload { found: "a sequence" })
        ));
        assert!(matches!(
            resolve(Value::from(3)),
            Err(ResolveError::UnsupportedPayload { found: "a number" })
        ));
    }

    #[test]
    fn ports_represent_as_file_and_vars_only() {
        let light = Package::Light(OutputPortLight::new("po1", "Ceiling", "dev", "hub", 3));
        assert_eq!(
            represent(&light).unwrap(),
            yaml(&format!(
                "file: {LIGHT_FRAGMENT}\nvars:\n  po_id: po1\n  po_name: Ceiling\n  po_device: dev\n  po_hub_id: hub\n  po_ph_id: 3\n"
            ))
        );
    }

    #[test]
    fn switch_without_icon_has_no_icon_key() {
        let switch = Package::Switch(OutputPortSwitch::new("po2", "Pump"));
        let node = represent(&switch).unwrap();
        let vars = node.get("vars").and_then(Value::as_mapping).unwrap();
        assert!(!vars.contains_key("po_icon"));
        assert!(!vars.contains_key("po_device_class"));
    }

    #[test]
    fn every_variant_round_trips() {
        let packages = [
            Package::include(BASE_FRAGMENT),
            resolve(yaml("file: packages/custom/thing.yaml\nvars:\n  x: 1\n")).unwrap(),
            Package::Input(InputPort::new("pi4")),
            Package::Light(OutputPortLight::new("po1", "Ceiling", "dev", "hub", 1)),
            Package::Switch(
                OutputPortSwitch::new("po2", "Pump")
                    .with_icon("mdi:pump")
                    .with_device_class("outlet"),
            ),
            Package::Switch(OutputPortSwitch::new("po3", "Fan")),
        ];
        for package in packages {
            let node = represent(&package).unwrap();
            assert_eq!(resolve(node.clone()).unwrap(), package);
            assert_eq!(represent(&resolve(node.clone()).unwrap()).unwrap(), node);
        }
    }

    #[test]
    fn untagged_nodes_are_inline() {
        let node = yaml("wifi:\n  ssid: home\n");
        assert_eq!(
            resolve_node(node.clone()).unwrap(),
            Package::Inline { payload: node }
        );
    }

    #[test]
    fn tagged_node_round_trip() {
        let node: Value = serde_yaml::from_str("!include packages/KINCONY-KC868-A16/base.yaml").unwrap();
        let pkg = resolve_node(node.clone()).unwrap();
        assert_eq!(pkg, Package::include(BASE_FRAGMENT));
        assert_eq!(represent_node(&pkg), node);
    }
}
