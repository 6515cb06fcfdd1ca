// ── Package slots ──
//
// Value of one entry under `packages:`. Typed ports where the include
// payload is recognisable, a generic include otherwise, and untagged
// entries carried verbatim.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use strum::{Display, EnumString};

use super::port::{InputPort, OutputPortLight, OutputPortSwitch, Port};

/// Kind tag carried by every package slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PackageKind {
    None,
    Light,
    Switch,
    Include,
}

/// Raw `!include` payload that did not resolve to a port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Include {
    /// `base: !include packages/.../base.yaml`
    Path(String),
    /// `!include { file: ..., vars: ... }` for an unknown fragment.
    Mapping(#[serde(with = "super::tagged::mapping")] Mapping),
}

impl Include {
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    /// The `file` this include points at, if any.
    pub fn file(&self) -> Option<&str> {
        match self {
            Self::Path(path) => Some(path),
            Self::Mapping(map) => map.get("file").and_then(Value::as_str),
        }
    }
}

/// One slot under `packages:`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Package {
    Include { payload: Include },
    /// Entry written without the include tag; kept as-is.
    Inline {
        #[serde(with = "super::tagged::value")]
        payload: Value,
    },
    #[serde(rename = "none")]
    Input(InputPort),
    Light(OutputPortLight),
    Switch(OutputPortSwitch),
}

impl Package {
    pub fn include(path: impl Into<String>) -> Self {
        Self::Include {
            payload: Include::path(path),
        }
    }

    pub fn kind(&self) -> PackageKind {
        match self {
            Self::Include { .. } | Self::Inline { .. } => PackageKind::Include,
            Self::Input(port) => port.kind(),
            Self::Light(port) => port.kind(),
            Self::Switch(port) => port.kind(),
        }
    }

    pub fn as_port(&self) -> Option<&dyn Port> {
        match self {
            Self::Input(port) => Some(port),
            Self::Light(port) => Some(port),
            Self::Switch(port) => Some(port),
            Self::Include { .. } | Self::Inline { .. } => None,
        }
    }

    /// Fragment file this slot includes, for typed ports and path includes.
    pub fn file(&self) -> Option<&str> {
        match self {
            Self::Include { payload } => payload.file(),
            Self::Inline { .. } => None,
            Self::Input(port) => Some(port.fragment()),
            Self::Light(port) => Some(port.fragment()),
            Self::Switch(port) => Some(port.fragment()),
        }
    }
}

impl From<InputPort> for Package {
    fn from(port: InputPort) -> Self {
        Self::Input(port)
    }
}

impl From<OutputPortLight> for Package {
    fn from(port: OutputPortLight) -> Self {
        Self::Light(port)
    }
}

impl From<OutputPortSwitch> for Package {
    fn from(port: OutputPortSwitch) -> Self {
        Self::Switch(port)
    }
}
