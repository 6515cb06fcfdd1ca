// ── Port packages ──
//
// One physical port's behaviour package. The fragment file each variant
// binds to is fixed by the type, never by data; only `vars` vary.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::package::PackageKind;
use super::{INPUT_FRAGMENT, LIGHT_FRAGMENT, SWITCH_FRAGMENT};

/// Ordered package variables, as written under `vars:`.
pub type Vars = IndexMap<String, Value>;

pub const PO_ID: &str = "po_id";
pub const PO_NAME: &str = "po_name";
pub const PO_DEVICE: &str = "po_device";
pub const PO_HUB_ID: &str = "po_hub_id";
pub const PO_PH_ID: &str = "po_ph_id";
pub const PO_ICON: &str = "po_icon";
pub const PO_DEVICE_CLASS: &str = "po_device_class";

/// Capabilities shared by every port variant.
pub trait Port {
    /// Package file this port includes.
    fn fragment(&self) -> &'static str;

    fn kind(&self) -> PackageKind;

    fn vars(&self) -> &Vars;

    /// Vars that must be present for the package to render.
    fn required_vars(&self) -> &'static [&'static str];

    fn var(&self, key: &str) -> Option<&Value> {
        self.vars().get(key)
    }

    /// Required vars that are absent or null.
    fn missing_vars(&self) -> Vec<&'static str> {
        self.required_vars()
            .iter()
            .copied()
            .filter(|key| self.var(key).is_none_or(Value::is_null))
            .collect()
    }
}

// ── InputPort ────────────────────────────────────────────────────────

/// Physical input. Carries only its port id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPort {
    #[serde(with = "super::tagged::map")]
    vars: Vars,
}

impl InputPort {
    pub const REQUIRED_VARS: &'static [&'static str] = &[PO_ID];

    pub fn new(po_id: impl Into<Value>) -> Self {
        let mut vars = Vars::new();
        vars.insert(PO_ID.into(), po_id.into());
        Self { vars }
    }

    /// Wrap vars read from a file. Callers check [`Self::REQUIRED_VARS`].
    pub fn from_vars(vars: Vars) -> Self {
        Self { vars }
    }
}

impl Port for InputPort {
    fn fragment(&self) -> &'static str {
        INPUT_FRAGMENT
    }

    fn kind(&self) -> PackageKind {
        PackageKind::None
    }

    fn vars(&self) -> &Vars {
        &self.vars
    }

    fn required_vars(&self) -> &'static [&'static str] {
        Self::REQUIRED_VARS
    }
}

// ── OutputPortLight ──────────────────────────────────────────────────

/// Output driving a light, linked to a hub device and a physical port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputPortLight {
    #[serde(with = "super::tagged::map")]
    vars: Vars,
}

impl OutputPortLight {
    pub const REQUIRED_VARS: &'static [&'static str] =
        &[PO_ID, PO_NAME, PO_DEVICE, PO_HUB_ID, PO_PH_ID];

    pub fn new(
        po_id: impl Into<Value>,
        po_name: impl Into<Value>,
        po_device: impl Into<Value>,
        po_hub_id: impl Into<Value>,
        po_ph_id: impl Into<Value>,
    ) -> Self {
        let mut vars = Vars::new();
        vars.insert(PO_ID.into(), po_id.into());
        vars.insert(PO_NAME.into(), po_name.into());
        vars.insert(PO_DEVICE.into(), po_device.into());
        vars.insert(PO_HUB_ID.into(), po_hub_id.into());
        vars.insert(PO_PH_ID.into(), po_ph_id.into());
        Self { vars }
    }

    pub fn from_vars(vars: Vars) -> Self {
        Self { vars }
    }
}

impl Port for OutputPortLight {
    fn fragment(&self) -> &'static str {
        LIGHT_FRAGMENT
    }

    fn kind(&self) -> PackageKind {
        PackageKind::Light
    }

    fn vars(&self) -> &Vars {
        &self.vars
    }

    fn required_vars(&self) -> &'static [&'static str] {
        Self::REQUIRED_VARS
    }
}

// ── OutputPortSwitch ─────────────────────────────────────────────────

/// Output exposed as a switch. Icon and device class are optional and
/// are left out of `vars` entirely until set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputPortSwitch {
    #[serde(with = "super::tagged::map")]
    vars: Vars,
}

impl OutputPortSwitch {
    pub const REQUIRED_VARS: &'static [&'static str] = &[PO_ID, PO_NAME];

    pub fn new(po_id: impl Into<Value>, po_name: impl Into<Value>) -> Self {
        let mut vars = Vars::new();
        vars.insert(PO_ID.into(), po_id.into());
        vars.insert(PO_NAME.into(), po_name.into());
        Self { vars }
    }

    pub fn from_vars(vars: Vars) -> Self {
        Self { vars }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.vars.insert(PO_ICON.into(), Value::String(icon.into()));
        self
    }

    pub fn with_device_class(mut self, device_class: impl Into<String>) -> Self {
        self.vars
            .insert(PO_DEVICE_CLASS.into(), Value::String(device_class.into()));
        self
    }

    pub fn icon(&self) -> Option<&str> {
        self.vars.get(PO_ICON).and_then(Value::as_str)
    }

    pub fn device_class(&self) -> Option<&str> {
        self.vars.get(PO_DEVICE_CLASS).and_then(Value::as_str)
    }
}

impl Port for OutputPortSwitch {
    fn fragment(&self) -> &'static str {
        SWITCH_FRAGMENT
    }

    fn kind(&self) -> PackageKind {
        PackageKind::Switch
    }

    fn vars(&self) -> &Vars {
        &self.vars
    }

    fn required_vars(&self) -> &'static [&'static str] {
        Self::REQUIRED_VARS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_without_optionals_has_only_required_vars() {
        let port = OutputPortSwitch::new("po2", "Garage Door");
        let keys: Vec<_> = port.vars().keys().map(String::as_str).collect();
        assert_eq!(keys, [PO_ID, PO_NAME]);
        assert_eq!(port.icon(), None);
        assert_eq!(port.device_class(), None);
    }

    #[test]
    fn switch_builders_add_optionals() {
        let port = OutputPortSwitch::new("po2", "Pump")
            .with_icon("mdi:water-pump")
            .with_device_class("outlet");
        assert_eq!(port.icon(), Some("mdi:water-pump"));
        assert_eq!(port.device_class(), Some("outlet"));
        assert_eq!(port.kind(), PackageKind::Switch);
        assert_eq!(port.fragment(), SWITCH_FRAGMENT);
    }

    #[test]
    fn light_keeps_numeric_physical_port() {
        let port = OutputPortLight::new("po1", "Ceiling", "kitchen_ceiling", "hub1", 1);
        assert_eq!(port.var(PO_PH_ID), Some(&Value::from(1)));
        assert!(port.missing_vars().is_empty());
    }

    #[test]
    fn missing_vars_reports_absent_and_null() {
        let mut vars = Vars::new();
        vars.insert(PO_ID.into(), Value::from("po5"));
        vars.insert(PO_NAME.into(), Value::Null);
        let port = OutputPortLight::from_vars(vars);
        assert_eq!(port.missing_vars(), [PO_NAME, PO_DEVICE, PO_HUB_ID, PO_PH_ID]);
    }

    #[test]
    fn input_port_binds_to_none_fragment() {
        let port = InputPort::new("pi1");
        assert_eq!(port.fragment(), "None");
        assert_eq!(port.kind(), PackageKind::None);
    }
}
