// ── Substitutions ──
//
// Flat `substitutions:` block of a device file. Three keys are required
// (`device_name`, `fixed_mac`, `device_static_ip`); the per-port keys
// follow the `po{n}device` / `pi{n}device` / `pi{n}swstate` pattern.
// Unknown keys are carried through in file order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Number of output (and input) ports on the board.
pub const PORT_COUNT: u8 = 16;

pub const DEVICE_NAME: &str = "device_name";
pub const FIXED_MAC: &str = "fixed_mac";
pub const DEVICE_STATIC_IP: &str = "device_static_ip";

/// A validated 1-based port number in `1..=PORT_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortIndex(u8);

impl PortIndex {
    pub fn new(n: u8) -> Option<Self> {
        (1..=PORT_COUNT).contains(&n).then_some(Self(n))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Every port, in order.
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=PORT_COUNT).map(Self)
    }
}

/// Ordered substitution variables for one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Substitutions(#[serde(with = "super::tagged::map")] IndexMap<String, Value>);

impl Substitutions {
    pub fn new(device_name: impl Into<String>, mac: impl Into<String>, ip: impl Into<String>) -> Self {
        let mut subs = Self::default();
        subs.set(DEVICE_NAME, Value::String(device_name.into()));
        subs.set(FIXED_MAC, Value::String(mac.into()));
        subs.set(DEVICE_STATIC_IP, Value::String(ip.into()));
        subs
    }

    // ── Generic access ───────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Insert or replace; a replaced key keeps its position.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn str_value(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    // ── Required keys ────────────────────────────────────────────────

    /// Primary identifier of the device. Empty when absent or not a string.
    pub fn device_name(&self) -> &str {
        self.str_value(DEVICE_NAME).unwrap_or_default()
    }

    pub fn fixed_mac(&self) -> &str {
        self.str_value(FIXED_MAC).unwrap_or_default()
    }

    pub fn device_static_ip(&self) -> &str {
        self.str_value(DEVICE_STATIC_IP).unwrap_or_default()
    }

    // ── Per-port keys ────────────────────────────────────────────────

    pub fn output_device(&self, port: PortIndex) -> Option<&str> {
        self.str_value(&output_device_key(port))
    }

    pub fn set_output_device(&mut self, port: PortIndex, device: impl Into<String>) {
        self.set(output_device_key(port), Value::String(device.into()));
    }

    pub fn input_device(&self, port: PortIndex) -> Option<&str> {
        self.str_value(&input_device_key(port))
    }

    pub fn set_input_device(&mut self, port: PortIndex, device: impl Into<String>) {
        self.set(input_device_key(port), Value::String(device.into()));
    }

    pub fn input_switch_state(&self, port: PortIndex) -> Option<&str> {
        self.str_value(&input_switch_state_key(port))
    }

    pub fn set_input_switch_state(&mut self, port: PortIndex, state: impl Into<String>) {
        self.set(input_switch_state_key(port), Value::String(state.into()));
    }
}

impl FromIterator<(String, Value)> for Substitutions {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn output_device_key(port: PortIndex) -> String {
    format!("po{}device", port.get())
}

fn input_device_key(port: PortIndex) -> String {
    format!("pi{}device", port.get())
}

fn input_switch_state_key(port: PortIndex) -> String {
    format!("pi{}swstate", port.get())
}
