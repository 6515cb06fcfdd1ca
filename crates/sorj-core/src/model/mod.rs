// ── Device configuration model ──
//
// Typed in-memory form of one managed ESPHome file for a KC868-A16
// expander board. Nothing here knows about YAML text; the codec turns
// these types into tagged trees and back.

pub mod config;
pub mod device;
pub mod package;
pub mod port;
pub mod substitutions;
mod tagged;

// ── Re-exports ──────────────────────────────────────────────────────

pub use config::{DeviceConfig, ParsedConfig, Validation};
pub use device::{Device, Section};
pub use package::{Include, Package, PackageKind};
pub use port::{InputPort, OutputPortLight, OutputPortSwitch, Port, Vars};
pub use substitutions::{PORT_COUNT, PortIndex, Substitutions};

// ── Fragment paths ──────────────────────────────────────────────────

/// Base package every board includes.
pub const BASE_FRAGMENT: &str = "packages/KINCONY-KC868-A16/base.yaml";
/// Output port driving a light entity.
pub const LIGHT_FRAGMENT: &str = "packages/KINCONY-KC868-A16/light_kincony.yaml";
/// Output port driving a switch entity.
pub const SWITCH_FRAGMENT: &str = "packages/KINCONY-KC868-A16/switch_kincony.yaml";
/// Input ports have no package file of their own.
pub const INPUT_FRAGMENT: &str = "None";
