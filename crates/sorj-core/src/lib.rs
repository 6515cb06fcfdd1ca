// sorj-core: Config codec, device registry and realtime state relay for SORJ light controllers.

pub mod codec;
pub mod config;
pub mod error;
pub mod manager;
pub mod model;
pub mod monitored;
pub mod registry;
pub mod relay;
pub mod store;
pub mod upstream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use codec::{CodecError, MANAGED_MARKER};
pub use config::{CredentialPolicy, ManagerConfig, TlsVerification, UpstreamConfig};
pub use error::CoreError;
pub use manager::{Manager, SavedConfig};
pub use relay::{RelaySession, StateUpdate};
pub use upstream::Upstream;

pub use model::{
    Device, DeviceConfig, Include, InputPort, OutputPortLight, OutputPortSwitch, Package,
    PackageKind, Port, PortIndex, Section, Substitutions, Validation,
};
