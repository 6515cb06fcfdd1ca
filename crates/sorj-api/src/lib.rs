// sorj-api: Async Rust client for the home-automation platform's REST and event-bus APIs

pub mod error;
pub mod rest;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use rest::RestClient;
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{BusEvent, EventStream, STATE_CHANGED};
