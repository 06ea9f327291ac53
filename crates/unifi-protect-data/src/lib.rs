//! Data layer for UniFi Protect controllers.
//!
//! Owns the typed object graph (bootstrap, devices, events), the JSON and
//! binary WebSocket codecs, and the differential update engine that keeps
//! a bootstrap synchronized with the controller's packet stream. This
//! crate is pure: no sockets, no tasks. `unifi-protect-client` drives it.

pub mod bootstrap;
pub mod convert;
pub mod devices;
pub mod engine;
pub mod events;
pub mod ignore;
pub mod nvr;
pub mod types;
pub mod websocket;

mod error;

pub use bootstrap::{Bootstrap, ProtectObject};
pub use engine::{EngineConfig, SyncEngine, SyncMessage};
pub use error::{Error, Result};
pub use ignore::IgnoreTable;
pub use types::{EventType, ModelType, StateType, WsAction};
pub use websocket::{ActionFrame, WsPacket};
