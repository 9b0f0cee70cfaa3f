pub mod api;
pub mod commands;
pub mod connection;
pub mod engine;
pub mod form;
pub mod render;
pub mod snapshot;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;

pub use api::{EndpointApi, ReqwestApi};
pub use commands::{CommandDispatcher, Confirm, RemoveOutcome};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState, ConnectionStats};
pub use engine::{DashboardEngine, EngineConfig};
pub use form::CreateForm;
pub use render::{DisplayTree, UiCommand};
pub use snapshot::SnapshotStatus;
pub use store::StateStore;
pub use transport::{PushTransport, WsTransport};
