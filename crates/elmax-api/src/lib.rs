// elmax-api: Async Rust client for Elmax alarm panels, via the cloud or the panel's local API (REST + push)

pub mod auth;
pub mod client;
pub mod error;
pub mod model;
pub mod push;
mod session;
pub mod transport;

pub use auth::{Credentials, SessionToken};
pub use client::{Backend, ClientConfig, DEFAULT_API_URL, DEFAULT_PANEL_CODE, ElmaxClient};
pub use error::Error;
pub use model::{
    AreaCommand, Command, CoverCommand, EndpointKind, EndpointStatus, PanelEntry, PanelStatus,
    SceneCommand, SwitchCommand,
};
pub use push::{ChannelState, HandlerId, PushHandler, PushListener, ReconnectConfig};
pub use transport::{TlsMode, TransportConfig, retrieve_server_certificate};
