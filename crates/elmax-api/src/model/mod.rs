// Elmax domain model
//
// Typed views of the cloud API payloads. Field names on the wire are
// Italian (`nome`, `aperta`, `tapparelle`, ...); the Rust side uses English
// names and `#[serde(rename)]` to bridge them.

mod command;
mod endpoint;
mod panel;
mod status;
pub(crate) mod wire;

pub use command::{AreaCommand, Command, CoverCommand, SceneCommand, SwitchCommand};
pub use endpoint::{Actuator, Area, Cover, Endpoint, EndpointKind, Group, Scene, Zone};
pub use panel::{EndpointStatus, PanelEntry, PanelName, PanelStatus};
pub use status::{AlarmArmStatus, AlarmStatus, CoverStatus};
pub use wire::WireValue;
