// ── Commands ──
//
// One enum per target type, wrapped in `Command`. The variant decides which
// endpoint kinds may receive it; see `Command::targets`.

use std::fmt;

use super::endpoint::EndpointKind;

/// Arm/disarm an area (or a group of areas).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AreaCommand {
    ArmP1,
    ArmP1P2,
    ArmP2,
    ArmTotally,
    Disarm,
}

impl AreaCommand {
    /// Path segment understood by the service.
    pub fn code(self) -> &'static str {
        match self {
            Self::ArmP1 => "1",
            Self::ArmP2 => "2",
            Self::ArmP1P2 => "3",
            Self::ArmTotally => "24",
            Self::Disarm => "0",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::ArmP1 => "ARM_P1",
            Self::ArmP1P2 => "ARM_P1_P2",
            Self::ArmP2 => "ARM_P2",
            Self::ArmTotally => "ARM_TOTALLY",
            Self::Disarm => "DISARM",
        }
    }
}

/// Move a cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoverCommand {
    Up,
    Down,
}

impl CoverCommand {
    pub fn code(self) -> &'static str {
        match self {
            Self::Up => "1",
            Self::Down => "2",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
        }
    }
}

/// Run a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneCommand {
    TriggerScene,
}

impl SceneCommand {
    pub fn code(self) -> &'static str {
        match self {
            Self::TriggerScene => "on",
        }
    }
}

/// Switch an output, or include/exclude a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchCommand {
    TurnOn,
    TurnOff,
}

impl SwitchCommand {
    pub fn code(self) -> &'static str {
        match self {
            Self::TurnOn => "on",
            Self::TurnOff => "off",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::TurnOn => "TURN_ON",
            Self::TurnOff => "TURN_OFF",
        }
    }
}

/// A request for one endpoint. Built per call and consumed by
/// [`ElmaxClient::execute_command`](crate::ElmaxClient::execute_command).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Area(AreaCommand),
    Cover(CoverCommand),
    Scene(SceneCommand),
    Switch(SwitchCommand),
}

impl Command {
    /// Path segment understood by the service.
    pub fn code(self) -> &'static str {
        match self {
            Self::Area(c) => c.code(),
            Self::Cover(c) => c.code(),
            Self::Scene(c) => c.code(),
            Self::Switch(c) => c.code(),
        }
    }

    /// Whether an endpoint of `kind` accepts this command.
    pub fn targets(self, kind: EndpointKind) -> bool {
        match self {
            Self::Area(_) => matches!(kind, EndpointKind::Area | EndpointKind::Group),
            Self::Cover(_) => kind == EndpointKind::Cover,
            Self::Scene(_) => kind == EndpointKind::Scene,
            Self::Switch(_) => matches!(kind, EndpointKind::Actuator | EndpointKind::Zone),
        }
    }

    /// Arming commands must carry the panel code.
    pub fn requires_code(self) -> bool {
        matches!(self, Self::Area(_))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Area(c) => write!(f, "AreaCommand::{}", c.name()),
            Self::Cover(c) => write!(f, "CoverCommand::{}", c.name()),
            Self::Scene(SceneCommand::TriggerScene) => f.write_str("SceneCommand::TRIGGER_SCENE"),
            Self::Switch(c) => write!(f, "SwitchCommand::{}", c.name()),
        }
    }
}

impl From<AreaCommand> for Command {
    fn from(c: AreaCommand) -> Self {
        Self::Area(c)
    }
}

impl From<CoverCommand> for Command {
    fn from(c: CoverCommand) -> Self {
        Self::Cover(c)
    }
}

impl From<SceneCommand> for Command {
    fn from(c: SceneCommand) -> Self {
        Self::Scene(c)
    }
}

impl From<SwitchCommand> for Command {
    fn from(c: SwitchCommand) -> Self {
        Self::Switch(c)
    }
}
