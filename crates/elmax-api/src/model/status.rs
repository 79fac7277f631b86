// ── Enumerated endpoint states ──
//
// Panels report states as numeric codes; older firmware used Italian
// labels. Both are accepted. Anything else lands in `Unknown` with the raw
// value preserved, so new firmware states never break a snapshot.

use super::wire::{WireValue, wire_serde};

// ── AlarmArmStatus ──────────────────────────────────────────────────

/// Arming state of an area.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlarmArmStatus {
    NotArmed,
    ArmedP1,
    ArmedP2,
    ArmedP1P2,
    ArmedTotally,
    Unknown(WireValue),
}

impl AlarmArmStatus {
    pub fn from_wire(raw: WireValue) -> Self {
        let known = match &raw {
            WireValue::Code(0) => Some(Self::NotArmed),
            WireValue::Code(1) => Some(Self::ArmedP1),
            WireValue::Code(2) => Some(Self::ArmedP2),
            WireValue::Code(3) => Some(Self::ArmedP1P2),
            WireValue::Code(4) => Some(Self::ArmedTotally),
            WireValue::Label(label) => match label.trim().to_ascii_lowercase().as_str() {
                "dis" => Some(Self::NotArmed),
                "p1" => Some(Self::ArmedP1),
                "p2" => Some(Self::ArmedP2),
                "p1+p2" => Some(Self::ArmedP1P2),
                "totale" => Some(Self::ArmedTotally),
                _ => None,
            },
            WireValue::Code(_) => None,
        };
        known.unwrap_or(Self::Unknown(raw))
    }

    pub fn to_wire(&self) -> WireValue {
        match self {
            Self::NotArmed => WireValue::Code(0),
            Self::ArmedP1 => WireValue::Code(1),
            Self::ArmedP2 => WireValue::Code(2),
            Self::ArmedP1P2 => WireValue::Code(3),
            Self::ArmedTotally => WireValue::Code(4),
            Self::Unknown(raw) => raw.clone(),
        }
    }

    /// Any partial or total arming.
    pub fn is_armed(&self) -> bool {
        matches!(
            self,
            Self::ArmedP1 | Self::ArmedP2 | Self::ArmedP1P2 | Self::ArmedTotally
        )
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl Default for AlarmArmStatus {
    fn default() -> Self {
        Self::Unknown(WireValue::empty())
    }
}

wire_serde!(AlarmArmStatus);

// ── AlarmStatus ─────────────────────────────────────────────────────

const NOT_ARMED_TRIGGERED_LABEL: &str = "non inserita e zone aperte";

/// Alarm state of an area.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlarmStatus {
    /// Not armed, every zone closed: ready to arm.
    NotArmedNotTriggered,
    /// Not armed with open zones. Only ever reported as a label.
    NotArmedTriggered,
    /// Not armed and cannot be armed right now.
    NotArmedNotArmable,
    /// Armed, nothing happening.
    ArmedStandby,
    /// In alarm.
    Triggered,
    Unknown(WireValue),
}

impl AlarmStatus {
    pub fn from_wire(raw: WireValue) -> Self {
        let known = match &raw {
            WireValue::Code(0) => Some(Self::NotArmedNotTriggered),
            WireValue::Code(2) => Some(Self::NotArmedNotArmable),
            WireValue::Code(3) => Some(Self::ArmedStandby),
            WireValue::Code(4) => Some(Self::Triggered),
            WireValue::Label(label) => match label.trim().to_lowercase().as_str() {
                "non inserita e pronta all'inserimento" => Some(Self::NotArmedNotTriggered),
                label if label == NOT_ARMED_TRIGGERED_LABEL => Some(Self::NotArmedTriggered),
                "non inserita e non pronta all'inserimento" => Some(Self::NotArmedNotArmable),
                "inserita e a riposo" => Some(Self::ArmedStandby),
                "in allarme" => Some(Self::Triggered),
                _ => None,
            },
            WireValue::Code(_) => None,
        };
        known.unwrap_or(Self::Unknown(raw))
    }

    pub fn to_wire(&self) -> WireValue {
        match self {
            Self::NotArmedNotTriggered => WireValue::Code(0),
            Self::NotArmedTriggered => WireValue::Label(NOT_ARMED_TRIGGERED_LABEL.into()),
            Self::NotArmedNotArmable => WireValue::Code(2),
            Self::ArmedStandby => WireValue::Code(3),
            Self::Triggered => WireValue::Code(4),
            Self::Unknown(raw) => raw.clone(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl Default for AlarmStatus {
    fn default() -> Self {
        Self::Unknown(WireValue::empty())
    }
}

wire_serde!(AlarmStatus);

// ── CoverStatus ─────────────────────────────────────────────────────

/// Motion state of a cover.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CoverStatus {
    Idle,
    Up,
    Down,
    Unknown(WireValue),
}

impl CoverStatus {
    pub fn from_wire(raw: WireValue) -> Self {
        let known = match &raw {
            WireValue::Code(0) => Some(Self::Idle),
            WireValue::Code(1) => Some(Self::Up),
            WireValue::Code(2) => Some(Self::Down),
            WireValue::Label(label) => match label.trim().to_ascii_lowercase().as_str() {
                "idle" | "stop" => Some(Self::Idle),
                "up" => Some(Self::Up),
                "down" => Some(Self::Down),
                _ => None,
            },
            WireValue::Code(_) => None,
        };
        known.unwrap_or(Self::Unknown(raw))
    }

    pub fn to_wire(&self) -> WireValue {
        match self {
            Self::Idle => WireValue::Code(0),
            Self::Up => WireValue::Code(1),
            Self::Down => WireValue::Code(2),
            Self::Unknown(raw) => raw.clone(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl Default for CoverStatus {
    fn default() -> Self {
        Self::Unknown(WireValue::empty())
    }
}

wire_serde!(CoverStatus);
