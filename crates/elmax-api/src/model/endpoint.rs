// ── Endpoints ──
//
// Every addressable part of a panel (area, zone, output, cover, scene,
// group) shares the same identity record. Specific types embed it with
// `#[serde(flatten)]` and add their own state.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::status::{AlarmArmStatus, AlarmStatus, CoverStatus};
use super::wire;

// ── EndpointKind ────────────────────────────────────────────────────

/// What sort of endpoint an id refers to.
///
/// Elmax endpoint ids have the shape `{panel}-{kind}-{index}`, with the
/// kind segment in Italian (`zona`, `uscita`, `tapparella`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Area,
    Zone,
    Actuator,
    Cover,
    Scene,
    Group,
}

impl EndpointKind {
    /// Infer the kind from an endpoint id. Returns `None` when the id does
    /// not follow the `{panel}-{kind}-{index}` convention.
    pub fn from_endpoint_id(endpoint_id: &str) -> Option<Self> {
        let mut parts = endpoint_id.rsplit('-');
        let index = parts.next()?;
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // Must be preceded by at least a panel segment.
        let segment = parts.next()?;
        parts.next()?;
        Self::from_segment(segment)
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment.to_ascii_lowercase().as_str() {
            "area" | "aree" => Some(Self::Area),
            "zona" | "zone" => Some(Self::Zone),
            "uscita" | "uscite" => Some(Self::Actuator),
            "tapparella" | "tapparelle" => Some(Self::Cover),
            "scenario" | "scenari" => Some(Self::Scene),
            "gruppo" | "gruppi" => Some(Self::Group),
            _ => None,
        }
    }

    /// The id segment the service uses for this kind.
    pub fn segment(self) -> &'static str {
        match self {
            Self::Area => "area",
            Self::Zone => "zona",
            Self::Actuator => "uscita",
            Self::Cover => "tapparella",
            Self::Scene => "scenario",
            Self::Group => "gruppo",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Area => "area",
            Self::Zone => "zone",
            Self::Actuator => "actuator",
            Self::Cover => "cover",
            Self::Scene => "scene",
            Self::Group => "group",
        };
        f.write_str(name)
    }
}

// ── Endpoint ────────────────────────────────────────────────────────

/// Identity shared by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "endpointId")]
    pub endpoint_id: String,
    #[serde(rename = "indice", default, deserialize_with = "wire::index")]
    pub index: u32,
    #[serde(rename = "nome", default, deserialize_with = "wire::text_or_empty")]
    pub name: String,
    #[serde(rename = "visibile", default, deserialize_with = "wire::boolean")]
    pub visible: bool,
}

impl Endpoint {
    pub fn kind(&self) -> Option<EndpointKind> {
        EndpointKind::from_endpoint_id(&self.endpoint_id)
    }
}

/// Access to the identity record embedded in every endpoint type.
pub(crate) trait HasEndpoint {
    fn endpoint(&self) -> &Endpoint;
}

macro_rules! has_endpoint {
    ($($ty:ty),+) => {
        $(impl HasEndpoint for $ty {
            fn endpoint(&self) -> &Endpoint {
                &self.endpoint
            }
        })+
    };
}

has_endpoint!(Area, Zone, Actuator, Cover, Scene, Group);

// ── Area ────────────────────────────────────────────────────────────

/// Arming partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    #[serde(flatten)]
    pub endpoint: Endpoint,
    #[serde(rename = "stato", default)]
    pub status: AlarmStatus,
    #[serde(rename = "statoInserimento", alias = "statoSessione", default)]
    pub armed_status: AlarmArmStatus,
    /// Alarm states this area can report.
    #[serde(rename = "statiDisponibili", default, deserialize_with = "wire::entries")]
    pub available_statuses: Vec<AlarmStatus>,
    /// Arming states this area can be moved to.
    #[serde(
        rename = "statiInserimentoDisponibili",
        alias = "statiSessioneDisponibili",
        default,
        deserialize_with = "wire::entries"
    )]
    pub available_arm_statuses: Vec<AlarmArmStatus>,
}

// ── Zone ────────────────────────────────────────────────────────────

/// Sensor input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(flatten)]
    pub endpoint: Endpoint,
    #[serde(rename = "aperta", default, deserialize_with = "wire::boolean")]
    pub opened: bool,
    #[serde(rename = "esclusa", default, deserialize_with = "wire::boolean")]
    pub excluded: bool,
}

// ── Actuator ────────────────────────────────────────────────────────

/// Binary output (relay, switch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actuator {
    #[serde(flatten)]
    pub endpoint: Endpoint,
    #[serde(rename = "aperta", default, deserialize_with = "wire::boolean")]
    pub opened: bool,
}

// ── Cover ───────────────────────────────────────────────────────────

/// Motorized shutter; `position` is a percentage, 100 fully open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cover {
    #[serde(flatten)]
    pub endpoint: Endpoint,
    #[serde(rename = "stato", default)]
    pub status: CoverStatus,
    #[serde(rename = "posizione", default, deserialize_with = "wire::percent")]
    pub position: u8,
}

// ── Scene / Group ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(flatten)]
    pub endpoint: Endpoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    #[serde(flatten)]
    pub endpoint: Endpoint,
}
