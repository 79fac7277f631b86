// ── Panels and status snapshots ──

use std::collections::HashSet;

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::endpoint::{Actuator, Area, Cover, Endpoint, Group, HasEndpoint, Scene, Zone};
use super::wire;

// ── PanelEntry ──────────────────────────────────────────────────────

/// A panel the authenticated user can control, as listed by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelEntry {
    pub hash: String,
    #[serde(rename = "centrale_online", default, deserialize_with = "wire::boolean")]
    pub online: bool,
    /// Per-user labels for this panel.
    #[serde(rename = "username", default, deserialize_with = "wire::entries")]
    pub names: Vec<PanelName>,
}

/// The label one user gave a panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelName {
    #[serde(rename = "name", default, deserialize_with = "wire::text_or_empty")]
    pub username: String,
    #[serde(default, deserialize_with = "wire::text_or_empty")]
    pub label: String,
}

impl PanelEntry {
    /// The label `username` assigned to this panel, if any.
    pub fn name_for(&self, username: &str) -> Option<&str> {
        self.names
            .iter()
            .find(|n| n.username == username)
            .map(|n| n.label.as_str())
    }
}

// ── PanelStatus ─────────────────────────────────────────────────────

/// Full status snapshot of one panel.
///
/// Built fresh on every fetch (and on every push notification); never
/// updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PanelStatus {
    #[serde(rename = "centrale", default, deserialize_with = "wire::text_or_empty")]
    pub panel_id: String,
    #[serde(rename = "utente", default, deserialize_with = "wire::text")]
    pub user_email: Option<String>,
    #[serde(default, deserialize_with = "wire::text")]
    pub release: Option<String>,
    #[serde(rename = "tipo_accessorio", default, deserialize_with = "wire::text")]
    pub accessory_type: Option<String>,
    #[serde(rename = "release_accessorio", default, deserialize_with = "wire::text")]
    pub accessory_release: Option<String>,
    #[serde(rename = "pushFeature", default, deserialize_with = "wire::boolean")]
    pub push_feature: bool,
    #[serde(rename = "tappFeature", default, deserialize_with = "wire::boolean")]
    pub cover_feature: bool,
    #[serde(rename = "sceneFeature", default, deserialize_with = "wire::boolean")]
    pub scene_feature: bool,
    #[serde(rename = "aree", default, deserialize_with = "unique_endpoints")]
    pub areas: Vec<Area>,
    #[serde(rename = "zone", default, deserialize_with = "unique_endpoints")]
    pub zones: Vec<Zone>,
    #[serde(rename = "uscite", default, deserialize_with = "unique_endpoints")]
    pub actuators: Vec<Actuator>,
    #[serde(rename = "tapparelle", default, deserialize_with = "unique_endpoints")]
    pub covers: Vec<Cover>,
    #[serde(rename = "scenari", default, deserialize_with = "unique_endpoints")]
    pub scenes: Vec<Scene>,
    #[serde(rename = "gruppi", default, deserialize_with = "unique_endpoints")]
    pub groups: Vec<Group>,
}

impl PanelStatus {
    /// Identity of every endpoint: areas, zones, actuators, covers,
    /// scenes, then groups.
    pub fn all_endpoints(&self) -> Vec<&Endpoint> {
        collect_endpoints(
            &self.areas,
            &self.zones,
            &self.actuators,
            &self.covers,
            &self.scenes,
            &self.groups,
        )
    }

    pub fn find_endpoint(&self, endpoint_id: &str) -> Option<&Endpoint> {
        self.all_endpoints()
            .into_iter()
            .find(|e| e.endpoint_id == endpoint_id)
    }
}

// ── EndpointStatus ──────────────────────────────────────────────────

/// Status of a single endpoint, as returned by the per-endpoint query.
///
/// Same layout as [`PanelStatus`] minus the panel identity; usually only
/// one collection is populated.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EndpointStatus {
    #[serde(default, deserialize_with = "wire::text")]
    pub release: Option<String>,
    #[serde(rename = "tipo_accessorio", default, deserialize_with = "wire::text")]
    pub accessory_type: Option<String>,
    #[serde(rename = "release_accessorio", default, deserialize_with = "wire::text")]
    pub accessory_release: Option<String>,
    #[serde(rename = "pushFeature", default, deserialize_with = "wire::boolean")]
    pub push_feature: bool,
    #[serde(rename = "tappFeature", default, deserialize_with = "wire::boolean")]
    pub cover_feature: bool,
    #[serde(rename = "sceneFeature", default, deserialize_with = "wire::boolean")]
    pub scene_feature: bool,
    #[serde(rename = "aree", default, deserialize_with = "unique_endpoints")]
    pub areas: Vec<Area>,
    #[serde(rename = "zone", default, deserialize_with = "unique_endpoints")]
    pub zones: Vec<Zone>,
    #[serde(rename = "uscite", default, deserialize_with = "unique_endpoints")]
    pub actuators: Vec<Actuator>,
    #[serde(rename = "tapparelle", default, deserialize_with = "unique_endpoints")]
    pub covers: Vec<Cover>,
    #[serde(rename = "scenari", default, deserialize_with = "unique_endpoints")]
    pub scenes: Vec<Scene>,
    #[serde(rename = "gruppi", default, deserialize_with = "unique_endpoints")]
    pub groups: Vec<Group>,
}

impl EndpointStatus {
    pub fn all_endpoints(&self) -> Vec<&Endpoint> {
        collect_endpoints(
            &self.areas,
            &self.zones,
            &self.actuators,
            &self.covers,
            &self.scenes,
            &self.groups,
        )
    }
}

fn collect_endpoints<'a>(
    areas: &'a [Area],
    zones: &'a [Zone],
    actuators: &'a [Actuator],
    covers: &'a [Cover],
    scenes: &'a [Scene],
    groups: &'a [Group],
) -> Vec<&'a Endpoint> {
    areas
        .iter()
        .map(|a| &a.endpoint)
        .chain(zones.iter().map(|z| &z.endpoint))
        .chain(actuators.iter().map(|a| &a.endpoint))
        .chain(covers.iter().map(|c| &c.endpoint))
        .chain(scenes.iter().map(|s| &s.endpoint))
        .chain(groups.iter().map(|g| &g.endpoint))
        .collect()
}

/// Endpoint list in which every id appears once; later duplicates are
/// dropped.
fn unique_endpoints<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + HasEndpoint,
{
    let mut entries: Vec<T> = wire::entries(deserializer)?;
    let mut seen = HashSet::new();
    entries.retain(|entry| {
        let id = &entry.endpoint().endpoint_id;
        if seen.insert(id.clone()) {
            return true;
        }
        warn!(endpoint_id = %id, "duplicate endpoint id in snapshot, keeping the first");
        false
    });
    Ok(entries)
}
