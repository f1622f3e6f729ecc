use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::model::entity::Area;

/// One entry of `GET /api/states`, also carried by `state_changed` events.
#[derive(Clone, Debug, Deserialize)]
pub struct HassState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl HassState {
    /// The part of the entity id before the first dot (`light`, `switch`, ..)
    #[must_use]
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map_or(self.entity_id.as_str(), |(domain, _)| domain)
    }

    #[must_use]
    pub fn friendly_name(&self) -> &str {
        self.attributes
            .get("friendly_name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.entity_id)
    }
}

/// Registry data not carried by entity states: labels (lowercase ids and
/// names) and the assigned area.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HassEntityMetadata {
    pub labels: BTreeSet<String>,
    pub area: Option<Area>,
}

#[derive(Clone, Debug)]
pub struct HassStateChangedEvent {
    pub entity_id: String,
    pub new_state: Option<HassState>,
}
