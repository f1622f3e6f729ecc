use std::collections::HashMap;

use crate::model::entity::{Capabilities, Domain, Entity, EntityState};
use crate::model::hass::{HassEntityMetadata, HassState};

/// Turn a Home Assistant state into an entity, if it is in a supported
/// domain.
#[must_use]
pub fn import_entity(state: &HassState, meta: Option<&HassEntityMetadata>) -> Option<Entity> {
    let domain = Domain::from_entity_id(&state.entity_id)?;
    let meta = meta.cloned().unwrap_or_default();

    Some(Entity {
        entity_id: state.entity_id.clone(),
        domain,
        name: state.friendly_name().to_string(),
        labels: meta.labels,
        area: meta.area,
        capabilities: Capabilities::from_hass(state),
        state: EntityState::from_hass(state),
    })
}

pub fn import_entities(
    states: &[HassState],
    metadata: &HashMap<String, HassEntityMetadata>,
) -> Vec<Entity> {
    let entities: Vec<Entity> = states
        .iter()
        .filter_map(|state| import_entity(state, metadata.get(&state.entity_id)))
        .collect();

    log::debug!(
        "Imported {} of {} Home Assistant entities",
        entities.len(),
        states.len()
    );

    entities
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use maplit::{btreeset, hashmap};
    use serde_json::json;

    use hue::legacy_api::LightKind;

    use crate::backend::hass::import::{import_entities, import_entity};
    use crate::model::entity::{Area, Domain};
    use crate::model::hass::{HassEntityMetadata, HassState};

    fn state(value: serde_json::Value) -> HassState {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn import_color_light_with_metadata() {
        let st = state(json!({
            "entity_id": "light.kitchen",
            "state": "on",
            "attributes": {
                "friendly_name": "Kitchen Ceiling",
                "supported_color_modes": ["color_temp", "xy"],
                "brightness": 128,
                "color_mode": "xy",
                "xy_color": [0.4, 0.4],
            }
        }));
        let meta = HassEntityMetadata {
            labels: btreeset! {"kitchen".to_string()},
            area: Some(Area {
                id: "kitchen".into(),
                name: "Kitchen".into(),
            }),
        };

        let ent = import_entity(&st, Some(&meta)).unwrap();
        assert_eq!(ent.domain, Domain::Light);
        assert_eq!(ent.name, "Kitchen Ceiling");
        assert_eq!(ent.labels, meta.labels);
        assert_eq!(ent.area, meta.area);
        assert_eq!(ent.light_kind(), LightKind::ExtendedColor);
        assert!(ent.state.available);
        assert!(ent.state.on);
        assert_eq!(ent.state.brightness, Some(128));
    }

    #[test]
    fn import_unavailable_switch() {
        let st = state(json!({
            "entity_id": "switch.fan",
            "state": "unavailable",
            "attributes": {}
        }));

        let ent = import_entity(&st, None).unwrap();
        assert_eq!(ent.domain, Domain::Switch);
        assert_eq!(ent.name, "switch.fan");
        assert!(ent.labels.is_empty());
        assert!(ent.area.is_none());
        assert_eq!(ent.light_kind(), LightKind::OnOff);
        assert!(!ent.state.available);
    }

    #[test]
    fn skip_other_domains() {
        let states = vec![
            state(json!({"entity_id": "sensor.temp", "state": "21.5"})),
            state(json!({"entity_id": "binary_sensor.door", "state": "off"})),
            state(json!({"entity_id": "light.desk", "state": "off"})),
        ];
        let metadata = hashmap! {
            "light.desk".to_string() => HassEntityMetadata {
                labels: btreeset! {"office".to_string()},
                area: None,
            },
        };

        let entities = import_entities(&states, &metadata);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].entity_id, "light.desk");
        assert!(entities[0].labels.contains("office"));

        assert!(import_entities(&states, &HashMap::new())[0].labels.is_empty());
    }
}
