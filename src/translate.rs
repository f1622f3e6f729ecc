//! Conversion between Home Assistant entity state and the hue v1 light state.
//!
//! Everything here is pure. Brightness is `0..=255` on the backend side and
//! `0..=254` on the hue side; hue/saturation is degrees/percent on the backend
//! side and `0..=65535`/`0..=254` on the hue side.

use serde_json::{Map, Value, json};

use hue::hs::RawHS;
use hue::legacy_api::{ApiLightState, ApiLightStateUpdate, LightColorMode};

use crate::model::entity::{Capabilities, ColorMode, Domain, Entity, EntityState};
use crate::model::hass::HassState;

pub const DEFAULT_BRI: u8 = 254;
pub const DEFAULT_XY: [f64; 2] = [0.3127, 0.3290];
pub const DEFAULT_CT: u16 = 366;

const MIREK_MIN: u16 = 153;
const MIREK_MAX: u16 = 500;

fn value_to_f64(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|x: &f64| x.is_finite())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn value_to_u16(value: &Value) -> Option<u16> {
    value
        .as_u64()
        .and_then(|x| u16::try_from(x).ok())
        .or_else(|| {
            let x = value_to_f64(value)?;
            (0.0..=f64::from(u16::MAX))
                .contains(&x)
                .then(|| x.round() as u16)
        })
}

fn value_to_pair(value: &Value) -> Option<[f64; 2]> {
    let arr = value.as_array()?;
    let [a, b] = arr.as_slice() else {
        return None;
    };
    Some([value_to_f64(a)?, value_to_f64(b)?])
}

#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn ha_to_hue_bri(brightness: u8) -> u8 {
    (f64::from(brightness) * 254.0 / 255.0)
        .round()
        .clamp(0.0, 254.0) as u8
}

#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn hue_to_ha_bri(bri: u8) -> u8 {
    (f64::from(bri) * 255.0 / 254.0).round().clamp(0.0, 255.0) as u8
}

impl Capabilities {
    /// Detect capabilities from `supported_color_modes`, falling back to
    /// the presence of state attributes.
    #[must_use]
    pub fn from_hass(state: &HassState) -> Self {
        if state.domain() != Domain::Light.as_str() {
            return Self::default();
        }

        let modes: Vec<String> = state
            .attributes
            .get("supported_color_modes")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_ascii_lowercase)
                    .collect()
            })
            .unwrap_or_default();

        let has = |attr: &str| state.attributes.contains_key(attr);

        let color = has("xy_color")
            || has("hs_color")
            || modes
                .iter()
                .any(|m| matches!(m.as_str(), "xy" | "hs" | "rgb" | "rgbw" | "rgbww"));
        let color_temp = has("color_temp")
            || has("color_temp_kelvin")
            || modes.iter().any(|m| m == "color_temp");
        let brightness = color
            || color_temp
            || has("brightness")
            || modes.iter().any(|m| m == "brightness" || m == "white");

        Self {
            brightness,
            color_temp,
            color,
        }
    }
}

impl EntityState {
    /// Never fails: unknown or unusable states produce an unreachable entity,
    /// malformed attributes are dropped.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_hass(state: &HassState) -> Self {
        let on = match state.state.as_str() {
            "on" => true,
            "off" => false,
            _ => return Self::unavailable(),
        };

        let attr = |name: &str| state.attributes.get(name).filter(|v| !v.is_null());

        let brightness = attr("brightness")
            .and_then(value_to_f64)
            .map(|b| b.round().clamp(0.0, 255.0) as u8);

        let hs_color = attr("hs_color")
            .and_then(value_to_pair)
            .map(|[h, s]| [h.clamp(0.0, 360.0), s.clamp(0.0, 100.0)]);

        let xy_color = attr("xy_color")
            .and_then(value_to_pair)
            .map(|[x, y]| [x.clamp(0.0, 1.0), y.clamp(0.0, 1.0)]);

        let color_temp = attr("color_temp").and_then(value_to_u16).or_else(|| {
            attr("color_temp_kelvin")
                .and_then(value_to_f64)
                .filter(|k| *k > 0.0)
                .map(|k| (1_000_000.0 / k).round().clamp(0.0, f64::from(u16::MAX)) as u16)
        });

        let color_mode = match attr("color_mode").and_then(Value::as_str) {
            Some("color_temp") => Some(ColorMode::ColorTemp),
            Some("hs") => Some(ColorMode::Hs),
            Some("xy" | "rgb" | "rgbw" | "rgbww") => Some(ColorMode::Xy),
            _ => None,
        };

        Self {
            available: true,
            on,
            brightness,
            hs_color,
            xy_color,
            color_temp,
            color_mode,
        }
    }
}

/// Hue view of an entity. Values the backend does not report are filled with
/// defaults, as long as the entity has the matching capability.
#[must_use]
pub fn light_state(entity: &Entity) -> ApiLightState {
    let caps = entity.capabilities;
    let state = &entity.state;

    let mut res = ApiLightState::unreachable();
    res.reachable = state.available;
    res.on = state.available && state.on;

    if entity.domain == Domain::Switch {
        return res;
    }

    if caps.brightness {
        res.bri = Some(state.brightness.map_or(DEFAULT_BRI, ha_to_hue_bri));
    }

    if caps.color {
        let raw = state
            .hs_color
            .map(|[h, s]| RawHS::from_degrees(h, s))
            .unwrap_or_default();
        res.hue = Some(raw.hue);
        res.sat = Some(raw.sat);
        res.xy = Some(state.xy_color.unwrap_or(DEFAULT_XY));
        res.effect = Some("none".to_string());
    }

    if caps.color_temp {
        res.ct = Some(
            state
                .color_temp
                .unwrap_or(DEFAULT_CT)
                .clamp(MIREK_MIN, MIREK_MAX),
        );
    }

    res.colormode = match (state.color_mode, caps.color, caps.color_temp) {
        (Some(ColorMode::ColorTemp), _, true) | (_, false, true) => Some(LightColorMode::Ct),
        (Some(ColorMode::Hs), true, _) => Some(LightColorMode::Hs),
        (_, true, _) => Some(LightColorMode::Xy),
        (_, false, false) => None,
    };

    res
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TurnOn {
    /// `0..=255`
    pub brightness: Option<u8>,
    pub hs_color: Option<[f64; 2]>,
    pub xy_color: Option<[f64; 2]>,
    pub color_temp: Option<u16>,
    /// seconds
    pub transition: Option<f64>,
}

impl TurnOn {
    const fn has_color(&self) -> bool {
        self.hs_color.is_some() || self.xy_color.is_some() || self.color_temp.is_some()
    }
}

/// Backend-side delta, the result of applying a hue update to an entity.
#[derive(Clone, Debug, PartialEq)]
pub enum LightCommand {
    NoOp,
    TurnOff { transition: Option<f64> },
    TurnOn(TurnOn),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServiceCall {
    pub domain: &'static str,
    pub service: &'static str,
    pub entity_id: String,
    pub data: Map<String, Value>,
}

impl LightCommand {
    /// Fold a later command into this one. Per field, the later value wins.
    /// Color settings replace each other as a whole, since only one color
    /// mode can be active.
    #[must_use]
    pub fn merge(self, later: Self) -> Self {
        match (self, later) {
            (cmd, Self::NoOp) => cmd,
            (_, later @ Self::TurnOff { .. }) => later,
            (Self::NoOp | Self::TurnOff { .. }, later @ Self::TurnOn(_)) => later,
            (Self::TurnOn(first), Self::TurnOn(later)) => {
                let color = if later.has_color() { &later } else { &first };
                Self::TurnOn(TurnOn {
                    brightness: later.brightness.or(first.brightness),
                    hs_color: color.hs_color,
                    xy_color: color.xy_color,
                    color_temp: color.color_temp,
                    transition: later.transition.or(first.transition),
                })
            }
        }
    }

    /// The backend service call implementing this command, if any.
    #[must_use]
    pub fn service_call(&self, entity: &Entity) -> Option<ServiceCall> {
        let mut data = Map::new();
        let service = match self {
            Self::NoOp => return None,
            Self::TurnOff { transition } => {
                if let Some(tt) = transition {
                    data.insert("transition".to_string(), json!(tt));
                }
                "turn_off"
            }
            Self::TurnOn(on) => {
                if let Some(bri) = on.brightness {
                    data.insert("brightness".to_string(), json!(bri));
                }
                if let Some(hs) = on.hs_color {
                    data.insert("hs_color".to_string(), json!(hs));
                }
                if let Some(xy) = on.xy_color {
                    data.insert("xy_color".to_string(), json!(xy));
                }
                if let Some(ct) = on.color_temp {
                    data.insert("color_temp".to_string(), json!(ct));
                }
                if let Some(tt) = on.transition {
                    data.insert("transition".to_string(), json!(tt));
                }
                "turn_on"
            }
        };

        // switches take no attributes
        if entity.domain == Domain::Switch {
            data.clear();
        }

        Some(ServiceCall {
            domain: entity.domain.as_str(),
            service,
            entity_id: entity.entity_id.clone(),
            data,
        })
    }

    /// Expected entity state after the command succeeded.
    #[must_use]
    pub fn apply(&self, state: &EntityState) -> EntityState {
        let mut res = state.clone();
        match self {
            Self::NoOp => {}
            Self::TurnOff { .. } => {
                res.available = true;
                res.on = false;
            }
            Self::TurnOn(on) => {
                res.available = true;
                res.on = true;
                if let Some(bri) = on.brightness {
                    res.brightness = Some(bri);
                }
                if let Some(hs) = on.hs_color {
                    res.hs_color = Some(hs);
                    res.color_mode = Some(ColorMode::Hs);
                }
                if let Some(xy) = on.xy_color {
                    res.xy_color = Some(xy);
                    res.color_mode = Some(ColorMode::Xy);
                }
                if let Some(ct) = on.color_temp {
                    res.color_temp = Some(ct);
                    res.color_mode = Some(ColorMode::ColorTemp);
                }
            }
        }
        res
    }
}

/// Fields of an update that a real bridge refuses while the light stays off
/// (error 201). Empty when the update turns the light on, or the light is on.
#[must_use]
pub fn rejected_while_off(entity: &Entity, update: &ApiLightStateUpdate) -> Vec<&'static str> {
    let stays_off = update.on.map_or(!light_state(entity).on, |on| !on);
    if !stays_off {
        return vec![];
    }

    update
        .fields()
        .into_iter()
        .map(|(name, _)| name)
        .filter(|name| !matches!(*name, "on" | "transitiontime"))
        .collect()
}

/// Compute the backend command for a hue state update.
///
/// The update is clamped, then applied to the current hue state; only fields
/// that end up different are sent. An update that changes nothing yields
/// [`LightCommand::NoOp`].
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn light_command(entity: &Entity, update: &ApiLightStateUpdate) -> LightCommand {
    let upd = update.clamped();
    let current = light_state(entity);
    let mut target = current.clone();
    let waking = !current.on;
    let mut bri_requested = false;
    let mut color_requested = false;

    if let Some(on) = upd.on {
        target.on = on;
    }

    if let Some(cur) = current.bri {
        bri_requested = upd.bri.is_some() || upd.bri_inc.is_some();
        let mut bri = i64::from(cur);
        if let Some(new) = upd.bri {
            bri = new;
        }
        if let Some(inc) = upd.bri_inc {
            bri += inc;
        }
        target.bri = Some(bri.clamp(0, ApiLightStateUpdate::BRI_MAX) as u8);
    }

    if entity.capabilities.color {
        color_requested |= upd.hue.is_some() || upd.sat.is_some() || upd.xy.is_some();
        if let Some(hue) = upd.hue {
            target.hue = Some(hue as u16);
            target.colormode = Some(LightColorMode::Hs);
        }
        if let Some(sat) = upd.sat {
            target.sat = Some(sat as u8);
            target.colormode = Some(LightColorMode::Hs);
        }
        if let Some(xy) = upd.xy {
            target.xy = Some(xy);
            target.colormode = Some(LightColorMode::Xy);
        }
    }

    if entity.capabilities.color_temp {
        color_requested |= upd.ct.is_some();
        if let Some(ct) = upd.ct {
            target.ct = Some(ct as u16);
            target.colormode = Some(LightColorMode::Ct);
        }
    }

    let transition = upd.transitiontime.map(|tt| f64::from(tt) / 10.0);

    if !target.on {
        return if (current.on && current.reachable) || (upd.on == Some(false) && !current.reachable)
        {
            LightCommand::TurnOff { transition }
        } else {
            LightCommand::NoOp
        };
    }

    if target == current {
        return LightCommand::NoOp;
    }

    let mut cmd = TurnOn {
        transition,
        ..TurnOn::default()
    };

    if target.bri != current.bri || (waking && bri_requested) {
        cmd.brightness = target.bri.map(hue_to_ha_bri);
    }

    if (waking && color_requested)
        || target.colormode != current.colormode
        || target.hue != current.hue
        || target.sat != current.sat
        || target.xy != current.xy
        || target.ct != current.ct
    {
        match target.colormode {
            Some(LightColorMode::Hs) => {
                let raw = RawHS {
                    hue: target.hue.unwrap_or_default(),
                    sat: target.sat.unwrap_or_default(),
                };
                cmd.hs_color = Some(raw.to_degrees());
            }
            Some(LightColorMode::Xy) => cmd.xy_color = target.xy,
            Some(LightColorMode::Ct) => cmd.color_temp = target.ct,
            None => {}
        }
    }

    LightCommand::TurnOn(cmd)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use hue::legacy_api::{ApiLightStateUpdate, LightColorMode};

    use crate::model::entity::{Capabilities, ColorMode, Domain, Entity, EntityState};
    use crate::model::hass::HassState;
    use crate::translate::{
        DEFAULT_XY, LightCommand, TurnOn, ha_to_hue_bri, hue_to_ha_bri, light_command, light_state,
        rejected_while_off,
    };

    fn hass(value: serde_json::Value) -> HassState {
        serde_json::from_value(value).unwrap()
    }

    fn color_light() -> Entity {
        let state = hass(json!({
            "entity_id": "light.desk",
            "state": "on",
            "attributes": {
                "supported_color_modes": ["color_temp", "hs"],
                "color_mode": "hs",
                "brightness": 128,
                "hs_color": [27.152, 61.0],
                "xy_color": [0.5, 0.4],
                "color_temp": 300,
            }
        }));
        Entity {
            entity_id: state.entity_id.clone(),
            domain: Domain::Light,
            name: "Desk".into(),
            labels: Default::default(),
            area: None,
            capabilities: Capabilities::from_hass(&state),
            state: EntityState::from_hass(&state),
        }
    }

    fn dimmable_off() -> Entity {
        let state = hass(json!({
            "entity_id": "light.hall",
            "state": "off",
            "attributes": {"supported_color_modes": ["brightness"]}
        }));
        Entity {
            entity_id: state.entity_id.clone(),
            domain: Domain::Light,
            name: "Hall".into(),
            labels: Default::default(),
            area: None,
            capabilities: Capabilities::from_hass(&state),
            state: EntityState::from_hass(&state),
        }
    }

    fn update(value: serde_json::Value) -> ApiLightStateUpdate {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn brightness_scaling() {
        assert_eq!(ha_to_hue_bri(0), 0);
        assert_eq!(ha_to_hue_bri(255), 254);
        assert_eq!(hue_to_ha_bri(254), 255);
        assert_eq!(hue_to_ha_bri(0), 0);
        for bri in 0..=254 {
            assert_eq!(ha_to_hue_bri(hue_to_ha_bri(bri)), bri);
        }
    }

    #[test]
    fn capabilities_from_modes() {
        let ent = color_light();
        assert!(ent.capabilities.color);
        assert!(ent.capabilities.color_temp);
        assert!(ent.capabilities.brightness);

        let ent = dimmable_off();
        assert!(ent.capabilities.brightness);
        assert!(!ent.capabilities.color);
        assert!(!ent.capabilities.color_temp);
    }

    #[test]
    fn hue_state_from_color_light() {
        let st = light_state(&color_light());
        assert!(st.on);
        assert!(st.reachable);
        assert_eq!(st.bri, Some(127));
        assert_eq!(st.hue, Some(4943));
        assert_eq!(st.sat, Some(155));
        assert_eq!(st.ct, Some(300));
        assert_eq!(st.xy, Some([0.5, 0.4]));
        assert_eq!(st.colormode, Some(LightColorMode::Hs));
    }

    #[test]
    fn absent_values_get_defaults() {
        let state = hass(json!({
            "entity_id": "light.bulb",
            "state": "off",
            "attributes": {"supported_color_modes": ["xy", "color_temp"]}
        }));
        let ent = Entity {
            entity_id: state.entity_id.clone(),
            domain: Domain::Light,
            name: "Bulb".into(),
            labels: Default::default(),
            area: None,
            capabilities: Capabilities::from_hass(&state),
            state: EntityState::from_hass(&state),
        };

        let st = light_state(&ent);
        assert!(!st.on);
        assert_eq!(st.bri, Some(254));
        assert_eq!(st.xy, Some(DEFAULT_XY));
        assert_eq!(st.ct, Some(366));
        assert_eq!(st.hue, Some(0));
        assert_eq!(st.sat, Some(0));
    }

    #[test]
    fn unavailable_entity_is_unreachable() {
        let state = hass(json!({"entity_id": "light.gone", "state": "unavailable"}));
        assert_eq!(EntityState::from_hass(&state), EntityState::unavailable());
    }

    #[test]
    fn malformed_state_is_unreachable() {
        let state = hass(json!({
            "entity_id": "light.weird",
            "state": "garbled",
        }));
        let ent = Entity {
            entity_id: state.entity_id.clone(),
            domain: Domain::Light,
            name: "Weird".into(),
            labels: Default::default(),
            area: None,
            capabilities: Capabilities::from_hass(&state),
            state: EntityState::from_hass(&state),
        };
        assert!(!light_state(&ent).reachable);
    }

    #[test]
    fn malformed_attributes_are_dropped() {
        let state = hass(json!({
            "entity_id": "light.weird",
            "state": "on",
            "attributes": {
                "brightness": "lots",
                "hs_color": [1],
                "xy_color": "red",
                "color_temp": -3,
            }
        }));
        let st = EntityState::from_hass(&state);
        assert!(st.available);
        assert!(st.on);
        assert_eq!(st.brightness, None);
        assert_eq!(st.hs_color, None);
        assert_eq!(st.xy_color, None);
        assert_eq!(st.color_temp, None);
    }

    #[test]
    fn kelvin_is_converted_to_mirek() {
        let state = hass(json!({
            "entity_id": "light.warm",
            "state": "on",
            "attributes": {"color_temp_kelvin": 2500, "color_mode": "color_temp"}
        }));
        let st = EntityState::from_hass(&state);
        assert_eq!(st.color_temp, Some(400));
        assert_eq!(st.color_mode, Some(ColorMode::ColorTemp));
    }

    #[test]
    fn unchanged_state_is_noop() {
        let ent = color_light();
        let st = light_state(&ent);

        let upd = update(json!({
            "on": st.on,
            "bri": st.bri,
            "hue": st.hue,
            "sat": st.sat,
        }));
        assert_eq!(light_command(&ent, &upd), LightCommand::NoOp);

        let upd = update(json!({"on": true, "alert": "none"}));
        assert_eq!(light_command(&ent, &upd), LightCommand::NoOp);

        let upd = update(json!({"on": false}));
        assert_eq!(light_command(&dimmable_off(), &upd), LightCommand::NoOp);
    }

    #[test]
    fn attributes_of_off_light_are_rejected() {
        let ent = dimmable_off();

        let upd = update(json!({"bri": 100, "transitiontime": 4}));
        assert_eq!(rejected_while_off(&ent, &upd), vec!["bri"]);
        assert_eq!(light_command(&ent, &upd), LightCommand::NoOp);

        let upd = update(json!({"on": false, "bri": 100, "ct": 300}));
        assert_eq!(rejected_while_off(&ent, &upd), vec!["bri", "ct"]);

        let upd = update(json!({"on": true, "bri": 100}));
        assert!(rejected_while_off(&ent, &upd).is_empty());

        let upd = update(json!({"bri": 100}));
        assert!(rejected_while_off(&color_light(), &upd).is_empty());
    }

    #[test]
    fn brightness_is_clamped() {
        let ent = dimmable_off();
        let cmd = light_command(&ent, &update(json!({"on": true, "bri": 300})));
        let LightCommand::TurnOn(on) = &cmd else {
            panic!("expected turn on, got {cmd:?}");
        };
        assert_eq!(on.brightness, Some(255));

        let st = cmd.apply(&ent.state);
        let mut after = ent.clone();
        after.state = st;
        assert_eq!(light_state(&after).bri, Some(254));
    }

    #[test]
    fn brightness_change_is_scaled() {
        let ent = color_light();
        let cmd = light_command(&ent, &update(json!({"bri": 254})));
        assert_eq!(
            cmd,
            LightCommand::TurnOn(TurnOn {
                brightness: Some(255),
                ..TurnOn::default()
            })
        );
    }

    #[test]
    fn brightness_increment() {
        let ent = color_light();
        let cmd = light_command(&ent, &update(json!({"bri_inc": -27})));
        assert_eq!(
            cmd,
            LightCommand::TurnOn(TurnOn {
                brightness: Some(hue_to_ha_bri(100)),
                ..TurnOn::default()
            })
        );
    }

    #[test]
    fn turn_off_with_transition() {
        let ent = color_light();
        let cmd = light_command(&ent, &update(json!({"on": false, "transitiontime": 15})));
        assert_eq!(
            cmd,
            LightCommand::TurnOff {
                transition: Some(1.5)
            }
        );

        let call = cmd.service_call(&ent).unwrap();
        assert_eq!(call.domain, "light");
        assert_eq!(call.service, "turn_off");
        assert_eq!(call.data.get("transition"), Some(&json!(1.5)));
    }

    #[test]
    fn color_temperature_update() {
        let ent = color_light();
        let cmd = light_command(&ent, &update(json!({"ct": 1000})));
        let call = cmd.service_call(&ent).unwrap();
        assert_eq!(call.service, "turn_on");
        assert_eq!(call.data.get("color_temp"), Some(&json!(500)));
        assert!(call.data.get("hs_color").is_none());

        let st = cmd.apply(&ent.state);
        assert_eq!(st.color_mode, Some(ColorMode::ColorTemp));
        assert_eq!(st.color_temp, Some(500));
    }

    #[test]
    fn xy_update() {
        let ent = color_light();
        let cmd = light_command(&ent, &update(json!({"xy": [0.2, 0.3]})));
        let call = cmd.service_call(&ent).unwrap();
        assert_eq!(call.data.get("xy_color"), Some(&json!([0.2, 0.3])));
    }

    #[test]
    fn hue_only_update_keeps_saturation() {
        let ent = color_light();
        let cmd = light_command(&ent, &update(json!({"hue": 0})));
        let LightCommand::TurnOn(on) = cmd else {
            panic!("expected turn on");
        };
        let [h, s] = on.hs_color.unwrap();
        assert!(h.abs() < f64::EPSILON);
        assert!((s - 155.0 / 254.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn unsupported_fields_are_ignored() {
        let ent = dimmable_off();
        let cmd = light_command(&ent, &update(json!({"on": true, "hue": 1000, "ct": 200})));
        assert_eq!(cmd, LightCommand::TurnOn(TurnOn::default()));
    }

    #[test]
    fn switch_call_has_no_data() {
        let mut ent = color_light();
        ent.domain = Domain::Switch;
        ent.entity_id = "switch.fan".into();
        let cmd = light_command(&ent, &update(json!({"on": false, "transitiontime": 4})));
        let call = cmd.service_call(&ent).unwrap();
        assert_eq!(call.domain, "switch");
        assert_eq!(call.service, "turn_off");
        assert!(call.data.is_empty());
    }

    #[test]
    fn merge_is_last_write_wins() {
        let first = LightCommand::TurnOn(TurnOn {
            brightness: Some(10),
            color_temp: Some(200),
            ..TurnOn::default()
        });
        let second = LightCommand::TurnOn(TurnOn {
            xy_color: Some([0.1, 0.2]),
            transition: Some(1.0),
            ..TurnOn::default()
        });

        assert_eq!(
            first.clone().merge(second),
            LightCommand::TurnOn(TurnOn {
                brightness: Some(10),
                xy_color: Some([0.1, 0.2]),
                transition: Some(1.0),
                ..TurnOn::default()
            })
        );

        let off = LightCommand::TurnOff { transition: None };
        assert_eq!(first.clone().merge(off.clone()), off);
        assert_eq!(off.merge(first.clone()), first);
        assert_eq!(first.clone().merge(LightCommand::NoOp), first);
    }
}
