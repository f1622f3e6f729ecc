use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use mac_address::MacAddress;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::best_guess_timezone;
use crate::date_format;
use crate::error::{HueApiV1Error, HueError};

pub const SIGNIFY_MANUFACTURER_NAME: &str = "Signify Netherlands B.V.";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HueApiResult<T> {
    Success(T),
    Error(HueError),
}

pub fn serialize_lower_case_mac<S>(mac: &MacAddress, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let m = mac.bytes();
    let addr = format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        m[0], m[1], m[2], m[3], m[4], m[5]
    );
    serializer.serialize_str(&addr)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiShortConfig {
    pub apiversion: String,
    pub bridgeid: String,
    pub datastoreversion: String,
    pub factorynew: bool,
    #[serde(serialize_with = "serialize_lower_case_mac")]
    pub mac: MacAddress,
    pub modelid: String,
    pub name: String,
    pub replacesbridgeid: Option<String>,
    pub starterkitid: String,
    pub swversion: String,
}

impl Default for ApiShortConfig {
    fn default() -> Self {
        Self {
            apiversion: crate::HUE_BRIDGE_V2_DEFAULT_APIVERSION.to_string(),
            bridgeid: "0000000000000000".to_string(),
            datastoreversion: "126".to_string(),
            factorynew: false,
            mac: MacAddress::default(),
            modelid: crate::HUE_BRIDGE_V2_MODEL_ID.to_string(),
            name: "Emulated Hue Bridge".to_string(),
            replacesbridgeid: None,
            starterkitid: String::new(),
            swversion: crate::HUE_BRIDGE_V2_DEFAULT_SWVERSION.to_string(),
        }
    }
}

impl ApiShortConfig {
    #[must_use]
    pub fn from_mac_and_name(mac: MacAddress, name: &str) -> Self {
        Self {
            bridgeid: crate::bridge_id(mac).to_uppercase(),
            name: name.to_string(),
            mac,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiResourceType {
    Config,
    Groups,
    Lights,
    Resourcelinks,
    Rules,
    Scenes,
    Schedules,
    Sensors,
    Capabilities,
}

impl FromStr for ApiResourceType {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewUser {
    pub devicetype: String,
    #[serde(default)]
    pub generateclientkey: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewUserReply {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clientkey: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    #[default]
    Disconnected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwUpdateState {
    NoUpdates,
    Transferring,
    ReadyToInstall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwUpdate {
    #[serde(with = "date_format::legacy_utc")]
    pub lastinstall: DateTime<Utc>,
    pub state: SwUpdateState,
}

impl Default for SwUpdate {
    fn default() -> Self {
        Self {
            lastinstall: Utc::now(),
            state: SwUpdateState::NoUpdates,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareUpdate2 {
    pub checkforupdate: bool,
    pub bridge: SwUpdate,
    pub state: SwUpdateState,
    #[serde(with = "date_format::legacy_utc")]
    pub lastchange: DateTime<Utc>,
}

impl Default for SoftwareUpdate2 {
    fn default() -> Self {
        Self {
            checkforupdate: false,
            bridge: SwUpdate::default(),
            state: SwUpdateState::NoUpdates,
            lastchange: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Whitelist {
    #[serde(with = "date_format::legacy_utc", rename = "create date")]
    pub create_date: DateTime<Utc>,
    #[serde(with = "date_format::legacy_utc", rename = "last use date")]
    pub last_use_date: DateTime<Utc>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(flatten)]
    pub short_config: ApiShortConfig,
    pub zigbeechannel: u8,
    pub dhcp: bool,
    pub ipaddress: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub proxyaddress: String,
    pub proxyport: u16,
    #[serde(with = "date_format::legacy_utc", rename = "UTC")]
    pub utc: DateTime<Utc>,
    #[serde(with = "date_format::legacy_naive")]
    pub localtime: NaiveDateTime,
    pub timezone: String,
    pub whitelist: HashMap<String, Whitelist>,
    pub swupdate2: SoftwareUpdate2,
    pub linkbutton: bool,
    pub portalservices: bool,
    pub portalconnection: ConnectionState,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            short_config: ApiShortConfig::default(),
            zigbeechannel: 25,
            dhcp: true,
            ipaddress: Ipv4Addr::UNSPECIFIED,
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::UNSPECIFIED,
            proxyaddress: "none".to_string(),
            proxyport: 0,
            utc: Utc::now(),
            localtime: Local::now().naive_local(),
            timezone: best_guess_timezone(),
            whitelist: HashMap::new(),
            swupdate2: SoftwareUpdate2::default(),
            linkbutton: false,
            portalservices: false,
            portalconnection: ConnectionState::Disconnected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightColorMode {
    Ct,
    Xy,
    Hs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiLightState {
    pub on: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sat: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xy: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ct: Option<u16>,
    pub alert: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colormode: Option<LightColorMode>,
    pub mode: String,
    pub reachable: bool,
}

impl ApiLightState {
    /// State reported for lights whose backend state is unknown or unusable.
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            on: false,
            bri: None,
            hue: None,
            sat: None,
            effect: None,
            xy: None,
            ct: None,
            alert: "none".to_string(),
            colormode: None,
            mode: "homeautomation".to_string(),
            reachable: false,
        }
    }
}

/// Body of `PUT /api/<user>/lights/<id>/state`.
///
/// Numeric fields are kept wide, so out-of-range values from clients can be
/// clamped instead of rejected. Unknown fields (`alert`, `effect`, ...) are
/// silently ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiLightStateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri_inc: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xy: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ct: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transitiontime: Option<u16>,
}

impl ApiLightStateUpdate {
    pub const BRI_MAX: i64 = 254;
    pub const CT_MIN: i64 = 153;
    pub const CT_MAX: i64 = 500;

    #[must_use]
    pub const fn new() -> Self {
        Self {
            on: None,
            bri: None,
            bri_inc: None,
            hue: None,
            sat: None,
            xy: None,
            ct: None,
            transitiontime: None,
        }
    }

    #[must_use]
    pub const fn with_on(self, on: bool) -> Self {
        Self {
            on: Some(on),
            ..self
        }
    }

    #[must_use]
    pub const fn with_bri(self, bri: i64) -> Self {
        Self {
            bri: Some(bri),
            ..self
        }
    }

    /// Clamp every field into its valid range.
    #[must_use]
    pub fn clamped(&self) -> Self {
        Self {
            on: self.on,
            bri: self.bri.map(|b| b.clamp(0, Self::BRI_MAX)),
            bri_inc: self.bri_inc.map(|b| b.clamp(-Self::BRI_MAX, Self::BRI_MAX)),
            hue: self.hue.map(|h| h.clamp(0, i64::from(u16::MAX))),
            sat: self.sat.map(|s| s.clamp(0, Self::BRI_MAX)),
            xy: self.xy.map(|[x, y]| [x.clamp(0.0, 1.0), y.clamp(0.0, 1.0)]),
            ct: self.ct.map(|ct| ct.clamp(Self::CT_MIN, Self::CT_MAX)),
            transitiontime: self.transitiontime,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.on.is_none()
            && self.bri.is_none()
            && self.bri_inc.is_none()
            && self.hue.is_none()
            && self.sat.is_none()
            && self.xy.is_none()
            && self.ct.is_none()
            && self.transitiontime.is_none()
    }

    /// Field names and values, in wire order, as echoed in success replies.
    #[must_use]
    pub fn fields(&self) -> Vec<(&'static str, Value)> {
        let mut res = vec![];
        if let Some(on) = self.on {
            res.push(("on", json!(on)));
        }
        if let Some(bri) = self.bri {
            res.push(("bri", json!(bri)));
        }
        if let Some(bri_inc) = self.bri_inc {
            res.push(("bri_inc", json!(bri_inc)));
        }
        if let Some(hue) = self.hue {
            res.push(("hue", json!(hue)));
        }
        if let Some(sat) = self.sat {
            res.push(("sat", json!(sat)));
        }
        if let Some(xy) = self.xy {
            res.push(("xy", json!(xy)));
        }
        if let Some(ct) = self.ct {
            res.push(("ct", json!(ct)));
        }
        if let Some(tt) = self.transitiontime {
            res.push(("transitiontime", json!(tt)));
        }
        res
    }
}

/// Reply of a v1 `PUT`: one `{"success": {"<address>": value}}` entry per
/// changed attribute, or an `{"error": ..}` entry for attributes that could
/// not be changed.
#[derive(Debug, Clone)]
pub struct V1Reply {
    prefix: String,
    entries: Vec<Value>,
}

impl V1Reply {
    #[must_use]
    pub const fn new(prefix: String) -> Self {
        Self {
            prefix,
            entries: vec![],
        }
    }

    #[must_use]
    pub fn for_light(id: u32, path: &str) -> Self {
        Self::new(format!("/lights/{id}/{path}"))
    }

    #[must_use]
    pub fn for_group_path(id: u32, path: &str) -> Self {
        Self::new(format!("/groups/{id}/{path}"))
    }

    #[must_use]
    pub fn add(mut self, name: &str, value: Value) -> Self {
        let address = format!("{}/{name}", self.prefix);
        self.entries.push(json!({"success": {address: value}}));
        self
    }

    #[must_use]
    pub fn add_error(mut self, name: &str, err: HueApiV1Error) -> Self {
        let address = format!("{}/{name}", self.prefix);
        self.entries
            .push(json!({"error": HueError::new(err, address)}));
        self
    }

    #[must_use]
    pub fn with_light_state_update(self, upd: &ApiLightStateUpdate) -> Self {
        self.with_light_state_update_except(upd, &[])
    }

    /// Like [`V1Reply::with_light_state_update`], but fields named in
    /// `rejected` are reported as not modifiable because the light is off.
    #[must_use]
    pub fn with_light_state_update_except(
        self,
        upd: &ApiLightStateUpdate,
        rejected: &[&str],
    ) -> Self {
        upd.fields().into_iter().fold(self, |reply, (name, value)| {
            if rejected.contains(&name) {
                reply.add_error(name, HueApiV1Error::DeviceIsOff)
            } else {
                reply.add(name, value)
            }
        })
    }

    #[must_use]
    pub fn json(self) -> Value {
        Value::Array(self.entries)
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiLightUpdate {
    pub name: Option<String>,
}

/// What kind of bulb a light presents itself as. Clients pick which controls
/// to show from this, so it has to match the backend capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightKind {
    ExtendedColor,
    Color,
    ColorTemperature,
    Dimmable,
    OnOff,
}

impl LightKind {
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::ExtendedColor => "Extended color light",
            Self::Color => "Color light",
            Self::ColorTemperature => "Color temperature light",
            Self::Dimmable => "Dimmable light",
            Self::OnOff => "On/Off plug-in unit",
        }
    }

    #[must_use]
    pub const fn model_id(self) -> &'static str {
        match self {
            Self::ExtendedColor => "LCT015",
            Self::Color => "LLC020",
            Self::ColorTemperature => "LTW001",
            Self::Dimmable => "LWB010",
            Self::OnOff => "LOM001",
        }
    }

    #[must_use]
    pub const fn product_name(self) -> &'static str {
        match self {
            Self::ExtendedColor => "Hue color lamp",
            Self::Color => "Hue go",
            Self::ColorTemperature => "Hue ambiance lamp",
            Self::Dimmable => "Hue white lamp",
            Self::OnOff => "Hue Smart plug",
        }
    }

    #[must_use]
    pub const fn archetype(self) -> &'static str {
        match self {
            Self::ExtendedColor | Self::Color => "sultanbulb",
            Self::ColorTemperature | Self::Dimmable => "classicbulb",
            Self::OnOff => "plug",
        }
    }

    const fn has_color(self) -> bool {
        matches!(self, Self::ExtendedColor | Self::Color)
    }

    const fn has_ct(self) -> bool {
        matches!(self, Self::ExtendedColor | Self::ColorTemperature)
    }

    fn capabilities(self) -> Value {
        let mut control = serde_json::Map::new();
        if !matches!(self, Self::OnOff) {
            control.insert("mindimlevel".into(), json!(1000));
            control.insert("maxlumen".into(), json!(800));
        }
        if self.has_color() {
            control.insert("colorgamuttype".into(), json!("C"));
            control.insert(
                "colorgamut".into(),
                json!([[0.6915, 0.3083], [0.17, 0.7], [0.1532, 0.0475]]),
            );
        }
        if self.has_ct() {
            control.insert(
                "ct".into(),
                json!({
                    "min": ApiLightStateUpdate::CT_MIN,
                    "max": ApiLightStateUpdate::CT_MAX,
                }),
            );
        }

        json!({
            "certified": true,
            "control": control,
            "streaming": {
                "renderer": self.has_color(),
                "proxy": self.has_color(),
            }
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiLight {
    pub state: ApiLightState,
    pub swupdate: SwUpdate,
    #[serde(rename = "type")]
    pub light_type: String,
    pub name: String,
    pub modelid: String,
    pub manufacturername: String,
    pub productname: String,
    pub capabilities: Value,
    pub config: Value,
    pub uniqueid: String,
    pub swversion: String,
}

impl ApiLight {
    pub const SWVERSION: &'static str = "1.50.2_r30933";

    #[must_use]
    pub fn new(kind: LightKind, name: &str, uniqueid: String, state: ApiLightState) -> Self {
        Self {
            state,
            swupdate: SwUpdate::default(),
            light_type: kind.type_name().to_string(),
            name: name.to_string(),
            modelid: kind.model_id().to_string(),
            manufacturername: SIGNIFY_MANUFACTURER_NAME.to_string(),
            productname: kind.product_name().to_string(),
            capabilities: kind.capabilities(),
            config: json!({
                "archetype": kind.archetype(),
                "function": "mixed",
                "direction": "omnidirectional",
                "startup": {
                    "mode": "safety",
                    "configured": true
                }
            }),
            uniqueid,
            swversion: Self::SWVERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiGroupType {
    #[default]
    LightGroup,
    Room,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiGroupClass {
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiGroupState {
    pub all_on: bool,
    pub any_on: bool,
}

impl ApiGroupState {
    #[must_use]
    pub fn from_lights<'a>(lights: impl IntoIterator<Item = &'a ApiLightState>) -> Self {
        let mut res = Self {
            all_on: true,
            any_on: false,
        };
        let mut empty = true;
        for light in lights {
            empty = false;
            res.all_on &= light.on;
            res.any_on |= light.on;
        }
        res.all_on &= !empty;
        res
    }
}

/// Last action of a group. Real bridges report what was last sent; here it
/// is the state of the first light in the group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiGroupAction {
    pub on: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sat: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xy: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ct: Option<u16>,
    pub alert: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colormode: Option<LightColorMode>,
}

impl Default for ApiGroupAction {
    fn default() -> Self {
        Self {
            on: false,
            bri: None,
            hue: None,
            sat: None,
            effect: None,
            xy: None,
            ct: None,
            alert: "none".to_string(),
            colormode: None,
        }
    }
}

impl From<&ApiLightState> for ApiGroupAction {
    fn from(state: &ApiLightState) -> Self {
        Self {
            on: state.on,
            bri: state.bri,
            hue: state.hue,
            sat: state.sat,
            effect: state.effect.clone(),
            xy: state.xy,
            ct: state.ct,
            alert: state.alert.clone(),
            colormode: state.colormode,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiGroup {
    pub name: String,
    pub lights: Vec<String>,
    pub action: ApiGroupAction,
    #[serde(rename = "type")]
    pub group_type: ApiGroupType,
    pub class: ApiGroupClass,
    pub recycle: bool,
    pub sensors: Vec<Value>,
    pub state: ApiGroupState,
}

impl ApiGroup {
    /// Group 0, the implicit group of all lights.
    #[must_use]
    pub fn make_group_0(lights: &[(u32, ApiLightState)]) -> Self {
        Self {
            name: "Group 0".into(),
            group_type: ApiGroupType::LightGroup,
            ..Self::room(String::new(), lights)
        }
    }

    #[must_use]
    pub fn room(name: String, lights: &[(u32, ApiLightState)]) -> Self {
        Self {
            name,
            lights: lights.iter().map(|(id, _)| id.to_string()).collect(),
            action: lights
                .first()
                .map(|(_, state)| ApiGroupAction::from(state))
                .unwrap_or_default(),
            group_type: ApiGroupType::Room,
            class: ApiGroupClass::default(),
            recycle: false,
            sensors: vec![],
            state: ApiGroupState::from_lights(lights.iter().map(|(_, state)| state)),
        }
    }
}

/// Full datastore, as returned by `GET /api/<user>`.
#[derive(Debug, Serialize)]
pub struct ApiUserConfig {
    pub config: ApiConfig,
    pub lights: BTreeMap<String, ApiLight>,
    pub groups: BTreeMap<String, ApiGroup>,
    pub scenes: BTreeMap<String, Value>,
    pub rules: BTreeMap<String, Value>,
    pub schedules: BTreeMap<String, Value>,
    pub sensors: BTreeMap<String, Value>,
    pub resourcelinks: BTreeMap<String, Value>,
}

impl ApiUserConfig {
    #[must_use]
    pub const fn new(
        config: ApiConfig,
        lights: BTreeMap<String, ApiLight>,
        groups: BTreeMap<String, ApiGroup>,
    ) -> Self {
        Self {
            config,
            lights,
            groups,
            scenes: BTreeMap::new(),
            rules: BTreeMap::new(),
            schedules: BTreeMap::new(),
            sensors: BTreeMap::new(),
            resourcelinks: BTreeMap::new(),
        }
    }
}
