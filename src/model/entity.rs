use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use hue::legacy_api::LightKind;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Light,
    Switch,
}

impl Domain {
    #[must_use]
    pub fn from_entity_id(entity_id: &str) -> Option<Self> {
        match entity_id.split_once('.')?.0 {
            "light" => Some(Self::Light),
            "switch" => Some(Self::Switch),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Switch => "switch",
        }
    }
}

/// What an entity can do besides switching on and off.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Capabilities {
    pub brightness: bool,
    pub color_temp: bool,
    pub color: bool,
}

impl Capabilities {
    #[must_use]
    pub const fn light_kind(self) -> LightKind {
        match (self.color, self.color_temp, self.brightness) {
            (true, true, _) => LightKind::ExtendedColor,
            (true, false, _) => LightKind::Color,
            (false, true, _) => LightKind::ColorTemperature,
            (false, false, true) => LightKind::Dimmable,
            (false, false, false) => LightKind::OnOff,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    ColorTemp,
    Hs,
    Xy,
}

/// Last known backend state, in backend units.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EntityState {
    pub available: bool,
    pub on: bool,
    /// `0..=255`
    pub brightness: Option<u8>,
    /// `[hue degrees, saturation percent]`
    pub hs_color: Option<[f64; 2]>,
    pub xy_color: Option<[f64; 2]>,
    /// mireds
    pub color_temp: Option<u16>,
    pub color_mode: Option<ColorMode>,
}

impl EntityState {
    #[must_use]
    pub const fn unavailable() -> Self {
        Self {
            available: false,
            on: false,
            brightness: None,
            hs_color: None,
            xy_color: None,
            color_temp: None,
            color_mode: None,
        }
    }
}

impl Default for EntityState {
    fn default() -> Self {
        Self::unavailable()
    }
}

/// Home Assistant area an entity is assigned to. Areas become hue rooms.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct Area {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub entity_id: String,
    pub domain: Domain,
    pub name: String,
    /// Lowercase label ids and label names
    pub labels: BTreeSet<String>,
    pub area: Option<Area>,
    pub capabilities: Capabilities,
    pub state: EntityState,
}

impl Entity {
    #[must_use]
    pub fn light_kind(&self) -> LightKind {
        match self.domain {
            Domain::Switch => LightKind::OnOff,
            Domain::Light => self.capabilities.light_kind(),
        }
    }

    /// True if any label matches the (lowercase) allow-list. An empty list
    /// admits everything.
    #[must_use]
    pub fn matches_labels(&self, filter: &[String]) -> bool {
        filter.is_empty() || filter.iter().any(|label| self.labels.contains(label))
    }
}
