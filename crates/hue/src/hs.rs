use serde::{Deserialize, Serialize};

/// Hue and saturation as carried by the v1 api: hue spans `0..=65535` for a
/// full turn, saturation spans `0..=254`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawHS {
    pub hue: u16,
    pub sat: u8,
}

impl RawHS {
    pub const HUE_MAX: u16 = u16::MAX;
    pub const SAT_MAX: u8 = 254;

    /// Convert from degrees (`0..=360`) and percent (`0..=100`).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_degrees(hue: f64, sat: f64) -> Self {
        let hue = hue.clamp(0.0, 360.0) / 360.0 * f64::from(Self::HUE_MAX);
        let sat = sat.clamp(0.0, 100.0) / 100.0 * f64::from(Self::SAT_MAX);
        Self {
            hue: hue.round() as u16,
            sat: sat.round() as u8,
        }
    }

    /// Convert to `[degrees, percent]`.
    #[must_use]
    pub fn to_degrees(self) -> [f64; 2] {
        [
            f64::from(self.hue) / f64::from(Self::HUE_MAX) * 360.0,
            f64::from(self.sat) / f64::from(Self::SAT_MAX) * 100.0,
        ]
    }
}
