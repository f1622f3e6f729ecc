pub mod entity;
pub mod hass;
