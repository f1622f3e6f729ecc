use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error conditions of the v1 api, with their numeric wire codes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HueApiV1Error {
    #[error("unauthorized user")]
    UnauthorizedUser,

    #[error("body contains invalid JSON")]
    BodyContainsInvalidJson,

    #[error("resource not available")]
    ResourceNotAvailable,

    #[error("method not available for resource")]
    MethodNotAvailable,

    #[error("missing parameters in body")]
    MissingParameters,

    #[error("invalid value for parameter")]
    InvalidValue,

    #[error("link button not pressed")]
    LinkButtonNotPressed,

    #[error("parameter not modifiable, device is set to off")]
    DeviceIsOff,

    #[error("internal error, 901")]
    BridgeInternalError,
}

impl HueApiV1Error {
    #[must_use]
    pub const fn error_type(self) -> u32 {
        match self {
            Self::UnauthorizedUser => 1,
            Self::BodyContainsInvalidJson => 2,
            Self::ResourceNotAvailable => 3,
            Self::MethodNotAvailable => 4,
            Self::MissingParameters => 5,
            Self::InvalidValue => 7,
            Self::LinkButtonNotPressed => 101,
            Self::DeviceIsOff => 201,
            Self::BridgeInternalError => 901,
        }
    }
}

/// The error object found inside `[{"error": {...}}]` replies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HueError {
    #[serde(rename = "type")]
    pub typ: u32,
    pub address: String,
    pub description: String,
}

impl HueError {
    #[must_use]
    pub fn new(err: HueApiV1Error, address: impl Into<String>) -> Self {
        let address = address.into();
        let description = match err {
            HueApiV1Error::ResourceNotAvailable => format!("resource, {address}, not available"),
            HueApiV1Error::MethodNotAvailable => {
                format!("method not available for resource, {address}")
            }
            HueApiV1Error::DeviceIsOff => {
                let param = address.rsplit('/').next().unwrap_or_default();
                format!("parameter, {param}, is not modifiable. Device is set to off.")
            }
            _ => err.to_string(),
        };

        Self {
            typ: err.error_type(),
            address,
            description,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{HueApiV1Error, HueError};

    #[test]
    fn resource_not_available_mentions_address() {
        let err = HueError::new(HueApiV1Error::ResourceNotAvailable, "/lights/7");
        assert_eq!(err.typ, 3);
        assert_eq!(err.description, "resource, /lights/7, not available");
    }

    #[test]
    fn internal_error_is_901() {
        let err = HueError::new(HueApiV1Error::BridgeInternalError, "/lights/1/state");
        assert_eq!(err.typ, 901);
        assert_eq!(err.description, "internal error, 901");
    }

    #[test]
    fn device_off_names_the_parameter() {
        let err = HueError::new(HueApiV1Error::DeviceIsOff, "/lights/2/state/bri");
        assert_eq!(err.typ, 201);
        assert_eq!(
            err.description,
            "parameter, bri, is not modifiable. Device is set to off."
        );
    }
}
