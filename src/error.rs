use std::io;

use thiserror::Error;

use hue::error::HueApiV1Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /* mapped errors */
    #[error(transparent)]
    IOError(#[from] io::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    SerdeYaml(#[from] serde_yml::Error),

    #[error(transparent)]
    XmlSerialize(#[from] quick_xml::SeError),

    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    ConfigError(#[from] config::ConfigError),

    #[error(transparent)]
    SslError(#[from] openssl::error::ErrorStack),

    #[error(transparent)]
    TungsteniteError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    MdnsSdError(#[from] mdns_sd::Error),

    #[error(transparent)]
    NixError(#[from] nix::Error),

    #[error(transparent)]
    SetLoggerError(#[from] log::SetLoggerError),

    #[error(transparent)]
    JoinError(#[from] tokio::task::JoinError),

    #[error(transparent)]
    HueApiV1Error(#[from] HueApiV1Error),

    /* emuhue errors */
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Backend call timed out after {0:?}")]
    BackendTimeout(std::time::Duration),

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Unknown light id {0}")]
    UnknownLight(u32),

    #[error("Unknown group id {0}")]
    UnknownGroup(u32),

    #[error("Command dispatcher for light {0} is closed")]
    DispatcherClosed(u32),
}

impl ApiError {
    pub fn service_error(msg: impl Into<String>) -> Self {
        Self::ServiceError(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Backend failures are shared between every waiter of a coalesced command,
/// so they have to be cloneable. Only the message survives.
impl Clone for ApiError {
    fn clone(&self) -> Self {
        match self {
            Self::BackendTimeout(dur) => Self::BackendTimeout(*dur),
            Self::UnknownLight(id) => Self::UnknownLight(*id),
            Self::UnknownGroup(id) => Self::UnknownGroup(*id),
            Self::HueApiV1Error(err) => Self::HueApiV1Error(*err),
            Self::DispatcherClosed(id) => Self::DispatcherClosed(*id),
            Self::InvalidConfig(msg) => Self::InvalidConfig(msg.clone()),
            Self::ServiceError(msg) => Self::ServiceError(msg.clone()),
            other => Self::BackendError(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
