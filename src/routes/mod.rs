pub mod api;
pub mod description;
pub mod extractor;

use axum::Router;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use hue::error::{HueApiV1Error, HueError};

use crate::error::ApiError;
use crate::routes::extractor::Json;
use crate::server::appstate::AppState;

/// Error reply of the v1 api.
///
/// Hue clients expect errors as a json list with status 200, so this never
/// turns into an http error status.
#[derive(Debug)]
pub struct ApiV1Error {
    pub kind: HueApiV1Error,
    pub address: String,
}

pub type ApiV1Result<T> = Result<T, ApiV1Error>;

impl ApiV1Error {
    pub fn new(kind: HueApiV1Error, address: impl Into<String>) -> Self {
        Self {
            kind,
            address: address.into(),
        }
    }

    /// Replace the resource address reported to the client.
    #[must_use]
    pub fn at(self, address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..self
        }
    }
}

impl From<HueApiV1Error> for ApiV1Error {
    fn from(kind: HueApiV1Error) -> Self {
        Self::new(kind, "/")
    }
}

impl From<ApiError> for ApiV1Error {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::UnknownLight(id) => {
                Self::new(HueApiV1Error::ResourceNotAvailable, format!("/lights/{id}"))
            }
            ApiError::UnknownGroup(id) => {
                Self::new(HueApiV1Error::ResourceNotAvailable, format!("/groups/{id}"))
            }
            ApiError::HueApiV1Error(kind) => Self::from(kind),
            ApiError::SerdeJson(_) => Self::from(HueApiV1Error::BodyContainsInvalidJson),
            err => {
                log::error!("Request failed: {err}");
                Self::from(HueApiV1Error::BridgeInternalError)
            }
        }
    }
}

impl IntoResponse for ApiV1Error {
    fn into_response(self) -> Response {
        log::debug!("V1 error reply: {} at {}", self.kind, self.address);

        let err = HueError::new(self.kind, self.address);

        Json(json!([{ "error": err }])).into_response()
    }
}

/// Strip the username from a path inside the `/api` router, giving the
/// resource address used in v1 replies (`/<user>/lights/1/state` becomes
/// `/lights/1/state`).
#[must_use]
pub fn resource_address(path: &str) -> String {
    let mut segments = path.trim_start_matches('/').splitn(2, '/');
    match (segments.next(), segments.next()) {
        (_, Some(rest)) => format!("/{rest}"),
        _ => "/".to_string(),
    }
}

pub fn router(appstate: AppState) -> Router {
    Router::new()
        .nest("/api", api::router())
        .merge(description::router())
        .with_state(appstate)
}

#[cfg(test)]
mod tests {
    use hue::error::HueApiV1Error;

    use crate::error::ApiError;
    use crate::routes::{ApiV1Error, resource_address};

    #[test]
    fn address_strips_username() {
        assert_eq!(resource_address("/user/lights/1/state"), "/lights/1/state");
        assert_eq!(resource_address("/user/lights"), "/lights");
        assert_eq!(resource_address("/user"), "/");
        assert_eq!(resource_address("/"), "/");
    }

    #[test]
    fn backend_errors_are_internal_errors() {
        let err = ApiV1Error::from(ApiError::BackendTimeout(std::time::Duration::from_secs(5)));
        assert_eq!(err.kind, HueApiV1Error::BridgeInternalError);

        let err = ApiV1Error::from(ApiError::UnknownLight(9));
        assert_eq!(err.kind, HueApiV1Error::ResourceNotAvailable);
        assert_eq!(err.address, "/lights/9");
    }
}
