use axum::extract::{FromRequest, Request};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use hue::error::HueApiV1Error;

use crate::routes::{ApiV1Error, resource_address};

/// Json body extractor and response type.
///
/// Unlike [`axum::Json`], the request `Content-Type` is not checked (many hue
/// clients send none, or a wrong one), and a bad body is rejected with a hue
/// error reply instead of a plain-text 4xx.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiV1Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let address = resource_address(req.uri().path());

        let bytes = Bytes::from_request(req, state).await.map_err(|err| {
            log::warn!("Failed to read request body: {err}");
            ApiV1Error::new(HueApiV1Error::BodyContainsInvalidJson, address.clone())
        })?;

        serde_json::from_slice(&bytes).map(Self).map_err(|err| {
            log::debug!("Invalid json body for {address}: {err}");
            ApiV1Error::new(HueApiV1Error::BodyContainsInvalidJson, address)
        })
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}
