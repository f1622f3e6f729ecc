use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use hue::upnp::Description;

use crate::server::appstate::AppState;

async fn get_description(State(state): State<AppState>) -> Response {
    let conf = state.config();
    let bridge = &conf.bridge;

    let desc = Description::new(
        bridge.ipaddress(),
        bridge.discovery_http_port(),
        bridge.mac(),
    );

    match desc.to_xml() {
        Ok(xml) => ([(header::CONTENT_TYPE, "text/xml")], xml).into_response(),
        Err(err) => {
            log::error!("Failed to render description.xml: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/description.xml", get(get_description))
}
