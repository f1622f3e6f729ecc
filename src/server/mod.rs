pub mod appstate;
pub mod http;
pub mod mdns;
pub mod service;
pub mod ssdp;

use axum::extract::Request;
use axum::routing::IntoMakeService;
use axum::{Router, ServiceExt};
use tower::Layer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::TraceLayer;

use crate::routes;
use crate::server::appstate::AppState;

pub fn build_service(appstate: AppState) -> IntoMakeService<NormalizePath<Router>> {
    let normalized = NormalizePathLayer::trim_trailing_slash()
        .layer(routes::router(appstate).layer(TraceLayer::new_for_http()));

    ServiceExt::<Request>::into_make_service(normalized)
}
