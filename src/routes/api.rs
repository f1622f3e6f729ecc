use axum::Router;
use axum::extract::{Path, State};
use axum::http::{Method, Uri};
use axum::routing::{get, post, put};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{Value, json};

use hue::error::HueApiV1Error;
use hue::legacy_api::{
    ApiLightStateUpdate, ApiLightUpdate, ApiResourceType, ApiUserConfig, HueApiResult, NewUser,
    V1Reply,
};

use crate::routes::extractor::Json;
use crate::routes::{ApiV1Error, ApiV1Result, resource_address};
use crate::server::appstate::{AppState, api_light};

/// Maximum length of a light name, as enforced by real bridges.
const MAX_NAME_LEN: usize = 32;

async fn get_api_config(State(state): State<AppState>) -> Json<impl Serialize> {
    Json(state.api_short_config())
}

async fn post_api(
    State(state): State<AppState>,
    Json(req): Json<NewUser>,
) -> ApiV1Result<Json<impl Serialize>> {
    log::info!("New user requested by [{}]", req.devicetype);
    let reply = state
        .create_user(&req.devicetype, req.generateclientkey)
        .await
        .map_err(|err| ApiV1Error::from(err).at(""))?;
    Ok(Json(vec![HueApiResult::Success(reply)]))
}

async fn authorize(state: &AppState, username: &str, address: &str) -> ApiV1Result<()> {
    if state.authorize(username).await {
        Ok(())
    } else {
        Err(ApiV1Error::new(HueApiV1Error::UnauthorizedUser, address))
    }
}

async fn get_api_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiV1Result<Json<impl Serialize>> {
    authorize(&state, &username, "/").await?;

    Ok(Json(ApiUserConfig::new(
        state.api_config().await,
        state.api_lights().await,
        state.api_groups().await,
    )))
}

fn parse_resource(rtype: &str) -> ApiV1Result<ApiResourceType> {
    rtype
        .parse()
        .map_err(|_| ApiV1Error::new(HueApiV1Error::ResourceNotAvailable, format!("/{rtype}")))
}

/// Only lights and groups are addressable by id.
fn parse_id(rtype: &str, id: &str) -> ApiV1Result<(ApiResourceType, u32)> {
    let not_found = || ApiV1Error::new(HueApiV1Error::ResourceNotAvailable, format!("/{rtype}/{id}"));

    let rtype = parse_resource(rtype)?;
    if !matches!(rtype, ApiResourceType::Lights | ApiResourceType::Groups) {
        return Err(not_found());
    }

    let id = id.parse().map_err(|_| not_found())?;
    Ok((rtype, id))
}

async fn get_api_user_resource(
    State(state): State<AppState>,
    Path((username, rtype)): Path<(String, String)>,
) -> ApiV1Result<Json<Value>> {
    let resource = parse_resource(&rtype)?;

    if !state.authorize(&username).await {
        // unknown users still get to see the public part of the config
        if resource == ApiResourceType::Config {
            return Ok(Json(json!(state.api_short_config())));
        }
        return Err(ApiV1Error::new(
            HueApiV1Error::UnauthorizedUser,
            format!("/{rtype}"),
        ));
    }

    let reply = match resource {
        ApiResourceType::Lights => json!(state.api_lights().await),
        ApiResourceType::Groups => json!(state.api_groups().await),
        ApiResourceType::Config => json!(state.api_config().await),
        ApiResourceType::Resourcelinks
        | ApiResourceType::Rules
        | ApiResourceType::Scenes
        | ApiResourceType::Schedules
        | ApiResourceType::Sensors
        | ApiResourceType::Capabilities => json!({}),
    };

    Ok(Json(reply))
}

async fn get_api_user_resource_id(
    State(state): State<AppState>,
    Path((username, rtype, id)): Path<(String, String, String)>,
) -> ApiV1Result<Json<Value>> {
    log::debug!("GET v1 username={username} resource={rtype} id={id}");
    authorize(&state, &username, &format!("/{rtype}/{id}")).await?;

    let reply = match parse_id(&rtype, &id)? {
        (ApiResourceType::Groups, id) => json!(state.api_group(id).await?),
        (_, id) => json!(api_light(&state.light(id).await?)),
    };

    Ok(Json(reply))
}

async fn put_api_user_resource_id(
    State(state): State<AppState>,
    Path((username, rtype, id)): Path<(String, String, String)>,
    Json(req): Json<ApiLightUpdate>,
) -> ApiV1Result<Json<Value>> {
    log::debug!("PUT v1 username={username} resource={rtype} id={id}");
    authorize(&state, &username, &format!("/{rtype}/{id}")).await?;

    let id = match parse_id(&rtype, &id)? {
        (ApiResourceType::Lights, id) => id,
        (_, id) => {
            return Err(ApiV1Error::new(
                HueApiV1Error::MethodNotAvailable,
                format!("/{rtype}/{id}"),
            ));
        }
    };
    let address = format!("/lights/{id}");

    let Some(name) = req.name else {
        return Err(ApiV1Error::new(HueApiV1Error::MissingParameters, address));
    };

    if name.trim().is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(ApiV1Error::new(
            HueApiV1Error::InvalidValue,
            format!("{address}/name"),
        ));
    }

    let registry = state.registry();
    let mut lock = registry.lock().await;
    let entity = lock
        .rename(id, &name)
        .ok_or_else(|| ApiV1Error::new(HueApiV1Error::ResourceNotAvailable, address.clone()))?;
    log::info!("Renamed light {id} ({}) to [{name}]", entity.entity_id);
    drop(lock);

    Ok(Json(V1Reply::new(address).add("name", json!(name)).json()))
}

async fn put_light_state(
    state: &AppState,
    id: u32,
    upd: ApiLightStateUpdate,
) -> ApiV1Result<Json<Value>> {
    let entity = state.light(id).await?;
    log::debug!("PUT v1 light={id} ({}) {upd:?}", entity.entity_id);

    let applied = state
        .dispatcher()
        .submit(id, upd.clone())
        .await
        .map_err(|err| ApiV1Error::from(err).at(format!("/lights/{id}/state")))?;

    let reply =
        V1Reply::for_light(id, "state").with_light_state_update_except(&upd, &applied.rejected);

    Ok(Json(reply.json()))
}

async fn put_group_action(
    state: &AppState,
    id: u32,
    upd: ApiLightStateUpdate,
) -> ApiV1Result<Json<Value>> {
    let lights = state.group_lights(id).await?;
    log::debug!("PUT v1 group={id} lights={lights:?} {upd:?}");

    let dispatcher = state.dispatcher();
    let results = join_all(
        lights
            .iter()
            .map(|light_id| dispatcher.submit(*light_id, upd.clone())),
    )
    .await;

    if let Some(err) = results.into_iter().find_map(Result::err) {
        return Err(ApiV1Error::from(err).at(format!("/groups/{id}/action")));
    }

    let reply = V1Reply::for_group_path(id, "action").with_light_state_update(&upd);

    Ok(Json(reply.json()))
}

async fn put_api_user_resource_id_path(
    State(state): State<AppState>,
    Path((username, rtype, id, path)): Path<(String, String, String, String)>,
    Json(req): Json<ApiLightStateUpdate>,
) -> ApiV1Result<Json<Value>> {
    authorize(&state, &username, &format!("/{rtype}/{id}/{path}")).await?;

    let upd = req.clamped();
    match (parse_id(&rtype, &id)?, path.as_str()) {
        ((ApiResourceType::Lights, id), "state") => put_light_state(&state, id, upd).await,
        ((ApiResourceType::Groups, id), "action") => put_group_action(&state, id, upd).await,
        _ => Err(ApiV1Error::new(
            HueApiV1Error::ResourceNotAvailable,
            format!("/{rtype}/{id}/{path}"),
        )),
    }
}

async fn method_not_available(method: Method, uri: Uri) -> ApiV1Error {
    log::debug!("Unsupported v1 request: {method} {uri}");
    ApiV1Error::new(
        HueApiV1Error::MethodNotAvailable,
        resource_address(uri.path()),
    )
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(post_api).fallback(method_not_available))
        .route("/config", get(get_api_config).fallback(method_not_available))
        .route(
            "/nouser/config",
            get(get_api_config).fallback(method_not_available),
        )
        .route("/{user}", get(get_api_user).fallback(method_not_available))
        .route(
            "/{user}/{rtype}",
            get(get_api_user_resource).fallback(method_not_available),
        )
        .route(
            "/{user}/{rtype}/{id}",
            get(get_api_user_resource_id)
                .put(put_api_user_resource_id)
                .fallback(method_not_available),
        )
        .route(
            "/{user}/{rtype}/{id}/{key}",
            put(put_api_user_resource_id_path).fallback(method_not_available),
        )
        .fallback(method_not_available)
}
