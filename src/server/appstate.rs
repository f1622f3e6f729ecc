use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use itertools::Itertools;
use sha1::{Digest, Sha1};
use tokio::sync::Mutex;

use hue::error::HueApiV1Error;
use hue::legacy_api::{
    ApiConfig, ApiGroup, ApiLight, ApiLightState, ApiShortConfig, NewUserReply,
};

use crate::config::AppConfig;
use crate::dispatcher::{Backend, Dispatcher};
use crate::error::{ApiError, ApiResult};
use crate::model::entity::Entity;
use crate::registry::{Group, Registry};
use crate::translate;
use crate::users::Users;

/// How long the virtual link button stays pressed after startup.
pub const LINK_BUTTON_DURATION: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct AppState {
    conf: Arc<AppConfig>,
    registry: Arc<Mutex<Registry>>,
    dispatcher: Arc<Dispatcher>,
    users: Arc<Mutex<Users>>,
    linkbutton_until: Arc<Mutex<Option<Instant>>>,
}

impl AppState {
    pub fn from_config(config: AppConfig, backend: Arc<dyn Backend>) -> ApiResult<Self> {
        let filter = config.hass.label_filter.clone();
        if !filter.is_empty() {
            log::info!("Exposing only entities labelled {}", filter.join(", "));
        }

        let registry = match &config.bridge.light_id_file {
            Some(path) => Registry::with_id_cache(filter, path)?,
            None => Registry::new(filter),
        };
        let registry = Arc::new(Mutex::new(registry));

        let users = match &config.bridge.users_file {
            Some(path) => Users::with_file(path)?,
            None => Users::new(),
        };

        let dispatcher = Dispatcher::new(
            backend,
            registry.clone(),
            config.bridge.debounce(),
            config.hass.timeout(),
        );

        Ok(Self {
            conf: Arc::new(config),
            registry,
            dispatcher: Arc::new(dispatcher),
            users: Arc::new(Mutex::new(users)),
            linkbutton_until: Arc::new(Mutex::new(None)),
        })
    }

    #[must_use]
    pub fn config(&self) -> Arc<AppConfig> {
        self.conf.clone()
    }

    #[must_use]
    pub fn registry(&self) -> Arc<Mutex<Registry>> {
        self.registry.clone()
    }

    #[must_use]
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Fetch all entities from the backend and replace the registry snapshot.
    /// On failure, the previous snapshot is kept.
    pub async fn refresh(&self) -> ApiResult<()> {
        let entities = self.dispatcher.backend().fetch_entities().await?;
        let total = entities.len();

        let mut reg = self.registry.lock().await;
        let added = reg.apply_snapshot(entities);
        log::debug!(
            "Registry refreshed: {} of {total} entities exposed, {added} new",
            reg.len()
        );
        drop(reg);

        Ok(())
    }

    pub async fn press_linkbutton(&self, active_for: Duration) {
        let mut lock = self.linkbutton_until.lock().await;
        *lock = Some(Instant::now() + active_for);
    }

    pub async fn linkbutton_active(&self) -> bool {
        let now = Instant::now();
        let mut lock = self.linkbutton_until.lock().await;
        match *lock {
            Some(until) if until > now => true,
            Some(_) => {
                *lock = None;
                false
            }
            None => false,
        }
    }

    /// Register an api user, as requested through `POST /api`. Only works
    /// while the link button is pressed.
    pub async fn create_user(
        &self,
        devicetype: &str,
        generate_clientkey: bool,
    ) -> ApiResult<NewUserReply> {
        if !self.linkbutton_active().await {
            log::warn!("Refusing new user [{devicetype}]: link button not pressed");
            return Err(HueApiV1Error::LinkButtonNotPressed.into());
        }

        let (username, clientkey) = self.users.lock().await.register(devicetype);

        Ok(NewUserReply {
            username,
            clientkey: generate_clientkey.then_some(clientkey),
        })
    }

    /// True if `username` is whitelisted.
    pub async fn authorize(&self, username: &str) -> bool {
        let known = self.users.lock().await.touch(username);
        if !known {
            log::debug!("Unknown api user {username}");
        }
        known
    }

    #[must_use]
    pub fn api_short_config(&self) -> ApiShortConfig {
        ApiShortConfig::from_mac_and_name(self.conf.bridge.mac(), &self.conf.bridge.name)
    }

    pub async fn api_config(&self) -> ApiConfig {
        let bridge = &self.conf.bridge;
        let linkbutton = self.linkbutton_active().await;
        let whitelist = self.users.lock().await.whitelist();

        ApiConfig {
            short_config: self.api_short_config(),
            ipaddress: bridge.ipaddress(),
            netmask: bridge.netmask,
            gateway: bridge.gateway(),
            localtime: Local::now().naive_local(),
            whitelist,
            linkbutton,
            ..ApiConfig::default()
        }
    }

    /// Look up a light by id, returning a copy of the entity.
    pub async fn light(&self, id: u32) -> ApiResult<Entity> {
        self.registry
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or(ApiError::UnknownLight(id))
    }

    /// All exposed lights, in hue representation.
    pub async fn api_lights(&self) -> BTreeMap<String, ApiLight> {
        self.registry
            .lock()
            .await
            .lights()
            .map(|(id, entity)| (id.to_string(), api_light(entity)))
            .collect()
    }

    /// Light ids of a group. Group 0 holds every light.
    pub async fn group_lights(&self, id: u32) -> ApiResult<Vec<u32>> {
        let reg = self.registry.lock().await;
        if id == 0 {
            return Ok(reg.lights().map(|(id, _)| id).collect());
        }

        reg.groups()
            .remove(&id)
            .map(|group| group.lights)
            .ok_or(ApiError::UnknownGroup(id))
    }

    /// All rooms, in hue representation. Group 0 is not listed.
    pub async fn api_groups(&self) -> BTreeMap<String, ApiGroup> {
        let reg = self.registry.lock().await;
        reg.groups()
            .into_iter()
            .map(|(id, group)| (id.to_string(), api_group(&reg, group)))
            .collect()
    }

    pub async fn api_group(&self, id: u32) -> ApiResult<ApiGroup> {
        let reg = self.registry.lock().await;
        if id == 0 {
            let lights: Vec<(u32, ApiLightState)> = reg
                .lights()
                .map(|(id, entity)| (id, translate::light_state(entity)))
                .collect();
            return Ok(ApiGroup::make_group_0(&lights));
        }

        let group = reg
            .groups()
            .remove(&id)
            .ok_or(ApiError::UnknownGroup(id))?;
        Ok(api_group(&reg, group))
    }
}

fn api_group(reg: &Registry, group: Group) -> ApiGroup {
    let lights: Vec<(u32, ApiLightState)> = group
        .lights
        .iter()
        .filter_map(|id| reg.get(*id).map(|ent| (*id, translate::light_state(ent))))
        .collect();
    ApiGroup::room(group.name, &lights)
}

/// Fake zigbee address derived from the entity id, stable across restarts.
#[must_use]
pub fn unique_id(entity_id: &str) -> String {
    let digest = Sha1::digest(entity_id.as_bytes());
    let tail = digest.iter().take(7).map(|b| format!("{b:02x}")).join(":");
    format!("00:{tail}-0b")
}

#[must_use]
pub fn api_light(entity: &Entity) -> ApiLight {
    ApiLight::new(
        entity.light_kind(),
        &entity.name,
        unique_id(&entity.entity_id),
        translate::light_state(entity),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use hue::error::HueApiV1Error;

    use crate::config;
    use crate::dispatcher::Backend;
    use crate::error::{ApiError, ApiResult};
    use crate::model::entity::{Area, Capabilities, Domain, Entity, EntityState};
    use crate::server::appstate::{AppState, unique_id};
    use crate::translate::ServiceCall;

    struct FlakyBackend {
        entities: Vec<Entity>,
        broken: AtomicBool,
    }

    #[async_trait]
    impl Backend for FlakyBackend {
        async fn fetch_entities(&self) -> ApiResult<Vec<Entity>> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(ApiError::BackendError("connection refused".into()));
            }
            Ok(self.entities.clone())
        }

        async fn call_service(&self, _call: &ServiceCall) -> ApiResult<()> {
            Ok(())
        }
    }

    fn lamp(entity_id: &str, area: Option<&str>) -> Entity {
        Entity {
            entity_id: entity_id.to_string(),
            domain: Domain::Light,
            name: entity_id.to_string(),
            labels: Default::default(),
            area: area.map(|name| Area {
                id: name.to_lowercase(),
                name: name.to_string(),
            }),
            capabilities: Capabilities::default(),
            state: EntityState {
                available: true,
                on: true,
                ..EntityState::default()
            },
        }
    }

    fn state(entities: Vec<Entity>) -> (AppState, Arc<FlakyBackend>) {
        let cfg = config::from_yaml("hass:\n  token: t\n").unwrap();
        let backend = Arc::new(FlakyBackend {
            entities,
            broken: AtomicBool::new(false),
        });
        (AppState::from_config(cfg, backend.clone()).unwrap(), backend)
    }

    #[test]
    fn unique_id_looks_like_zigbee_address() {
        let id = unique_id("light.kitchen");
        assert_eq!(id.len(), "00:00:00:00:00:00:00:00-0b".len());
        assert!(id.starts_with("00:"));
        assert!(id.ends_with("-0b"));
        assert_eq!(id, unique_id("light.kitchen"));
        assert_ne!(id, unique_id("light.office"));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let (state, backend) = state(vec![lamp("light.a", None), lamp("light.b", None)]);
        state.refresh().await.unwrap();

        backend.broken.store(true, Ordering::SeqCst);
        assert!(state.refresh().await.is_err());

        let lights = state.api_lights().await;
        assert_eq!(lights.len(), 2);
        assert_eq!(lights["1"].name, "light.a");
        assert_eq!(state.light(2).await.unwrap().entity_id, "light.b");
    }

    #[tokio::test]
    async fn users_need_the_link_button() {
        let (state, _) = state(vec![]);

        let err = state.create_user("app#phone", false).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::HueApiV1Error(HueApiV1Error::LinkButtonNotPressed)
        ));

        state.press_linkbutton(Duration::from_secs(60)).await;
        let user = state.create_user("app#phone", true).await.unwrap();
        assert!(user.clientkey.is_some());
        assert!(state.authorize(&user.username).await);
        assert!(!state.authorize("someone").await);

        let again = state.create_user("app#phone", false).await.unwrap();
        assert_eq!(again.username, user.username);
        assert!(again.clientkey.is_none());

        let cfg = state.api_config().await;
        assert_eq!(cfg.whitelist.len(), 1);
        assert!(cfg.linkbutton);

        state.press_linkbutton(Duration::ZERO).await;
        assert!(!state.linkbutton_active().await);
    }

    #[tokio::test]
    async fn groups_from_areas() {
        let (state, _) = state(vec![
            lamp("light.a", Some("Kitchen")),
            lamp("light.b", None),
            lamp("light.c", Some("Kitchen")),
        ]);
        state.refresh().await.unwrap();

        let groups = state.api_groups().await;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups["1"].name, "Kitchen");
        assert_eq!(groups["1"].lights, vec!["1", "3"]);
        assert!(groups["1"].state.all_on);

        assert_eq!(state.group_lights(0).await.unwrap(), vec![1, 2, 3]);
        assert_eq!(state.api_group(0).await.unwrap().lights.len(), 3);
        assert!(matches!(
            state.api_group(5).await,
            Err(ApiError::UnknownGroup(5))
        ));
    }
}
