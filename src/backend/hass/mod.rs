pub mod client;
pub mod import;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::config::HassConfig;
use crate::dispatcher::Backend;
use crate::error::{ApiError, ApiResult};
use crate::model::entity::{Entity, EntityState};
use crate::model::hass::HassStateChangedEvent;
use crate::server::appstate::AppState;
use crate::server::service::Service;
use crate::translate::ServiceCall;

use self::client::{HassClient, HassWs};

const WS_RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

/// Home Assistant, as seen by the command dispatcher.
pub struct HassBackend {
    client: Arc<HassClient>,
    require_metadata: bool,
}

impl HassBackend {
    pub fn new(conf: &HassConfig) -> ApiResult<Self> {
        let token = conf
            .token
            .as_deref()
            .ok_or_else(|| ApiError::invalid_config("No Home Assistant token configured"))?;

        Ok(Self {
            client: Arc::new(HassClient::new(conf.url.clone(), token, conf.timeout())?),
            require_metadata: !conf.label_filter.is_empty(),
        })
    }

    #[must_use]
    pub fn client(&self) -> Arc<HassClient> {
        self.client.clone()
    }
}

#[async_trait]
impl Backend for HassBackend {
    async fn fetch_entities(&self) -> ApiResult<Vec<Entity>> {
        let states = self.client.get_states().await?;

        // without a label filter, missing metadata only costs us the rooms
        let metadata = match self.client.get_entity_metadata().await {
            Ok(metadata) => metadata,
            Err(err) if !self.require_metadata => {
                log::warn!("Failed to fetch entity areas, exposing no rooms: {err}");
                HashMap::new()
            }
            Err(err) => return Err(err),
        };

        Ok(import::import_entities(&states, &metadata))
    }

    async fn call_service(&self, call: &ServiceCall) -> ApiResult<()> {
        self.client.call_service(call).await
    }
}

/// Keeps the registry in sync with Home Assistant: a full refresh at
/// startup and on every poll interval, plus live `state_changed` events
/// over the websocket api.
pub struct HassService {
    state: AppState,
    client: Arc<HassClient>,
    ws: Option<HassWs>,
}

impl HassService {
    #[must_use]
    pub const fn new(state: AppState, client: Arc<HassClient>) -> Self {
        Self {
            state,
            client,
            ws: None,
        }
    }

    async fn refresh(&self, reason: &str) {
        if let Err(err) = self.state.refresh().await {
            log::warn!("Home Assistant refresh ({reason}) failed, keeping previous entities: {err}");
        }
    }

    /// Returns true if a new connection was made.
    async fn ensure_ws_connected(&mut self) -> bool {
        if self.ws.is_some() {
            return false;
        }

        match self.client.subscribe_state_changed().await {
            Ok(ws) => {
                log::info!("Connected to Home Assistant websocket");
                self.ws = Some(ws);
                true
            }
            Err(err) => {
                log::debug!("Home Assistant websocket connect failed: {err}");
                false
            }
        }
    }

    async fn handle_state_changed(&self, ev: HassStateChangedEvent) {
        let new_state = ev
            .new_state
            .as_ref()
            .map_or_else(EntityState::unavailable, EntityState::from_hass);

        let registry = self.state.registry();
        if registry.lock().await.update_state(&ev.entity_id, new_state) {
            log::trace!("State of {} updated from event", ev.entity_id);
        }
    }
}

async fn next_event(ws: &mut Option<HassWs>) -> ApiResult<Option<HassStateChangedEvent>> {
    match ws {
        Some(ws) => ws.next_state_changed().await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl Service for HassService {
    async fn start(&mut self) -> ApiResult<()> {
        log::info!("Home Assistant backend at {}", self.state.config().hass.url);
        self.refresh("startup").await;
        self.ensure_ws_connected().await;
        Ok(())
    }

    async fn run(&mut self) -> ApiResult<()> {
        let mut poll = interval(self.state.config().hass.refresh_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        poll.tick().await;

        let mut ws_tick = interval(WS_RECONNECT_INTERVAL);
        ws_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = poll.tick() => self.refresh("poll").await,
                _ = ws_tick.tick() => {
                    // catch up on changes missed while disconnected
                    if self.ensure_ws_connected().await {
                        self.refresh("reconnect").await;
                    }
                }
                ev = next_event(&mut self.ws) => match ev {
                    Ok(Some(ev)) => self.handle_state_changed(ev).await,
                    Ok(None) => {
                        log::warn!("Home Assistant websocket closed, reconnecting");
                        self.ws = None;
                    }
                    Err(err) => {
                        log::warn!("Home Assistant websocket error: {err}");
                        self.ws = None;
                    }
                },
            }
        }
    }
}
