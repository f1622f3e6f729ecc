use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::Instant;

use hue::legacy_api::ApiLightStateUpdate;

use crate::error::{ApiError, ApiResult};
use crate::model::entity::Entity;
use crate::registry::Registry;
use crate::translate::{self, LightCommand, ServiceCall};

/// The automation platform owning the entities.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    async fn fetch_entities(&self) -> ApiResult<Vec<Entity>>;

    async fn call_service(&self, call: &ServiceCall) -> ApiResult<()>;
}

/// Outcome of one submitted update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Applied {
    /// Fields left alone because the light stays off
    pub rejected: Vec<&'static str>,
}

/// A requested state change, waiting for dispatch.
#[derive(Debug)]
pub struct PendingCommand {
    pub light_id: u32,
    pub update: ApiLightStateUpdate,
    pub received: Instant,
    reply: oneshot::Sender<ApiResult<Applied>>,
}

/// Serializes backend calls per light.
///
/// Each light gets its own worker task, so there is never more than one
/// backend call in flight for an entity. Updates arriving within the
/// debounce window of the first queued update (or while a call is in
/// flight) are merged into a single call.
///
/// The backend delta is computed by the worker, against the registry state
/// with every earlier update of the batch applied. A later update therefore
/// always overrides an earlier one, even when it matches the state the light
/// had before the batch.
pub struct Dispatcher {
    worker: Worker,
    workers: Mutex<HashMap<u32, mpsc::UnboundedSender<PendingCommand>>>,
}

#[derive(Clone)]
struct Worker {
    backend: Arc<dyn Backend>,
    registry: Arc<Mutex<Registry>>,
    debounce: Duration,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn Backend>,
        registry: Arc<Mutex<Registry>>,
        debounce: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            worker: Worker {
                backend,
                registry,
                debounce,
                timeout,
            },
            workers: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn backend(&self) -> Arc<dyn Backend> {
        self.worker.backend.clone()
    }

    async fn worker_for(&self, light_id: u32) -> mpsc::UnboundedSender<PendingCommand> {
        let mut workers = self.workers.lock().await;

        if let Some(tx) = workers.get(&light_id).filter(|tx| !tx.is_closed()) {
            return tx.clone();
        }

        log::debug!("Starting command worker for light {light_id}");
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.worker.clone().run(light_id, rx));
        workers.insert(light_id, tx.clone());
        tx
    }

    /// Queue an update and wait for the backend call it ends up in.
    pub async fn submit(&self, light_id: u32, update: ApiLightStateUpdate) -> ApiResult<Applied> {
        let (reply, result) = oneshot::channel();
        let pending = PendingCommand {
            light_id,
            update,
            received: Instant::now(),
            reply,
        };

        self.worker_for(light_id)
            .await
            .send(pending)
            .map_err(|_| ApiError::DispatcherClosed(light_id))?;

        result
            .await
            .map_err(|_| ApiError::DispatcherClosed(light_id))?
    }
}

async fn dispatch(
    backend: &dyn Backend,
    entity: &Entity,
    command: &LightCommand,
    timeout: Duration,
) -> ApiResult<()> {
    let Some(call) = command.service_call(entity) else {
        return Ok(());
    };

    log::debug!(
        "Calling {}.{} for {} with {:?}",
        call.domain,
        call.service,
        call.entity_id,
        call.data
    );

    tokio::time::timeout(timeout, backend.call_service(&call))
        .await
        .map_err(|_| ApiError::BackendTimeout(timeout))?
}

impl Worker {
    async fn run(self, light_id: u32, mut rx: mpsc::UnboundedReceiver<PendingCommand>) {
        while let Some(first) = rx.recv().await {
            let deadline = first.received + self.debounce;
            let mut batch = vec![first];

            // collect everything arriving within the debounce window
            while let Ok(Some(cmd)) = tokio::time::timeout_at(deadline, rx.recv()).await {
                batch.push(cmd);
            }

            // and anything that queued up while the previous call was in flight
            while let Ok(cmd) = rx.try_recv() {
                batch.push(cmd);
            }

            self.process(light_id, batch).await;
        }
    }

    async fn process(&self, light_id: u32, batch: Vec<PendingCommand>) {
        let entity = self.registry.lock().await.get(light_id).cloned();
        let Some(entity) = entity else {
            for pending in batch {
                let _ = pending.reply.send(Err(ApiError::UnknownLight(light_id)));
            }
            return;
        };

        let mut expected = entity.clone();
        let mut merged = LightCommand::NoOp;
        let mut outcomes = Vec::with_capacity(batch.len());

        for pending in &batch {
            let rejected = translate::rejected_while_off(&expected, &pending.update);
            let cmd = translate::light_command(&expected, &pending.update);
            expected.state = cmd.apply(&expected.state);
            merged = merged.merge(cmd);
            outcomes.push(Applied { rejected });
        }

        if batch.len() > 1 {
            log::debug!(
                "Merged {} updates for {} into {merged:?}",
                batch.len(),
                entity.entity_id
            );
        }

        let result = dispatch(self.backend.as_ref(), &entity, &merged, self.timeout).await;
        match &result {
            Ok(()) if merged != LightCommand::NoOp => {
                let mut reg = self.registry.lock().await;
                if let Some(current) = reg.get(light_id).map(|ent| ent.state.clone()) {
                    reg.update_state(&entity.entity_id, merged.apply(&current));
                }
            }
            Ok(()) => {}
            Err(err) => log::warn!("Command for {} failed: {err}", entity.entity_id),
        }

        for (pending, applied) in batch.into_iter().zip(outcomes) {
            let _ = pending.reply.send(result.clone().map(|()| applied));
        }
    }
}
