use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ApiResult};

/// A long-running part of the bridge.
///
/// `start` runs to completion before `run` is polled, so it is the place to
/// bind sockets and report configuration errors. When shutdown is requested,
/// `run` is dropped and `stop` is called.
#[async_trait]
pub trait Service: Send + 'static {
    async fn start(&mut self) -> ApiResult<()> {
        Ok(())
    }

    async fn run(&mut self) -> ApiResult<()>;

    async fn stop(&mut self) -> ApiResult<()> {
        Ok(())
    }
}

pub struct ServiceRunner {
    tasks: JoinSet<(String, ApiResult<()>)>,
    token: CancellationToken,
}

impl ServiceRunner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            token: CancellationToken::new(),
        }
    }

    /// Token that stops every registered service when cancelled.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Start a service and run it in the background.
    pub async fn register(&mut self, name: &str, mut svc: impl Service) -> ApiResult<()> {
        log::debug!("Starting service [{name}]");
        svc.start().await.inspect_err(|err| {
            log::error!("Service [{name}] failed to start: {err}");
        })?;

        let token = self.token.clone();
        let name = name.to_string();
        self.tasks.spawn(async move {
            let res = tokio::select! {
                res = svc.run() => res,
                () = token.cancelled() => Ok(()),
            };

            if let Err(err) = svc.stop().await {
                log::warn!("Service [{name}] failed to stop cleanly: {err}");
            }

            (name, res)
        });

        Ok(())
    }

    /// Wait for all services. The first service to fail takes the rest down
    /// with it.
    pub async fn run(mut self) -> ApiResult<()> {
        let mut result = Ok(());

        while let Some(res) = self.tasks.join_next().await {
            match res? {
                (name, Ok(())) => log::debug!("Service [{name}] stopped"),
                (name, Err(err)) => {
                    log::error!("Service [{name}] failed: {err}");
                    self.token.cancel();
                    if result.is_ok() {
                        result = Err(ApiError::service_error(format!("{name}: {err}")));
                    }
                }
            }
        }

        result
    }
}

impl Default for ServiceRunner {
    fn default() -> Self {
        Self::new()
    }
}
