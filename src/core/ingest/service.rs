use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::Orchestrator;
use crate::core::extract::Extractor;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::session::SessionProvider;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Resolves once the ingestion task ends. `Err` means startup failed or the task panicked.
pub type IngestExit = oneshot::Receiver<Result<()>>;

/// Runs the [`Orchestrator`] on its own task as a lifecycle component.
pub struct IngestService<P, E>
where
    P: SessionProvider + 'static,
    E: Extractor<P::Session> + 'static,
{
    orchestrator: Option<Orchestrator<P, E>>,
    cancel: CancellationToken,
    exit_tx: Option<oneshot::Sender<Result<()>>>,
    task: Option<JoinHandle<()>>,
}

impl<P, E> IngestService<P, E>
where
    P: SessionProvider + 'static,
    E: Extractor<P::Session> + 'static,
{
    pub fn new(orchestrator: Orchestrator<P, E>, cancel: CancellationToken) -> (Self, IngestExit) {
        let (exit_tx, exit_rx) = oneshot::channel();
        let service = Self {
            orchestrator: Some(orchestrator),
            cancel,
            exit_tx: Some(exit_tx),
            task: None,
        };
        (service, exit_rx)
    }
}

#[async_trait]
impl<P, E> LifecycleComponent for IngestService<P, E>
where
    P: SessionProvider + 'static,
    E: Extractor<P::Session> + 'static,
{
    async fn on_start(&mut self) -> Result<()> {
        let orchestrator = self
            .orchestrator
            .take()
            .ok_or_else(|| anyhow!("ingestion service already started"))?;
        let exit_tx = self.exit_tx.take();
        let cancel = self.cancel.clone();

        info!("Starting ingestion loop...");
        self.task = Some(tokio::spawn(async move {
            let result = match tokio::spawn(orchestrator.run(cancel)).await {
                Ok(result) => result,
                Err(join_err) => Err(anyhow!("ingestion task panicked: {}", join_err)),
            };
            if let Some(tx) = exit_tx {
                let _ = tx.send(result);
            }
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(_) => info!("Ingestion loop shut down"),
                Err(_elapsed) => warn!(
                    "Ingestion loop did not stop within {:?}, abandoning it",
                    SHUTDOWN_GRACE
                ),
            }
        }
        Ok(())
    }
}
