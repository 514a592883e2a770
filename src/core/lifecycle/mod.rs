use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Init,
    ConnectChannels,
    Ready,
    Shutdown,
}

#[async_trait::async_trait]
pub trait LifecycleComponent {
    async fn on_init(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_start(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

pub type SharedComponent = Arc<Mutex<dyn LifecycleComponent + Send + Sync>>;

pub struct LifecycleManager {
    state: LifecycleState,
    components: Vec<SharedComponent>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Init,
            components: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    fn enter(&mut self, next: LifecycleState) {
        info!("Lifecycle Phase: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    pub fn attach(&mut self, component: SharedComponent) {
        self.components.push(component);
    }

    pub async fn start(&mut self) -> Result<()> {
        self.enter(LifecycleState::Init);
        for comp in &self.components {
            comp.lock().await.on_init().await?;
        }

        self.enter(LifecycleState::ConnectChannels);
        for comp in &self.components {
            comp.lock().await.on_start().await?;
        }

        self.enter(LifecycleState::Ready);
        Ok(())
    }

    /// Shut components down in reverse attach order, once. Errors are logged, never returned.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.state == LifecycleState::Shutdown {
            return Ok(());
        }
        self.enter(LifecycleState::Shutdown);

        for comp in self.components.iter().rev() {
            if let Err(e) = comp.lock().await.on_shutdown().await {
                warn!("Component shutdown error: {}", e);
            }
        }

        Ok(())
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
