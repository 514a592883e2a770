//! The ingestion loop: fixed-cadence polling of the lobby, persisting and
//! relaying new posts and motd changes, with a hard per-cycle time budget.
//!
//! Each cycle runs under `tokio::time::timeout`. When the budget runs out the
//! cycle future is dropped at its current await point: whatever was already
//! stored or relayed stays, nothing further runs, and the cursor flush is
//! skipped. Detached sessions and timeouts cause the session to be recreated
//! before the next cycle; every other failure reuses it.

mod service;

pub use service::IngestService;

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::config::IngestConfig;
use crate::core::cursor::CursorStore;
use crate::core::error::RelayError;
use crate::core::extract::Extractor;
use crate::core::notify::Relay;
use crate::core::session::{SessionHandle, SessionProvider};
use crate::core::stats::StatsSink;
use crate::core::store::DocumentStore;
use crate::core::text::html_to_text;
use crate::core::types::{ChatItem, CursorState, MESSAGES_COLLECTION, MOTD_COLLECTION, MotdEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AcquiringSession,
    RunningCycle,
    Sleeping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestTiming {
    pub cadence: Duration,
    pub min_wait: Duration,
    pub cycle_budget: Duration,
}

impl From<&IngestConfig> for IngestTiming {
    fn from(config: &IngestConfig) -> Self {
        Self {
            cadence: config.cadence(),
            min_wait: config.min_wait(),
            cycle_budget: config.cycle_budget(),
        }
    }
}

impl Default for IngestTiming {
    fn default() -> Self {
        (&IngestConfig::default()).into()
    }
}

/// Pause before the next cycle: whatever is left of the cadence, never below the floor.
pub fn next_wait(cadence: Duration, min_wait: Duration, elapsed: Duration) -> Duration {
    cadence.saturating_sub(elapsed).max(min_wait)
}

/// What a completed cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub items_seen: usize,
    pub items_processed: usize,
    pub item_failures: usize,
    pub motd_processed: bool,
    pub cursor_flushed: bool,
}

impl CycleReport {
    pub fn data_changed(&self) -> bool {
        self.items_processed > 0 || self.motd_processed
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    Failed {
        error: anyhow::Error,
        session_recreated: bool,
    },
}

pub struct Orchestrator<P, E>
where
    P: SessionProvider,
    E: Extractor<P::Session>,
{
    provider: Arc<P>,
    extractor: Arc<E>,
    store: Arc<dyn DocumentStore>,
    relay: Arc<Relay>,
    cursor_store: Arc<dyn CursorStore>,
    stats: Arc<dyn StatsSink>,
    timing: IngestTiming,
    session: Option<P::Session>,
    cursor: CursorState,
    state: LoopState,
}

impl<P, E> Orchestrator<P, E>
where
    P: SessionProvider,
    E: Extractor<P::Session>,
{
    pub fn new(
        provider: Arc<P>,
        extractor: Arc<E>,
        store: Arc<dyn DocumentStore>,
        relay: Arc<Relay>,
        cursor_store: Arc<dyn CursorStore>,
        stats: Arc<dyn StatsSink>,
        timing: IngestTiming,
    ) -> Self {
        Self {
            provider,
            extractor,
            store,
            relay,
            cursor_store,
            stats,
            timing,
            session: None,
            cursor: CursorState::default(),
            state: LoopState::AcquiringSession,
        }
    }

    #[cfg(test)]
    pub fn cursor(&self) -> &CursorState {
        &self.cursor
    }

    #[cfg(test)]
    pub fn state(&self) -> LoopState {
        self.state
    }

    fn set_state(&mut self, next: LoopState) {
        if self.state != next {
            debug!("Loop state: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Acquire the first session and load the cursor. Errors here are fatal.
    pub async fn start(&mut self) -> Result<()> {
        self.set_state(LoopState::AcquiringSession);
        let session = self
            .provider
            .acquire()
            .await
            .context("session provider did not return a session")?;
        self.session = Some(session);

        self.cursor = match self.cursor_store.load().await {
            Ok(cursor) => cursor,
            Err(e) if matches!(RelayError::find_in(&e), Some(RelayError::CursorCorrupt(_))) => {
                warn!("{}; starting from an empty cursor", e);
                CursorState::default()
            }
            Err(e) => return Err(e.context("loading cursor")),
        };
        info!(
            "Cursor loaded (last item: '{}', motd known: {})",
            self.cursor.last_item_id,
            !self.cursor.last_motd_body.is_empty()
        );
        self.set_state(LoopState::RunningCycle);
        Ok(())
    }

    /// Run until `cancel` fires. Returns early only if startup fails.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        self.start().await?;
        info!("Scraping started at {}", Utc::now().to_rfc3339());

        loop {
            let started = Instant::now();
            self.set_state(LoopState::RunningCycle);

            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.run_cycle() => outcome,
            };
            match &outcome {
                CycleOutcome::Completed(report) => debug!("Cycle report: {:?}", report),
                CycleOutcome::Failed {
                    error,
                    session_recreated,
                } => warn!(
                    "Cycle failed ({}); session recreated: {}",
                    error, session_recreated
                ),
            }

            let wait = next_wait(self.timing.cadence, self.timing.min_wait, started.elapsed());
            info!("Waiting {}ms before next scrape cycle...", wait.as_millis());
            self.set_state(LoopState::Sleeping);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!("Ingestion loop stopped");
        Ok(())
    }

    /// One bounded cycle plus failure classification.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let budget = self.timing.cycle_budget;
        let result = match tokio::time::timeout(budget, self.cycle_body()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(RelayError::CycleTimeout(budget).into()),
        };

        match result {
            Ok(report) => CycleOutcome::Completed(report),
            Err(error) => {
                self.stats.on_error();
                error!("Scraping error: {:#}", error);

                let recreate =
                    RelayError::find_in(&error).is_some_and(RelayError::requires_new_session);
                if recreate {
                    self.recreate_session().await;
                }
                CycleOutcome::Failed {
                    error,
                    session_recreated: recreate,
                }
            }
        }
    }

    async fn cycle_body(&mut self) -> Result<CycleReport> {
        self.ensure_session().await?;
        let Some(session) = self.session.as_ref() else {
            return Err(RelayError::SessionUnavailable("no session after acquire".into()).into());
        };

        self.provider
            .keep_alive(session)
            .await
            .context("session keep-alive failed")?;

        let items = match self
            .extractor
            .fetch_new_items(session, &self.cursor.last_item_id)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                error!("Error getting messages: {:#}", e);
                Vec::new()
            }
        };
        let motd = match self.extractor.fetch_motd(session).await {
            Ok(motd) => motd,
            Err(e) => {
                error!("Error getting MOTD: {:#}", e);
                None
            }
        };

        let mut report = CycleReport {
            items_seen: items.len(),
            ..CycleReport::default()
        };

        for mut item in items {
            if item.id == self.cursor.last_item_id {
                debug!("Skipping already-seen message {}", item.id);
                continue;
            }
            item.body = html_to_text(&item.body);
            info!("New message {} from {}", item.id, item.author);

            // Advanced before persisting; a failed item is not retried.
            self.cursor.last_item_id = item.id.clone();

            if let Err(e) = self.persist_item(&item).await {
                report.item_failures += 1;
                self.stats.on_error();
                error!("Error saving message {}: {:#}", item.id, e);
                continue;
            }
            report.items_processed += 1;
            self.stats.on_item_processed();

            // Delivery is best-effort once the document is stored.
            if let Err(e) = self.relay.relay_item(&item).await {
                self.stats.on_error();
                error!("Error sending message {} to Discord: {:#}", item.id, e);
            }
        }

        if let Some(motd) = motd
            && motd.body != self.cursor.last_motd_body
        {
            info!("MOTD changed: {}", motd.title);
            match self.persist_motd(&motd).await {
                Ok(()) => {
                    report.motd_processed = true;
                    self.cursor.last_motd_body = motd.body.clone();
                    if let Err(e) = self.relay.relay_motd(&motd).await {
                        self.stats.on_error();
                        error!("Error sending MOTD to Discord: {:#}", e);
                    }
                }
                Err(e) => {
                    self.stats.on_error();
                    error!("Error saving MOTD: {:#}", e);
                }
            }
        }

        if report.data_changed() {
            match self.cursor_store.save(&self.cursor).await {
                Ok(()) => report.cursor_flushed = true,
                Err(e) => {
                    self.stats.on_error();
                    error!("Error saving cursor: {:#}", e);
                }
            }
        }

        let finished = Utc::now();
        self.stats.on_cycle_complete(finished);
        info!(
            "Scrape ended at {} ({} new, {} failed)",
            finished.to_rfc3339(),
            report.items_processed,
            report.item_failures
        );
        Ok(report)
    }

    async fn persist_item(&self, item: &ChatItem) -> Result<()> {
        self.store
            .insert(MESSAGES_COLLECTION, serde_json::to_value(item)?)
            .await?;
        Ok(())
    }

    async fn persist_motd(&self, motd: &MotdEntry) -> Result<()> {
        self.store
            .insert(MOTD_COLLECTION, serde_json::to_value(motd)?)
            .await?;
        Ok(())
    }

    /// Replace a missing or closed session. Failure aborts the cycle.
    async fn ensure_session(&mut self) -> Result<()> {
        let usable = self.session.as_ref().is_some_and(|s| !s.is_closed());
        if usable {
            return Ok(());
        }

        warn!("Session is closed, restarting...");
        self.set_state(LoopState::AcquiringSession);
        self.session = None;
        let session = self
            .provider
            .acquire()
            .await
            .context("failed to restart session")?;
        self.session = Some(session);
        self.set_state(LoopState::RunningCycle);
        Ok(())
    }

    /// Single recreation attempt after a detach or timeout. Never fails the loop;
    /// on failure the next cycle tries again through `ensure_session`.
    async fn recreate_session(&mut self) {
        warn!("Restarting session due to error...");
        self.set_state(LoopState::AcquiringSession);
        self.session = None;
        match self.provider.acquire().await {
            Ok(session) => {
                self.session = Some(session);
                info!("Session restarted successfully");
            }
            Err(e) => error!("Error restarting session: {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests;
