use anyhow::{Context, Result, anyhow, bail};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::core::config::RelayConfig;
use crate::core::cursor::JsonCursorStore;
use crate::core::ingest::{IngestService, IngestTiming, Orchestrator};
use crate::core::lifecycle::LifecycleManager;
use crate::core::notify::{Relay, RelayTargets};
use crate::core::stats::BotStats;
use crate::core::store::{DocumentStore, SqliteDocumentStore};
use crate::core::terminal;
use crate::interfaces::discord::{DiscordGateway, DiscordNotifier};
use crate::interfaces::spectrum::{SpectrumExtractor, SpectrumSessionProvider};

struct DiscordSettings {
    token: String,
    targets: RelayTargets,
}

fn discord_settings(config: &RelayConfig) -> Result<DiscordSettings> {
    let token = config
        .discord
        .token
        .clone()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| anyhow!("Discord token missing: set DISCORD_TOKEN or discord.token"))?;

    let channel = |id: Option<u64>, name: &str| -> Result<u64> {
        match id {
            Some(id) if id != 0 => Ok(id),
            _ => bail!("Discord channel id missing: set {} or the config value", name),
        }
    };

    Ok(DiscordSettings {
        token,
        targets: RelayTargets {
            messages_channel_id: channel(
                config.discord.messages_channel_id,
                "DISCORD_CHANNEL_ID_MESSAGES",
            )?,
            motd_channel_id: channel(config.discord.motd_channel_id, "DISCORD_CHANNEL_ID_MOTD")?,
        },
    })
}

/// Wire every component and run until Ctrl+C or until the ingestion task dies.
pub(super) async fn run_relay(config: RelayConfig) -> Result<()> {
    let discord = discord_settings(&config)?;

    let store: Arc<dyn DocumentStore> = Arc::new(
        SqliteDocumentStore::open(config.database_path(), config.ingest.insert_timeout()).await?,
    );
    let cursor_store = Arc::new(JsonCursorStore::new(config.cursor_path()));
    let stats = Arc::new(BotStats::new());

    let relay = Relay::new(
        Arc::new(DiscordNotifier::new(&discord.token)),
        discord.targets,
        config.spectrum.lobby_url(),
    );
    let provider = Arc::new(SpectrumSessionProvider::new(config.spectrum.clone())?);
    let extractor = Arc::new(SpectrumExtractor::new(&config.spectrum)?);

    let orchestrator = Orchestrator::new(
        provider,
        extractor,
        store.clone(),
        Arc::new(relay),
        cursor_store.clone(),
        stats.clone(),
        IngestTiming::from(&config.ingest),
    );

    let cancel = CancellationToken::new();
    let (ingest, ingest_exit) = IngestService::new(orchestrator, cancel.child_token());
    let gateway = DiscordGateway::new(
        discord.token,
        store,
        stats,
        config.ingest.cadence_secs,
    );

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(gateway)));
    lifecycle.attach(Arc::new(Mutex::new(ingest)));
    lifecycle.start().await.context("starting relay components")?;

    terminal::print_success("Relay is running.");
    terminal::print_status("Lobby", &config.spectrum.lobby_url());
    terminal::print_status("Database", &config.database_path().display().to_string());
    terminal::print_status("Cursor", &cursor_store.path().display().to_string());
    terminal::print_info("Press Ctrl+C to stop.");

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl+C")?;
            info!("Shutdown requested");
            Ok(())
        }
        exit = ingest_exit => match exit {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("Ingestion stopped: {:#}", e);
                Err(e)
            }
            Err(_) => Err(anyhow!("ingestion task ended without reporting")),
        },
    };

    cancel.cancel();
    lifecycle.shutdown().await?;
    outcome
}
