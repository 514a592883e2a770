use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serenity::Client;
use serenity::all::{
    ActivityData, ChannelId, Command, CommandInteraction, CommandOptionType, ConnectionStage,
    Context, CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseMessage, EditInteractionResponse, EditMessage, EventHandler,
    GatewayIntents, Http, Interaction, MessageId, OnlineStatus, Ready, ShardManager,
    ShardStageUpdateEvent,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::lifecycle::LifecycleComponent;
use crate::core::notify::{MessageHandle, Notifier};
use crate::core::stats::BotStats;
use crate::core::store::DocumentStore;
use crate::interfaces::commands;

/// [`Notifier`] over Discord's REST API. Works without a gateway connection.
pub struct DiscordNotifier {
    http: Arc<Http>,
}

impl DiscordNotifier {
    pub fn new(token: &str) -> Self {
        Self {
            http: Arc::new(Http::new(token)),
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn deliver(&self, channel_id: u64, plain_text: &str) -> Result<MessageHandle> {
        let sent = ChannelId::new(channel_id).say(&self.http, plain_text).await?;
        Ok(MessageHandle {
            channel_id,
            message_id: sent.id.get(),
        })
    }

    async fn reformat(&self, handle: &MessageHandle, rich_text: &str) -> Result<()> {
        ChannelId::new(handle.channel_id)
            .edit_message(
                &self.http,
                MessageId::new(handle.message_id),
                EditMessage::new().content(rich_text),
            )
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlashCommand {
    Ping,
    Status,
    Recent,
    Stats,
    Motd,
    Help,
}

impl SlashCommand {
    const ALL: [SlashCommand; 6] = [
        SlashCommand::Status,
        SlashCommand::Recent,
        SlashCommand::Stats,
        SlashCommand::Motd,
        SlashCommand::Ping,
        SlashCommand::Help,
    ];

    fn name(self) -> &'static str {
        match self {
            SlashCommand::Ping => "ping",
            SlashCommand::Status => "status",
            SlashCommand::Recent => "recent",
            SlashCommand::Stats => "stats",
            SlashCommand::Motd => "motd",
            SlashCommand::Help => "help",
        }
    }

    fn description(self) -> &'static str {
        match self {
            SlashCommand::Ping => "Test bot responsiveness",
            SlashCommand::Status => "Check the bot's current status and last activity",
            SlashCommand::Recent => "View recent messages from SC Dev Chat",
            SlashCommand::Stats => "Show bot statistics and message counts",
            SlashCommand::Motd => "Show the current Message of the Day",
            SlashCommand::Help => "Show available commands and usage information",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    fn register(self) -> CreateCommand {
        let command = CreateCommand::new(self.name()).description(self.description());
        match self {
            SlashCommand::Recent => command.add_option(
                CreateCommandOption::new(
                    CommandOptionType::Integer,
                    "count",
                    "Number of recent messages to show (1-10)",
                )
                .min_int_value(1)
                .max_int_value(commands::RECENT_MAX as u64)
                .required(false),
            ),
            _ => command,
        }
    }
}

struct Handler {
    store: Arc<dyn DocumentStore>,
    stats: Arc<BotStats>,
    cadence_secs: u64,
    connected: Arc<AtomicBool>,
}

impl Handler {
    async fn reply(&self, ctx: &Context, command: &CommandInteraction, content: String) -> Result<()> {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content(content)
                        .ephemeral(true),
                ),
            )
            .await?;
        Ok(())
    }

    async fn handle(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        let Some(kind) = SlashCommand::parse(&command.data.name) else {
            return self.reply(ctx, command, "Unknown command.".to_string()).await;
        };

        match kind {
            SlashCommand::Ping => {
                let started = Instant::now();
                self.reply(ctx, command, "Pinging...".to_string()).await?;
                let latency = started.elapsed().as_millis() as i64;
                command
                    .edit_response(
                        &ctx.http,
                        EditInteractionResponse::new().content(commands::render_ping(latency)),
                    )
                    .await?;
                Ok(())
            }
            SlashCommand::Status => {
                let text = commands::render_status(
                    &self.stats.snapshot(),
                    self.connected.load(Ordering::Relaxed),
                );
                self.reply(ctx, command, text).await
            }
            SlashCommand::Recent => {
                let requested = command
                    .data
                    .options
                    .iter()
                    .find(|o| o.name == "count")
                    .and_then(|o| o.value.as_i64());
                let count = commands::clamp_count(requested);
                let text = match commands::recent_messages(self.store.as_ref(), count).await {
                    Ok(docs) => commands::render_recent(&docs, count),
                    Err(e) => {
                        error!("Error fetching recent messages: {}", e);
                        "Error retrieving recent messages.".to_string()
                    }
                };
                self.reply(ctx, command, text).await
            }
            SlashCommand::Stats => {
                let now = Utc::now();
                let text = match commands::store_totals(self.store.as_ref(), now).await {
                    Ok(totals) => commands::render_stats(&totals, &self.stats.snapshot(), now),
                    Err(e) => {
                        error!("Error fetching stats: {}", e);
                        "Error retrieving statistics.".to_string()
                    }
                };
                self.reply(ctx, command, text).await
            }
            SlashCommand::Motd => {
                let text = match commands::latest_motd(self.store.as_ref()).await {
                    Ok(doc) => commands::render_motd(doc.as_ref()),
                    Err(e) => {
                        error!("Error fetching MOTD: {}", e);
                        "Error retrieving Message of the Day.".to_string()
                    }
                };
                self.reply(ctx, command, text).await
            }
            SlashCommand::Help => {
                self.reply(ctx, command, commands::render_help(self.cadence_secs))
                    .await
            }
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Discord bot connected as {}", ready.user.name);
        self.connected.store(true, Ordering::Relaxed);
        ctx.set_presence(
            Some(ActivityData::watching("Monitoring SC Dev Chat")),
            OnlineStatus::Online,
        );

        let definitions: Vec<CreateCommand> =
            SlashCommand::ALL.into_iter().map(SlashCommand::register).collect();
        match Command::set_global_commands(&ctx.http, definitions).await {
            Ok(registered) => info!("Registered {} slash commands", registered.len()),
            Err(e) => error!("Error registering slash commands: {}", e),
        }
    }

    async fn shard_stage_update(&self, _ctx: Context, event: ShardStageUpdateEvent) {
        let connected = event.new == ConnectionStage::Connected;
        if !connected && event.old == ConnectionStage::Connected {
            warn!("Discord gateway disconnected, reconnecting...");
        }
        self.connected.store(connected, Ordering::Relaxed);
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };
        if let Err(e) = self.handle(&ctx, &command).await {
            error!("Error handling /{}: {}", command.data.name, e);
        }
    }
}

/// Gateway connection answering slash commands.
pub struct DiscordGateway {
    token: String,
    store: Arc<dyn DocumentStore>,
    stats: Arc<BotStats>,
    cadence_secs: u64,
    shard_manager: Option<Arc<ShardManager>>,
    task: Option<JoinHandle<()>>,
}

impl DiscordGateway {
    pub fn new(
        token: String,
        store: Arc<dyn DocumentStore>,
        stats: Arc<BotStats>,
        cadence_secs: u64,
    ) -> Self {
        Self {
            token,
            store,
            stats,
            cadence_secs,
            shard_manager: None,
            task: None,
        }
    }
}

#[async_trait]
impl LifecycleComponent for DiscordGateway {
    async fn on_init(&mut self) -> Result<()> {
        info!("Discord gateway initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let handler = Handler {
            store: self.store.clone(),
            stats: self.stats.clone(),
            cadence_secs: self.cadence_secs,
            connected: Arc::new(AtomicBool::new(false)),
        };
        let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES;

        match Client::builder(&self.token, intents)
            .event_handler(handler)
            .await
        {
            Ok(mut client) => {
                self.shard_manager = Some(client.shard_manager.clone());
                self.task = Some(tokio::spawn(async move {
                    if let Err(why) = client.start().await {
                        error!("Discord client error: {:?}", why);
                    }
                }));
            }
            Err(e) => {
                error!(
                    "Failed to create Discord client: {}. Slash commands disabled.",
                    e
                );
            }
        }
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("Discord gateway shutting down...");
        if let Some(manager) = self.shard_manager.take() {
            manager.shutdown_all().await;
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        Ok(())
    }
}
