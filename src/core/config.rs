use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::platform::{NativePlatform, Platform};

pub const CONFIG_FILE_NAME: &str = "spectrum-relay.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub spectrum: SpectrumConfig,

    #[serde(default)]
    pub discord: DiscordConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpectrumConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_community")]
    pub community: String,

    #[serde(default = "default_lobby_id")]
    pub lobby_id: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Pre-authenticated `Rsi-Token` cookie. Skips the sign-in request when set.
    #[serde(default)]
    pub rsi_token: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Number of messages requested per history call.
    #[serde(default = "default_history_size")]
    pub history_size: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DiscordConfig {
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub messages_channel_id: Option<u64>,

    #[serde(default)]
    pub motd_channel_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageConfig {
    /// Defaults to `relay.db` in the data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Defaults to `cursor.json` in the data directory.
    #[serde(default)]
    pub cursor_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_cadence_secs")]
    pub cadence_secs: u64,

    #[serde(default = "default_min_wait_secs")]
    pub min_wait_secs: u64,

    #[serde(default = "default_cycle_budget_secs")]
    pub cycle_budget_secs: u64,

    #[serde(default = "default_insert_timeout_secs")]
    pub insert_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://robertsspaceindustries.com".to_string()
}
fn default_community() -> String {
    "SC".to_string()
}
fn default_lobby_id() -> String {
    "38230".to_string()
}
fn default_request_timeout_secs() -> u64 {
    15
}
fn default_history_size() -> u32 {
    50
}
fn default_cadence_secs() -> u64 {
    30
}
fn default_min_wait_secs() -> u64 {
    5
}
fn default_cycle_budget_secs() -> u64 {
    25
}
fn default_insert_timeout_secs() -> u64 {
    10
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            community: default_community(),
            lobby_id: default_lobby_id(),
            username: None,
            password: None,
            rsi_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            history_size: default_history_size(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            cadence_secs: default_cadence_secs(),
            min_wait_secs: default_min_wait_secs(),
            cycle_budget_secs: default_cycle_budget_secs(),
            insert_timeout_secs: default_insert_timeout_secs(),
        }
    }
}

impl SpectrumConfig {
    /// Public link to the lobby, used in relayed messages.
    pub fn lobby_url(&self) -> String {
        format!(
            "{}/spectrum/community/{}/lobby/{}",
            self.base_url.trim_end_matches('/'),
            self.community,
            self.lobby_id
        )
    }

    pub fn message_url(&self, message_id: &str) -> String {
        format!("{}/message/{}", self.lobby_url(), message_id)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl IngestConfig {
    pub fn cadence(&self) -> Duration {
        Duration::from_secs(self.cadence_secs)
    }
    pub fn min_wait(&self) -> Duration {
        Duration::from_secs(self.min_wait_secs)
    }
    pub fn cycle_budget(&self) -> Duration {
        Duration::from_secs(self.cycle_budget_secs)
    }
    pub fn insert_timeout(&self) -> Duration {
        Duration::from_secs(self.insert_timeout_secs)
    }
}

impl RelayConfig {
    /// Load from `path`, or from the data directory when `path` is `None`.
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let (config_path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (NativePlatform::data_dir().join(CONFIG_FILE_NAME), false),
        };

        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| format!("reading {}", config_path.display()))?;
            let parsed: RelayConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            info!("Loaded relay config from {}", config_path.display());
            parsed
        } else if explicit {
            bail!("config file {} does not exist", config_path.display());
        } else {
            info!("No {} found, using defaults.", CONFIG_FILE_NAME);
            RelayConfig::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Secrets and channel ids may come from the environment, which wins over the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("DISCORD_TOKEN") {
            self.discord.token = Some(token);
        }
        if let Some(id) = non_empty("DISCORD_CHANNEL_ID_MESSAGES")
            && let Ok(id) = id.trim().parse()
        {
            self.discord.messages_channel_id = Some(id);
        }
        if let Some(id) = non_empty("DISCORD_CHANNEL_ID_MOTD")
            && let Ok(id) = id.trim().parse()
        {
            self.discord.motd_channel_id = Some(id);
        }
        if let Some(user) = non_empty("SPECTRUM_USERNAME") {
            self.spectrum.username = Some(user);
        }
        if let Some(pass) = non_empty("SPECTRUM_PASSWORD") {
            self.spectrum.password = Some(pass);
        }
        if let Some(token) = non_empty("SPECTRUM_RSI_TOKEN") {
            self.spectrum.rsi_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest.min_wait_secs > self.ingest.cadence_secs {
            bail!(
                "ingest.min_wait_secs ({}) must not exceed ingest.cadence_secs ({})",
                self.ingest.min_wait_secs,
                self.ingest.cadence_secs
            );
        }
        if self.ingest.cycle_budget_secs == 0 {
            bail!("ingest.cycle_budget_secs must be greater than zero");
        }
        url::Url::parse(&self.spectrum.base_url)
            .with_context(|| format!("invalid spectrum.base_url '{}'", self.spectrum.base_url))?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| NativePlatform::data_dir().join("relay.db"))
    }

    pub fn cursor_path(&self) -> PathBuf {
        self.storage
            .cursor_path
            .clone()
            .unwrap_or_else(|| NativePlatform::data_dir().join("cursor.json"))
    }
}
