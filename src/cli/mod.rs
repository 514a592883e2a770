mod inspect;
mod relay;

use anyhow::Result;
use console::style;
use std::path::PathBuf;

use crate::core::config::RelayConfig;
use crate::core::terminal::{self, GuideSection, print_error};
use crate::platform::{NativePlatform, Platform};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Relay")
        .command("run", "Poll the lobby and relay new posts to Discord (default)")
        .print();

    GuideSection::new("Inspect")
        .command("recent", "Show the latest stored messages (--count 1-10)")
        .command("motd", "Show the latest stored Message of the Day")
        .command("cursor", "Show the persisted read position")
        .print();

    GuideSection::new("Options")
        .text("--config <path>   Config file (default: <data dir>/spectrum-relay.toml)")
        .text("--count <n>       Number of messages for `recent`")
        .blank()
        .text("DISCORD_TOKEN and SPECTRUM_RSI_TOKEN override the config file")
        .text("RUST_LOG=debug    Verbose logging")
        .print();

    println!(
        "\n {} {} [command] [options]\n",
        style("Usage:").bold(),
        style("spectrum-relay").green()
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CliCommand {
    Run,
    Recent,
    Motd,
    Cursor,
    Help,
    Unknown,
}

impl CliCommand {
    /// Only the relay runs until stopped; everything else is one-shot.
    pub(crate) fn is_long_running(self) -> bool {
        self == CliCommand::Run
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CliArgs {
    pub command: CliCommand,
    pub raw_command: Option<String>,
    pub config: Option<PathBuf>,
    pub count: Option<i64>,
}

pub(crate) fn parse_cli_args(args: &[String]) -> CliArgs {
    let mut parsed = CliArgs {
        command: CliCommand::Run,
        raw_command: None,
        config: None,
        count: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--count" | "-n" => {
                if i + 1 < args.len() {
                    parsed.count = args[i + 1].parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--help" | "-h" => {
                parsed.command = CliCommand::Help;
                i += 1;
            }
            other if parsed.raw_command.is_none() && !other.starts_with('-') => {
                parsed.raw_command = Some(other.to_string());
                if parsed.command != CliCommand::Help {
                    parsed.command = match other {
                        "run" => CliCommand::Run,
                        "recent" => CliCommand::Recent,
                        "motd" => CliCommand::Motd,
                        "cursor" => CliCommand::Cursor,
                        "help" => CliCommand::Help,
                        _ => CliCommand::Unknown,
                    };
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    parsed
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let parsed = parse_cli_args(&args);

    match parsed.command {
        CliCommand::Help => {
            print_help();
            return Ok(());
        }
        CliCommand::Unknown => {
            print_error(&format!(
                "Unknown command: {}",
                parsed.raw_command.as_deref().unwrap_or_default()
            ));
            print_help();
            return Ok(());
        }
        _ => {}
    }

    // Inspection commands keep stdout for their own output.
    let quiet = !parsed.command.is_long_running();
    crate::logging::init(&NativePlatform::data_dir(), quiet);

    let config = RelayConfig::load(parsed.config.as_deref()).await?;

    let result = match parsed.command {
        CliCommand::Run => relay::run_relay(config).await,
        CliCommand::Recent => inspect::show_recent(&config, parsed.count).await,
        CliCommand::Motd => inspect::show_motd(&config).await,
        CliCommand::Cursor => inspect::show_cursor(&config).await,
        CliCommand::Help | CliCommand::Unknown => Ok(()),
    };

    if result.is_ok() && parsed.command.is_long_running() {
        terminal::print_goodbye();
    }
    result
}
