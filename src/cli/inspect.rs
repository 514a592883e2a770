use anyhow::Result;
use chrono::Utc;

use crate::core::config::RelayConfig;
use crate::core::cursor::{CursorStore, JsonCursorStore};
use crate::core::store::SqliteDocumentStore;
use crate::core::terminal;
use crate::interfaces::commands;

async fn open_store(config: &RelayConfig) -> Result<Option<SqliteDocumentStore>> {
    let path = config.database_path();
    if !path.exists() {
        terminal::print_warn(&format!(
            "No database at {} yet. Run the relay first.",
            path.display()
        ));
        return Ok(None);
    }
    Ok(Some(
        SqliteDocumentStore::open(&path, config.ingest.insert_timeout()).await?,
    ))
}

pub(super) async fn show_recent(config: &RelayConfig, count: Option<i64>) -> Result<()> {
    let Some(store) = open_store(config).await? else {
        return Ok(());
    };
    let count = commands::clamp_count(count);
    let docs = commands::recent_messages(&store, count).await?;
    println!("{}", commands::render_recent(&docs, count));

    let totals = commands::store_totals(&store, Utc::now()).await?;
    terminal::print_status("Stored messages", &totals.messages.to_string());
    terminal::print_status("Last 24h", &totals.messages_last_24h.to_string());
    Ok(())
}

pub(super) async fn show_motd(config: &RelayConfig) -> Result<()> {
    let Some(store) = open_store(config).await? else {
        return Ok(());
    };
    let motd = commands::latest_motd(&store).await?;
    println!("{}", commands::render_motd(motd.as_ref()));
    Ok(())
}

pub(super) async fn show_cursor(config: &RelayConfig) -> Result<()> {
    let store = JsonCursorStore::new(config.cursor_path());
    let cursor = store.load().await?;

    terminal::print_status("Cursor file", &store.path().display().to_string());
    let last_item = if cursor.last_item_id.is_empty() {
        "(none)".to_string()
    } else {
        format!(
            "{} ({})",
            cursor.last_item_id,
            config.spectrum.message_url(&cursor.last_item_id)
        )
    };
    terminal::print_status("Last message", &last_item);
    let motd = if cursor.last_motd_body.is_empty() {
        "(none)"
    } else {
        cursor.last_motd_body.as_str()
    };
    terminal::print_status("Last MOTD", motd);
    Ok(())
}
