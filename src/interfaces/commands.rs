//! Read-only views over the document store and the loop's counters, shared by
//! the Discord slash commands and the CLI. Rendering is kept free of I/O.

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{Value, json};

use crate::core::stats::StatsSnapshot;
use crate::core::store::{DocumentStore, FindOptions};
use crate::core::text::truncate_chars;
use crate::core::types::{MESSAGES_COLLECTION, MOTD_COLLECTION};

pub const RECENT_DEFAULT: usize = 5;
pub const RECENT_MAX: usize = 10;
const RECENT_BODY_CHARS: usize = 100;

/// Counts backing `/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreTotals {
    pub messages: u64,
    pub motd_updates: u64,
    pub messages_last_24h: u64,
}

pub fn clamp_count(requested: Option<i64>) -> usize {
    match requested {
        Some(n) if n >= 1 => (n as usize).min(RECENT_MAX),
        Some(_) => 1,
        None => RECENT_DEFAULT,
    }
}

/// Newest stored messages, newest first.
pub async fn recent_messages(store: &dyn DocumentStore, count: usize) -> Result<Vec<Value>> {
    store
        .find(
            MESSAGES_COLLECTION,
            &json!({}),
            FindOptions::default()
                .limit(count)
                .newest_first("time"),
        )
        .await
}

pub async fn latest_motd(store: &dyn DocumentStore) -> Result<Option<Value>> {
    let mut docs = store
        .find(
            MOTD_COLLECTION,
            &json!({}),
            FindOptions::default()
                .limit(1)
                .newest_first("time"),
        )
        .await?;
    Ok(docs.pop())
}

pub async fn store_totals(store: &dyn DocumentStore, now: DateTime<Utc>) -> Result<StoreTotals> {
    Ok(StoreTotals {
        messages: store.count(MESSAGES_COLLECTION).await?,
        motd_updates: store.count(MOTD_COLLECTION).await?,
        messages_last_24h: store
            .count_since(MESSAGES_COLLECTION, "time", now - ChronoDuration::hours(24))
            .await?,
    })
}

pub fn format_uptime(secs: u64) -> String {
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// `<t:UNIX:STYLE>` for an RFC 3339 string, or "Unknown time".
pub fn discord_timestamp(raw: Option<&str>, style: char) -> String {
    raw.and_then(|r| DateTime::parse_from_rfc3339(r).ok())
        .map(|t| format!("<t:{}:{}>", t.timestamp(), style))
        .unwrap_or_else(|| "Unknown time".to_string())
}

fn text_field<'a>(doc: &'a Value, key: &str) -> &'a str {
    doc.get(key).and_then(Value::as_str).unwrap_or_default()
}

pub fn render_ping(latency_ms: i64) -> String {
    format!("🏓 Pong! Latency: {}ms", latency_ms)
}

pub fn render_status(snap: &StatsSnapshot, gateway_connected: bool) -> String {
    let last_scrape = snap
        .last_scrape
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "Never".to_string());
    let mut out = String::from("🤖 **SC Dev Chat Monitor Status**\n\n");
    out.push_str(&format!("⏱️ **Uptime:** {}\n", format_uptime(snap.uptime_secs)));
    out.push_str(&format!("🔄 **Last Scrape:** {}\n", last_scrape));
    out.push_str(&format!("📊 **Total Scrapes:** {}\n", snap.scrape_count));
    out.push_str(&format!("💬 **Messages Processed:** {}\n", snap.items_processed));
    out.push_str(&format!("❌ **Errors:** {}\n", snap.error_count));
    out.push_str(&format!(
        "🌐 **WebSocket:** {}\n",
        if gateway_connected {
            "🟢 Connected"
        } else {
            "🔴 Disconnected"
        }
    ));
    out
}

/// `docs` newest first, as returned by [`recent_messages`]; shown oldest first.
pub fn render_recent(docs: &[Value], count: usize) -> String {
    if docs.is_empty() {
        return "No messages found in database.".to_string();
    }
    let mut out = format!("📜 **Recent SC Dev Chat Messages** (Last {})\n\n", count);
    for doc in docs.iter().rev() {
        let body = truncate_chars(text_field(doc, "body"), RECENT_BODY_CHARS);
        out.push_str(&format!("**{}:** {}\n", text_field(doc, "nickname"), body));
        out.push_str(&format!(
            "*{}*\n\n",
            discord_timestamp(doc.get("time").and_then(Value::as_str), 'R')
        ));
    }
    out
}

pub fn render_stats(totals: &StoreTotals, snap: &StatsSnapshot, now: DateTime<Utc>) -> String {
    let mut out = String::from("📈 **SC Dev Chat Statistics**\n\n");
    out.push_str(&format!("💬 **Total Messages:** {}\n", totals.messages));
    out.push_str(&format!("📢 **Total MOTD Updates:** {}\n", totals.motd_updates));
    out.push_str(&format!(
        "🕐 **Messages (Last 24h):** {}\n",
        totals.messages_last_24h
    ));
    out.push_str(&format!("🔄 **Scrape Cycles:** {}\n", snap.scrape_count));
    if let Some(last) = snap.last_scrape {
        let minutes = (now - last).num_minutes().max(0);
        out.push_str(&format!("⏰ **Minutes Since Last Scrape:** {}\n", minutes));
    }
    out
}

pub fn render_motd(doc: Option<&Value>) -> String {
    let Some(doc) = doc else {
        return "No Message of the Day found.".to_string();
    };
    format!(
        "📢 **Current Message of the Day**\n\n**{}**\n*{}*\n\n{}",
        text_field(doc, "title"),
        discord_timestamp(doc.get("time").and_then(Value::as_str), 'f'),
        text_field(doc, "body")
    )
}

pub fn render_help(cadence_secs: u64) -> String {
    format!(
        "🆘 **SC Dev Chat Monitor - Help**\n\n\
         **Available Commands:**\n\n\
         🔹 **/ping** - Test bot responsiveness\n\
         🔹 **/status** - Check bot status and activity\n\
         🔹 **/recent [count]** - View recent messages (1-{})\n\
         🔹 **/stats** - Show database statistics\n\
         🔹 **/motd** - Show current Message of the Day\n\
         🔹 **/help** - Show this help message\n\n\
         💡 **Tips:**\n\
         • Commands are private (only you can see responses)\n\
         • The bot monitors SC Dev Chat every {} seconds\n\
         • Messages are automatically posted to the configured channel",
        RECENT_MAX, cadence_secs
    )
}
