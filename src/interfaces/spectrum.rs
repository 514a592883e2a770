//! Spectrum (RSI forum) adapter: an authenticated HTTP session plus the lobby
//! history and motd readers built on top of it.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use url::Url;

use crate::core::config::SpectrumConfig;
use crate::core::error::RelayError;
use crate::core::extract::Extractor;
use crate::core::session::{SessionHandle, SessionProvider};
use crate::core::text::html_to_text;
use crate::core::types::{ChatItem, MotdEntry};

const TOKEN_COOKIE: &str = "Rsi-Token";
const TOKEN_HEADER: &str = "x-rsi-token";
const DEFAULT_MOTD_TITLE: &str = "Message of the Day";

pub struct SpectrumSession {
    client: Client,
    closed: AtomicBool,
}

impl SpectrumSession {
    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl SessionHandle for SpectrumSession {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Signs in (or reuses an `Rsi-Token`) and pings the identify endpoint each cycle.
pub struct SpectrumSessionProvider {
    config: SpectrumConfig,
    base: Url,
}

impl SpectrumSessionProvider {
    pub fn new(config: SpectrumConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .with_context(|| format!("invalid spectrum base url '{}'", config.base_url))?;
        Ok(Self { config, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    fn build_client(&self, jar: Arc<Jar>, token: Option<&str>) -> Result<Client> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            headers.insert(TOKEN_HEADER, HeaderValue::from_str(token)?);
        }
        Ok(Client::builder()
            .cookie_provider(jar)
            .default_headers(headers)
            .timeout(self.config.request_timeout())
            .build()?)
    }

    async fn sign_in(&self, jar: &Arc<Jar>, username: &str, password: &str) -> Result<String> {
        let client = self.build_client(jar.clone(), None)?;
        let response = client
            .post(self.endpoint("/api/account/signin")?)
            .json(&json!({
                "username": username,
                "password": password,
                "remember": true,
            }))
            .send()
            .await
            .map_err(|e| RelayError::SessionUnavailable(format!("sign-in request failed: {}", e)))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() || !envelope_ok(&body) {
            return Err(RelayError::SessionUnavailable(format!(
                "sign-in rejected ({}): {}",
                status,
                envelope_message(&body)
            ))
            .into());
        }

        let cookies = jar
            .cookies(&self.base)
            .and_then(|h| h.to_str().ok().map(str::to_string))
            .unwrap_or_default();
        token_from_cookies(&cookies).ok_or_else(|| {
            RelayError::SessionUnavailable("sign-in succeeded but no Rsi-Token cookie was set".into())
                .into()
        })
    }
}

#[async_trait]
impl SessionProvider for SpectrumSessionProvider {
    type Session = SpectrumSession;

    async fn acquire(&self) -> Result<SpectrumSession> {
        let jar = Arc::new(Jar::default());

        let token = match (
            self.config.rsi_token.as_deref(),
            self.config.username.as_deref(),
            self.config.password.as_deref(),
        ) {
            (Some(token), _, _) => {
                jar.add_cookie_str(&format!("{}={}", TOKEN_COOKIE, token), &self.base);
                Some(token.to_string())
            }
            (None, Some(user), Some(pass)) => {
                info!("Signing in to Spectrum as {}", user);
                Some(self.sign_in(&jar, user, pass).await?)
            }
            _ => {
                warn!("No Spectrum credentials configured, reading the lobby anonymously");
                None
            }
        };

        let client = self.build_client(jar, token.as_deref())?;
        let session = SpectrumSession {
            client,
            closed: AtomicBool::new(false),
        };
        self.keep_alive(&session).await?;
        info!("Spectrum session ready");
        Ok(session)
    }

    async fn keep_alive(&self, session: &SpectrumSession) -> Result<()> {
        let response = session
            .client
            .post(self.endpoint("/api/spectrum/auth/identify")?)
            .json(&json!({}))
            .send()
            .await
            .context("identify request failed")?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                session.mark_closed();
                Err(RelayError::SessionDetached(format!(
                    "identify returned {}",
                    response.status()
                ))
                .into())
            }
            status if !status.is_success() => Err(anyhow!("identify returned {}", status)),
            _ => {
                debug!("Spectrum session is alive");
                Ok(())
            }
        }
    }
}

/// Reads lobby history and the motd banner through a [`SpectrumSession`].
pub struct SpectrumExtractor {
    base: Url,
    lobby_id: String,
    history_size: u32,
}

impl SpectrumExtractor {
    pub fn new(config: &SpectrumConfig) -> Result<Self> {
        Ok(Self {
            base: Url::parse(&config.base_url)?,
            lobby_id: config.lobby_id.clone(),
            history_size: config.history_size,
        })
    }

    async fn call(&self, session: &SpectrumSession, path: &str, payload: Value) -> Result<Value> {
        let response = session
            .client
            .post(self.base.join(path)?)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("request to {} failed", path))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            session.mark_closed();
            return Err(RelayError::SessionDetached(format!("{} returned {}", path, status)).into());
        }
        if !status.is_success() {
            return Err(anyhow!("{} returned {}", path, status));
        }

        let body: Value = response.json().await?;
        if !envelope_ok(&body) {
            return Err(anyhow!("{} failed: {}", path, envelope_message(&body)));
        }
        Ok(body)
    }
}

#[async_trait]
impl Extractor<SpectrumSession> for SpectrumExtractor {
    async fn fetch_new_items(&self, session: &SpectrumSession, last_item_id: &str) -> Result<Vec<ChatItem>> {
        let body = self
            .call(
                session,
                "/api/spectrum/message/history",
                json!({
                    "lobby_id": self.lobby_id,
                    "timeframe_start": null,
                    "size": self.history_size,
                }),
            )
            .await?;
        let items = parse_history(&body)?;
        let fresh = select_after(items, last_item_id);
        debug!("{} new lobby messages after '{}'", fresh.len(), last_item_id);
        Ok(fresh)
    }

    async fn fetch_motd(&self, session: &SpectrumSession) -> Result<Option<MotdEntry>> {
        let body = self
            .call(
                session,
                "/api/spectrum/lobby/info",
                json!({ "lobby_id": self.lobby_id }),
            )
            .await?;
        Ok(parse_motd(&body))
    }
}

fn envelope_ok(body: &Value) -> bool {
    match body.get("success") {
        Some(Value::Bool(ok)) => *ok,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

fn envelope_message(body: &Value) -> String {
    body.get("msg")
        .or_else(|| body.get("code"))
        .and_then(Value::as_str)
        .unwrap_or("no message")
        .to_string()
}

fn token_from_cookies(header: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == TOKEN_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

fn rfc3339_from_unix(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Post body as HTML or plain text, whichever the payload carries.
fn message_body(message: &Value) -> String {
    for key in ["body", "plaintext", "content"] {
        if let Some(text) = message.get(key).and_then(Value::as_str) {
            return text.to_string();
        }
    }
    // Draft.js content: one block per line.
    message
        .pointer("/content_state/blocks")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

fn parse_history(body: &Value) -> Result<Vec<ChatItem>> {
    let messages = body
        .pointer("/data/messages")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("history response has no data.messages array"))?;

    Ok(messages
        .iter()
        .filter_map(|m| {
            let id = m.get("id").and_then(id_string)?;
            let author = m
                .pointer("/member/nickname")
                .or_else(|| m.pointer("/member/displayname"))
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let timestamp = m
                .get("time_created")
                .and_then(Value::as_i64)
                .map(rfc3339_from_unix)
                .unwrap_or_default();
            Some(ChatItem {
                id,
                author,
                body: message_body(m),
                timestamp,
            })
        })
        .collect())
}

fn parse_motd(body: &Value) -> Option<MotdEntry> {
    let motd = body.pointer("/data/motd")?;
    let raw = motd
        .get("message")
        .or_else(|| motd.get("body"))
        .and_then(Value::as_str)?;
    let text = html_to_text(raw);
    if text.is_empty() {
        return None;
    }
    let title = motd
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_MOTD_TITLE)
        .to_string();
    let timestamp = motd
        .get("last_modified")
        .or_else(|| motd.get("time_modified"))
        .and_then(Value::as_i64)
        .map(rfc3339_from_unix)
        .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
    Some(MotdEntry {
        title,
        body: text,
        timestamp,
    })
}

/// Numeric ids sort by value; anything else falls back to string order.
fn id_key(id: &str) -> (u8, u128, &str) {
    match id.parse::<u128>() {
        Ok(n) => (0, n, id),
        Err(_) => (1, 0, id),
    }
}

/// Items strictly newer than `last_item_id`, oldest first.
fn select_after(mut items: Vec<ChatItem>, last_item_id: &str) -> Vec<ChatItem> {
    items.sort_by(|a, b| id_key(&a.id).cmp(&id_key(&b.id)));
    items.dedup_by(|a, b| a.id == b.id);
    if last_item_id.is_empty() {
        return items;
    }

    if let Some(pos) = items.iter().position(|i| i.id == last_item_id) {
        return items.split_off(pos + 1);
    }
    let last = id_key(last_item_id);
    items.retain(|i| id_key(&i.id) > last);
    items
}
