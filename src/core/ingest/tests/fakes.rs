use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::cursor::CursorStore;
use crate::core::extract::Extractor;
use crate::core::ingest::{IngestTiming, Orchestrator};
use crate::core::notify::{MessageHandle, Notifier, Relay, RelayTargets};
use crate::core::session::{SessionHandle, SessionProvider};
use crate::core::stats::BotStats;
use crate::core::store::{DocumentStore, FindOptions, InsertAck};
use crate::core::types::{ChatItem, CursorState, MotdEntry};

pub fn item(id: &str, body: &str) -> ChatItem {
    ChatItem {
        id: id.to_string(),
        author: "Zyloh-CIG".to_string(),
        body: body.to_string(),
        timestamp: "2025-06-01T12:00:00Z".to_string(),
    }
}

pub fn motd(body: &str) -> MotdEntry {
    MotdEntry {
        title: "Message Of The Day".to_string(),
        body: body.to_string(),
        timestamp: "2025-06-01T12:00:00Z".to_string(),
    }
}

pub struct FakeSession {
    closed: Arc<AtomicBool>,
}

impl SessionHandle for FakeSession {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Counts acquisitions; keep-alive results are scripted per call.
#[derive(Default)]
pub struct FakeProvider {
    pub acquires: AtomicUsize,
    pub fail_acquire: AtomicBool,
    pub keep_alive_errors: Mutex<VecDeque<anyhow::Error>>,
    /// Shared with every session handed out, so tests can close the live one.
    pub closed: Arc<AtomicBool>,
}

impl FakeProvider {
    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn fail_next_keep_alive(&self, err: anyhow::Error) {
        self.keep_alive_errors.lock().unwrap().push_back(err);
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    type Session = FakeSession;

    async fn acquire(&self) -> Result<FakeSession> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(anyhow!("login page unreachable"));
        }
        self.closed.store(false, Ordering::SeqCst);
        Ok(FakeSession {
            closed: self.closed.clone(),
        })
    }

    async fn keep_alive(&self, _session: &FakeSession) -> Result<()> {
        match self.keep_alive_errors.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Serves scripted batches; an empty script means "nothing new".
#[derive(Default)]
pub struct FakeExtractor {
    pub batches: Mutex<VecDeque<Result<Vec<ChatItem>>>>,
    pub motds: Mutex<VecDeque<Result<Option<MotdEntry>>>>,
    pub cursors_seen: Mutex<Vec<String>>,
    pub stall: Mutex<Option<Duration>>,
}

impl FakeExtractor {
    pub fn push_items(&self, items: Vec<ChatItem>) {
        self.batches.lock().unwrap().push_back(Ok(items));
    }

    pub fn push_items_error(&self, msg: &str) {
        self.batches.lock().unwrap().push_back(Err(anyhow!(msg.to_string())));
    }

    pub fn push_motd(&self, entry: Option<MotdEntry>) {
        self.motds.lock().unwrap().push_back(Ok(entry));
    }

    pub fn push_motd_error(&self, msg: &str) {
        self.motds.lock().unwrap().push_back(Err(anyhow!(msg.to_string())));
    }

    pub fn stall_for(&self, d: Duration) {
        *self.stall.lock().unwrap() = Some(d);
    }
}

#[async_trait]
impl Extractor<FakeSession> for FakeExtractor {
    async fn fetch_new_items(&self, _session: &FakeSession, last_item_id: &str) -> Result<Vec<ChatItem>> {
        self.cursors_seen.lock().unwrap().push(last_item_id.to_string());
        let stall = *self.stall.lock().unwrap();
        if let Some(d) = stall {
            tokio::time::sleep(d).await;
        }
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch_motd(&self, _session: &FakeSession) -> Result<Option<MotdEntry>> {
        self.motds.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }
}

/// In-memory store that refuses documents whose `id` is in `reject_ids`.
#[derive(Default)]
pub struct FakeStore {
    pub inserted: Mutex<Vec<(String, Value)>>,
    pub reject_ids: Mutex<HashSet<String>>,
    pub reject_motd: AtomicBool,
}

impl FakeStore {
    pub fn ids_in(&self, collection: &str) -> Vec<String> {
        self.inserted
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == collection)
            .map(|(_, doc)| doc["id"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn count_in(&self, collection: &str) -> usize {
        self.inserted
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == collection)
            .count()
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn insert(&self, collection: &str, document: Value) -> Result<InsertAck> {
        if collection == "motd" && self.reject_motd.load(Ordering::SeqCst) {
            return Err(anyhow!("write concern failed"));
        }
        if let Some(id) = document["id"].as_str()
            && self.reject_ids.lock().unwrap().contains(id)
        {
            return Err(anyhow!("duplicate key {}", id));
        }
        let mut inserted = self.inserted.lock().unwrap();
        inserted.push((collection.to_string(), document));
        Ok(InsertAck {
            id: inserted.len().to_string(),
        })
    }

    async fn find(&self, collection: &str, _filter: &Value, _options: FindOptions) -> Result<Vec<Value>> {
        Ok(self
            .inserted
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == collection)
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        Ok(self.count_in(collection) as u64)
    }

    async fn count_since(&self, collection: &str, _field: &str, _since: DateTime<Utc>) -> Result<u64> {
        self.count(collection).await
    }
}

/// Records deliveries; with `fail_deliver` set every send is refused.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(u64, String)>>,
    pub fail_deliver: AtomicBool,
}

impl RecordingNotifier {
    pub fn sent_to(&self, channel_id: u64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == channel_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, channel_id: u64, plain_text: &str) -> Result<MessageHandle> {
        if self.fail_deliver.load(Ordering::SeqCst) {
            return Err(anyhow!("Missing Access"));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((channel_id, plain_text.to_string()));
        Ok(MessageHandle {
            channel_id,
            message_id: sent.len() as u64,
        })
    }

    async fn reformat(&self, _handle: &MessageHandle, _rich_text: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCursorStore {
    pub initial: Mutex<Option<Result<CursorState>>>,
    pub saves: Mutex<Vec<CursorState>>,
    pub fail_save: AtomicBool,
}

impl MemoryCursorStore {
    pub fn starting_at(state: CursorState) -> Self {
        Self {
            initial: Mutex::new(Some(Ok(state))),
            ..Default::default()
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }

    pub fn last_saved(&self) -> Option<CursorState> {
        self.saves.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self) -> Result<CursorState> {
        self.initial
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Ok(CursorState::default()))
    }

    async fn save(&self, state: &CursorState) -> Result<()> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }
        self.saves.lock().unwrap().push(state.clone());
        Ok(())
    }
}

pub const MESSAGES_CHANNEL: u64 = 100;
pub const MOTD_CHANNEL: u64 = 200;

/// Every collaborator behind an `Arc`, shared with the orchestrator under test.
pub struct Harness {
    pub provider: Arc<FakeProvider>,
    pub extractor: Arc<FakeExtractor>,
    pub store: Arc<FakeStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub cursor_store: Arc<MemoryCursorStore>,
    pub stats: Arc<BotStats>,
    pub timing: IngestTiming,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_cursor(CursorState::default())
    }

    pub fn with_cursor(cursor: CursorState) -> Self {
        Self {
            provider: Arc::new(FakeProvider::default()),
            extractor: Arc::new(FakeExtractor::default()),
            store: Arc::new(FakeStore::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            cursor_store: Arc::new(MemoryCursorStore::starting_at(cursor)),
            stats: Arc::new(BotStats::new()),
            timing: IngestTiming::default(),
        }
    }

    pub fn orchestrator(&self) -> Orchestrator<FakeProvider, FakeExtractor> {
        let relay = Relay::new(
            self.notifier.clone(),
            RelayTargets {
                messages_channel_id: MESSAGES_CHANNEL,
                motd_channel_id: MOTD_CHANNEL,
            },
            "https://robertsspaceindustries.com/spectrum/community/SC/lobby/38230".to_string(),
        );
        Orchestrator::new(
            self.provider.clone(),
            self.extractor.clone(),
            self.store.clone(),
            Arc::new(relay),
            self.cursor_store.clone(),
            self.stats.clone(),
            self.timing,
        )
    }

    /// An orchestrator that has already acquired its first session.
    pub async fn started(&self) -> Orchestrator<FakeProvider, FakeExtractor> {
        let mut orch = self.orchestrator();
        orch.start().await.expect("startup");
        orch
    }
}
