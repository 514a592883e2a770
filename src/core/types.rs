use serde::{Deserialize, Serialize};

/// A single lobby post as returned by the extractor.
///
/// `body` starts out as the raw HTML fragment and is replaced by its plain-text
/// rendering before the item is stored or relayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatItem {
    pub id: String,
    #[serde(rename = "nickname")]
    pub author: String,
    pub body: String,
    #[serde(rename = "time")]
    pub timestamp: String,
}

/// The lobby's message of the day. Identity is the body text alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotdEntry {
    pub title: String,
    pub body: String,
    #[serde(rename = "time")]
    pub timestamp: String,
}

/// Incremental read position, persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorState {
    #[serde(default, alias = "lastMessageId")]
    pub last_item_id: String,
    #[serde(default)]
    pub last_motd_body: String,
}

/// Collection names in the document store.
pub const MESSAGES_COLLECTION: &str = "messages";
pub const MOTD_COLLECTION: &str = "motd";
