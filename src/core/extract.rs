use anyhow::Result;
use async_trait::async_trait;

use crate::core::types::{ChatItem, MotdEntry};

/// Pulls lobby content through an established session.
#[async_trait]
pub trait Extractor<S: Sync>: Send + Sync {
    /// Items newer than `last_item_id`, oldest first. "Nothing new" is an empty
    /// vector, never an error.
    async fn fetch_new_items(&self, session: &S, last_item_id: &str) -> Result<Vec<ChatItem>>;

    async fn fetch_motd(&self, session: &S) -> Result<Option<MotdEntry>>;
}
