mod query;

pub use query::FindOptions;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};

use crate::core::error::RelayError;
use crate::platform::{NativePlatform, Platform};

/// Acknowledgement for a stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertAck {
    pub id: String,
}

/// Collection-oriented durable store for relayed items.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Bounded by the store's per-call timeout; a timeout is an ordinary error.
    async fn insert(&self, collection: &str, document: Value) -> Result<InsertAck>;

    /// `filter` is a JSON object whose top-level fields must match exactly.
    async fn find(
        &self,
        collection: &str,
        filter: &Value,
        options: FindOptions,
    ) -> Result<Vec<Value>>;

    async fn count(&self, collection: &str) -> Result<u64>;

    /// Documents whose `field` holds an RFC 3339 instant strictly after `since`.
    async fn count_since(&self, collection: &str, field: &str, since: DateTime<Utc>)
    -> Result<u64>;
}

/// SQLite-backed [`DocumentStore`]. Each document is a JSON blob keyed by collection.
pub struct SqliteDocumentStore {
    db: Arc<Mutex<Connection>>,
    insert_timeout: Duration,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    rowid INTEGER PRIMARY KEY AUTOINCREMENT,
    doc_id TEXT NOT NULL UNIQUE,
    collection TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, rowid);
";

impl SqliteDocumentStore {
    pub async fn open<P: AsRef<Path>>(path: P, insert_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            tokio::fs::create_dir_all(parent).await?;
            NativePlatform::restrict_dir_permissions(parent);
        }

        let db = Connection::open(&path)
            .with_context(|| format!("opening document store at {}", path.display()))?;
        NativePlatform::restrict_file_permissions(&path);
        db.execute_batch(SCHEMA)?;
        info!("Document store opened at {}", path.display());

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            insert_timeout,
        })
    }

    #[cfg(test)]
    pub fn open_in_memory(insert_timeout: Duration) -> Result<Self> {
        let db = Connection::open_in_memory()?;
        db.execute_batch(SCHEMA)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            insert_timeout,
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| anyhow!("document store connection poisoned"))?;
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn insert(&self, collection: &str, document: Value) -> Result<InsertAck> {
        if !document.is_object() {
            return Err(anyhow!("only JSON objects can be stored, got {}", document));
        }
        let doc_id = uuid::Uuid::new_v4().to_string();
        let body = serde_json::to_string(&document)?;
        let coll = collection.to_string();
        let id = doc_id.clone();

        let write = self.with_db(move |db| {
            db.execute(
                "INSERT INTO documents (doc_id, collection, body) VALUES (?1, ?2, ?3)",
                params![id, coll, body],
            )?;
            Ok(())
        });

        match tokio::time::timeout(self.insert_timeout, write).await {
            Ok(Ok(())) => Ok(InsertAck { id: doc_id }),
            Ok(Err(e)) => {
                error!("Error inserting document into '{}': {}", collection, e);
                Err(e)
            }
            Err(_elapsed) => {
                error!(
                    "Document insert into '{}' timed out after {:?}",
                    collection, self.insert_timeout
                );
                Err(RelayError::InsertTimeout {
                    collection: collection.to_string(),
                    after: self.insert_timeout,
                }
                .into())
            }
        }
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Value,
        options: FindOptions,
    ) -> Result<Vec<Value>> {
        let plan = query::build_find(collection, filter, &options)?;
        self.with_db(move |db| plan.run(db)).await
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let coll = collection.to_string();
        self.with_db(move |db| {
            let n: i64 = db.query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                params![coll],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
        .await
    }

    async fn count_since(
        &self,
        collection: &str,
        field: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        let coll = collection.to_string();
        let path = query::json_path(field)?;
        self.with_db(move |db| {
            let mut stmt = db.prepare(
                "SELECT json_extract(body, ?2) FROM documents \
                 WHERE collection = ?1 AND json_type(body, ?2) = 'text'",
            )?;
            let rows = stmt.query_map(params![coll, path], |row| row.get::<_, Option<String>>(0))?;
            let mut n = 0u64;
            for row in rows {
                if let Some(raw) = row?
                    && let Ok(at) = DateTime::parse_from_rfc3339(&raw)
                    && at.with_timezone(&Utc) > since
                {
                    n += 1;
                }
            }
            Ok(n)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_store() -> SqliteDocumentStore {
        SqliteDocumentStore::open_in_memory(Duration::from_secs(10)).expect("in-memory store")
    }

    #[tokio::test]
    async fn insert_returns_unique_ids() {
        let store = test_store();
        let a = store.insert("messages", json!({"id": "1"})).await.unwrap();
        let b = store.insert("messages", json!({"id": "2"})).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.count("messages").await.unwrap(), 2);
        assert_eq!(store.count("motd").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn insert_rejects_non_objects() {
        let store = test_store();
        assert!(store.insert("messages", json!("bare")).await.is_err());
    }

    #[tokio::test]
    async fn find_sorts_descending_and_limits() {
        let store = test_store();
        for (id, time) in [
            ("1", "2025-01-01T00:00:01Z"),
            ("2", "2025-01-01T00:00:03Z"),
            ("3", "2025-01-01T00:00:02Z"),
        ] {
            store
                .insert("messages", json!({"id": id, "time": time}))
                .await
                .unwrap();
        }
        let docs = store
            .find(
                "messages",
                &json!({}),
                FindOptions::default()
                    .limit(2)
                    .newest_first("time"),
            )
            .await
            .unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert!(docs[0]["_id"].is_string());
    }

    #[tokio::test]
    async fn find_applies_equality_filter() {
        let store = test_store();
        store
            .insert("messages", json!({"id": "1", "nickname": "Zyloh"}))
            .await
            .unwrap();
        store
            .insert("messages", json!({"id": "2", "nickname": "Other"}))
            .await
            .unwrap();
        let docs = store
            .find(
                "messages",
                &json!({"nickname": "Zyloh"}),
                FindOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["id"], "1");
    }

    #[tokio::test]
    async fn count_since_ignores_unparseable_times() {
        let store = test_store();
        store
            .insert("messages", json!({"time": "2025-06-02T00:00:00Z"}))
            .await
            .unwrap();
        store
            .insert("messages", json!({"time": "2025-05-01T00:00:00Z"}))
            .await
            .unwrap();
        store
            .insert("messages", json!({"time": "yesterday"}))
            .await
            .unwrap();
        let since = DateTime::parse_from_rfc3339("2025-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            store.count_since("messages", "time", since).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn open_creates_file_backed_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("relay.db");
        let store = SqliteDocumentStore::open(&path, Duration::from_secs(10))
            .await
            .unwrap();
        store.insert("motd", json!({"body": "B1"})).await.unwrap();
        drop(store);

        let reopened = SqliteDocumentStore::open(&path, Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(reopened.count("motd").await.unwrap(), 1);
    }
}
