use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::error::RelayError;
use crate::core::types::CursorState;
use crate::platform::{NativePlatform, Platform};

/// Load/save mechanism for the ingestion cursor. Holds no business logic.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Returns defaults when nothing has been saved yet. A file that exists but
    /// cannot be decoded surfaces as [`RelayError::CursorCorrupt`].
    async fn load(&self) -> Result<CursorState>;

    async fn save(&self, state: &CursorState) -> Result<()>;
}

/// JSON file on disk, replaced atomically via write-to-temp + rename.
pub struct JsonCursorStore {
    path: PathBuf,
}

impl JsonCursorStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "cursor.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CursorStore for JsonCursorStore {
    async fn load(&self) -> Result<CursorState> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cursor at {}, starting fresh", self.path.display());
                return Ok(CursorState::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            }
        };

        if raw.trim().is_empty() {
            return Ok(CursorState::default());
        }

        serde_json::from_str(&raw)
            .map_err(|e| RelayError::CursorCorrupt(format!("{}: {}", self.path.display(), e)).into())
    }

    async fn save(&self, state: &CursorState) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.temp_path();
        let body = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&tmp, &body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        NativePlatform::restrict_file_permissions(&tmp);
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCursorStore::new(dir.path().join("cursor.json"));
        assert_eq!(store.load().await.unwrap(), CursorState::default());
    }

    #[tokio::test]
    async fn save_then_load_returns_same_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCursorStore::new(dir.path().join("nested").join("cursor.json"));
        let state = CursorState {
            last_item_id: "6".into(),
            last_motd_body: "B1".into(),
        };
        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), state);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn legacy_field_name_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.json");
        std::fs::write(&path, r#"{"lastMessageId":"77","lastMotdBody":"hi"}"#).unwrap();
        let state = JsonCursorStore::new(&path).load().await.unwrap();
        assert_eq!(state.last_item_id, "77");
        assert_eq!(state.last_motd_body, "hi");
    }

    #[tokio::test]
    async fn corrupt_file_is_a_distinguishable_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = JsonCursorStore::new(&path).load().await.unwrap_err();
        assert!(matches!(
            RelayError::find_in(&err),
            Some(RelayError::CursorCorrupt(_))
        ));
    }
}
