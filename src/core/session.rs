use anyhow::Result;
use async_trait::async_trait;

/// A live, authenticated connection to the forum.
pub trait SessionHandle: Send + Sync {
    /// True once the handle is known to be dead and must be replaced.
    fn is_closed(&self) -> bool;
}

/// Produces and keeps alive [`SessionHandle`]s.
///
/// Errors tagged [`crate::core::error::RelayError::SessionDetached`] tell the
/// ingestion loop to throw the handle away; anything else keeps it.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    type Session: SessionHandle + 'static;

    async fn acquire(&self) -> Result<Self::Session>;

    async fn keep_alive(&self, session: &Self::Session) -> Result<()>;
}
