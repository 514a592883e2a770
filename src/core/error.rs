use std::time::Duration;

/// Failure signals the ingestion loop needs to tell apart.
///
/// Collaborators wrap these in `anyhow::Error`; [`RelayError::find_in`] walks
/// the chain to recover the classification.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("session detached: {0}")]
    SessionDetached(String),

    #[error("session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("scraping cycle timeout after {0:?}")]
    CycleTimeout(Duration),

    #[error("document insert into '{collection}' timed out after {after:?}")]
    InsertTimeout { collection: String, after: Duration },

    #[error("cursor file is corrupt: {0}")]
    CursorCorrupt(String),
}

impl RelayError {
    pub fn find_in(err: &anyhow::Error) -> Option<&RelayError> {
        err.chain().find_map(|cause| cause.downcast_ref::<RelayError>())
    }

    /// Whether the session must be thrown away before the next cycle.
    pub fn requires_new_session(&self) -> bool {
        matches!(
            self,
            RelayError::SessionDetached(_) | RelayError::CycleTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn find_in_sees_through_context_layers() {
        let err = Err::<(), _>(RelayError::SessionDetached("frame gone".into()))
            .context("keep-alive failed")
            .unwrap_err();
        let found = RelayError::find_in(&err).expect("classified");
        assert!(found.requires_new_session());
    }

    #[test]
    fn plain_errors_are_unclassified() {
        let err = anyhow::anyhow!("connection reset");
        assert!(RelayError::find_in(&err).is_none());
    }

    #[test]
    fn only_detach_and_timeout_recreate_the_session() {
        assert!(RelayError::CycleTimeout(Duration::from_secs(25)).requires_new_session());
        assert!(!RelayError::SessionUnavailable("login rejected".into()).requires_new_session());
        assert!(
            !RelayError::InsertTimeout {
                collection: "messages".into(),
                after: Duration::from_secs(10)
            }
            .requires_new_session()
        );
    }
}
