use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::core::text::truncate_chars;
use crate::core::types::{ChatItem, MotdEntry};

/// Discord refuses message content above this many characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Reference to a delivered message so it can be edited afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel_id: u64,
    pub message_id: u64,
}

/// Delivery primitive of a chat platform.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, channel_id: u64, plain_text: &str) -> Result<MessageHandle>;

    async fn reformat(&self, handle: &MessageHandle, rich_text: &str) -> Result<()>;
}

/// Channel targets for relayed content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayTargets {
    pub messages_channel_id: u64,
    pub motd_channel_id: u64,
}

/// Send-then-edit relay: the plain message goes out first, then gets rewritten
/// with markdown. A failed edit leaves the plain message in place.
pub struct Relay {
    notifier: Arc<dyn Notifier>,
    targets: RelayTargets,
    lobby_url: String,
}

impl Relay {
    pub fn new(notifier: Arc<dyn Notifier>, targets: RelayTargets, lobby_url: String) -> Self {
        Self {
            notifier,
            targets,
            lobby_url: lobby_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn relay_item(&self, item: &ChatItem) -> Result<MessageHandle> {
        let plain = format!("{}: {}", item.author, item.body);
        let rich = format!(
            "# [{}](<{}/message/{}>)\n*{}*\n>>> **{}**",
            item.author, self.lobby_url, item.id, item.timestamp, item.body
        );
        self.send_then_edit(self.targets.messages_channel_id, &plain, &rich)
            .await
    }

    pub async fn relay_motd(&self, motd: &MotdEntry) -> Result<MessageHandle> {
        let plain = format!("{}: {}", motd.title, motd.body);
        let rich = format!(
            "# [{}](<{}>)\n*{}*\n>>> **{}**",
            motd.title, self.lobby_url, motd.timestamp, motd.body
        );
        self.send_then_edit(self.targets.motd_channel_id, &plain, &rich)
            .await
    }

    async fn send_then_edit(&self, channel_id: u64, plain: &str, rich: &str) -> Result<MessageHandle> {
        let handle = self
            .notifier
            .deliver(channel_id, &truncate_chars(plain, MAX_MESSAGE_CHARS - 3))
            .await?;

        if let Err(e) = self
            .notifier
            .reformat(&handle, &truncate_chars(rich, MAX_MESSAGE_CHARS - 3))
            .await
        {
            warn!(
                "Delivered message {} but formatting edit failed: {}",
                handle.message_id, e
            );
        }
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(u64, String)>>,
        edits: Mutex<Vec<String>>,
        fail_edit: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, channel_id: u64, plain_text: &str) -> Result<MessageHandle> {
            let mut sent = self.sent.lock().unwrap();
            sent.push((channel_id, plain_text.to_string()));
            Ok(MessageHandle {
                channel_id,
                message_id: sent.len() as u64,
            })
        }

        async fn reformat(&self, _handle: &MessageHandle, rich_text: &str) -> Result<()> {
            if self.fail_edit {
                anyhow::bail!("missing permissions");
            }
            self.edits.lock().unwrap().push(rich_text.to_string());
            Ok(())
        }
    }

    fn targets() -> RelayTargets {
        RelayTargets {
            messages_channel_id: 10,
            motd_channel_id: 20,
        }
    }

    fn item() -> ChatItem {
        ChatItem {
            id: "99".into(),
            author: "Zyloh-CIG".into(),
            body: "Servers are back".into(),
            timestamp: "2025-06-01T12:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn item_goes_to_messages_channel_with_link() {
        let notifier = Arc::new(RecordingNotifier::default());
        let relay = Relay::new(notifier.clone(), targets(), "https://x/lobby/1/".into());
        relay.relay_item(&item()).await.unwrap();

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent[0], (10, "Zyloh-CIG: Servers are back".to_string()));
        let edits = notifier.edits.lock().unwrap();
        assert!(edits[0].starts_with("# [Zyloh-CIG](<https://x/lobby/1/message/99>)"));
        assert!(edits[0].ends_with(">>> **Servers are back**"));
    }

    #[tokio::test]
    async fn motd_goes_to_motd_channel() {
        let notifier = Arc::new(RecordingNotifier::default());
        let relay = Relay::new(notifier.clone(), targets(), "https://x/lobby/1".into());
        let motd = MotdEntry {
            title: "MOTD".into(),
            body: "Welcome".into(),
            timestamp: "2025-06-01T12:00:00Z".into(),
        };
        relay.relay_motd(&motd).await.unwrap();
        assert_eq!(notifier.sent.lock().unwrap()[0].0, 20);
    }

    #[tokio::test]
    async fn failed_edit_still_counts_as_delivered() {
        let notifier = Arc::new(RecordingNotifier {
            fail_edit: true,
            ..Default::default()
        });
        let relay = Relay::new(notifier.clone(), targets(), "https://x".into());
        assert!(relay.relay_item(&item()).await.is_ok());
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn oversized_bodies_are_truncated() {
        let notifier = Arc::new(RecordingNotifier::default());
        let relay = Relay::new(notifier.clone(), targets(), "https://x".into());
        let mut long = item();
        long.body = "a".repeat(5000);
        relay.relay_item(&long).await.unwrap();
        let sent = notifier.sent.lock().unwrap();
        assert!(sent[0].1.chars().count() <= MAX_MESSAGE_CHARS);
    }
}
