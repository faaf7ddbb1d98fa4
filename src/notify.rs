use async_trait::async_trait;
use tracing::info;

use crate::types::ChatId;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> anyhow::Result<()> {
        info!(chat_id, text, "notice (no transport configured)");
        Ok(())
    }
}

#[cfg(test)]
pub use recording::RecordingNotifier;

#[cfg(test)]
mod recording {
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use crate::types::ChatId;

    use super::Notifier;

    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(ChatId, String)>>,
    }

    impl RecordingNotifier {
        pub async fn texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .await
                .iter()
                .map(|(_, text)| text.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_text(&self, chat_id: ChatId, text: &str) -> anyhow::Result<()> {
            self.sent.lock().await.push((chat_id, text.to_owned()));
            Ok(())
        }
    }
}
