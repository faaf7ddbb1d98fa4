mod in_memory;
mod sqlite;

use async_trait::async_trait;

use crate::{
    report::ShiftReport,
    types::{ChatConfig, ChatId, ShiftEvent},
};

pub use in_memory::InMemoryShiftRepository;
pub use sqlite::SqliteShiftRepository;

#[async_trait]
pub trait ShiftRepository: Send + Sync {
    async fn load_chat_config(&self, chat_id: ChatId) -> anyhow::Result<Option<ChatConfig>>;

    async fn save_chat_config(&self, chat_id: ChatId, config: &ChatConfig) -> anyhow::Result<()>;

    async fn record_event(&self, event: ShiftEvent) -> anyhow::Result<()>;

    async fn list_events(&self, chat_id: ChatId, limit: usize) -> anyhow::Result<Vec<ShiftEvent>>;

    async fn record_report(&self, report: &ShiftReport) -> anyhow::Result<()>;

    async fn list_reports(&self, chat_id: ChatId, limit: usize)
    -> anyhow::Result<Vec<ShiftReport>>;
}
