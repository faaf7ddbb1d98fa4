use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    report::ShiftReport,
    types::{ChatConfig, ChatId, ShiftEvent},
};

use super::ShiftRepository;

#[derive(Debug, Default)]
pub struct InMemoryShiftRepository {
    configs: Arc<RwLock<HashMap<ChatId, ChatConfig>>>,
    events: Arc<RwLock<HashMap<ChatId, Vec<ShiftEvent>>>>,
    reports: Arc<RwLock<HashMap<ChatId, Vec<ShiftReport>>>>,
}

#[async_trait]
impl ShiftRepository for InMemoryShiftRepository {
    async fn load_chat_config(&self, chat_id: ChatId) -> anyhow::Result<Option<ChatConfig>> {
        Ok(self.configs.read().await.get(&chat_id).cloned())
    }

    async fn save_chat_config(&self, chat_id: ChatId, config: &ChatConfig) -> anyhow::Result<()> {
        self.configs.write().await.insert(chat_id, config.clone());
        Ok(())
    }

    async fn record_event(&self, event: ShiftEvent) -> anyhow::Result<()> {
        let mut events = self.events.write().await;
        events.entry(event.chat_id).or_default().push(event);
        Ok(())
    }

    async fn list_events(&self, chat_id: ChatId, limit: usize) -> anyhow::Result<Vec<ShiftEvent>> {
        let mut events = self
            .events
            .read()
            .await
            .get(&chat_id)
            .cloned()
            .unwrap_or_default();
        events.sort_by_key(|event| event.timestamp);
        if events.len() > limit {
            let start = events.len().saturating_sub(limit);
            events = events.split_off(start);
        }
        Ok(events)
    }

    async fn record_report(&self, report: &ShiftReport) -> anyhow::Result<()> {
        let mut reports = self.reports.write().await;
        reports
            .entry(report.chat_id)
            .or_default()
            .push(report.clone());
        Ok(())
    }

    async fn list_reports(
        &self,
        chat_id: ChatId,
        limit: usize,
    ) -> anyhow::Result<Vec<ShiftReport>> {
        let mut reports = self
            .reports
            .read()
            .await
            .get(&chat_id)
            .cloned()
            .unwrap_or_default();
        reports.sort_by_key(|report| std::cmp::Reverse(report.finished_at));
        reports.truncate(limit);
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};

    use crate::{
        storage::ShiftRepository,
        types::{ChatConfig, ShiftEvent, ShiftEventKind},
    };

    use super::InMemoryShiftRepository;

    #[tokio::test]
    async fn list_events_keeps_latest_in_time_order() {
        let repository = InMemoryShiftRepository::default();
        let start = Utc.with_ymd_and_hms(2026, 3, 4, 18, 0, 0).unwrap();
        for minute in 0..5 {
            repository
                .record_event(ShiftEvent {
                    chat_id: 1,
                    user_id: Some(7),
                    kind: ShiftEventKind::Joined,
                    detail: format!("event {minute}"),
                    timestamp: start + TimeDelta::minutes(minute),
                })
                .await
                .expect("record should succeed");
        }

        let events = repository.list_events(1, 2).await.expect("list should succeed");
        assert_eq!(
            events
                .iter()
                .map(|event| event.detail.as_str())
                .collect::<Vec<_>>(),
            vec!["event 3", "event 4"]
        );
        assert!(repository.list_events(2, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn chat_config_round_trips() {
        let repository = InMemoryShiftRepository::default();
        assert_eq!(repository.load_chat_config(1).await.unwrap(), None);

        let config = ChatConfig {
            goal_override: Some(20),
            ..ChatConfig::default()
        };
        repository
            .save_chat_config(1, &config)
            .await
            .expect("save should succeed");
        assert_eq!(repository.load_chat_config(1).await.unwrap(), Some(config));
    }
}
