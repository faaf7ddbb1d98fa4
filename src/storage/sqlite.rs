use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::{
    report::ShiftReport,
    types::{ChatConfig, ChatId, ShiftEvent, ShiftEventKind},
};

use super::ShiftRepository;

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS chat_settings (
        chat_id INTEGER PRIMARY KEY,
        config_json TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS shift_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        chat_id INTEGER NOT NULL,
        user_id INTEGER,
        kind TEXT NOT NULL,
        detail TEXT NOT NULL,
        timestamp TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS shift_events_chat_time ON shift_events (chat_id, timestamp)",
    "CREATE TABLE IF NOT EXISTS shift_reports (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        chat_id INTEGER NOT NULL,
        report_date TEXT NOT NULL,
        finished_at TEXT NOT NULL,
        report_json TEXT NOT NULL
    )",
];

#[derive(Debug, Clone)]
pub struct SqliteShiftRepository {
    pool: SqlitePool,
}

impl SqliteShiftRepository {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `:memory:` opens its own database.
        let in_memory = database_url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let repository = Self { pool };
        repository.migrate().await?;
        Ok(repository)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ShiftRepository for SqliteShiftRepository {
    async fn load_chat_config(&self, chat_id: ChatId) -> anyhow::Result<Option<ChatConfig>> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT config_json FROM chat_settings WHERE chat_id = ?1",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save_chat_config(&self, chat_id: ChatId, config: &ChatConfig) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO chat_settings (chat_id, config_json, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (chat_id)
             DO UPDATE SET config_json = excluded.config_json, updated_at = excluded.updated_at",
        )
        .bind(chat_id)
        .bind(serde_json::to_string(config)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_event(&self, event: ShiftEvent) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO shift_events (chat_id, user_id, kind, detail, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(event.chat_id)
        .bind(event.user_id.map(|id| id as i64))
        .bind(event.kind.as_str())
        .bind(event.detail)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_events(&self, chat_id: ChatId, limit: usize) -> anyhow::Result<Vec<ShiftEvent>> {
        let rows = sqlx::query_as::<_, (Option<i64>, String, String, DateTime<Utc>)>(
            "SELECT user_id, kind, detail, timestamp
             FROM shift_events
             WHERE chat_id = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
        )
        .bind(chat_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .rev()
            .map(|(user_id, kind, detail, timestamp)| -> anyhow::Result<ShiftEvent> {
                Ok(ShiftEvent {
                    chat_id,
                    user_id: user_id.map(|id| id as u64),
                    kind: ShiftEventKind::from_str(&kind)?,
                    detail,
                    timestamp,
                })
            })
            .collect()
    }

    async fn record_report(&self, report: &ShiftReport) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO shift_reports (chat_id, report_date, finished_at, report_json)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(report.chat_id)
        .bind(report.date.to_string())
        .bind(report.finished_at)
        .bind(serde_json::to_string(report)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_reports(
        &self,
        chat_id: ChatId,
        limit: usize,
    ) -> anyhow::Result<Vec<ShiftReport>> {
        sqlx::query_as::<_, (String,)>(
            "SELECT report_json
             FROM shift_reports
             WHERE chat_id = ?1
             ORDER BY finished_at DESC, id DESC
             LIMIT ?2",
        )
        .bind(chat_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(json,)| serde_json::from_str(&json).map_err(anyhow::Error::from))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};

    use crate::{
        config::ShiftRules,
        report::EndTrigger,
        shift::{EndOutcome, finish_shift, join},
        storage::ShiftRepository,
        types::{ChatConfig, ShiftEvent, ShiftEventKind, ShiftState},
    };

    use super::SqliteShiftRepository;

    async fn repository() -> SqliteShiftRepository {
        SqliteShiftRepository::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite should open")
    }

    #[tokio::test]
    async fn chat_settings_upsert() {
        let repository = repository().await;
        assert_eq!(repository.load_chat_config(-100).await.unwrap(), None);

        let mut config = ChatConfig::default();
        repository.save_chat_config(-100, &config).await.unwrap();
        config.voice_timeout_minutes = 45;
        config.content_templates = vec!["greeting".to_owned()];
        repository.save_chat_config(-100, &config).await.unwrap();

        assert_eq!(
            repository.load_chat_config(-100).await.unwrap(),
            Some(config)
        );
    }

    #[tokio::test]
    async fn events_come_back_oldest_first_within_limit() {
        let repository = repository().await;
        let start = Utc.with_ymd_and_hms(2026, 3, 4, 18, 0, 0).unwrap();
        let kinds = [
            ShiftEventKind::Joined,
            ShiftEventKind::BreakStarted,
            ShiftEventKind::BreakEnded,
        ];
        for (index, kind) in kinds.into_iter().enumerate() {
            repository
                .record_event(ShiftEvent {
                    chat_id: 5,
                    user_id: Some(index as u64 + 1),
                    kind,
                    detail: String::new(),
                    timestamp: start + TimeDelta::minutes(index as i64),
                })
                .await
                .expect("insert should succeed");
        }

        let events = repository.list_events(5, 2).await.expect("list should succeed");
        assert_eq!(
            events.iter().map(|event| event.kind).collect::<Vec<_>>(),
            vec![ShiftEventKind::BreakStarted, ShiftEventKind::BreakEnded]
        );
        assert_eq!(events[1].user_id, Some(3));
    }

    #[tokio::test]
    async fn reports_are_stored_as_json() {
        let repository = repository().await;
        let rules = ShiftRules::default();
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 18, 0, 0).unwrap();
        let mut state = ShiftState::new(5, ChatConfig::default());
        join(&mut state, 1, "Anna", None, now, &rules);

        let EndOutcome::Report(report) = finish_shift(&mut state, now, EndTrigger::Manual) else {
            panic!("report expected");
        };
        repository.record_report(&report).await.expect("insert should succeed");

        let reports = repository.list_reports(5, 10).await.expect("list should succeed");
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].goal, 18);
        assert_eq!(reports[0].trigger, EndTrigger::Manual);
    }
}
