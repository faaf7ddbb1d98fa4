mod logging;
mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{report::ShiftReport, types::ChatId};

pub use logging::LogExporter;
pub use webhook::SheetsWebhookExporter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub date: String,
    pub chat_id: ChatId,
    pub role: String,
    pub count: u32,
    pub goal: u32,
    pub percentage: f64,
    pub breaks: u32,
    pub late_returns: u32,
    pub avg_gap_minutes: f64,
    pub max_gap_minutes: f64,
    pub avg_duration_secs: f64,
    pub recommendation: String,
    pub tags: String,
}

impl ExportRow {
    pub fn from_report(report: &ShiftReport) -> Self {
        Self {
            date: report.date.format("%Y-%m-%d").to_string(),
            chat_id: report.chat_id,
            role: report.role_tag(),
            count: report.count,
            goal: report.goal,
            percentage: round1(report.percentage),
            breaks: report.breaks,
            late_returns: report.late_returns,
            avg_gap_minutes: round1(report.avg_gap_minutes.unwrap_or_default()),
            max_gap_minutes: round1(report.max_gap_minutes.unwrap_or_default()),
            avg_duration_secs: round1(report.avg_duration_secs.unwrap_or_default()),
            recommendation: report.recommendation.clone(),
            tags: report.tags.join(", "),
        }
    }

    pub fn values(&self) -> Vec<serde_json::Value> {
        vec![
            self.date.clone().into(),
            self.chat_id.into(),
            self.role.clone().into(),
            self.count.into(),
            self.goal.into(),
            self.percentage.into(),
            self.breaks.into(),
            self.late_returns.into(),
            self.avg_gap_minutes.into(),
            self.max_gap_minutes.into(),
            self.avg_duration_secs.into(),
            self.recommendation.clone().into(),
            self.tags.clone().into(),
        ]
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[async_trait]
pub trait ShiftExporter: Send + Sync {
    async fn export(&self, row: &ExportRow) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::{
        config::ShiftRules,
        report::EndTrigger,
        shift::{EndOutcome, finish_shift, join, record_voice},
        types::{ChatConfig, ShiftState},
    };

    use super::ExportRow;

    #[test]
    fn row_follows_report_columns() {
        let rules = ShiftRules::default();
        let now = Utc.with_ymd_and_hms(2026, 3, 7, 18, 0, 0).unwrap();
        let mut state = ShiftState::new(-42, ChatConfig::default());
        join(&mut state, 1, "Anna", None, now, &rules);
        join(&mut state, 2, "Boris", None, now, &rules);
        record_voice(&mut state, 1, "Anna", 12, now, &rules);

        let EndOutcome::Report(report) = finish_shift(&mut state, now, EndTrigger::Manual) else {
            panic!("report expected");
        };
        let row = ExportRow::from_report(&report);

        assert_eq!(row.date, "2026-03-07");
        assert_eq!(row.role, "host+co-host");
        assert_eq!(row.goal, 30);
        assert_eq!(row.percentage, 3.3);
        assert_eq!(row.avg_duration_secs, 12.0);
        assert_eq!(row.values().len(), 13);
        assert_eq!(row.values()[1], serde_json::json!(-42));
    }
}
