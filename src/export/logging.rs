use async_trait::async_trait;
use tracing::info;

use super::{ExportRow, ShiftExporter};

#[derive(Debug, Default)]
pub struct LogExporter;

#[async_trait]
impl ShiftExporter for LogExporter {
    async fn export(&self, row: &ExportRow) -> anyhow::Result<()> {
        info!(
            chat_id = row.chat_id,
            date = %row.date,
            count = row.count,
            goal = row.goal,
            percentage = row.percentage,
            "shift summary (export disabled)"
        );
        Ok(())
    }
}
