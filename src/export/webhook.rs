use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{ExportRow, ShiftExporter};

#[derive(Debug, Clone)]
pub struct SheetsWebhookExporter {
    client: Client,
    url: String,
    token: Option<String>,
}

impl SheetsWebhookExporter {
    pub fn new(url: String, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url,
            token,
        }
    }
}

#[derive(Debug, Serialize)]
struct AppendRowRequest<'a> {
    row: &'a ExportRow,
    values: Vec<serde_json::Value>,
}

#[async_trait]
impl ShiftExporter for SheetsWebhookExporter {
    async fn export(&self, row: &ExportRow) -> anyhow::Result<()> {
        let payload = AppendRowRequest {
            row,
            values: row.values(),
        };

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        request
            .send()
            .await?
            .error_for_status()
            .context("export webhook rejected the row")?;

        Ok(())
    }
}
