use super::record_cells;
use crate::core::config::SheetsSinkConfig;
use crate::core::export::SnapshotSink;
use crate::core::snapshot::{COLUMNS, Snapshot, SnapshotRecord};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};
use tracing::{debug, instrument};

/// A Google Sheets range, replaced through the Sheets v4 values API.
///
/// A write clears the range first and then stores the header and rows. If
/// the clear succeeds but the update fails the range is left empty; keep a
/// local file sink configured when that matters.
pub struct GoogleSheetsSink {
    base_url: String,
    spreadsheet_id: String,
    range: String,
    token: String,
    client: Client,
}

impl GoogleSheetsSink {
    pub fn new(
        base_url: &str,
        spreadsheet_id: &str,
        range: &str,
        token: &str,
        client: Client,
    ) -> Self {
        GoogleSheetsSink {
            base_url: base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            range: range.to_string(),
            token: token.to_string(),
            client,
        }
    }

    /// Reads the bearer token from the environment variable named in `config`.
    pub fn from_config(config: &SheetsSinkConfig, client: Client) -> Result<Self> {
        let token = std::env::var(&config.token_env).with_context(|| {
            format!(
                "Sheets token environment variable {} is not set",
                config.token_env
            )
        })?;
        Ok(Self::new(
            &config.base_url,
            &config.spreadsheet_id,
            &config.range,
            &token,
            client,
        ))
    }

    fn values_url(&self) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url, self.spreadsheet_id, self.range
        )
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<()> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| anyhow!("Sheets {} request error: {}", action, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Sheets {} failed: HTTP {}: {}", action, status, body));
        }
        Ok(())
    }
}

fn number_or_blank(value: Option<f64>) -> Value {
    value.map_or(Value::String(String::new()), |v| json!(v))
}

/// Numbers stay numeric so the sheet can sort and filter them.
fn record_values(record: &SnapshotRecord) -> Vec<Value> {
    let [symbol, name, _, _, _, _, _, timestamp] = record_cells(record);
    vec![
        Value::String(symbol),
        Value::String(name),
        record
            .market_cap_rank
            .map_or(Value::String(String::new()), |r| json!(r)),
        number_or_blank(record.current_price),
        json!(record.weekly_close),
        json!(record.ema_200),
        json!(record.dist_pct),
        Value::String(timestamp),
    ]
}

fn sheet_values(snapshot: &Snapshot) -> Vec<Vec<Value>> {
    let header: Vec<Value> = COLUMNS.iter().map(|c| json!(c)).collect();
    std::iter::once(header)
        .chain(snapshot.records().iter().map(record_values))
        .collect()
}

#[async_trait]
impl SnapshotSink for GoogleSheetsSink {
    fn name(&self) -> &str {
        "google-sheets"
    }

    #[instrument(name = "SheetsWrite", skip(self, snapshot))]
    async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let url = self.values_url();
        debug!(spreadsheet = %self.spreadsheet_id, range = %self.range, "Replacing range");

        self.send(
            self.client.post(format!("{url}:clear")).json(&json!({})),
            "clear",
        )
        .await?;
        debug!("Range cleared");

        let body = json!({
            "range": self.range,
            "majorDimension": "ROWS",
            "values": sheet_values(snapshot),
        });
        self.send(
            self.client
                .put(format!("{url}?valueInputOption=RAW"))
                .json(&body),
            "update",
        )
        .await?;
        debug!(rows = snapshot.len(), "Range updated");
        Ok(())
    }
}
