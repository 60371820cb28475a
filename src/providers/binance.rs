use super::util::get_success;
use crate::core::price::{HistoryFetch, PriceBar, PriceHistoryProvider, PriceSeries};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

/// Largest `limit` the klines endpoint accepts.
const MAX_KLINES: usize = 1000;

/// Weekly candles from the Binance spot `/klines` endpoint.
pub struct BinanceProvider {
    base_url: String,
    quote_asset: String,
    client: Client,
}

impl BinanceProvider {
    pub fn new(base_url: &str, quote_asset: &str, client: Client) -> Self {
        BinanceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            quote_asset: quote_asset.to_uppercase(),
            client,
        }
    }

    pub fn pair(&self, symbol: &str) -> String {
        format!("{}{}", symbol.to_uppercase(), self.quote_asset)
    }

    async fn request_klines(&self, pair: &str, bar_limit: usize) -> Result<Vec<Vec<Value>>> {
        let url = format!(
            "{}/klines?symbol={}&interval=1w&limit={}",
            self.base_url,
            pair,
            bar_limit.clamp(1, MAX_KLINES)
        );
        let response = get_success(&self.client, &url).await?;
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read klines response for {pair}"))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse klines response for {pair}"))
    }
}

/// Open time (index 0, epoch millis) and close (index 4, decimal string).
fn parse_kline(row: &[Value]) -> Result<PriceBar> {
    let open_ms = row
        .first()
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow!("Missing open time"))?;
    let timestamp = DateTime::from_timestamp_millis(open_ms)
        .ok_or_else(|| anyhow!("Open time out of range: {open_ms}"))?;

    let close = match row.get(4) {
        Some(Value::String(s)) => s
            .parse::<f64>()
            .with_context(|| format!("Invalid close price: {s}"))?,
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| anyhow!("Invalid close price: {n}"))?,
        _ => return Err(anyhow!("Missing close price")),
    };
    if !close.is_finite() {
        return Err(anyhow!("Non-finite close price: {close}"));
    }

    Ok(PriceBar::new(timestamp, close))
}

#[async_trait]
impl PriceHistoryProvider for BinanceProvider {
    #[instrument(
        name = "BinanceWeeklyFetch",
        skip(self),
        fields(symbol = %symbol)
    )]
    async fn fetch_weekly(&self, symbol: &str, bar_limit: usize) -> HistoryFetch {
        let pair = self.pair(symbol);
        let rows = match self.request_klines(&pair, bar_limit).await {
            Ok(rows) => rows,
            Err(e) => return HistoryFetch::Failed(e),
        };

        if rows.is_empty() {
            debug!(%pair, "No klines returned");
            return HistoryFetch::Empty;
        }

        let bars: Result<Vec<PriceBar>> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| parse_kline(row).with_context(|| format!("Bad kline #{i} for {pair}")))
            .collect();

        match bars {
            Ok(bars) => {
                debug!(%pair, count = bars.len(), "Parsed weekly klines");
                HistoryFetch::Bars(PriceSeries::from_bars(bars))
            }
            Err(e) => HistoryFetch::Failed(e),
        }
    }
}
