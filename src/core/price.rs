//! Price history abstractions and core types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

impl PriceBar {
    pub fn new(timestamp: DateTime<Utc>, close: f64) -> Self {
        PriceBar { timestamp, close }
    }
}

/// Close prices ordered by strictly increasing timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Sorts the bars by timestamp. When two bars share a timestamp the one
    /// that came later in the input is kept.
    pub fn from_bars(mut bars: Vec<PriceBar>) -> Self {
        // Stable sort keeps input order among equal timestamps.
        bars.sort_by_key(|bar| bar.timestamp);
        let mut deduped: Vec<PriceBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.timestamp == bar.timestamp => *last = bar,
                _ => deduped.push(bar),
            }
        }
        PriceSeries { bars: deduped }
    }

    pub fn empty() -> Self {
        PriceSeries::default()
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|bar| bar.close).collect()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }
}

/// Result of one history request.
#[derive(Debug)]
pub enum HistoryFetch {
    Bars(PriceSeries),
    /// The provider answered with no bars.
    Empty,
    /// Transport, status or decoding failure.
    Failed(anyhow::Error),
}

impl HistoryFetch {
    pub fn into_series(self) -> PriceSeries {
        match self {
            HistoryFetch::Bars(series) => series,
            HistoryFetch::Empty | HistoryFetch::Failed(_) => PriceSeries::empty(),
        }
    }
}

#[async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    /// Fetches up to `bar_limit` of the most recent weekly bars for `symbol`.
    async fn fetch_weekly(&self, symbol: &str, bar_limit: usize) -> HistoryFetch;
}
