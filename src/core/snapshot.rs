//! Builds one snapshot run across the coin universe.
use crate::core::coin::{CoinRef, CoinUniverseProvider};
use crate::core::ema::{EmaEngine, EmaResult};
use crate::core::price::{HistoryFetch, PriceHistoryProvider};
use crate::core::throttle::Throttle;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Provider id to exchange ticker.
pub type SymbolMap = BTreeMap<String, String>;

/// Column names of the exported table, in order.
pub const COLUMNS: [&str; 8] = [
    "symbol",
    "name",
    "market_cap_rank",
    "current_price",
    "weekly_close",
    "ema_200",
    "dist_pct",
    "timestamp",
];

/// One row of the snapshot table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRecord {
    pub symbol: String,
    pub name: String,
    pub market_cap_rank: Option<u32>,
    pub current_price: Option<f64>,
    pub weekly_close: f64,
    pub ema_200: f64,
    pub dist_pct: f64,
    pub timestamp: DateTime<Utc>,
}

impl SnapshotRecord {
    fn new(coin: &CoinRef, ema: &EmaResult, timestamp: DateTime<Utc>) -> Self {
        SnapshotRecord {
            symbol: coin.symbol.clone(),
            name: coin.name.clone(),
            market_cap_rank: coin.market_cap_rank,
            current_price: coin.current_price,
            weekly_close: ema.close,
            ema_200: ema.ema,
            dist_pct: ema.dist_pct,
            timestamp,
        }
    }
}

/// Complete output of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    taken_at: DateTime<Utc>,
    records: Vec<SnapshotRecord>,
}

impl Snapshot {
    pub fn new(taken_at: DateTime<Utc>, records: Vec<SnapshotRecord>) -> Self {
        Snapshot { taken_at, records }
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn records(&self) -> &[SnapshotRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CoinOutcome {
    Ok,
    EmptyHistory,
    InsufficientEmaHistory,
    UnmappedSymbol,
}

impl Display for CoinOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                CoinOutcome::Ok => "OK",
                CoinOutcome::EmptyHistory => "EMPTY_HISTORY",
                CoinOutcome::InsufficientEmaHistory => "INSUFFICIENT_EMA_HISTORY",
                CoinOutcome::UnmappedSymbol => "UNMAPPED_SYMBOL",
            }
        )
    }
}

/// What happened to one coin of the universe.
#[derive(Debug, Clone, PartialEq)]
pub struct CoinReport {
    pub provider_id: String,
    pub ticker: Option<String>,
    pub outcome: CoinOutcome,
}

/// A snapshot together with the per-coin outcomes that produced it.
#[derive(Debug)]
pub struct SnapshotRun {
    pub snapshot: Snapshot,
    pub reports: Vec<CoinReport>,
}

impl SnapshotRun {
    pub fn universe_size(&self) -> usize {
        self.reports.len()
    }

    pub fn count(&self, outcome: CoinOutcome) -> usize {
        self.reports.iter().filter(|r| r.outcome == outcome).count()
    }
}

#[derive(Debug, Clone)]
pub struct BuilderSettings {
    /// Weekly bars requested per coin.
    pub bar_limit: usize,
    /// Pause between two history requests.
    pub coin_delay: Duration,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        BuilderSettings {
            bar_limit: 300,
            coin_delay: Duration::from_millis(500),
        }
    }
}

pub struct SnapshotBuilder<'a> {
    universe: &'a dyn CoinUniverseProvider,
    history: &'a dyn PriceHistoryProvider,
    engine: EmaEngine,
    symbols: SymbolMap,
    throttle: &'a dyn Throttle,
    settings: BuilderSettings,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(
        universe: &'a dyn CoinUniverseProvider,
        history: &'a dyn PriceHistoryProvider,
        engine: EmaEngine,
        symbols: SymbolMap,
        throttle: &'a dyn Throttle,
        settings: BuilderSettings,
    ) -> Self {
        SnapshotBuilder {
            universe,
            history,
            engine,
            symbols,
            throttle,
            settings,
        }
    }

    pub async fn build(&self, coin_limit: usize) -> SnapshotRun {
        self.build_with_progress(coin_limit, Utc::now(), &|_| {}).await
    }

    pub async fn build_at(&self, coin_limit: usize, taken_at: DateTime<Utc>) -> SnapshotRun {
        self.build_with_progress(coin_limit, taken_at, &|_| {}).await
    }

    /// Same as [`build_at`](Self::build_at), calling `on_coin` after every
    /// coin of the universe has been handled.
    #[instrument(name = "SnapshotBuild", skip(self, on_coin))]
    pub async fn build_with_progress(
        &self,
        coin_limit: usize,
        taken_at: DateTime<Utc>,
        on_coin: &(dyn Fn(&CoinReport) + Sync),
    ) -> SnapshotRun {
        info!("Fetching top {coin_limit} coins");
        let coins = self.universe.fetch_top(coin_limit).await;
        info!(count = coins.len(), "Coin universe fetched");

        let mut records = Vec::new();
        let mut reports = Vec::with_capacity(coins.len());
        let mut requested = false;

        for (idx, coin) in coins.iter().enumerate() {
            let ticker = self.symbols.get(&coin.provider_id).cloned();
            let outcome = match &ticker {
                None => {
                    debug!(id = %coin.provider_id, "No exchange ticker mapped, skipping");
                    CoinOutcome::UnmappedSymbol
                }
                Some(ticker) => {
                    if requested {
                        self.throttle.pause(self.settings.coin_delay).await;
                    }
                    requested = true;

                    match self.process_coin(idx + 1, coins.len(), ticker).await {
                        Ok(ema) => {
                            records.push(SnapshotRecord::new(coin, &ema, taken_at));
                            CoinOutcome::Ok
                        }
                        Err(outcome) => outcome,
                    }
                }
            };

            let report = CoinReport {
                provider_id: coin.provider_id.clone(),
                ticker,
                outcome,
            };
            on_coin(&report);
            reports.push(report);
        }

        info!(
            records = records.len(),
            universe = coins.len(),
            "Snapshot built"
        );
        SnapshotRun {
            snapshot: Snapshot::new(taken_at, records),
            reports,
        }
    }

    async fn process_coin(
        &self,
        position: usize,
        total: usize,
        ticker: &str,
    ) -> Result<EmaResult, CoinOutcome> {
        let series = match self
            .history
            .fetch_weekly(ticker, self.settings.bar_limit)
            .await
        {
            HistoryFetch::Bars(series) if !series.is_empty() => series,
            HistoryFetch::Bars(_) | HistoryFetch::Empty => {
                info!("[{position}/{total}] {ticker}: no weekly history");
                return Err(CoinOutcome::EmptyHistory);
            }
            HistoryFetch::Failed(e) => {
                warn!(error = %e, "[{position}/{total}] {ticker}: history request failed");
                return Err(CoinOutcome::EmptyHistory);
            }
        };

        match self.engine.compute_weekly(&series) {
            Some(ema) => {
                info!(
                    "[{position}/{total}] {ticker}: dist={:+.1}% ({} weekly bars)",
                    ema.dist_pct,
                    series.len()
                );
                Ok(ema)
            }
            None => {
                info!(
                    bars = series.len(),
                    "[{position}/{total}] {ticker}: not enough history for EMA{}",
                    self.engine.period()
                );
                Err(CoinOutcome::InsufficientEmaHistory)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::price::{PriceBar, PriceSeries};
    use crate::core::throttle::NoThrottle;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FixedUniverse(Vec<CoinRef>);

    #[async_trait]
    impl CoinUniverseProvider for FixedUniverse {
        async fn fetch_top(&self, limit: usize) -> Vec<CoinRef> {
            self.0.iter().take(limit).cloned().collect()
        }
    }

    enum Canned {
        Closes(Vec<f64>),
        Empty,
        Fail,
    }

    struct CannedHistory {
        responses: HashMap<String, Canned>,
        calls: Mutex<Vec<String>>,
    }

    impl CannedHistory {
        fn new(responses: Vec<(&str, Canned)>) -> Self {
            CannedHistory {
                responses: responses
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PriceHistoryProvider for CannedHistory {
        async fn fetch_weekly(&self, symbol: &str, _bar_limit: usize) -> HistoryFetch {
            self.calls.lock().unwrap().push(symbol.to_string());
            match self.responses.get(symbol) {
                Some(Canned::Closes(closes)) => {
                    let start = Utc.with_ymd_and_hms(2018, 1, 7, 0, 0, 0).unwrap();
                    HistoryFetch::Bars(PriceSeries::from_bars(
                        closes
                            .iter()
                            .enumerate()
                            .map(|(i, &c)| {
                                PriceBar::new(start + ChronoDuration::weeks(i as i64), c)
                            })
                            .collect(),
                    ))
                }
                Some(Canned::Empty) => HistoryFetch::Empty,
                Some(Canned::Fail) | None => {
                    HistoryFetch::Failed(anyhow::anyhow!("connection refused"))
                }
            }
        }
    }

    struct CountingThrottle(Mutex<Vec<Duration>>);

    #[async_trait]
    impl Throttle for CountingThrottle {
        async fn pause(&self, delay: Duration) {
            self.0.lock().unwrap().push(delay);
        }
    }

    fn coin(id: &str, symbol: &str, rank: u32) -> CoinRef {
        CoinRef {
            provider_id: id.to_string(),
            symbol: symbol.to_string(),
            name: id.to_uppercase(),
            market_cap_rank: Some(rank),
            current_price: Some(rank as f64 * 10.0),
            market_cap: None,
        }
    }

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 10.0 + i as f64).collect()
    }

    fn symbols(pairs: &[(&str, &str)]) -> SymbolMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn settings() -> BuilderSettings {
        BuilderSettings {
            bar_limit: 300,
            coin_delay: Duration::from_millis(500),
        }
    }

    fn taken_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 12, 6, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        let universe = FixedUniverse(vec![
            coin("bitcoin", "btc", 1),
            coin("ethereum", "eth", 2),
            coin("solana", "sol", 3),
        ]);
        let history = CannedHistory::new(vec![
            ("BTC", Canned::Closes(rising(260))),
            ("ETH", Canned::Fail),
            ("SOL", Canned::Closes(rising(210))),
        ]);
        let builder = SnapshotBuilder::new(
            &universe,
            &history,
            EmaEngine::new(200).unwrap(),
            symbols(&[("bitcoin", "BTC"), ("ethereum", "ETH"), ("solana", "SOL")]),
            &NoThrottle,
            settings(),
        );

        let run = builder.build_at(3, taken_at()).await;

        let syms: Vec<_> = run
            .snapshot
            .records()
            .iter()
            .map(|r| r.symbol.as_str())
            .collect();
        assert_eq!(syms, vec!["btc", "sol"]);
        assert_eq!(run.reports[1].outcome, CoinOutcome::EmptyHistory);
        assert_eq!(run.count(CoinOutcome::Ok), 2);
        assert!(
            run.snapshot
                .records()
                .iter()
                .all(|r| r.timestamp == taken_at())
        );
        assert_eq!(*history.calls.lock().unwrap(), vec!["BTC", "ETH", "SOL"]);
    }

    #[tokio::test]
    async fn test_outcomes_for_each_skip_reason() {
        let universe = FixedUniverse(vec![
            coin("bitcoin", "btc", 1),
            coin("tether", "usdt", 2),
            coin("hyperliquid", "hype", 3),
            coin("newcoin", "new", 4),
        ]);
        let history = CannedHistory::new(vec![
            ("BTC", Canned::Closes(rising(300))),
            ("USDT", Canned::Empty),
            ("NEW", Canned::Closes(rising(120))),
        ]);
        let builder = SnapshotBuilder::new(
            &universe,
            &history,
            EmaEngine::new(200).unwrap(),
            symbols(&[("bitcoin", "BTC"), ("tether", "USDT"), ("newcoin", "NEW")]),
            &NoThrottle,
            settings(),
        );

        let seen = Mutex::new(Vec::new());
        let run = builder
            .build_with_progress(10, taken_at(), &|report| {
                seen.lock().unwrap().push(report.outcome)
            })
            .await;

        let outcomes: Vec<_> = run.reports.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                CoinOutcome::Ok,
                CoinOutcome::EmptyHistory,
                CoinOutcome::UnmappedSymbol,
                CoinOutcome::InsufficientEmaHistory,
            ]
        );
        assert_eq!(*seen.lock().unwrap(), outcomes);
        assert_eq!(run.snapshot.len(), 1);
        assert_eq!(run.reports[2].ticker, None);
        // Unmapped coins never reach the exchange.
        assert!(!history.calls.lock().unwrap().contains(&"HYPE".to_string()));

        let record = &run.snapshot.records()[0];
        assert_eq!(record.name, "BITCOIN");
        assert_eq!(record.market_cap_rank, Some(1));
        assert_eq!(record.current_price, Some(10.0));
        assert_eq!(record.weekly_close, 309.0);
        assert!(record.ema_200 < record.weekly_close);
        assert!(record.dist_pct > 0.0);
    }

    #[tokio::test]
    async fn test_throttles_between_history_requests_only() {
        let universe = FixedUniverse(vec![
            coin("bitcoin", "btc", 1),
            coin("unmapped", "unm", 2),
            coin("ethereum", "eth", 3),
            coin("solana", "sol", 4),
        ]);
        let history = CannedHistory::new(vec![
            ("BTC", Canned::Empty),
            ("ETH", Canned::Empty),
            ("SOL", Canned::Empty),
        ]);
        let throttle = CountingThrottle(Mutex::new(Vec::new()));
        let builder = SnapshotBuilder::new(
            &universe,
            &history,
            EmaEngine::new(200).unwrap(),
            symbols(&[("bitcoin", "BTC"), ("ethereum", "ETH"), ("solana", "SOL")]),
            &throttle,
            settings(),
        );

        let run = builder.build_at(4, taken_at()).await;

        assert!(run.snapshot.is_empty());
        assert_eq!(
            *throttle.0.lock().unwrap(),
            vec![Duration::from_millis(500); 2]
        );
    }

    #[tokio::test]
    async fn test_empty_universe_yields_empty_snapshot() {
        let universe = FixedUniverse(Vec::new());
        let history = CannedHistory::new(Vec::new());
        let builder = SnapshotBuilder::new(
            &universe,
            &history,
            EmaEngine::new(200).unwrap(),
            SymbolMap::new(),
            &NoThrottle,
            settings(),
        );

        let run = builder.build(100).await;
        assert!(run.snapshot.is_empty());
        assert_eq!(run.universe_size(), 0);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(CoinOutcome::Ok.to_string(), "OK");
        assert_eq!(
            CoinOutcome::InsufficientEmaHistory.to_string(),
            "INSUFFICIENT_EMA_HISTORY"
        );
    }
}
