//! Core business logic abstractions

pub mod coin;
pub mod config;
pub mod ema;
pub mod export;
pub mod log;
pub mod price;
pub mod snapshot;
pub mod throttle;

// Re-export main types for cleaner imports
pub use coin::{CoinRef, CoinUniverseProvider};
pub use ema::{EmaEngine, EmaResult};
pub use export::{ExportReport, SnapshotSink};
pub use price::{HistoryFetch, PriceBar, PriceHistoryProvider, PriceSeries};
pub use snapshot::{CoinOutcome, Snapshot, SnapshotBuilder, SnapshotRecord, SnapshotRun, SymbolMap};
pub use throttle::{NoThrottle, Throttle, TokioThrottle};
