//! Destinations for the snapshot table.

pub mod csv_file;
pub mod google_sheets;

pub use csv_file::CsvFileSink;
pub use google_sheets::GoogleSheetsSink;

use crate::core::snapshot::SnapshotRecord;
use chrono::SecondsFormat;

fn format_optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Text cells of one record in column order.
pub(crate) fn record_cells(record: &SnapshotRecord) -> [String; 8] {
    [
        record.symbol.clone(),
        record.name.clone(),
        format_optional(record.market_cap_rank),
        format_optional(record.current_price),
        record.weekly_close.to_string(),
        record.ema_200.to_string(),
        record.dist_pct.to_string(),
        record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
    ]
}
