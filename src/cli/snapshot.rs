use super::ui;
use crate::core::config::AppConfig;
use crate::core::ema::EmaEngine;
use crate::core::export::{ExportReport, SnapshotSink, export_all};
use crate::core::snapshot::{BuilderSettings, CoinOutcome, CoinReport, SnapshotBuilder, SnapshotRun};
use crate::core::throttle::{Throttle, TokioThrottle};
use crate::providers::{BinanceProvider, CoinGeckoProvider, util::build_client};
use crate::sinks::{CsvFileSink, GoogleSheetsSink};
use anyhow::{Result, bail};
use reqwest::Client;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Overrides taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct SnapshotOptions {
    pub limit: Option<usize>,
    pub output: Option<String>,
}

/// Sinks configured for this run. A sheets sink without a token is reported
/// as a failed export instead of aborting the run.
fn configured_sinks(
    config: &AppConfig,
    output: Option<&str>,
    client: &Client,
) -> (Vec<Box<dyn SnapshotSink>>, Vec<ExportReport>) {
    let mut sinks: Vec<Box<dyn SnapshotSink>> = Vec::new();
    let mut unavailable = Vec::new();

    let csv_path = output.or(config.sinks.csv.as_ref().map(|c| c.path.as_str()));
    if let Some(path) = csv_path {
        sinks.push(Box::new(CsvFileSink::new(path)));
    }

    if let Some(sheets) = &config.sinks.sheets {
        match GoogleSheetsSink::from_config(sheets, client.clone()) {
            Ok(sink) => sinks.push(Box::new(sink)),
            Err(e) => {
                error!(error = %format!("{e:#}"), "Google Sheets sink unavailable");
                unavailable.push(ExportReport {
                    sink: "google-sheets".to_string(),
                    ok: false,
                    error: Some(format!("{e:#}")),
                });
            }
        }
    }

    (sinks, unavailable)
}

fn display_summary(reports: &[CoinReport], records: usize, exports: &[ExportReport]) -> String {
    let mut outcomes = ui::new_styled_table();
    outcomes.set_header(vec![ui::header_cell("Outcome"), ui::header_cell("Coins")]);
    for outcome in [
        CoinOutcome::Ok,
        CoinOutcome::EmptyHistory,
        CoinOutcome::InsufficientEmaHistory,
        CoinOutcome::UnmappedSymbol,
    ] {
        outcomes.add_row(vec![
            ui::outcome_cell(outcome),
            ui::count_cell(reports.iter().filter(|r| r.outcome == outcome).count()),
        ]);
    }

    let mut output = format!(
        "{}\n\n{}\n\nRecords: {}",
        ui::style_text("EMA200 snapshot", ui::StyleType::Title),
        outcomes,
        ui::style_text(
            &format!("{}/{}", records, reports.len()),
            if records > 0 {
                ui::StyleType::TotalValue
            } else {
                ui::StyleType::Error
            }
        )
    );

    if exports.is_empty() {
        output.push_str(&format!(
            "\n{}",
            ui::style_text("No sinks configured, nothing exported", ui::StyleType::Subtle)
        ));
        return output;
    }

    let mut sinks = ui::new_styled_table();
    sinks.set_header(vec![
        ui::header_cell("Sink"),
        ui::header_cell("Status"),
        ui::header_cell("Error"),
    ]);
    for report in exports {
        sinks.add_row(vec![
            comfy_table::Cell::new(&report.sink),
            ui::status_cell(report.ok),
            comfy_table::Cell::new(report.error.as_deref().unwrap_or("")),
        ]);
    }
    output.push_str(&format!(
        "\n\n{}\n\n{}",
        ui::style_text("Exports", ui::StyleType::TotalLabel),
        sinks
    ));
    output
}

pub async fn run(config: &AppConfig, options: SnapshotOptions) -> Result<()> {
    let coin_limit = options.limit.unwrap_or(config.coin_limit);
    if coin_limit == 0 {
        bail!("Coin limit must be positive");
    }

    let client = build_client(config.request_timeout())?;
    let throttle: Arc<dyn Throttle> = Arc::new(TokioThrottle);

    let universe = CoinGeckoProvider::new(
        &config.providers.coingecko.base_url,
        &config.providers.coingecko.vs_currency,
        client.clone(),
        Arc::clone(&throttle),
    )
    .with_paging(config.throttle.page_size, config.throttle.page_delay());
    let history = BinanceProvider::new(
        &config.providers.binance.base_url,
        &config.quote_asset,
        client.clone(),
    );
    let builder = SnapshotBuilder::new(
        &universe,
        &history,
        EmaEngine::new(config.ema_period)?,
        config.symbols.clone(),
        throttle.as_ref(),
        BuilderSettings {
            bar_limit: config.history_bars,
            coin_delay: config.throttle.coin_delay(),
        },
    );

    let (sinks, mut exports) = configured_sinks(config, options.output.as_deref(), &client);

    let pb = ui::new_progress_bar(coin_limit as u64, true);
    pb.set_message("Building snapshot...");
    let run = builder
        .build_with_progress(coin_limit, chrono::Utc::now(), &|_| pb.inc(1))
        .await;
    pb.finish_and_clear();

    if run.snapshot.is_empty() {
        warn!("Snapshot is empty, exporting header only");
    }

    let SnapshotRun { snapshot, reports } = run;
    let records = snapshot.len();
    exports.extend(export_all(snapshot, &sinks).await);
    println!("{}", display_summary(&reports, records, &exports));

    if !exports.is_empty() && exports.iter().all(|r| !r.ok) {
        bail!("Every configured sink failed");
    }
    info!(records, "Run complete");
    Ok(())
}
