//! Weekly resampling and the EMA distance metric.
//!
//! The recurrence is seeded with the first weekly close and the first
//! `period - 1` values are treated as warm-up, so for EMA200 the first usable
//! value sits at index 199 of the weekly series.

use crate::core::price::{PriceBar, PriceSeries};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ta::Next;
use ta::indicators::ExponentialMovingAverage;

pub const EMA200_PERIOD: usize = 200;

/// Metric values for the latest weekly bar with a usable EMA.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmaResult {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub ema: f64,
    pub dist_pct: f64,
}

#[derive(Debug, Clone)]
pub struct EmaEngine {
    period: usize,
    indicator: ExponentialMovingAverage,
}

impl EmaEngine {
    pub fn new(period: usize) -> Result<Self> {
        let indicator = ExponentialMovingAverage::new(period)
            .map_err(|e| anyhow!("Invalid EMA period {period}: {e:?}"))?;
        Ok(EmaEngine { period, indicator })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Smoothing factor `2 / (period + 1)`.
    pub fn alpha(&self) -> f64 {
        2.0 / (self.period as f64 + 1.0)
    }

    /// One entry per close; `None` during warm-up.
    pub fn ema_trace(&self, closes: &[f64]) -> Vec<Option<f64>> {
        let mut ema = self.indicator.clone();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let value = ema.next(close);
                (i + 1 >= self.period).then_some(value)
            })
            .collect()
    }

    /// Resamples `series` to weekly closes and returns the metric for the
    /// most recent week with a defined EMA and distance.
    pub fn compute_weekly(&self, series: &PriceSeries) -> Option<EmaResult> {
        let weekly = resample_weekly(series);
        if weekly.len() < self.period {
            return None;
        }

        let closes = weekly.closes();
        let trace = self.ema_trace(&closes);

        weekly
            .bars()
            .iter()
            .zip(trace)
            .rev()
            .find_map(|(bar, ema)| {
                let ema = ema?;
                let dist_pct = distance_pct(bar.close, ema)?;
                Some(EmaResult {
                    timestamp: bar.timestamp,
                    close: bar.close,
                    ema,
                    dist_pct,
                })
            })
    }
}

/// Weekly EMA200 of `series`, or `None` with fewer than 200 weekly bars.
pub fn compute_weekly_ema200(series: &PriceSeries) -> Option<EmaResult> {
    EmaEngine::new(EMA200_PERIOD).ok()?.compute_weekly(series)
}

/// `(close - ema) / ema * 100`, undefined for a zero EMA.
pub fn distance_pct(close: f64, ema: f64) -> Option<f64> {
    if ema == 0.0 {
        return None;
    }
    let dist = (close - ema) / ema * 100.0;
    dist.is_finite().then_some(dist)
}

/// The Sunday closing the Monday..Sunday week that contains `date`.
fn week_ending_sunday(date: NaiveDate) -> NaiveDate {
    let days_left = 6 - u64::from(date.weekday().num_days_from_monday());
    date.checked_add_days(Days::new(days_left)).unwrap_or(date)
}

/// Keeps the last close of every calendar week (weeks end on Sunday), stamped
/// at 00:00 UTC of that Sunday. Weeks without observations are dropped.
pub fn resample_weekly(series: &PriceSeries) -> PriceSeries {
    let mut weekly: Vec<PriceBar> = Vec::new();
    for bar in series.bars() {
        let label = week_ending_sunday(bar.timestamp.date_naive())
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(bar.timestamp);
        match weekly.last_mut() {
            Some(last) if last.timestamp == label => last.close = bar.close,
            _ => weekly.push(PriceBar::new(label, bar.close)),
        }
    }
    PriceSeries::from_bars(weekly)
}
