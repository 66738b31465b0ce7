//! Indicator computation from daily closes

use crate::api::{DailyBar, PriceHistorySource};
use crate::cache::{CacheKey, TtlCache};
use crate::error::{Result, TrackerError};
use crate::settings::TechnicalSettings;
use chrono::NaiveDate;
use portfolio_core::IndicatorSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use ta::Next;
use ta::indicators::{ExponentialMovingAverage, RelativeStrengthIndex, SimpleMovingAverage};

/// Direction of RSI over the last few sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsiTrend {
    Rising,
    Falling,
    Stable,
    Unknown,
}

impl fmt::Display for RsiTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Rising => "rising",
            Self::Falling => "falling",
            Self::Stable => "stable",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Indicator periods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub sma_short: usize,
    pub sma_long: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            sma_short: 20,
            sma_long: 50,
        }
    }
}

impl From<&TechnicalSettings> for IndicatorParams {
    fn from(settings: &TechnicalSettings) -> Self {
        Self {
            rsi_period: settings.rsi_period,
            sma_short: settings.sma_short,
            sma_long: settings.sma_long,
            ..Self::default()
        }
    }
}

/// Indicators for one symbol as of its latest bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalReport {
    pub symbol: String,
    pub snapshot: IndicatorSnapshot,
    pub rsi_trend: RsiTrend,
    /// Number of daily bars the indicators were computed from
    pub data_points: usize,
    pub last_close: Option<f64>,
    pub as_of: Option<NaiveDate>,
}

impl TechnicalReport {
    /// Report with no indicators, used when history is unavailable
    pub fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            snapshot: IndicatorSnapshot::new(),
            rsi_trend: RsiTrend::Unknown,
            data_points: 0,
            last_close: None,
            as_of: None,
        }
    }
}

fn indicator_err(e: impl fmt::Display) -> TrackerError {
    TrackerError::Indicator(e.to_string())
}

/// RSI series; the first `period` values are warm-up and dropped
fn rsi_series(closes: &[f64], period: usize) -> Result<Vec<f64>> {
    let mut rsi = RelativeStrengthIndex::new(period).map_err(indicator_err)?;
    let values: Vec<f64> = closes.iter().map(|c| rsi.next(*c)).collect();
    Ok(values.into_iter().skip(period).collect())
}

fn last_sma(closes: &[f64], period: usize) -> Result<Option<f64>> {
    if closes.len() < period {
        return Ok(None);
    }
    let mut sma = SimpleMovingAverage::new(period).map_err(indicator_err)?;
    Ok(closes.iter().map(|c| sma.next(*c)).last())
}

/// MACD line and signal line at the last bar
fn last_macd(closes: &[f64], params: &IndicatorParams) -> Result<Option<(f64, f64)>> {
    if closes.len() < params.macd_slow + params.macd_signal - 1 {
        return Ok(None);
    }

    let mut fast = ExponentialMovingAverage::new(params.macd_fast).map_err(indicator_err)?;
    let mut slow = ExponentialMovingAverage::new(params.macd_slow).map_err(indicator_err)?;
    let mut signal = ExponentialMovingAverage::new(params.macd_signal).map_err(indicator_err)?;

    let mut last = None;
    for (i, close) in closes.iter().enumerate() {
        let line = fast.next(*close) - slow.next(*close);
        // Signal starts once the slow EMA has a full window
        if i + 1 >= params.macd_slow {
            last = Some((line, signal.next(line)));
        }
    }
    Ok(last)
}

/// Recent two RSI readings against the three before them
pub fn rsi_trend(rsi: &[f64]) -> RsiTrend {
    let window = &rsi[rsi.len().saturating_sub(5)..];
    if window.len() < 2 {
        return RsiTrend::Unknown;
    }

    let (older, recent) = window.split_at(window.len() - 2);
    let recent_avg = recent.iter().sum::<f64>() / 2.0;
    let older_avg = if older.is_empty() {
        recent_avg
    } else {
        older.iter().sum::<f64>() / older.len() as f64
    };

    if recent_avg > older_avg + 5.0 {
        RsiTrend::Rising
    } else if recent_avg < older_avg - 5.0 {
        RsiTrend::Falling
    } else {
        RsiTrend::Stable
    }
}

/// Compute every indicator the bar count allows
pub fn compute_report(symbol: &str, bars: &[DailyBar], params: &IndicatorParams) -> Result<TechnicalReport> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).filter(|c| c.is_finite()).collect();

    let mut snapshot = IndicatorSnapshot::new();

    let rsi = rsi_series(&closes, params.rsi_period)?;
    if let Some(latest) = rsi.last() {
        snapshot = snapshot.with_rsi(*latest);
    }

    if let Some((line, signal)) = last_macd(&closes, params)? {
        snapshot = snapshot.with_macd(line, signal);
    }

    if let (Some(short), Some(long)) = (
        last_sma(&closes, params.sma_short)?,
        last_sma(&closes, params.sma_long)?,
    ) {
        snapshot = snapshot.with_sma(short, long);
    }

    Ok(TechnicalReport {
        symbol: symbol.to_string(),
        snapshot,
        rsi_trend: rsi_trend(&rsi),
        data_points: closes.len(),
        last_close: closes.last().copied(),
        as_of: bars.last().map(|b| b.date),
    })
}

/// Fetches price history and derives indicator snapshots
pub struct TechnicalAnalyzer {
    history: Arc<dyn PriceHistorySource>,
    cache: TtlCache,
    params: IndicatorParams,
}

impl TechnicalAnalyzer {
    pub fn new(history: Arc<dyn PriceHistorySource>, cache: TtlCache, params: IndicatorParams) -> Self {
        Self { history, cache, params }
    }

    pub fn params(&self) -> &IndicatorParams {
        &self.params
    }

    pub async fn analyze(&self, symbol: &str) -> Result<TechnicalReport> {
        let key = CacheKey::new(symbol, "daily_closes", ());
        let bars: Vec<DailyBar> = self
            .cache
            .get_or_fetch_as(key, || self.history.daily_closes(symbol))
            .await?;

        let report = compute_report(symbol, &bars, &self.params)?;
        tracing::debug!(
            symbol,
            data_points = report.data_points,
            rsi = ?report.snapshot.rsi,
            trend = %report.rsi_trend,
            "technical analysis complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockPriceHistorySource;
    use crate::api::testing::bars;
    use std::time::Duration;

    #[test]
    fn test_short_history_leaves_indicators_empty() {
        let report = compute_report("AAPL", &bars(100.0, 1.0, 10), &IndicatorParams::default()).unwrap();
        assert!(report.snapshot.is_empty());
        assert_eq!(report.rsi_trend, RsiTrend::Unknown);
        assert_eq!(report.data_points, 10);
        assert_eq!(report.last_close, Some(109.0));
    }

    #[test]
    fn test_partial_history_computes_what_it_can() {
        // Enough for RSI(14) and MACD(12,26,9) but not SMA(50)
        let report = compute_report("AAPL", &bars(100.0, 1.0, 40), &IndicatorParams::default()).unwrap();
        assert!(report.snapshot.rsi.is_some());
        assert!(report.snapshot.macd.is_some());
        assert!(report.snapshot.sma.is_none());
    }

    #[test]
    fn test_uptrend_indicators() {
        let report = compute_report("AAPL", &bars(100.0, 1.0, 100), &IndicatorParams::default()).unwrap();
        let snap = report.snapshot;

        assert!(snap.rsi.unwrap() > 70.0);
        assert!(snap.macd.unwrap().line > 0.0);
        let sma = snap.sma.unwrap();
        assert!(sma.short > sma.long);
        assert_eq!(report.as_of, bars(100.0, 1.0, 100).last().map(|b| b.date));
    }

    #[test]
    fn test_downtrend_indicators() {
        let report = compute_report("AAPL", &bars(300.0, -1.0, 100), &IndicatorParams::default()).unwrap();
        let snap = report.snapshot;

        assert!(snap.rsi.unwrap() < 30.0);
        assert!(snap.macd.unwrap().line < 0.0);
        let sma = snap.sma.unwrap();
        assert!(sma.short < sma.long);
    }

    #[test]
    fn test_rsi_trend() {
        assert_eq!(rsi_trend(&[40.0, 41.0, 42.0, 55.0, 60.0]), RsiTrend::Rising);
        assert_eq!(rsi_trend(&[60.0, 61.0, 59.0, 45.0, 44.0]), RsiTrend::Falling);
        assert_eq!(rsi_trend(&[50.0, 51.0, 52.0, 53.0, 51.0]), RsiTrend::Stable);
        assert_eq!(rsi_trend(&[50.0, 52.0]), RsiTrend::Stable);
        assert_eq!(rsi_trend(&[50.0]), RsiTrend::Unknown);
        // Only the last five readings count
        assert_eq!(rsi_trend(&[0.0, 0.0, 0.0, 50.0, 50.0, 50.0, 50.0, 50.0]), RsiTrend::Stable);
    }

    #[test]
    fn test_params_from_settings() {
        let settings = TechnicalSettings {
            rsi_period: 10,
            sma_short: 5,
            sma_long: 15,
            ..Default::default()
        };
        let params = IndicatorParams::from(&settings);
        assert_eq!(params.rsi_period, 10);
        assert_eq!(params.sma_long, 15);
        assert_eq!(params.macd_slow, 26);
    }

    #[tokio::test]
    async fn test_analyze_caches_history() {
        let mut history = MockPriceHistorySource::new();
        history
            .expect_daily_closes()
            .times(1)
            .returning(|_| Ok(bars(100.0, 0.5, 60)));

        let analyzer = TechnicalAnalyzer::new(
            Arc::new(history),
            TtlCache::new(Duration::from_secs(60)),
            IndicatorParams::default(),
        );

        let first = analyzer.analyze("AAPL").await.unwrap();
        let second = analyzer.analyze("AAPL").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.data_points, 60);
    }

    #[tokio::test]
    async fn test_analyze_propagates_provider_error() {
        let mut history = MockPriceHistorySource::new();
        history
            .expect_daily_closes()
            .returning(|s| Err(TrackerError::unavailable(s, "no daily data found")));

        let analyzer = TechnicalAnalyzer::new(
            Arc::new(history),
            TtlCache::new(Duration::from_secs(60)),
            IndicatorParams::default(),
        );
        assert!(analyzer.analyze("AAPL").await.is_err());
    }
}
