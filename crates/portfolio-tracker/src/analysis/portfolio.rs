//! Live valuation, price alerts and benchmark comparison

use crate::api::{Quote, QuoteSource};
use crate::cache::{CacheKey, TtlCache};
use crate::error::Result;
use crate::store::Portfolio;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use portfolio_core::PositionContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// |daily change| in percent at which an alert becomes high severity
const HIGH_SEVERITY_PCT: f64 = 10.0;

/// Where a position's price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Live,
    /// Last stored price, or average cost when none was stored
    Stored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionValuation {
    pub symbol: String,
    pub shares: f64,
    pub avg_price: f64,
    pub current_price: f64,
    pub price_source: PriceSource,
    pub total_invested: f64,
    pub current_value: f64,
    pub gain_loss: f64,
    pub gain_loss_pct: f64,
    pub daily_change: Option<f64>,
    pub daily_change_pct: Option<f64>,
    pub volume: Option<u64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub previous_close: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioValuation {
    pub positions: BTreeMap<String, PositionValuation>,
    pub total_invested: f64,
    /// Market value of holdings
    pub current_value: f64,
    pub total_gain_loss: f64,
    pub total_gain_loss_pct: f64,
    /// Value-weighted move of the holdings today, when any quote had one
    pub daily_change_pct: Option<f64>,
    pub cash: f64,
    /// Holdings plus cash
    pub total_portfolio_value: f64,
    pub as_of: DateTime<Utc>,
}

impl PortfolioValuation {
    /// Portfolio facts for the scorer
    pub fn position_context(&self, symbol: &str) -> Option<PositionContext> {
        let position = self.positions.get(symbol)?;
        let mut context = PositionContext::new(position.shares, position.avg_price, position.current_price)
            .with_portfolio(self.total_portfolio_value, self.cash)
            .with_unrealized_pnl_pct(position.gain_loss_pct);
        if let Some(pct) = position.daily_change_pct {
            context = context.with_daily_change(pct);
        }
        Some(context)
    }

    /// Share of the total portfolio value held in `symbol`
    pub fn weight(&self, symbol: &str) -> f64 {
        match self.positions.get(symbol) {
            Some(p) if self.total_portfolio_value > 0.0 => p.current_value / self.total_portfolio_value,
            _ => 0.0,
        }
    }

    /// Cash as a percentage of the total portfolio value
    pub fn cash_pct(&self) -> f64 {
        if self.total_portfolio_value > 0.0 {
            self.cash / self.total_portfolio_value * 100.0
        } else {
            0.0
        }
    }

    /// Position with the largest positive return
    pub fn biggest_gainer(&self) -> Option<Mover> {
        self.positions
            .values()
            .filter(|p| p.gain_loss_pct > 0.0)
            .max_by(|a, b| a.gain_loss_pct.total_cmp(&b.gain_loss_pct))
            .map(Mover::from)
    }

    /// Position with the largest negative return
    pub fn biggest_loser(&self) -> Option<Mover> {
        self.positions
            .values()
            .filter(|p| p.gain_loss_pct < 0.0)
            .min_by(|a, b| a.gain_loss_pct.total_cmp(&b.gain_loss_pct))
            .map(Mover::from)
    }

    /// Write live prices back into the stored portfolio
    pub fn apply_prices(&self, portfolio: &mut Portfolio) -> Result<usize> {
        let mut updated = 0;
        for (symbol, position) in &self.positions {
            if position.price_source != PriceSource::Live {
                continue;
            }
            if let Some(holding) = portfolio.stocks.get_mut(symbol) {
                holding.mark_price(position.current_price)?;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mover {
    pub symbol: String,
    pub gain_loss_pct: f64,
}

impl From<&PositionValuation> for Mover {
    fn from(position: &PositionValuation) -> Self {
        Self {
            symbol: position.symbol.clone(),
            gain_loss_pct: position.gain_loss_pct,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertDirection {
    Gain,
    Loss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Medium,
    High,
}

/// Significant single-day move in a holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAlert {
    pub symbol: String,
    pub current_price: f64,
    pub change_pct: f64,
    pub change_amount: f64,
    pub threshold: f64,
    pub direction: AlertDirection,
    pub severity: AlertSeverity,
    pub position_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub benchmark_symbol: String,
    pub benchmark_price: f64,
    pub benchmark_change_pct: f64,
    pub portfolio_change_pct: f64,
    /// Total return since purchase, for context
    pub portfolio_return_pct: f64,
    pub outperforming: bool,
    pub performance_difference: f64,
}

/// Everything the daily summary needs about the portfolio itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReport {
    pub valuation: PortfolioValuation,
    pub alerts: Vec<PriceAlert>,
    pub benchmark: Option<BenchmarkComparison>,
    pub biggest_gainer: Option<Mover>,
    pub biggest_loser: Option<Mover>,
}

/// Values holdings at live prices
pub struct PortfolioAnalyzer {
    quotes: Arc<dyn QuoteSource>,
    cache: TtlCache,
    alert_threshold: f64,
}

impl PortfolioAnalyzer {
    pub fn new(quotes: Arc<dyn QuoteSource>, cache: TtlCache) -> Self {
        Self {
            quotes,
            cache,
            alert_threshold: 5.0,
        }
    }

    /// |daily change| in percent that raises an alert
    pub fn with_alert_threshold(mut self, percent: f64) -> Self {
        self.alert_threshold = percent;
        self
    }

    pub fn alert_threshold(&self) -> f64 {
        self.alert_threshold
    }

    /// Cached quote lookup
    pub async fn quote(&self, symbol: &str) -> Result<Quote> {
        let key = CacheKey::new(symbol, "quote", ());
        self.cache
            .get_or_fetch_as(key, || self.quotes.quote(symbol))
            .await
    }

    /// Value every holding, falling back to stored prices when no quote is available
    pub async fn value(&self, portfolio: &Portfolio) -> PortfolioValuation {
        tracing::info!(holdings = portfolio.stocks.len(), "valuing portfolio");

        let positions: BTreeMap<String, PositionValuation> = stream::iter(&portfolio.stocks)
            .map(|(symbol, holding)| async move {
                let quote = match self.quote(symbol).await {
                    Ok(quote) => Some(quote),
                    Err(e) => {
                        tracing::warn!(symbol = %symbol, error = %e, "no live price, using stored price");
                        None
                    }
                };

                let (current_price, price_source) = match &quote {
                    Some(q) => (q.price, PriceSource::Live),
                    None => (holding.price(), PriceSource::Stored),
                };
                let current_value = holding.shares * current_price;
                let gain_loss = current_value - holding.total_invested;

                let position = PositionValuation {
                    symbol: symbol.clone(),
                    shares: holding.shares,
                    avg_price: holding.avg_price,
                    current_price,
                    price_source,
                    total_invested: holding.total_invested,
                    current_value,
                    gain_loss,
                    gain_loss_pct: if holding.total_invested > 0.0 {
                        gain_loss / holding.total_invested * 100.0
                    } else {
                        0.0
                    },
                    daily_change: quote.as_ref().map(|q| q.change),
                    daily_change_pct: quote.as_ref().map(|q| q.change_percent),
                    volume: quote.as_ref().and_then(|q| q.volume),
                    high: quote.as_ref().and_then(|q| q.high),
                    low: quote.as_ref().and_then(|q| q.low),
                    previous_close: quote
                        .as_ref()
                        .map(|q| q.previous_close.unwrap_or(q.price - q.change)),
                };
                (symbol.clone(), position)
            })
            .buffered(4)
            .collect()
            .await;

        let total_invested: f64 = positions.values().map(|p| p.total_invested).sum();
        let current_value: f64 = positions.values().map(|p| p.current_value).sum();
        let total_gain_loss = current_value - total_invested;
        let cash = portfolio.cash.available;

        let valuation = PortfolioValuation {
            daily_change_pct: daily_change_pct(&positions),
            total_gain_loss_pct: if total_invested > 0.0 {
                total_gain_loss / total_invested * 100.0
            } else {
                0.0
            },
            positions,
            total_invested,
            current_value,
            total_gain_loss,
            cash,
            total_portfolio_value: current_value + cash,
            as_of: Utc::now(),
        };

        tracing::info!(
            total_value = valuation.total_portfolio_value,
            gain_loss_pct = valuation.total_gain_loss_pct,
            "portfolio valued"
        );
        valuation
    }

    /// Holdings whose daily move reaches the alert threshold
    pub fn detect_alerts(&self, valuation: &PortfolioValuation) -> Vec<PriceAlert> {
        valuation
            .positions
            .values()
            .filter_map(|p| {
                let change_pct = p.daily_change_pct?;
                if change_pct.abs() < self.alert_threshold {
                    return None;
                }
                tracing::info!(symbol = %p.symbol, change_pct, "price alert");
                Some(PriceAlert {
                    symbol: p.symbol.clone(),
                    current_price: p.current_price,
                    change_pct,
                    change_amount: p.daily_change.unwrap_or(0.0),
                    threshold: self.alert_threshold,
                    direction: if change_pct > 0.0 {
                        AlertDirection::Gain
                    } else {
                        AlertDirection::Loss
                    },
                    severity: if change_pct.abs() >= HIGH_SEVERITY_PCT {
                        AlertSeverity::High
                    } else {
                        AlertSeverity::Medium
                    },
                    position_value: p.current_value,
                })
            })
            .collect()
    }

    /// Today's portfolio move against the benchmark's
    pub async fn compare_to_benchmark(
        &self,
        valuation: &PortfolioValuation,
        benchmark: &str,
    ) -> Result<BenchmarkComparison> {
        let quote = self.quote(benchmark).await?;
        let portfolio_change_pct = valuation.daily_change_pct.unwrap_or(0.0);
        let difference = portfolio_change_pct - quote.change_percent;

        Ok(BenchmarkComparison {
            benchmark_symbol: benchmark.to_string(),
            benchmark_price: quote.price,
            benchmark_change_pct: quote.change_percent,
            portfolio_change_pct,
            portfolio_return_pct: valuation.total_gain_loss_pct,
            outperforming: difference > 0.0,
            performance_difference: difference,
        })
    }

    /// Valuation, alerts, movers and benchmark in one pass
    pub async fn report(&self, portfolio: &Portfolio) -> PortfolioReport {
        let valuation = self.value(portfolio).await;
        let alerts = self.detect_alerts(&valuation);

        let benchmark = if portfolio.is_empty() {
            None
        } else {
            match self
                .compare_to_benchmark(&valuation, &portfolio.settings.benchmark)
                .await
            {
                Ok(comparison) => Some(comparison),
                Err(e) => {
                    tracing::warn!(benchmark = %portfolio.settings.benchmark, error = %e, "benchmark comparison failed");
                    None
                }
            }
        };

        PortfolioReport {
            biggest_gainer: valuation.biggest_gainer(),
            biggest_loser: valuation.biggest_loser(),
            valuation,
            alerts,
            benchmark,
        }
    }
}

/// Value-weighted daily change over positions with a live quote
fn daily_change_pct(positions: &BTreeMap<String, PositionValuation>) -> Option<f64> {
    let (change, previous) = positions
        .values()
        .filter_map(|p| {
            let change = p.daily_change?;
            Some((change * p.shares, (p.current_price - change) * p.shares))
        })
        .fold((0.0, 0.0), |(c, v), (dc, dv)| (c + dc, v + dv));

    (previous > 0.0).then(|| change / previous * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockQuoteSource;
    use crate::api::testing::quote;
    use crate::error::TrackerError;
    use crate::store::Holding;
    use std::time::Duration;

    fn portfolio() -> Portfolio {
        let mut p = Portfolio::default();
        p.add_holding("AAPL", Holding::new(10.0, 100.0).unwrap()).unwrap();
        p.add_holding("TSLA", Holding::new(5.0, 200.0).unwrap()).unwrap();
        p.add_holding(
            "ZZZZ",
            Holding::new(2.0, 50.0).unwrap().with_current_price(40.0).unwrap(),
        )
        .unwrap();
        p.set_cash(500.0).unwrap();
        p
    }

    fn quotes() -> MockQuoteSource {
        let mut source = MockQuoteSource::new();
        source.expect_name().return_const("test");
        source.expect_quote().returning(|symbol| match symbol {
            "AAPL" => Ok(quote("AAPL", 120.0, 6.0)),
            "TSLA" => Ok(quote("TSLA", 180.0, -12.0)),
            "VOO" => Ok(quote("VOO", 400.0, 0.5)),
            other => Err(TrackerError::InvalidSymbol(other.to_string())),
        });
        source
    }

    fn analyzer(source: MockQuoteSource) -> PortfolioAnalyzer {
        PortfolioAnalyzer::new(Arc::new(source), TtlCache::new(Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn test_valuation_with_fallback_price() {
        let valuation = analyzer(quotes()).value(&portfolio()).await;

        let aapl = &valuation.positions["AAPL"];
        assert_eq!(aapl.current_price, 120.0);
        assert_eq!(aapl.price_source, PriceSource::Live);
        assert_eq!(aapl.gain_loss, 200.0);
        assert_eq!(aapl.gain_loss_pct, 20.0);

        let zzzz = &valuation.positions["ZZZZ"];
        assert_eq!(zzzz.current_price, 40.0);
        assert_eq!(zzzz.price_source, PriceSource::Stored);
        assert!(zzzz.daily_change_pct.is_none());

        assert_eq!(valuation.total_invested, 2_100.0);
        assert_eq!(valuation.current_value, 1_200.0 + 900.0 + 80.0);
        assert_eq!(valuation.total_portfolio_value, 2_180.0 + 500.0);
    }

    #[tokio::test]
    async fn test_alerts_and_severity() {
        let analyzer = analyzer(quotes());
        let valuation = analyzer.value(&portfolio()).await;
        let alerts = analyzer.detect_alerts(&valuation);

        assert_eq!(alerts.len(), 2);
        let aapl = alerts.iter().find(|a| a.symbol == "AAPL").unwrap();
        assert_eq!(aapl.direction, AlertDirection::Gain);
        assert_eq!(aapl.severity, AlertSeverity::Medium);
        let tsla = alerts.iter().find(|a| a.symbol == "TSLA").unwrap();
        assert_eq!(tsla.direction, AlertDirection::Loss);
        assert_eq!(tsla.severity, AlertSeverity::High);
    }

    #[tokio::test]
    async fn test_alert_threshold_is_configurable() {
        let analyzer = analyzer(quotes()).with_alert_threshold(7.0);
        let valuation = analyzer.value(&portfolio()).await;
        let alerts = analyzer.detect_alerts(&valuation);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].symbol, "TSLA");
    }

    #[tokio::test]
    async fn test_movers() {
        let valuation = analyzer(quotes()).value(&portfolio()).await;
        assert_eq!(valuation.biggest_gainer().unwrap().symbol, "AAPL");
        assert_eq!(valuation.biggest_loser().unwrap().symbol, "ZZZZ");
    }

    #[tokio::test]
    async fn test_position_context() {
        let valuation = analyzer(quotes()).value(&portfolio()).await;
        let ctx = valuation.position_context("AAPL").unwrap();

        assert_eq!(ctx.unrealized_pnl_pct, 20.0);
        assert_eq!(ctx.position_value, 1_200.0);
        assert_eq!(ctx.portfolio_value, Some(2_680.0));
        assert_eq!(ctx.available_cash, Some(500.0));
        assert_eq!(ctx.daily_change_pct, Some(6.0));
        assert!(valuation.position_context("MSFT").is_none());
    }

    #[tokio::test]
    async fn test_position_context_uses_invested_basis() {
        let mut portfolio = Portfolio::default();
        let mut holding = Holding::new(10.0, 100.0).unwrap();
        holding.total_invested = 1_200.0;
        portfolio.add_holding("AAPL", holding).unwrap();

        let valuation = analyzer(quotes()).value(&portfolio).await;
        let ctx = valuation.position_context("AAPL").unwrap();

        assert_eq!(valuation.positions["AAPL"].gain_loss_pct, 0.0);
        assert_eq!(ctx.unrealized_pnl_pct, valuation.positions["AAPL"].gain_loss_pct);
    }

    #[tokio::test]
    async fn test_report_includes_benchmark() {
        let report = analyzer(quotes()).report(&portfolio()).await;
        let benchmark = report.benchmark.unwrap();
        assert_eq!(benchmark.benchmark_symbol, "VOO");
        assert_eq!(benchmark.benchmark_change_pct, 0.5);
        assert_eq!(report.alerts.len(), 2);
    }

    #[tokio::test]
    async fn test_quotes_are_cached() {
        let mut source = MockQuoteSource::new();
        source
            .expect_quote()
            .times(1)
            .returning(|s| Ok(quote(s, 10.0, 0.0)));
        let analyzer = analyzer(source);

        analyzer.quote("AAPL").await.unwrap();
        analyzer.quote("AAPL").await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_portfolio() {
        let mut p = Portfolio::default();
        p.set_cash(1_000.0).unwrap();
        let report = analyzer(MockQuoteSource::new()).report(&p).await;

        assert!(report.valuation.positions.is_empty());
        assert_eq!(report.valuation.total_portfolio_value, 1_000.0);
        assert_eq!(report.valuation.cash_pct(), 100.0);
        assert!(report.benchmark.is_none());
        assert!(report.valuation.daily_change_pct.is_none());
    }

    #[tokio::test]
    async fn test_apply_prices_only_writes_live_quotes() {
        let mut p = portfolio();
        let valuation = analyzer(quotes()).value(&p).await;

        assert_eq!(valuation.apply_prices(&mut p).unwrap(), 2);
        assert_eq!(p.stocks["AAPL"].current_price, Some(120.0));
        assert_eq!(p.stocks["ZZZZ"].current_price, Some(40.0));
    }
}
