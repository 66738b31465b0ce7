//! Per-holding recommendations and portfolio-level advice

use super::portfolio::PortfolioValuation;
use super::sentiment::{MarketMood, PortfolioSentiment, SentimentAnalyzer, SentimentLabel, StockSentiment};
use super::technical::{TechnicalAnalyzer, TechnicalReport};
use crate::error::{Result, TrackerError};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use portfolio_core::{Action, Recommendation, RecommendationScorer, Strength};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const LOW_CASH_PCT: f64 = 5.0;
const HIGH_CASH_PCT: f64 = 20.0;
const REBALANCE_RETURN_PCT: f64 = 25.0;
const REVIEW_RETURN_PCT: f64 = -15.0;
const MAX_ACTIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortfolioAdvice {
    BuildCashReserves,
    DeployCash,
    Rebalance,
    ReviewPositions,
    MarketCaution,
    ReduceConcentration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRecommendation {
    pub advice: PortfolioAdvice,
    pub priority: Priority,
    /// Holding the advice is about, if any
    pub symbol: Option<String>,
    pub message: String,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortfolioHealth {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl fmt::Display for PortfolioHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Scorer output for one holding plus the inputs behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecommendation {
    pub symbol: String,
    pub recommendation: Recommendation,
    pub technical: TechnicalReport,
    pub sentiment: StockSentiment,
    pub current_price: f64,
    pub gain_loss_pct: f64,
    /// Fraction of the total portfolio value
    pub weight: f64,
}

/// One line in the action list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrioritizedAction {
    pub priority: Priority,
    pub symbol: Option<String>,
    /// `STRONG BUY`, `SELL`, or a portfolio-level instruction
    pub action: String,
    pub reason: String,
    /// Scorer confidence; portfolio-level advice has none
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRecommendations {
    pub generated_at: DateTime<Utc>,
    pub stocks: Vec<StockRecommendation>,
    pub portfolio: Vec<PortfolioRecommendation>,
    pub health: PortfolioHealth,
    pub risk_level: RiskLevel,
    pub actions: Vec<PrioritizedAction>,
    pub sentiment: PortfolioSentiment,
    /// Holdings the scorer rejected, with the reason
    #[serde(default)]
    pub skipped: BTreeMap<String, String>,
}

impl PortfolioRecommendations {
    pub fn stock(&self, symbol: &str) -> Option<&StockRecommendation> {
        self.stocks.iter().find(|s| s.symbol == symbol)
    }
}

/// Combines technical analysis, news sentiment and position data through the scorer
pub struct RecommendationEngine {
    technical: TechnicalAnalyzer,
    sentiment: SentimentAnalyzer,
    scorer: RecommendationScorer,
}

impl RecommendationEngine {
    pub fn new(technical: TechnicalAnalyzer, sentiment: SentimentAnalyzer, scorer: RecommendationScorer) -> Self {
        Self {
            technical,
            sentiment,
            scorer,
        }
    }

    pub fn scorer(&self) -> &RecommendationScorer {
        &self.scorer
    }

    /// Recommendations for every valued holding
    ///
    /// A holding whose price history cannot be fetched is scored without
    /// indicators. A holding the scorer rejects is left out and listed in
    /// `skipped`. Fails when no holding had usable history or every holding
    /// was rejected.
    pub async fn recommend(&self, valuation: &PortfolioValuation) -> Result<PortfolioRecommendations> {
        let symbols: Vec<String> = valuation.positions.keys().cloned().collect();
        tracing::info!(count = symbols.len(), "generating recommendations");

        let sentiment = self.sentiment.portfolio_sentiment(&symbols).await;

        let reports: Vec<(String, Option<TechnicalReport>)> = stream::iter(&symbols)
            .map(|symbol| async move {
                match self.technical.analyze(symbol).await {
                    Ok(report) => (symbol.clone(), Some(report)),
                    Err(e) => {
                        tracing::warn!(symbol = %symbol, error = %e, "technical analysis failed");
                        (symbol.clone(), None)
                    }
                }
            })
            .buffered(2)
            .collect()
            .await;

        if !reports.is_empty() && reports.iter().all(|(_, r)| r.is_none()) {
            return Err(TrackerError::Other(
                "price history unavailable for every holding".to_string(),
            ));
        }

        let mut stocks = Vec::with_capacity(reports.len());
        let mut skipped = BTreeMap::new();
        for (symbol, report) in reports {
            let Some(context) = valuation.position_context(&symbol) else {
                continue;
            };
            let technical = report.unwrap_or_else(|| TechnicalReport::empty(&symbol));
            let stock_sentiment = sentiment
                .stocks
                .get(&symbol)
                .cloned()
                .unwrap_or_else(|| StockSentiment::neutral(&symbol));

            let recommendation =
                match self.scorer.score(&technical.snapshot, stock_sentiment.sentiment_score(), &context) {
                    Ok(rec) => rec,
                    Err(e) => {
                        tracing::warn!(symbol = %symbol, error = %e, "holding skipped by scorer");
                        skipped.insert(symbol, e.to_string());
                        continue;
                    }
                };
            tracing::info!(
                symbol = %symbol,
                action = %recommendation.action,
                confidence = recommendation.confidence,
                "recommendation"
            );

            stocks.push(StockRecommendation {
                current_price: context.current_price,
                gain_loss_pct: valuation.positions.get(&symbol).map_or(0.0, |p| p.gain_loss_pct),
                weight: valuation.weight(&symbol),
                symbol,
                recommendation,
                technical,
                sentiment: stock_sentiment,
            });
        }

        if stocks.is_empty() && !skipped.is_empty() {
            return Err(TrackerError::Other(format!(
                "every holding was rejected by the scorer: {}",
                skipped.keys().cloned().collect::<Vec<_>>().join(", ")
            )));
        }

        let max_weight = self.scorer.config().max_position_weight;
        let portfolio = portfolio_recommendations(valuation, sentiment.market.mood, max_weight);
        let health = assess_health(valuation.total_gain_loss_pct, sentiment.overall.label);
        let risk_level = assess_risk(
            valuation,
            max_weight,
            self.scorer.config().high_volatility_pct,
        );
        let actions = prioritize(&stocks, &portfolio);

        Ok(PortfolioRecommendations {
            generated_at: Utc::now(),
            stocks,
            portfolio,
            health,
            risk_level,
            actions,
            sentiment,
            skipped,
        })
    }
}

/// Advice about the portfolio as a whole
pub fn portfolio_recommendations(
    valuation: &PortfolioValuation,
    mood: MarketMood,
    max_position_weight: f64,
) -> Vec<PortfolioRecommendation> {
    let mut recs = Vec::new();
    let mut push = |advice, priority, symbol: Option<String>, message: String, action: &str| {
        recs.push(PortfolioRecommendation {
            advice,
            priority,
            symbol,
            message,
            action: action.to_string(),
        })
    };

    if valuation.total_portfolio_value > 0.0 {
        let cash_pct = valuation.cash_pct();
        if cash_pct < LOW_CASH_PCT {
            push(
                PortfolioAdvice::BuildCashReserves,
                Priority::Medium,
                None,
                format!("Cash is only {cash_pct:.1}% of the portfolio"),
                "Build cash reserves",
            );
        } else if cash_pct > HIGH_CASH_PCT {
            push(
                PortfolioAdvice::DeployCash,
                Priority::Low,
                None,
                format!("Cash is {cash_pct:.1}% of the portfolio"),
                "Consider deploying excess cash",
            );
        }
    }

    let total_return = valuation.total_gain_loss_pct;
    if total_return >= REBALANCE_RETURN_PCT {
        push(
            PortfolioAdvice::Rebalance,
            Priority::High,
            None,
            format!("Portfolio is up {total_return:.1}% overall"),
            "Consider rebalancing and taking profits",
        );
    } else if total_return <= REVIEW_RETURN_PCT {
        push(
            PortfolioAdvice::ReviewPositions,
            Priority::High,
            None,
            format!("Portfolio is down {:.1}% overall", total_return.abs()),
            "Review losing positions",
        );
    }

    if mood.is_negative() {
        push(
            PortfolioAdvice::MarketCaution,
            Priority::Medium,
            None,
            format!("Market mood is {mood}"),
            "Be cautious with new positions",
        );
    }

    for symbol in valuation.positions.keys() {
        let weight = valuation.weight(symbol);
        if weight > max_position_weight {
            push(
                PortfolioAdvice::ReduceConcentration,
                Priority::Medium,
                Some(symbol.clone()),
                format!("{symbol} is {:.1}% of the portfolio", weight * 100.0),
                "Reduce concentration",
            );
        }
    }

    recs
}

pub fn assess_health(total_return_pct: f64, sentiment: SentimentLabel) -> PortfolioHealth {
    let negative = sentiment == SentimentLabel::Negative;
    if total_return_pct > 15.0 && !negative {
        PortfolioHealth::Excellent
    } else if total_return_pct > 5.0 && !negative {
        PortfolioHealth::Good
    } else if total_return_pct > -5.0 && !negative {
        PortfolioHealth::Fair
    } else {
        PortfolioHealth::Poor
    }
}

/// Risk from concentrated or volatile positions and the overall return
pub fn assess_risk(valuation: &PortfolioValuation, max_position_weight: f64, high_volatility_pct: f64) -> RiskLevel {
    let risky = valuation
        .positions
        .values()
        .filter(|p| {
            valuation.weight(&p.symbol) > max_position_weight
                || p.daily_change_pct.is_some_and(|c| c.abs() >= high_volatility_pct)
        })
        .count();
    let total_return = valuation.total_gain_loss_pct;

    if risky >= 2 || total_return <= REVIEW_RETURN_PCT {
        RiskLevel::High
    } else if risky == 1 || total_return.abs() >= 20.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Actionable stock calls and portfolio advice, most urgent first
pub fn prioritize(stocks: &[StockRecommendation], portfolio: &[PortfolioRecommendation]) -> Vec<PrioritizedAction> {
    let mut actions: Vec<PrioritizedAction> = stocks
        .iter()
        .filter(|s| s.recommendation.action != Action::Hold)
        .map(|s| PrioritizedAction {
            priority: if s.recommendation.strength == Strength::High {
                Priority::High
            } else {
                Priority::Medium
            },
            symbol: Some(s.symbol.clone()),
            action: s.recommendation.label(),
            reason: s.recommendation.reasoning(),
            confidence: Some(s.recommendation.confidence),
        })
        .chain(portfolio.iter().map(|p| PrioritizedAction {
            priority: p.priority,
            symbol: p.symbol.clone(),
            action: p.action.clone(),
            reason: p.message.clone(),
            confidence: None,
        }))
        .collect();

    actions.sort_by(|a, b| {
        b.priority.cmp(&a.priority).then_with(|| {
            let a = a.confidence.unwrap_or(f64::NEG_INFINITY);
            let b = b.confidence.unwrap_or(f64::NEG_INFINITY);
            b.total_cmp(&a)
        })
    });
    actions.truncate(MAX_ACTIONS);
    actions
}
