//! Weighted rule scoring of technical, sentiment and risk signals

use crate::config::{MissingIndicators, ScorerConfig};
use crate::error::{Result, ScoreError};
use crate::recommendation::{Action, Recommendation, RiskOverride, Strength};
use crate::signal::{IndicatorSnapshot, PositionContext, SentimentScore};

/// Maps indicators, sentiment and position context to a [`Recommendation`]
///
/// The scorer holds only its immutable configuration, so one instance can be
/// shared freely across threads and tasks. Identical inputs always produce an
/// identical recommendation.
///
/// Rules are applied in a fixed order:
///
/// 1. technical sub-score from RSI, MACD and the SMA pair
/// 2. sentiment sub-score, linear in the sentiment value
/// 3. risk overrides (profit taking, stop-loss) which force a partial SELL
/// 4. otherwise the summed score is mapped to BUY / SELL / HOLD
#[derive(Debug, Clone, Default)]
pub struct RecommendationScorer {
    config: ScorerConfig,
}

impl RecommendationScorer {
    /// Create a scorer, validating the configuration up front
    pub fn new(config: ScorerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Score one position
    pub fn score(
        &self,
        indicators: &IndicatorSnapshot,
        sentiment: SentimentScore,
        position: &PositionContext,
    ) -> Result<Recommendation> {
        position.validate()?;
        let indicators = indicators.sanitized()?;
        self.check_required(&indicators)?;
        let sentiment = sentiment.sanitized()?;

        let mut reasons = Vec::new();
        let technical_score = self.technical_score(&indicators, &mut reasons);
        let sentiment_score = self.sentiment_score(sentiment, &mut reasons);
        let total_score = technical_score + sentiment_score;
        let mut risk_factors = self.risk_factors(&indicators, position);

        if let Some((risk, reason)) = self.risk_override(position) {
            reasons.insert(0, reason);
            let (confidence, fraction) = match risk {
                RiskOverride::ProfitTaking => (
                    self.config.profit_taking_confidence,
                    self.config.profit_taking_fraction,
                ),
                RiskOverride::StopLoss => {
                    (self.config.stop_loss_confidence, self.config.stop_loss_fraction)
                }
            };
            return Ok(Recommendation {
                action: Action::Sell,
                confidence: confidence.clamp(0.0, 100.0),
                strength: Strength::High,
                reasons,
                technical_score,
                sentiment_score,
                total_score,
                risk_override: Some(risk),
                sell_fraction: Some(fraction),
                risk_factors,
            });
        }

        let mut action = if total_score > self.config.buy_threshold {
            Action::Buy
        } else if total_score < -self.config.sell_threshold {
            Action::Sell
        } else {
            Action::Hold
        };

        if let Some(weight) = position.position_weight() {
            if action == Action::Buy && weight >= self.config.max_position_weight {
                action = Action::Hold;
                reasons.push(format!(
                    "Position already {:.1}% of portfolio (max {:.0}%) - not adding",
                    weight * 100.0,
                    self.config.max_position_weight * 100.0
                ));
            }
        }

        if let Some(cash) = position.available_cash {
            if action == Action::Buy && cash < position.current_price {
                action = Action::Hold;
                reasons.push(format!(
                    "Available cash (${:.2}) is below one share (${:.2}) - not adding",
                    cash, position.current_price
                ));
            }
        }

        let strength = match action {
            Action::Hold => Strength::Low,
            _ if total_score.abs() >= self.config.strong_threshold => Strength::High,
            _ => Strength::Moderate,
        };

        let confidence = (total_score.abs() * self.config.confidence_per_point).clamp(0.0, 100.0);

        Ok(Recommendation {
            action,
            confidence,
            strength,
            reasons,
            technical_score,
            sentiment_score,
            total_score,
            risk_override: None,
            sell_fraction: None,
            risk_factors,
        })
    }

    fn check_required(&self, indicators: &IndicatorSnapshot) -> Result<()> {
        if self.config.missing_indicators == MissingIndicators::Neutral {
            return Ok(());
        }
        let missing = if indicators.rsi.is_none() {
            Some("rsi")
        } else if indicators.macd.is_none() {
            Some("macd")
        } else if indicators.sma.is_none() {
            Some("sma")
        } else {
            None
        };
        match missing {
            Some(field) => Err(ScoreError::invalid(
                field,
                "indicator is required and no neutral fallback was configured",
            )),
            None => Ok(()),
        }
    }

    fn technical_score(&self, indicators: &IndicatorSnapshot, reasons: &mut Vec<String>) -> f64 {
        let c = &self.config;
        let mut score = 0.0;

        if let Some(rsi) = indicators.rsi {
            if rsi < c.rsi_oversold && rsi <= c.rsi_extreme_oversold {
                score += c.rsi_extreme_weight;
                reasons.push(format!("RSI deeply oversold ({rsi:.1}) - strong buy signal"));
            } else if rsi < c.rsi_oversold {
                score += c.rsi_weight;
                reasons.push(format!("RSI oversold ({rsi:.1}) - potential buy"));
            } else if rsi > c.rsi_overbought && rsi >= c.rsi_extreme_overbought {
                score -= c.rsi_extreme_weight;
                reasons.push(format!("RSI deeply overbought ({rsi:.1}) - strong sell signal"));
            } else if rsi > c.rsi_overbought {
                score -= c.rsi_weight;
                reasons.push(format!("RSI overbought ({rsi:.1}) - potential sell"));
            }
        }

        if let Some(macd) = indicators.macd {
            let hist = macd.histogram();
            if hist > 0.0 {
                score += c.macd_weight;
                reasons.push(format!(
                    "MACD above signal line ({:.3} > {:.3}) - bullish crossover",
                    macd.line, macd.signal
                ));
            } else if hist < 0.0 {
                score -= c.macd_weight;
                reasons.push(format!(
                    "MACD below signal line ({:.3} < {:.3}) - bearish crossover",
                    macd.line, macd.signal
                ));
            }
        }

        if let Some(sma) = indicators.sma {
            let strong = sma.spread().abs() > c.sma_strong_spread;
            let weight = if strong { c.sma_strong_weight } else { c.sma_weight };
            if sma.short > sma.long {
                score += weight;
                reasons.push(format!(
                    "Short SMA above long SMA ({:.2} > {:.2}) - {} uptrend",
                    sma.short,
                    sma.long,
                    if strong { "strong" } else { "mild" }
                ));
            } else if sma.short < sma.long {
                score -= weight;
                reasons.push(format!(
                    "Short SMA below long SMA ({:.2} < {:.2}) - {} downtrend",
                    sma.short,
                    sma.long,
                    if strong { "strong" } else { "mild" }
                ));
            }
        }

        score
    }

    fn sentiment_score(&self, sentiment: SentimentScore, reasons: &mut Vec<String>) -> f64 {
        let value = sentiment.value();
        if sentiment.is_scored() && value.abs() >= self.config.sentiment_reason_floor {
            let tone = if value > 0.0 { "positive" } else { "negative" };
            reasons.push(format!("News sentiment {tone} ({value:+.2})"));
        }
        value * self.config.sentiment_weight
    }

    fn risk_override(&self, position: &PositionContext) -> Option<(RiskOverride, String)> {
        let pnl = position.unrealized_pnl_pct;
        if pnl >= self.config.profit_taking_pct {
            Some((
                RiskOverride::ProfitTaking,
                format!(
                    "Profit-taking: position up {pnl:+.1}% (threshold {:+.0}%) - sell {:.0}% of shares",
                    self.config.profit_taking_pct,
                    self.config.profit_taking_fraction * 100.0
                ),
            ))
        } else if pnl <= self.config.stop_loss_pct {
            Some((
                RiskOverride::StopLoss,
                format!(
                    "Stop-loss triggered at {pnl:+.1}% P&L (limit {:+.0}%) - sell {:.0}% of shares",
                    self.config.stop_loss_pct,
                    self.config.stop_loss_fraction * 100.0
                ),
            ))
        } else {
            None
        }
    }

    fn risk_factors(&self, indicators: &IndicatorSnapshot, position: &PositionContext) -> Vec<String> {
        let mut risks = Vec::new();

        if let Some(weight) = position.position_weight() {
            if weight > self.config.max_position_weight {
                risks.push(format!("High concentration ({:.1}% of portfolio)", weight * 100.0));
            }
        }

        if position.unrealized_pnl_pct >= self.config.profit_taking_pct {
            risks.push("Large unrealized gains - consider profit taking".to_string());
        } else if position.unrealized_pnl_pct <= self.config.stop_loss_pct {
            risks.push("Significant losses - review thesis".to_string());
        }

        if let Some(change) = position.daily_change_pct {
            if change.abs() >= self.config.high_volatility_pct {
                risks.push(format!("High recent volatility ({change:+.1}% today)"));
            }
        }

        if indicators.is_empty() {
            risks.push("No technical data available".to_string());
        }

        risks
    }
}
