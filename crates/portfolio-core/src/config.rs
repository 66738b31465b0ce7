//! Thresholds and weights for the recommendation scorer

use crate::error::{Result, ScoreError};
use serde::{Deserialize, Serialize};

/// How the scorer treats an indicator the caller could not supply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingIndicators {
    /// Absent indicators contribute nothing
    #[default]
    Neutral,
    /// Absent RSI, MACD or SMA fails with `InvalidInput`
    Reject,
}

/// Immutable scorer configuration
///
/// Weights and thresholds are tuning defaults, not contractual values.
/// RSI thresholds are on the 0-100 scale, P&L thresholds in percent,
/// fractions in 0.0..=1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// RSI below this is oversold (default 30)
    pub rsi_oversold: f64,
    /// RSI above this is overbought (default 70)
    pub rsi_overbought: f64,
    /// RSI at or below this is deeply oversold (default 20)
    pub rsi_extreme_oversold: f64,
    /// RSI at or above this is deeply overbought (default 80)
    pub rsi_extreme_overbought: f64,
    pub rsi_weight: f64,
    pub rsi_extreme_weight: f64,
    pub macd_weight: f64,
    pub sma_weight: f64,
    /// SMA spread (fraction of long SMA) above which the trend counts as strong
    pub sma_strong_spread: f64,
    pub sma_strong_weight: f64,
    /// Multiplier applied to sentiment in -1..=1
    pub sentiment_weight: f64,
    /// Minimum |sentiment| that earns a reason line
    pub sentiment_reason_floor: f64,
    /// Total score strictly above this is a BUY
    pub buy_threshold: f64,
    /// Total score strictly below the negation of this is a SELL
    pub sell_threshold: f64,
    /// |total| at or above this is a high-strength call
    pub strong_threshold: f64,
    /// Confidence points per unit of |total score|
    pub confidence_per_point: f64,
    /// Unrealized gain (percent) that forces profit taking (default +20)
    pub profit_taking_pct: f64,
    /// Unrealized loss (percent) that forces a stop-loss (default -10)
    pub stop_loss_pct: f64,
    pub profit_taking_fraction: f64,
    pub stop_loss_fraction: f64,
    pub profit_taking_confidence: f64,
    pub stop_loss_confidence: f64,
    /// Portfolio weight at or above which BUY is capped to HOLD (default 0.15)
    pub max_position_weight: f64,
    /// |daily change| in percent flagged as high volatility (default 10)
    pub high_volatility_pct: f64,
    pub missing_indicators: MissingIndicators,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            rsi_extreme_oversold: 20.0,
            rsi_extreme_overbought: 80.0,
            rsi_weight: 2.0,
            rsi_extreme_weight: 3.0,
            macd_weight: 1.0,
            sma_weight: 1.0,
            sma_strong_spread: 0.02,
            sma_strong_weight: 1.5,
            sentiment_weight: 2.0,
            sentiment_reason_floor: 0.05,
            buy_threshold: 1.5,
            sell_threshold: 1.5,
            strong_threshold: 3.0,
            confidence_per_point: 20.0,
            profit_taking_pct: 20.0,
            stop_loss_pct: -10.0,
            profit_taking_fraction: 0.25,
            stop_loss_fraction: 0.5,
            profit_taking_confidence: 75.0,
            stop_loss_confidence: 90.0,
            max_position_weight: 0.15,
            high_volatility_pct: 10.0,
            missing_indicators: MissingIndicators::Neutral,
        }
    }
}

impl ScorerConfig {
    /// Set the RSI oversold/overbought pair, keeping the extreme bands 10 points further out
    pub fn with_rsi_thresholds(mut self, oversold: f64, overbought: f64) -> Self {
        self.rsi_oversold = oversold;
        self.rsi_overbought = overbought;
        self.rsi_extreme_oversold = (oversold - 10.0).max(0.0);
        self.rsi_extreme_overbought = (overbought + 10.0).min(100.0);
        self
    }

    pub fn with_missing_indicators(mut self, policy: MissingIndicators) -> Self {
        self.missing_indicators = policy;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let finite = [
            self.rsi_oversold,
            self.rsi_overbought,
            self.rsi_extreme_oversold,
            self.rsi_extreme_overbought,
            self.rsi_weight,
            self.rsi_extreme_weight,
            self.macd_weight,
            self.sma_weight,
            self.sma_strong_spread,
            self.sma_strong_weight,
            self.sentiment_weight,
            self.sentiment_reason_floor,
            self.buy_threshold,
            self.sell_threshold,
            self.strong_threshold,
            self.confidence_per_point,
            self.profit_taking_pct,
            self.stop_loss_pct,
            self.profit_taking_fraction,
            self.stop_loss_fraction,
            self.profit_taking_confidence,
            self.stop_loss_confidence,
            self.max_position_weight,
            self.high_volatility_pct,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err(ScoreError::invalid("config", "all thresholds and weights must be finite"));
        }

        if !(0.0..=100.0).contains(&self.rsi_oversold)
            || !(0.0..=100.0).contains(&self.rsi_overbought)
            || self.rsi_oversold >= self.rsi_overbought
        {
            return Err(ScoreError::invalid(
                "config.rsi",
                format!(
                    "need 0 <= oversold < overbought <= 100, got {} / {}",
                    self.rsi_oversold, self.rsi_overbought
                ),
            ));
        }

        if self.rsi_extreme_oversold > self.rsi_oversold
            || self.rsi_extreme_overbought < self.rsi_overbought
        {
            return Err(ScoreError::invalid(
                "config.rsi",
                "extreme bands must lie outside the oversold/overbought thresholds",
            ));
        }

        if self.buy_threshold < 0.0 || self.sell_threshold < 0.0 {
            return Err(ScoreError::invalid("config.thresholds", "buy/sell thresholds must be >= 0"));
        }

        if self.profit_taking_pct <= 0.0 || self.stop_loss_pct >= 0.0 {
            return Err(ScoreError::invalid(
                "config.risk",
                "profit taking must be positive and stop-loss negative",
            ));
        }

        for (field, fraction) in [
            ("config.profit_taking_fraction", self.profit_taking_fraction),
            ("config.stop_loss_fraction", self.stop_loss_fraction),
        ] {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(ScoreError::invalid(field, format!("must be in (0, 1], got {fraction}")));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ScorerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rsi_oversold, 30.0);
        assert_eq!(config.rsi_overbought, 70.0);
        assert_eq!(config.missing_indicators, MissingIndicators::Neutral);
    }

    #[test]
    fn test_inverted_rsi_thresholds_rejected() {
        let config = ScorerConfig::default().with_rsi_thresholds(70.0, 30.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rsi_thresholds_move_extreme_bands() {
        let config = ScorerConfig::default().with_rsi_thresholds(25.0, 75.0);
        assert_eq!(config.rsi_extreme_oversold, 15.0);
        assert_eq!(config.rsi_extreme_overbought, 85.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_fraction_rejected() {
        let config = ScorerConfig {
            stop_loss_fraction: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ScorerConfig =
            serde_json::from_str(r#"{"rsi_oversold": 25.0, "missing_indicators": "reject"}"#).unwrap();
        assert_eq!(config.rsi_oversold, 25.0);
        assert_eq!(config.rsi_overbought, 70.0);
        assert_eq!(config.missing_indicators, MissingIndicators::Reject);
    }
}
