//! Analysis settings (`settings.json`)

use crate::error::{Result, TrackerError};
use portfolio_core::ScorerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How eager the scorer should be to leave HOLD
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStrength {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

impl RecommendationStrength {
    /// |total score| needed for a BUY or SELL
    fn action_threshold(self) -> f64 {
        match self {
            Self::Conservative => 2.0,
            Self::Moderate => 1.5,
            Self::Aggressive => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// |daily change| in percent that raises a price alert
    pub price_threshold: f64,
    pub enable_recommendations: bool,
    pub recommendation_strength: RecommendationStrength,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            price_threshold: 5.0,
            enable_recommendations: true,
            recommendation_strength: RecommendationStrength::Moderate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnicalSettings {
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub sma_short: usize,
    pub sma_long: usize,
}

impl Default for TechnicalSettings {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            sma_short: 20,
            sma_long: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsSettings {
    /// |score| above which sentiment is labelled positive or negative
    pub sentiment_threshold: f64,
    pub sources: Vec<String>,
}

impl Default for NewsSettings {
    fn default() -> Self {
        Self {
            sentiment_threshold: 0.1,
            sources: vec![
                "alpha_vantage".to_string(),
                "finnhub".to_string(),
                "marketaux".to_string(),
            ],
        }
    }
}

/// User-tunable analysis settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub alerts: AlertSettings,
    pub technical_analysis: TechnicalSettings,
    pub news: NewsSettings,
}

impl Settings {
    /// Load settings, falling back to defaults when the file is missing or unreadable
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(settings) => settings,
            Err(TrackerError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file, using defaults");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid settings file, using defaults");
                Self::default()
            }
        }
    }

    /// Load and validate settings, surfacing every error
    pub fn try_load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let ta = &self.technical_analysis;
        if ta.rsi_period < 2 {
            return Err(TrackerError::Config(format!(
                "rsi_period must be at least 2, got {}",
                ta.rsi_period
            )));
        }
        if ta.sma_short == 0 || ta.sma_short >= ta.sma_long {
            return Err(TrackerError::Config(format!(
                "need 0 < sma_short < sma_long, got {} / {}",
                ta.sma_short, ta.sma_long
            )));
        }
        if !self.alerts.price_threshold.is_finite() || self.alerts.price_threshold <= 0.0 {
            return Err(TrackerError::Config(
                "alerts.price_threshold must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.news.sentiment_threshold) {
            return Err(TrackerError::Config(
                "news.sentiment_threshold must be in [0, 1)".to_string(),
            ));
        }
        self.scorer_config().validate()?;
        Ok(())
    }

    /// Scorer configuration derived from these settings
    pub fn scorer_config(&self) -> ScorerConfig {
        let threshold = self.alerts.recommendation_strength.action_threshold();
        ScorerConfig {
            buy_threshold: threshold,
            sell_threshold: threshold,
            ..ScorerConfig::default()
        }
        .with_rsi_thresholds(
            self.technical_analysis.rsi_oversold,
            self.technical_analysis.rsi_overbought,
        )
    }
}
