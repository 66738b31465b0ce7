//! Recommendation output types

use serde::{Deserialize, Serialize};
use std::fmt;

/// What to do with a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        };
        f.write_str(s)
    }
}

/// How decisive the call is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Low,
    Moderate,
    High,
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

/// Risk rule that replaced the blended score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskOverride {
    ProfitTaking,
    StopLoss,
}

/// Scorer output for one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: Action,
    /// 0.0..=100.0
    pub confidence: f64,
    pub strength: Strength,
    /// One line per rule that fired, override first
    pub reasons: Vec<String>,
    pub technical_score: f64,
    pub sentiment_score: f64,
    pub total_score: f64,
    pub risk_override: Option<RiskOverride>,
    /// Share of the position to sell on a partial SELL
    pub sell_fraction: Option<f64>,
    pub risk_factors: Vec<String>,
}

impl Recommendation {
    /// Short label such as `STRONG BUY` or `HOLD`
    pub fn label(&self) -> String {
        match (self.action, self.strength) {
            (Action::Hold, _) => "HOLD".to_string(),
            (action, Strength::High) => format!("STRONG {action}"),
            (action, _) => action.to_string(),
        }
    }

    /// Reasons joined for single-line display
    pub fn reasoning(&self) -> String {
        if self.reasons.is_empty() {
            "Mixed or neutral signals".to_string()
        } else {
            self.reasons.join("; ")
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.action != Action::Hold
    }
}
