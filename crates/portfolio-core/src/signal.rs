//! Scorer inputs: indicator snapshot, sentiment score and position context

use crate::error::{Result, ScoreError, ensure_finite};
use serde::{Deserialize, Serialize};

/// MACD line and signal line at a single point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdReading {
    pub line: f64,
    pub signal: f64,
}

impl MacdReading {
    pub fn new(line: f64, signal: f64) -> Self {
        Self { line, signal }
    }

    /// MACD histogram (line minus signal)
    pub fn histogram(&self) -> f64 {
        self.line - self.signal
    }
}

/// Short and long simple moving averages at a single point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmaReading {
    pub short: f64,
    pub long: f64,
}

impl SmaReading {
    pub fn new(short: f64, long: f64) -> Self {
        Self { short, long }
    }

    /// Relative gap between the averages, as a fraction of the long SMA
    pub fn spread(&self) -> f64 {
        if self.long == 0.0 {
            0.0
        } else {
            (self.short - self.long) / self.long.abs()
        }
    }
}

/// Technical indicator values as of one bar
///
/// Any field may be absent when the upstream feed could not produce it.
/// Whether an absent field is scored as neutral or rejected is decided by
/// [`MissingIndicators`](crate::config::MissingIndicators).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: Option<f64>,
    pub macd: Option<MacdReading>,
    pub sma: Option<SmaReading>,
}

impl IndicatorSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rsi(mut self, rsi: f64) -> Self {
        self.rsi = Some(rsi);
        self
    }

    pub fn with_macd(mut self, line: f64, signal: f64) -> Self {
        self.macd = Some(MacdReading::new(line, signal));
        self
    }

    pub fn with_sma(mut self, short: f64, long: f64) -> Self {
        self.sma = Some(SmaReading::new(short, long));
        self
    }

    /// True when no indicator is present at all
    pub fn is_empty(&self) -> bool {
        self.rsi.is_none() && self.macd.is_none() && self.sma.is_none()
    }

    /// Reject non-finite values and clamp RSI into 0..=100
    pub(crate) fn sanitized(&self) -> Result<Self> {
        let rsi = match self.rsi {
            Some(rsi) => Some(ensure_finite("rsi", rsi)?.clamp(0.0, 100.0)),
            None => None,
        };
        let macd = match self.macd {
            Some(m) => Some(MacdReading::new(
                ensure_finite("macd.line", m.line)?,
                ensure_finite("macd.signal", m.signal)?,
            )),
            None => None,
        };
        let sma = match self.sma {
            Some(s) => Some(SmaReading::new(
                ensure_finite("sma.short", s.short)?,
                ensure_finite("sma.long", s.long)?,
            )),
            None => None,
        };
        Ok(Self { rsi, macd, sma })
    }
}

/// News sentiment for a symbol
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SentimentScore {
    /// No scored articles; treated as neutral
    #[default]
    Unscored,
    /// Average tone in -1.0..=1.0
    Scored(f64),
}

impl SentimentScore {
    /// Score as a number, zero when unscored
    pub fn value(&self) -> f64 {
        match self {
            Self::Unscored => 0.0,
            Self::Scored(v) => *v,
        }
    }

    pub fn is_scored(&self) -> bool {
        matches!(self, Self::Scored(_))
    }

    pub(crate) fn sanitized(self) -> Result<Self> {
        match self {
            Self::Unscored => Ok(self),
            Self::Scored(v) => Ok(Self::Scored(ensure_finite("sentiment", v)?.clamp(-1.0, 1.0))),
        }
    }
}

impl From<Option<f64>> for SentimentScore {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Unscored, Self::Scored)
    }
}

/// Portfolio facts about one holding, immutable for a scoring call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionContext {
    pub shares: f64,
    pub avg_cost: f64,
    pub current_price: f64,
    /// Unrealized gain or loss in percent (25.0 means +25%)
    pub unrealized_pnl_pct: f64,
    pub position_value: f64,
    /// Holdings plus cash, unknown until attached
    pub portfolio_value: Option<f64>,
    /// Cash available to buy more, unknown until attached
    pub available_cash: Option<f64>,
    /// Today's price move in percent, when known
    pub daily_change_pct: Option<f64>,
}

impl PositionContext {
    /// Build a context from shares, cost basis and the latest price
    ///
    /// P&L and position value are derived. Portfolio total and cash stay
    /// unknown until [`with_portfolio`](Self::with_portfolio) or
    /// [`with_available_cash`](Self::with_available_cash) attach them, and the
    /// concentration and cash checks only run on known values.
    pub fn new(shares: f64, avg_cost: f64, current_price: f64) -> Self {
        let position_value = shares * current_price;
        let unrealized_pnl_pct = if avg_cost > 0.0 {
            (current_price - avg_cost) / avg_cost * 100.0
        } else {
            0.0
        };
        Self {
            shares,
            avg_cost,
            current_price,
            unrealized_pnl_pct,
            position_value,
            portfolio_value: None,
            available_cash: None,
            daily_change_pct: None,
        }
    }

    /// Attach portfolio totals (holdings plus cash) and available cash
    pub fn with_portfolio(mut self, portfolio_value: f64, available_cash: f64) -> Self {
        self.portfolio_value = Some(portfolio_value);
        self.available_cash = Some(available_cash);
        self
    }

    pub fn with_available_cash(mut self, available_cash: f64) -> Self {
        self.available_cash = Some(available_cash);
        self
    }

    pub fn with_daily_change(mut self, pct: f64) -> Self {
        self.daily_change_pct = Some(pct);
        self
    }

    /// Override the derived P&L, e.g. when cost basis includes fees
    pub fn with_unrealized_pnl_pct(mut self, pct: f64) -> Self {
        self.unrealized_pnl_pct = pct;
        self
    }

    /// Fraction of the whole portfolio held in this position, when the total is known
    pub fn position_weight(&self) -> Option<f64> {
        self.portfolio_value
            .filter(|total| *total > 0.0)
            .map(|total| self.position_value / total)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let shares = ensure_finite("shares", self.shares)?;
        if shares < 0.0 {
            return Err(ScoreError::invalid("shares", format!("must be >= 0, got {shares}")));
        }
        for (field, value) in [
            ("avg_cost", self.avg_cost),
            ("current_price", self.current_price),
        ] {
            if ensure_finite(field, value)? < 0.0 {
                return Err(ScoreError::invalid(field, format!("must be >= 0, got {value}")));
            }
        }
        ensure_finite("unrealized_pnl_pct", self.unrealized_pnl_pct)?;
        ensure_finite("position_value", self.position_value)?;
        if let Some(total) = self.portfolio_value {
            ensure_finite("portfolio_value", total)?;
        }
        if let Some(cash) = self.available_cash {
            ensure_finite("available_cash", cash)?;
        }
        if let Some(change) = self.daily_change_pct {
            ensure_finite("daily_change_pct", change)?;
        }
        Ok(())
    }
}
