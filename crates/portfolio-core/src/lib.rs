//! Recommendation scoring for portfolio-rs
//!
//! This crate turns a position's technical indicators, its news sentiment and
//! the surrounding portfolio context into a BUY / SELL / HOLD recommendation
//! with a confidence and human-readable reasons.
//!
//! It performs no I/O. Market data, news, persistence and delivery live in
//! `portfolio-tracker`.
//!
//! # Example
//!
//! ```rust
//! use portfolio_core::{
//!     Action, IndicatorSnapshot, PositionContext, RecommendationScorer, ScorerConfig,
//!     SentimentScore,
//! };
//!
//! let scorer = RecommendationScorer::new(ScorerConfig::default())?;
//! let indicators = IndicatorSnapshot::new().with_rsi(25.0);
//! let position = PositionContext::new(10.0, 100.0, 102.0).with_portfolio(20_000.0, 4_000.0);
//!
//! let rec = scorer.score(&indicators, SentimentScore::Unscored, &position)?;
//! assert_eq!(rec.action, Action::Buy);
//! # Ok::<(), portfolio_core::ScoreError>(())
//! ```

pub mod config;
pub mod error;
pub mod recommendation;
pub mod scorer;
pub mod signal;

pub use config::{MissingIndicators, ScorerConfig};
pub use error::{Result, ScoreError};
pub use recommendation::{Action, Recommendation, RiskOverride, Strength};
pub use scorer::RecommendationScorer;
pub use signal::{IndicatorSnapshot, MacdReading, PositionContext, SentimentScore, SmaReading};
