//! Portfolio tracking with daily recommendations
//!
//! This crate wires market data, news and a JSON portfolio file into a daily
//! report delivered over Telegram. It includes:
//!
//! - Quotes and daily price history from Alpha Vantage, with Finnhub as a quote fallback
//! - Company and market news from MarketAux (scored) and Finnhub (headlines only)
//! - Technical indicators (RSI, MACD, SMA) computed locally from daily closes
//! - Portfolio valuation, price alerts and a benchmark comparison
//! - BUY / SELL / HOLD scoring through [`portfolio_core::RecommendationScorer`]
//! - Telegram Markdown and plain-text message formatting
//!
//! # Example
//!
//! ```rust,ignore
//! use portfolio_tracker::{DailyTracker, Settings, TrackerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TrackerConfig::from_env()?;
//!     let settings = Settings::load(&config.settings_file);
//!
//!     let tracker = DailyTracker::from_config(&config, &settings)?;
//!     let summary = tracker.run().await?;
//!     println!("{} messages sent", summary.messages_sent);
//!
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod notify;
pub mod retry;
pub mod settings;
pub mod store;
pub mod tracker;

pub use analysis::{
    PortfolioAnalyzer, PortfolioRecommendations, PortfolioReport, PortfolioValuation, PriceAlert,
    RecommendationEngine, SentimentAnalyzer, TechnicalAnalyzer,
};
pub use cache::{CacheKey, CacheManager, TtlCache};
pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use notify::{Channel, CliFormatter, ConsoleNotifier, Formatter, Notifier, TelegramFormatter, TelegramNotifier};
pub use retry::RetryPolicy;
pub use settings::Settings;
pub use store::{Holding, HoldingUpdate, Portfolio, PortfolioStore};
pub use tracker::{DailyTracker, RunStatus, RunSummary, SystemCheck};
