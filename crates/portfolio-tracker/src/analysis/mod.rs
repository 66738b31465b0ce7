//! Technical, sentiment and portfolio analysis feeding the recommendation engine

pub mod portfolio;
pub mod recommendations;
pub mod sentiment;
pub mod technical;

pub use portfolio::{
    AlertDirection, AlertSeverity, BenchmarkComparison, Mover, PortfolioAnalyzer, PortfolioReport,
    PortfolioValuation, PositionValuation, PriceAlert, PriceSource,
};
pub use recommendations::{
    PortfolioAdvice, PortfolioHealth, PortfolioRecommendation, PortfolioRecommendations, PrioritizedAction,
    Priority, RecommendationEngine, RiskLevel, StockRecommendation,
};
pub use sentiment::{
    MarketMood, MarketSentiment, PortfolioSentiment, SentimentAnalyzer, SentimentLabel, StockSentiment,
};
pub use technical::{IndicatorParams, RsiTrend, TechnicalAnalyzer, TechnicalReport};
