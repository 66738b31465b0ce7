//! Market data and news providers
//!
//! Each provider is a thin reqwest client with its own `governor` rate
//! limiter. The analyzers only see the [`QuoteSource`], [`PriceHistorySource`]
//! and [`NewsSource`] traits.

pub mod alpha_vantage;
pub mod fallback;
pub mod finnhub;
pub mod marketaux;

pub use alpha_vantage::AlphaVantageClient;
pub use fallback::FallbackQuoteSource;
pub use finnhub::FinnhubClient;
pub use marketaux::MarketAuxClient;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;

pub(crate) type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Requests-per-minute limiter; zero is treated as one
pub(crate) fn per_minute_limiter(requests_per_minute: u32) -> SharedRateLimiter {
    let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Latest trading quote for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    /// Absolute change versus previous close
    pub change: f64,
    /// Percent change versus previous close
    pub change_percent: f64,
    pub volume: Option<u64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub previous_close: Option<f64>,
    pub latest_trading_day: Option<String>,
    /// Provider that answered
    pub source: String,
}

/// One day of OHLCV data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// A news article normalized across providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Symbols the provider tagged on the article
    pub symbols: Vec<String>,
    /// Per-entity sentiment scores in -1..=1; empty when the provider has none
    pub entity_sentiments: Vec<f64>,
}

impl NewsArticle {
    /// Mean entity sentiment, `None` when unscored
    pub fn sentiment(&self) -> Option<f64> {
        if self.entity_sentiments.is_empty() {
            None
        } else {
            Some(self.entity_sentiments.iter().sum::<f64>() / self.entity_sentiments.len() as f64)
        }
    }
}

/// Live quotes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn quote(&self, symbol: &str) -> Result<Quote>;
}

/// Daily price history, oldest bar first
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceHistorySource: Send + Sync {
    async fn daily_closes(&self, symbol: &str) -> Result<Vec<DailyBar>>;
}

/// Company and market news
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NewsSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether articles carry sentiment scores
    fn provides_sentiment(&self) -> bool;

    async fn company_news(&self, symbol: &str, limit: usize) -> Result<Vec<NewsArticle>>;

    async fn market_news(&self, limit: usize) -> Result<Vec<NewsArticle>>;
}

/// Parse a number the way providers send it: JSON number or numeric string
pub(crate) fn parse_number(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn quote(symbol: &str, price: f64, change_percent: f64) -> Quote {
        let previous = price / (1.0 + change_percent / 100.0);
        Quote {
            symbol: symbol.to_string(),
            price,
            change: price - previous,
            change_percent,
            volume: Some(1_000),
            open: None,
            high: None,
            low: None,
            previous_close: Some(previous),
            latest_trading_day: None,
            source: "test".to_string(),
        }
    }

    pub fn article(title: &str, scores: &[f64]) -> NewsArticle {
        NewsArticle {
            title: title.to_string(),
            description: None,
            url: "https://example.com/a".to_string(),
            source: "Wire".to_string(),
            published_at: None,
            symbols: vec![],
            entity_sentiments: scores.to_vec(),
        }
    }

    /// Closes rising by `step` from `start`, one bar per day
    pub fn bars(start: f64, step: f64, count: usize) -> Vec<DailyBar> {
        let first = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..count)
            .map(|i| {
                let close = start + step * i as f64;
                DailyBar {
                    date: first + chrono::Days::new(i as u64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 100,
                }
            })
            .collect()
    }
}
