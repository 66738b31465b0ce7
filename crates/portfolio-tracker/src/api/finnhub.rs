//! Finnhub client for quotes and headlines

use super::{NewsArticle, NewsSource, Quote, QuoteSource, SharedRateLimiter, per_minute_limiter};
use crate::error::{Result, TrackerError};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const BASE_URL: &str = "https://finnhub.io/api/v1";
const PROVIDER: &str = "Finnhub";

/// Finnhub quote payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinnhubQuote {
    /// Current price
    pub c: f64,
    /// Change
    #[serde(default)]
    pub d: Option<f64>,
    /// Percent change
    #[serde(default)]
    pub dp: Option<f64>,
    /// High price of the day
    #[serde(default)]
    pub h: Option<f64>,
    /// Low price of the day
    #[serde(default)]
    pub l: Option<f64>,
    /// Open price of the day
    #[serde(default)]
    pub o: Option<f64>,
    /// Previous close
    #[serde(default)]
    pub pc: Option<f64>,
    /// UNIX timestamp
    #[serde(default)]
    pub t: i64,
}

/// Finnhub news article
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinnhubNewsArticle {
    #[serde(default)]
    pub category: String,
    /// Publish time (UNIX timestamp)
    #[serde(default)]
    pub datetime: i64,
    pub headline: String,
    #[serde(default)]
    pub id: i64,
    /// Comma separated symbols
    #[serde(default)]
    pub related: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub url: String,
}

impl From<FinnhubNewsArticle> for NewsArticle {
    fn from(article: FinnhubNewsArticle) -> Self {
        let symbols = article
            .related
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_uppercase)
            .collect();

        NewsArticle {
            title: article.headline,
            description: Some(article.summary).filter(|s| !s.is_empty()),
            url: article.url,
            source: article.source,
            published_at: DateTime::<Utc>::from_timestamp(article.datetime, 0)
                .filter(|_| article.datetime > 0),
            symbols,
            // Finnhub headlines are unscored
            entity_sentiments: Vec::new(),
        }
    }
}

/// Finnhub API client
#[derive(Debug, Clone)]
pub struct FinnhubClient {
    client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: SharedRateLimiter,
    retry: RetryPolicy,
    news_lookback_days: u64,
}

impl FinnhubClient {
    /// Create a new Finnhub client with rate limiting
    ///
    /// # Arguments
    /// * `api_key` - Finnhub API key
    /// * `rate_limit` - Requests per minute (free tier: 60)
    pub fn new(api_key: impl Into<String>, rate_limit: u32) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
            rate_limiter: per_minute_limiter(rate_limit),
            retry: RetryPolicy::default(),
            news_lookback_days: 3,
        }
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Days of company news fetched by [`NewsSource::company_news`]
    pub fn with_news_lookback_days(mut self, days: u64) -> Self {
        self.news_lookback_days = days.max(1);
        self
    }

    pub async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        let raw: FinnhubQuote = self.get("quote", &[("symbol", symbol)]).await?;
        quote_from_raw(symbol, raw)
    }

    /// Company news between two dates, newest first
    pub async fn get_company_news(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<FinnhubNewsArticle>> {
        let from = from.format("%Y-%m-%d").to_string();
        let to = to.format("%Y-%m-%d").to_string();
        self.get(
            "company-news",
            &[("symbol", symbol), ("from", from.as_str()), ("to", to.as_str())],
        )
        .await
    }

    /// Get general market news
    ///
    /// # Arguments
    /// * `category` - News category (general, forex, crypto, merger)
    pub async fn get_market_news(&self, category: &str) -> Result<Vec<FinnhubNewsArticle>> {
        self.get("news", &[("category", category)]).await
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<T> {
        self.retry
            .execute(PROVIDER, || self.send(endpoint, params))
            .await
    }

    async fn send<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(format!("{}/{endpoint}", self.base_url))
            .query(params)
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TrackerError::rate_limited(PROVIDER));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(endpoint, %status, %body, "Finnhub request failed");
            return Err(TrackerError::Http {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
            });
        }

        let data: serde_json::Value = response.json().await?;
        if let Some(error) = data.get("error").and_then(serde_json::Value::as_str) {
            return Err(TrackerError::api(PROVIDER, error));
        }
        Ok(serde_json::from_value(data)?)
    }
}

pub(crate) fn quote_from_raw(symbol: &str, raw: FinnhubQuote) -> Result<Quote> {
    // Unknown symbols come back as all zeros
    if raw.c <= 0.0 && raw.t == 0 {
        return Err(TrackerError::InvalidSymbol(symbol.to_string()));
    }
    if !raw.c.is_finite() || raw.c <= 0.0 {
        return Err(TrackerError::unavailable(symbol, "quote has no price"));
    }

    Ok(Quote {
        symbol: symbol.to_string(),
        price: raw.c,
        change: raw.d.unwrap_or(0.0),
        change_percent: raw.dp.unwrap_or(0.0),
        volume: None,
        open: raw.o,
        high: raw.h,
        low: raw.l,
        previous_close: raw.pc,
        latest_trading_day: DateTime::<Utc>::from_timestamp(raw.t, 0)
            .map(|t| t.date_naive().to_string()),
        source: PROVIDER.to_string(),
    })
}

#[async_trait]
impl QuoteSource for FinnhubClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn quote(&self, symbol: &str) -> Result<Quote> {
        self.get_quote(symbol).await
    }
}

#[async_trait]
impl NewsSource for FinnhubClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn provides_sentiment(&self) -> bool {
        false
    }

    async fn company_news(&self, symbol: &str, limit: usize) -> Result<Vec<NewsArticle>> {
        let to = Utc::now().date_naive();
        let from = to
            .checked_sub_days(Days::new(self.news_lookback_days))
            .unwrap_or(to);

        let articles = self.get_company_news(symbol, from, to).await?;
        Ok(articles.into_iter().take(limit).map(NewsArticle::from).collect())
    }

    async fn market_news(&self, limit: usize) -> Result<Vec<NewsArticle>> {
        let articles = self.get_market_news("general").await?;
        Ok(articles.into_iter().take(limit).map(NewsArticle::from).collect())
    }
}
