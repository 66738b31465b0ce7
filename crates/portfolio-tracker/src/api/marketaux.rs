//! MarketAux client for scored financial news

use super::{NewsArticle, NewsSource, SharedRateLimiter, per_minute_limiter};
use crate::error::{Result, TrackerError};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

const BASE_URL: &str = "https://api.marketaux.com/v1";
const PROVIDER: &str = "MarketAux";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketAuxEntity {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sentiment_score: Option<f64>,
    #[serde(default)]
    pub match_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketAuxArticle {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub entities: Vec<MarketAuxEntity>,
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    data: Vec<MarketAuxArticle>,
}

impl From<MarketAuxArticle> for NewsArticle {
    fn from(article: MarketAuxArticle) -> Self {
        let published_at = article
            .published_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc));

        let symbols = article
            .entities
            .iter()
            .filter_map(|e| e.symbol.as_deref())
            .map(str::to_uppercase)
            .collect();

        let entity_sentiments = article
            .entities
            .iter()
            .filter_map(|e| e.sentiment_score)
            .filter(|s| s.is_finite())
            .collect();

        NewsArticle {
            title: article.title,
            description: article.description.filter(|d| !d.is_empty()),
            url: article.url,
            source: article.source,
            published_at,
            symbols,
            entity_sentiments,
        }
    }
}

/// MarketAux API client
#[derive(Debug, Clone)]
pub struct MarketAuxClient {
    client: Client,
    api_token: String,
    base_url: String,
    rate_limiter: SharedRateLimiter,
    retry: RetryPolicy,
}

impl MarketAuxClient {
    /// # Arguments
    /// * `api_token` - MarketAux API token
    /// * `rate_limit` - Requests per minute
    pub fn new(api_token: impl Into<String>, rate_limit: u32) -> Self {
        Self {
            client: Client::new(),
            api_token: api_token.into(),
            base_url: BASE_URL.to_string(),
            rate_limiter: per_minute_limiter(rate_limit),
            retry: RetryPolicy::default(),
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

    /// Entity-filtered English news mentioning any of `symbols`
    pub async fn get_news_by_symbols(&self, symbols: &[&str], limit: usize) -> Result<Vec<MarketAuxArticle>> {
        let symbols = symbols.join(",");
        let limit = limit.to_string();
        self.news(&[
            ("symbols", symbols.as_str()),
            ("filter_entities", "true"),
            ("language", "en"),
            ("limit", limit.as_str()),
        ])
        .await
    }

    /// Market news ranked by entity match score
    pub async fn get_trending_news(&self, limit: usize) -> Result<Vec<MarketAuxArticle>> {
        let limit = limit.to_string();
        self.news(&[
            ("language", "en"),
            ("limit", limit.as_str()),
            ("sort", "entity_match_score"),
            ("filter_entities", "true"),
        ])
        .await
    }

    async fn news(&self, params: &[(&str, &str)]) -> Result<Vec<MarketAuxArticle>> {
        self.retry.execute(PROVIDER, || self.send(params)).await
    }

    async fn send(&self, params: &[(&str, &str)]) -> Result<Vec<MarketAuxArticle>> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(format!("{}/news/all", self.base_url))
            .query(params)
            .query(&[("api_token", self.api_token.as_str())])
            .send()
            .await?;

        let status = response.status();
        // 402 is the daily request cap on free plans
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::PAYMENT_REQUIRED {
            return Err(TrackerError::rate_limited(PROVIDER));
        }
        if !status.is_success() {
            return Err(TrackerError::Http {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
            });
        }

        let data: serde_json::Value = response.json().await?;
        parse_news_response(&data)
    }
}

pub(crate) fn parse_news_response(data: &serde_json::Value) -> Result<Vec<MarketAuxArticle>> {
    if let Some(error) = data.get("error") {
        let message = error
            .get("message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown error");
        return Err(TrackerError::api(PROVIDER, message));
    }
    let response: NewsResponse = serde_json::from_value(data.clone())?;
    Ok(response.data)
}

#[async_trait]
impl NewsSource for MarketAuxClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn provides_sentiment(&self) -> bool {
        true
    }

    async fn company_news(&self, symbol: &str, limit: usize) -> Result<Vec<NewsArticle>> {
        let articles = self.get_news_by_symbols(&[symbol], limit).await?;
        Ok(articles.into_iter().map(NewsArticle::from).collect())
    }

    async fn market_news(&self, limit: usize) -> Result<Vec<NewsArticle>> {
        let articles = self.get_trending_news(limit).await?;
        Ok(articles.into_iter().map(NewsArticle::from).collect())
    }
}
