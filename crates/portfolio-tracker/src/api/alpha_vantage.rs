//! Alpha Vantage API client

use super::{DailyBar, PriceHistorySource, Quote, QuoteSource, SharedRateLimiter, parse_number, per_minute_limiter};
use crate::error::{Result, TrackerError};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER: &str = "Alpha Vantage";

/// Alpha Vantage API client
#[derive(Debug, Clone)]
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: SharedRateLimiter,
    retry: RetryPolicy,
}

impl AlphaVantageClient {
    /// Create a new Alpha Vantage client with API key and rate limit
    ///
    /// # Arguments
    /// * `api_key` - Alpha Vantage API key
    /// * `rate_limit` - Maximum requests per minute (5 on the free tier)
    pub fn new(api_key: impl Into<String>, rate_limit: u32) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
            rate_limiter: per_minute_limiter(rate_limit),
            retry: RetryPolicy::default(),
        }
    }

    /// Create from environment variable ALPHA_VANTAGE_API_KEY with the free-tier limit
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ALPHA_VANTAGE_API_KEY").map_err(|_| {
            TrackerError::Config("ALPHA_VANTAGE_API_KEY environment variable not set".to_string())
        })?;

        Ok(Self::new(api_key, 5))
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Get global quote (current price data)
    pub async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        let data = self.query(&[("function", "GLOBAL_QUOTE"), ("symbol", symbol)]).await?;
        parse_global_quote(symbol, &data)
    }

    /// Get daily time series data, oldest first
    ///
    /// `full` requests the complete history instead of the latest 100 bars.
    pub async fn get_daily(&self, symbol: &str, full: bool) -> Result<Vec<DailyBar>> {
        let outputsize = if full { "full" } else { "compact" };
        let data = self
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", symbol),
                ("outputsize", outputsize),
            ])
            .await?;
        parse_daily_series(symbol, &data)
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<Value> {
        self.retry.execute(PROVIDER, || self.send(params)).await
    }

    async fn send(&self, params: &[(&str, &str)]) -> Result<Value> {
        // Wait for rate limiter
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(&self.base_url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::Http {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
            });
        }

        let data: Value = response.json().await?;
        check_api_errors(&data)?;
        Ok(data)
    }
}

/// Alpha Vantage reports errors inside a 200 response
pub(crate) fn check_api_errors(data: &Value) -> Result<()> {
    if let Some(error) = data.get("Error Message") {
        return Err(TrackerError::api(PROVIDER, error.as_str().unwrap_or_default()));
    }

    // "Note" is the per-minute throttle, "Information" the daily cap
    if data.get("Note").is_some() || data.get("Information").is_some() {
        return Err(TrackerError::rate_limited(PROVIDER));
    }

    Ok(())
}

pub(crate) fn parse_global_quote(symbol: &str, data: &Value) -> Result<Quote> {
    let quote = data
        .get("Global Quote")
        .and_then(Value::as_object)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| TrackerError::InvalidSymbol(symbol.to_string()))?;

    let price = parse_number(quote.get("05. price"))
        .filter(|p| *p > 0.0)
        .ok_or_else(|| TrackerError::unavailable(symbol, "quote has no price"))?;

    Ok(Quote {
        symbol: quote
            .get("01. symbol")
            .and_then(Value::as_str)
            .unwrap_or(symbol)
            .to_string(),
        price,
        change: parse_number(quote.get("09. change")).unwrap_or(0.0),
        change_percent: parse_number(quote.get("10. change percent")).unwrap_or(0.0),
        volume: parse_number(quote.get("06. volume")).map(|v| v as u64),
        open: parse_number(quote.get("02. open")),
        high: parse_number(quote.get("03. high")),
        low: parse_number(quote.get("04. low")),
        previous_close: parse_number(quote.get("08. previous close")),
        latest_trading_day: quote
            .get("07. latest trading day")
            .and_then(Value::as_str)
            .map(str::to_string),
        source: PROVIDER.to_string(),
    })
}

pub(crate) fn parse_daily_series(symbol: &str, data: &Value) -> Result<Vec<DailyBar>> {
    let series = data
        .get("Time Series (Daily)")
        .and_then(Value::as_object)
        .ok_or_else(|| TrackerError::unavailable(symbol, "no daily data found"))?;

    let mut bars: Vec<DailyBar> = series
        .iter()
        .filter_map(|(date, values)| {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
            Some(DailyBar {
                date,
                open: parse_number(values.get("1. open"))?,
                high: parse_number(values.get("2. high"))?,
                low: parse_number(values.get("3. low"))?,
                close: parse_number(values.get("4. close"))?,
                volume: parse_number(values.get("5. volume")).map_or(0, |v| v as u64),
            })
        })
        .collect();

    if bars.is_empty() {
        return Err(TrackerError::unavailable(symbol, "daily series is empty"));
    }

    bars.sort_by_key(|bar| bar.date);
    Ok(bars)
}

#[async_trait]
impl QuoteSource for AlphaVantageClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn quote(&self, symbol: &str) -> Result<Quote> {
        self.get_quote(symbol).await
    }
}

#[async_trait]
impl PriceHistorySource for AlphaVantageClient {
    async fn daily_closes(&self, symbol: &str) -> Result<Vec<DailyBar>> {
        self.get_daily(symbol, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_creation() {
        let client = AlphaVantageClient::new("test_key", 5);
        assert_eq!(client.api_key, "test_key");
        assert_eq!(client.base_url, BASE_URL);
    }

    #[test]
    fn test_parse_global_quote() {
        let data = json!({
            "Global Quote": {
                "01. symbol": "AAPL",
                "02. open": "189.0000",
                "03. high": "192.5000",
                "04. low": "188.1000",
                "05. price": "191.2400",
                "06. volume": "51234567",
                "07. latest trading day": "2024-05-10",
                "08. previous close": "182.0000",
                "09. change": "9.2400",
                "10. change percent": "5.0769%"
            }
        });

        let quote = parse_global_quote("AAPL", &data).unwrap();
        assert_eq!(quote.price, 191.24);
        assert_eq!(quote.change_percent, 5.0769);
        assert_eq!(quote.volume, Some(51_234_567));
        assert_eq!(quote.previous_close, Some(182.0));
        assert_eq!(quote.latest_trading_day.as_deref(), Some("2024-05-10"));
    }

    #[test]
    fn test_empty_quote_is_invalid_symbol() {
        let err = parse_global_quote("ZZZZ", &json!({"Global Quote": {}})).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidSymbol(s) if s == "ZZZZ"));
    }

    #[test]
    fn test_api_error_detection() {
        assert!(matches!(
            check_api_errors(&json!({"Error Message": "Invalid API call"})),
            Err(TrackerError::Api { .. })
        ));
        assert!(matches!(
            check_api_errors(&json!({"Note": "Thank you for using Alpha Vantage!"})),
            Err(TrackerError::RateLimited { .. })
        ));
        assert!(matches!(
            check_api_errors(&json!({"Information": "daily limit"})),
            Err(TrackerError::RateLimited { .. })
        ));
        assert!(check_api_errors(&json!({"Global Quote": {}})).is_ok());
    }

    #[test]
    fn test_parse_daily_series_sorted_oldest_first() {
        let data = json!({
            "Time Series (Daily)": {
                "2024-05-10": {"1. open": "10", "2. high": "11", "3. low": "9", "4. close": "10.5", "5. volume": "100"},
                "2024-05-08": {"1. open": "8", "2. high": "9", "3. low": "7", "4. close": "8.5", "5. volume": "100"},
                "2024-05-09": {"1. open": "9", "2. high": "10", "3. low": "8", "4. close": "9.5", "5. volume": "100"},
                "bogus": {"4. close": "1"}
            }
        });

        let bars = parse_daily_series("AAPL", &data).unwrap();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![8.5, 9.5, 10.5]);
    }

    #[test]
    fn test_missing_series_is_unavailable() {
        assert!(matches!(
            parse_daily_series("AAPL", &json!({})),
            Err(TrackerError::DataUnavailable { .. })
        ));
    }

    #[tokio::test]
    #[ignore] // Requires API key and network access
    async fn test_get_quote_live() {
        let client = AlphaVantageClient::from_env().unwrap();
        let quote = client.get_quote("AAPL").await.unwrap();
        assert!(quote.price > 0.0);
    }

    #[tokio::test]
    #[ignore] // Requires API key and network access
    async fn test_get_daily_live() {
        let client = AlphaVantageClient::from_env().unwrap();
        let data = client.get_daily("AAPL", false).await.unwrap();
        assert!(data.len() > 50);
    }
}
