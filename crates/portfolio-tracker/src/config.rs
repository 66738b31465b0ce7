//! Runtime configuration for the tracker
//!
//! Credentials and file locations come from the environment (optionally a
//! `.env` file); everything else has a working default.

use crate::error::{Result, TrackerError};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_ALPHA_VANTAGE_API_KEY: &str = "ALPHA_VANTAGE_API_KEY";
pub const ENV_FINNHUB_API_KEY: &str = "FINNHUB_API_KEY";
pub const ENV_MARKETAUX_API_KEY: &str = "MARKETAUX_API_KEY";
pub const ENV_TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
pub const ENV_PORTFOLIO_FILE: &str = "PORTFOLIO_FILE";
pub const ENV_SETTINGS_FILE: &str = "SETTINGS_FILE";

/// Configuration for the portfolio tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub alpha_vantage_api_key: Option<String>,
    pub finnhub_api_key: Option<String>,
    pub marketaux_api_key: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,

    /// Portfolio JSON document
    pub portfolio_file: PathBuf,
    /// Analysis settings JSON document
    pub settings_file: PathBuf,

    pub cache_ttl_quotes: Duration,
    pub cache_ttl_history: Duration,
    pub cache_ttl_news: Duration,
    pub cache_ttl_market_mood: Duration,

    /// Maximum attempts per provider call
    pub max_retries: u32,
    /// Initial backoff duration for retries
    pub retry_backoff_base: Duration,
    pub request_timeout: Duration,

    /// Requests per minute
    pub alpha_vantage_rate_limit: u32,
    pub finnhub_rate_limit: u32,
    pub marketaux_rate_limit: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            alpha_vantage_api_key: None,
            finnhub_api_key: None,
            marketaux_api_key: None,
            telegram_bot_token: None,
            telegram_chat_id: None,
            portfolio_file: PathBuf::from("data/portfolio.json"),
            settings_file: PathBuf::from("config/settings.json"),
            cache_ttl_quotes: Duration::from_secs(300),        // 5 minutes
            cache_ttl_history: Duration::from_secs(3600),      // 1 hour
            cache_ttl_news: Duration::from_secs(3600),         // 1 hour
            cache_ttl_market_mood: Duration::from_secs(1800),  // 30 minutes
            max_retries: 3,
            retry_backoff_base: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            alpha_vantage_rate_limit: 5,
            finnhub_rate_limit: 60,
            marketaux_rate_limit: 30,
        }
    }
}

impl TrackerConfig {
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::default()
    }

    /// Load `.env` if present, then read credentials and paths from the environment
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut builder = TrackerConfig::builder();
        if let Some(key) = get(ENV_ALPHA_VANTAGE_API_KEY) {
            builder = builder.alpha_vantage_api_key(key);
        }
        if let Some(key) = get(ENV_FINNHUB_API_KEY) {
            builder = builder.finnhub_api_key(key);
        }
        if let Some(key) = get(ENV_MARKETAUX_API_KEY) {
            builder = builder.marketaux_api_key(key);
        }
        if let (Some(token), Some(chat_id)) = (get(ENV_TELEGRAM_BOT_TOKEN), get(ENV_TELEGRAM_CHAT_ID)) {
            builder = builder.telegram(token, chat_id);
        }
        if let Some(path) = get(ENV_PORTFOLIO_FILE) {
            builder = builder.portfolio_file(path);
        }
        if let Some(path) = get(ENV_SETTINGS_FILE) {
            builder = builder.settings_file(path);
        }
        builder.build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(TrackerError::Config(
                "max_retries must be greater than 0".to_string(),
            ));
        }

        if self.alpha_vantage_rate_limit == 0
            || self.finnhub_rate_limit == 0
            || self.marketaux_rate_limit == 0
        {
            return Err(TrackerError::Config(
                "provider rate limits must be greater than 0".to_string(),
            ));
        }

        if self.telegram_bot_token.is_some() != self.telegram_chat_id.is_some() {
            return Err(TrackerError::Config(
                "TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must be set together".to_string(),
            ));
        }

        Ok(())
    }

    /// Names of unset variables needed for a full daily run
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.alpha_vantage_api_key.is_none() {
            missing.push(ENV_ALPHA_VANTAGE_API_KEY);
        }
        if self.finnhub_api_key.is_none() {
            missing.push(ENV_FINNHUB_API_KEY);
        }
        if self.marketaux_api_key.is_none() {
            missing.push(ENV_MARKETAUX_API_KEY);
        }
        if self.telegram_bot_token.is_none() {
            missing.push(ENV_TELEGRAM_BOT_TOKEN);
        }
        if self.telegram_chat_id.is_none() {
            missing.push(ENV_TELEGRAM_CHAT_ID);
        }
        missing
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            self.retry_backoff_base,
            self.retry_backoff_base * 30,
            2.0,
        )
    }

    /// HTTP client shared by every provider
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .user_agent(concat!("portfolio-tracker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TrackerError::from)
    }
}

/// Builder for TrackerConfig
#[derive(Debug, Default)]
pub struct TrackerConfigBuilder {
    alpha_vantage_api_key: Option<String>,
    finnhub_api_key: Option<String>,
    marketaux_api_key: Option<String>,
    telegram: Option<(String, String)>,
    portfolio_file: Option<PathBuf>,
    settings_file: Option<PathBuf>,
    cache_ttl_quotes: Option<Duration>,
    cache_ttl_history: Option<Duration>,
    cache_ttl_news: Option<Duration>,
    max_retries: Option<u32>,
    retry_backoff_base: Option<Duration>,
    request_timeout: Option<Duration>,
}

impl TrackerConfigBuilder {
    pub fn alpha_vantage_api_key(mut self, key: impl Into<String>) -> Self {
        self.alpha_vantage_api_key = Some(key.into());
        self
    }

    pub fn finnhub_api_key(mut self, key: impl Into<String>) -> Self {
        self.finnhub_api_key = Some(key.into());
        self
    }

    pub fn marketaux_api_key(mut self, key: impl Into<String>) -> Self {
        self.marketaux_api_key = Some(key.into());
        self
    }

    /// Set the Telegram bot token and target chat
    pub fn telegram(mut self, bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        self.telegram = Some((bot_token.into(), chat_id.into()));
        self
    }

    pub fn portfolio_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.portfolio_file = Some(path.into());
        self
    }

    pub fn settings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_file = Some(path.into());
        self
    }

    pub fn cache_ttl_quotes(mut self, duration: Duration) -> Self {
        self.cache_ttl_quotes = Some(duration);
        self
    }

    pub fn cache_ttl_history(mut self, duration: Duration) -> Self {
        self.cache_ttl_history = Some(duration);
        self
    }

    pub fn cache_ttl_news(mut self, duration: Duration) -> Self {
        self.cache_ttl_news = Some(duration);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn retry_backoff_base(mut self, duration: Duration) -> Self {
        self.retry_backoff_base = Some(duration);
        self
    }

    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = Some(duration);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<TrackerConfig> {
        let defaults = TrackerConfig::default();
        let (telegram_bot_token, telegram_chat_id) = match self.telegram {
            Some((token, chat)) => (Some(token), Some(chat)),
            None => (None, None),
        };

        let config = TrackerConfig {
            alpha_vantage_api_key: self.alpha_vantage_api_key,
            finnhub_api_key: self.finnhub_api_key,
            marketaux_api_key: self.marketaux_api_key,
            telegram_bot_token,
            telegram_chat_id,
            portfolio_file: self.portfolio_file.unwrap_or(defaults.portfolio_file),
            settings_file: self.settings_file.unwrap_or(defaults.settings_file),
            cache_ttl_quotes: self.cache_ttl_quotes.unwrap_or(defaults.cache_ttl_quotes),
            cache_ttl_history: self.cache_ttl_history.unwrap_or(defaults.cache_ttl_history),
            cache_ttl_news: self.cache_ttl_news.unwrap_or(defaults.cache_ttl_news),
            cache_ttl_market_mood: defaults.cache_ttl_market_mood,
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_backoff_base: self.retry_backoff_base.unwrap_or(defaults.retry_backoff_base),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            alpha_vantage_rate_limit: defaults.alpha_vantage_rate_limit,
            finnhub_rate_limit: defaults.finnhub_rate_limit,
            marketaux_rate_limit: defaults.marketaux_rate_limit,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.alpha_vantage_rate_limit, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = TrackerConfig::builder()
            .max_retries(5)
            .request_timeout(Duration::from_secs(60))
            .portfolio_file("/tmp/p.json")
            .build()
            .unwrap();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.portfolio_file, PathBuf::from("/tmp/p.json"));
    }

    #[test]
    fn test_zero_retries_rejected() {
        assert!(TrackerConfig::builder().max_retries(0).build().is_err());
    }

    #[test]
    fn test_half_configured_telegram_rejected() {
        let config = TrackerConfig {
            telegram_bot_token: Some("token".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup() {
        let config = TrackerConfig::from_lookup(lookup(&[
            (ENV_ALPHA_VANTAGE_API_KEY, "av"),
            (ENV_FINNHUB_API_KEY, "  "),
            (ENV_TELEGRAM_BOT_TOKEN, "123:abc"),
            (ENV_TELEGRAM_CHAT_ID, "42"),
            (ENV_PORTFOLIO_FILE, "/tmp/p.json"),
        ]))
        .unwrap();

        assert_eq!(config.alpha_vantage_api_key.as_deref(), Some("av"));
        assert!(config.finnhub_api_key.is_none());
        assert_eq!(config.telegram_chat_id.as_deref(), Some("42"));
        assert_eq!(config.portfolio_file, PathBuf::from("/tmp/p.json"));
        assert_eq!(
            config.missing_credentials(),
            vec![ENV_FINNHUB_API_KEY, ENV_MARKETAUX_API_KEY]
        );
    }

    #[test]
    fn test_lone_chat_id_is_ignored() {
        let config = TrackerConfig::from_lookup(lookup(&[(ENV_TELEGRAM_CHAT_ID, "42")])).unwrap();
        assert!(config.telegram_chat_id.is_none());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = TrackerConfig::default().retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff, Duration::from_secs(1));
    }
}
