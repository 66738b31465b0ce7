//! In-memory TTL caches that keep provider calls under free-tier quotas

use cached::{Cached, TimedCache};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::TrackerConfig;
use crate::error::Result;

/// Cache key for provider requests
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Stock symbol, or a pseudo-symbol such as `MARKET`
    pub symbol: String,
    /// Provider operation
    pub endpoint: String,
    /// Additional parameters as JSON string
    pub params: String,
}

impl CacheKey {
    pub fn new(symbol: impl Into<String>, endpoint: impl Into<String>, params: impl Serialize) -> Self {
        Self {
            symbol: symbol.into(),
            endpoint: endpoint.into(),
            params: serde_json::to_string(&params).unwrap_or_default(),
        }
    }
}

/// Thread-safe TTL cache of JSON values
#[derive(Clone)]
pub struct TtlCache {
    cache: Arc<RwLock<TimedCache<CacheKey, serde_json::Value>>>,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(RwLock::new(TimedCache::with_lifespan(ttl))),
        }
    }

    /// Get a value from the cache
    pub async fn get(&self, key: &CacheKey) -> Option<serde_json::Value> {
        // TimedCache evicts on read, so even lookups need the write lock
        let mut cache = self.cache.write().await;
        cache.cache_get(key).cloned()
    }

    pub async fn insert(&self, key: CacheKey, value: serde_json::Value) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_set(key, value);
    }

    /// Get or fetch a value using the provided fetcher function
    ///
    /// If the value exists in cache, it's returned immediately.
    /// Otherwise, the fetcher function is called and the result is cached.
    /// Failed fetches are not cached.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: CacheKey,
        fetcher: F,
    ) -> std::result::Result<serde_json::Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<serde_json::Value, E>>,
    {
        if let Some(value) = self.get(&key).await {
            tracing::debug!(?key, "cache hit");
            return Ok(value);
        }

        tracing::debug!(?key, "cache miss");

        let value = fetcher().await?;
        self.insert(key, value.clone()).await;

        Ok(value)
    }

    /// Typed variant of [`get_or_fetch`](Self::get_or_fetch)
    pub async fn get_or_fetch_as<T, F, Fut>(&self, key: CacheKey, fetcher: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if let Some(value) = self.get(&key).await {
            match serde_json::from_value(value) {
                Ok(typed) => {
                    tracing::debug!(?key, "cache hit");
                    return Ok(typed);
                }
                Err(e) => {
                    tracing::warn!(?key, error = %e, "dropping undecodable cache entry");
                    self.invalidate(&key).await;
                }
            }
        }

        tracing::debug!(?key, "cache miss");

        let typed = fetcher().await?;
        self.insert(key, serde_json::to_value(&typed)?).await;

        Ok(typed)
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_remove(key);
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.cache_clear();
    }

    /// Number of stored entries, expired ones included until next touched
    pub async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.cache_size()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// One cache per data kind, each with its own lifetime
#[derive(Clone)]
pub struct CacheManager {
    /// Live quotes
    pub quotes: TtlCache,
    /// Daily price series used for indicators
    pub history: TtlCache,
    /// Company and market news
    pub news: TtlCache,
    /// Aggregated market mood
    pub market_mood: TtlCache,
}

impl CacheManager {
    pub fn new(quotes_ttl: Duration, history_ttl: Duration, news_ttl: Duration, mood_ttl: Duration) -> Self {
        Self {
            quotes: TtlCache::new(quotes_ttl),
            history: TtlCache::new(history_ttl),
            news: TtlCache::new(news_ttl),
            market_mood: TtlCache::new(mood_ttl),
        }
    }

    /// Quotes 5 min, history 1 h, news 1 h, market mood 30 min
    pub fn default_config() -> Self {
        Self::new(
            Duration::from_secs(300),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            Duration::from_secs(1800),
        )
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(
            config.cache_ttl_quotes,
            config.cache_ttl_history,
            config.cache_ttl_news,
            config.cache_ttl_market_mood,
        )
    }

    pub async fn clear_all(&self) {
        self.quotes.clear().await;
        self.history.clear().await;
        self.news.clear().await;
        self.market_mood.clear().await;
    }
}
