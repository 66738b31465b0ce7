//! Quote source that tries providers in order

use super::{Quote, QuoteSource};
use crate::error::{Result, TrackerError};
use async_trait::async_trait;
use std::sync::Arc;

/// Asks each provider in turn and returns the first usable quote
///
/// An invalid symbol from one provider does not stop the chain, since
/// providers disagree on ticker coverage.
pub struct FallbackQuoteSource {
    sources: Vec<Arc<dyn QuoteSource>>,
}

impl FallbackQuoteSource {
    pub fn new(sources: Vec<Arc<dyn QuoteSource>>) -> Self {
        Self { sources }
    }

    /// Primary source with an optional secondary
    pub fn with_fallback(primary: Arc<dyn QuoteSource>, secondary: Option<Arc<dyn QuoteSource>>) -> Self {
        Self::new(std::iter::once(primary).chain(secondary).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl QuoteSource for FallbackQuoteSource {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn quote(&self, symbol: &str) -> Result<Quote> {
        let mut last_error = None;

        for source in &self.sources {
            match source.quote(symbol).await {
                Ok(quote) if quote.price > 0.0 => return Ok(quote),
                Ok(_) => {
                    tracing::warn!(symbol, provider = source.name(), "quote without price");
                    last_error = Some(TrackerError::unavailable(symbol, "quote without price"));
                }
                Err(e) => {
                    tracing::warn!(symbol, provider = source.name(), error = %e, "quote failed, trying next provider");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| TrackerError::unavailable(symbol, "no quote providers configured")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockQuoteSource;
    use crate::api::testing::quote;

    fn failing(name: &'static str) -> MockQuoteSource {
        let mut source = MockQuoteSource::new();
        source.expect_name().return_const(name);
        source
            .expect_quote()
            .returning(|_| Err(TrackerError::rate_limited("Alpha Vantage")));
        source
    }

    #[tokio::test]
    async fn test_falls_back_to_secondary() {
        let mut secondary = MockQuoteSource::new();
        secondary.expect_name().return_const("Finnhub");
        secondary
            .expect_quote()
            .times(1)
            .returning(|s| Ok(quote(s, 101.0, 1.0)));

        let chain = FallbackQuoteSource::with_fallback(
            Arc::new(failing("Alpha Vantage")),
            Some(Arc::new(secondary)),
        );

        let q = chain.quote("AAPL").await.unwrap();
        assert_eq!(q.price, 101.0);
    }

    #[tokio::test]
    async fn test_primary_success_skips_secondary() {
        let mut primary = MockQuoteSource::new();
        primary.expect_name().return_const("Alpha Vantage");
        primary.expect_quote().returning(|s| Ok(quote(s, 50.0, 0.0)));

        let mut secondary = MockQuoteSource::new();
        secondary.expect_quote().never();

        let chain = FallbackQuoteSource::new(vec![Arc::new(primary), Arc::new(secondary)]);
        assert_eq!(chain.quote("MSFT").await.unwrap().price, 50.0);
    }

    #[tokio::test]
    async fn test_all_failing_returns_last_error() {
        let chain = FallbackQuoteSource::new(vec![Arc::new(failing("a")), Arc::new(failing("b"))]);
        assert!(matches!(
            chain.quote("AAPL").await,
            Err(TrackerError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let chain = FallbackQuoteSource::new(vec![]);
        assert!(chain.is_empty());
        assert!(matches!(
            chain.quote("AAPL").await,
            Err(TrackerError::DataUnavailable { .. })
        ));
    }
}
