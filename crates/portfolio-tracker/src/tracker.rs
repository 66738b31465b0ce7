//! Daily tracking run and system self-test

use crate::analysis::{
    IndicatorParams, PortfolioAnalyzer, PortfolioRecommendations, PortfolioReport, RecommendationEngine,
    SentimentAnalyzer, TechnicalAnalyzer,
};
use crate::api::{
    AlphaVantageClient, FallbackQuoteSource, FinnhubClient, MarketAuxClient, NewsSource, PriceHistorySource,
    QuoteSource,
};
use crate::cache::CacheManager;
use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::notify::{ConsoleNotifier, Formatter, FormatterFactory, Notifier, TelegramNotifier};
use crate::settings::Settings;
use crate::store::{Portfolio, PortfolioStore};
use chrono::{DateTime, Utc};
use portfolio_core::RecommendationScorer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Summary delivered but recommendations failed
    Partial,
    EmptyPortfolio,
}

/// Outcome of one daily run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub holdings: usize,
    pub total_value: f64,
    pub alerts: usize,
    /// Non-HOLD stock recommendations
    pub actionable: usize,
    pub messages_sent: usize,
    pub errors: Vec<String>,
}

impl RunSummary {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            status: RunStatus::Completed,
            started_at: now,
            finished_at: now,
            holdings: 0,
            total_value: 0.0,
            alerts: 0,
            actionable: 0,
            messages_sent: 0,
            errors: Vec::new(),
        }
    }
}

/// Result of [`DailyTracker::check`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemCheck {
    pub holdings: Option<usize>,
    /// Symbol and price of the probe quote
    pub quote: Option<(String, f64)>,
    /// Account the notifier is connected to
    pub notifier: Option<String>,
    pub test_message_sent: bool,
    pub errors: Vec<String>,
}

impl SystemCheck {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Loads the portfolio, analyzes it and delivers the daily update
pub struct DailyTracker {
    store: PortfolioStore,
    analyzer: PortfolioAnalyzer,
    engine: Option<RecommendationEngine>,
    notifier: Arc<dyn Notifier>,
    formatter: Box<dyn Formatter>,
    save_prices: bool,
}

impl DailyTracker {
    /// `engine` is `None` when recommendations are disabled
    pub fn new(
        store: PortfolioStore,
        analyzer: PortfolioAnalyzer,
        engine: Option<RecommendationEngine>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let formatter = FormatterFactory::create(notifier.channel());
        Self {
            store,
            analyzer,
            engine,
            notifier,
            formatter,
            save_prices: true,
        }
    }

    /// Wire providers, analyzers and the notifier from configuration
    ///
    /// Without Telegram credentials, messages go to stdout.
    pub fn from_config(config: &TrackerConfig, settings: &Settings) -> Result<Self> {
        let http = config.http_client()?;
        let retry = config.retry_policy();
        let cache = CacheManager::from_config(config);

        let alpha_vantage = config.alpha_vantage_api_key.as_ref().map(|key| {
            Arc::new(
                AlphaVantageClient::new(key.clone(), config.alpha_vantage_rate_limit)
                    .with_http_client(http.clone())
                    .with_retry(retry.clone()),
            )
        });
        let finnhub = config.finnhub_api_key.as_ref().map(|key| {
            Arc::new(
                FinnhubClient::new(key.clone(), config.finnhub_rate_limit)
                    .with_http_client(http.clone())
                    .with_retry(retry.clone()),
            )
        });
        let marketaux = config.marketaux_api_key.as_ref().map(|key| {
            Arc::new(
                MarketAuxClient::new(key.clone(), config.marketaux_rate_limit)
                    .with_http_client(http.clone())
                    .with_retry(retry.clone()),
            )
        });

        let mut quote_sources: Vec<Arc<dyn QuoteSource>> = Vec::new();
        if let Some(av) = &alpha_vantage {
            quote_sources.push(av.clone());
        }
        if let Some(fh) = &finnhub {
            quote_sources.push(fh.clone());
        }
        if quote_sources.is_empty() {
            return Err(TrackerError::Config(
                "set ALPHA_VANTAGE_API_KEY or FINNHUB_API_KEY for price data".to_string(),
            ));
        }

        let analyzer = PortfolioAnalyzer::new(
            Arc::new(FallbackQuoteSource::new(quote_sources)),
            cache.quotes.clone(),
        )
        .with_alert_threshold(settings.alerts.price_threshold);

        let engine = match (&alpha_vantage, settings.alerts.enable_recommendations) {
            (_, false) => None,
            (None, true) => {
                tracing::warn!("recommendations need ALPHA_VANTAGE_API_KEY for price history, skipping");
                None
            }
            (Some(av), true) => {
                let history: Arc<dyn PriceHistorySource> = av.clone();
                let technical = TechnicalAnalyzer::new(
                    history,
                    cache.history.clone(),
                    IndicatorParams::from(&settings.technical_analysis),
                );
                let primary = marketaux.map(|m| m as Arc<dyn NewsSource>);
                let fallback = finnhub.map(|f| f as Arc<dyn NewsSource>);
                let sentiment = SentimentAnalyzer::new(primary, fallback, cache.clone())
                    .with_label_threshold(settings.news.sentiment_threshold);
                let scorer = RecommendationScorer::new(settings.scorer_config())?;
                Some(RecommendationEngine::new(technical, sentiment, scorer))
            }
        };

        let notifier: Arc<dyn Notifier> = if config.telegram_bot_token.is_some() {
            Arc::new(TelegramNotifier::from_config(config)?)
        } else {
            tracing::warn!("Telegram not configured, printing messages to stdout");
            Arc::new(ConsoleNotifier)
        };

        Ok(Self::new(
            PortfolioStore::new(&config.portfolio_file),
            analyzer,
            engine,
            notifier,
        ))
    }

    /// Keep live prices in the portfolio file after a run (default on)
    pub fn with_save_prices(mut self, save: bool) -> Self {
        self.save_prices = save;
        self
    }

    /// Replace the notifier and switch to its channel's formatter
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.formatter = FormatterFactory::create(notifier.channel());
        self.notifier = notifier;
        self
    }

    pub fn with_formatter(mut self, formatter: Box<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn store(&self) -> &PortfolioStore {
        &self.store
    }

    pub fn analyzer(&self) -> &PortfolioAnalyzer {
        &self.analyzer
    }

    /// Value the portfolio and, when enabled, generate recommendations without sending anything
    pub async fn analyze(&self, portfolio: &Portfolio) -> (PortfolioReport, Option<Result<PortfolioRecommendations>>) {
        let report = self.analyzer.report(portfolio).await;
        let recs = match &self.engine {
            Some(engine) => Some(engine.recommend(&report.valuation).await),
            None => None,
        };
        (report, recs)
    }

    /// Run the daily update
    ///
    /// Fails only when the portfolio cannot be loaded or no message could be
    /// delivered; other problems are recorded in the summary.
    pub async fn run(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::start();
        tracing::info!("starting daily portfolio run");

        let portfolio = match self.store.load().await {
            Ok(p) => p,
            Err(e) => {
                let text = self.formatter.format_error(&format!("Could not load portfolio: {e}"));
                if let Err(send_err) = self.notifier.send_message(&text).await {
                    tracing::error!(error = %send_err, "failed to report load error");
                }
                return Err(e);
            }
        };

        if portfolio.is_empty() {
            tracing::warn!(path = %self.store.path().display(), "portfolio has no holdings");
            summary.status = RunStatus::EmptyPortfolio;
            let text = self.formatter.format_error(&format!(
                "Portfolio is empty. Add holdings to {} to start tracking.",
                self.store.path().display()
            ));
            self.deliver(&text, &mut summary).await;
            return self.finish(summary);
        }

        let (report, recs) = self.analyze(&portfolio).await;
        summary.holdings = report.valuation.positions.len();
        summary.total_value = report.valuation.total_portfolio_value;
        summary.alerts = report.alerts.len();

        if self.save_prices {
            self.save_live_prices(portfolio, &report, &mut summary).await;
        }

        let (recs, recs_error) = match recs {
            Some(Ok(r)) => (Some(r), None),
            Some(Err(e)) => {
                tracing::error!(error = %e, "recommendation generation failed");
                summary.status = RunStatus::Partial;
                summary.errors.push(format!("recommendations: {e}"));
                (None, Some(e))
            }
            None => (None, None),
        };

        let text = self.formatter.format_daily_summary(&report, recs.as_ref());
        self.deliver(&text, &mut summary).await;

        if !report.alerts.is_empty() {
            let text = self.formatter.format_alerts(&report.alerts);
            self.deliver(&text, &mut summary).await;
        }

        if let Some(recs) = &recs {
            summary.actionable = recs
                .stocks
                .iter()
                .filter(|s| s.recommendation.is_actionable())
                .count();
            let text = self.formatter.format_recommendations(recs);
            self.deliver(&text, &mut summary).await;
        } else if let Some(e) = recs_error {
            let text = self
                .formatter
                .format_error(&format!("Recommendations unavailable today: {e}"));
            self.deliver(&text, &mut summary).await;
        }

        self.finish(summary)
    }

    /// Check portfolio file, market data and notifier in turn
    pub async fn check(&self) -> SystemCheck {
        let mut check = SystemCheck::default();

        let probe = match self.store.load().await {
            Ok(portfolio) => {
                check.holdings = Some(portfolio.stocks.len());
                portfolio
                    .symbols()
                    .next()
                    .map(str::to_string)
                    .unwrap_or_else(|| portfolio.settings.benchmark.clone())
            }
            Err(e) => {
                check.errors.push(format!("portfolio: {e}"));
                "VOO".to_string()
            }
        };

        match self.analyzer.quote(&probe).await {
            Ok(quote) => check.quote = Some((quote.symbol, quote.price)),
            Err(e) => check.errors.push(format!("market data ({probe}): {e}")),
        }

        match self.notifier.test_connection().await {
            Ok(account) => {
                check.notifier = Some(account);
                match self.notifier.send_message(&self.formatter.format_test_message()).await {
                    Ok(()) => check.test_message_sent = true,
                    Err(e) => check.errors.push(format!("test message: {e}")),
                }
            }
            Err(e) => check.errors.push(format!("{}: {e}", self.notifier.name())),
        }

        if check.passed() {
            tracing::info!("system check passed");
        } else {
            tracing::warn!(errors = check.errors.len(), "system check failed");
        }
        check
    }

    async fn deliver(&self, text: &str, summary: &mut RunSummary) {
        match self.notifier.send_message(text).await {
            Ok(()) => summary.messages_sent += 1,
            Err(e) => {
                tracing::error!(notifier = self.notifier.name(), error = %e, "failed to send message");
                summary.errors.push(format!("{}: {e}", self.notifier.name()));
            }
        }
    }

    async fn save_live_prices(&self, mut portfolio: Portfolio, report: &PortfolioReport, summary: &mut RunSummary) {
        let saved = match report.valuation.apply_prices(&mut portfolio) {
            Ok(0) => return,
            Ok(_) => self.store.save(&portfolio).await,
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            tracing::warn!(error = %e, "could not save live prices");
            summary.errors.push(format!("save prices: {e}"));
        }
    }

    fn finish(&self, mut summary: RunSummary) -> Result<RunSummary> {
        summary.finished_at = Utc::now();
        if summary.messages_sent == 0 {
            return Err(TrackerError::Notification(format!(
                "no messages delivered: {}",
                summary.errors.join("; ")
            )));
        }
        tracing::info!(
            status = ?summary.status,
            holdings = summary.holdings,
            alerts = summary.alerts,
            actionable = summary.actionable,
            messages = summary.messages_sent,
            "daily run finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{article, bars, quote};
    use crate::api::{MockNewsSource, MockPriceHistorySource, MockQuoteSource};
    use crate::cache::TtlCache;
    use crate::notify::{Channel, MockNotifier};
    use crate::store::Holding;
    use std::sync::Mutex;
    use std::time::Duration;

    fn quotes() -> Arc<MockQuoteSource> {
        let mut source = MockQuoteSource::new();
        source.expect_name().return_const("test");
        source.expect_quote().returning(|symbol| match symbol {
            "AAPL" => Ok(quote("AAPL", 120.0, 6.0)),
            "MSFT" => Ok(quote("MSFT", 300.0, 0.5)),
            "VOO" => Ok(quote("VOO", 400.0, 0.2)),
            other => Err(TrackerError::InvalidSymbol(other.to_string())),
        });
        Arc::new(source)
    }

    fn analyzer() -> PortfolioAnalyzer {
        PortfolioAnalyzer::new(quotes(), TtlCache::new(Duration::from_secs(60)))
    }

    fn engine(history_ok: bool) -> RecommendationEngine {
        let mut history = MockPriceHistorySource::new();
        history.expect_daily_closes().returning(move |symbol| {
            if history_ok {
                Ok(bars(100.0, 0.2, 80))
            } else {
                Err(TrackerError::unavailable(symbol, "no data"))
            }
        });
        let mut news = MockNewsSource::new();
        news.expect_name().return_const("news");
        news.expect_provides_sentiment().return_const(true);
        news.expect_company_news()
            .returning(|_, _| Ok(vec![article("Solid quarter", &[0.3])]));
        news.expect_market_news().returning(|_| Ok(vec![]));

        RecommendationEngine::new(
            TechnicalAnalyzer::new(
                Arc::new(history),
                TtlCache::new(Duration::from_secs(60)),
                IndicatorParams::default(),
            ),
            SentimentAnalyzer::new(Some(Arc::new(news)), None, CacheManager::default_config()),
            RecommendationScorer::default(),
        )
    }

    /// Notifier that records every message
    fn recorder(fail: bool) -> (Arc<MockNotifier>, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&sent);
        let mut notifier = MockNotifier::new();
        notifier.expect_name().return_const("mock");
        notifier.expect_channel().return_const(Channel::Cli);
        notifier.expect_send_message().returning(move |text| {
            if fail {
                return Err(TrackerError::Notification("down".to_string()));
            }
            log.lock().unwrap().push(text.to_string());
            Ok(())
        });
        notifier
            .expect_test_connection()
            .returning(|| Ok("@tracker_bot".to_string()));
        (Arc::new(notifier), sent)
    }

    async fn store_with_holdings(dir: &tempfile::TempDir) -> PortfolioStore {
        let store = PortfolioStore::new(dir.path().join("portfolio.json"));
        let mut portfolio = Portfolio::default();
        portfolio.add_holding("AAPL", Holding::new(10.0, 100.0).unwrap()).unwrap();
        portfolio.add_holding("MSFT", Holding::new(2.0, 250.0).unwrap()).unwrap();
        portfolio.set_cash(1_000.0).unwrap();
        store.save(&portfolio).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_full_run() {
        let dir = tempfile::tempdir().unwrap();
        let (notifier, sent) = recorder(false);
        let tracker = DailyTracker::new(store_with_holdings(&dir).await, analyzer(), Some(engine(true)), notifier);

        let summary = tracker.run().await.unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.holdings, 2);
        assert_eq!(summary.alerts, 1);
        assert_eq!(summary.messages_sent, 3);
        assert_eq!(summary.total_value, 1_200.0 + 600.0 + 1_000.0);

        let sent = sent.lock().unwrap();
        assert!(sent[0].starts_with("Daily Portfolio Update"));
        assert!(sent[1].starts_with("Price Alerts"));
        assert!(sent[2].starts_with("Recommendations"));
    }

    #[tokio::test]
    async fn test_run_saves_live_prices() {
        let dir = tempfile::tempdir().unwrap();
        let (notifier, _) = recorder(false);
        let tracker = DailyTracker::new(store_with_holdings(&dir).await, analyzer(), None, notifier);

        tracker.run().await.unwrap();

        let saved = tracker.store().load().await.unwrap();
        assert_eq!(saved.stocks["AAPL"].current_price, Some(120.0));
        assert_eq!(saved.stocks["MSFT"].current_price, Some(300.0));
    }

    #[tokio::test]
    async fn test_recommendation_failure_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let (notifier, sent) = recorder(false);
        let tracker = DailyTracker::new(store_with_holdings(&dir).await, analyzer(), Some(engine(false)), notifier)
            .with_save_prices(false);

        let summary = tracker.run().await.unwrap();

        assert_eq!(summary.status, RunStatus::Partial);
        assert_eq!(summary.errors.len(), 1);
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].starts_with("Daily Portfolio Update"));
        assert!(sent[2].starts_with("Error: Recommendations unavailable today"));
    }

    #[tokio::test]
    async fn test_empty_portfolio_sends_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = PortfolioStore::new(dir.path().join("portfolio.json"));
        let (notifier, sent) = recorder(false);
        let tracker = DailyTracker::new(store, analyzer(), None, notifier);

        let summary = tracker.run().await.unwrap();

        assert_eq!(summary.status, RunStatus::EmptyPortfolio);
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Portfolio is empty"));
    }

    #[tokio::test]
    async fn test_undeliverable_run_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (notifier, _) = recorder(true);
        let tracker = DailyTracker::new(store_with_holdings(&dir).await, analyzer(), None, notifier);

        let err = tracker.run().await.unwrap_err();
        assert!(matches!(err, TrackerError::Notification(_)));
    }

    #[tokio::test]
    async fn test_check() {
        let dir = tempfile::tempdir().unwrap();
        let (notifier, sent) = recorder(false);
        let tracker = DailyTracker::new(store_with_holdings(&dir).await, analyzer(), None, notifier);

        let check = tracker.check().await;

        assert!(check.passed(), "{:?}", check.errors);
        assert_eq!(check.holdings, Some(2));
        assert_eq!(check.quote, Some(("AAPL".to_string(), 120.0)));
        assert_eq!(check.notifier.as_deref(), Some("@tracker_bot"));
        assert!(sent.lock().unwrap()[0].starts_with("Portfolio tracker test"));
    }

    #[tokio::test]
    async fn test_check_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let (notifier, _) = recorder(true);
        let mut source = MockQuoteSource::new();
        source
            .expect_quote()
            .returning(|s| Err(TrackerError::InvalidSymbol(s.to_string())));
        let analyzer = PortfolioAnalyzer::new(Arc::new(source), TtlCache::new(Duration::from_secs(60)));
        let tracker = DailyTracker::new(PortfolioStore::new(dir.path().join("p.json")), analyzer, None, notifier);

        let check = tracker.check().await;

        assert!(!check.passed());
        assert_eq!(check.holdings, Some(0));
        assert!(check.quote.is_none());
        assert!(!check.test_message_sent);
        assert_eq!(check.errors.len(), 2);
    }

    #[test]
    fn test_from_config_requires_price_provider() {
        let err = DailyTracker::from_config(&TrackerConfig::default(), &Settings::default()).err();
        assert!(matches!(err, Some(TrackerError::Config(_))));

        let config = TrackerConfig::builder().finnhub_api_key("key").build().unwrap();
        assert!(DailyTracker::from_config(&config, &Settings::default()).is_ok());
    }
}
