//! News sentiment per holding and for the market as a whole

use crate::api::{NewsArticle, NewsSource};
use crate::cache::{CacheKey, CacheManager};
use crate::error::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use portfolio_core::SentimentScore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Articles fetched per symbol
const COMPANY_NEWS_LIMIT: usize = 20;
/// Articles that contribute to a symbol's score
const SCORED_ARTICLES: usize = 10;
const RECENT_NEWS: usize = 3;
const TITLE_MAX_CHARS: usize = 100;
const MARKET_NEWS_LIMIT: usize = 20;
const MAX_TOPICS: usize = 5;
const MAX_HIGHLIGHTS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn from_score(score: f64, threshold: f64) -> Self {
        if score > threshold {
            Self::Positive
        } else if score < -threshold {
            Self::Negative
        } else {
            Self::Neutral
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketMood {
    Bullish,
    Optimistic,
    #[default]
    Neutral,
    Pessimistic,
    Bearish,
}

impl MarketMood {
    pub fn from_score(score: f64) -> Self {
        if score > 0.3 {
            Self::Bullish
        } else if score > 0.1 {
            Self::Optimistic
        } else if score < -0.3 {
            Self::Bearish
        } else if score < -0.1 {
            Self::Pessimistic
        } else {
            Self::Neutral
        }
    }

    pub fn is_negative(self) -> bool {
        matches!(self, Self::Pessimistic | Self::Bearish)
    }
}

impl fmt::Display for MarketMood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bullish => "bullish",
            Self::Optimistic => "optimistic",
            Self::Neutral => "neutral",
            Self::Pessimistic => "pessimistic",
            Self::Bearish => "bearish",
        })
    }
}

/// Theme detected in a company headline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsTheme {
    Earnings,
    AnalystUpgrade,
    AnalystDowngrade,
    BusinessDevelopment,
}

impl NewsTheme {
    fn detect(title: &str) -> Vec<Self> {
        let title = title.to_lowercase();
        let has_any = |words: &[&str]| words.iter().any(|w| title.contains(w));

        let mut themes = Vec::new();
        if has_any(&["earnings", "revenue", "profit"]) {
            themes.push(Self::Earnings);
        }
        if has_any(&["upgrade", "buy", "target"]) {
            themes.push(Self::AnalystUpgrade);
        }
        if has_any(&["downgrade", "sell", "cut"]) {
            themes.push(Self::AnalystDowngrade);
        }
        if has_any(&["partnership", "deal", "contract"]) {
            themes.push(Self::BusinessDevelopment);
        }
        themes
    }
}

impl fmt::Display for NewsTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Earnings => "earnings",
            Self::AnalystUpgrade => "analyst upgrade",
            Self::AnalystDowngrade => "analyst downgrade",
            Self::BusinessDevelopment => "business development",
        })
    }
}

/// Topic detected in market-wide headlines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketTopic {
    MonetaryPolicy,
    Inflation,
    EarningsSeason,
    AiTechnology,
    Cryptocurrency,
}

impl MarketTopic {
    fn detect(title: &str) -> Vec<Self> {
        let title = title.to_lowercase();
        let words: Vec<&str> = title
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has_word = |w: &str| words.contains(&w);

        let mut topics = Vec::new();
        if has_word("fed") || has_word("fomc") || title.contains("interest rate") {
            topics.push(Self::MonetaryPolicy);
        }
        if title.contains("inflation") {
            topics.push(Self::Inflation);
        }
        if title.contains("earnings") {
            topics.push(Self::EarningsSeason);
        }
        if has_word("ai") || title.contains("artificial intelligence") {
            topics.push(Self::AiTechnology);
        }
        if title.contains("crypto") || title.contains("bitcoin") {
            topics.push(Self::Cryptocurrency);
        }
        topics
    }
}

impl fmt::Display for MarketTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MonetaryPolicy => "monetary policy",
            Self::Inflation => "inflation",
            Self::EarningsSeason => "earnings season",
            Self::AiTechnology => "AI technology",
            Self::Cryptocurrency => "cryptocurrency",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsHeadline {
    pub title: String,
    pub source: String,
    pub sentiment: SentimentLabel,
    pub published_at: Option<DateTime<Utc>>,
}

/// News sentiment for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSentiment {
    pub symbol: String,
    /// Mean of non-zero article scores; `None` when nothing was scored
    pub score: Option<f64>,
    pub label: SentimentLabel,
    /// 0..=1, grows with the number of scored articles
    pub confidence: f64,
    pub news_count: usize,
    pub recent_news: Vec<NewsHeadline>,
    pub key_themes: Vec<NewsTheme>,
}

impl StockSentiment {
    pub fn neutral(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            score: None,
            label: SentimentLabel::Neutral,
            confidence: 0.0,
            news_count: 0,
            recent_news: Vec::new(),
            key_themes: Vec::new(),
        }
    }

    /// Value handed to the recommendation scorer
    pub fn sentiment_score(&self) -> SentimentScore {
        SentimentScore::from(self.score)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSentiment {
    pub score: Option<f64>,
    pub label: SentimentLabel,
    pub mood: MarketMood,
    pub trending_topics: Vec<MarketTopic>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallSentiment {
    pub score: Option<f64>,
    pub label: SentimentLabel,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsHighlight {
    pub symbol: String,
    pub title: String,
    pub sentiment: SentimentLabel,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
    pub neutral: Vec<String>,
}

/// Sentiment across every holding plus the market backdrop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSentiment {
    pub overall: OverallSentiment,
    pub stocks: BTreeMap<String, StockSentiment>,
    pub market: MarketSentiment,
    pub highlights: Vec<NewsHighlight>,
    pub summary: SentimentSummary,
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() > TITLE_MAX_CHARS {
        let cut: String = title.chars().take(TITLE_MAX_CHARS).collect();
        format!("{cut}...")
    } else {
        title.to_string()
    }
}

fn push_unique<T: PartialEq>(into: &mut Vec<T>, items: impl IntoIterator<Item = T>) {
    for item in items {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}

/// Aggregates scored news from a primary source with an unscored headline fallback
pub struct SentimentAnalyzer {
    primary: Option<Arc<dyn NewsSource>>,
    fallback: Option<Arc<dyn NewsSource>>,
    cache: CacheManager,
    label_threshold: f64,
}

impl SentimentAnalyzer {
    pub fn new(
        primary: Option<Arc<dyn NewsSource>>,
        fallback: Option<Arc<dyn NewsSource>>,
        cache: CacheManager,
    ) -> Self {
        Self {
            primary,
            fallback,
            cache,
            label_threshold: 0.1,
        }
    }

    /// |score| above which a label turns positive or negative
    pub fn with_label_threshold(mut self, threshold: f64) -> Self {
        self.label_threshold = threshold;
        self
    }

    /// Sentiment for one symbol; provider failures degrade to neutral
    pub async fn stock_sentiment(&self, symbol: &str) -> StockSentiment {
        let key = CacheKey::new(symbol, "stock_sentiment", ());
        let result: Result<StockSentiment> = self
            .cache
            .news
            .get_or_fetch_as(key, || async { Ok(self.fetch_stock_sentiment(symbol).await) })
            .await;
        result.unwrap_or_else(|_| StockSentiment::neutral(symbol))
    }

    async fn fetch_stock_sentiment(&self, symbol: &str) -> StockSentiment {
        let mut sentiment = StockSentiment::neutral(symbol);

        if let Some(primary) = &self.primary {
            match primary.company_news(symbol, COMPANY_NEWS_LIMIT).await {
                Ok(articles) => self.apply_articles(&mut sentiment, &articles),
                Err(e) => {
                    tracing::warn!(symbol, provider = primary.name(), error = %e, "news sentiment failed");
                }
            }
        }

        if sentiment.news_count == 0 {
            if let Some(fallback) = &self.fallback {
                match fallback.company_news(symbol, COMPANY_NEWS_LIMIT).await {
                    Ok(articles) => self.apply_articles(&mut sentiment, &articles),
                    Err(e) => {
                        tracing::warn!(symbol, provider = fallback.name(), error = %e, "news fallback failed");
                    }
                }
            }
        }

        tracing::debug!(
            symbol,
            score = ?sentiment.score,
            news_count = sentiment.news_count,
            "stock sentiment"
        );
        sentiment
    }

    fn apply_articles(&self, sentiment: &mut StockSentiment, articles: &[NewsArticle]) {
        if articles.is_empty() {
            return;
        }

        let top = &articles[..articles.len().min(SCORED_ARTICLES)];
        let scores: Vec<f64> = top
            .iter()
            .filter_map(NewsArticle::sentiment)
            .filter(|s| *s != 0.0)
            .collect();

        sentiment.news_count = articles.len();
        sentiment.recent_news = top
            .iter()
            .take(RECENT_NEWS)
            .map(|a| NewsHeadline {
                title: truncate_title(&a.title),
                source: a.source.clone(),
                sentiment: a
                    .sentiment()
                    .map(|s| SentimentLabel::from_score(s, self.label_threshold))
                    .unwrap_or_default(),
                published_at: a.published_at,
            })
            .collect();
        for article in top {
            push_unique(&mut sentiment.key_themes, NewsTheme::detect(&article.title));
        }

        if !scores.is_empty() {
            let avg = scores.iter().sum::<f64>() / scores.len() as f64;
            sentiment.score = Some(avg);
            sentiment.label = SentimentLabel::from_score(avg, self.label_threshold);
            sentiment.confidence = (scores.len() as f64 / SCORED_ARTICLES as f64).min(1.0);
        }
    }

    /// Market-wide mood from trending news
    pub async fn market_sentiment(&self) -> MarketSentiment {
        let key = CacheKey::new("MARKET", "market_sentiment", ());
        let result: Result<MarketSentiment> = self
            .cache
            .market_mood
            .get_or_fetch_as(key, || async { Ok(self.fetch_market_sentiment().await) })
            .await;
        result.unwrap_or_default()
    }

    async fn fetch_market_sentiment(&self) -> MarketSentiment {
        let mut market = MarketSentiment::default();

        let Some(source) = self.primary.as_ref().or(self.fallback.as_ref()) else {
            return market;
        };

        let articles = match source.market_news(MARKET_NEWS_LIMIT).await {
            Ok(articles) => articles,
            Err(e) => {
                tracing::warn!(provider = source.name(), error = %e, "market sentiment failed");
                return market;
            }
        };

        let scores: Vec<f64> = articles
            .iter()
            .flat_map(|a| a.entity_sentiments.iter().copied())
            .filter(|s| *s != 0.0)
            .collect();

        if !scores.is_empty() {
            let avg = scores.iter().sum::<f64>() / scores.len() as f64;
            market.score = Some(avg);
            market.label = SentimentLabel::from_score(avg, self.label_threshold);
            market.mood = MarketMood::from_score(avg);
        }

        for article in &articles {
            push_unique(&mut market.trending_topics, MarketTopic::detect(&article.title));
        }
        market.trending_topics.truncate(MAX_TOPICS);

        tracing::info!(score = ?market.score, mood = %market.mood, "market sentiment");
        market
    }

    /// Sentiment for every symbol, the market, and the aggregate
    pub async fn portfolio_sentiment(&self, symbols: &[String]) -> PortfolioSentiment {
        if symbols.is_empty() {
            return PortfolioSentiment::default();
        }

        tracing::info!(count = symbols.len(), "analyzing portfolio sentiment");

        let stocks: BTreeMap<String, StockSentiment> = stream::iter(symbols)
            .map(|symbol| async move { (symbol.clone(), self.stock_sentiment(symbol).await) })
            .buffered(4)
            .collect()
            .await;

        let market = self.market_sentiment().await;
        let overall = self.overall(&stocks);

        PortfolioSentiment {
            highlights: highlights(&stocks),
            summary: summarize(&stocks),
            overall,
            stocks,
            market,
        }
    }

    /// Confidence-weighted mean over scored symbols
    fn overall(&self, stocks: &BTreeMap<String, StockSentiment>) -> OverallSentiment {
        let scored: Vec<(f64, f64)> = stocks
            .values()
            .filter_map(|s| s.score.map(|score| (score, s.confidence)))
            .collect();

        if scored.is_empty() {
            return OverallSentiment::default();
        }

        let total_confidence: f64 = scored.iter().map(|(_, c)| c).sum();
        let (score, confidence) = if total_confidence > 0.0 {
            (
                scored.iter().map(|(s, c)| s * c).sum::<f64>() / total_confidence,
                total_confidence / scored.len() as f64,
            )
        } else {
            (scored.iter().map(|(s, _)| s).sum::<f64>() / scored.len() as f64, 0.5)
        };

        OverallSentiment {
            score: Some(score),
            label: SentimentLabel::from_score(score, self.label_threshold),
            confidence,
        }
    }
}

/// Non-neutral headlines, positive first
fn highlights(stocks: &BTreeMap<String, StockSentiment>) -> Vec<NewsHighlight> {
    let mut highlights: Vec<NewsHighlight> = stocks
        .values()
        .flat_map(|s| {
            s.recent_news
                .iter()
                .filter(|n| n.sentiment != SentimentLabel::Neutral)
                .map(|n| NewsHighlight {
                    symbol: s.symbol.clone(),
                    title: n.title.clone(),
                    sentiment: n.sentiment,
                    source: n.source.clone(),
                })
        })
        .collect();

    highlights.sort_by_key(|h| h.sentiment == SentimentLabel::Negative);
    highlights.truncate(MAX_HIGHLIGHTS);
    highlights
}

fn summarize(stocks: &BTreeMap<String, StockSentiment>) -> SentimentSummary {
    let mut summary = SentimentSummary::default();
    for (symbol, sentiment) in stocks {
        let bucket = match sentiment.label {
            SentimentLabel::Positive => &mut summary.positive,
            SentimentLabel::Negative => &mut summary.negative,
            SentimentLabel::Neutral => &mut summary.neutral,
        };
        bucket.push(symbol.clone());
    }
    summary
}
