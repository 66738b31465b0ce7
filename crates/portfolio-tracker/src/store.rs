//! Portfolio document and its JSON file store

use crate::error::{Result, TrackerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One stock position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub shares: f64,
    pub avg_price: f64,
    pub total_invested: f64,
    /// Last price written by the tracker or entered by hand
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<f64>,
    #[serde(default)]
    pub notes: String,
}

impl Holding {
    pub fn new(shares: f64, avg_price: f64) -> Result<Self> {
        validate_amount("shares", shares)?;
        validate_amount("avg_price", avg_price)?;
        Ok(Self {
            shares,
            avg_price,
            total_invested: shares * avg_price,
            current_price: None,
            current_value: None,
            notes: String::new(),
        })
    }

    pub fn with_current_price(mut self, price: f64) -> Result<Self> {
        self.mark_price(price)?;
        Ok(self)
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Record a new market price
    pub fn mark_price(&mut self, price: f64) -> Result<()> {
        validate_amount("current_price", price)?;
        self.current_price = Some(price);
        self.current_value = Some(self.shares * price);
        Ok(())
    }

    /// Last known price, average cost when none recorded
    pub fn price(&self) -> f64 {
        self.current_price.unwrap_or(self.avg_price)
    }

    pub fn value(&self) -> f64 {
        self.shares * self.price()
    }

    pub fn gain_loss(&self) -> f64 {
        self.value() - self.total_invested
    }

    pub fn gain_loss_pct(&self) -> f64 {
        if self.total_invested > 0.0 {
            self.gain_loss() / self.total_invested * 100.0
        } else {
            0.0
        }
    }
}

/// Partial update applied by `Portfolio::update_holding`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HoldingUpdate {
    pub shares: Option<f64>,
    pub avg_price: Option<f64>,
    pub current_price: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cash {
    #[serde(default)]
    pub available: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for Cash {
    fn default() -> Self {
        Self {
            available: 0.0,
            currency: default_currency(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSettings {
    #[serde(default = "default_benchmark")]
    pub benchmark: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for PortfolioSettings {
    fn default() -> Self {
        Self {
            benchmark: default_benchmark(),
            currency: default_currency(),
        }
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_benchmark() -> String {
    "VOO".to_string()
}

/// Book totals computed from stored prices
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PortfolioTotals {
    pub invested: f64,
    pub value: f64,
    pub cash: f64,
    pub gain_loss: f64,
    pub gain_loss_pct: f64,
}

impl PortfolioTotals {
    /// Holdings plus cash
    pub fn net_worth(&self) -> f64 {
        self.value + self.cash
    }
}

/// The persisted portfolio document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    #[serde(default)]
    pub stocks: BTreeMap<String, Holding>,
    #[serde(default)]
    pub cash: Cash,
    #[serde(default)]
    pub settings: PortfolioSettings,
}

impl Portfolio {
    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.stocks.keys().map(String::as_str)
    }

    pub fn holding(&self, symbol: &str) -> Option<&Holding> {
        self.stocks.get(&normalize_symbol(symbol).ok()?)
    }

    /// Add a new position; fails if the symbol is already held
    pub fn add_holding(&mut self, symbol: &str, holding: Holding) -> Result<()> {
        let symbol = normalize_symbol(symbol)?;
        if self.stocks.contains_key(&symbol) {
            return Err(TrackerError::Store(format!(
                "{symbol} already exists, use update instead"
            )));
        }
        self.stocks.insert(symbol, holding);
        Ok(())
    }

    /// Insert or replace a position, returning the previous one
    pub fn upsert_holding(&mut self, symbol: &str, holding: Holding) -> Result<Option<Holding>> {
        let symbol = normalize_symbol(symbol)?;
        Ok(self.stocks.insert(symbol, holding))
    }

    /// Apply a partial update, recomputing invested amount and value
    pub fn update_holding(&mut self, symbol: &str, update: HoldingUpdate) -> Result<&Holding> {
        let symbol = normalize_symbol(symbol)?;
        let holding = self
            .stocks
            .get_mut(&symbol)
            .ok_or_else(|| TrackerError::Store(format!("{symbol} not found in portfolio")))?;

        let shares = update.shares.unwrap_or(holding.shares);
        let avg_price = update.avg_price.unwrap_or(holding.avg_price);
        validate_amount("shares", shares)?;
        validate_amount("avg_price", avg_price)?;

        let mut updated = Holding::new(shares, avg_price)?
            .with_notes(update.notes.unwrap_or_else(|| holding.notes.clone()));
        if let Some(price) = update.current_price.or(holding.current_price) {
            updated.mark_price(price)?;
        }
        *holding = updated;
        Ok(&*holding)
    }

    pub fn remove_holding(&mut self, symbol: &str) -> Result<Holding> {
        let symbol = normalize_symbol(symbol)?;
        self.stocks
            .remove(&symbol)
            .ok_or_else(|| TrackerError::Store(format!("{symbol} not found in portfolio")))
    }

    pub fn set_cash(&mut self, available: f64) -> Result<()> {
        validate_amount("cash", available)?;
        self.cash.available = available;
        Ok(())
    }

    pub fn totals(&self) -> PortfolioTotals {
        let invested: f64 = self.stocks.values().map(|h| h.total_invested).sum();
        let value: f64 = self.stocks.values().map(Holding::value).sum();
        let gain_loss = value - invested;
        PortfolioTotals {
            invested,
            value,
            cash: self.cash.available,
            gain_loss,
            gain_loss_pct: if invested > 0.0 { gain_loss / invested * 100.0 } else { 0.0 },
        }
    }
}

/// Trim and upper-case a ticker, rejecting anything that is not one
pub fn normalize_symbol(symbol: &str) -> Result<String> {
    let symbol = symbol.trim().to_uppercase();
    let valid = !symbol.is_empty()
        && symbol.len() <= 10
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if valid {
        Ok(symbol)
    } else {
        Err(TrackerError::InvalidSymbol(symbol))
    }
}

fn validate_amount(field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(TrackerError::Store(format!(
            "{field} must be a non-negative number, got {value}"
        )))
    }
}

/// Reads and writes the portfolio JSON file
#[derive(Debug, Clone)]
pub struct PortfolioStore {
    path: PathBuf,
}

impl PortfolioStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the portfolio
    ///
    /// A missing or unparsable file is replaced by an empty default portfolio,
    /// which is written back so the user has a template to edit.
    pub async fn load(&self) -> Result<Portfolio> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => match serde_json::from_str::<Portfolio>(&raw) {
                Ok(portfolio) => {
                    tracing::debug!(
                        path = %self.path.display(),
                        holdings = portfolio.stocks.len(),
                        "loaded portfolio"
                    );
                    Ok(portfolio)
                }
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "corrupt portfolio file, creating default");
                    self.create_default().await
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no portfolio file, creating default");
                self.create_default().await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the portfolio as pretty JSON via a temp file and rename
    pub async fn save(&self, portfolio: &Portfolio) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(portfolio)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), "saved portfolio");
        Ok(())
    }

    async fn create_default(&self) -> Result<Portfolio> {
        let portfolio = Portfolio::default();
        self.save(&portfolio).await?;
        Ok(portfolio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Portfolio {
        let mut portfolio = Portfolio::default();
        portfolio
            .add_holding("aapl", Holding::new(10.0, 150.0).unwrap())
            .unwrap();
        portfolio
            .add_holding(
                "MSFT",
                Holding::new(5.0, 300.0).unwrap().with_current_price(330.0).unwrap(),
            )
            .unwrap();
        portfolio.set_cash(1_000.0).unwrap();
        portfolio
    }

    #[test]
    fn test_symbols_are_normalized() {
        let portfolio = sample();
        assert!(portfolio.holding("AAPL").is_some());
        assert!(portfolio.holding(" aapl ").is_some());
        assert_eq!(portfolio.symbols().collect::<Vec<_>>(), vec!["AAPL", "MSFT"]);
        assert!(normalize_symbol("").is_err());
        assert!(normalize_symbol("BRK.B").is_ok());
        assert!(normalize_symbol("AA PL").is_err());
    }

    #[test]
    fn test_add_existing_fails() {
        let mut portfolio = sample();
        let err = portfolio
            .add_holding("AAPL", Holding::new(1.0, 1.0).unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_negative_amounts_rejected() {
        assert!(Holding::new(-1.0, 10.0).is_err());
        assert!(Holding::new(1.0, f64::NAN).is_err());
        assert!(sample().set_cash(-5.0).is_err());
    }

    #[test]
    fn test_update_recomputes_invested() {
        let mut portfolio = sample();
        let updated = portfolio
            .update_holding(
                "msft",
                HoldingUpdate {
                    shares: Some(10.0),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.total_invested, 3_000.0);
        assert_eq!(updated.current_price, Some(330.0));
        assert_eq!(updated.current_value, Some(3_300.0));
    }

    #[test]
    fn test_remove_missing_fails() {
        let mut portfolio = sample();
        assert!(portfolio.remove_holding("TSLA").is_err());
        assert_eq!(portfolio.remove_holding("aapl").unwrap().shares, 10.0);
    }

    #[test]
    fn test_totals() {
        let totals = sample().totals();
        assert_eq!(totals.invested, 3_000.0);
        // AAPL has no current price and is valued at cost
        assert_eq!(totals.value, 3_150.0);
        assert_eq!(totals.gain_loss, 150.0);
        assert_eq!(totals.gain_loss_pct, 5.0);
        assert_eq!(totals.net_worth(), 4_150.0);
    }

    #[test]
    fn test_reads_legacy_document() {
        let raw = r#"{
            "stocks": {"NVDA": {"shares": 2, "avg_price": 400, "total_invested": 800}},
            "settings": {"benchmark": "VOO", "currency": "USD"}
        }"#;
        let portfolio: Portfolio = serde_json::from_str(raw).unwrap();
        assert_eq!(portfolio.cash.available, 0.0);
        assert_eq!(portfolio.stocks["NVDA"].price(), 400.0);
    }

    #[tokio::test]
    async fn test_missing_file_creates_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = PortfolioStore::new(dir.path().join("data/portfolio.json"));

        let portfolio = store.load().await.unwrap();
        assert!(portfolio.is_empty());
        assert_eq!(portfolio.settings.benchmark, "VOO");
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        std::fs::write(&path, "{not json").unwrap();

        let portfolio = PortfolioStore::new(&path).load().await.unwrap();
        assert!(portfolio.is_empty());
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"stocks\""));
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = PortfolioStore::new(dir.path().join("portfolio.json"));
        let portfolio = sample();

        store.save(&portfolio).await.unwrap();
        assert_eq!(store.load().await.unwrap(), portfolio);
        assert!(!dir.path().join("portfolio.json.tmp").exists());
    }
}
