//! Error types for portfolio tracking operations

use thiserror::Error;

/// Portfolio tracker errors
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Provider answered with an error payload
    #[error("{provider} API error: {message}")]
    Api { provider: String, message: String },

    /// Provider answered with a non-success HTTP status
    #[error("{provider} returned HTTP {status}")]
    Http { provider: String, status: u16 },

    /// Rate limit exceeded for API
    #[error("Rate limit exceeded for {provider}")]
    RateLimited { provider: String },

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Portfolio file or holding error
    #[error("Portfolio error: {0}")]
    Store(String),

    /// Data not available for the requested symbol
    #[error("Data not available for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// Invalid stock symbol provided
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Technical indicator calculation error
    #[error("Technical indicator error: {0}")]
    Indicator(String),

    /// Message delivery failed
    #[error("Notification error: {0}")]
    Notification(String),

    /// Scorer rejected its inputs
    #[error(transparent)]
    Scoring(#[from] portfolio_core::ScoreError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl TrackerError {
    pub(crate) fn api(provider: &str, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn rate_limited(provider: &str) -> Self {
        Self::RateLimited {
            provider: provider.to_string(),
        }
    }

    pub(crate) fn unavailable(symbol: &str, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether a retry could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimited { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias for tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;
