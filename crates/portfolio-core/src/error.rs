//! Error types for recommendation scoring

use thiserror::Error;

/// Result type alias for portfolio-core
pub type Result<T> = std::result::Result<T, ScoreError>;

/// Error type for scoring operations
///
/// Malformed input is the only failure the scorer surfaces. Extreme but
/// well-formed numbers are clamped instead of rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    /// A required field is missing, non-finite or outside its domain
    #[error("Invalid input for {field}: {reason}")]
    InvalidInput {
        /// Name of the offending field
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },
}

impl ScoreError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}

/// Reject NaN and infinities for a named field
pub(crate) fn ensure_finite(field: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ScoreError::invalid(field, format!("expected a finite number, got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScoreError::invalid("shares", "must be >= 0, got -3");
        assert_eq!(err.to_string(), "Invalid input for shares: must be >= 0, got -3");
    }

    #[test]
    fn test_ensure_finite() {
        assert_eq!(ensure_finite("rsi", 42.0), Ok(42.0));
        assert!(ensure_finite("rsi", f64::NAN).is_err());
        assert!(ensure_finite("rsi", f64::INFINITY).is_err());
    }
}
