//! Error types for VaR estimation and stress testing

use chrono::NaiveDate;
use thiserror::Error;

/// Errors that can occur while preparing returns, estimating VaR or
/// applying stress scenarios
#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid parameter {parameter}: {reason}")]
    InvalidParameter { parameter: String, reason: String },

    #[error("Ill-conditioned input: {0}")]
    IllConditionedInput(String),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Invalid shock factor '{factor}': {reason}")]
    InvalidShockFactor { factor: String, reason: String },

    #[error("Missing price for asset {asset_id} on {date}")]
    MissingPrice { asset_id: String, date: NaiveDate },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scenario storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RiskError {
    pub(crate) fn invalid(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        RiskError::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        RiskError::DimensionMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    pub(crate) fn shock_factor(factor: impl Into<String>, reason: impl Into<String>) -> Self {
        RiskError::InvalidShockFactor {
            factor: factor.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RiskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_context() {
        let err = RiskError::mismatch("weights", 3, 2);
        assert_eq!(
            err.to_string(),
            "Dimension mismatch for weights: expected 3, got 2"
        );

        let err = RiskError::invalid("confidence_level", "must be in (0, 1), got 1.5");
        assert!(err.to_string().contains("confidence_level"));
        assert!(err.to_string().contains("1.5"));

        let err = RiskError::shock_factor("equities", "not a recognized shock factor");
        assert!(err.to_string().contains("'equities'"));
    }
}
