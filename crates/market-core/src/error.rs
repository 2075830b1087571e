use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketError {
    /// A session date or named anchor could not be resolved from the fact table.
    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Timed out after {}ms during {operation}", .after.as_millis())]
    Timeout { operation: String, after: Duration },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MarketError {
    pub fn missing_anchor(table: &str, anchor: &str) -> Self {
        MarketError::Resolution(format!(
            "no trading session found for anchor '{}' in {}",
            anchor, table
        ))
    }

    /// Machine-readable code carried in error responses.
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::Resolution(_) => "RESOLUTION_ERROR",
            MarketError::Query(_) => "QUERY_ERROR",
            MarketError::Cache(_) | MarketError::Serialization(_) => "CACHE_ERROR",
            MarketError::Timeout { .. } => "TIMEOUT",
            MarketError::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

pub type MarketResult<T> = Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let missing = MarketError::missing_anchor("ticker_trade", "last_five");
        assert_eq!(missing.code(), "RESOLUTION_ERROR");
        assert_eq!(MarketError::Validation("bad".into()).code(), "VALIDATION_ERROR");

        let timeout = MarketError::Timeout {
            operation: "query".to_string(),
            after: Duration::from_millis(250),
        };
        assert_eq!(timeout.code(), "TIMEOUT");
        assert_eq!(timeout.to_string(), "Timed out after 250ms during query");
    }
}
