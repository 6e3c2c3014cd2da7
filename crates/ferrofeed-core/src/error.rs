use thiserror::Error;

/// Validation and contract errors exposed by `ferrofeed-core`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid source '{value}', expected one of finnhub, reddit, llm")]
    InvalidSource { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("unix timestamp {value} is out of range")]
    TimestampOutOfRange { value: i64 },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be greater than zero")]
    NonPositiveValue { field: &'static str },
    #[error("backoff multiplier must be >= 1.0, got {value}")]
    InvalidMultiplier { value: f64 },
}

/// Environment configuration failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("environment variable {name} has invalid value '{value}': {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
