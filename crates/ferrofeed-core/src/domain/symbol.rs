use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_SYMBOL_LEN: usize = 15;
const ALL_KEY: &str = "ALL";

/// Normalized market symbol/ticker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a symbol to uppercase.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let normalized = trimmed.to_ascii_uppercase();
        let len = normalized.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: MAX_SYMBOL_LEN,
            });
        }

        if let Some(first) = normalized.chars().next() {
            if !first.is_ascii_alphabetic() {
                return Err(ValidationError::SymbolInvalidStart { ch: first });
            }
        }

        for (index, ch) in normalized.chars().enumerate() {
            let valid = ch.is_ascii_alphanumeric() || ch == '.' || ch == '-';
            if !valid {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

/// Cursor and item key: a tracked symbol or the market-wide stream.
///
/// Serializes as the bare symbol or `"ALL"`, so it can key JSON maps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceKey {
    Symbol(Symbol),
    All,
}

impl SourceKey {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        if input.trim().eq_ignore_ascii_case(ALL_KEY) {
            return Ok(Self::All);
        }
        Symbol::parse(input).map(Self::Symbol)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Symbol(symbol) => symbol.as_str(),
            Self::All => ALL_KEY,
        }
    }

    pub fn symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Symbol(symbol) => Some(symbol),
            Self::All => None,
        }
    }
}

impl Display for SourceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Symbol> for SourceKey {
    fn from(value: Symbol) -> Self {
        Self::Symbol(value)
    }
}

impl FromStr for SourceKey {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for SourceKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SourceKey> for String {
    fn from(value: SourceKey) -> Self {
        value.as_str().to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_symbol() {
        let parsed = Symbol::parse(" aapl ").expect("symbol should parse");
        assert_eq!(parsed.as_str(), "AAPL");
    }

    #[test]
    fn rejects_invalid_start() {
        let err = Symbol::parse("1AAPL").expect_err("must fail");
        assert!(matches!(err, ValidationError::SymbolInvalidStart { .. }));
    }

    #[test]
    fn rejects_invalid_chars() {
        let err = Symbol::parse("AAPL$").expect_err("must fail");
        assert!(matches!(err, ValidationError::SymbolInvalidChar { .. }));
    }

    #[test]
    fn all_key_is_recognised_in_any_case() {
        assert_eq!(SourceKey::parse("all"), Ok(SourceKey::All));
        assert_eq!(SourceKey::All.to_string(), "ALL");
    }

    #[test]
    fn source_key_serializes_as_plain_string() {
        let key = SourceKey::parse("msft").expect("valid");
        let json = serde_json::to_string(&key).expect("serialize");
        assert_eq!(json, "\"MSFT\"");
        let back: SourceKey = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, key);
    }
}
