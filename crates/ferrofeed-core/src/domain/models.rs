use serde::{Deserialize, Serialize};

use crate::{SourceKey, Symbol, UtcDateTime, ValidationError};

/// Last traded price snapshot for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: Symbol,
    pub price: f64,
    pub change: Option<f64>,
    pub percent_change: Option<f64>,
    pub previous_close: Option<f64>,
}

impl PriceQuote {
    pub fn new(
        symbol: Symbol,
        price: f64,
        change: Option<f64>,
        percent_change: Option<f64>,
        previous_close: Option<f64>,
    ) -> Result<Self, ValidationError> {
        validate_positive("price", price)?;
        validate_optional_finite("change", change)?;
        validate_optional_finite("percent_change", percent_change)?;
        if let Some(previous_close) = previous_close {
            validate_positive("previous_close", previous_close)?;
        }

        Ok(Self {
            symbol,
            price,
            change,
            percent_change,
            previous_close,
        })
    }
}

/// Company or market-wide news article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub headline: String,
    pub summary: Option<String>,
    pub url: String,
    pub publisher: Option<String>,
    pub category: Option<String>,
}

/// Social discussion post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialPost {
    pub community: String,
    pub title: String,
    pub body: Option<String>,
    pub permalink: String,
    pub score: i64,
}

/// Provider-specific content of a [`FetchItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemPayload {
    Price(PriceQuote),
    News(NewsArticle),
    Social(SocialPost),
}

/// One time-ordered item delivered by a feed.
///
/// `unique_key` is the provider-defined identity (URL, or `source:id`) used to
/// drop repeats inside a batch. `sequence` carries the provider's monotonically
/// increasing numeric id when it has one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchItem {
    pub source: SourceKey,
    pub published_at: UtcDateTime,
    pub unique_key: String,
    pub sequence: Option<u64>,
    pub payload: ItemPayload,
}

impl FetchItem {
    pub fn new(
        source: SourceKey,
        published_at: UtcDateTime,
        unique_key: impl Into<String>,
        payload: ItemPayload,
    ) -> Self {
        Self {
            source,
            published_at,
            unique_key: unique_key.into(),
            sequence: None,
            payload,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }
}

fn validate_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value <= 0.0 {
        return Err(ValidationError::NonPositiveValue { field });
    }
    Ok(())
}

fn validate_optional_finite(
    field: &'static str,
    value: Option<f64>,
) -> Result<(), ValidationError> {
    if let Some(value) = value {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteValue { field });
        }
    }
    Ok(())
}
