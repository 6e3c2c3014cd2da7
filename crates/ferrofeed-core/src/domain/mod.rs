//! # Domain Models
//!
//! Canonical feed item types for ferrofeed.
//!
//! ## Models
//!
//! | Type | Description |
//! |------|-------------|
//! | [`FetchItem`] | One delivered item with key, timestamp and identity |
//! | [`ItemPayload`] | Price, news or social content |
//! | [`PriceQuote`] | Last price snapshot |
//! | [`NewsArticle`] | Company or market-wide article |
//! | [`SocialPost`] | Social discussion post |
//! | [`Symbol`] | Validated stock symbol |
//! | [`SourceKey`] | Symbol or the market-wide `ALL` stream |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Constructors that can fail validate their invariants and return
//! [`ValidationError`](crate::ValidationError); a quote with a non-positive
//! price cannot be built.

mod models;
mod symbol;
mod timestamp;

pub use models::{FetchItem, ItemPayload, NewsArticle, PriceQuote, SocialPost};
pub use symbol::{SourceKey, Symbol};
pub use timestamp::UtcDateTime;
