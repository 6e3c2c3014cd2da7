//! # Ferrofeed Core
//!
//! Fault-tolerant incremental polling of market data, news and social feeds.
//!
//! ## Overview
//!
//! - **Fault taxonomy** reducing every provider failure to retryable or terminal
//! - **Retry engine** with exponential backoff, jitter and server wait hints
//! - **Incremental cursors** so repeated polls only deliver new items
//! - **Fetch orchestrator** that polls many keys concurrently and isolates failures
//! - **Provider adapters** for Finnhub and Reddit
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Finnhub and Reddit feed sources |
//! | [`config`] | Environment configuration |
//! | [`cursor`] | Cursors, fetch windows and acceptance rules |
//! | [`data_source`] | The [`FeedSource`] contract |
//! | [`domain`] | Feed items, symbols and timestamps |
//! | [`error`] | Validation and configuration errors |
//! | [`fault`] | [`ClassifiedFault`] and per-provider classification |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`orchestrator`] | Multi-key fetch cycles |
//! | [`retry`] | Retry policies and engine |
//! | [`source`] | Provider identifiers and families |
//! | [`throttling`] | Client-side request quotas |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! use ferrofeed_core::{FeedConfig, FetchOrchestrator, FinnhubClient, FinnhubCompanyNews, SourceKey};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FeedConfig::from_env()?;
//!     let source = FinnhubCompanyNews::new(FinnhubClient::new(&config.finnhub));
//!     let orchestrator = FetchOrchestrator::new(Arc::new(source)).with_config(config.orchestrator);
//!
//!     let keys = vec![SourceKey::parse("AAPL")?, SourceKey::parse("MSFT")?];
//!     let mut cursors = BTreeMap::new();
//!     let report = orchestrator.fetch_all(&keys, &cursors).await;
//!     report.apply_to(&mut cursors);
//!
//!     println!("{} new items", report.items.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ FetchOrchestrator│  one task per key, semaphore bounded
//! └────────┬─────────┘
//!          │ resolve_window(cursor)
//!          ▼
//! ┌──────────────────┐     ┌──────────────────┐
//! │   RetryEngine    │────▶│  Sleeper (tokio) │
//! └────────┬─────────┘     └──────────────────┘
//!          │ attempt()
//!          ▼
//! ┌──────────────────┐     ┌──────────────────┐
//! │   FeedSource     │────▶│ HttpClient       │
//! │   (adapter)      │     │ + Throttle       │
//! └────────┬─────────┘     └──────────────────┘
//!          │ extract / parse / accept
//!          ▼
//! ┌──────────────────┐
//! │ FetchReport      │  items + cursor updates + failures
//! └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Feed calls fail with a [`ClassifiedFault`]; the engine retries only the
//! retryable variant:
//!
//! ```rust
//! use ferrofeed_core::ClassifiedFault;
//!
//! fn describe(fault: &ClassifiedFault) -> &'static str {
//!     match fault {
//!         ClassifiedFault::Retryable { retry_after: Some(_), .. } => "retry after server wait",
//!         ClassifiedFault::Retryable { .. } => "retry with backoff",
//!         ClassifiedFault::Terminal { .. } => "give up",
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - Credentials come from environment variables and are sent as headers,
//!   never in logged URLs
//! - Unknown `FERROFEED_*` variables are ignored

pub mod adapters;
pub mod config;
pub mod cursor;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod fault;
pub mod http_client;
pub mod orchestrator;
pub mod retry;
pub mod source;
pub mod throttling;

// Adapter implementations
pub use adapters::{FinnhubClient, FinnhubCompanyNews, FinnhubMarketNews, FinnhubQuotes, RedditPosts};

// Configuration
pub use config::{FeedConfig, FinnhubOptions, RedditOptions};

// Cursors and windows
pub use cursor::{
    resolve_window, AcceptRule, Cursor, CursorKind, CursorUpdate, FetchMode, FetchWindow,
    TimeFilter, WindowConfig,
};

// Feed source contract
pub use data_source::{parse_payload, AttemptFuture, FeedSource};

// Domain models
pub use domain::{FetchItem, ItemPayload, NewsArticle, PriceQuote, SocialPost, SourceKey, Symbol, UtcDateTime};

// Error types
pub use error::{ConfigError, ValidationError};

// Fault taxonomy
pub use fault::{parse_retry_after, ClassifiedFault, Classify, HttpFault, LlmFault};

// HTTP client types
pub use http_client::{HttpAuth, HttpClient, HttpRequest, HttpResponse, RateLimitReset, ReqwestHttpClient};

// Orchestration
pub use orchestrator::{FailureReason, FetchOrchestrator, FetchReport, KeyFailure, OrchestratorConfig};

// Retry logic
pub use retry::{RetryEngine, RetryPolicy, Sleeper, TokioSleeper};

// Source identifiers
pub use source::{ProviderFamily, ProviderId};

// Throttling
pub use throttling::Throttle;
