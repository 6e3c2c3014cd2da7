//! Feed source contract.
//!
//! A [`FeedSource`] is the seam between the orchestrator and one provider
//! endpoint. It performs exactly one network attempt per call to
//! [`FeedSource::attempt`]; retries, timeouts and cancellation belong to the
//! [`RetryEngine`](crate::RetryEngine). Parsing is split in two pure steps so
//! one bad record never discards the rest of a batch.
//!
//! | Method | Responsibility |
//! |--------|----------------|
//! | [`FeedSource::attempt`] | One request for a key and window, faults classified |
//! | [`FeedSource::extract_records`] | Payload shape check; `None` means malformed |
//! | [`FeedSource::parse_record`] | Record to [`FetchItem`]; `None` skips the record |

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tracing::debug;

use crate::cursor::{CursorKind, FetchWindow, WindowConfig};
use crate::fault::ClassifiedFault;
use crate::retry::RetryPolicy;
use crate::{FetchItem, ProviderId, SourceKey};

/// Future returned by [`FeedSource::attempt`].
pub type AttemptFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Value, ClassifiedFault>> + Send + 'a>>;

/// Transport adapter and parsing boundary for one provider endpoint.
pub trait FeedSource: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Which cursor field this source advances.
    fn cursor_kind(&self) -> CursorKind;

    fn window_config(&self) -> WindowConfig {
        WindowConfig::default()
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default_for(self.id().family())
    }

    /// Issues one request. Must not retry internally.
    fn attempt<'a>(&'a self, key: &'a SourceKey, window: &'a FetchWindow) -> AttemptFuture<'a>;

    /// Splits a payload into raw records.
    fn extract_records(&self, payload: Value) -> Option<Vec<Value>> {
        match payload {
            Value::Array(records) => Some(records),
            _ => None,
        }
    }

    /// Maps one raw record. Never panics; anything unexpected yields `None`.
    fn parse_record(&self, key: &SourceKey, record: &Value) -> Option<FetchItem>;
}

/// Extracts and parses a payload, skipping records that fail to parse.
///
/// Returns `None` when the payload itself has the wrong shape.
pub fn parse_payload(
    source: &dyn FeedSource,
    key: &SourceKey,
    payload: Value,
) -> Option<Vec<FetchItem>> {
    let records = source.extract_records(payload)?;
    let total = records.len();
    let items: Vec<FetchItem> = records
        .iter()
        .filter_map(|record| source.parse_record(key, record))
        .collect();

    if items.len() < total {
        debug!(
            provider = %source.id(),
            key = %key,
            skipped = total - items.len(),
            "skipped malformed records"
        );
    }
    Some(items)
}

/// Field accessors shared by the provider parsers.
pub(crate) mod fields {
    use serde_json::Value;

    use crate::UtcDateTime;

    pub fn text<'a>(record: &'a Value, name: &str) -> Option<&'a str> {
        record
            .get(name)?
            .as_str()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn owned(record: &Value, name: &str) -> Option<String> {
        text(record, name).map(str::to_owned)
    }

    pub fn number(record: &Value, name: &str) -> Option<f64> {
        record.get(name)?.as_f64().filter(|value| value.is_finite())
    }

    pub fn unsigned(record: &Value, name: &str) -> Option<u64> {
        record.get(name)?.as_u64()
    }

    /// Unix seconds, integer or float.
    pub fn unix_time(record: &Value, name: &str) -> Option<UtcDateTime> {
        let value = record.get(name)?;
        let seconds = match value.as_i64() {
            Some(seconds) => seconds,
            None => {
                let seconds = value.as_f64()?;
                if !seconds.is_finite() {
                    return None;
                }
                seconds.trunc() as i64
            }
        };
        UtcDateTime::from_unix_timestamp(seconds).ok()
    }
}
