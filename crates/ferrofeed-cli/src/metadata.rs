use std::fmt::{Display, Formatter};

use ferrofeed_core::{FetchReport, ProviderId};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

/// Cycle identifier (UUID v4), also attached to the cycle's log span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(Uuid);

impl CycleId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for CycleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Metadata printed ahead of every cycle result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleMetadata {
    pub cycle_id: CycleId,
    pub provider: ProviderId,
    pub feed: String,
    pub generated_at: String,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl CycleMetadata {
    pub fn new(cycle_id: CycleId, provider: ProviderId, feed: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            cycle_id,
            provider,
            feed: feed.into(),
            generated_at: now_rfc3339(),
            latency_ms,
            warnings: Vec::new(),
        }
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// JSON document written to stdout by `poll`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleOutput {
    pub meta: CycleMetadata,
    #[serde(flatten)]
    pub report: FetchReport,
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::UNIX_EPOCH.unix_timestamp().to_string())
}
