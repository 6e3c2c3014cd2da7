//! Incremental-fetch cursors and window resolution.
//!
//! A [`Cursor`] is the per-key high-water mark. [`resolve_window`] turns it
//! into a [`FetchWindow`]: a wide bootstrap lookback when no mark exists, or
//! the mark minus a small overlap otherwise. The overlap only widens the
//! request; acceptance is always judged against the mark itself.
//!
//! | Cursor kind | Mark | Acceptance |
//! |-------------|------|------------|
//! | [`CursorKind::Timestamp`] | `last_seen_at` | `published_at >= mark` ([`AcceptRule::AtOrAfter`]) |
//! | [`CursorKind::NumericId`] | `last_seen_id` | `sequence > mark` ([`AcceptRule::After`]) |

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{FetchItem, UtcDateTime};

/// Overlap applied to incremental windows unless a provider overrides it.
pub const DEFAULT_OVERLAP: Duration = Duration::minutes(2);

/// High-water mark for one key. Both fields absent means "never fetched".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<UtcDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_id: Option<u64>,
}

impl Cursor {
    pub fn at(last_seen_at: UtcDateTime) -> Self {
        Self {
            last_seen_at: Some(last_seen_at),
            last_seen_id: None,
        }
    }

    pub fn with_id(last_seen_id: u64) -> Self {
        Self {
            last_seen_at: None,
            last_seen_id: Some(last_seen_id),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.last_seen_at.is_none() && self.last_seen_id.is_none()
    }
}

/// Which field of the cursor a provider advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorKind {
    Timestamp,
    NumericId,
}

impl CursorKind {
    /// The single acceptance rule used for every provider of this kind.
    pub const fn accept_rule(self) -> AcceptRule {
        match self {
            Self::Timestamp => AcceptRule::AtOrAfter,
            Self::NumericId => AcceptRule::After,
        }
    }
}

/// Boundary semantics at the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptRule {
    /// Keep values equal to the watermark; repeats are bounded to that instant.
    AtOrAfter,
    /// Keep only values strictly past the watermark.
    After,
}

impl AcceptRule {
    pub fn admits<T: Ord>(self, value: &T, watermark: &T) -> bool {
        match self {
            Self::AtOrAfter => value >= watermark,
            Self::After => value > watermark,
        }
    }
}

/// Per-provider window constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub first_run_lookback: Duration,
    pub overlap: Duration,
}

impl WindowConfig {
    pub const fn new(first_run_lookback: Duration, overlap: Duration) -> Self {
        Self {
            first_run_lookback,
            overlap,
        }
    }

    pub const fn lookback_days(days: i64) -> Self {
        Self::new(Duration::days(days), DEFAULT_OVERLAP)
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::lookback_days(7)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    Bootstrap,
    Incremental,
}

/// Provider-side time filter/granularity hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFilter {
    /// Maximise recall on the first run.
    Wide,
    /// Recent items only.
    Narrow,
}

/// Request and acceptance bounds for one fetch of one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchWindow {
    pub kind: CursorKind,
    pub mode: FetchMode,
    /// Request lower bound, overlap applied, never later than `upper_bound`.
    pub lower_bound: UtcDateTime,
    pub upper_bound: UtcDateTime,
    /// Timestamp mark before the overlap was applied.
    pub watermark: Option<UtcDateTime>,
    /// Numeric mark sent as the provider's minimum-id parameter.
    pub min_id: Option<u64>,
    prior: Option<Cursor>,
}

/// Computes the next fetch window for a key.
pub fn resolve_window(
    cursor: Option<&Cursor>,
    kind: CursorKind,
    config: &WindowConfig,
    now: UtcDateTime,
) -> FetchWindow {
    let prior = cursor.copied().filter(|cursor| !cursor.is_empty());
    let last_seen_at = prior.and_then(|cursor| cursor.last_seen_at);

    let (mode, watermark, min_id) = match kind {
        CursorKind::Timestamp => match last_seen_at {
            Some(mark) => (FetchMode::Incremental, Some(mark), None),
            None => (FetchMode::Bootstrap, None, None),
        },
        CursorKind::NumericId => match prior.and_then(|cursor| cursor.last_seen_id) {
            Some(id) => (FetchMode::Incremental, None, Some(id)),
            None => (FetchMode::Bootstrap, None, None),
        },
    };

    let lower_bound = match (mode, last_seen_at) {
        (FetchMode::Incremental, Some(mark)) => mark.saturating_sub(config.overlap),
        _ => now.saturating_sub(config.first_run_lookback),
    };

    FetchWindow {
        kind,
        mode,
        lower_bound: lower_bound.min(now),
        upper_bound: now,
        watermark,
        min_id,
        prior,
    }
}

/// Outcome of a fetch for the persistence boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "cursor", rename_all = "snake_case")]
pub enum CursorUpdate {
    /// Keep whatever cursor was stored.
    Unchanged,
    /// Store this cursor.
    Advanced(Cursor),
    /// Forget the cursor; the next cycle bootstraps.
    Reset,
}

impl CursorUpdate {
    pub fn apply(self, prior: Option<Cursor>) -> Option<Cursor> {
        match self {
            Self::Unchanged => prior,
            Self::Advanced(cursor) => Some(cursor),
            Self::Reset => None,
        }
    }
}

impl FetchWindow {
    pub fn time_filter(&self) -> TimeFilter {
        match self.mode {
            FetchMode::Bootstrap => TimeFilter::Wide,
            FetchMode::Incremental => TimeFilter::Narrow,
        }
    }

    pub fn rule(&self) -> AcceptRule {
        self.kind.accept_rule()
    }

    pub fn prior(&self) -> Option<Cursor> {
        self.prior
    }

    /// Whether a single item lies past the watermark.
    pub fn accepts(&self, item: &FetchItem) -> bool {
        if self.mode == FetchMode::Bootstrap {
            return true;
        }

        match self.kind {
            CursorKind::Timestamp => self
                .watermark
                .map_or(true, |mark| self.rule().admits(&item.published_at, &mark)),
            CursorKind::NumericId => match (item.sequence, self.min_id) {
                (Some(id), Some(mark)) => self.rule().admits(&id, &mark),
                (None, Some(_)) => false,
                (_, None) => true,
            },
        }
    }

    /// Filters a parsed batch against the watermark and drops repeated
    /// `unique_key`s, keeping the first occurrence.
    pub fn accept(&self, candidates: &[FetchItem]) -> Vec<FetchItem> {
        let mut seen = HashSet::new();
        candidates
            .iter()
            .filter(|item| self.accepts(item))
            .filter(|item| seen.insert(item.unique_key.as_str()))
            .cloned()
            .collect()
    }

    /// Cursor update after a successful fetch.
    ///
    /// `candidates` is the parsed batch before filtering, `accepted` what
    /// survived [`FetchWindow::accept`].
    pub fn advance(&self, candidates: &[FetchItem], accepted: &[FetchItem]) -> CursorUpdate {
        let prior = self.prior.unwrap_or_default();
        let newest_at = accepted.iter().map(|item| item.published_at).max();

        match self.kind {
            CursorKind::Timestamp => {
                let Some(newest_at) = newest_at else {
                    return CursorUpdate::Unchanged;
                };
                if prior.last_seen_at.is_some_and(|mark| newest_at <= mark) {
                    return CursorUpdate::Unchanged;
                }
                CursorUpdate::Advanced(Cursor {
                    last_seen_at: Some(newest_at),
                    last_seen_id: prior.last_seen_id,
                })
            }
            CursorKind::NumericId => {
                let Some(batch_max) = candidates.iter().filter_map(|item| item.sequence).max()
                else {
                    return CursorUpdate::Unchanged;
                };
                if self.min_id.is_some_and(|min_id| batch_max <= min_id) {
                    return CursorUpdate::Reset;
                }

                let Some(newest_id) = accepted.iter().filter_map(|item| item.sequence).max() else {
                    return CursorUpdate::Unchanged;
                };
                CursorUpdate::Advanced(Cursor {
                    last_seen_at: newest_at.max(prior.last_seen_at),
                    last_seen_id: Some(newest_id),
                })
            }
        }
    }
}
