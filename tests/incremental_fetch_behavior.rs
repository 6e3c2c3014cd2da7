//! Behavior-driven tests for incremental fetching
//!
//! These tests verify HOW cursors turn into fetch windows, which items a
//! window accepts, and how the cursor moves after a batch.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use ferrofeed_core::{
    resolve_window, AcceptRule, AttemptFuture, Cursor, CursorKind, CursorUpdate, FeedSource,
    FetchItem, FetchMode, FetchOrchestrator, FetchWindow, ItemPayload, NewsArticle, ProviderId,
    SourceKey, UtcDateTime, WindowConfig,
};
use ferrofeed_tests::ts;
use serde_json::{json, Value};
use time::Duration;

fn article(at: UtcDateTime, unique_key: &str, sequence: Option<u64>) -> FetchItem {
    let item = FetchItem::new(
        SourceKey::All,
        at,
        unique_key,
        ItemPayload::News(NewsArticle {
            headline: format!("headline {unique_key}"),
            summary: None,
            url: format!("https://news.test/{unique_key}"),
            publisher: None,
            category: None,
        }),
    );
    match sequence {
        Some(id) => item.with_sequence(id),
        None => item,
    }
}

const NOW: &str = "2024-06-03T15:00:00Z";
const WATERMARK: &str = "2024-06-03T14:00:00Z";

// =============================================================================
// Incremental Fetch: Acceptance at the Watermark
// =============================================================================

#[test]
fn when_items_straddle_the_watermark_each_rule_keeps_its_side() {
    // Given: A watermark W and items at W-10s, W and W+10s
    let watermark = ts(WATERMARK);
    let batch = vec![
        article(watermark.saturating_sub(Duration::seconds(10)), "before", None),
        article(watermark, "at", None),
        article(watermark.saturating_add(Duration::seconds(10)), "after", None),
    ];

    // When: Each rule filters the batch
    let keep = |rule: AcceptRule| -> Vec<String> {
        batch
            .iter()
            .filter(|item| rule.admits(&item.published_at, &watermark))
            .map(|item| item.unique_key.clone())
            .collect()
    };

    // Then: At-or-after keeps W and W+10s, strictly-after keeps only W+10s
    assert_eq!(keep(AcceptRule::AtOrAfter), vec!["at", "after"]);
    assert_eq!(keep(AcceptRule::After), vec!["after"]);
}

#[test]
fn when_a_timestamp_cursor_exists_the_window_keeps_the_boundary_instant() {
    // Given: A timestamp cursor at W
    let cursor = Cursor::at(ts(WATERMARK));
    let window = resolve_window(Some(&cursor), CursorKind::Timestamp, &WindowConfig::default(), ts(NOW));
    let watermark = ts(WATERMARK);
    let batch = vec![
        article(watermark.saturating_sub(Duration::seconds(10)), "before", None),
        article(watermark, "at", None),
        article(watermark.saturating_add(Duration::seconds(10)), "after", None),
    ];

    // When: The window filters the batch
    let accepted = window.accept(&batch);

    // Then: The timestamp rule is inclusive at the watermark
    assert_eq!(window.rule(), AcceptRule::AtOrAfter);
    let keys: Vec<_> = accepted.iter().map(|item| item.unique_key.as_str()).collect();
    assert_eq!(keys, vec!["at", "after"]);
}

#[test]
fn when_the_overlap_widens_the_request_acceptance_is_unchanged() {
    // Given: A cursor at W and a two-minute overlap
    let cursor = Cursor::at(ts(WATERMARK));
    let window = resolve_window(Some(&cursor), CursorKind::Timestamp, &WindowConfig::default(), ts(NOW));

    // When: The provider returns an item from inside the overlap
    let inside_overlap = article(ts("2024-06-03T13:59:00Z"), "overlap", None);
    let accepted = window.accept(&[inside_overlap]);

    // Then: The request starts at W-2min but the item is still rejected
    assert_eq!(window.lower_bound, ts("2024-06-03T13:58:00Z"));
    assert!(accepted.is_empty());
}

// =============================================================================
// Incremental Fetch: Window Resolution
// =============================================================================

#[test]
fn when_no_cursor_exists_the_first_run_looks_back_and_accepts_everything() {
    // Given: No cursor and a three-day lookback
    let config = WindowConfig::lookback_days(3);
    let window = resolve_window(None, CursorKind::Timestamp, &config, ts(NOW));

    // When: The provider returns old and new items
    let batch = vec![
        article(ts("2024-05-01T00:00:00Z"), "old", None),
        article(ts("2024-06-03T14:59:00Z"), "new", None),
    ];
    let accepted = window.accept(&batch);

    // Then: The window is a bootstrap over the lookback and keeps both
    assert_eq!(window.mode, FetchMode::Bootstrap);
    assert_eq!(window.lower_bound, ts("2024-05-31T15:00:00Z"));
    assert_eq!(window.upper_bound, ts(NOW));
    assert_eq!(accepted.len(), 2);
}

#[test]
fn when_the_cursor_is_in_the_future_the_lower_bound_is_clamped_to_now() {
    // Given: A cursor an hour ahead of the clock
    let cursor = Cursor::at(ts("2024-06-03T16:00:00Z"));

    // When: The window is resolved
    let window = resolve_window(Some(&cursor), CursorKind::Timestamp, &WindowConfig::default(), ts(NOW));

    // Then: The lower bound never passes now
    assert_eq!(window.lower_bound, ts(NOW));
    assert!(window.lower_bound <= window.upper_bound);
}

#[test]
fn when_a_numeric_provider_has_only_a_timestamp_it_bootstraps() {
    // Given: A cursor that carries a timestamp but no id
    let cursor = Cursor::at(ts(WATERMARK));

    // When: A numeric-id window is resolved
    let window = resolve_window(Some(&cursor), CursorKind::NumericId, &WindowConfig::default(), ts(NOW));

    // Then: No minimum id is sent and everything is accepted
    assert_eq!(window.mode, FetchMode::Bootstrap);
    assert_eq!(window.min_id, None);
}

// =============================================================================
// Incremental Fetch: Cursor Advancement
// =============================================================================

#[test]
fn when_nothing_new_arrives_the_cursor_does_not_move() {
    // Given: A cursor at W
    let cursor = Cursor::at(ts(WATERMARK));
    let window = resolve_window(Some(&cursor), CursorKind::Timestamp, &WindowConfig::default(), ts(NOW));

    // When: The batch is empty, or only repeats the boundary item
    let repeat = vec![article(ts(WATERMARK), "at", None)];
    let accepted = window.accept(&repeat);

    // Then: Neither case advances the cursor
    assert_eq!(window.advance(&[], &[]), CursorUpdate::Unchanged);
    assert_eq!(accepted.len(), 1);
    assert_eq!(window.advance(&repeat, &accepted), CursorUpdate::Unchanged);
}

#[test]
fn when_numeric_ids_are_new_the_cursor_advances_to_the_largest() {
    // Given: A numeric cursor at 150
    let cursor = Cursor::with_id(150);
    let window = resolve_window(Some(&cursor), CursorKind::NumericId, &WindowConfig::default(), ts(NOW));
    let at = ts(WATERMARK);
    let batch = vec![
        article(at, "a", Some(153)),
        article(at, "b", Some(150)),
        article(at, "c", Some(151)),
        article(at, "d", None),
    ];

    // When: The batch is accepted and the cursor advanced
    let accepted = window.accept(&batch);
    let update = window.advance(&batch, &accepted);

    // Then: Only ids above 150 survive and the cursor moves to 153
    let ids: Vec<_> = accepted.iter().filter_map(|item| item.sequence).collect();
    assert_eq!(ids, vec![153, 151]);
    assert_eq!(
        update,
        CursorUpdate::Advanced(Cursor {
            last_seen_at: Some(at),
            last_seen_id: Some(153),
        })
    );
}

#[test]
fn when_a_numeric_provider_returns_only_stale_ids_the_cursor_resets() {
    // Given: A request sent with minId = 150
    let cursor = Cursor::with_id(150);
    let window = resolve_window(Some(&cursor), CursorKind::NumericId, &WindowConfig::default(), ts(NOW));
    assert_eq!(window.min_id, Some(150));
    let at = ts(WATERMARK);
    let batch = vec![article(at, "a", Some(150)), article(at, "b", Some(149)), article(at, "c", Some(12))];

    // When: Every id in the response is at or below 150
    let accepted = window.accept(&batch);
    let update = window.advance(&batch, &accepted);

    // Then: The watermark is forgotten rather than regressed
    assert!(accepted.is_empty());
    assert_eq!(update, CursorUpdate::Reset);
    assert_eq!(update.apply(Some(cursor)), None);
}

// =============================================================================
// Incremental Fetch: Consecutive Cycles
// =============================================================================

/// Serves a fixed list of `(published_at, id)` records for every request.
struct StaticFeed {
    records: Vec<(&'static str, &'static str)>,
    seen_windows: Mutex<Vec<FetchWindow>>,
}

impl FeedSource for StaticFeed {
    fn id(&self) -> ProviderId {
        ProviderId::Finnhub
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::Timestamp
    }

    fn attempt<'a>(&'a self, _key: &'a SourceKey, window: &'a FetchWindow) -> AttemptFuture<'a> {
        self.seen_windows.lock().expect("lock").push(window.clone());
        let payload: Vec<Value> = self
            .records
            .iter()
            .map(|(at, id)| json!({"at": at, "id": id}))
            .collect();
        Box::pin(async move { Ok(Value::Array(payload)) })
    }

    fn parse_record(&self, key: &SourceKey, record: &Value) -> Option<FetchItem> {
        let at = UtcDateTime::parse(record.get("at")?.as_str()?).ok()?;
        let id = record.get("id")?.as_str()?;
        let mut item = article(at, id, None);
        item.source = key.clone();
        Some(item)
    }
}

#[tokio::test]
async fn when_the_same_feed_is_polled_twice_the_second_cycle_only_repeats_the_boundary() {
    // Given: A feed with three articles and no stored cursor
    let feed = Arc::new(StaticFeed {
        records: vec![
            ("2024-06-03T13:00:00Z", "a"),
            ("2024-06-03T14:00:00Z", "b"),
            ("2024-06-03T13:30:00Z", "c"),
        ],
        seen_windows: Mutex::new(Vec::new()),
    });
    let orchestrator = FetchOrchestrator::new(feed.clone());
    let key = SourceKey::parse("AAPL").expect("key");
    let mut cursors = BTreeMap::new();

    // When: Two cycles run back to back, applying the cursor updates
    let first = orchestrator.fetch_all_at(&[key.clone()], &cursors, ts(NOW)).await;
    first.apply_to(&mut cursors);
    let second = orchestrator.fetch_all_at(&[key.clone()], &cursors, ts(NOW)).await;
    second.apply_to(&mut cursors);

    // Then: The first cycle bootstraps, the second is incremental and only
    // redelivers the item sitting exactly on the watermark
    assert_eq!(first.items.len(), 3);
    assert_eq!(
        first.cursor_updates.get(&key),
        Some(&CursorUpdate::Advanced(Cursor::at(ts("2024-06-03T14:00:00Z"))))
    );

    let repeated: Vec<_> = second.items.iter().map(|item| item.unique_key.as_str()).collect();
    assert_eq!(repeated, vec!["b"]);
    assert_eq!(second.cursor_updates.get(&key), Some(&CursorUpdate::Unchanged));
    assert_eq!(cursors.get(&key), Some(&Cursor::at(ts("2024-06-03T14:00:00Z"))));

    let windows = feed.seen_windows.lock().expect("lock");
    assert_eq!(windows[0].mode, FetchMode::Bootstrap);
    assert_eq!(windows[1].mode, FetchMode::Incremental);
    assert_eq!(windows[1].lower_bound, ts("2024-06-03T13:58:00Z"));
}
