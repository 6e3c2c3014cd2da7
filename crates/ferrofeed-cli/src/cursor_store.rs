//! JSON cursor file used by `poll --cursors`.
//!
//! Cursors are grouped by feed so one file can serve several feeds without
//! their watermarks mixing:
//!
//! ```json
//! {
//!   "company-news": { "AAPL": { "last_seen_at": "2024-06-03T14:00:00Z" } },
//!   "market-news": { "ALL": { "last_seen_id": 7351002 } }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ferrofeed_core::{Cursor, SourceKey};

use crate::error::CliError;

pub type CursorMap = BTreeMap<SourceKey, Cursor>;

type FeedCursors = BTreeMap<String, CursorMap>;

/// Reads one feed's cursors. A missing file or feed is a first run.
pub fn load(path: &Path, feed: &str) -> Result<CursorMap, CliError> {
    Ok(read_all(path)?.remove(feed).unwrap_or_default())
}

/// Replaces one feed's cursors and keeps every other feed as stored.
///
/// The file is written through a sibling temp file and a rename.
pub fn save(path: &Path, feed: &str, cursors: &CursorMap) -> Result<(), CliError> {
    let mut all = read_all(path)?;
    all.insert(feed.to_owned(), cursors.clone());

    let rendered = serde_json::to_string_pretty(&all)?;
    let staging = staging_path(path);
    fs::write(&staging, rendered)?;
    fs::rename(&staging, path)?;
    Ok(())
}

fn read_all(path: &Path) -> Result<FeedCursors, CliError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(FeedCursors::new()),
        Err(error) => return Err(error.into()),
    };

    if raw.trim().is_empty() {
        return Ok(FeedCursors::new());
    }

    serde_json::from_str(&raw).map_err(|source| CliError::CursorFile {
        path: path.display().to_string(),
        source,
    })
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
