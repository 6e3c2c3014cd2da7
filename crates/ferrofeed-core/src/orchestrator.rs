//! Multi-key fetch cycles.
//!
//! [`FetchOrchestrator::fetch_all`] runs one cycle for a set of keys against a
//! single [`FeedSource`]. Each key is an independent tokio task bounded by a
//! semaphore; a fault on one key is logged and recorded in the report while
//! the other keys carry on.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::cursor::{resolve_window, Cursor, CursorUpdate};
use crate::data_source::{parse_payload, FeedSource};
use crate::fault::ClassifiedFault;
use crate::retry::{RetryEngine, RetryPolicy};
use crate::{FetchItem, SourceKey, UtcDateTime};

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Cycle-level limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub max_concurrency: usize,
    /// Deadline for a whole cycle; remaining retry loops end cancelled.
    pub cycle_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            cycle_timeout: None,
        }
    }
}

/// Why a key produced no data this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Terminal,
    RetriesExhausted,
    Cancelled,
    /// Another cycle on the same orchestrator is already fetching the key.
    InFlight,
    /// The key's task panicked or was aborted.
    TaskFailed,
}

impl FailureReason {
    fn from_fault(fault: &ClassifiedFault) -> Self {
        if fault.is_cancellation() {
            Self::Cancelled
        } else if fault.is_retryable() {
            Self::RetriesExhausted
        } else {
            Self::Terminal
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFailure {
    pub key: SourceKey,
    pub reason: FailureReason,
    pub message: String,
}

/// Result of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchReport {
    /// Accepted items, grouped by key in input order.
    pub items: Vec<FetchItem>,
    /// One entry per key that completed, failed keys are absent.
    pub cursor_updates: BTreeMap<SourceKey, CursorUpdate>,
    pub failures: Vec<KeyFailure>,
}

impl FetchReport {
    /// True when keys were requested and none of them completed.
    pub fn all_failed(&self) -> bool {
        !self.failures.is_empty() && self.cursor_updates.is_empty()
    }

    pub fn failure_for(&self, key: &SourceKey) -> Option<&KeyFailure> {
        self.failures.iter().find(|failure| &failure.key == key)
    }

    /// Applies every cursor update to a stored cursor map.
    pub fn apply_to(&self, cursors: &mut BTreeMap<SourceKey, Cursor>) {
        for (key, update) in &self.cursor_updates {
            match update.apply(cursors.get(key).copied()) {
                Some(cursor) => {
                    cursors.insert(key.clone(), cursor);
                }
                None => {
                    cursors.remove(key);
                }
            }
        }
    }
}

struct KeyFetch {
    items: Vec<FetchItem>,
    update: CursorUpdate,
}

/// Drives fetch cycles for one feed source.
pub struct FetchOrchestrator {
    source: Arc<dyn FeedSource>,
    engine: RetryEngine,
    policy: RetryPolicy,
    config: OrchestratorConfig,
    shutdown: CancellationToken,
    in_flight: Arc<Mutex<HashSet<SourceKey>>>,
}

impl std::fmt::Debug for FetchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("provider", &self.source.id())
            .field("policy", &self.policy)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FetchOrchestrator {
    pub fn new(source: Arc<dyn FeedSource>) -> Self {
        let policy = source.retry_policy();
        Self {
            source,
            engine: RetryEngine::new(),
            policy,
            config: OrchestratorConfig::default(),
            shutdown: CancellationToken::new(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_engine(mut self, engine: RetryEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Overrides the policy reported by the source.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Cancelling `token` ends every running and future cycle.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn fetch_all(
        &self,
        keys: &[SourceKey],
        cursors: &BTreeMap<SourceKey, Cursor>,
    ) -> FetchReport {
        self.fetch_all_at(keys, cursors, UtcDateTime::now()).await
    }

    /// Same as [`fetch_all`](Self::fetch_all) with an explicit clock reading.
    pub async fn fetch_all_at(
        &self,
        keys: &[SourceKey],
        cursors: &BTreeMap<SourceKey, Cursor>,
        now: UtcDateTime,
    ) -> FetchReport {
        let provider = self.source.id();
        if keys.is_empty() {
            warn!(provider = %provider, "fetch cycle called with no keys");
            return FetchReport::default();
        }

        let mut seen = HashSet::new();
        let unique: Vec<SourceKey> = keys
            .iter()
            .filter(|key| seen.insert(*key))
            .cloned()
            .collect();

        let mut report = FetchReport::default();
        let mut claimed = Vec::with_capacity(unique.len());
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            for key in unique {
                if in_flight.insert(key.clone()) {
                    claimed.push(key);
                } else {
                    warn!(provider = %provider, key = %key, "key already in flight, skipping");
                    report.failures.push(KeyFailure {
                        key,
                        reason: FailureReason::InFlight,
                        message: String::from("key is already being fetched by another cycle"),
                    });
                }
            }
        }

        let cycle = self.shutdown.child_token();
        let deadline = self.config.cycle_timeout.map(|timeout| {
            let cycle = cycle.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                cycle.cancel();
            })
        });

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for key in &claimed {
            let guard = InFlightGuard {
                set: Arc::clone(&self.in_flight),
                key: key.clone(),
            };
            let source = Arc::clone(&self.source);
            let engine = self.engine.clone();
            let policy = self.policy.clone();
            let cursor = cursors.get(key).copied();
            let cancel = cycle.clone();
            let semaphore = Arc::clone(&semaphore);
            let key = key.clone();

            let span = info_span!("fetch_key", provider = %provider, key = %key);

            tasks.spawn(
                async move {
                    let _guard = guard;
                    let _permit = semaphore.acquire_owned().await.ok();
                    let outcome =
                        fetch_key(source.as_ref(), &engine, &policy, &key, cursor, now, &cancel).await;
                    (key, outcome)
                }
                .instrument(span),
            );
        }

        let mut outcomes = HashMap::with_capacity(claimed.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, outcome)) => {
                    outcomes.insert(key, outcome);
                }
                Err(error) => warn!(provider = %provider, error = %error, "fetch task failed"),
            }
        }
        if let Some(deadline) = deadline {
            deadline.abort();
        }

        for key in claimed {
            match outcomes.remove(&key) {
                Some(Ok(fetch)) => {
                    report.items.extend(fetch.items);
                    report.cursor_updates.insert(key, fetch.update);
                }
                Some(Err(fault)) => {
                    warn!(provider = %provider, key = %key, error = %fault, "key fetch failed");
                    report.failures.push(KeyFailure {
                        key,
                        reason: FailureReason::from_fault(&fault),
                        message: fault.message().to_owned(),
                    });
                }
                None => report.failures.push(KeyFailure {
                    key,
                    reason: FailureReason::TaskFailed,
                    message: String::from("fetch task did not complete"),
                }),
            }
        }

        info!(
            provider = %provider,
            items = report.items.len(),
            completed = report.cursor_updates.len(),
            failed = report.failures.len(),
            "fetch cycle finished"
        );
        report
    }
}

async fn fetch_key(
    source: &dyn FeedSource,
    engine: &RetryEngine,
    policy: &RetryPolicy,
    key: &SourceKey,
    cursor: Option<Cursor>,
    now: UtcDateTime,
    cancel: &CancellationToken,
) -> Result<KeyFetch, ClassifiedFault> {
    let window = resolve_window(cursor.as_ref(), source.cursor_kind(), &source.window_config(), now);
    debug!(
        provider = %source.id(),
        key = %key,
        mode = ?window.mode,
        lower_bound = %window.lower_bound,
        min_id = ?window.min_id,
        "resolved fetch window"
    );

    let payload = engine
        .execute(policy, cancel, || source.attempt(key, &window))
        .await?;

    let Some(candidates) = parse_payload(source, key, payload) else {
        warn!(provider = %source.id(), key = %key, "malformed payload, cursor left unchanged");
        return Ok(KeyFetch {
            items: Vec::new(),
            update: CursorUpdate::Unchanged,
        });
    };

    let items = window.accept(&candidates);
    let update = window.advance(&candidates, &items);
    debug!(
        provider = %source.id(),
        key = %key,
        parsed = candidates.len(),
        accepted = items.len(),
        update = ?update,
        "key fetch complete"
    );
    Ok(KeyFetch { items, update })
}

/// Releases a claimed key when its task ends, including on panic.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<SourceKey>>>,
    key: SourceKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
