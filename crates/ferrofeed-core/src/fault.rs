//! Provider-agnostic fault taxonomy.
//!
//! Every provider family reduces its native failures to a [`ClassifiedFault`]
//! through the [`Classify`] trait. The retry engine only ever sees these two
//! variants.
//!
//! | Fault | Classification |
//! |-------|----------------|
//! | Network timeout / connection failure | Retryable, no wait |
//! | HTTP 429 / SDK rate limit | Retryable, server wait hint when parseable |
//! | HTTP 5xx / "server error" | Retryable |
//! | HTTP 408 | Retryable |
//! | HTTP 400, 401, 403, 404, 409, 422 | Terminal |
//! | Unstructured "timeout" or "connection" + "error" | Retryable |
//! | Anything else | Terminal |

use std::time::Duration;

use thiserror::Error;
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;

/// The single boundary abstraction all provider failures reduce to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifiedFault {
    /// Transient failure; another attempt may succeed.
    #[error("retryable: {message}")]
    Retryable {
        message: String,
        /// Server-specified wait. `Some(Duration::ZERO)` means retry immediately.
        retry_after: Option<Duration>,
    },
    /// Authoritative rejection; retrying cannot help.
    #[error("terminal: {message}")]
    Terminal { message: String },
}

impl ClassifiedFault {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn retryable_after(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::Retryable {
            message: message.into(),
            retry_after,
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal {
            message: message.into(),
        }
    }

    /// Terminal-equivalent result used when an external deadline or shutdown
    /// cancels a retry loop.
    pub fn cancelled() -> Self {
        Self::terminal(CANCELLED_MESSAGE)
    }

    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Terminal { message } if message == CANCELLED_MESSAGE)
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Retryable { message, .. } | Self::Terminal { message } => message,
        }
    }

    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Retryable { retry_after, .. } => *retry_after,
            Self::Terminal { .. } => None,
        }
    }
}

const CANCELLED_MESSAGE: &str = "operation cancelled";

/// Reduction of a provider-native fault to the shared taxonomy.
pub trait Classify {
    fn classify(&self) -> ClassifiedFault;
}

impl Classify for ClassifiedFault {
    fn classify(&self) -> ClassifiedFault {
        self.clone()
    }
}

/// Parses a server wait hint given as delta-seconds or an HTTP-date.
///
/// Negative or past values floor at zero. Unparseable input yields `None` so
/// the caller falls back to computed backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        if !seconds.is_finite() {
            return None;
        }
        if seconds <= 0.0 {
            return Some(Duration::ZERO);
        }
        return Duration::try_from_secs_f64(seconds).ok();
    }

    let at = parse_http_date(trimmed)?;
    let delta = at - OffsetDateTime::now_utc();
    if delta.is_negative() {
        Some(Duration::ZERO)
    } else {
        Some(delta.unsigned_abs())
    }
}

fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    if let Ok(parsed) = OffsetDateTime::parse(value, &Rfc2822) {
        return Some(parsed);
    }

    // IMF-fixdate ends in a zone name; rewrite it as a numeric offset.
    let numeric = value
        .strip_suffix("GMT")
        .or_else(|| value.strip_suffix("UTC"))
        .map(|head| format!("{head}+0000"))?;
    OffsetDateTime::parse(&numeric, &Rfc2822).ok()
}

/// Classifies a fault known only by its message text.
pub fn classify_message(message: &str) -> ClassifiedFault {
    let lower = message.to_ascii_lowercase();
    let timeout_like = lower.contains("timeout");
    let connection_error = lower.contains("connection") && lower.contains("error");
    let server_error = lower.contains("server error");

    if timeout_like || connection_error || server_error {
        ClassifiedFault::retryable(message)
    } else {
        ClassifiedFault::terminal(message)
    }
}

/// Status-code policy shared by every HTTP-shaped provider.
pub fn classify_status(status: u16, retry_after: Option<Duration>, message: &str) -> ClassifiedFault {
    match status {
        408 => ClassifiedFault::retryable(message),
        429 | 500..=599 => ClassifiedFault::retryable_after(message, retry_after),
        _ => ClassifiedFault::terminal(message),
    }
}

/// Native failure of the generic HTTP/JSON and social transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpFault {
    /// The request never produced a response.
    Transport {
        message: String,
        timeout: bool,
        connect: bool,
    },
    /// The server answered with a non-success status.
    Status {
        status: u16,
        retry_after: Option<String>,
        /// Seconds until the quota window resets (`x-ratelimit-reset`).
        rate_limit_reset: Option<String>,
        body: String,
    },
}

impl Classify for HttpFault {
    fn classify(&self) -> ClassifiedFault {
        match self {
            Self::Transport {
                message,
                timeout,
                connect,
            } => {
                if *timeout || *connect {
                    ClassifiedFault::retryable(message.clone())
                } else {
                    classify_message(message)
                }
            }
            Self::Status {
                status,
                retry_after,
                rate_limit_reset,
                body,
            } => {
                let hint = retry_after
                    .as_deref()
                    .and_then(parse_retry_after)
                    .or_else(|| rate_limit_reset.as_deref().and_then(parse_retry_after));
                let message = format!("upstream returned status {status}: {}", excerpt(body));
                classify_status(*status, hint, &message)
            }
        }
    }
}

/// Native failure of an LLM SDK call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LlmFault {
    pub status: Option<u16>,
    /// SDK error code such as `rate_limit_exceeded` or `server_error`.
    pub code: Option<String>,
    pub message: String,
    pub retry_after: Option<String>,
}

impl Classify for LlmFault {
    fn classify(&self) -> ClassifiedFault {
        let hint = self.retry_after.as_deref().and_then(parse_retry_after);
        if let Some(status) = self.status {
            return classify_status(status, hint, &self.message);
        }

        match self.code.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("rate_limit_exceeded" | "rate_limit_error" | "rate_limited") => {
                ClassifiedFault::retryable_after(self.message.clone(), hint)
            }
            Some(
                "server_error" | "api_error" | "overloaded_error" | "service_unavailable"
                | "timeout" | "api_timeout_error" | "api_connection_error",
            ) => ClassifiedFault::retryable_after(self.message.clone(), hint),
            Some(
                "invalid_request_error" | "authentication_error" | "permission_error"
                | "not_found_error" | "insufficient_quota",
            ) => ClassifiedFault::terminal(self.message.clone()),
            _ => classify_message(&self.message),
        }
    }
}

fn excerpt(body: &str) -> &str {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body;
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
