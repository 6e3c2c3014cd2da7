use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use time::OffsetDateTime;

use crate::fault::HttpFault;

/// How a provider counts time in its `x-ratelimit-reset` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitReset {
    /// Seconds until the quota window resets (Reddit).
    DeltaSeconds,
    /// Unix time at which the quota window resets (Finnhub).
    EpochSeconds,
}

impl RateLimitReset {
    /// Rewrites a header value as seconds from `now_unix`, floored at zero.
    ///
    /// Unparseable epoch values are dropped so the engine falls back to backoff.
    pub fn seconds_from(self, value: &str, now_unix: i64) -> Option<String> {
        match self {
            Self::DeltaSeconds => Some(value.to_owned()),
            Self::EpochSeconds => {
                let reset = value.trim().parse::<f64>().ok().filter(|reset| reset.is_finite())?;
                let remaining = (reset - now_unix as f64).max(0.0).ceil();
                Some(format!("{remaining}"))
            }
        }
    }
}

/// Authentication strategy applied to outgoing requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpAuth {
    None,
    BearerToken(String),
    Header { name: String, value: String },
}

impl HttpAuth {
    pub fn apply(&self, headers: &mut BTreeMap<String, String>) {
        match self {
            Self::None => {}
            Self::BearerToken(token) => {
                headers.insert(String::from("authorization"), format!("Bearer {token}"));
            }
            Self::Header { name, value } => {
                headers.insert(name.to_ascii_lowercase(), value.clone());
            }
        }
    }
}

/// GET request envelope used by feed adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_auth(mut self, auth: &HttpAuth) -> Self {
        auth.apply(&mut self.headers);
        self
    }
}

/// Response envelope. Header names are lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Converts a non-2xx response into the native fault, keeping the wait
    /// headers for classification. The reset header is normalised to
    /// seconds from now according to `reset`.
    pub fn into_result(self, reset: RateLimitReset) -> Result<Self, HttpFault> {
        self.into_result_at(reset, OffsetDateTime::now_utc().unix_timestamp())
    }

    fn into_result_at(self, reset: RateLimitReset, now_unix: i64) -> Result<Self, HttpFault> {
        if self.is_success() {
            return Ok(self);
        }
        Err(HttpFault::Status {
            status: self.status,
            retry_after: self.header("retry-after").map(str::to_owned),
            rate_limit_reset: self
                .header("x-ratelimit-reset")
                .and_then(|value| reset.seconds_from(value, now_unix)),
            body: self.body,
        })
    }
}

/// Transport seam; adapters never talk to reqwest directly.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpFault>> + Send + 'a>>;
}

/// Production transport backed by reqwest.
///
/// Per-attempt deadlines are enforced by the retry engine, not here.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(concat!("ferrofeed/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpFault>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = self.client.get(&request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(transport_fault)?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_ascii_lowercase(), value.to_owned()))
                })
                .collect();
            let body = response.text().await.map_err(transport_fault)?;

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}

fn transport_fault(error: reqwest::Error) -> HttpFault {
    HttpFault::Transport {
        message: error.to_string(),
        timeout: error.is_timeout(),
        connect: error.is_connect(),
    }
}
