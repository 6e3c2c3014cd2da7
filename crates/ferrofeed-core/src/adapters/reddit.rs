use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::RedditOptions;
use crate::cursor::{CursorKind, FetchWindow, TimeFilter, WindowConfig};
use crate::data_source::{fields, AttemptFuture, FeedSource};
use crate::fault::{ClassifiedFault, Classify};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, RateLimitReset, ReqwestHttpClient};
use crate::retry::RetryPolicy;
use crate::{FetchItem, ItemPayload, ProviderId, SocialPost, SourceKey};

/// Subreddit posts: a symbol key searches the community for the ticker, the
/// `ALL` key reads its newest posts.
#[derive(Clone)]
pub struct RedditPosts {
    http: Arc<dyn HttpClient>,
    base_url: String,
    auth: HttpAuth,
    community: String,
    user_agent: String,
    limit: u32,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for RedditPosts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditPosts")
            .field("base_url", &self.base_url)
            .field("community", &self.community)
            .finish_non_exhaustive()
    }
}

impl RedditPosts {
    pub fn new(options: &RedditOptions) -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()), options)
    }

    pub fn with_http_client(http: Arc<dyn HttpClient>, options: &RedditOptions) -> Self {
        Self {
            http,
            base_url: options.effective_base_url().trim_end_matches('/').to_owned(),
            auth: options
                .token
                .clone()
                .map_or(HttpAuth::None, HttpAuth::BearerToken),
            community: options.community.clone(),
            user_agent: options.user_agent.clone(),
            limit: options.limit.clamp(1, 100),
            retry_policy: options.retry_policy.clone(),
        }
    }

    fn request_url(&self, key: &SourceKey, window: &FetchWindow) -> String {
        let time_filter = match window.time_filter() {
            TimeFilter::Wide => "week",
            TimeFilter::Narrow => "day",
        };
        match key {
            SourceKey::Symbol(symbol) => format!(
                "{}/r/{}/search.json?q={}&restrict_sr=1&sort=new&t={time_filter}&limit={}&raw_json=1",
                self.base_url,
                urlencoding::encode(&self.community),
                urlencoding::encode(symbol.as_str()),
                self.limit,
            ),
            SourceKey::All => format!(
                "{}/r/{}/new.json?t={time_filter}&limit={}&raw_json=1",
                self.base_url,
                urlencoding::encode(&self.community),
                self.limit,
            ),
        }
    }
}

impl FeedSource for RedditPosts {
    fn id(&self) -> ProviderId {
        ProviderId::Reddit
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::Timestamp
    }

    fn window_config(&self) -> WindowConfig {
        WindowConfig::lookback_days(7)
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy.clone()
    }

    fn attempt<'a>(&'a self, key: &'a SourceKey, window: &'a FetchWindow) -> AttemptFuture<'a> {
        Box::pin(async move {
            let url = self.request_url(key, window);
            debug!(provider = "reddit", key = %key, url = %url, "issuing request");

            let request = HttpRequest::get(url)
                .with_header("user-agent", self.user_agent.as_str())
                .with_auth(&self.auth);
            let response = self
                .http
                .execute(request)
                .await
                .and_then(|response| response.into_result(RateLimitReset::DeltaSeconds))
                .map_err(|fault| fault.classify())?;

            serde_json::from_str(&response.body).map_err(|error| {
                ClassifiedFault::terminal(format!("reddit returned invalid JSON: {error}"))
            })
        })
    }

    /// Listings wrap posts as `data.children[].data`.
    fn extract_records(&self, payload: Value) -> Option<Vec<Value>> {
        let Value::Object(mut listing) = payload else {
            return None;
        };
        let Value::Object(mut data) = listing.remove("data")? else {
            return None;
        };
        let Value::Array(children) = data.remove("children")? else {
            return None;
        };

        Some(
            children
                .into_iter()
                .map(|child| match child {
                    Value::Object(mut object) => {
                        object.remove("data").unwrap_or(Value::Object(object))
                    }
                    other => other,
                })
                .collect(),
        )
    }

    fn parse_record(&self, key: &SourceKey, record: &Value) -> Option<FetchItem> {
        let id = fields::text(record, "id")?;
        let published_at = fields::unix_time(record, "created_utc")?;
        let permalink = fields::text(record, "permalink")?;

        let post = SocialPost {
            community: fields::owned(record, "subreddit").unwrap_or_else(|| self.community.clone()),
            title: fields::owned(record, "title")?,
            body: fields::owned(record, "selftext"),
            permalink: format!("https://www.reddit.com{permalink}"),
            score: record.get("score").and_then(Value::as_i64).unwrap_or(0),
        };

        Some(FetchItem::new(
            key.clone(),
            published_at,
            format!("reddit:{id}"),
            ItemPayload::Social(post),
        ))
    }
}
