use std::sync::Arc;

use serde_json::Value;
use time::Duration;
use tracing::debug;

use crate::config::FinnhubOptions;
use crate::cursor::{CursorKind, FetchWindow, WindowConfig, DEFAULT_OVERLAP};
use crate::data_source::{fields, AttemptFuture, FeedSource};
use crate::fault::{ClassifiedFault, Classify};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, RateLimitReset, ReqwestHttpClient};
use crate::retry::RetryPolicy;
use crate::throttling::Throttle;
use crate::{
    FetchItem, ItemPayload, NewsArticle, PriceQuote, ProviderId, SourceKey, Symbol,
};

/// Shared Finnhub transport: token header, local quota and fault mapping.
///
/// The three endpoint sources hold clones of one client so they draw from the
/// same request budget.
#[derive(Clone)]
pub struct FinnhubClient {
    http: Arc<dyn HttpClient>,
    base_url: String,
    api_key: Option<String>,
    throttle: Throttle,
    retry_policy: RetryPolicy,
    market_news_category: String,
}

impl std::fmt::Debug for FinnhubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinnhubClient")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl FinnhubClient {
    pub fn new(options: &FinnhubOptions) -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()), options)
    }

    pub fn with_http_client(http: Arc<dyn HttpClient>, options: &FinnhubOptions) -> Self {
        Self {
            http,
            base_url: options.base_url.trim_end_matches('/').to_owned(),
            api_key: options.api_key.clone(),
            throttle: Throttle::per_minute(ProviderId::Finnhub, options.requests_per_minute),
            retry_policy: options.retry_policy.clone(),
            market_news_category: options.market_news_category.clone(),
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ClassifiedFault> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ClassifiedFault::terminal(
                "finnhub api key is not configured (set FERROFEED_FINNHUB_API_KEY)",
            ));
        };
        self.throttle.acquire()?;

        let query = query
            .iter()
            .map(|(name, value)| format!("{name}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}/{path}?{query}", self.base_url);
        debug!(provider = "finnhub", url = %url, "issuing request");

        let request = HttpRequest::get(url).with_auth(&HttpAuth::Header {
            name: String::from("X-Finnhub-Token"),
            value: api_key.to_owned(),
        });

        let response = self
            .http
            .execute(request)
            .await
            .and_then(|response| response.into_result(RateLimitReset::EpochSeconds))
            .map_err(|fault| fault.classify())?;

        serde_json::from_str(&response.body).map_err(|error| {
            ClassifiedFault::terminal(format!("finnhub returned invalid JSON: {error}"))
        })
    }
}

fn require_symbol(key: &SourceKey, endpoint: &str) -> Result<Symbol, ClassifiedFault> {
    key.symbol().cloned().ok_or_else(|| {
        ClassifiedFault::terminal(format!("finnhub {endpoint} requires a symbol key, got {key}"))
    })
}

fn parse_article(record: &Value) -> Option<(NewsArticle, crate::UtcDateTime)> {
    let published_at = fields::unix_time(record, "datetime")?;
    if published_at.unix_timestamp() <= 0 {
        return None;
    }
    let article = NewsArticle {
        headline: fields::owned(record, "headline")?,
        summary: fields::owned(record, "summary"),
        url: fields::owned(record, "url")?,
        publisher: fields::owned(record, "source"),
        category: fields::owned(record, "category"),
    };
    Some((article, published_at))
}

/// Per-symbol company news, windowed by calendar date.
#[derive(Debug, Clone)]
pub struct FinnhubCompanyNews {
    client: FinnhubClient,
}

impl FinnhubCompanyNews {
    pub fn new(client: FinnhubClient) -> Self {
        Self { client }
    }
}

impl FeedSource for FinnhubCompanyNews {
    fn id(&self) -> ProviderId {
        ProviderId::Finnhub
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::Timestamp
    }

    fn window_config(&self) -> WindowConfig {
        WindowConfig::lookback_days(7)
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.client.retry_policy.clone()
    }

    fn attempt<'a>(&'a self, key: &'a SourceKey, window: &'a FetchWindow) -> AttemptFuture<'a> {
        Box::pin(async move {
            let symbol = require_symbol(key, "company news")?;
            self.client
                .get_json(
                    "company-news",
                    &[
                        ("symbol", symbol.as_str().to_owned()),
                        ("from", window.lower_bound.date_string()),
                        ("to", window.upper_bound.date_string()),
                    ],
                )
                .await
        })
    }

    fn parse_record(&self, key: &SourceKey, record: &Value) -> Option<FetchItem> {
        let (article, published_at) = parse_article(record)?;
        let unique_key = article.url.clone();
        let item = FetchItem::new(key.clone(), published_at, unique_key, ItemPayload::News(article));
        Some(match fields::unsigned(record, "id") {
            Some(id) => item.with_sequence(id),
            None => item,
        })
    }
}

/// Market-wide news under the `ALL` key, resumed by article id.
#[derive(Debug, Clone)]
pub struct FinnhubMarketNews {
    client: FinnhubClient,
}

impl FinnhubMarketNews {
    pub fn new(client: FinnhubClient) -> Self {
        Self { client }
    }
}

impl FeedSource for FinnhubMarketNews {
    fn id(&self) -> ProviderId {
        ProviderId::Finnhub
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::NumericId
    }

    fn window_config(&self) -> WindowConfig {
        WindowConfig::new(Duration::days(1), DEFAULT_OVERLAP)
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.client.retry_policy.clone()
    }

    fn attempt<'a>(&'a self, key: &'a SourceKey, window: &'a FetchWindow) -> AttemptFuture<'a> {
        Box::pin(async move {
            if key != &SourceKey::All {
                return Err(ClassifiedFault::terminal(format!(
                    "finnhub market news is only available for the ALL key, got {key}"
                )));
            }

            let mut query = vec![("category", self.client.market_news_category.clone())];
            if let Some(min_id) = window.min_id {
                query.push(("minId", min_id.to_string()));
            }
            self.client.get_json("news", &query).await
        })
    }

    fn parse_record(&self, key: &SourceKey, record: &Value) -> Option<FetchItem> {
        let id = fields::unsigned(record, "id").filter(|id| *id > 0)?;
        let (article, published_at) = parse_article(record)?;
        Some(
            FetchItem::new(
                key.clone(),
                published_at,
                format!("finnhub:{id}"),
                ItemPayload::News(article),
            )
            .with_sequence(id),
        )
    }
}

/// Latest price snapshot per symbol.
#[derive(Debug, Clone)]
pub struct FinnhubQuotes {
    client: FinnhubClient,
}

impl FinnhubQuotes {
    pub fn new(client: FinnhubClient) -> Self {
        Self { client }
    }
}

impl FeedSource for FinnhubQuotes {
    fn id(&self) -> ProviderId {
        ProviderId::Finnhub
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::Timestamp
    }

    fn window_config(&self) -> WindowConfig {
        WindowConfig::lookback_days(1)
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.client.retry_policy.clone()
    }

    fn attempt<'a>(&'a self, key: &'a SourceKey, _window: &'a FetchWindow) -> AttemptFuture<'a> {
        Box::pin(async move {
            let symbol = require_symbol(key, "quote")?;
            self.client
                .get_json("quote", &[("symbol", symbol.as_str().to_owned())])
                .await
        })
    }

    /// The quote endpoint answers with a single object.
    fn extract_records(&self, payload: Value) -> Option<Vec<Value>> {
        match payload {
            Value::Object(_) => Some(vec![payload]),
            _ => None,
        }
    }

    fn parse_record(&self, key: &SourceKey, record: &Value) -> Option<FetchItem> {
        let symbol = key.symbol()?.clone();
        let published_at = fields::unix_time(record, "t")?;
        if published_at.unix_timestamp() <= 0 {
            return None;
        }

        // Unknown symbols come back as all-zero quotes.
        let quote = PriceQuote::new(
            symbol.clone(),
            fields::number(record, "c")?,
            fields::number(record, "d"),
            fields::number(record, "dp"),
            fields::number(record, "pc").filter(|close| *close > 0.0),
        )
        .ok()?;

        Some(FetchItem::new(
            key.clone(),
            published_at,
            format!("finnhub:quote:{symbol}:{}", published_at.unix_timestamp()),
            ItemPayload::Price(quote),
        ))
    }
}
