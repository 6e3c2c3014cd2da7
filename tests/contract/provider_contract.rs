use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use ferrofeed_core::{
    parse_payload, resolve_window, FeedSource, FinnhubClient, FinnhubCompanyNews,
    FinnhubMarketNews, FinnhubOptions, FinnhubQuotes, HttpClient, HttpResponse, ItemPayload,
    RedditOptions, RedditPosts, SourceKey, UtcDateTime,
};
use ferrofeed_tests::CannedClient;
use serde_json::{json, Value};

struct ProviderCase {
    name: &'static str,
    key: SourceKey,
    source: Arc<dyn FeedSource>,
}

fn canned(status: u16, body: &Value) -> Arc<dyn HttpClient> {
    Arc::new(CannedClient {
        response: HttpResponse {
            status,
            headers: BTreeMap::new(),
            body: body.to_string(),
        },
    })
}

fn company_news_body() -> Value {
    json!([
        {"category": "company", "datetime": 1_717_425_000, "headline": "Apple unveils new chips",
         "id": 127_001, "source": "Reuters", "summary": "Details", "url": "https://news.test/apple-1"},
        {"category": "company", "datetime": 1_717_428_600, "headline": "Apple shares rise",
         "id": 127_002, "source": "Yahoo", "summary": "", "url": "https://news.test/apple-2"}
    ])
}

fn market_news_body() -> Value {
    json!([
        {"category": "general", "datetime": 1_717_428_600, "headline": "Stocks climb",
         "id": 7_351_002, "source": "CNBC", "summary": "Markets", "url": "https://news.test/m-2"},
        {"category": "general", "datetime": 1_717_425_000, "headline": "Futures flat",
         "id": 7_351_001, "source": "MarketWatch", "summary": "", "url": "https://news.test/m-1"}
    ])
}

fn quote_body() -> Value {
    json!({"c": 194.03, "d": 1.12, "dp": 0.58, "h": 194.99, "l": 192.52, "o": 192.9,
           "pc": 192.91, "t": 1_717_430_400})
}

fn reddit_body() -> Value {
    json!({"kind": "Listing", "data": {"children": [
        {"kind": "t3", "data": {"id": "1d7abc", "title": "NVDA split discussion",
         "selftext": "Thoughts?", "created_utc": 1_717_420_000.0, "subreddit": "stocks",
         "permalink": "/r/stocks/comments/1d7abc/nvda_split/", "score": 311}},
        {"kind": "t3", "data": {"id": "1d7abd", "title": "NVDA earnings recap",
         "selftext": "", "created_utc": 1_717_421_000.0, "subreddit": "stocks",
         "permalink": "/r/stocks/comments/1d7abd/nvda_recap/", "score": 57}}
    ]}})
}

fn finnhub_options() -> FinnhubOptions {
    FinnhubOptions {
        api_key: Some(String::from("contract-token")),
        base_url: String::from("https://finnhub.test/api/v1"),
        ..FinnhubOptions::default()
    }
}

fn provider_cases(status: u16) -> Vec<ProviderCase> {
    let reddit = RedditOptions {
        base_url: Some(String::from("https://reddit.test")),
        ..RedditOptions::default()
    };
    let finnhub = |body: &Value| FinnhubClient::with_http_client(canned(status, body), &finnhub_options());

    vec![
        ProviderCase {
            name: "finnhub company news",
            key: SourceKey::parse("AAPL").expect("valid key"),
            source: Arc::new(FinnhubCompanyNews::new(finnhub(&company_news_body()))),
        },
        ProviderCase {
            name: "finnhub market news",
            key: SourceKey::All,
            source: Arc::new(FinnhubMarketNews::new(finnhub(&market_news_body()))),
        },
        ProviderCase {
            name: "finnhub quotes",
            key: SourceKey::parse("AAPL").expect("valid key"),
            source: Arc::new(FinnhubQuotes::new(finnhub(&quote_body()))),
        },
        ProviderCase {
            name: "reddit posts",
            key: SourceKey::parse("NVDA").expect("valid key"),
            source: Arc::new(RedditPosts::with_http_client(canned(status, &reddit_body()), &reddit)),
        },
    ]
}

fn now() -> UtcDateTime {
    UtcDateTime::parse("2024-06-03T16:00:00Z").expect("valid timestamp")
}

async fn fetch_once(case: &ProviderCase) -> Result<Value, ferrofeed_core::ClassifiedFault> {
    let source = case.source.as_ref();
    let window = resolve_window(None, source.cursor_kind(), &source.window_config(), now());
    source.attempt(&case.key, &window).await
}

#[tokio::test]
async fn every_provider_maps_its_payload_into_keyed_items() {
    for case in provider_cases(200) {
        let payload = fetch_once(&case)
            .await
            .unwrap_or_else(|fault| panic!("provider '{}' attempt failed: {fault}", case.name));
        let items = parse_payload(case.source.as_ref(), &case.key, payload)
            .unwrap_or_else(|| panic!("provider '{}': payload shape rejected", case.name));

        assert!(!items.is_empty(), "provider '{}': no items", case.name);

        let mut unique_keys = HashSet::new();
        for item in &items {
            assert_eq!(item.source, case.key, "provider '{}': item key", case.name);
            assert!(!item.unique_key.is_empty(), "provider '{}': unique key", case.name);
            assert!(
                unique_keys.insert(item.unique_key.clone()),
                "provider '{}': duplicate unique key {}",
                case.name,
                item.unique_key
            );
            assert!(
                item.published_at.unix_timestamp() > 0,
                "provider '{}': timestamp",
                case.name
            );
        }
    }
}

#[tokio::test]
async fn numeric_cursor_providers_attach_sequence_ids() {
    for case in provider_cases(200) {
        if case.source.cursor_kind() != ferrofeed_core::CursorKind::NumericId {
            continue;
        }
        let payload = fetch_once(&case).await.expect("attempt");
        let items = parse_payload(case.source.as_ref(), &case.key, payload).expect("payload");
        assert!(
            items.iter().all(|item| item.sequence.is_some()),
            "provider '{}': every item needs an id",
            case.name
        );
    }
}

#[test]
fn garbage_records_are_rejected_without_panicking() {
    let garbage = [
        Value::Null,
        json!(42),
        json!("headline"),
        json!({}),
        json!([]),
        json!({"datetime": -5, "headline": "x", "url": "y", "id": 1}),
        json!({"id": "abc", "created_utc": "yesterday", "title": "t", "permalink": "/p"}),
        json!({"c": 0, "t": 1_717_430_400}),
        json!({"c": -3.5, "t": 1_717_430_400}),
    ];

    for case in provider_cases(200) {
        for record in &garbage {
            assert!(
                case.source.parse_record(&case.key, record).is_none(),
                "provider '{}' accepted {record}",
                case.name
            );
        }
    }
}

#[tokio::test]
async fn server_errors_are_retryable_for_all_providers() {
    for case in provider_cases(503) {
        let fault = fetch_once(&case).await.expect_err("503 must fail");
        assert!(fault.is_retryable(), "provider '{}': 503 classification", case.name);
    }
}

#[tokio::test]
async fn authorization_errors_are_terminal_for_all_providers() {
    for case in provider_cases(403) {
        let fault = fetch_once(&case).await.expect_err("403 must fail");
        assert!(!fault.is_retryable(), "provider '{}': 403 classification", case.name);
    }
}

#[tokio::test]
async fn quote_payload_becomes_a_price_item() {
    let case = provider_cases(200)
        .into_iter()
        .find(|case| case.name == "finnhub quotes")
        .expect("quote case");

    let payload = fetch_once(&case).await.expect("attempt");
    let items = parse_payload(case.source.as_ref(), &case.key, payload).expect("payload");

    assert_eq!(items.len(), 1);
    match &items[0].payload {
        ItemPayload::Price(quote) => {
            assert_eq!(quote.symbol.as_str(), "AAPL");
            assert!((quote.price - 194.03).abs() < f64::EPSILON);
            assert_eq!(quote.previous_close, Some(192.91));
        }
        other => panic!("expected price payload, got {other:?}"),
    }
}

#[tokio::test]
async fn rate_limit_reset_headers_never_produce_unbounded_waits() {
    // Finnhub reports the reset as a unix time, Reddit as a countdown.
    let reset_epoch = time::OffsetDateTime::now_utc().unix_timestamp() + 20;
    let limited = |reset: String| -> Arc<dyn HttpClient> {
        Arc::new(CannedClient {
            response: HttpResponse {
                status: 429,
                headers: BTreeMap::from([(String::from("x-ratelimit-reset"), reset)]),
                body: String::from("{}"),
            },
        })
    };
    let reddit = RedditOptions {
        base_url: Some(String::from("https://reddit.test")),
        ..RedditOptions::default()
    };
    let cases = [
        ProviderCase {
            name: "finnhub company news",
            key: SourceKey::parse("AAPL").expect("valid key"),
            source: Arc::new(FinnhubCompanyNews::new(FinnhubClient::with_http_client(
                limited(reset_epoch.to_string()),
                &finnhub_options(),
            ))),
        },
        ProviderCase {
            name: "reddit posts",
            key: SourceKey::parse("NVDA").expect("valid key"),
            source: Arc::new(RedditPosts::with_http_client(limited(String::from("20")), &reddit)),
        },
    ];

    for case in &cases {
        let fault = fetch_once(case).await.expect_err("429 must fail");
        let wait = fault
            .retry_after()
            .unwrap_or_else(|| panic!("provider '{}': reset header ignored", case.name));
        assert!(fault.is_retryable(), "provider '{}'", case.name);
        assert!(
            wait <= std::time::Duration::from_secs(21),
            "provider '{}': waits {wait:?}",
            case.name
        );
        assert!(
            wait >= std::time::Duration::from_secs(18),
            "provider '{}': waits {wait:?}",
            case.name
        );
    }
}
