use std::sync::Arc;
use std::time::Instant;

use ferrofeed_core::{
    FeedConfig, FeedSource, FetchOrchestrator, FinnhubClient, FinnhubCompanyNews, FinnhubMarketNews,
    FinnhubQuotes, RedditPosts, SourceKey,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use crate::cli::{FeedKind, PollArgs};
use crate::commands::CommandResult;
use crate::cursor_store::{self, CursorMap};
use crate::error::CliError;
use crate::metadata::{CycleId, CycleMetadata, CycleOutput};

pub async fn run(
    args: &PollArgs,
    config: &FeedConfig,
    shutdown: CancellationToken,
) -> Result<CommandResult, CliError> {
    let keys = resolve_keys(args.feed, &args.symbols)?;
    let mut cursors = match &args.cursors {
        Some(path) => cursor_store::load(path, args.feed.as_str())?,
        None => CursorMap::new(),
    };

    let source = build_source(args.feed, config);
    let provider = source.id();
    let orchestrator = FetchOrchestrator::new(source)
        .with_config(config.orchestrator)
        .with_shutdown(shutdown);

    let cycle_id = CycleId::new_v4();
    let span = info_span!("cycle", cycle_id = %cycle_id, feed = args.feed.as_str());
    let started = Instant::now();
    let report = orchestrator.fetch_all(&keys, &cursors).instrument(span).await;
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let mut meta = CycleMetadata::new(cycle_id, provider, args.feed.as_str(), latency_ms);
    for warning in credential_warnings(args.feed, config) {
        meta.push_warning(warning);
    }

    if args.save {
        if let Some(path) = &args.cursors {
            report.apply_to(&mut cursors);
            cursor_store::save(path, args.feed.as_str(), &cursors)?;
            info!(path = %path.display(), keys = cursors.len(), "cursors saved");
        }
    }

    let failed_keys = report.failures.len();
    let all_failed = report.all_failed();
    let data = serde_json::to_value(CycleOutput { meta, report })?;

    let result = CommandResult::ok(data);
    Ok(if all_failed {
        result.with_failed_keys(failed_keys)
    } else {
        result
    })
}

fn resolve_keys(feed: FeedKind, symbols: &[String]) -> Result<Vec<SourceKey>, CliError> {
    if symbols.is_empty() {
        return match feed {
            FeedKind::MarketNews => Ok(vec![SourceKey::All]),
            _ => Err(CliError::Command(format!(
                "'{}' needs at least one symbol",
                feed.as_str()
            ))),
        };
    }

    symbols
        .iter()
        .map(|symbol| SourceKey::parse(symbol).map_err(CliError::from))
        .collect()
}

fn build_source(feed: FeedKind, config: &FeedConfig) -> Arc<dyn FeedSource> {
    match feed {
        FeedKind::CompanyNews => Arc::new(FinnhubCompanyNews::new(FinnhubClient::new(&config.finnhub))),
        FeedKind::MarketNews => Arc::new(FinnhubMarketNews::new(FinnhubClient::new(&config.finnhub))),
        FeedKind::Quotes => Arc::new(FinnhubQuotes::new(FinnhubClient::new(&config.finnhub))),
        FeedKind::Social => Arc::new(RedditPosts::new(&config.reddit)),
    }
}

fn credential_warnings(feed: FeedKind, config: &FeedConfig) -> Vec<String> {
    match feed {
        FeedKind::Social if config.reddit.token.is_none() => vec![String::from(
            "FERROFEED_REDDIT_TOKEN is not set, using the public endpoint",
        )],
        FeedKind::Social => Vec::new(),
        _ if config.finnhub.api_key.is_none() => {
            vec![String::from("FERROFEED_FINNHUB_API_KEY is not set")]
        }
        _ => Vec::new(),
    }
}
