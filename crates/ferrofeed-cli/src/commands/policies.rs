use ferrofeed_core::{FeedConfig, ProviderFamily, RetryPolicy};
use serde_json::{json, Value};

use crate::commands::CommandResult;
use crate::error::CliError;

pub fn run(config: &FeedConfig) -> Result<CommandResult, CliError> {
    let families: Vec<Value> = ProviderFamily::ALL
        .into_iter()
        .map(|family| describe(family, config.policy_for(family)))
        .collect();

    Ok(CommandResult::ok(json!({
        "families": families,
        "orchestrator": {
            "max_concurrency": config.orchestrator.max_concurrency,
            "cycle_timeout_seconds": config.orchestrator.cycle_timeout.map(|timeout| timeout.as_secs_f64()),
        },
    })))
}

fn describe(family: ProviderFamily, policy: &RetryPolicy) -> Value {
    json!({
        "family": family.as_str(),
        "timeout_seconds": policy.timeout().as_secs_f64(),
        "max_retries": policy.max_retries(),
        "attempts": policy.attempts(),
        "backoff_base_seconds": policy.base().as_secs_f64(),
        "backoff_multiplier": policy.multiplier(),
        "backoff_jitter_seconds": policy.jitter().as_secs_f64(),
    })
}
