mod policies;
mod poll;

use ferrofeed_core::FeedConfig;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    /// Set when a poll ran against at least one key and none completed.
    pub failed_keys: Option<usize>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            failed_keys: None,
        }
    }

    pub fn with_failed_keys(mut self, failed_keys: usize) -> Self {
        self.failed_keys = Some(failed_keys);
        self
    }
}

pub async fn run(cli: &Cli, shutdown: CancellationToken) -> Result<CommandResult, CliError> {
    let config = FeedConfig::from_env()?;

    match &cli.command {
        Command::Poll(args) => poll::run(args, &config, shutdown).await,
        Command::Policies => policies::run(&config),
    }
}
