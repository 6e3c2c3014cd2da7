mod cli;
mod commands;
mod cursor_store;
mod error;
mod metadata;

use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling cycle");
            on_signal.cancel();
        }
    });

    let result = commands::run(&cli, shutdown).await?;
    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&result.data)?
    } else {
        serde_json::to_string(&result.data)?
    };
    println!("{rendered}");

    if let Some(failed) = result.failed_keys {
        return Err(CliError::AllKeysFailed { failed });
    }

    Ok(ExitCode::SUCCESS)
}
