//! CLI argument definitions for Ferrofeed.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `poll` | Run one incremental fetch cycle against a feed |
//! | `policies` | Print the effective retry policies |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! # First run: bootstrap over the lookback window and store cursors
//! ferrofeed poll company-news AAPL MSFT --cursors cursors.json --save
//!
//! # Later runs only print items newer than the stored cursors
//! ferrofeed poll company-news AAPL MSFT --cursors cursors.json --save
//!
//! # Market-wide news uses the ALL key
//! ferrofeed poll market-news --pretty
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// 🦀 Ferrofeed - Fault-tolerant incremental feed poller
///
/// Polls Finnhub and Reddit with retries, backoff and per-key cursors so
/// consecutive runs deliver only new items.
#[derive(Debug, Parser)]
#[command(
    name = "ferrofeed",
    author,
    version,
    about = "Fault-tolerant incremental feed poller",
    long_about = "Ferrofeed polls market data, news and social feeds and prints new items \
as JSON. Features include:\n\
\n\
  • Retry with exponential backoff and server wait hints\n\
  • Per-key cursors with bounded duplicates and no gaps\n\
  • Bounded concurrency with per-key failure isolation\n\
\n\
Logging goes to stderr and is controlled by RUST_LOG.\n\
Use 'ferrofeed <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// 📰 Run one fetch cycle and print the new items.
    ///
    /// # Examples
    ///
    ///   ferrofeed poll quotes AAPL
    ///   ferrofeed poll social NVDA TSLA --cursors cursors.json --save
    Poll(PollArgs),

    /// 🔁 Print the effective retry policy of every provider family.
    Policies,
}

/// Feed selected by `poll`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FeedKind {
    /// Finnhub company news per symbol.
    CompanyNews,
    /// Finnhub market-wide news (ALL key).
    MarketNews,
    /// Finnhub price quotes per symbol.
    Quotes,
    /// Reddit posts mentioning each symbol.
    Social,
}

impl FeedKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CompanyNews => "company-news",
            Self::MarketNews => "market-news",
            Self::Quotes => "quotes",
            Self::Social => "social",
        }
    }
}

/// Arguments for the `poll` command.
#[derive(Debug, Args)]
pub struct PollArgs {
    /// Feed to poll.
    #[arg(value_enum)]
    pub feed: FeedKind,

    /// Symbols to poll, or ALL. Market news defaults to ALL.
    pub symbols: Vec<String>,

    /// JSON file holding the cursor map from a previous run.
    #[arg(long)]
    pub cursors: Option<PathBuf>,

    /// Write the advanced cursors back to `--cursors`.
    #[arg(long, default_value_t = false, requires = "cursors")]
    pub save: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_parses_feed_symbols_and_cursor_file() {
        let cli = Cli::parse_from([
            "ferrofeed",
            "poll",
            "company-news",
            "AAPL",
            "MSFT",
            "--cursors",
            "state.json",
            "--save",
            "--pretty",
        ]);

        assert!(cli.pretty);
        let Command::Poll(args) = cli.command else {
            panic!("expected poll");
        };
        assert_eq!(args.feed, FeedKind::CompanyNews);
        assert_eq!(args.symbols, vec!["AAPL", "MSFT"]);
        assert_eq!(args.cursors, Some(PathBuf::from("state.json")));
        assert!(args.save);
    }

    #[test]
    fn save_without_cursor_file_is_rejected() {
        let result = Cli::try_parse_from(["ferrofeed", "poll", "quotes", "AAPL", "--save"]);
        assert!(result.is_err());
    }

    #[test]
    fn policies_takes_no_arguments() {
        let cli = Cli::parse_from(["ferrofeed", "policies"]);
        assert!(matches!(cli.command, Command::Policies));
    }
}
