//! qalogic CLI — robustness reports for judged QA evaluation datasets.

mod commands;
mod output;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// qalogic: accuracy, robustness and retrieval correction by query logic
#[derive(Parser, Debug)]
#[command(name = "qalogic", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds `.qalogic/config.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path, applied on top of every other layer
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

/// Tag alignment across domains.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum AlignArg {
    /// Every domain shares one tag taxonomy
    Global,
    /// Tags are only meaningful within their domain
    Domain,
}

/// Report output format.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FormatArg {
    Text,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print gap / robust / non-robust group statistics per domain
    Report {
        /// Dataset JSON: `{ "<domain>": [result, ...] }`
        dataset: PathBuf,
        /// Tag alignment (defaults to the configured alignment)
        #[arg(long, value_enum)]
        align: Option<AlignArg>,
        /// Output format (defaults to the configured format)
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
        /// Decimal places for ratios
        #[arg(long)]
        decimals: Option<usize>,
        /// Also report retrieval-corrected accuracy and robustness
        #[arg(long)]
        retrieval: bool,
    },
    /// Write a retrieval-corrected copy of a dataset
    Correct {
        /// Dataset JSON
        dataset: PathBuf,
        /// Output path
        #[arg(short, long)]
        output: PathBuf,
        /// Tag alignment (defaults to the configured alignment)
        #[arg(long, value_enum)]
        align: Option<AlignArg>,
    },
    /// Judge every unjudged result with the offline exact-match judge
    Judge {
        /// Dataset JSON
        dataset: PathBuf,
        /// Output path
        #[arg(short, long)]
        output: PathBuf,
        /// Maximum judge calls in flight
        #[arg(long)]
        concurrency: Option<usize>,
        /// Compare answers case-sensitively
        #[arg(long)]
        case_sensitive: bool,
    },
    /// Compare two clusters of the same questions (e.g. short vs. long phrasings)
    Hypothesis {
        /// Results expected to be robust (JSON list)
        robust: PathBuf,
        /// Results expected to be non-robust (JSON list)
        non_robust: PathBuf,
        /// Output format (defaults to the configured format)
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file
    Init,
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "qalogic", "qalogic")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "qalogic.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.config.as_deref()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_report_flags() {
        let cli = Cli::try_parse_from([
            "qalogic",
            "-vv",
            "report",
            "data.json",
            "--align",
            "domain",
            "--format",
            "json",
            "--retrieval",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Report {
                dataset,
                align,
                format,
                retrieval,
                decimals,
            } => {
                assert_eq!(dataset, PathBuf::from("data.json"));
                assert_eq!(align, Some(AlignArg::Domain));
                assert_eq!(format, Some(FormatArg::Json));
                assert!(retrieval);
                assert_eq!(decimals, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_judge_requires_output() {
        assert!(Cli::try_parse_from(["qalogic", "judge", "data.json"]).is_err());
        let cli =
            Cli::try_parse_from(["qalogic", "judge", "data.json", "-o", "out.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Judge { .. }));
    }
}
