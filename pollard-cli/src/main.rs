//! Pollard CLI: run the research pipeline over a batch of collected items.

mod commands;

use clap::Parser;
use pollard_core::{Mode, ReportFormat};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Pollard: enrich, interpret and rank research results
#[derive(Parser, Debug)]
#[command(name = "pollard", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Configuration file path (replaces user and workspace config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Fetch, synthesize and score a batch of search results
    Run(RunArgs),
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// JSON file with an array of raw items
    #[arg(short, long)]
    input: PathBuf,

    /// Research query the items are judged against
    #[arg(long)]
    query: String,

    /// Work level: quick, balanced, deep
    #[arg(short, long, default_value = "balanced")]
    mode: Mode,

    /// Agent command, e.g. "claude" (overrides config)
    #[arg(short, long)]
    agent: Option<String>,

    /// Items synthesized in balanced mode (0 = all)
    #[arg(short, long)]
    limit: Option<usize>,

    /// Output format: summary, detailed, json
    #[arg(short, long, default_value = "summary")]
    format: ReportFormat,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep at most this many items (0 = all)
    #[arg(long, default_value_t = 0)]
    max_results: usize,

    /// Minimum stars for repositories
    #[arg(long, default_value_t = 0)]
    min_stars: u64,

    /// Minimum points for stories
    #[arg(long, default_value_t = 0)]
    min_points: u64,

    /// Only keep these item types or categories (repeatable)
    #[arg(long = "category")]
    categories: Vec<String>,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file in the workspace
    Init,
    /// Show the effective configuration
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
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "pollard", "pollard")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "pollard.log");
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
