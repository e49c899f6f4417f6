//! CLI subcommand handlers.

use crate::{Commands, ConfigAction, RunArgs};
use anyhow::Context;
use pollard_core::config::{load_config, load_config_file, workspace_config_path};
use pollard_core::{
    Mode, Pipeline, PollardConfig, ReportGenerator, RunOptions, SearchOpts, StaticSearcher,
};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => handle_run(args, workspace, config_path).await,
        Commands::Config { action } => handle_config(action, workspace, config_path),
    }
}

fn resolve_config(workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<PollardConfig> {
    match config_path {
        Some(path) => Ok(load_config_file(path)?),
        None => load_config(Some(workspace), None)
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e)),
    }
}

async fn handle_run(
    args: RunArgs,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    let mut config = resolve_config(workspace, config_path)?;
    if let Some(agent) = args.agent {
        config.synthesis.agent = agent;
    }
    config.validate()?;

    let searcher = StaticSearcher::from_json_file(&args.input)?;
    let pipeline = Pipeline::from_config(&config)?;

    let mut opts = RunOptions::for_mode(args.mode, &config);
    if let Some(limit) = args.limit {
        opts.synthesize.limit = Some(limit);
    }
    opts.search = SearchOpts {
        max_results: args.max_results,
        min_stars: args.min_stars,
        min_points: args.min_points,
        categories: args.categories,
    };

    if args.mode != Mode::Quick && !pipeline.synthesizer().is_enabled() {
        warn!("No agent configured; synthesis will be skipped");
    }

    // Ctrl-C cancels outstanding work; the partial run is still reported.
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling run");
                cancel.cancel();
            }
        })
    };
    let run = pipeline.run(&searcher, &args.query, &opts, &cancel).await;
    watcher.abort();
    let run = run?;

    let report = ReportGenerator::render(&run, args.format)?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, &report)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            info!(path = %path.display(), "Report written");
        }
        None => print!("{report}"),
    }
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }

            let toml_str = toml::to_string_pretty(&PollardConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = resolve_config(workspace, config_path)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
