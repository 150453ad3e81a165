#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::Parser;
use eyre::{Result, eyre};
use std::path::PathBuf;
use std::sync::Arc;
use tiller::cli::Cli;
use tiller::commands::{Command, headless::HeadlessCommand, repl::ReplCommand};
use tiller::session_config::{SessionConfigLoader, SessionConfigOverrides};
use tiller_core::config::{ApiKey, SessionConfig};
use tiller_core::preflight::run_preflight_checks;
use tiller_core::{McpConnector, ProcessEngineFactory};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    tiller::cli::config::load_env()?;

    match tiller_core::utils::tracing::init_tracing() {
        Ok(Some(path)) => debug!("Logging to {}", path.display()),
        Ok(None) => {}
        Err(e) => eprintln!("Failed to initialize logging: {e}"),
    }

    let repo_path = resolve_repo_path(cli.repo_path.clone())?;
    let github_token = cli.github_token.clone().filter(|t| !t.trim().is_empty());

    let mut config = SessionConfig::new(
        repo_path.clone(),
        ApiKey::new(cli.openai_api_key.clone().unwrap_or_default()),
    )
    .with_github_token(github_token.clone());

    if cli.skip_preflight {
        info!("Preflight checks skipped");
    } else {
        let report = run_preflight_checks(&repo_path, github_token.is_some()).await?;
        for warning in &report.warnings {
            eprintln!("Warning: {warning}");
        }
        config.github_repo = report.github_repo;
        config.branch_name = report.branch_name;
    }

    let loader = SessionConfigLoader::new(cli.config.clone()).with_overrides(
        SessionConfigOverrides {
            model: cli.model.clone(),
            mode: cli.mode,
            max_turns: cli.max_turns,
        },
    );
    if let Some(path) = loader.config_path() {
        debug!(path = %path.display(), "Loading config file");
    }
    let config = loader.load(config).await?;

    let engine_line = cli
        .engine
        .clone()
        .ok_or_else(|| eyre!("No engine configured; pass --engine or set TILLER_ENGINE"))?;
    let engine_factory = Arc::new(ProcessEngineFactory::from_command_line(&engine_line)?);
    let connector = Arc::new(McpConnector);

    info!(
        repo = %config.repo_path.display(),
        model = %config.model,
        mode = %config.mode,
        "Starting tiller"
    );

    match cli.prompt {
        Some(prompt) => {
            HeadlessCommand {
                config,
                prompt,
                connector,
                engine_factory,
            }
            .execute()
            .await
        }
        None => {
            ReplCommand {
                config,
                connector,
                engine_factory,
            }
            .execute()
            .await
        }
    }
}

fn resolve_repo_path(arg: Option<PathBuf>) -> Result<PathBuf> {
    let path = match arg {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    path.canonicalize()
        .map_err(|e| eyre!("Repository path '{}' is not accessible: {e}", path.display()))
}
