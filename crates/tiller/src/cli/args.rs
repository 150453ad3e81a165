use clap::Parser;
use std::path::PathBuf;
use tiller_tools::Mode;

/// A terminal coding agent that works on a local repository through MCP capability providers.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None, author)]
pub struct Cli {
    /// Repository to work in (defaults to the current directory)
    #[arg(long, value_name = "PATH")]
    pub repo_path: Option<PathBuf>,

    /// Model identifier (e.g. 'codex-mini-latest', 'o3', 'o4-mini')
    #[arg(short, long)]
    pub model: Option<String>,

    /// Operating mode: default, plan or autonomous
    #[arg(long)]
    pub mode: Option<Mode>,

    /// Run a single prompt without the interactive prompt
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// API key for the reasoning engine
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// GitHub token; enables the GitHub provider
    #[arg(long, env = "GITHUB_PERSONAL_ACCESS_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Engine bridge command line, e.g. "node bridge.js"
    #[arg(long, env = "TILLER_ENGINE")]
    pub engine: Option<String>,

    /// Path to a TOML config file (defaults to ~/.tiller/config.toml when present)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Maximum engine turns per prompt
    #[arg(long)]
    pub max_turns: Option<u32>,

    /// Skip the git/node/docker environment checks
    #[arg(long)]
    pub skip_preflight: bool,
}
