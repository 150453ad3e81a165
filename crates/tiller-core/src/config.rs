use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use tiller_tools::{Mode, providers};

pub const DEFAULT_MODEL: &str = "codex-mini-latest";
pub const DEFAULT_MAX_TURNS: u32 = 100;

/// Commands the command-execution provider may run.
pub const ALLOWED_CLI_COMMANDS: &[&str] = &[
    "grep",
    "rg",
    "find",
    "ls",
    "cat",
    "head",
    "tail",
    "wc",
    "pwd",
    "echo",
    "sed",
    "awk",
    "sort",
    "uniq",
    "fzf",
    "bat",
    "git",
    "uv",
    "pip",
    "pipdeptree",
    "pre-commit",
    "xargs",
    "which",
];

pub const ALLOWED_CLI_FLAGS: &[&str] = &["all"];

/// Set on providers that can commit; the installed commit-msg hook keys on it.
pub const AGENT_ENV_VAR: &str = "TILLER_AGENT";

const FILESYSTEM_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
const PROVIDER_STARTUP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Repository path does not exist: {0}")]
    MissingRepoPath(PathBuf),

    #[error("Model identifier cannot be empty")]
    EmptyModel,

    #[error("An API key is required (set OPENAI_API_KEY or pass --openai-api-key)")]
    MissingApiKey,

    #[error("max_turns must be at least 1")]
    InvalidMaxTurns,

    #[error("Provider name cannot be empty")]
    EmptyProviderName,

    #[error("Provider '{0}' has an empty command")]
    EmptyProviderCommand(String),

    #[error("Provider '{0}' is configured more than once")]
    DuplicateProvider(String),

    #[error("The '{0}' provider must be configured and required")]
    FilesystemProviderRequired(&'static str),
}

/// Credential for the reasoning engine. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// How to launch one capability provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(with = "duration_secs", default = "default_startup_timeout")]
    pub startup_timeout: Duration,
    /// A required provider that fails to start aborts the session.
    #[serde(default)]
    pub required: bool,
}

fn default_startup_timeout() -> Duration {
    PROVIDER_STARTUP_TIMEOUT
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

impl ProviderSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            startup_timeout: PROVIDER_STARTUP_TIMEOUT,
            required: false,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// The stock provider set, in start order.
pub fn default_providers(repo_path: &std::path::Path, github_token: Option<&str>) -> Vec<ProviderSpec> {
    let repo = repo_path.to_string_lossy().to_string();

    let mut specs = vec![
        ProviderSpec::new(providers::FILESYSTEM, "npx")
            .with_args(["-y", "@modelcontextprotocol/server-filesystem", repo.as_str()])
            .with_startup_timeout(FILESYSTEM_STARTUP_TIMEOUT)
            .required(),
        ProviderSpec::new(providers::CLI, "cli-mcp-server")
            .with_env("ALLOWED_DIR", repo.as_str())
            .with_env("ALLOWED_COMMANDS", ALLOWED_CLI_COMMANDS.join(","))
            .with_env("ALLOWED_FLAGS", ALLOWED_CLI_FLAGS.join(","))
            .with_env("ALLOW_SHELL_OPERATORS", "true")
            .with_env("COMMAND_TIMEOUT", "120")
            .with_env(AGENT_ENV_VAR, "1"),
        ProviderSpec::new(providers::GIT, "mcp-server-git")
            .with_args(["--repository", repo.as_str()])
            .with_env(AGENT_ENV_VAR, "1"),
    ];

    if let Some(token) = github_token.filter(|t| !t.trim().is_empty()) {
        specs.push(
            ProviderSpec::new(providers::GITHUB, "docker")
                .with_args([
                    "run",
                    "-i",
                    "--rm",
                    "-e",
                    "GITHUB_PERSONAL_ACCESS_TOKEN",
                    "ghcr.io/github/github-mcp-server",
                ])
                .with_env("GITHUB_PERSONAL_ACCESS_TOKEN", token),
        );
    }

    specs
}

/// Everything a session needs, resolved from CLI, environment and config file.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub repo_path: PathBuf,
    pub model: String,
    pub mode: Mode,
    pub api_key: ApiKey,
    pub github_token: Option<String>,
    /// `owner/repo` slug detected from the origin remote
    pub github_repo: Option<String>,
    pub branch_name: Option<String>,
    pub max_turns: u32,
    pub providers: Vec<ProviderSpec>,
}

impl SessionConfig {
    pub fn new(repo_path: PathBuf, api_key: ApiKey) -> Self {
        let providers = default_providers(&repo_path, None);
        Self {
            repo_path,
            model: DEFAULT_MODEL.to_string(),
            mode: Mode::Default,
            api_key,
            github_token: None,
            github_repo: None,
            branch_name: None,
            max_turns: DEFAULT_MAX_TURNS,
            providers,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_github_token(mut self, token: Option<String>) -> Self {
        self.github_token = token;
        self.providers = default_providers(&self.repo_path, self.github_token.as_deref());
        self
    }

    pub fn with_providers(mut self, providers: Vec<ProviderSpec>) -> Self {
        self.providers = providers;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.repo_path.exists() {
            return Err(ConfigError::MissingRepoPath(self.repo_path.clone()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.max_turns == 0 {
            return Err(ConfigError::InvalidMaxTurns);
        }

        let mut seen = std::collections::HashSet::new();
        for spec in &self.providers {
            if spec.name.trim().is_empty() {
                return Err(ConfigError::EmptyProviderName);
            }
            if spec.command.trim().is_empty() {
                return Err(ConfigError::EmptyProviderCommand(spec.name.clone()));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateProvider(spec.name.clone()));
            }
        }

        if !self
            .providers
            .iter()
            .any(|spec| spec.name == providers::FILESYSTEM && spec.required)
        {
            return Err(ConfigError::FilesystemProviderRequired(providers::FILESYSTEM));
        }
        Ok(())
    }
}
