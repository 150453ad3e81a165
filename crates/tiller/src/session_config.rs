use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tiller_core::config::{ProviderSpec, SessionConfig};
use tiller_core::utils::default_config_path;
use tiller_tools::Mode;
use tokio::fs;
use tracing::{debug, info};

/// Config file validation errors
#[derive(Debug, Error)]
pub enum SessionConfigError {
    #[error("Provider name cannot be empty")]
    EmptyProviderName,

    #[error("Provider '{0}' is new and needs a command")]
    MissingProviderCommand(String),

    #[error("Provider '{0}' is required and cannot be disabled")]
    RequiredProviderDisabled(String),

    #[error("Provider '{0}' is required and cannot be made optional")]
    RequiredProviderMadeOptional(String),

    #[error("max_turns must be at least 1")]
    InvalidMaxTurns,
}

/// Session settings loadable from TOML. Every field is optional so a file
/// only needs what it changes.
#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialSessionConfig {
    pub model: Option<String>,
    pub mode: Option<Mode>,
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub providers: Vec<PartialProviderSpec>,
    #[serde(default)]
    pub disabled_providers: Vec<String>,
}

/// A provider entry. Matches a default provider by `name`, or adds a new one.
#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialProviderSpec {
    pub name: String,
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub startup_timeout_secs: Option<u64>,
    pub required: Option<bool>,
}

impl PartialProviderSpec {
    fn apply_to(self, spec: &mut ProviderSpec) {
        if let Some(command) = self.command {
            spec.command = command;
        }
        if let Some(args) = self.args {
            spec.args = args;
        }
        spec.env.extend(self.env);
        if let Some(secs) = self.startup_timeout_secs {
            spec.startup_timeout = Duration::from_secs(secs);
        }
        if let Some(required) = self.required {
            spec.required = required;
        }
    }

    fn into_spec(self) -> Result<ProviderSpec, SessionConfigError> {
        let command = self
            .command
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| SessionConfigError::MissingProviderCommand(self.name.clone()))?;
        let mut spec = ProviderSpec::new(self.name.clone(), command);
        self.apply_to(&mut spec);
        Ok(spec)
    }
}

/// Command-line values; they win over the config file.
#[derive(Debug, Default)]
pub struct SessionConfigOverrides {
    pub model: Option<String>,
    pub mode: Option<Mode>,
    pub max_turns: Option<u32>,
}

/// Loads the config file (if any) over a base config and applies overrides
pub struct SessionConfigLoader {
    config_path: Option<PathBuf>,
    overrides: SessionConfigOverrides,
}

impl SessionConfigLoader {
    /// An explicit path must exist. Without one, `~/.tiller/config.toml`
    /// is read when present.
    pub fn new(config_path: Option<PathBuf>) -> Self {
        let config_path = config_path.or_else(|| default_config_path().filter(|p| p.exists()));
        debug!("Loading session config from: {:?}", config_path);
        Self {
            config_path,
            overrides: SessionConfigOverrides::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: SessionConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub async fn load(&self, base: SessionConfig) -> Result<SessionConfig> {
        let mut config = base;

        if let Some(path) = &self.config_path {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let partial: PartialSessionConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config from: {}", path.display()))?;

            merge_partial(&mut config, partial)?;
            info!("Loaded config file {}", path.display());
        }

        self.apply_overrides(&mut config)?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut SessionConfig) -> Result<(), SessionConfigError> {
        if let Some(model) = &self.overrides.model {
            config.model = model.clone();
        }
        if let Some(mode) = self.overrides.mode {
            config.mode = mode;
        }
        if let Some(max_turns) = self.overrides.max_turns {
            if max_turns == 0 {
                return Err(SessionConfigError::InvalidMaxTurns);
            }
            config.max_turns = max_turns;
        }
        Ok(())
    }
}

fn merge_partial(
    config: &mut SessionConfig,
    partial: PartialSessionConfig,
) -> Result<(), SessionConfigError> {
    if let Some(model) = partial.model {
        config.model = model;
    }
    if let Some(mode) = partial.mode {
        config.mode = mode;
    }
    if let Some(max_turns) = partial.max_turns {
        if max_turns == 0 {
            return Err(SessionConfigError::InvalidMaxTurns);
        }
        config.max_turns = max_turns;
    }

    for entry in partial.providers {
        if entry.name.trim().is_empty() {
            return Err(SessionConfigError::EmptyProviderName);
        }
        match config.providers.iter_mut().find(|p| p.name == entry.name) {
            Some(existing) => {
                if existing.required && entry.required == Some(false) {
                    return Err(SessionConfigError::RequiredProviderMadeOptional(entry.name));
                }
                entry.apply_to(existing);
            }
            None => config.providers.push(entry.into_spec()?),
        }
    }

    for name in &partial.disabled_providers {
        if let Some(spec) = config.providers.iter().find(|p| &p.name == name) {
            if spec.required {
                return Err(SessionConfigError::RequiredProviderDisabled(name.clone()));
            }
        }
        config.providers.retain(|p| &p.name != name);
    }

    Ok(())
}
