pub mod tracing;

use std::path::PathBuf;

/// Per-user state directory, `~/.tiller`.
pub fn tiller_home() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tiller"))
}

/// Default location of the optional TOML config file.
pub fn default_config_path() -> Option<PathBuf> {
    tiller_home().map(|dir| dir.join("config.toml"))
}

/// Where the REPL appends submitted prompts.
pub fn prompt_history_path() -> Option<PathBuf> {
    tiller_home().map(|dir| dir.join("prompt_history"))
}

/// Git hooks installed by preflight, outside any repository.
pub fn hooks_dir() -> Option<PathBuf> {
    tiller_home().map(|dir| dir.join("hooks"))
}
