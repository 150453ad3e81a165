use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::EngineError;
use crate::mcp::McpError;
use crate::preflight::PreflightError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Provider(#[from] McpError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Preflight(#[from] PreflightError),
    #[error("Instruction template error: {0}")]
    Instructions(#[from] minijinja::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("A turn is already in progress")]
    TurnInProgress,
}
