//! The boundary to the remote reasoning engine.

pub mod process;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ApiKey;
use crate::events::RawEvent;
use crate::mcp::ToolRouter;
use tiller_tools::ToolSchema;

pub use process::ProcessEngineFactory;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Maximum number of turns ({max_turns}) exceeded")]
    MaxTurnsExceeded { max_turns: u32 },

    #[error("Failed to construct engine: {0}")]
    Construction(String),

    #[error("Engine transport error: {0}")]
    Transport(String),

    #[error("Engine run failed: {0}")]
    Failed(String),

    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opaque handle the engine returns on completion and expects back on the
/// next turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuityToken(String);

impl ContinuityToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContinuityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the engine needs to act as this session's agent.
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub name: String,
    pub model: String,
    pub instructions: String,
    pub api_key: ApiKey,
    pub tools: Vec<ToolSchema>,
    pub tool_router: ToolRouter,
}

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub input: String,
    pub continuity: Option<ContinuityToken>,
    pub max_turns: u32,
}

#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn build(&self, definition: AgentDefinition) -> Result<Arc<dyn ReasoningEngine>, EngineError>;
}

#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn submit(&self, request: TurnRequest) -> Result<Box<dyn RunHandle>, EngineError>;
}

/// A live engine run.
#[async_trait]
pub trait RunHandle: Send {
    /// `None` once the run is exhausted.
    async fn next_raw_event(&mut self) -> Option<Result<RawEvent, EngineError>>;

    fn cancel(&mut self);

    /// Available after exhaustion of a completed run.
    fn continuity_token(&self) -> Option<ContinuityToken>;
}
