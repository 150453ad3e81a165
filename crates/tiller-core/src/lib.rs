// Session core for Tiller without any terminal front-end dependencies

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod instructions;
pub mod mcp;
pub mod preflight;
pub mod session;
pub mod test_utils;
pub mod utils;

pub use config::{ApiKey, ProviderSpec, SessionConfig};
pub use engine::{ContinuityToken, EngineError, ProcessEngineFactory};
pub use error::{Error, Result};
pub use events::{AgentEvent, RawEvent, map_raw_event};
pub use mcp::{McpConnector, ProviderStatus, ProviderStatusEntry};
pub use session::{AgentSession, StreamingRunCoordinator, Turn, TurnCanceller, TurnOutcome};
pub use tiller_tools::{Mode, ToolSchema};
