//! Capability providers: external MCP servers started for the life of a session.

pub mod backend;
pub mod error;
pub mod router;
pub mod supervisor;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::ProviderSpec;
use tiller_tools::ToolSchema;

pub use backend::McpConnector;
pub use error::McpError;
pub use router::ToolRouter;
pub use supervisor::CapabilityServerSupervisor;

/// A started provider and the tools it advertised at startup.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Advertised tools, unfiltered, in the order the provider listed them.
    fn tools(&self) -> Vec<ToolSchema>;

    async fn call_tool(
        &self,
        tool_name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<String, McpError>;

    async fn shutdown(&self) -> Result<(), McpError>;
}

/// Turns a [`ProviderSpec`] into a running provider.
#[async_trait]
pub trait ProviderConnector: Send + Sync {
    async fn connect(&self, spec: &ProviderSpec) -> Result<Arc<dyn CapabilityProvider>, McpError>;
}

/// Connection state of a configured provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Connected { tool_names: Vec<String> },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStatusEntry {
    pub name: String,
    pub required: bool,
    pub status: ProviderStatus,
}

impl ProviderStatusEntry {
    pub fn is_connected(&self) -> bool {
        matches!(self.status, ProviderStatus::Connected { .. })
    }
}
