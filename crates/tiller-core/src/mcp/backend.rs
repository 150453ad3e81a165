//! MCP providers over a child-process transport, using the rmcp crate.

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, RawContent, Tool};
use rmcp::service::{RoleClient, RunningService, ServiceExt};
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use serde_json::{Map, Value};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{CapabilityProvider, McpError, ProviderConnector};
use crate::config::ProviderSpec;
use tiller_tools::{InputSchema, ToolSchema};

const LIST_TOOLS_TIMEOUT: Duration = Duration::from_secs(30);

/// Launches providers as child processes speaking MCP over stdio.
#[derive(Debug, Default, Clone)]
pub struct McpConnector;

#[async_trait]
impl ProviderConnector for McpConnector {
    async fn connect(&self, spec: &ProviderSpec) -> Result<Arc<dyn CapabilityProvider>, McpError> {
        let provider = McpProvider::connect(spec).await?;
        Ok(Arc::new(provider))
    }
}

pub struct McpProvider {
    server_name: String,
    tools: Vec<ToolSchema>,
    client: RwLock<Option<RunningService<RoleClient, ()>>>,
}

impl McpProvider {
    pub async fn connect(spec: &ProviderSpec) -> Result<Self, McpError> {
        info!(
            "Starting MCP server '{}' with command: {} {:?}",
            spec.name, spec.command, spec.args
        );

        let command = Command::new(&spec.command).configure(|cmd| {
            cmd.args(&spec.args).envs(&spec.env);
        });

        let (transport, stderr) = TokioChildProcess::builder(command)
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                error!("Failed to spawn MCP process '{}': {}", spec.name, e);
                McpError::connection_failed(&spec.name, format!("Failed to spawn process: {e}"))
            })?;

        if let Some(stderr) = stderr {
            forward_stderr(spec.name.clone(), stderr);
        }

        let client = ().serve(transport).await.map_err(|e| {
            error!("Failed to serve MCP for '{}': {}", spec.name, e);
            McpError::ServeFailed {
                server_name: spec.name.clone(),
                message: e.to_string(),
            }
        })?;

        debug!("Listing tools from MCP server '{}'", spec.name);

        let listing =
            tokio::time::timeout(LIST_TOOLS_TIMEOUT, client.list_tools(Default::default())).await;
        let listed = match listing {
            Ok(Ok(listed)) => listed,
            Ok(Err(e)) => {
                let _ = client.cancel().await;
                return Err(McpError::ListToolsFailed {
                    server_name: spec.name.clone(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                let _ = client.cancel().await;
                return Err(McpError::ListToolsTimeout {
                    server_name: spec.name.clone(),
                });
            }
        };

        let tools: Vec<ToolSchema> = listed
            .tools
            .iter()
            .map(|tool| tool_to_schema(&spec.name, tool))
            .collect();

        info!(
            "Discovered {} tools from MCP server '{}': {}",
            tools.len(),
            spec.name,
            tools
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            server_name: spec.name.clone(),
            tools,
            client: RwLock::new(Some(client)),
        })
    }
}

fn forward_stderr(server_name: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut line = String::new();

        while let Ok(len) = reader.read_line(&mut line).await {
            if len == 0 {
                break;
            }
            debug!(target: "mcp_server", "[{}] {}", server_name, line.trim_end());
            line.clear();
        }
    });
}

fn tool_to_schema(server_name: &str, tool: &Tool) -> ToolSchema {
    let description = match &tool.description {
        Some(desc) if !desc.is_empty() => desc.to_string(),
        _ => format!("Tool '{}' from MCP server '{}'", tool.name, server_name),
    };

    ToolSchema::new(tool.name.to_string(), description)
        .with_input_schema(InputSchema::from_json_object(&tool.input_schema))
}

#[async_trait]
impl CapabilityProvider for McpProvider {
    fn name(&self) -> &str {
        &self.server_name
    }

    fn tools(&self) -> Vec<ToolSchema> {
        self.tools.clone()
    }

    async fn call_tool(
        &self,
        tool_name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<String, McpError> {
        let guard = self.client.read().await;
        let service = guard.as_ref().ok_or_else(|| McpError::NotConnected {
            server_name: self.server_name.clone(),
        })?;

        debug!(
            "Calling tool '{}' via MCP server '{}'",
            tool_name, self.server_name
        );

        let result = service
            .call_tool(CallToolRequestParam {
                name: tool_name.to_string().into(),
                arguments,
            })
            .await
            .map_err(|e| McpError::ToolCallFailed {
                tool_name: tool_name.to_string(),
                message: e.to_string(),
            })?;

        let output = result
            .content
            .into_iter()
            .flatten()
            .map(|content| match &content.raw {
                RawContent::Text(text) => text.text.clone(),
                RawContent::Image { .. } => "[Image content]".to_string(),
                RawContent::Audio { .. } => "[Audio content]".to_string(),
                _ => "[Resource content]".to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error.unwrap_or(false) {
            return Err(McpError::ToolCallFailed {
                tool_name: tool_name.to_string(),
                message: output,
            });
        }
        Ok(output)
    }

    async fn shutdown(&self) -> Result<(), McpError> {
        let Some(service) = self.client.write().await.take() else {
            return Ok(());
        };
        info!("Stopping MCP server '{}'", self.server_name);
        service
            .cancel()
            .await
            .map(|_| ())
            .map_err(|e| McpError::connection_failed(&self.server_name, format!("Shutdown failed: {e}")))
    }
}

impl Drop for McpProvider {
    fn drop(&mut self) {
        let Some(service) = self.client.get_mut().take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let _ = service.cancel().await;
                });
            }
            Err(_) => warn!(
                "MCP server '{}' dropped outside a runtime; relying on kill-on-drop",
                self.server_name
            ),
        }
    }
}
