use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum McpError {
    #[error("Cannot connect to {server_name}: {message}")]
    ConnectionFailed {
        server_name: String,
        message: String,
    },

    #[error("Failed to list tools from {server_name}: {message}")]
    ListToolsFailed {
        server_name: String,
        message: String,
    },

    #[error("Failed to serve MCP for {server_name}: {message}")]
    ServeFailed {
        server_name: String,
        message: String,
    },

    #[error("Timeout listing tools from {server_name}")]
    ListToolsTimeout { server_name: String },

    #[error("{server_name} did not start within {timeout_secs}s")]
    StartupTimeout {
        server_name: String,
        timeout_secs: u64,
    },

    #[error("Tool '{tool_name}' failed: {message}")]
    ToolCallFailed { tool_name: String, message: String },

    #[error("No provider exposes tool '{tool_name}'")]
    UnknownTool { tool_name: String },

    #[error("{server_name} is not connected")]
    NotConnected { server_name: String },
}

impl McpError {
    pub fn connection_failed(server_name: &str, message: impl Into<String>) -> Self {
        McpError::ConnectionFailed {
            server_name: server_name.to_string(),
            message: message.into(),
        }
    }
}
