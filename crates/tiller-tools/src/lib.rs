pub mod filter;
pub mod mode;
pub mod schema;

pub use filter::{ToolFilter, filter_tools, tool_filter_for};
pub use mode::{Mode, ParseModeError};
pub use schema::{InputSchema, ToolSchema};

/// Provider names recognized by the capability filter.
pub mod providers {
    pub const FILESYSTEM: &str = "file-system-mcp";
    pub const CLI: &str = "cli-mcp-server";
    pub const GIT: &str = "mcp-server-git";
    pub const GITHUB: &str = "github-mcp-server";
}
