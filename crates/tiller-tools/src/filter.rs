//! Mode-based selection of the tools each capability provider may expose.

use crate::mode::Mode;
use crate::providers;
use crate::schema::ToolSchema;

/// Filesystem tools that modify the repository.
pub const MUTATING_FILESYSTEM_TOOLS: &[&str] =
    &["write_file", "edit_file", "create_directory", "move_file"];

/// Version-control tools allowed while planning.
pub const PLAN_GIT_TOOLS: &[&str] = &[
    "clone_repo",
    "list_branches",
    "git_status",
    "git_log",
    "git_show",
    "git_diff",
    "git_diff_staged",
    "git_diff_unstaged",
    "git_branch",
];

/// Issue and pull-request operations exposed in every mode.
pub const GITHUB_SAFE_TOOLS: &[&str] = &[
    "get_issue",
    "get_issue_comments",
    "list_issues",
    "search_issues",
    "create_issue",
    "add_issue_comment",
    "update_issue",
    "get_pull_request",
    "get_pull_request_files",
    "get_pull_request_diff",
    "get_pull_request_status",
    "get_pull_request_comments",
    "get_pull_request_reviews",
    "list_pull_requests",
    "create_pull_request",
    "update_pull_request",
    "get_file_contents",
    "list_commits",
    "get_commit",
    "search_code",
    "search_repositories",
];

/// Issue and pull-request operations exposed while planning.
pub const PLAN_GITHUB_TOOLS: &[&str] = &[
    "get_issue",
    "get_issue_comments",
    "list_issues",
    "search_issues",
    "get_pull_request",
    "get_pull_request_files",
    "get_pull_request_diff",
    "get_pull_request_status",
    "get_pull_request_comments",
    "get_pull_request_reviews",
    "list_pull_requests",
    "get_file_contents",
    "list_commits",
    "get_commit",
    "search_code",
    "search_repositories",
];

/// Tool filtering configuration for a provider
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolFilter {
    /// Include all available tools
    #[default]
    All,
    /// Include only the specified tools
    Include(Vec<String>),
    /// Include all tools except the specified ones
    Exclude(Vec<String>),
}

impl ToolFilter {
    fn include(names: &[&str]) -> Self {
        Self::Include(names.iter().map(|n| (*n).to_string()).collect())
    }

    fn exclude(names: &[&str]) -> Self {
        Self::Exclude(names.iter().map(|n| (*n).to_string()).collect())
    }

    pub fn allows(&self, tool_name: &str) -> bool {
        match self {
            ToolFilter::All => true,
            ToolFilter::Include(included) => included.iter().any(|n| n == tool_name),
            ToolFilter::Exclude(excluded) => !excluded.iter().any(|n| n == tool_name),
        }
    }

    pub fn apply(&self, tools: Vec<ToolSchema>) -> Vec<ToolSchema> {
        match self {
            ToolFilter::All => tools,
            _ => tools.into_iter().filter(|t| self.allows(&t.name)).collect(),
        }
    }
}

/// The filter a provider's tool list goes through in the given mode.
pub fn tool_filter_for(provider_name: &str, mode: Mode) -> ToolFilter {
    match (provider_name, mode) {
        (providers::FILESYSTEM, Mode::Plan) => ToolFilter::exclude(MUTATING_FILESYSTEM_TOOLS),
        (providers::GIT, Mode::Plan) => ToolFilter::include(PLAN_GIT_TOOLS),
        (providers::GITHUB, Mode::Plan) => ToolFilter::include(PLAN_GITHUB_TOOLS),
        (providers::GITHUB, _) => ToolFilter::include(GITHUB_SAFE_TOOLS),
        _ => ToolFilter::All,
    }
}

/// Drop the tools `provider_name` may not expose in `mode`, keeping order.
pub fn filter_tools(provider_name: &str, tools: Vec<ToolSchema>, mode: Mode) -> Vec<ToolSchema> {
    tool_filter_for(provider_name, mode).apply(tools)
}
