use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{CapabilityProvider, McpError};
use tiller_tools::{Mode, ToolSchema, filter_tools};

/// Maps every exposed tool name to the provider that owns it.
#[derive(Clone, Default)]
pub struct ToolRouter {
    routes: HashMap<String, Arc<dyn CapabilityProvider>>,
}

impl fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut routes: Vec<_> = self
            .routes
            .iter()
            .map(|(tool, provider)| (tool.as_str(), provider.name()))
            .collect();
        routes.sort_unstable();
        f.debug_struct("ToolRouter").field("routes", &routes).finish()
    }
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the session-wide tool list and its router.
    ///
    /// Tools are filtered per provider for `mode` and concatenated in
    /// provider order. When two providers expose the same name the first
    /// one keeps it.
    pub fn from_providers(
        providers: &[Arc<dyn CapabilityProvider>],
        mode: Mode,
    ) -> (Vec<ToolSchema>, ToolRouter) {
        let mut router = ToolRouter::new();
        let mut exposed = Vec::new();

        for provider in providers {
            let tools = filter_tools(provider.name(), provider.tools(), mode);
            debug!(
                "Provider '{}' exposes {} tools in {} mode",
                provider.name(),
                tools.len(),
                mode
            );
            for tool in tools {
                if router.register(&tool.name, provider.clone()) {
                    exposed.push(tool);
                }
            }
        }

        (exposed, router)
    }

    /// Returns false when the name is already routed.
    pub fn register(&mut self, tool_name: &str, provider: Arc<dyn CapabilityProvider>) -> bool {
        if let Some(existing) = self.routes.get(tool_name) {
            warn!(
                "Tool '{}' from '{}' shadowed by '{}'",
                tool_name,
                provider.name(),
                existing.name()
            );
            return false;
        }
        self.routes.insert(tool_name.to_string(), provider);
        true
    }

    pub fn provider_for(&self, tool_name: &str) -> Option<&Arc<dyn CapabilityProvider>> {
        self.routes.get(tool_name)
    }

    pub fn contains(&self, tool_name: &str) -> bool {
        self.routes.contains_key(tool_name)
    }

    pub async fn call(
        &self,
        tool_name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<String, McpError> {
        let provider = self
            .provider_for(tool_name)
            .ok_or_else(|| McpError::UnknownTool {
                tool_name: tool_name.to_string(),
            })?;
        provider.call_tool(tool_name, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeProvider;
    use tiller_tools::providers;

    fn provider(name: &str, tools: &[&str]) -> Arc<dyn CapabilityProvider> {
        Arc::new(FakeProvider::new(name, tools))
    }

    #[test]
    fn test_union_follows_provider_order_and_mode() {
        let providers = vec![
            provider(providers::FILESYSTEM, &["read_file", "write_file"]),
            provider(providers::GIT, &["git_status", "git_commit"]),
        ];

        let (tools, router) = ToolRouter::from_providers(&providers, Mode::Plan);
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["read_file", "git_status"]);
        assert!(router.contains("git_status"));
        assert!(!router.contains("write_file"));

        let (tools, _) = ToolRouter::from_providers(&providers, Mode::Default);
        assert_eq!(tools.len(), 4);
    }

    #[test]
    fn test_first_provider_wins_duplicate_names() {
        let providers = vec![provider("a", &["shared"]), provider("b", &["shared", "own"])];
        let (tools, router) = ToolRouter::from_providers(&providers, Mode::Default);

        assert_eq!(tools.len(), 2);
        assert_eq!(router.provider_for("shared").map(|p| p.name()), Some("a"));
        assert_eq!(router.provider_for("own").map(|p| p.name()), Some("b"));
    }

    #[tokio::test]
    async fn test_call_dispatches_to_owner() {
        let providers = vec![provider("a", &["echo"])];
        let (_, router) = ToolRouter::from_providers(&providers, Mode::Default);

        let out = router.call("echo", None).await.unwrap();
        assert_eq!(out, "a:echo");

        let err = router.call("missing", None).await.unwrap_err();
        assert_eq!(
            err,
            McpError::UnknownTool {
                tool_name: "missing".to_string()
            }
        );
    }
}
