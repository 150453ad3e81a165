use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use super::coordinator::{StreamingRunCoordinator, Turn, TurnOutcome};
use super::lifecycle::{SessionLifecycle, TraceScope};
use crate::config::SessionConfig;
use crate::engine::{ContinuityToken, EngineFactory};
use crate::error::Result;
use crate::mcp::{CapabilityServerSupervisor, ProviderConnector, ProviderStatusEntry};
use tiller_tools::ToolSchema;

/// An interactive session: supervised capability providers, a reasoning
/// engine and the turn loop between them.
///
/// Call [`AgentSession::close`] when done. A session that is simply dropped
/// releases its resources in the background.
pub struct AgentSession {
    config: SessionConfig,
    lifecycle: SessionLifecycle,
    supervisor: Arc<CapabilityServerSupervisor>,
    trace: TraceScope,
    tools: Vec<ToolSchema>,
    coordinator: StreamingRunCoordinator,
}

impl AgentSession {
    pub async fn start(
        config: SessionConfig,
        connector: Arc<dyn ProviderConnector>,
        engine_factory: Arc<dyn EngineFactory>,
    ) -> Result<Self> {
        let (lifecycle, resources) =
            SessionLifecycle::acquire(&config, connector, engine_factory).await?;

        let span = resources.trace.span().clone();
        let coordinator =
            StreamingRunCoordinator::new(resources.engine, config.max_turns).with_span(span.clone());

        info!(
            parent: &span,
            model = %config.model,
            mode = %config.mode,
            "Session started"
        );

        Ok(Self {
            config,
            lifecycle,
            supervisor: resources.supervisor,
            trace: resources.trace,
            tools: resources.tools,
            coordinator,
        })
    }

    /// Start a session, run `f` with it and close it whatever `f` returns.
    pub async fn scoped<T, F>(
        config: SessionConfig,
        connector: Arc<dyn ProviderConnector>,
        engine_factory: Arc<dyn EngineFactory>,
        f: F,
    ) -> Result<T>
    where
        F: for<'a> FnOnce(&'a AgentSession) -> BoxFuture<'a, Result<T>>,
    {
        let session = Self::start(config, connector, engine_factory).await?;
        let result = f(&session).await;
        session.close().await;
        result
    }

    pub async fn run(&self, input: &str) -> Result<Turn> {
        self.coordinator.run(input).await
    }

    /// Cancel the turn in flight. No-op when idle.
    pub fn cancel(&self) -> bool {
        self.coordinator.cancel()
    }

    pub fn is_running(&self) -> bool {
        self.coordinator.is_running()
    }

    pub fn continuity_token(&self) -> Option<ContinuityToken> {
        self.coordinator.continuity_token()
    }

    pub fn subscribe_continuity(&self) -> watch::Receiver<Option<ContinuityToken>> {
        self.coordinator.subscribe_continuity()
    }

    pub fn last_outcome(&self) -> Option<TurnOutcome> {
        self.coordinator.last_outcome()
    }

    pub fn tools(&self) -> &[ToolSchema] {
        &self.tools
    }

    pub fn provider_statuses(&self) -> Vec<ProviderStatusEntry> {
        self.supervisor.statuses()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn trace_id(&self) -> Uuid {
        self.trace.trace_id()
    }

    pub async fn close(mut self) {
        self.coordinator.cancel();
        self.lifecycle.release().await;
        info!(parent: self.trace.span(), "Session closed");
    }
}
