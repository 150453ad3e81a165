//! Acquisition and guaranteed release of a session's resources.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tracing::{Span, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::engine::{AgentDefinition, EngineFactory, ReasoningEngine};
use crate::error::{Error, Result};
use crate::instructions;
use crate::mcp::{CapabilityServerSupervisor, ProviderConnector, ToolRouter};
use tiller_tools::ToolSchema;

type ReleaseAction = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send + Sync>;

/// Async cleanup actions, run newest first.
///
/// If the stack is dropped while still holding actions they are spawned on
/// the current runtime.
#[derive(Default)]
pub struct ReleaseStack {
    actions: Vec<(String, ReleaseAction)>,
}

impl ReleaseStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F, Fut>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action: ReleaseAction = Box::new(move || -> BoxFuture<'static, ()> { Box::pin(action()) });
        self.actions.push((label.into(), action));
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub async fn release(&mut self) {
        while let Some((label, action)) = self.actions.pop() {
            debug!("Releasing {}", label);
            action().await;
        }
    }
}

/// Background release for a dropped stack. Takes the plain list so an
/// abandoned task never re-enters `ReleaseStack::drop`.
async fn release_all(mut actions: Vec<(String, ReleaseAction)>) {
    while let Some((label, action)) = actions.pop() {
        debug!("Releasing {}", label);
        action().await;
    }
}

impl Drop for ReleaseStack {
    fn drop(&mut self) {
        if self.actions.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.actions);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Session dropped without close; releasing in background");
                handle.spawn(release_all(pending));
            }
            Err(_) => {
                warn!(
                    "Session dropped outside a runtime; {} release actions skipped",
                    pending.len()
                );
            }
        }
    }
}

/// The tracing scope every turn of a session is logged under.
#[derive(Debug, Clone)]
pub struct TraceScope {
    trace_id: Uuid,
    span: Span,
}

impl TraceScope {
    pub fn open(workflow: &str) -> Self {
        let trace_id = Uuid::new_v4();
        let span = info_span!("session", %trace_id, workflow);
        info!(parent: &span, "Trace opened");
        Self { trace_id, span }
    }

    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn close(&self) {
        info!(parent: &self.span, "Trace closed");
    }
}

/// Resources held for the life of a session.
pub struct SessionResources {
    pub supervisor: Arc<CapabilityServerSupervisor>,
    pub trace: TraceScope,
    pub tools: Vec<ToolSchema>,
    pub engine: Arc<dyn ReasoningEngine>,
}

/// Owns acquisition order and the release stack.
pub struct SessionLifecycle {
    releases: ReleaseStack,
}

impl SessionLifecycle {
    /// Acquire capability servers, then the trace scope, then the engine.
    ///
    /// On failure everything acquired so far is released before returning.
    pub async fn acquire(
        config: &SessionConfig,
        connector: Arc<dyn ProviderConnector>,
        engine_factory: Arc<dyn EngineFactory>,
    ) -> Result<(Self, SessionResources)> {
        config.validate()?;

        let mut lifecycle = Self {
            releases: ReleaseStack::new(),
        };

        let supervisor = Arc::new(CapabilityServerSupervisor::new(connector));
        let providers = supervisor.start(&config.providers).await?;
        {
            let supervisor = supervisor.clone();
            lifecycle.releases.push("capability servers", move || async move {
                supervisor.stop_all().await;
            });
        }

        let trace = TraceScope::open(&format!("tiller-{}", config.mode));
        {
            let trace = trace.clone();
            lifecycle
                .releases
                .push("trace scope", move || async move { trace.close() });
        }

        let (tools, tool_router) = ToolRouter::from_providers(&providers, config.mode);
        info!(
            parent: trace.span(),
            providers = providers.len(),
            tools = tools.len(),
            "Capability providers ready"
        );

        let engine = match lifecycle.build_engine(config, &tools, tool_router, engine_factory).await {
            Ok(engine) => engine,
            Err(e) => {
                warn!(parent: trace.span(), "Session start failed: {e}");
                lifecycle.release().await;
                return Err(e);
            }
        };

        Ok((
            lifecycle,
            SessionResources {
                supervisor,
                trace,
                tools,
                engine,
            },
        ))
    }

    async fn build_engine(
        &self,
        config: &SessionConfig,
        tools: &[ToolSchema],
        tool_router: ToolRouter,
        engine_factory: Arc<dyn EngineFactory>,
    ) -> Result<Arc<dyn ReasoningEngine>> {
        let instructions = instructions::render(config)?;
        let definition = AgentDefinition {
            name: "Coding Agent".to_string(),
            model: config.model.clone(),
            instructions,
            api_key: config.api_key.clone(),
            tools: tools.to_vec(),
            tool_router,
        };
        engine_factory.build(definition).await.map_err(Error::from)
    }

    pub async fn release(&mut self) {
        self.releases.release().await;
    }
}
