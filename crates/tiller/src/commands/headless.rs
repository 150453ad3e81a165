use async_trait::async_trait;
use eyre::{Result, eyre};
use std::sync::Arc;
use tiller_core::engine::EngineFactory;
use tiller_core::mcp::ProviderConnector;
use tiller_core::{AgentSession, SessionConfig, TurnOutcome};
use tracing::info;

use super::{Command, ctrl_c_channel, drive_turn, next_interrupt};
use crate::render::Renderer;

/// Runs a single prompt and exits.
pub struct HeadlessCommand {
    pub config: SessionConfig,
    pub prompt: String,
    pub connector: Arc<dyn ProviderConnector>,
    pub engine_factory: Arc<dyn EngineFactory>,
}

#[async_trait]
impl Command for HeadlessCommand {
    async fn execute(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(eyre!("Prompt cannot be empty"));
        }

        let mut renderer = Renderer::stdout();
        renderer.prompt_echo(&self.prompt)?;

        let session = AgentSession::start(
            self.config.clone(),
            self.connector.clone(),
            self.engine_factory.clone(),
        )
        .await?;
        info!(trace_id = %session.trace_id(), "Headless run started");

        let mut interrupts = ctrl_c_channel();
        let result = drive_turn(
            &session,
            &self.prompt,
            &mut renderer,
            next_interrupt(&mut interrupts),
        )
        .await;
        session.close().await;

        match result? {
            TurnOutcome::Completed => Ok(()),
            TurnOutcome::Cancelled => Err(eyre!("Interrupted")),
            TurnOutcome::Errored => Err(eyre!("Run ended with an error")),
        }
    }
}
