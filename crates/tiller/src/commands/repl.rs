use async_trait::async_trait;
use eyre::Result;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tiller_core::engine::EngineFactory;
use tiller_core::mcp::ProviderConnector;
use tiller_core::{AgentSession, SessionConfig, TurnOutcome};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Command, ctrl_c_channel, drive_turn, next_interrupt};
use crate::history::PromptHistory;
use crate::render::Renderer;
use crate::slash::{SlashAction, SlashCommandRegistry, SlashContext};

/// Interactive prompt loop over one session.
pub struct ReplCommand {
    pub config: SessionConfig,
    pub connector: Arc<dyn ProviderConnector>,
    pub engine_factory: Arc<dyn EngineFactory>,
}

#[async_trait]
impl Command for ReplCommand {
    async fn execute(&self) -> Result<()> {
        let session = AgentSession::start(
            self.config.clone(),
            self.connector.clone(),
            self.engine_factory.clone(),
        )
        .await?;
        info!(trace_id = %session.trace_id(), "Interactive session started");

        let mut lines = stdin_lines();
        let mut interrupts = ctrl_c_channel();
        let mut renderer = Renderer::stdout();
        let history = PromptHistory::default_location();

        let result = run_repl(
            &session,
            &mut lines,
            &mut interrupts,
            &mut renderer,
            history.as_ref(),
        )
        .await;
        session.close().await;
        result
    }
}

/// Read stdin on its own thread; blocking reads never stall the runtime.
fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
        debug!("stdin closed");
    });
    rx
}

/// The prompt loop. Ends on `/exit`, end of input, or Ctrl-C while idle.
pub async fn run_repl<W: Write>(
    session: &AgentSession,
    lines: &mut mpsc::Receiver<String>,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
    renderer: &mut Renderer<W>,
    history: Option<&PromptHistory>,
) -> Result<()> {
    let registry = SlashCommandRegistry::new();
    let tool_names: Vec<String> = session.tools().iter().map(|t| t.name.clone()).collect();

    renderer.system(&format!(
        "tiller {} | {} | mode {} | {} tools. Type /help for commands.",
        env!("CARGO_PKG_VERSION"),
        session.config().model,
        session.config().mode,
        tool_names.len()
    ))?;

    loop {
        renderer.input_prompt()?;
        let line = tokio::select! {
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
            () = next_interrupt(interrupts) => break,
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if SlashCommandRegistry::is_command(input) {
            let ctx = SlashContext {
                tool_names: &tool_names,
                mode: session.config().mode,
                model: &session.config().model,
            };
            match registry.dispatch(input, &ctx) {
                SlashAction::Print(text) => renderer.system(&text)?,
                SlashAction::ClearScreen => renderer.clear_screen()?,
                SlashAction::Exit => break,
            }
            continue;
        }

        if let Some(history) = history
            && let Err(e) = history.append(input).await
        {
            warn!(path = %history.path().display(), "Failed to save prompt history: {}", e);
        }

        match drive_turn(session, input, renderer, next_interrupt(interrupts)).await {
            Ok(TurnOutcome::Cancelled) => renderer.system("Cancelled.")?,
            Ok(_) => {}
            Err(e) => renderer.error(&e.to_string())?,
        }
    }

    Ok(())
}
