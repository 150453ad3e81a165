use async_trait::async_trait;
use eyre::Result;
use futures::StreamExt;
use std::future::Future;
use std::io::Write;
use tiller_core::{AgentSession, TurnOutcome};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::render::Renderer;

pub mod headless;
pub mod repl;

#[async_trait]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

/// Forward every Ctrl-C as a message until the receiver goes away.
pub fn ctrl_c_channel() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                return;
            }
            if tx.send(()).is_err() {
                return;
            }
        }
    });
    rx
}

/// Resolves on the next interrupt. Never resolves once the source is gone.
pub async fn next_interrupt(interrupts: &mut mpsc::UnboundedReceiver<()>) {
    if interrupts.recv().await.is_none() {
        std::future::pending::<()>().await;
    }
}

/// Run one turn, rendering events as they arrive. `interrupt` cancels it.
pub async fn drive_turn<W, I>(
    session: &AgentSession,
    input: &str,
    renderer: &mut Renderer<W>,
    interrupt: I,
) -> Result<TurnOutcome>
where
    W: Write,
    I: Future<Output = ()>,
{
    let mut turn = session.run(input).await?;
    let canceller = turn.canceller();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            item = turn.next() => match item {
                Some(Ok(event)) => renderer.event(&event)?,
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            () = &mut interrupt, if !canceller.is_cancelled() => {
                debug!(turn_id = turn.id(), "Interrupt received");
                canceller.cancel();
            }
        }
    }

    Ok(session.last_outcome().unwrap_or(TurnOutcome::Cancelled))
}
