//! Drives one turn at a time against the reasoning engine.

use futures::Stream;
use futures::stream::BoxStream;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, warn};

use crate::engine::{ContinuityToken, EngineError, ReasoningEngine, RunHandle, TurnRequest};
use crate::error::{Error, Result};
use crate::events::{AgentEvent, map_raw_event};

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TurnOutcome {
    Completed,
    Cancelled,
    Errored,
}

struct ActiveTurn {
    id: u64,
    token: CancellationToken,
}

type ActiveSlot = Arc<Mutex<Option<ActiveTurn>>>;

pub struct StreamingRunCoordinator {
    engine: Arc<dyn ReasoningEngine>,
    max_turns: u32,
    continuity: Arc<watch::Sender<Option<ContinuityToken>>>,
    outcome: Arc<watch::Sender<Option<TurnOutcome>>>,
    active: ActiveSlot,
    next_turn_id: AtomicU64,
    span: Span,
}

impl StreamingRunCoordinator {
    pub fn new(engine: Arc<dyn ReasoningEngine>, max_turns: u32) -> Self {
        let (continuity, _) = watch::channel(None);
        let (outcome, _) = watch::channel(None);
        Self {
            engine,
            max_turns,
            continuity: Arc::new(continuity),
            outcome: Arc::new(outcome),
            active: Arc::new(Mutex::new(None)),
            next_turn_id: AtomicU64::new(1),
            span: Span::none(),
        }
    }

    /// Parent span for the per-turn log lines.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Submit `input` and return the turn's event stream.
    ///
    /// Fails with [`Error::TurnInProgress`] while another turn is active.
    pub async fn run(&self, input: &str) -> Result<Turn> {
        let token = CancellationToken::new();
        let turn_id = self.claim(token.clone())?;
        let slot = SlotRelease {
            active: self.active.clone(),
            turn_id,
        };

        let continuity = self.continuity.borrow().clone();
        info!(
            parent: &self.span,
            turn_id,
            resumed = continuity.is_some(),
            "Submitting turn"
        );

        let request = TurnRequest {
            input: input.to_string(),
            continuity,
            max_turns: self.max_turns,
        };
        let handle = match self.engine.submit(request).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(parent: &self.span, turn_id, "Engine rejected turn: {e}");
                self.outcome.send_replace(Some(TurnOutcome::Errored));
                return Err(e.into());
            }
        };

        let state = TurnState {
            slot: Some(slot),
            handle,
            continuity: self.continuity.clone(),
            outcome: self.outcome.clone(),
            span: self.span.clone(),
            turn_id,
            finished: false,
            cancel_sent: false,
        };

        Ok(Turn {
            id: turn_id,
            canceller: TurnCanceller {
                token: token.clone(),
            },
            stream: Box::pin(turn_stream(state, token)),
        })
    }

    /// Cancel the active turn, if any. Returns whether a turn was signalled.
    pub fn cancel(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match active.as_ref() {
            Some(turn) => {
                debug!(parent: &self.span, turn_id = turn.id, "Cancelling turn");
                turn.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The token of the last completed turn.
    pub fn continuity_token(&self) -> Option<ContinuityToken> {
        self.continuity.borrow().clone()
    }

    pub fn subscribe_continuity(&self) -> watch::Receiver<Option<ContinuityToken>> {
        self.continuity.subscribe()
    }

    pub fn last_outcome(&self) -> Option<TurnOutcome> {
        *self.outcome.borrow()
    }

    fn claim(&self, token: CancellationToken) -> Result<u64> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.is_some() {
            return Err(Error::TurnInProgress);
        }
        let id = self.next_turn_id.fetch_add(1, Ordering::Relaxed);
        *active = Some(ActiveTurn { id, token });
        Ok(id)
    }
}

struct SlotRelease {
    active: ActiveSlot,
    turn_id: u64,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|t| t.id == self.turn_id) {
            *active = None;
        }
    }
}

struct TurnState {
    slot: Option<SlotRelease>,
    handle: Box<dyn RunHandle>,
    continuity: Arc<watch::Sender<Option<ContinuityToken>>>,
    outcome: Arc<watch::Sender<Option<TurnOutcome>>>,
    span: Span,
    turn_id: u64,
    finished: bool,
    cancel_sent: bool,
}

impl TurnState {
    fn cancel_run(&mut self) {
        if !self.cancel_sent {
            self.cancel_sent = true;
            self.handle.cancel();
        }
    }

    fn finish(&mut self, outcome: TurnOutcome) {
        self.finished = true;
        self.slot.take();
        self.outcome.send_replace(Some(outcome));
        info!(parent: &self.span, turn_id = self.turn_id, %outcome, "Turn finished");
    }
}

impl Drop for TurnState {
    fn drop(&mut self) {
        if !self.finished {
            self.cancel_run();
            self.finish(TurnOutcome::Cancelled);
        }
    }
}

fn turn_stream(
    mut state: TurnState,
    token: CancellationToken,
) -> impl Stream<Item = Result<AgentEvent>> + Send + 'static {
    async_stream::stream! {
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                next = state.handle.next_raw_event() => Some(next),
            };

            let Some(next) = next else {
                state.cancel_run();
                state.finish(TurnOutcome::Cancelled);
                break;
            };

            match next {
                Some(Ok(raw)) => {
                    if let Some(event) = map_raw_event(&raw) {
                        yield Ok(event);
                    }
                }
                Some(Err(EngineError::MaxTurnsExceeded { max_turns })) => {
                    state.finish(TurnOutcome::Errored);
                    yield Ok(AgentEvent::Error {
                        message: format!(
                            "Turn limit of {max_turns} reached. Send another message to continue."
                        ),
                    });
                    break;
                }
                Some(Err(e)) => {
                    state.finish(TurnOutcome::Errored);
                    yield Err(Error::Engine(e));
                    break;
                }
                None => {
                    if let Some(next_token) = state.handle.continuity_token() {
                        state.continuity.send_replace(Some(next_token));
                    }
                    state.finish(TurnOutcome::Completed);
                    break;
                }
            }
        }
    }
}

/// Cancels one specific turn; cloneable so a Ctrl-C watcher can hold it.
#[derive(Debug, Clone)]
pub struct TurnCanceller {
    token: CancellationToken,
}

impl TurnCanceller {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// One submitted turn: a lazy stream of normalized events.
///
/// Dropping the turn before it ends cancels the engine run.
pub struct Turn {
    id: u64,
    canceller: TurnCanceller,
    stream: BoxStream<'static, Result<AgentEvent>>,
}

impl Turn {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn canceller(&self) -> TurnCanceller {
        self.canceller.clone()
    }
}

impl Stream for Turn {
    type Item = Result<AgentEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.as_mut().poll_next(cx)
    }
}
