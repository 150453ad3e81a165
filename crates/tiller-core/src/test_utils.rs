//! Deterministic engine and provider doubles for tests of code built on
//! `tiller-core`.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::ProviderSpec;
use crate::engine::{
    AgentDefinition, ContinuityToken, EngineError, EngineFactory, ReasoningEngine, RunHandle,
    TurnRequest,
};
use crate::events::RawEvent;
use crate::mcp::{CapabilityProvider, McpError, ProviderConnector};
use tiller_tools::ToolSchema;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub enum ScriptStep {
    Event(RawEvent),
    Fail(EngineError),
    /// Never resolves; the turn only ends by cancellation.
    Pending,
}

struct ScriptedTurn {
    steps: Vec<ScriptStep>,
    token: Option<String>,
}

/// Plays back one scripted turn per `submit`, in order.
#[derive(Default)]
pub struct ScriptedEngine {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    submitted: Mutex<Vec<TurnRequest>>,
    cancels: Mutex<Vec<Arc<AtomicUsize>>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a turn that plays `steps` and completes with `token`.
    pub fn with_turn(self, steps: Vec<ScriptStep>, token: Option<&str>) -> Self {
        lock(&self.turns).push_back(ScriptedTurn {
            steps,
            token: token.map(str::to_string),
        });
        self
    }

    pub fn submitted(&self) -> Vec<TurnRequest> {
        lock(&self.submitted).clone()
    }

    /// How often the run handle of the `turn`-th submission was cancelled.
    pub fn cancel_count(&self, turn: usize) -> usize {
        lock(&self.cancels)
            .get(turn)
            .map_or(0, |count| count.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn submit(&self, request: TurnRequest) -> Result<Box<dyn RunHandle>, EngineError> {
        lock(&self.submitted).push(request);
        let turn = lock(&self.turns)
            .pop_front()
            .ok_or_else(|| EngineError::Failed("no scripted turn left".to_string()))?;

        let cancels = Arc::new(AtomicUsize::new(0));
        lock(&self.cancels).push(cancels.clone());

        Ok(Box::new(ScriptedRunHandle {
            steps: turn.steps.into(),
            token: turn.token,
            cancels,
            cancelled: false,
            exhausted: false,
        }))
    }
}

pub struct ScriptedRunHandle {
    steps: VecDeque<ScriptStep>,
    token: Option<String>,
    cancels: Arc<AtomicUsize>,
    cancelled: bool,
    exhausted: bool,
}

#[async_trait]
impl RunHandle for ScriptedRunHandle {
    async fn next_raw_event(&mut self) -> Option<Result<RawEvent, EngineError>> {
        if self.cancelled || self.exhausted {
            return None;
        }
        match self.steps.pop_front() {
            Some(ScriptStep::Event(event)) => Some(Ok(event)),
            Some(ScriptStep::Fail(e)) => {
                self.exhausted = true;
                self.token = None;
                Some(Err(e))
            }
            Some(ScriptStep::Pending) => std::future::pending().await,
            None => {
                self.exhausted = true;
                None
            }
        }
    }

    fn cancel(&mut self) {
        self.cancelled = true;
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn continuity_token(&self) -> Option<ContinuityToken> {
        if self.exhausted && !self.cancelled {
            self.token.clone().map(ContinuityToken::new)
        } else {
            None
        }
    }
}

/// Hands out one shared [`ScriptedEngine`] and records every definition.
pub struct ScriptedEngineFactory {
    engine: Arc<ScriptedEngine>,
    definitions: Mutex<Vec<AgentDefinition>>,
    fail: bool,
}

impl ScriptedEngineFactory {
    pub fn new(engine: Arc<ScriptedEngine>) -> Self {
        Self {
            engine,
            definitions: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Arc::new(ScriptedEngine::new()))
        }
    }

    pub fn definitions(&self) -> Vec<AgentDefinition> {
        lock(&self.definitions).clone()
    }
}

#[async_trait]
impl EngineFactory for ScriptedEngineFactory {
    async fn build(&self, definition: AgentDefinition) -> Result<Arc<dyn ReasoningEngine>, EngineError> {
        lock(&self.definitions).push(definition);
        if self.fail {
            return Err(EngineError::Construction("scripted failure".to_string()));
        }
        Ok(self.engine.clone())
    }
}

#[derive(Debug, Default)]
struct Journal {
    started: Vec<String>,
    stopped: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum ProviderBehavior {
    Start(Vec<String>),
    Fail,
    /// Never finishes starting.
    Hang,
}

/// Connector whose providers exist only in memory.
#[derive(Default)]
pub struct FakeConnector {
    behaviors: HashMap<String, ProviderBehavior>,
    journal: Arc<Mutex<Journal>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(self, name: &str, tools: &[&str]) -> Self {
        self.with_behavior(
            name,
            ProviderBehavior::Start(tools.iter().map(|t| (*t).to_string()).collect()),
        )
    }

    pub fn with_behavior(mut self, name: &str, behavior: ProviderBehavior) -> Self {
        self.behaviors.insert(name.to_string(), behavior);
        self
    }

    pub fn started(&self) -> Vec<String> {
        lock(&self.journal).started.clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        lock(&self.journal).stopped.clone()
    }

    /// Providers started and not yet stopped.
    pub fn running(&self) -> Vec<String> {
        let journal = lock(&self.journal);
        journal
            .started
            .iter()
            .filter(|name| !journal.stopped.contains(name))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ProviderConnector for FakeConnector {
    async fn connect(&self, spec: &ProviderSpec) -> Result<Arc<dyn CapabilityProvider>, McpError> {
        match self.behaviors.get(&spec.name) {
            Some(ProviderBehavior::Start(tools)) => {
                lock(&self.journal).started.push(spec.name.clone());
                Ok(Arc::new(FakeProvider {
                    name: spec.name.clone(),
                    tools: tools
                        .iter()
                        .map(|t| ToolSchema::new(t.clone(), format!("{t} from {}", spec.name)))
                        .collect(),
                    journal: self.journal.clone(),
                }))
            }
            Some(ProviderBehavior::Hang) => std::future::pending().await,
            Some(ProviderBehavior::Fail) | None => Err(McpError::connection_failed(
                &spec.name,
                "scripted startup failure",
            )),
        }
    }
}

/// In-memory provider. `call_tool` answers `"<provider>:<tool>"`.
pub struct FakeProvider {
    name: String,
    tools: Vec<ToolSchema>,
    journal: Arc<Mutex<Journal>>,
}

impl FakeProvider {
    pub fn new(name: &str, tools: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            tools: tools
                .iter()
                .map(|t| ToolSchema::new(*t, format!("{t} from {name}")))
                .collect(),
            journal: Arc::default(),
        }
    }
}

#[async_trait]
impl CapabilityProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> Vec<ToolSchema> {
        self.tools.clone()
    }

    async fn call_tool(
        &self,
        tool_name: &str,
        _arguments: Option<Map<String, Value>>,
    ) -> Result<String, McpError> {
        if !self.tools.iter().any(|t| t.name == tool_name) {
            return Err(McpError::UnknownTool {
                tool_name: tool_name.to_string(),
            });
        }
        Ok(format!("{}:{}", self.name, tool_name))
    }

    async fn shutdown(&self) -> Result<(), McpError> {
        lock(&self.journal).stopped.push(self.name.clone());
        Ok(())
    }
}
