//! Engine bridge that runs an external command once per turn.
//!
//! The command speaks JSON lines. It receives one `submit` message on stdin,
//! then writes `event`, `tool_request` and finally `completed` or `failed`
//! messages on stdout. Tool requests are answered with `tool_result` lines
//! dispatched through the session's [`ToolRouter`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    AgentDefinition, ContinuityToken, EngineError, EngineFactory, ReasoningEngine, RunHandle,
    TurnRequest,
};
use crate::events::RawEvent;
use crate::mcp::{McpError, ToolRouter};
use tiller_tools::ToolSchema;

const EXIT_GRACE: Duration = Duration::from_secs(5);
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct ProcessEngineFactory {
    command: String,
    args: Vec<String>,
}

impl ProcessEngineFactory {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    /// Parse a shell-style command line such as `node "my bridge.js" --fast`.
    pub fn from_command_line(line: &str) -> Result<Self, EngineError> {
        let mut parts = shell_words::split(line)
            .map_err(|e| EngineError::Construction(format!("invalid engine command: {e}")))?
            .into_iter();
        let command = parts
            .next()
            .ok_or_else(|| EngineError::Construction("engine command is empty".to_string()))?;
        Ok(Self::new(command, parts.collect()))
    }
}

#[async_trait]
impl EngineFactory for ProcessEngineFactory {
    async fn build(&self, definition: AgentDefinition) -> Result<Arc<dyn ReasoningEngine>, EngineError> {
        let resolved = which::which(&self.command).map_err(|e| {
            EngineError::Construction(format!("engine command '{}' not found: {e}", self.command))
        })?;

        info!(
            "Using engine command {} for agent '{}' ({} tools)",
            resolved.display(),
            definition.name,
            definition.tools.len()
        );

        Ok(Arc::new(ProcessEngine {
            command: resolved.to_string_lossy().to_string(),
            args: self.args.clone(),
            definition,
        }))
    }
}

struct ProcessEngine {
    command: String,
    args: Vec<String>,
    definition: AgentDefinition,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Outgoing<'a> {
    Submit {
        agent: &'a str,
        model: &'a str,
        instructions: &'a str,
        tools: &'a [ToolSchema],
        input: &'a str,
        previous_response_id: Option<&'a str>,
        max_turns: u32,
    },
    ToolResult {
        call_id: String,
        output: String,
        is_error: bool,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EngineMessage {
    Event {
        event: Value,
    },
    ToolRequest {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: Value,
    },
    Completed {
        #[serde(default)]
        response_id: Option<String>,
    },
    Failed {
        #[serde(default)]
        kind: FailureKind,
        #[serde(default)]
        message: String,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FailureKind {
    MaxTurnsExceeded,
    #[default]
    #[serde(other)]
    Other,
}

enum Incoming {
    Event(RawEvent),
    Completed(Option<ContinuityToken>),
    Failed(EngineError),
}

#[async_trait]
impl ReasoningEngine for ProcessEngine {
    async fn submit(&self, request: TurnRequest) -> Result<Box<dyn RunHandle>, EngineError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .env("OPENAI_API_KEY", self.definition.api_key.expose())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(EngineError::Transport(
                "engine process has no stdio pipes".to_string(),
            ));
        };
        if let Some(stderr) = child.stderr.take() {
            forward_stderr(stderr);
        }

        let submit = Outgoing::Submit {
            agent: &self.definition.name,
            model: &self.definition.model,
            instructions: &self.definition.instructions,
            tools: &self.definition.tools,
            input: &request.input,
            previous_response_id: request.continuity.as_ref().map(ContinuityToken::as_str),
            max_turns: request.max_turns,
        };
        write_message(&mut stdin, &submit).await?;
        debug!(
            "Submitted turn to engine (continuing from {:?})",
            request.continuity
        );

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        tokio::spawn(drive(
            child,
            stdin,
            stdout,
            self.definition.tool_router.clone(),
            request.max_turns,
            tx,
            cancel.clone(),
        ));

        Ok(Box::new(ProcessRunHandle {
            events: rx,
            cancel,
            continuity: None,
            finished: false,
        }))
    }
}

async fn drive(
    mut child: Child,
    mut stdin: ChildStdin,
    stdout: ChildStdout,
    router: ToolRouter,
    max_turns: u32,
    tx: mpsc::Sender<Incoming>,
    cancel: CancellationToken,
) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                kill(&mut child).await;
                return;
            }
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Incoming::Failed(EngineError::Io(e))).await;
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let message = match serde_json::from_str::<EngineMessage>(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!(target: "engine", "Ignoring malformed engine output: {e}");
                continue;
            }
        };

        match message {
            EngineMessage::Event { event } => {
                if tx.send(Incoming::Event(RawEvent::from_value(event))).await.is_err() {
                    break;
                }
            }
            EngineMessage::ToolRequest {
                call_id,
                name,
                arguments,
            } => {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        kill(&mut child).await;
                        return;
                    }
                    result = call_tool(&router, &name, arguments) => result,
                };
                let reply = match result {
                    Ok(output) => Outgoing::ToolResult {
                        call_id,
                        output,
                        is_error: false,
                    },
                    Err(e) => {
                        warn!("Tool '{}' failed: {}", name, e);
                        Outgoing::ToolResult {
                            call_id,
                            output: e.to_string(),
                            is_error: true,
                        }
                    }
                };
                if let Err(e) = write_message(&mut stdin, &reply).await {
                    let _ = tx.send(Incoming::Failed(e)).await;
                    break;
                }
            }
            EngineMessage::Completed { response_id } => {
                let _ = tx
                    .send(Incoming::Completed(response_id.map(ContinuityToken::new)))
                    .await;
                break;
            }
            EngineMessage::Failed { kind, message } => {
                let error = match kind {
                    FailureKind::MaxTurnsExceeded => EngineError::MaxTurnsExceeded { max_turns },
                    FailureKind::Other => EngineError::Failed(message),
                };
                let _ = tx.send(Incoming::Failed(error)).await;
                break;
            }
        }
    }

    drop(stdin);
    match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
        Ok(Ok(status)) => debug!("Engine process exited with {status}"),
        Ok(Err(e)) => warn!("Failed to wait for engine process: {e}"),
        Err(_) => kill(&mut child).await,
    }
}

async fn kill(child: &mut Child) {
    debug!("Killing engine process");
    if let Err(e) = child.kill().await {
        warn!("Failed to kill engine process: {e}");
    }
}

async fn call_tool(router: &ToolRouter, name: &str, arguments: Value) -> Result<String, McpError> {
    let arguments = match arguments {
        Value::Null => None,
        Value::Object(map) => Some(map),
        Value::String(raw) if raw.trim().is_empty() => None,
        Value::String(raw) => Some(serde_json::from_str::<Map<String, Value>>(&raw).map_err(|e| {
            McpError::ToolCallFailed {
                tool_name: name.to_string(),
                message: format!("arguments are not a JSON object: {e}"),
            }
        })?),
        other => {
            return Err(McpError::ToolCallFailed {
                tool_name: name.to_string(),
                message: format!("arguments must be an object, got {other}"),
            });
        }
    };
    router.call(name, arguments).await
}

async fn write_message(stdin: &mut ChildStdin, message: &Outgoing<'_>) -> Result<(), EngineError> {
    let mut line = serde_json::to_string(message)
        .map_err(|e| EngineError::Transport(format!("failed to encode message: {e}")))?;
    line.push('\n');
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

fn forward_stderr(stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "engine", "{}", line);
        }
    });
}

struct ProcessRunHandle {
    events: mpsc::Receiver<Incoming>,
    cancel: CancellationToken,
    continuity: Option<ContinuityToken>,
    finished: bool,
}

#[async_trait]
impl RunHandle for ProcessRunHandle {
    async fn next_raw_event(&mut self) -> Option<Result<RawEvent, EngineError>> {
        if self.finished {
            return None;
        }
        match self.events.recv().await {
            Some(Incoming::Event(event)) => Some(Ok(event)),
            Some(Incoming::Completed(token)) => {
                self.finished = true;
                self.continuity = token;
                None
            }
            Some(Incoming::Failed(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            None => {
                self.finished = true;
                if self.cancel.is_cancelled() {
                    None
                } else {
                    Some(Err(EngineError::Transport(
                        "engine exited before completing the run".to_string(),
                    )))
                }
            }
        }
    }

    fn cancel(&mut self) {
        self.cancel.cancel();
    }

    fn continuity_token(&self) -> Option<ContinuityToken> {
        self.continuity.clone()
    }
}

impl Drop for ProcessRunHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKey;
    use crate::mcp::CapabilityProvider;
    use crate::test_utils::FakeProvider;
    use tiller_tools::Mode;

    fn definition(router: ToolRouter) -> AgentDefinition {
        AgentDefinition {
            name: "test".to_string(),
            model: "codex-mini-latest".to_string(),
            instructions: "be brief".to_string(),
            api_key: ApiKey::new("sk-test"),
            tools: vec![],
            tool_router: router,
        }
    }

    fn shell_engine(script: &str) -> ProcessEngineFactory {
        ProcessEngineFactory::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    fn request() -> TurnRequest {
        TurnRequest {
            input: "hello".to_string(),
            continuity: Some(ContinuityToken::new("resp_0")),
            max_turns: 7,
        }
    }

    async fn drain(handle: &mut Box<dyn RunHandle>) -> Vec<Result<RawEvent, EngineError>> {
        let mut out = Vec::new();
        while let Some(item) = handle.next_raw_event().await {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_from_command_line() {
        let factory = ProcessEngineFactory::from_command_line("node bridge.js --fast").unwrap();
        assert_eq!(factory.command, "node");
        assert_eq!(factory.args, vec!["bridge.js", "--fast"]);
        assert!(ProcessEngineFactory::from_command_line("   ").is_err());

        let quoted = ProcessEngineFactory::from_command_line(r#"node "my bridge.js""#).unwrap();
        assert_eq!(quoted.args, vec!["my bridge.js"]);
        assert!(ProcessEngineFactory::from_command_line(r#"node "unclosed"#).is_err());
    }

    #[tokio::test]
    async fn test_missing_engine_command_fails_construction() {
        let factory = ProcessEngineFactory::new("tiller-no-such-engine", vec![]);
        let result = factory.build(definition(ToolRouter::new())).await;
        assert!(matches!(result, Err(EngineError::Construction(_))));
    }

    #[tokio::test]
    async fn test_events_then_completion_token() {
        let script = r#"read submit
case "$submit" in *'"previous_response_id":"resp_0"'*) ;; *) exit 3;; esac
echo '{"type":"event","event":{"type":"message_output_created","content":[{"type":"output_text","text":"hi"}]}}'
echo '{"type":"event","event":{"type":"agent_updated_stream_event"}}'
echo '{"type":"completed","response_id":"resp_1"}'"#;
        let engine = shell_engine(script)
            .build(definition(ToolRouter::new()))
            .await
            .unwrap();

        let mut handle = engine.submit(request()).await.unwrap();
        let events: Vec<_> = drain(&mut handle).await.into_iter().map(|e| e.unwrap()).collect();

        assert_eq!(events, vec![RawEvent::message("hi"), RawEvent::Unrecognized]);
        assert_eq!(handle.continuity_token(), Some(ContinuityToken::new("resp_1")));
    }

    #[tokio::test]
    async fn test_tool_requests_are_routed() {
        let provider: Arc<dyn CapabilityProvider> = Arc::new(FakeProvider::new("a", &["echo"]));
        let (_, router) = ToolRouter::from_providers(&[provider], Mode::Default);

        let script = r#"read submit
echo '{"type":"tool_request","call_id":"c1","name":"echo","arguments":{}}'
read result
case "$result" in
  *'"output":"a:echo"'*) echo '{"type":"completed","response_id":"ok"}' ;;
  *) echo '{"type":"failed","message":"bad tool result"}' ;;
esac"#;
        let engine = shell_engine(script).build(definition(router)).await.unwrap();

        let mut handle = engine.submit(request()).await.unwrap();
        assert!(drain(&mut handle).await.is_empty());
        assert_eq!(handle.continuity_token(), Some(ContinuityToken::new("ok")));
    }

    #[tokio::test]
    async fn test_turn_limit_is_distinct() {
        let script = r#"read submit
echo '{"type":"failed","kind":"max_turns_exceeded","message":"too many"}'"#;
        let engine = shell_engine(script)
            .build(definition(ToolRouter::new()))
            .await
            .unwrap();

        let mut handle = engine.submit(request()).await.unwrap();
        let results = drain(&mut handle).await;
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            Err(EngineError::MaxTurnsExceeded { max_turns: 7 })
        ));
        assert_eq!(handle.continuity_token(), None);
    }

    #[tokio::test]
    async fn test_exit_without_completion_is_an_error() {
        let engine = shell_engine("read submit; exit 0")
            .build(definition(ToolRouter::new()))
            .await
            .unwrap();

        let mut handle = engine.submit(request()).await.unwrap();
        let results = drain(&mut handle).await;
        assert!(matches!(results.as_slice(), [Err(EngineError::Transport(_))]));
    }

    #[tokio::test]
    async fn test_cancel_ends_the_run() {
        let engine = shell_engine("read submit; sleep 30")
            .build(definition(ToolRouter::new()))
            .await
            .unwrap();

        let mut handle = engine.submit(request()).await.unwrap();
        handle.cancel();
        let results = tokio::time::timeout(Duration::from_secs(10), drain(&mut handle))
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(handle.continuity_token(), None);
    }
}
