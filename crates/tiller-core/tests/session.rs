use futures::StreamExt;
use futures::future::FutureExt;
use std::sync::Arc;
use tempfile::TempDir;

use tiller_core::config::{ApiKey, ProviderSpec};
use tiller_core::engine::ContinuityToken;
use tiller_core::events::RawEvent;
use tiller_core::mcp::ProviderStatus;
use tiller_core::test_utils::{
    FakeConnector, ProviderBehavior, ScriptStep, ScriptedEngine, ScriptedEngineFactory,
};
use tiller_core::{AgentEvent, AgentSession, Error, Mode, SessionConfig, TurnOutcome};
use tiller_tools::providers;

fn config(dir: &TempDir) -> SessionConfig {
    SessionConfig::new(dir.path().to_path_buf(), ApiKey::new("sk-test")).with_providers(vec![
        ProviderSpec::new(providers::FILESYSTEM, "npx").required(),
        ProviderSpec::new(providers::CLI, "cli-mcp-server"),
        ProviderSpec::new(providers::GIT, "mcp-server-git"),
    ])
}

fn connector() -> FakeConnector {
    FakeConnector::new()
        .with_provider(
            providers::FILESYSTEM,
            &["read_file", "write_file", "list_directory"],
        )
        .with_provider(providers::CLI, &["run_command"])
        .with_provider(providers::GIT, &["git_status", "git_commit"])
}

#[tokio::test]
async fn list_files_end_to_end() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(ScriptedEngine::new().with_turn(
        vec![
            ScriptStep::Event(RawEvent::tool_call("list_directory", r#"{"path":"."}"#)),
            ScriptStep::Event(RawEvent::message("Here are the files.")),
        ],
        Some("resp_abc"),
    ));
    let factory = Arc::new(ScriptedEngineFactory::new(engine.clone()));

    let session = AgentSession::start(config(&dir), Arc::new(connector()), factory.clone())
        .await
        .unwrap();

    let events: Vec<AgentEvent> = session
        .run("list files")
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;

    assert_eq!(
        events,
        vec![
            AgentEvent::ToolCall {
                name: "list_directory".to_string(),
                arguments: r#"{"path":"."}"#.to_string(),
            },
            AgentEvent::MessageOutput {
                text: "Here are the files.".to_string(),
            },
        ]
    );
    assert_eq!(session.continuity_token(), Some(ContinuityToken::new("resp_abc")));
    assert_eq!(session.last_outcome(), Some(TurnOutcome::Completed));
    assert_eq!(engine.submitted()[0].input, "list files");

    let definition = &factory.definitions()[0];
    assert_eq!(definition.model, "codex-mini-latest");
    assert!(definition.tool_router.contains("list_directory"));
    assert!(definition.instructions.contains(&dir.path().display().to_string()));

    session.close().await;
}

#[tokio::test]
async fn cancellation_before_first_event() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(
        ScriptedEngine::new().with_turn(vec![ScriptStep::Event(RawEvent::message("late"))], Some("T1")),
    );
    let session = AgentSession::start(
        config(&dir),
        Arc::new(connector()),
        Arc::new(ScriptedEngineFactory::new(engine.clone())),
    )
    .await
    .unwrap();

    let turn = session.run("do something slow").await.unwrap();
    assert!(session.cancel());
    let events: Vec<_> = turn.collect().await;

    assert!(events.is_empty());
    assert_eq!(engine.cancel_count(0), 1);
    assert_eq!(session.continuity_token(), None);
    assert_eq!(session.last_outcome(), Some(TurnOutcome::Cancelled));

    session.close().await;
}

#[tokio::test]
async fn cancelled_turn_keeps_previous_token() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(
        ScriptedEngine::new()
            .with_turn(vec![ScriptStep::Event(RawEvent::message("one"))], Some("T1"))
            .with_turn(
                vec![ScriptStep::Event(RawEvent::reasoning("hmm")), ScriptStep::Pending],
                Some("T2"),
            )
            .with_turn(vec![], Some("T3")),
    );
    let session = AgentSession::start(
        config(&dir),
        Arc::new(connector()),
        Arc::new(ScriptedEngineFactory::new(engine.clone())),
    )
    .await
    .unwrap();

    let mut continuity = session.subscribe_continuity();
    let _ = session.run("first").await.unwrap().collect::<Vec<_>>().await;
    assert!(continuity.has_changed().unwrap());
    assert_eq!(
        *continuity.borrow_and_update(),
        Some(ContinuityToken::new("T1"))
    );

    let mut turn = session.run("second").await.unwrap();
    assert!(matches!(turn.next().await, Some(Ok(AgentEvent::Reasoning { .. }))));
    assert!(matches!(session.run("overlap").await, Err(Error::TurnInProgress)));
    session.cancel();
    assert!(turn.next().await.is_none());
    assert_eq!(session.continuity_token(), Some(ContinuityToken::new("T1")));
    assert!(!continuity.has_changed().unwrap());

    let _ = session.run("third").await.unwrap().collect::<Vec<_>>().await;
    let submitted = engine.submitted();
    assert_eq!(submitted.last().unwrap().continuity, Some(ContinuityToken::new("T1")));
    assert_eq!(session.continuity_token(), Some(ContinuityToken::new("T3")));

    session.close().await;
}

#[tokio::test]
async fn required_provider_failure_aborts_start() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(
        FakeConnector::new()
            .with_provider(providers::CLI, &["run_command"])
            .with_provider(providers::GIT, &["git_status"])
            .with_behavior(providers::FILESYSTEM, ProviderBehavior::Fail),
    );
    let config = config(&dir).with_providers(vec![
        ProviderSpec::new(providers::CLI, "cli-mcp-server"),
        ProviderSpec::new(providers::GIT, "mcp-server-git"),
        ProviderSpec::new(providers::FILESYSTEM, "npx").required(),
    ]);
    let factory = Arc::new(ScriptedEngineFactory::new(Arc::new(ScriptedEngine::new())));

    let result = AgentSession::start(config, connector.clone(), factory.clone()).await;

    assert!(matches!(result, Err(Error::Provider(_))));
    assert_eq!(connector.started(), vec![providers::CLI, providers::GIT]);
    assert!(connector.running().is_empty());
    assert!(factory.definitions().is_empty());
}

#[tokio::test]
async fn optional_provider_failure_reduces_tool_surface() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(
        FakeConnector::new()
            .with_provider(providers::FILESYSTEM, &["read_file"])
            .with_behavior(providers::CLI, ProviderBehavior::Fail)
            .with_provider(providers::GIT, &["git_status"]),
    );
    let session = AgentSession::start(
        config(&dir),
        connector.clone(),
        Arc::new(ScriptedEngineFactory::new(Arc::new(ScriptedEngine::new()))),
    )
    .await
    .unwrap();

    let names: Vec<_> = session.tools().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["read_file", "git_status"]);

    let statuses = session.provider_statuses();
    let cli = statuses.iter().find(|s| s.name == providers::CLI).unwrap();
    assert!(matches!(cli.status, ProviderStatus::Failed { .. }));

    session.close().await;
    assert_eq!(connector.stopped(), vec![providers::GIT, providers::FILESYSTEM]);
}

#[tokio::test]
async fn plan_mode_hides_mutating_tools() {
    let dir = TempDir::new().unwrap();
    let session = AgentSession::start(
        config(&dir).with_mode(Mode::Plan),
        Arc::new(connector()),
        Arc::new(ScriptedEngineFactory::new(Arc::new(ScriptedEngine::new()))),
    )
    .await
    .unwrap();

    let names: Vec<_> = session.tools().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["read_file", "list_directory", "run_command", "git_status"]);

    session.close().await;
}

#[tokio::test]
async fn engine_construction_failure_releases_providers() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(connector());

    let result = AgentSession::start(
        config(&dir),
        connector.clone(),
        Arc::new(ScriptedEngineFactory::failing()),
    )
    .await;

    assert!(matches!(result, Err(Error::Engine(_))));
    assert_eq!(connector.started().len(), 3);
    assert!(connector.running().is_empty());
}

#[tokio::test]
async fn scoped_session_is_closed_after_closure() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(connector());
    let engine = Arc::new(ScriptedEngine::new().with_turn(vec![], Some("T1")));

    let token = AgentSession::scoped(
        config(&dir),
        connector.clone(),
        Arc::new(ScriptedEngineFactory::new(engine)),
        |session| {
            async move {
                let _ = session.run("hi").await?.collect::<Vec<_>>().await;
                Ok::<_, Error>(session.continuity_token())
            }
            .boxed()
        },
    )
    .await
    .unwrap();

    assert_eq!(token, Some(ContinuityToken::new("T1")));
    assert!(connector.running().is_empty());
}

#[tokio::test]
async fn invalid_config_starts_nothing() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(connector());
    let mut config = config(&dir);
    config.max_turns = 0;

    let result = AgentSession::start(
        config,
        connector.clone(),
        Arc::new(ScriptedEngineFactory::new(Arc::new(ScriptedEngine::new()))),
    )
    .await;

    assert!(matches!(result, Err(Error::Config(_))));
    assert!(connector.started().is_empty());
}

#[tokio::test]
async fn unclosed_session_is_released_on_drop() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(connector());
    let engine = Arc::new(ScriptedEngine::new().with_turn(
        vec![ScriptStep::Fail(tiller_core::EngineError::Failed(
            "boom".to_string(),
        ))],
        None,
    ));
    let session = AgentSession::start(
        config(&dir),
        connector.clone(),
        Arc::new(ScriptedEngineFactory::new(engine)),
    )
    .await
    .unwrap();

    let items: Vec<_> = session.run("fail").await.unwrap().collect().await;
    assert!(matches!(items.as_slice(), [Err(Error::Engine(_))]));

    drop(session);
    for _ in 0..100 {
        if connector.running().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(connector.running().is_empty());
}

#[tokio::test]
async fn unclosed_session_dropped_at_shutdown_does_not_abort() {
    let dir = TempDir::new().unwrap();
    let session = AgentSession::start(
        config(&dir),
        Arc::new(connector()),
        Arc::new(ScriptedEngineFactory::new(Arc::new(ScriptedEngine::new()))),
    )
    .await
    .unwrap();
    assert!(!session.tools().is_empty());
    // Dropped only when the test runtime shuts down.
    tokio::spawn(async move {
        let _session = session;
        std::future::pending::<()>().await;
    });
}

#[tokio::test]
async fn optional_filesystem_provider_is_rejected() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(
        FakeConnector::new()
            .with_behavior(providers::FILESYSTEM, ProviderBehavior::Fail)
            .with_provider(providers::CLI, &["run_command"])
            .with_provider(providers::GIT, &["git_status"]),
    );
    let config = config(&dir).with_providers(vec![
        ProviderSpec::new(providers::FILESYSTEM, "npx"),
        ProviderSpec::new(providers::CLI, "cli-mcp-server"),
        ProviderSpec::new(providers::GIT, "mcp-server-git"),
    ]);

    let result = AgentSession::start(
        config,
        connector.clone(),
        Arc::new(ScriptedEngineFactory::new(Arc::new(ScriptedEngine::new()))),
    )
    .await;

    assert!(matches!(result, Err(Error::Config(_))));
    assert!(connector.started().is_empty());
}
