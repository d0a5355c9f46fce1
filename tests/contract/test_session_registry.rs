//! Contract Tests for the Session Registry
//!
//! These tests define the observable behavior of sessions: command
//! acceptance, the one-in-flight rule, cancellation, timeouts, process exit
//! and identifier handling. Shells are scripted mocks, so every scenario is
//! deterministic.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use mosaicterm_session::session::{IdAllocator, IdKind};
use mosaicterm_session::{
    Completion, ConnectionTarget, Error, SessionEvent, SessionId, SessionRegistry,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_utils::{
    events_until_complete, partial_text, test_config, Behavior, MockShellScript, MockSpawner,
};

const LIMIT: Duration = Duration::from_secs(5);

async fn mock_session(script: MockShellScript) -> (SessionRegistry, SessionId, Arc<MockSpawner>) {
    mock_session_with(SessionRegistry::new(test_config()), script).await
}

async fn mock_session_with(
    registry: SessionRegistry,
    script: MockShellScript,
) -> (SessionRegistry, SessionId, Arc<MockSpawner>) {
    let spawner = Arc::new(MockSpawner::new(script));
    let id = registry
        .create_session("bash", ConnectionTarget::external(spawner.clone()))
        .await
        .expect("create session");
    (registry, id, spawner)
}

#[tokio::test]
async fn test_echo_hi_yields_output_and_status() {
    let (registry, id, spawner) = mock_session(MockShellScript::new()).await;
    let mut events = registry.subscribe(&id).await.unwrap();

    registry.run_command(&id, "echo hi").await.unwrap();
    let received = events_until_complete(&mut events, LIMIT).await;

    assert_eq!(partial_text(&received), "hi\n");
    match received.last() {
        Some(SessionEvent::Complete(outcome)) => {
            assert_eq!(outcome.output, "hi\n");
            assert_eq!(outcome.exit_status, Some(0));
            assert_eq!(outcome.completion, Completion::Marker);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(spawner.last().commands(), vec!["echo hi".to_string()]);
}

#[tokio::test]
async fn test_execute_returns_outcome() {
    let (registry, id, _) = mock_session(MockShellScript::new()).await;
    let outcome = registry.execute(&id, "false").await.unwrap();
    assert_eq!(outcome.output, "");
    assert_eq!(outcome.exit_status, Some(1));
    assert!(!outcome.succeeded());
}

#[tokio::test]
async fn test_exit_inside_command_reports_process_exit_code() {
    let (registry, id, _) = mock_session(MockShellScript::new()).await;
    let mut events = registry.subscribe(&id).await.unwrap();

    let outcome = registry.execute(&id, "exit 7").await.unwrap();
    assert_eq!(outcome.output, "");
    assert_eq!(outcome.exit_status, Some(7));
    assert_eq!(outcome.completion, Completion::ProcessExited);

    // Exited follows the completion
    let received = events_until_complete(&mut events, LIMIT).await;
    assert!(received.last().unwrap().is_complete());
    let next = tokio::time::timeout(LIMIT, events.recv()).await.unwrap();
    assert_eq!(next, Some(SessionEvent::Exited { code: Some(7) }));

    assert!(matches!(
        registry.run_command(&id, "echo again").await,
        Err(Error::ProcessExited { .. })
    ));
    let info = registry.session_info(&id).await.unwrap();
    assert!(!info.running);
    assert_eq!(info.exit_code, Some(7));
}

#[tokio::test]
async fn test_second_command_rejected_while_busy() {
    let script = MockShellScript::new().respond(
        "slow",
        Behavior::Delayed {
            delay: Duration::from_millis(200),
            text: "done\n".to_string(),
            status: 0,
        },
    );
    let (registry, id, _) = mock_session(script).await;
    let mut events = registry.subscribe(&id).await.unwrap();

    registry.run_command(&id, "slow").await.unwrap();
    assert!(registry.session_info(&id).await.unwrap().busy);
    assert!(matches!(
        registry.run_command(&id, "echo queued").await,
        Err(Error::SessionBusy { .. })
    ));

    let received = events_until_complete(&mut events, LIMIT).await;
    assert_eq!(partial_text(&received), "done\n");

    // Accepted again once the first command completed
    let outcome = registry.execute(&id, "echo next").await.unwrap();
    assert_eq!(outcome.output, "next\n");
}

#[tokio::test]
async fn test_exactly_one_completion_per_command() {
    let (registry, id, _) = mock_session(MockShellScript::new().chunked(3)).await;
    let mut events = registry.subscribe(&id).await.unwrap();

    for i in 0..5 {
        registry
            .execute(&id, &format!("echo line {}", i))
            .await
            .unwrap();
    }

    let mut completions = 0;
    while let Some(event) = events.try_recv() {
        if event.is_complete() {
            completions += 1;
        }
    }
    assert_eq!(completions, 5);
}

#[tokio::test]
async fn test_cancel_without_pending_command_is_noop() {
    let (registry, id, spawner) = mock_session(MockShellScript::new()).await;
    let mut events = registry.subscribe(&id).await.unwrap();

    registry.cancel(&id).await.unwrap();
    registry.cancel(&id).await.unwrap();

    assert_eq!(spawner.last().interrupts(), 0);
    assert!(events.try_recv().is_none());
    assert!(registry.execute(&id, "echo ok").await.unwrap().succeeded());
}

#[tokio::test]
async fn test_cancel_completes_with_partial_output() {
    let script = MockShellScript::new().respond(
        "tail -f log",
        Behavior::Hang {
            text: "first\n".to_string(),
        },
    );
    let (registry, id, spawner) = mock_session(script).await;
    let mut events = registry.subscribe(&id).await.unwrap();

    registry.run_command(&id, "tail -f log").await.unwrap();
    // Wait until the partial output arrived
    match tokio::time::timeout(LIMIT, events.recv()).await.unwrap() {
        Some(SessionEvent::Partial { text }) => assert_eq!(text, "first\n"),
        other => panic!("expected partial output, got {:?}", other),
    }

    registry.cancel(&id).await.unwrap();
    let outcome = tokio::time::timeout(LIMIT, events.next_completion())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.output, "first\n");
    assert_eq!(outcome.exit_status, None);
    assert_eq!(outcome.completion, Completion::Cancelled);
    assert_eq!(spawner.last().interrupts(), 1);

    assert!(!registry.session_info(&id).await.unwrap().busy);
}

#[tokio::test]
async fn test_timeout_reports_error_and_completes() {
    let mut config = test_config();
    config.detection.command_timeout_ms = 100;
    let script = MockShellScript::new().respond(
        "stuck",
        Behavior::Hang {
            text: "partial".to_string(),
        },
    );
    let (registry, id, _) = mock_session_with(SessionRegistry::new(config), script).await;
    let mut events = registry.subscribe(&id).await.unwrap();

    registry.run_command(&id, "stuck").await.unwrap();
    let received = events_until_complete(&mut events, LIMIT).await;

    assert!(received
        .iter()
        .any(|e| matches!(e, SessionEvent::Error { detail } if detail.contains("stuck"))));
    match received.last() {
        Some(SessionEvent::Complete(outcome)) => {
            assert_eq!(outcome.output, "partial");
            assert_eq!(outcome.exit_status, None);
            assert_eq!(outcome.completion, Completion::TimedOut);
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_killed_mid_command_completes_with_captured_output() {
    let script = MockShellScript::new().respond(
        "long-job",
        Behavior::Hang {
            text: "step 1\nstep 2\n".to_string(),
        },
    );
    let (registry, id, spawner) = mock_session(script).await;
    let mut events = registry.subscribe(&id).await.unwrap();

    registry.run_command(&id, "long-job").await.unwrap();
    tokio::time::timeout(LIMIT, events.recv()).await.unwrap();
    spawner.last().kill(None);

    let outcome = tokio::time::timeout(LIMIT, events.next_completion())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.output, "step 1\nstep 2\n");
    assert_eq!(outcome.exit_status, None);
    assert_eq!(outcome.completion, Completion::ProcessExited);
}

#[tokio::test]
async fn test_pty_echo_and_split_chunks() {
    let spawner = Arc::new(MockSpawner::new(MockShellScript::new().echoing().chunked(1)));
    let registry = SessionRegistry::new(test_config());
    let mut target = ConnectionTarget::external(spawner.clone());
    if let ConnectionTarget::External { options, .. } = &mut target {
        options.use_pty = Some(true);
    }
    let id = registry.create_session("sh", target).await.unwrap();

    let outcome = registry.execute(&id, "echo it's fine").await.unwrap();
    assert_eq!(outcome.output, "it's fine\n");
    assert_eq!(outcome.exit_status, Some(0));

    let info = registry.session_info(&id).await.unwrap();
    assert!(info.uses_pty);
    assert!(spawner.requests()[0].use_pty);

    // The echoed line never carries a contiguous marker
    let (open, close) = written_markers(&spawner.last().written()[0]);
    assert!(!spawner.last().written()[0].contains(&open));
    assert!(!spawner.last().written()[0].contains(&close));
}

/// Open and close tokens recovered from a written sandwich line
fn written_markers(line: &str) -> (String, String) {
    let halves: Vec<&str> = line
        .split('\'')
        .filter(|word| word.len() >= 16 && word.chars().all(|c| c.is_ascii_hexdigit()))
        .collect();
    assert_eq!(halves.len(), 4, "unexpected line: {}", line);
    (
        format!("{}{}", halves[0], halves[1]),
        format!("{}{}", halves[2], halves[3]),
    )
}

#[tokio::test]
async fn test_stale_markers_from_previous_command_are_ignored() {
    let (registry, id, spawner) = mock_session(MockShellScript::new()).await;
    let first = registry.execute(&id, "echo one").await.unwrap();
    assert_eq!(first.output, "one\n");

    // Replay the first command's markers around the second command
    let shell = spawner.last();
    let (open, close) = written_markers(&shell.written()[0]);
    shell.emit(format!("{}\nstale\n{} 3\n", open, close).as_bytes());
    let second = registry.execute(&id, "echo two").await.unwrap();
    assert_eq!(second.output, "two\n");
    assert_eq!(second.exit_status, Some(0));
}

#[tokio::test]
async fn test_spawn_failure_rolls_back() {
    let registry = SessionRegistry::new(test_config());
    let spawner = Arc::new(MockSpawner::failing());
    let result = registry
        .create_session("bash", ConnectionTarget::external(spawner))
        .await;
    assert!(matches!(result, Err(Error::SpawnFailed { .. })));
    assert!(registry.session_ids().await.is_empty());
}

#[tokio::test]
async fn test_unsupported_shell_kind() {
    let registry = SessionRegistry::new(test_config());
    let spawner = Arc::new(MockSpawner::new(MockShellScript::new()));
    let result = registry
        .create_session("tcsh", ConnectionTarget::external(spawner.clone()))
        .await;
    assert!(matches!(result, Err(Error::UnsupportedShellKind { .. })));
    assert!(spawner.requests().is_empty());
}

#[tokio::test]
async fn test_destroy_cancels_pending_and_forgets_session() {
    let script = MockShellScript::new().respond(
        "forever",
        Behavior::Hang {
            text: String::new(),
        },
    );
    let (registry, id, _) = mock_session(script).await;
    let mut events = registry.subscribe(&id).await.unwrap();

    registry.run_command(&id, "forever").await.unwrap();
    registry.destroy_session(&id).await.unwrap();

    let outcome = tokio::time::timeout(LIMIT, events.next_completion())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.completion, Completion::Cancelled);
    // Bus is gone once the driver stopped
    let rest = tokio::time::timeout(LIMIT, async {
        while events.recv().await.is_some() {}
    })
    .await;
    assert!(rest.is_ok());

    assert!(matches!(
        registry.run_command(&id, "echo").await,
        Err(Error::SessionNotFound { .. })
    ));
    assert!(matches!(
        registry.destroy_session(&id).await,
        Err(Error::SessionNotFound { .. })
    ));
}

#[tokio::test]
async fn test_destroyed_ids_are_never_reissued() {
    let values = Arc::new(Mutex::new(VecDeque::from(vec![
        "x".to_string(),
        "x".to_string(),
        "x".to_string(),
        "y".to_string(),
        "y".to_string(),
    ])));
    let source = values.clone();
    let ids = IdAllocator::with_generator(move || {
        source
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "z".to_string())
    });
    let registry = SessionRegistry::with_allocator(test_config(), ids);

    let spawner = Arc::new(MockSpawner::new(MockShellScript::new()));
    let first = registry
        .create_session("bash", ConnectionTarget::external(spawner.clone()))
        .await
        .unwrap();
    assert_eq!(first.as_str(), "x");
    registry.destroy_session(&first).await.unwrap();

    let second = registry
        .create_session("bash", ConnectionTarget::external(spawner))
        .await
        .unwrap();
    assert_eq!(second.as_str(), "y");
    assert_eq!(registry.session_ids().await, vec![second]);
    assert!(values.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_ids_and_allocator_counts() {
    let registry = SessionRegistry::new(test_config());
    let a = registry.new_chat_id();
    let b = registry.new_chat_id();
    assert_ne!(a, b);

    let mut ids = IdAllocator::new();
    ids.chat_id();
    assert_eq!(ids.issued(IdKind::Chat), 1);
    assert_eq!(ids.issued(IdKind::Session), 0);
}

#[tokio::test]
async fn test_sessions_do_not_share_events() {
    let script = MockShellScript::new().respond(
        "slow",
        Behavior::Delayed {
            delay: Duration::from_millis(100),
            text: "slow done\n".to_string(),
            status: 0,
        },
    );
    let registry = SessionRegistry::new(test_config());
    let spawner = Arc::new(MockSpawner::new(script));
    let a = registry
        .create_session("bash", ConnectionTarget::external(spawner.clone()))
        .await
        .unwrap();
    let b = registry
        .create_session("bash", ConnectionTarget::external(spawner.clone()))
        .await
        .unwrap();
    let mut events_a = registry.subscribe(&a).await.unwrap();
    let mut events_b = registry.subscribe(&b).await.unwrap();

    registry.run_command(&a, "slow").await.unwrap();
    registry.run_command(&b, "echo quick").await.unwrap();

    let received_b = events_until_complete(&mut events_b, LIMIT).await;
    let received_a = events_until_complete(&mut events_a, LIMIT).await;
    assert_eq!(partial_text(&received_a), "slow done\n");
    assert_eq!(partial_text(&received_b), "quick\n");

    registry.shutdown().await;
    assert!(registry.is_empty().await);
}
