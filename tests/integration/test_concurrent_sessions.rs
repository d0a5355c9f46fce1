//! Integration Tests for concurrent sessions
//!
//! Several real shells run long commands at the same time; each session must
//! only ever see its own output.

#![cfg(unix)]

#[path = "../test_utils/mod.rs"]
mod test_utils;

use mosaicterm_session::{ConnectionTarget, SessionRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use test_utils::{events_until_complete, partial_text, test_config};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_run_in_parallel_without_cross_talk() {
    let registry = Arc::new(SessionRegistry::new(test_config()));
    let mut sessions = Vec::new();
    for _ in 0..3 {
        let id = registry
            .create_session("sh", ConnectionTarget::pipe())
            .await
            .unwrap();
        sessions.push(id);
    }
    assert_eq!(registry.len().await, 3);

    let started = Instant::now();
    let tasks: Vec<_> = sessions
        .iter()
        .enumerate()
        .map(|(n, id)| {
            let registry = registry.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let mut events = registry.subscribe(&id).await.unwrap();
                registry
                    .run_command(&id, &format!("sleep 1; echo session-{}", n))
                    .await
                    .unwrap();
                let received = events_until_complete(&mut events, Duration::from_secs(10)).await;
                (n, partial_text(&received))
            })
        })
        .collect();

    for task in tasks {
        let (n, text) = task.await.unwrap();
        assert_eq!(text, format!("session-{}\n", n));
    }
    // Sequential execution would take at least three seconds
    assert!(started.elapsed() < Duration::from_millis(2800));

    registry.shutdown().await;
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_destroying_one_session_leaves_others_running() {
    let registry = SessionRegistry::new(test_config());
    let a = registry
        .create_session("sh", ConnectionTarget::pipe())
        .await
        .unwrap();
    let b = registry
        .create_session("sh", ConnectionTarget::pipe())
        .await
        .unwrap();
    assert_ne!(a, b);

    registry.destroy_session(&a).await.unwrap();
    assert_eq!(registry.session_ids().await, vec![b.clone()]);

    let outcome = registry.execute(&b, "echo still here").await.unwrap();
    assert_eq!(outcome.output, "still here\n");

    registry.shutdown().await;
}

#[tokio::test]
async fn test_many_sequential_commands() {
    let registry = SessionRegistry::new(test_config());
    let id = registry
        .create_session("sh", ConnectionTarget::pipe())
        .await
        .unwrap();

    for i in 0..50 {
        let outcome = registry.execute(&id, &format!("echo {}", i)).await.unwrap();
        assert_eq!(outcome.output, format!("{}\n", i));
        assert_eq!(outcome.exit_status, Some(0));
    }
    assert_eq!(registry.session_info(&id).await.unwrap().commands_run, 50);

    let large = registry
        .execute(&id, "i=0; while [ $i -lt 2000 ]; do echo line-$i; i=$((i+1)); done")
        .await
        .unwrap();
    assert_eq!(large.output.lines().count(), 2000);
    assert!(large.output.ends_with("line-1999\n"));

    registry.shutdown().await;
}
