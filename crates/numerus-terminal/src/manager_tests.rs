// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::*;

fn spec(argv: &[&str]) -> SpawnSpec {
    SpawnSpec {
        argv: argv.iter().map(|s| s.to_string()).collect(),
        cwd: PathBuf::from("/tmp"),
        env: HashMap::new(),
        stdin_text: None,
        timeout: Duration::from_secs(5),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn spawn_captures_stdout_in_order() {
    let manager: TerminalManager = TerminalManager::new();
    let session = manager.spawn(spec(&["sh", "-c", "echo one; echo two"])).await.expect("spawn");
    let mut stream = manager.subscribe(&session).expect("subscribe");

    let mut lines = Vec::new();
    loop {
        match stream.recv().await.expect("stream open") {
            TerminalEvent::Stdout { chunk, .. } => lines.push(chunk),
            TerminalEvent::Exit { .. } => break,
            _ => {}
        }
    }
    assert_eq!(lines, vec!["one", "two"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn exactly_one_exit_event_is_published() {
    let manager: TerminalManager = TerminalManager::new();
    let session = manager.spawn(spec(&["sh", "-c", "exit 7"])).await.expect("spawn");
    let mut stream = manager.subscribe(&session).expect("subscribe");

    let mut exits = 0;
    while let Some(event) = stream.recv().await {
        if let TerminalEvent::Exit { code, .. } = event {
            exits += 1;
            assert_eq!(code, Some(7));
        }
    }
    assert_eq!(exits, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn send_writes_to_child_stdin() {
    let manager: TerminalManager = TerminalManager::new();
    let session = manager.spawn(spec(&["cat"])).await.expect("spawn");
    manager.send(&session, b"hello\n").await.expect("send");
    manager.send(&session, b"").await.ok(); // no-op second write is fine
    drop(manager.send(&session, &[]));

    let mut stream = manager.subscribe(&session).expect("subscribe");
    // Closing stdin makes `cat` exit; simulate by killing after the read.
    let mut saw_hello = false;
    let result = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(event) = stream.recv().await {
            if let TerminalEvent::Stdout { chunk, .. } = event {
                if chunk == "hello" {
                    saw_hello = true;
                    break;
                }
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for echoed stdin");
    assert!(saw_hello);
    let _ = manager.kill(&session, nix::sys::signal::Signal::SIGKILL);
}

#[tokio::test(flavor = "multi_thread")]
async fn kill_terminates_a_long_running_child() {
    let manager: TerminalManager = TerminalManager::new();
    let session = manager.spawn(spec(&["sleep", "30"])).await.expect("spawn");
    manager.kill(&session, nix::sys::signal::Signal::SIGKILL).expect("kill");

    let mut stream = manager.subscribe(&session).expect("subscribe");
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(TerminalEvent::Exit { .. }) = stream.recv().await {
                break;
            }
        }
    })
    .await;
    assert!(result.is_ok(), "killed child never published exit");
}

#[tokio::test(flavor = "multi_thread")]
async fn timeout_kills_a_child_that_overruns_its_budget() {
    let manager: TerminalManager = TerminalManager::new();
    let mut s = spec(&["sleep", "30"]);
    s.timeout = Duration::from_millis(100);
    let session = manager.spawn(s).await.expect("spawn");

    let mut stream = manager.subscribe(&session).expect("subscribe");
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(TerminalEvent::Exit { .. }) = stream.recv().await {
                break;
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed-out child never published exit");
}

#[tokio::test(flavor = "multi_thread")]
async fn stats_reflect_spawned_and_active_sessions() {
    let manager: TerminalManager = TerminalManager::new();
    let before = manager.stats();
    let session = manager.spawn(spec(&["sleep", "30"])).await.expect("spawn");
    let during = manager.stats();
    assert_eq!(during.spawned_total, before.spawned_total + 1);
    assert_eq!(during.active, before.active + 1);

    manager.kill(&session, nix::sys::signal::Signal::SIGKILL).expect("kill");
    let mut stream = manager.subscribe(&session).expect("subscribe");
    while let Some(event) = stream.recv().await {
        if event.is_exit() {
            break;
        }
    }
    // Give the waiter task a moment to record the exit.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after = manager.stats();
    assert_eq!(after.active, before.active);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_session_operations_fail_cleanly() {
    let manager: TerminalManager = TerminalManager::new();
    let ghost = SessionId::new();
    assert!(manager.subscribe(&ghost).is_err());
    assert!(manager.send(&ghost, b"x").await.is_err());
    assert!(manager.kill(&ghost, nix::sys::signal::Signal::SIGTERM).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_spawn_failures_open_the_circuit_breaker() {
    let manager: TerminalManager = TerminalManager::new();
    let bogus = || spec(&["/numerus/definitely-not-a-real-binary"]);

    for _ in 0..3 {
        let _ = manager.spawn(bogus()).await;
    }
    match manager.spawn(bogus()).await {
        Err(TerminalError::CircuitOpen) => {}
        other => panic!("expected circuit to be open, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_argv_is_rejected_before_touching_the_breaker() {
    let manager: TerminalManager = TerminalManager::new();
    let s = spec(&[]);
    assert!(matches!(manager.spawn(s).await, Err(TerminalError::SpawnFailed(_))));
}
