// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! The Terminal Manager (C4, `spec.md` §4.3).
//!
//! Per `spec.md` §9 "Concurrency reshape" and the workspace's own idiom
//! (see `DESIGN.md`): one piped child process per agent, one reader task
//! per stdout/stderr stream publishing onto a `tokio::sync::broadcast`
//! channel. A lagging subscriber surfaces as `tokio::sync::broadcast`'s own
//! `Lagged` error, which [`EventStream::recv`] translates into the
//! `error(kind=overflow)` event `spec.md` §4.3 specifies — the bounded ring
//! + drop-oldest-on-overflow behavior is the broadcast channel's built-in
//! semantics, not a bespoke buffer.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use numerus_core::{Clock, SystemClock};
use parking_lot::Mutex as SyncMutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{broadcast, Mutex as AsyncMutex};

use crate::circuit::CircuitBreaker;
use crate::error::TerminalError;
use crate::event::{ErrorKind, TerminalEvent};
use crate::session::{SessionId, SpawnSpec};

/// Per-session broadcast capacity: the bound on the backpressure ring
/// described in `spec.md` §4.3.
const EVENT_BUFFER_CAPACITY: usize = 1024;

struct SessionEntry {
    pid: u32,
    events: broadcast::Sender<TerminalEvent>,
    stdin: AsyncMutex<Option<ChildStdin>>,
    exit: SyncMutex<Option<(Option<i32>, u64)>>,
}

#[derive(Default)]
struct Stats {
    spawned_total: u64,
    exits_by_code: HashMap<i32, u64>,
}

/// Snapshot returned by [`TerminalManager::stats`] (`spec.md` §4.3 `stats`).
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub active: usize,
    pub spawned_total: u64,
    pub exits_by_code: HashMap<i32, u64>,
}

/// A live, forward-only subscription to one session's event stream.
///
/// Per `spec.md` §9's Open Question resolution (see `DESIGN.md`), `attach`
/// never replays history — this is the only stream type the manager hands
/// out, whether obtained via `subscribe` or `attach`.
pub struct EventStream<C: Clock = SystemClock> {
    session: SessionId,
    clock: C,
    receiver: broadcast::Receiver<TerminalEvent>,
}

impl<C: Clock> EventStream<C> {
    /// Await the next event. A lagged subscriber receives one synthetic
    /// `Error { kind: Overflow }` event (the oldest unread chunks are
    /// dropped, matching `spec.md` §4.3 exactly) and then resumes from the
    /// oldest chunk still buffered. Returns `None` once the session's
    /// sender side is gone (always preceded by an `Exit` event).
    pub async fn recv(&mut self) -> Option<TerminalEvent> {
        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => Some(TerminalEvent::Error {
                session: self.session.clone(),
                kind: ErrorKind::Overflow,
                ts_epoch_ms: self.clock.epoch_ms(),
            }),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

/// The Terminal Manager: spawns and supervises one piped child process per
/// agent invocation.
pub struct TerminalManager<C: Clock = SystemClock> {
    clock: C,
    sessions: SyncMutex<HashMap<SessionId, Arc<SessionEntry>>>,
    stats: Arc<SyncMutex<Stats>>,
    breaker: CircuitBreaker<C>,
}

impl TerminalManager<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for TerminalManager<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> TerminalManager<C> {
    pub fn with_clock(clock: C) -> Self {
        let breaker = CircuitBreaker::with_defaults(clock.clone());
        Self { clock, sessions: SyncMutex::new(HashMap::new()), stats: Arc::new(SyncMutex::new(Stats::default())), breaker }
    }

    /// Spawn the agent process described by `spec` (`spec.md` §4.3 `spawn`).
    pub async fn spawn(&self, spec: SpawnSpec) -> Result<SessionId, TerminalError> {
        if spec.argv.is_empty() {
            return Err(TerminalError::SpawnFailed("empty argv".into()));
        }
        if self.breaker.is_open() {
            return Err(TerminalError::CircuitOpen);
        }

        let mut command = Command::new(&spec.argv[0]);
        command.args(&spec.argv[1..]);
        command.current_dir(&spec.cwd);
        command.envs(&spec.env);
        command.stdin(Stdio::piped());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.breaker.record_failure();
                return Err(TerminalError::SpawnFailed(e.to_string()));
            }
        };
        self.breaker.record_success();

        let pid = child
            .id()
            .ok_or_else(|| TerminalError::SpawnFailed("child exited before pid was observable".into()))?;
        let session_id = SessionId::new();

        let stdout = child.stdout.take().ok_or_else(|| TerminalError::SpawnFailed("no stdout pipe".into()))?;
        let stderr = child.stderr.take().ok_or_else(|| TerminalError::SpawnFailed("no stderr pipe".into()))?;
        let mut stdin = child.stdin.take();

        if let Some(text) = &spec.stdin_text {
            if let Some(pipe) = stdin.as_mut() {
                pipe.write_all(text.as_bytes())
                    .await
                    .map_err(|e| TerminalError::SpawnFailed(format!("failed writing stdin header: {e}")))?;
            }
        }

        let (tx, _rx) = broadcast::channel(EVENT_BUFFER_CAPACITY);
        let entry = Arc::new(SessionEntry {
            pid,
            events: tx.clone(),
            stdin: AsyncMutex::new(stdin),
            exit: SyncMutex::new(None),
        });
        self.sessions.lock().insert(session_id.clone(), entry.clone());
        self.stats.lock().spawned_total += 1;

        let started_ts = self.clock.epoch_ms();
        let _ = tx.send(TerminalEvent::Started { session: session_id.clone(), pid, ts_epoch_ms: started_ts });
        tracing::info!(session = %session_id, pid, "terminal session started");

        spawn_reader(session_id.clone(), stdout, tx.clone(), self.clock.clone(), false);
        spawn_reader(session_id.clone(), stderr, tx.clone(), self.clock.clone(), true);
        spawn_waiter(session_id.clone(), child, entry, self.stats.clone(), self.clock.clone(), spec.timeout);

        Ok(session_id)
    }

    /// `spec.md` §4.3 `subscribe`: live-forward stream of this session's events.
    pub fn subscribe(&self, session: &SessionId) -> Result<EventStream<C>, TerminalError> {
        let sessions = self.sessions.lock();
        let entry = sessions.get(session).ok_or(TerminalError::UnknownSession)?;
        Ok(EventStream { session: session.clone(), clock: self.clock.clone(), receiver: entry.events.subscribe() })
    }

    /// `spec.md` §4.3 `attach`: per the Open Question resolution recorded in
    /// `DESIGN.md`, attach never replays history, so it is exactly
    /// [`Self::subscribe`] called late.
    pub fn attach(&self, session: &SessionId) -> Result<EventStream<C>, TerminalError> {
        self.subscribe(session)
    }

    /// `spec.md` §4.3 `send`: write to the child's stdin.
    pub async fn send(&self, session: &SessionId, bytes: &[u8]) -> Result<(), TerminalError> {
        let entry = {
            let sessions = self.sessions.lock();
            sessions.get(session).cloned().ok_or(TerminalError::UnknownSession)?
        };
        let mut guard = entry.stdin.lock().await;
        match guard.as_mut() {
            Some(stdin) => stdin.write_all(bytes).await.map_err(|e| TerminalError::SendFailed(e.to_string())),
            None => Err(TerminalError::SendFailed("stdin closed".into())),
        }
    }

    /// `spec.md` §4.3 `kill`: deliver `signal` to the child's pid.
    pub fn kill(&self, session: &SessionId, signal: Signal) -> Result<(), TerminalError> {
        let entry = {
            let sessions = self.sessions.lock();
            sessions.get(session).cloned().ok_or(TerminalError::UnknownSession)?
        };
        signal::kill(Pid::from_raw(entry.pid as i32), signal).map_err(|e| TerminalError::SignalFailed(e.to_string()))
    }

    /// `spec.md` §4.3 `stats`.
    pub fn stats(&self) -> PoolStats {
        let sessions = self.sessions.lock();
        let active = sessions.values().filter(|e| e.exit.lock().is_none()).count();
        let stats = self.stats.lock();
        PoolStats { active, spawned_total: stats.spawned_total, exits_by_code: stats.exits_by_code.clone() }
    }

    /// Whether `session`'s child has exited, and with what code.
    pub fn exit_status(&self, session: &SessionId) -> Option<Option<i32>> {
        let sessions = self.sessions.lock();
        sessions.get(session)?.exit.lock().map(|(code, _)| code)
    }
}

fn spawn_reader<C: Clock>(
    session: SessionId,
    pipe: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    events: broadcast::Sender<TerminalEvent>,
    clock: C,
    is_stderr: bool,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let ts = clock.epoch_ms();
                    let event = if is_stderr {
                        TerminalEvent::Stderr { session: session.clone(), chunk: line, ts_epoch_ms: ts }
                    } else {
                        TerminalEvent::Stdout { session: session.clone(), chunk: line, ts_epoch_ms: ts }
                    };
                    // A full broadcast channel here means every subscriber is
                    // already lagging; the reader keeps pulling from the pipe
                    // regardless so the child is never blocked on a slow
                    // consumer (`spec.md` §4.3 "must not block ... the child").
                    let _ = events.send(event);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(session = %session, stderr = is_stderr, error = %e, "terminal reader error");
                    break;
                }
            }
        }
    });
}

fn spawn_waiter<C: Clock>(
    session: SessionId,
    mut child: Child,
    entry: Arc<SessionEntry>,
    stats: Arc<SyncMutex<Stats>>,
    clock: C,
    timeout: std::time::Duration,
) {
    tokio::spawn(async move {
        let code = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status.code(),
            Ok(Err(e)) => {
                tracing::warn!(session = %session, error = %e, "error waiting on child");
                None
            }
            Err(_) => {
                tracing::warn!(session = %session, "session exceeded its timeout, killing");
                let _ = child.start_kill();
                let _ = child.wait().await;
                None
            }
        };
        let ts = clock.epoch_ms();
        *entry.exit.lock() = Some((code, ts));
        if let Some(c) = code {
            *stats.lock().exits_by_code.entry(c).or_insert(0) += 1;
        }
        // Exactly one `exit` event per spawned session (`spec.md` §4.3),
        // even when every subscriber has already gone away — `send`
        // returning an error just means there was no one listening.
        let _ = entry.events.send(TerminalEvent::Exit { session: session.clone(), code, ts_epoch_ms: ts });
        tracing::info!(session = %session, code = ?code, "terminal session exited");
    });
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
