// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Daemon startup, crash recovery, and shutdown (`spec.md` §4.5, §6).

use std::fs::File;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use numerus_agent::{PhaseTimeouts, TerminalAgent};
use numerus_arbiter::Arbiter;
use numerus_bus::Bus;
use numerus_core::event::kind;
use numerus_core::{JobStatus, SystemClock, TaskState};
use numerus_runner::JobRunner;
use numerus_store::{Journal, MemoryEntry, MemoryLog, Store, StoreError, StoreHandle};
use numerus_terminal::TerminalManager;
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{info, warn};

use crate::config::Config;

pub type Runner = JobRunner<TerminalAgent, SystemClock>;

/// Lifecycle errors (`spec.md` §7 error taxonomy, daemon boundary).
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,

    #[error("AGENT_BIN is not set")]
    NoAgentBin,

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(std::path::PathBuf, std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the listener and shutdown path need, handed back by
/// [`startup`]. The Unix socket is bound last inside `startup` (after every
/// other fallible step has succeeded) and returned here ready to `accept`.
pub struct DaemonState {
    pub config: Config,
    /// Held only to keep the exclusive file lock alive; released on drop.
    #[allow(dead_code)]
    lock_file: File,
    pub store: StoreHandle,
    pub bus: Arc<Bus>,
    pub runner: Runner,
    pub memory: Arc<MemoryLog>,
    pub start_time: Instant,
}

impl DaemonState {
    /// Remove the on-disk artifacts a clean shutdown is responsible for.
    /// The WAL itself needs no explicit flush: every `Store` mutation
    /// already fsyncs before returning, so there is nothing buffered here
    /// the way there would be under an async checkpointer.
    pub fn shutdown(&self) {
        info!("shutting down daemon");
        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!(error = %e, "failed to remove socket file");
            }
        }
        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!(error = %e, "failed to remove lock file");
            }
        }
        info!("daemon shutdown complete");
    }
}

pub struct StartupResult {
    pub daemon: DaemonState,
    pub listener: UnixListener,
}

/// Start the daemon: acquire the single-instance lock, open the Store
/// (replaying its WAL), reconcile jobs left non-terminal by a prior crash,
/// wire the Bus/Arbiter/Terminal Manager/Journal, and bind the Unix socket.
///
/// Mirrors the teacher's `lifecycle::startup` shape: the lock is acquired
/// before anything is truncated, and the socket is bound last so a
/// half-initialized daemon never appears reachable.
pub async fn startup(config: Config) -> Result<StartupResult, LifecycleError> {
    match startup_inner(&config).await {
        Ok(result) => Ok(result),
        Err(e) => {
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(&config);
            }
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    // Open (don't truncate) before locking: truncating first would wipe a
    // running daemon's PID if the lock attempt below fails.
    let lock_file = std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    if let Some(parent) = config.store_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.runs_dir)?;

    let store: StoreHandle = Arc::new(Store::open(&config.store_path, config.runs_dir.clone())?);
    reconcile_non_terminal_jobs(&store)?;

    let bus = Arc::new(Bus::new());
    let journal = Arc::new(Journal::new(config.runs_dir.clone()));
    journal.spawn_mirror(&bus);

    let memory = Arc::new(MemoryLog::new(config.state_dir.join("memory.db")));
    spawn_memory_mirror(memory.clone(), &bus);

    let arbiter = Arc::new(Arbiter::new());
    let terminal = TerminalManager::new();
    let timeouts = PhaseTimeouts { plan: config.plan_timeout, claim: config.claim_timeout, execute: config.execute_timeout };
    let agent = Arc::new(TerminalAgent::new(terminal, config.agent_bin.clone(), std::env::vars().collect(), timeouts, bus.clone(), config.runs_dir.clone()));

    let runner = JobRunner::new(store.clone(), bus.clone(), arbiter, agent, SystemClock, config.cancel_grace, config.max_parallel_tasks);

    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener =
        UnixListener::bind(&config.socket_path).map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    info!(runs_dir = %config.runs_dir.display(), "daemon started");

    Ok(StartupResult {
        daemon: DaemonState { config: config.clone(), lock_file, store, bus, runner, memory, start_time: Instant::now() },
        listener,
    })
}

/// A crash or kill leaves the Store's WAL accurate up to the last fsynced
/// mutation but the Job Runner's in-memory driver loop gone — there is no
/// way to resume a `tokio::task` that no longer exists. Every job left in a
/// non-terminal status is therefore failed outright on the next startup,
/// and any task still `executing` (its locks GC'd by `Store::open` already)
/// is marked `failed` so the job's task table has no dangling in-flight
/// entries (`spec.md` §4.5 crash recovery).
pub fn reconcile_non_terminal_jobs(store: &StoreHandle) -> Result<(), StoreError> {
    let orphaned = store.non_terminal_jobs();
    if orphaned.is_empty() {
        return Ok(());
    }
    warn!(count = orphaned.len(), "failing jobs left non-terminal by a prior daemon exit");
    for job in orphaned {
        for task in job.tasks.values() {
            if !task.state.is_terminal() {
                store.transition_task(
                    job.id,
                    task.id.clone(),
                    TaskState::Failed,
                    task.attempt,
                    None,
                    None,
                    Some("orphaned by daemon restart".to_string()),
                )?;
            }
        }
        store.set_job_status(job.id, JobStatus::Failed)?;
    }
    Ok(())
}

/// Mirror completed/failed task events into `memory.db` (`spec.md` §9 Open
/// Question, resolved in `DESIGN.md`): a best-effort audit trail the Store
/// itself never reads back.
fn spawn_memory_mirror(memory: Arc<MemoryLog>, bus: &Bus) {
    let (_handle, mut rx) = bus.subscribe("job.*");
    tokio::spawn(async move {
        let _handle = _handle;
        while let Some(event) = rx.recv().await {
            if event.event != kind::TASK_COMPLETED && event.event != kind::TASK_FAILED {
                continue;
            }
            let Some(task_id) = event.task_id.clone() else { continue };
            let attempt = event.payload.get("attempt").and_then(|v| v.as_u64()).unwrap_or(1) as u32;
            let entry = MemoryEntry {
                job_id: event.job_id,
                task_id,
                event: event.event.clone(),
                attempt,
                ts_epoch_ms: event.ts_epoch_ms,
                diff_summary: None,
            };
            if let Err(e) = memory.record(entry) {
                warn!(error = %e, "memory.db write failed");
            }
        }
    });
}

fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}
