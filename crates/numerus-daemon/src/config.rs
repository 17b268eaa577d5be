// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Centralized environment variable access and daemon-wide configuration
//! (`spec.md` §6 "Environment").

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve the runs directory: `RUNS_DIR` > `./runs` (`spec.md` §6).
pub fn runs_dir() -> PathBuf {
    std::env::var("RUNS_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./runs"))
}

/// Resolve the WAL path: `STORE_PATH` > `./store/tasks.db` (`spec.md` §6).
pub fn store_path() -> PathBuf {
    std::env::var("STORE_PATH").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./store/tasks.db"))
}

/// The agent binary to spawn for every claim/execute invocation.
pub fn agent_bin() -> Result<String, LifecycleError> {
    std::env::var("AGENT_BIN").map_err(|_| LifecycleError::NoAgentBin)
}

/// `MAX_PARALLEL_TASKS`: `None` is unbounded.
pub fn max_parallel_tasks() -> Option<usize> {
    std::env::var("MAX_PARALLEL_TASKS").ok().and_then(|s| s.parse::<usize>().ok())
}

fn timeout_env(name: &str) -> Option<Duration> {
    std::env::var(name).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_secs)
}

/// `TASK_TIMEOUT_SECONDS`: the default execute-phase budget (`spec.md` §6).
/// Generalized into one override per phase below; this one doubles as the
/// fallback `execute` timeout when `EXECUTE_TIMEOUT_SECONDS` is unset.
pub fn task_timeout() -> Duration {
    timeout_env("TASK_TIMEOUT_SECONDS").unwrap_or(Duration::from_secs(600))
}

pub fn plan_timeout() -> Duration {
    timeout_env("PLAN_TIMEOUT_SECONDS").unwrap_or(Duration::from_secs(120))
}

pub fn claim_timeout() -> Duration {
    timeout_env("CLAIM_TIMEOUT_SECONDS").unwrap_or(Duration::from_secs(60))
}

pub fn execute_timeout() -> Duration {
    timeout_env("EXECUTE_TIMEOUT_SECONDS").unwrap_or_else(task_timeout)
}

/// Retry limit for any single task (`spec.md` §4.1, default 2).
pub fn retry_limit() -> u32 {
    std::env::var("RETRY_LIMIT").ok().and_then(|s| s.parse::<u32>().ok()).unwrap_or(2)
}

/// Cancellation grace period before `SIGKILL` (`spec.md` §5, default 10s).
pub fn cancel_grace() -> Duration {
    timeout_env("CANCEL_GRACE_SECONDS").unwrap_or(Duration::from_secs(10))
}

/// Root state directory for the daemon's own bookkeeping (socket, PID,
/// logs) — distinct from `RUNS_DIR`, which is per-job artifact storage.
/// `NUMERUS_STATE_DIR` > `XDG_STATE_HOME/numerus` > `~/.local/state/numerus`.
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("NUMERUS_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("numerus"));
    }
    let home = dirs::home_dir().ok_or(LifecycleError::NoStateDir)?;
    Ok(home.join(".local/state/numerus"))
}

/// Per-connection read timeout, so a stalled CLI client can't pin a
/// listener task forever.
pub fn ipc_timeout() -> Duration {
    std::env::var("IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Daemon-wide configuration, resolved once at startup (`spec.md` §6).
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub log_path: PathBuf,
    pub runs_dir: PathBuf,
    pub store_path: PathBuf,
    pub agent_bin: String,
    pub max_parallel_tasks: Option<usize>,
    pub plan_timeout: Duration,
    pub claim_timeout: Duration,
    pub execute_timeout: Duration,
    pub retry_limit: u32,
    pub cancel_grace: Duration,
    pub ipc_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = state_dir()?;
        Ok(Self {
            socket_path: state_dir.join("daemon.sock"),
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
            runs_dir: runs_dir(),
            store_path: store_path(),
            agent_bin: agent_bin()?,
            max_parallel_tasks: max_parallel_tasks(),
            plan_timeout: plan_timeout(),
            claim_timeout: claim_timeout(),
            execute_timeout: execute_timeout(),
            retry_limit: retry_limit(),
            cancel_grace: cancel_grace(),
            ipc_timeout: ipc_timeout(),
            state_dir,
        })
    }
}
