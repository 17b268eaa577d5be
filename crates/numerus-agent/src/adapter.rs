// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! The boundary between the Job Runner and the external agent binary
//! (`spec.md` §6 "Agent binary contract"). Generalizes the teacher's agent
//! adapter boundary to the four-mode protocol this system uses.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::Signal;
use numerus_core::{event::kind, Clock, Event, JobId, Role, SystemClock, Task, TaskId};
use numerus_bus::Bus;
use numerus_plan::{ClaimDoc, Plan};
use numerus_terminal::{SessionId, SpawnSpec, TerminalEvent, TerminalManager};
use parking_lot::Mutex;
use serde_json::json;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::contract::{claim_stdin, execute_stdin, plan_stdin, roles_stdin};
use crate::error::AgentError;

/// Outcome of an execute-mode invocation.
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    pub exit_code: i32,
    /// Concatenated stdout, truncated for use as a diff/outcome summary
    /// (`Task::last_diff_summary`, `spec.md` §3).
    pub stdout_tail: String,
}

/// The per-phase timeout budget an adapter enforces (`spec.md` §6
/// `TASK_TIMEOUT_SECONDS`, generalized to one budget per mode).
#[derive(Debug, Clone, Copy)]
pub struct PhaseTimeouts {
    pub plan: Duration,
    pub claim: Duration,
    pub execute: Duration,
}

impl Default for PhaseTimeouts {
    fn default() -> Self {
        Self { plan: Duration::from_secs(120), claim: Duration::from_secs(60), execute: Duration::from_secs(600) }
    }
}

/// The four-mode contract a Job Runner drives against one task at a time.
///
/// Every call is tagged with `job_id` so an adapter that shells out to a
/// real process (see [`TerminalAgent`]) can publish `terminal.*` events and
/// mirror stdout under that job's run directory (`spec.md` §6 on-disk
/// layout); a scripted test adapter is free to ignore it.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    async fn plan(&self, job_id: &JobId, objective: &str, cwd: &Path) -> Result<Plan, AgentError>;

    /// The second planning-phase invocation (`spec.md` §4.1 "Planning and
    /// role assignment"): annotate every task in `tasks` with a `Role`.
    async fn assign_roles(
        &self,
        job_id: &JobId,
        tasks: &[Task],
        cwd: &Path,
    ) -> Result<HashMap<TaskId, Role>, AgentError>;

    async fn claim(&self, job_id: &JobId, task: &Task, cwd: &Path) -> Result<ClaimDoc, AgentError>;
    async fn execute(
        &self,
        job_id: &JobId,
        task: &Task,
        claim: &ClaimDoc,
        cwd: &Path,
    ) -> Result<ExecuteOutcome, AgentError>;

    /// Signal a task's in-flight execution (`spec.md` §4.1 cancellation:
    /// SIGTERM, then — if the task has not exited after a grace period —
    /// SIGKILL). Adapters with no live process to signal (e.g. a scripted
    /// test adapter) accept the default no-op.
    async fn cancel(&self, _task_id: &TaskId, _force: bool) -> Result<(), AgentError> {
        Ok(())
    }
}

const MAX_STDOUT_TAIL: usize = 8192;

/// Real adapter: spawns the configured agent binary per invocation via
/// [`TerminalManager`], injects the mode header on stdin, and extracts the
/// JSON object produced on stdout.
pub struct TerminalAgent {
    terminal: TerminalManager,
    agent_bin: String,
    env: HashMap<String, String>,
    timeouts: PhaseTimeouts,
    /// The execute-mode session currently running for each task, so
    /// `cancel` has something to signal. Cleared once `execute` returns.
    active_executions: Mutex<HashMap<TaskId, SessionId>>,
    /// Shared so `terminal.*` events reach the same subscribers the Job
    /// Runner publishes `job.*` events on (`spec.md` §4.6).
    bus: Arc<Bus>,
    /// Root of the `runs/<job_id>/<task_id>/` tree (`spec.md` §6 on-disk
    /// layout).
    runs_dir: PathBuf,
    clock: SystemClock,
}

impl TerminalAgent {
    pub fn new(
        terminal: TerminalManager,
        agent_bin: impl Into<String>,
        env: HashMap<String, String>,
        timeouts: PhaseTimeouts,
        bus: Arc<Bus>,
        runs_dir: PathBuf,
    ) -> Self {
        Self {
            terminal,
            agent_bin: agent_bin.into(),
            env,
            timeouts,
            active_executions: Mutex::new(HashMap::new()),
            bus,
            runs_dir,
            clock: SystemClock,
        }
    }

    /// Spawn, feed `stdin_text`, and collect stdout until exit. Returns the
    /// exit code as reported by the child; `None` means the phase timed out
    /// and the child was killed (`spec.md` §4.3 `spawn(... timeout)`).
    ///
    /// `track` records the session under `task_id` in `active_executions`
    /// for the duration of the call, so a concurrent `cancel` has a session
    /// to signal (`spec.md` §4.1 cancellation) — used only by `execute`,
    /// the one phase long enough to be worth cancelling mid-flight. The same
    /// `task_id` also scopes the `runs/<job_id>/<task_id>/stdout.log`
    /// mirror; plan and role-assignment calls pass `None` since they are
    /// job-level, not task-level.
    async fn run(
        &self,
        job_id: &JobId,
        stdin_text: String,
        cwd: &Path,
        timeout: Duration,
        track: Option<&TaskId>,
    ) -> Result<(String, Option<i32>), AgentError> {
        let spec = SpawnSpec {
            argv: vec![self.agent_bin.clone()],
            cwd: cwd.to_path_buf(),
            env: self.env.clone(),
            stdin_text: Some(stdin_text),
            timeout,
        };
        let session = self.terminal.spawn(spec).await?;
        if let Some(task_id) = track {
            self.active_executions.lock().insert(task_id.clone(), session.clone());
        }
        let mut stdout_log = self.open_stdout_log(job_id, track).await;
        let mut stream = self.terminal.subscribe(&session)?;
        let mut stdout = String::new();
        let code = loop {
            match stream.recv().await {
                Some(TerminalEvent::Stdout { chunk, .. }) => {
                    self.publish(job_id, track, kind::TERMINAL_STDOUT, json!({"chunk": chunk}));
                    if let Some(file) = stdout_log.as_mut() {
                        let _ = file.write_all(chunk.as_bytes()).await;
                        let _ = file.write_all(b"\n").await;
                    }
                    stdout.push_str(&chunk);
                    stdout.push('\n');
                }
                Some(TerminalEvent::Stderr { chunk, .. }) => {
                    self.publish(job_id, track, kind::TERMINAL_STDERR, json!({"chunk": chunk}));
                }
                Some(TerminalEvent::Started { pid, .. }) => {
                    self.publish(job_id, track, kind::TERMINAL_STARTED, json!({"pid": pid}));
                }
                Some(TerminalEvent::Error { kind: error_kind, .. }) => {
                    self.publish(job_id, track, kind::TERMINAL_ERROR, json!({"kind": error_kind.to_string()}));
                }
                Some(TerminalEvent::Exit { code, .. }) => {
                    self.publish(job_id, track, kind::TERMINAL_EXIT, json!({"code": code}));
                    break code;
                }
                None => break None,
            }
        };
        if let Some(task_id) = track {
            self.active_executions.lock().remove(task_id);
        }
        Ok((stdout, code))
    }

    /// `run`, but a missing exit code (child timed out) or non-zero exit is
    /// a protocol failure rather than a reportable outcome — used by the
    /// plan and claim phases, where the agent is expected to succeed.
    async fn run_expecting_success(
        &self,
        job_id: &JobId,
        stdin_text: String,
        cwd: &Path,
        timeout: Duration,
        phase: &'static str,
    ) -> Result<String, AgentError> {
        let (stdout, code) = self.run(job_id, stdin_text, cwd, timeout, None).await?;
        match code {
            Some(0) => Ok(stdout),
            Some(c) => Err(AgentError::NonZeroExit { phase, code: c }),
            None => Err(AgentError::Timeout { phase }),
        }
    }

    fn publish(&self, job_id: &JobId, task_id: Option<&TaskId>, event: &str, payload: serde_json::Value) {
        self.bus.publish(Event::new(self.clock.epoch_ms(), event, *job_id, task_id.cloned(), payload));
    }

    /// `runs/<job_id>/<task_id>/stdout.log`, created on first write. Only
    /// task-scoped calls (claim, execute) get a log file; plan and
    /// role-assignment are job-level and have no `stdout.log` home.
    async fn open_stdout_log(&self, job_id: &JobId, task_id: Option<&TaskId>) -> Option<fs::File> {
        let task_id = task_id?;
        let dir = self.runs_dir.join(job_id.to_string()).join(task_id.as_str());
        if let Err(e) = fs::create_dir_all(&dir).await {
            tracing::warn!(job = %job_id, task = %task_id, error = %e, "failed to create run directory");
            return None;
        }
        match fs::OpenOptions::new().create(true).append(true).open(dir.join("stdout.log")).await {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!(job = %job_id, task = %task_id, error = %e, "failed to open stdout.log");
                None
            }
        }
    }
}

#[async_trait]
impl AgentAdapter for TerminalAgent {
    async fn plan(&self, job_id: &JobId, objective: &str, cwd: &Path) -> Result<Plan, AgentError> {
        let stdout = self.run_expecting_success(job_id, plan_stdin(objective), cwd, self.timeouts.plan, "plan").await?;
        let json = numerus_plan::extract_json_object(&stdout).ok_or(AgentError::NoJsonObject)?;
        Ok(numerus_plan::parse_plan(json)?)
    }

    async fn assign_roles(
        &self,
        job_id: &JobId,
        tasks: &[Task],
        cwd: &Path,
    ) -> Result<HashMap<TaskId, Role>, AgentError> {
        let summaries: Vec<(String, String)> = tasks.iter().map(|t| (t.id.to_string(), t.summary.clone())).collect();
        let stdout = self
            .run_expecting_success(job_id, roles_stdin(&summaries), cwd, self.timeouts.plan, "assign_roles")
            .await?;
        let json = numerus_plan::extract_json_object(&stdout).ok_or(AgentError::NoJsonObject)?;
        Ok(numerus_plan::parse_roles(json)?)
    }

    async fn claim(&self, job_id: &JobId, task: &Task, cwd: &Path) -> Result<ClaimDoc, AgentError> {
        let stdin = claim_stdin(task.id.as_str(), &task.summary, &task.description);
        let stdout = self.run_expecting_success(job_id, stdin, cwd, self.timeouts.claim, "claim").await?;
        let json = numerus_plan::extract_json_object(&stdout).ok_or(AgentError::NoJsonObject)?;
        Ok(numerus_plan::parse_claim_doc(json, &task.id)?)
    }

    async fn execute(&self, job_id: &JobId, task: &Task, claim: &ClaimDoc, cwd: &Path) -> Result<ExecuteOutcome, AgentError> {
        let claim_json = serde_json::to_string(claim).unwrap_or_default();
        let stdin = execute_stdin(task.id.as_str(), &task.description, &claim_json);
        // A non-zero exit here is the agent's own reported outcome
        // (`spec.md` §6), not a protocol failure; only a timeout (no exit
        // code at all) is an `AgentError`.
        let (stdout, code) = self.run(job_id, stdin, cwd, self.timeouts.execute, Some(&task.id)).await?;
        match code {
            Some(exit_code) => Ok(ExecuteOutcome { exit_code, stdout_tail: tail(&stdout, MAX_STDOUT_TAIL) }),
            None => Err(AgentError::Timeout { phase: "execute" }),
        }
    }

    async fn cancel(&self, task_id: &TaskId, force: bool) -> Result<(), AgentError> {
        let session = self.active_executions.lock().get(task_id).cloned();
        match session {
            Some(session) => {
                let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
                self.terminal.kill(&session, signal)?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn tail(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s[s.len() - max..].to_string()
    }
}
