// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! `numerus`: the thin wire-level CLI client (`spec.md` §6 CLI surface).
//!
//! No interactive prompts, colorized tables, or `--follow` streaming
//! formatting — this prints the raw `numerus_wire::Response` debug form and
//! maps it to an exit code. A richer front-end is out of scope here.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use numerus_core::{JobId, TaskId};
use numerus_wire::{read_json, write_json, Request, Response};
use tokio::net::UnixStream;

/// A command that failed before or after reaching the daemon, carrying the
/// process exit code `main` should use.
struct ExitError {
    code: i32,
    message: String,
}

impl ExitError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl std::fmt::Display for ExitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Exit codes (`spec.md` §6 CLI surface): 0 success, 1 usage/connection
/// error, 2 the job or task ended failed, 3 cancelled, 4 everything else
/// the daemon reports as `Response::Error`.
mod exit_code {
    pub const USAGE: i32 = 1;
    pub const FAILED: i32 = 2;
    pub const CANCELLED: i32 = 3;
    pub const INTERNAL: i32 = 4;
}

#[derive(Parser)]
#[command(name = "numerus", about = "Submit and inspect orchestration jobs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon is out of scope for this binary; `start` here
    /// submits a job exactly as `run` does (kept as a separate alias since
    /// `spec.md` §6 names both).
    Start { objective: String },
    /// Decompose `objective` into a plan and start executing it.
    Run { objective: String },
    /// Show one job, or every known job when no id is given.
    Status { job_id: Option<String> },
    /// Print a task's captured stdout.
    Logs {
        job_id: String,
        task_id: String,
        #[arg(long)]
        follow: bool,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// Cancel a task's owning job.
    Kill { job_id: String, task_id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("numerus: {}", e.message);
            std::process::exit(e.code);
        }
    }
}

async fn run(cli: Cli) -> Result<(), ExitError> {
    let request = build_request(cli.command)?;
    let response = send(request).await?;
    print_response(&response)
}

fn build_request(command: Commands) -> Result<Request, ExitError> {
    match command {
        Commands::Start { objective } | Commands::Run { objective } => {
            if objective.trim().is_empty() {
                return Err(ExitError::new(exit_code::USAGE, "objective must not be empty"));
            }
            Ok(Request::Submit { objective })
        }
        Commands::Status { job_id } => Ok(Request::Status { job_id: job_id.map(JobId::from_string) }),
        Commands::Logs { job_id, task_id, follow, offset } => {
            Ok(Request::Logs { job_id: JobId::from_string(job_id), task_id: TaskId::new(task_id), follow, offset })
        }
        Commands::Kill { job_id, task_id } => Ok(Request::Kill { job_id: JobId::from_string(job_id), task_id: TaskId::new(task_id) }),
    }
}

async fn send(request: Request) -> Result<Response, ExitError> {
    let socket_path = socket_path()?;
    let mut stream = UnixStream::connect(&socket_path)
        .await
        .map_err(|e| ExitError::new(exit_code::USAGE, format!("could not connect to daemon at {}: {e}", socket_path.display())))?;
    write_json(&mut stream, &request).await.map_err(|e| ExitError::new(exit_code::INTERNAL, e.to_string()))?;
    read_json(&mut stream).await.map_err(|e| ExitError::new(exit_code::INTERNAL, e.to_string()))
}

fn socket_path() -> Result<PathBuf, ExitError> {
    let state_dir = numerus_daemon::config::state_dir()
        .map_err(|e| ExitError::new(exit_code::INTERNAL, format!("could not resolve daemon state directory: {e}")))?;
    Ok(state_dir.join("daemon.sock"))
}

fn print_response(response: &Response) -> Result<(), ExitError> {
    println!("{response:?}");
    match response {
        Response::Error { message } => Err(ExitError::new(exit_code::INTERNAL, message.clone())),
        Response::Job { job: Some(job) } if job.status == numerus_core::JobStatus::Failed => {
            Err(ExitError::new(exit_code::FAILED, "job failed"))
        }
        Response::Job { job: Some(job) } if job.status == numerus_core::JobStatus::Cancelled => {
            Err(ExitError::new(exit_code::CANCELLED, "job cancelled"))
        }
        _ => Ok(()),
    }
}
