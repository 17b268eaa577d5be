// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! The Unix socket accept loop: dispatches `numerus_wire::Request` to the
//! Store/Job Runner and writes back a `numerus_wire::Response`
//! (`spec.md` §6 CLI surface).

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;

use numerus_core::JobId;
use numerus_wire::{read_json, write_json, Request, Response};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::lifecycle::Runner;
use numerus_store::StoreHandle;

/// Shared daemon context every connection handler reads from.
pub struct ListenCtx {
    pub store: StoreHandle,
    pub runner: Runner,
    pub runs_dir: PathBuf,
    pub ipc_timeout: std::time::Duration,
}

#[derive(Debug, Error)]
enum ConnectionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] numerus_wire::ProtocolError),

    #[error("request timed out")]
    Timeout,
}

/// Accept connections until the process is killed. Every connection is
/// handled on its own spawned task so one slow CLI client cannot stall
/// another (`spec.md` §6).
pub async fn run(listener: UnixListener, ctx: Arc<ListenCtx>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, &ctx).await {
                        log_connection_error(e);
                    }
                });
            }
            Err(e) => error!(error = %e, "unix accept error"),
        }
    }
}

fn log_connection_error(e: ConnectionError) {
    match e {
        ConnectionError::Timeout => warn!("connection timed out waiting for a request"),
        ConnectionError::Protocol(numerus_wire::ProtocolError::Io(_)) => debug!("client disconnected"),
        ConnectionError::Protocol(e) => warn!(error = %e, "protocol error"),
    }
}

async fn handle_connection(mut stream: UnixStream, ctx: &ListenCtx) -> Result<(), ConnectionError> {
    let request: Request = timeout(ctx.ipc_timeout, read_json(&mut stream)).await.map_err(|_| ConnectionError::Timeout)??;
    let response = dispatch(request, ctx).await;
    write_json(&mut stream, &response).await?;
    Ok(())
}

async fn dispatch(request: Request, ctx: &ListenCtx) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Submit { objective } => {
            let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            let handle = ctx.runner.submit(objective, working_dir, ctx_retry_limit(ctx));
            Response::JobStarted { job_id: handle.job_id }
        }

        Request::Status { job_id: Some(job_id) } => Response::Job { job: ctx.store.job(&job_id).map(Box::new) },

        Request::Status { job_id: None } => Response::Jobs { jobs: ctx.store.jobs() },

        Request::Logs { job_id, task_id, offset, .. } => match read_log_chunk(&ctx.runs_dir, &job_id, &task_id, offset).await {
            Ok((content, offset)) => Response::LogChunk { content, offset },
            Err(e) => Response::Error { message: e.to_string() },
        },

        Request::Kill { job_id, .. } => {
            ctx.runner.cancel(&job_id);
            Response::Cancelling { job_id }
        }
    }
}

/// `JobRunner::submit` takes the retry limit per call rather than baking it
/// into construction; the daemon applies one process-wide default read at
/// startup, so every `Request::Submit` gets the same limit.
fn ctx_retry_limit(_ctx: &ListenCtx) -> u32 {
    crate::config::retry_limit()
}

/// Read `runs/<job_id>/<task_id>/stdout.log` starting at `offset`, returning
/// the new bytes and the offset to resume from next (`spec.md` §6 on-disk
/// layout; the CLI's `--follow` is a polling loop over this, per
/// `SPEC_FULL.md` §6's CLI clarification).
async fn read_log_chunk(runs_dir: &std::path::Path, job_id: &JobId, task_id: &numerus_core::TaskId, offset: u64) -> std::io::Result<(String, u64)> {
    let path = runs_dir.join(job_id.as_str()).join(task_id.as_str()).join("stdout.log");
    let mut file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((String::new(), offset)),
        Err(e) => return Err(e),
    };
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).await?;
    let new_offset = offset + buf.len() as u64;
    Ok((String::from_utf8_lossy(&buf).into_owned(), new_offset))
}
