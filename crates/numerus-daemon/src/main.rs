// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! `numerusd`: the daemon binary (`spec.md` §6).

use std::sync::Arc;

use numerus_daemon::config::Config;
use numerus_daemon::lifecycle::{self, StartupResult};
use numerus_daemon::listener::{self, ListenCtx};
use tracing_subscriber::EnvFilter;

fn init_tracing(log_path: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let file = std::fs::OpenOptions::new().create(true).append(true).open(log_path).expect("open daemon log file");
    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    let _guard = init_tracing(&config.log_path);

    let StartupResult { daemon, listener } = lifecycle::startup(config).await?;

    let ctx = Arc::new(ListenCtx {
        store: daemon.store.clone(),
        runner: daemon.runner.clone(),
        runs_dir: daemon.config.runs_dir.clone(),
        ipc_timeout: daemon.config.ipc_timeout,
    });

    let accept = tokio::spawn(listener::run(listener, ctx));

    tokio::signal::ctrl_c().await?;
    accept.abort();
    daemon.shutdown();
    Ok(())
}
