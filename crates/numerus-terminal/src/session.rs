// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Session identity and spawn parameters (`spec.md` §4.3).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

numerus_core::define_id! {
    /// Handle returned by [`crate::manager::TerminalManager::spawn`].
    pub struct SessionId("trm-");
}

/// Parameters for spawning one agent child process (`spec.md` §4.3 `spawn`).
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    /// Text written to the child's stdin immediately after spawn (the
    /// `NUMERUS_PLAN V1` / `NUMERUS_CLAIM V1` / `NUMERUS_EXECUTE V1` header
    /// plus prompt body, per `spec.md` §6).
    pub stdin_text: Option<String>,
    pub timeout: Duration,
}
