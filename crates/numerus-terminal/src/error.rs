// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

use thiserror::Error;

/// Leaf error type for the Terminal Manager (`spec.md` §7 `SpawnError`,
/// `SpawnCircuitOpen`).
#[derive(Debug, Error, Clone)]
pub enum TerminalError {
    #[error("failed to spawn agent process: {0}")]
    SpawnFailed(String),

    #[error("spawn circuit breaker open, retry after cooldown")]
    CircuitOpen,

    #[error("unknown session")]
    UnknownSession,

    #[error("failed to write to session stdin: {0}")]
    SendFailed(String),

    #[error("failed to signal session: {0}")]
    SignalFailed(String),
}
