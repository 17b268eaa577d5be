// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

use thiserror::Error;

/// `StoreError` (`spec.md` §7 `Store`): persistence-layer failures. Always
/// job-fatal (`NumerusError::is_job_fatal`) — a WAL write failure means the
/// run is no longer durably recorded.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json encode/decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("wal corruption could not be isolated to a single trailing run")]
    UnrecoverableCorruption,
}
