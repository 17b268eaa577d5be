// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

use thiserror::Error;

/// `ProtocolError` (`spec.md` §7): framing or encoding failures on the
/// daemon/CLI socket.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json encode/decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message length {len} exceeds the {max} byte limit")]
    MessageTooLarge { len: usize, max: usize },
}
