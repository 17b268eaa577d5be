// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Terminal event stream (`spec.md` §4.3).

use crate::session::SessionId;

/// Reason a terminal-level `error` event was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The subscriber fell behind and the manager dropped the oldest
    /// buffered chunks to keep publishing (`spec.md` §4.3 "Backpressure").
    Overflow,
    /// The child process could not be spawned at all.
    Spawn,
}

numerus_core::simple_display! {
    ErrorKind {
        Overflow => "overflow",
        Spawn => "spawn",
    }
}

/// One event in a session's stream (`spec.md` §4.3 public contract).
#[derive(Debug, Clone)]
pub enum TerminalEvent {
    Started { session: SessionId, pid: u32, ts_epoch_ms: u64 },
    Stdout { session: SessionId, chunk: String, ts_epoch_ms: u64 },
    Stderr { session: SessionId, chunk: String, ts_epoch_ms: u64 },
    Exit { session: SessionId, code: Option<i32>, ts_epoch_ms: u64 },
    Error { session: SessionId, kind: ErrorKind, ts_epoch_ms: u64 },
}

impl TerminalEvent {
    pub fn session(&self) -> &SessionId {
        match self {
            TerminalEvent::Started { session, .. }
            | TerminalEvent::Stdout { session, .. }
            | TerminalEvent::Stderr { session, .. }
            | TerminalEvent::Exit { session, .. }
            | TerminalEvent::Error { session, .. } => session,
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, TerminalEvent::Exit { .. })
    }
}
