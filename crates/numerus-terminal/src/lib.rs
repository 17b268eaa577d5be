// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! numerus-terminal: the Terminal Manager (C4, `spec.md` §4.3).
//!
//! Spawns one piped child process per agent invocation, fans its stdout and
//! stderr out line-by-line onto a broadcast stream, and exposes `send`/`kill`
//! against the live child. See `manager::TerminalManager` for the entry
//! point and `DESIGN.md` for why this manages piped processes rather than a
//! real PTY.

pub mod circuit;
pub mod error;
pub mod event;
pub mod manager;
pub mod session;

pub use circuit::CircuitBreaker;
pub use error::TerminalError;
pub use event::{ErrorKind, TerminalEvent};
pub use manager::{EventStream, PoolStats, TerminalManager};
pub use session::{SessionId, SpawnSpec};
