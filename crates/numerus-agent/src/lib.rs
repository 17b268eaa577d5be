// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! numerus-agent: the boundary between the Job Runner and the external
//! agent binary (`spec.md` §6 "Agent binary contract").
//!
//! [`adapter::AgentAdapter`] is the trait the runner depends on;
//! [`adapter::TerminalAgent`] is the real implementation that spawns the
//! configured agent binary through `numerus-terminal`. A `test-support`
//! feature gates [`test_support::FakeAgent`], a scripted stand-in used by
//! workspace-level scenario tests so they never need a compiled agent
//! binary on `PATH`.

pub mod adapter;
pub mod contract;
pub mod error;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use adapter::{AgentAdapter, ExecuteOutcome, PhaseTimeouts, TerminalAgent};
pub use error::AgentError;
