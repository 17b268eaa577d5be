// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

use numerus_plan::{ClaimParseError, PlanParseError};
use numerus_terminal::TerminalError;
use thiserror::Error;

/// Errors arising from one agent invocation (`spec.md` §7: `SpawnError`,
/// `Timeout`, `NonZeroExit`, `ClaimParseError`, `PlanParseError`).
#[derive(Debug, Error, Clone)]
pub enum AgentError {
    #[error(transparent)]
    Terminal(#[from] TerminalError),

    #[error("agent produced no JSON object on stdout")]
    NoJsonObject,

    #[error(transparent)]
    PlanParse(#[from] PlanParseError),

    #[error(transparent)]
    ClaimParse(#[from] ClaimParseError),

    #[error("agent timed out during {phase} phase")]
    Timeout { phase: &'static str },

    #[error("agent exited {code} during {phase} phase")]
    NonZeroExit { phase: &'static str, code: i32 },
}

impl AgentError {
    /// Project onto the cross-cutting taxonomy (`spec.md` §7). Claim-parse
    /// failures carry a task id in [`numerus_core::NumerusError`] that this
    /// type doesn't itself track, so the caller supplies it.
    pub fn into_numerus_error(self, task_id: &numerus_core::TaskId) -> numerus_core::NumerusError {
        match self {
            AgentError::Terminal(t) => numerus_core::NumerusError::Spawn(t.to_string()),
            AgentError::NoJsonObject => numerus_core::NumerusError::Spawn("no JSON object on stdout".into()),
            AgentError::PlanParse(p) => numerus_core::NumerusError::PlanParse(p.to_string()),
            AgentError::ClaimParse(c) => {
                numerus_core::NumerusError::ClaimParse { task_id: task_id.clone(), message: c.to_string() }
            }
            AgentError::Timeout { phase } => numerus_core::NumerusError::AgentTimeout { phase },
            AgentError::NonZeroExit { code, .. } => numerus_core::NumerusError::AgentNonZeroExit { code },
        }
    }
}
