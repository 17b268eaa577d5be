// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! numerus-plan: the Plan Parser (C6, `spec.md` §4.4).

pub mod dag;
pub mod error;
pub mod extract;
pub mod plan;
pub mod wire;

pub use error::{ClaimParseError, PlanParseError};
pub use extract::extract_json_object;
pub use plan::{parse_claim_doc, parse_plan, parse_roles, Plan};
pub use wire::{ClaimDoc, PlanDoc, RoleAssignmentDoc, TaskDoc};
