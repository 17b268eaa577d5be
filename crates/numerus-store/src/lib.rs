// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! numerus-store: the Store (C1) and Event Journal (C3), `spec.md` §4.5, §4.6.
//!
//! `store/tasks.db` is a WAL of [`state::StoreOp`] entries replayed into a
//! [`state::MaterializedState`] table on startup (`spec.md` §4.5 "relational
//! store", resolved as an event-sourced WAL — see `DESIGN.md`). [`Store`]
//! is the transactional facade the Job Runner drives: every method that
//! mutates state appends exactly one WAL entry and fsyncs before
//! returning, so a crash can never leave the in-memory table ahead of the
//! durable log. [`journal::Journal`] separately mirrors orchestration and
//! terminal events to the per-job NDJSON files `spec.md` §6 names.
//! [`memory::MemoryLog`] is the optional, count-bounded `memory.db`
//! historical audit mirror (`spec.md` §9 Open Question, resolved in
//! `DESIGN.md`).

pub mod error;
pub mod journal;
pub mod memory;
pub mod state;
pub mod store;
pub mod wal;

pub use error::StoreError;
pub use journal::Journal;
pub use memory::{MemoryEntry, MemoryLog};
pub use state::{MaterializedState, StoreOp};
pub use store::{Store, StoreHandle};
pub use wal::{Wal, WalEntry};
