// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! `memory.db`: an optional, count-bounded historical audit mirror
//! (`spec.md` §9 Open Question, resolved in `DESIGN.md` as "count-bounded,
//! default 500 entries per job, append-only, non-authoritative").
//!
//! Entries are completed/failed task outcomes, kept around after the Store
//! has already moved a job to a terminal state, for an operator to grep
//! through later. Never consulted by the Job Runner or Resource Arbiter —
//! losing `memory.db` changes nothing about in-flight orchestration.

use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use numerus_core::{JobId, TaskId};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Default retention per job (`spec.md` §9 Open Question resolution).
pub const DEFAULT_RETENTION_PER_JOB: usize = 500;

/// Compact only once this many entries have accumulated for a job beyond
/// its retention bound, so a busy job isn't rewriting `memory.db` on every
/// single append.
const COMPACT_SLACK: usize = 50;

/// One historical record of a completed or failed task attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub event: String,
    pub attempt: u32,
    pub ts_epoch_ms: u64,
    pub diff_summary: Option<String>,
}

/// The count-bounded, append-only audit mirror.
pub struct MemoryLog {
    path: PathBuf,
    retention_per_job: usize,
}

impl MemoryLog {
    pub fn new(path: PathBuf) -> Self {
        Self::with_retention(path, DEFAULT_RETENTION_PER_JOB)
    }

    pub fn with_retention(path: PathBuf, retention_per_job: usize) -> Self {
        Self { path, retention_per_job }
    }

    /// Append one entry, then compact if its job has drifted far enough
    /// past the retention bound to be worth rewriting the file for.
    pub fn record(&self, entry: MemoryEntry) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        file.write_all(&line)?;

        let count = self.read_all()?.iter().filter(|e| e.job_id == entry.job_id).count();
        if count > self.retention_per_job + COMPACT_SLACK {
            self.compact()?;
        }
        Ok(())
    }

    pub fn entries_for_job(&self, job_id: &JobId) -> Result<Vec<MemoryEntry>, StoreError> {
        Ok(self.read_all()?.into_iter().filter(|e| &e.job_id == job_id).collect())
    }

    fn read_all(&self) -> Result<Vec<MemoryEntry>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        let mut out = Vec::new();
        for line in contents.lines() {
            if line.is_empty() {
                continue;
            }
            out.push(serde_json::from_str(line)?);
        }
        Ok(out)
    }

    /// Rewrite the file keeping, per job, only the most recent
    /// `retention_per_job` entries (oldest-first order preserved).
    fn compact(&self) -> Result<(), StoreError> {
        let all = self.read_all()?;
        let mut by_job: std::collections::HashMap<JobId, Vec<MemoryEntry>> = std::collections::HashMap::new();
        for entry in all {
            by_job.entry(entry.job_id).or_default().push(entry);
        }
        for entries in by_job.values_mut() {
            if entries.len() > self.retention_per_job {
                let drop = entries.len() - self.retention_per_job;
                entries.drain(0..drop);
            }
        }
        let mut kept: Vec<MemoryEntry> = by_job.into_values().flatten().collect();
        kept.sort_by_key(|e| e.ts_epoch_ms);

        write_all(&self.path, &kept)
    }
}

fn write_all(path: &Path, entries: &[MemoryEntry]) -> Result<(), StoreError> {
    let mut buf = Vec::new();
    for entry in entries {
        serde_json::to_writer(&mut buf, entry)?;
        buf.push(b'\n');
    }
    let mut file = File::create(path)?;
    file.write_all(&buf)?;
    file.sync_all()?;
    Ok(())
}
