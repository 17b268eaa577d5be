// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

use numerus_core::{ClaimKey, LockMode, NormalizedPath};

/// One normalized resource request, derived from a claim's `reads`/`writes`
/// after path normalization and write-dominance collapsing
/// (`spec.md` §4.2: "A task that declares both read and write on the same
/// path is treated as write-only").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub path: NormalizedPath,
    pub mode: LockMode,
}

/// A claim ready for arbiter evaluation: identity plus its normalized,
/// deduplicated resource requests.
#[derive(Debug, Clone)]
pub struct PendingClaim {
    pub key: ClaimKey,
    pub requests: Vec<ResourceRequest>,
}

impl PendingClaim {
    /// Build the deduplicated, write-dominant request set for a claim from
    /// its raw normalized read/write path lists.
    pub fn from_paths(key: ClaimKey, reads: Vec<NormalizedPath>, writes: Vec<NormalizedPath>) -> Self {
        use std::collections::HashMap;
        let mut wants_write: HashMap<NormalizedPath, bool> = HashMap::new();
        for path in reads {
            wants_write.entry(path).or_insert(false);
        }
        for path in writes {
            wants_write.insert(path, true);
        }
        let requests = wants_write
            .into_iter()
            .map(|(path, write)| ResourceRequest { path, mode: if write { LockMode::Write } else { LockMode::Read } })
            .collect();
        Self { key, requests }
    }
}
