// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! The write-ahead log backing `store/tasks.db` (`spec.md` §4.6 "relational
//! store", resolved as an event-sourced WAL — see `DESIGN.md`).
//!
//! One NDJSON line per entry: `{"seq": N, "event": {...}}`. `open` scans
//! the file for the longest valid prefix; any trailing corruption is
//! rotated out to `.bak`/`.bak.2`/`.bak.3` (oldest evicted) and the file is
//! rewritten with just the entries that parsed.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

use numerus_core::{Clock, SystemClock};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::StoreError;

/// Flush if this many entries have been appended since the last flush...
const FLUSH_COUNT_THRESHOLD: usize = 100;
/// ...or this much time has passed, whichever comes first.
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

const MAX_BAK_FILES: u32 = 3;

/// One WAL record: a monotonic sequence number plus the event it carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry<T> {
    pub seq: u64,
    pub event: T,
}

/// Borrowing twin of [`WalEntry`] so `append` doesn't need `T: Clone`.
#[derive(Serialize)]
struct WalEntryRef<'a, T> {
    seq: u64,
    event: &'a T,
}

/// Pick the next `.bak`/`.bak.N` path, rotating older backups out. Keeps up
/// to [`MAX_BAK_FILES`] backups; the oldest is deleted when the limit is
/// reached.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| if n == 1 { path.with_extension("bak") } else { path.with_extension(format!("bak.{n}")) };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }
    bak(1)
}

/// Result of scanning a WAL file for its longest valid prefix.
struct Scan<T> {
    /// Byte length of the valid prefix.
    valid_len: u64,
    /// Total file length.
    total_len: u64,
    /// Highest `seq` among the valid entries (0 if none).
    last_seq: u64,
    /// Byte offset immediately after the entry with the given seq, for
    /// every valid entry seen, in order. Used to seed the read cursor.
    entry_ends: Vec<(u64, u64)>,
    _marker: PhantomData<T>,
}

fn scan<T: DeserializeOwned>(path: &Path) -> std::io::Result<Scan<T>> {
    let mut file = File::open(path)?;
    let total_len = file.metadata()?.len();
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let mut offset: u64 = 0;
    let mut last_seq = 0u64;
    let mut entry_ends = Vec::new();
    for line in split_lines(&bytes) {
        let line_end = offset + line.len() as u64 + 1; // +1 for the newline
        match std::str::from_utf8(line).ok().and_then(|s| serde_json::from_str::<WalEntry<T>>(s).ok()) {
            Some(entry) if entry.seq == last_seq + 1 => {
                last_seq = entry.seq;
                entry_ends.push((entry.seq, line_end));
                offset = line_end;
            }
            _ => break,
        }
    }

    Ok(Scan { valid_len: offset, total_len, last_seq, entry_ends, _marker: PhantomData })
}

/// Split `bytes` into `\n`-terminated lines, dropping the trailing
/// terminator. A final unterminated fragment is not yielded (it can't yet
/// be told apart from a write in progress).
fn split_lines(bytes: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'\n' {
            lines.push(&bytes[start..i]);
            start = i + 1;
        }
    }
    lines
}

/// A write-ahead log of `T` events, identified by a monotonic `seq`.
///
/// Generic over [`Clock`] so `needs_flush`'s interval component can be
/// driven deterministically in tests.
pub struct Wal<T, C: Clock = SystemClock> {
    path: PathBuf,
    writer: File,
    clock: C,
    write_seq: u64,
    processed_seq: u64,
    /// Byte offset `next_unprocessed` resumes reading from.
    read_offset: u64,
    pending_since_flush: usize,
    last_flush: std::time::Instant,
    _marker: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> Wal<T, SystemClock> {
    pub fn open(path: &Path, processed_seq: u64) -> Result<Self, StoreError> {
        Self::open_with_clock(path, processed_seq, SystemClock)
    }
}

impl<T: Serialize + DeserializeOwned, C: Clock> Wal<T, C> {
    pub fn open_with_clock(path: &Path, processed_seq: u64, clock: C) -> Result<Self, StoreError> {
        if !path.exists() {
            File::create(path)?;
        }

        let scan: Scan<T> = scan(path)?;
        if scan.valid_len < scan.total_len {
            tracing::warn!(path = %path.display(), valid = scan.valid_len, total = scan.total_len, "wal corruption detected, rotating to backup");
            let bak = rotate_bak_path(path);
            fs::rename(path, &bak)?;

            let mut corrupt = File::open(&bak)?;
            let mut prefix = vec![0u8; scan.valid_len as usize];
            corrupt.read_exact(&mut prefix)?;
            let mut clean = File::create(path)?;
            clean.write_all(&prefix)?;
            clean.sync_all()?;
        }

        let read_offset = scan
            .entry_ends
            .iter()
            .filter(|(seq, _)| *seq <= processed_seq)
            .map(|(_, end)| *end)
            .last()
            .unwrap_or(0);

        let writer = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            clock,
            write_seq: scan.last_seq,
            processed_seq,
            read_offset,
            pending_since_flush: 0,
            last_flush: std::time::Instant::now(),
            _marker: PhantomData,
        })
    }

    /// Append one event, returning its assigned sequence number. Visible
    /// to subsequent reads immediately; durable only after [`Self::flush`].
    pub fn append(&mut self, event: &T) -> Result<u64, StoreError> {
        self.write_seq += 1;
        let entry = WalEntryRef { seq: self.write_seq, event };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.pending_since_flush += 1;
        Ok(self.write_seq)
    }

    /// Fsync the WAL file.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.writer.flush()?;
        self.writer.sync_data()?;
        self.pending_since_flush = 0;
        self.last_flush = std::time::Instant::now();
        Ok(())
    }

    /// Whether enough has accumulated (by count or by time) to warrant a flush.
    pub fn needs_flush(&self) -> bool {
        self.pending_since_flush >= FLUSH_COUNT_THRESHOLD || self.last_flush.elapsed() >= FLUSH_INTERVAL
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    pub fn mark_processed(&mut self, seq: u64) {
        self.processed_seq = seq;
    }

    /// Read and consume the next entry past the read cursor. Returns
    /// `Ok(None)` both at end-of-file and when the next line is corrupt —
    /// in the corrupt case the cursor still advances past it, so a later
    /// call reaches whatever valid entry follows.
    pub fn next_unprocessed(&mut self) -> Result<Option<WalEntry<T>>, StoreError> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.read_offset))?;
        let mut reader = BufReader::new(file);
        let mut raw = Vec::new();
        let n = reader.read_until(b'\n', &mut raw)?;
        if n == 0 {
            return Ok(None);
        }
        if raw.last() != Some(&b'\n') {
            // Partial write in progress; nothing to consume yet.
            return Ok(None);
        }
        self.read_offset += raw.len() as u64;
        let line = &raw[..raw.len() - 1];
        match std::str::from_utf8(line).ok().and_then(|s| serde_json::from_str::<WalEntry<T>>(s).ok()) {
            Some(entry) => Ok(Some(entry)),
            None => Ok(None),
        }
    }

    /// Every entry with `seq > after`, read fresh from disk. Stops (without
    /// erroring) at the first line that fails to parse.
    pub fn entries_after(&self, after: u64) -> Result<Vec<WalEntry<T>>, StoreError> {
        let bytes = fs::read(&self.path)?;
        let mut out = Vec::new();
        for line in split_lines(&bytes) {
            match std::str::from_utf8(line).ok().and_then(|s| serde_json::from_str::<WalEntry<T>>(s).ok()) {
                Some(entry) => {
                    if entry.seq > after {
                        out.push(entry);
                    }
                }
                None => break,
            }
        }
        Ok(out)
    }

    /// Rewrite the file keeping only entries with `seq >= keep_from`.
    pub fn truncate_before(&mut self, keep_from: u64) -> Result<(), StoreError> {
        let kept = self.entries_after(keep_from.saturating_sub(1))?;
        let mut buf = Vec::new();
        for entry in &kept {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }
        let mut file = File::create(&self.path)?;
        file.write_all(&buf)?;
        file.sync_all()?;

        self.writer = OpenOptions::new().append(true).open(&self.path)?;
        self.read_offset = self.read_offset.min(buf.len() as u64);
        Ok(())
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
