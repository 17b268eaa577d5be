// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

use std::io::Write as _;

use serde::{Deserialize, Serialize};
use tempfile::tempdir;

use super::*;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
enum TestEvent {
    Tick(String),
    Shutdown,
}

fn tick(cmd: &str) -> TestEvent {
    TestEvent::Tick(cmd.to_string())
}

fn open(path: &std::path::Path, processed_seq: u64) -> Wal<TestEvent> {
    Wal::open(path, processed_seq).expect("open")
}

#[test]
fn open_creates_file() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("test.wal");
    let wal = open(&path, 0);
    assert!(path.exists());
    assert_eq!(wal.write_seq(), 0);
    assert_eq!(wal.processed_seq(), 0);
}

#[test]
fn append_and_flush() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("test.wal");
    let mut wal = open(&path, 0);

    assert_eq!(wal.append(&tick("cmd1")).expect("append"), 1);
    assert_eq!(wal.append(&tick("cmd2")).expect("append"), 2);
    wal.flush().expect("flush");

    let metadata = std::fs::metadata(&path).expect("metadata");
    assert!(metadata.len() > 0);
}

#[test]
fn next_unprocessed_walks_entries_in_order() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("test.wal");
    let mut wal = open(&path, 0);
    wal.append(&tick("cmd1")).expect("append");
    wal.append(&tick("cmd2")).expect("append");

    let e1 = wal.next_unprocessed().expect("ok").expect("some");
    assert_eq!(e1.seq, 1);
    assert_eq!(e1.event, tick("cmd1"));

    let e2 = wal.next_unprocessed().expect("ok").expect("some");
    assert_eq!(e2.seq, 2);

    assert!(wal.next_unprocessed().expect("ok").is_none());
}

#[test]
fn mark_processed_updates_the_cursor() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("test.wal");
    let mut wal = open(&path, 0);
    wal.append(&tick("cmd1")).expect("append");
    wal.flush().expect("flush");

    let entry = wal.next_unprocessed().expect("ok").expect("some");
    wal.mark_processed(entry.seq);
    assert_eq!(wal.processed_seq(), 1);
}

#[test]
fn reopening_with_a_processed_seq_skips_already_processed_entries() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("test.wal");
    {
        let mut wal = open(&path, 0);
        wal.append(&tick("cmd1")).expect("append");
        wal.append(&tick("cmd2")).expect("append");
        wal.append(&tick("cmd3")).expect("append");
        wal.flush().expect("flush");
    }

    let mut wal = open(&path, 2);
    let entry = wal.next_unprocessed().expect("ok").expect("some");
    assert_eq!(entry.seq, 3);
    assert!(wal.next_unprocessed().expect("ok").is_none());
}

#[test]
fn entries_after_returns_everything_past_the_given_seq() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("test.wal");
    let mut wal = open(&path, 0);
    wal.append(&tick("cmd1")).expect("append");
    wal.append(&tick("cmd2")).expect("append");
    wal.append(&tick("cmd3")).expect("append");
    wal.flush().expect("flush");

    let entries = wal.entries_after(1).expect("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 2);
    assert_eq!(entries[1].seq, 3);
}

#[test]
fn truncate_before_drops_earlier_entries() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("test.wal");
    let mut wal = open(&path, 0);
    wal.append(&tick("cmd1")).expect("append");
    wal.append(&tick("cmd2")).expect("append");
    wal.append(&tick("cmd3")).expect("append");
    wal.flush().expect("flush");

    wal.truncate_before(2).expect("truncate");

    let entries = wal.entries_after(0).expect("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 2);
    assert_eq!(entries[1].seq, 3);
}

/// Regression guard: a `Shutdown`-shaped control event persisted in the WAL
/// must still come back on replay so the runner can decide what to do with
/// it, rather than being silently swallowed by the WAL layer itself.
#[test]
fn shutdown_shaped_events_survive_reopen() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("test.wal");
    {
        let mut wal = open(&path, 0);
        wal.append(&tick("cmd1")).expect("append");
        wal.append(&TestEvent::Shutdown).expect("append");
        wal.flush().expect("flush");
    }

    let mut wal = open(&path, 1);
    let entries = wal.entries_after(1).expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].seq, 2);
    assert_eq!(entries[0].event, TestEvent::Shutdown);

    let entry = wal.next_unprocessed().expect("ok").expect("some");
    assert_eq!(entry.seq, 2);
    assert_eq!(entry.event, TestEvent::Shutdown);
    assert!(wal.next_unprocessed().expect("ok").is_none());
}

#[test]
fn needs_flush_trips_once_the_count_threshold_is_crossed() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("test.wal");
    let mut wal = open(&path, 0);
    assert!(!wal.needs_flush());

    for i in 0..50 {
        wal.append(&tick(&format!("cmd{i}"))).expect("append");
    }
    // Not asserting !needs_flush() here: the interval component may have
    // tripped independently of the count.

    for i in 50..101 {
        wal.append(&tick(&format!("cmd{i}"))).expect("append");
    }
    assert!(wal.needs_flush());
}

#[test]
fn open_rotates_a_corrupt_trailing_line_to_bak_and_keeps_valid_entries() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("test.wal");
    {
        let mut wal = open(&path, 0);
        wal.append(&tick("cmd1")).expect("append");
        wal.append(&tick("cmd2")).expect("append");
        wal.flush().expect("flush");
    }
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).expect("open");
        f.write_all(b"not-valid-json\n").expect("write");
    }

    let wal = open(&path, 0);
    assert_eq!(wal.write_seq(), 2);

    let bak = path.with_extension("bak");
    assert!(bak.exists());

    let entries = wal.entries_after(0).expect("entries");
    assert_eq!(entries.len(), 2);
}

#[test]
fn open_rotates_bak_files_keeping_at_most_three() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("test.wal");

    for i in 1..=4u8 {
        std::fs::write(&path, [i; 8]).expect("write corrupt");
        let wal = open(&path, 0);
        assert_eq!(wal.write_seq(), 0);
    }

    let bak1 = path.with_extension("bak");
    assert_eq!(std::fs::read(&bak1).expect("read"), vec![4u8; 8]);
    let bak2 = path.with_extension("bak.2");
    assert_eq!(std::fs::read(&bak2).expect("read"), vec![3u8; 8]);
    let bak3 = path.with_extension("bak.3");
    assert_eq!(std::fs::read(&bak3).expect("read"), vec![2u8; 8]);
    assert!(!path.with_extension("bak.4").exists());
}

#[test]
fn entries_after_stops_at_corruption_introduced_after_open() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("test.wal");
    {
        let mut wal = open(&path, 0);
        wal.append(&tick("cmd1")).expect("append");
        wal.append(&tick("cmd2")).expect("append");
        wal.flush().expect("flush");
    }
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).expect("open");
        f.write_all(b"corrupted-data\n").expect("write");
    }
    let wal = open(&path, 0);
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).expect("open");
        f.write_all(b"post-open-corruption\n").expect("write");
    }

    let entries = wal.entries_after(0).expect("entries");
    assert_eq!(entries.len(), 2);
}

#[test]
fn next_unprocessed_skips_a_corrupt_line_and_resumes_after_it() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("test.wal");
    let mut wal = open(&path, 0);
    wal.append(&tick("cmd1")).expect("append");
    wal.flush().expect("flush");

    let entry = wal.next_unprocessed().expect("ok").expect("some");
    assert_eq!(entry.seq, 1);

    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).expect("open");
        f.write_all(b"corrupt-line\n").expect("write");
    }
    assert!(wal.next_unprocessed().expect("ok").is_none());

    wal.append(&tick("cmd2")).expect("append");
    wal.flush().expect("flush");
    let entry = wal.next_unprocessed().expect("ok").expect("some");
    assert_eq!(entry.seq, 2);
}

#[test]
fn open_with_binary_data_treats_it_as_corrupt() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("test.wal");
    std::fs::write(&path, b"\x80\x81\x82\xff\xfe\n").expect("write binary");

    let wal = open(&path, 0);
    assert_eq!(wal.write_seq(), 0);
    assert!(path.with_extension("bak").exists());
}

#[test]
fn open_with_valid_entries_then_binary_data_preserves_the_valid_ones() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("test.wal");
    {
        let mut wal = open(&path, 0);
        wal.append(&tick("cmd1")).expect("append");
        wal.append(&tick("cmd2")).expect("append");
        wal.flush().expect("flush");
    }
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).expect("open");
        f.write_all(b"\x80\x81\x82\xff\xfe\n").expect("write");
    }

    let wal = open(&path, 0);
    assert_eq!(wal.write_seq(), 2);
    assert!(path.with_extension("bak").exists());
    let entries = wal.entries_after(0).expect("entries");
    assert_eq!(entries.len(), 2);
}
