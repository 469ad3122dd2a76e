//! Persistent set of already-handled inbound event ids.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::Result;

pub const DEFAULT_CAPACITY: usize = 10_000;

/// Newline-delimited id log plus its in-memory mirror.
///
/// Every new id is appended before `seen_and_mark` returns, so a crash right
/// after marking cannot replay the event. Once the set grows past 1.5× the
/// capacity, both the file and the set are cut back to the newest
/// `capacity` ids (largest numeric id first). Inside a tokio runtime the file
/// rewrite runs on the blocking pool; ids marked while it is in flight are
/// appended as soon as the new file is in place.
pub struct DedupLedger {
    path: PathBuf,
    capacity: usize,
    seen: Mutex<HashSet<String>>,
    journal: Arc<Mutex<Journal>>,
}

#[derive(Default)]
struct Journal {
    compacting: bool,
    backlog: Vec<String>,
}

impl DedupLedger {
    /// Load the ledger at `path`. A missing file is an empty ledger.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let seen = match fs::read_to_string(&path) {
            Ok(raw) => raw
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), ids = seen.len(), "dedup ledger loaded");
        Ok(Self {
            path,
            capacity: capacity.max(1),
            seen: Mutex::new(seen),
            journal: Arc::default(),
        })
    }

    /// Returns `true` if `id` was already recorded, otherwise records it.
    pub fn seen_and_mark(&self, id: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if seen.contains(id) {
            return true;
        }
        seen.insert(id.to_string());

        let mut journal = lock_journal(&self.journal);
        if journal.compacting {
            journal.backlog.push(id.to_string());
        } else if let Err(e) = append_line(&self.path, id) {
            warn!(path = %self.path.display(), id, error = %e, "failed to persist seen id");
        }

        if seen.len() * 2 > self.capacity * 3 && !journal.compacting {
            let before = seen.len();
            let keep = newest(&seen, self.capacity);
            *seen = keep.iter().cloned().collect();
            debug!(path = %self.path.display(), before, after = seen.len(), "dedup ledger compacting");

            journal.compacting = true;
            drop(journal);
            self.rewrite(keep);
        }
        false
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rewrite(&self, keep: Vec<String>) {
        let path = self.path.clone();
        let journal = Arc::clone(&self.journal);
        let job = move || finish_rewrite(&path, &keep, &journal);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(job);
            }
            Err(_) => job(),
        }
    }
}

fn lock_journal(journal: &Mutex<Journal>) -> MutexGuard<'_, Journal> {
    journal.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Replace the log with `keep`, then flush the backlog into whichever file
/// survived. On a failed rewrite the old log stays and the backlog lands there.
fn finish_rewrite(path: &Path, keep: &[String], journal: &Mutex<Journal>) {
    if let Err(e) = write_snapshot(path, keep) {
        warn!(path = %path.display(), error = %e, "dedup ledger compaction failed");
    }
    let mut journal = lock_journal(journal);
    for id in journal.backlog.drain(..) {
        if let Err(e) = append_line(path, &id) {
            warn!(path = %path.display(), id = %id, error = %e, "failed to persist seen id");
        }
    }
    journal.compacting = false;
}

fn append_line(path: &Path, id: &str) -> io::Result<()> {
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(f, "{id}")
}

fn write_snapshot(path: &Path, ids: &[String]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut f = fs::File::create(&tmp)?;
        let mut body = ids.join("\n");
        body.push('\n');
        f.write_all(body.as_bytes())?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)
}

/// The `capacity` most recent ids. Non-numeric ids sort as oldest.
fn newest(seen: &HashSet<String>, capacity: usize) -> Vec<String> {
    let mut ids: Vec<String> = seen.iter().cloned().collect();
    ids.sort_by(|a, b| recency(b).cmp(&recency(a)));
    ids.truncate(capacity);
    ids
}

fn recency(id: &str) -> Option<u128> {
    id.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn second_mark_is_seen() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = DedupLedger::open(dir.path().join("seen.txt"), 100).unwrap();
        assert!(!ledger.seen_and_mark("42"));
        assert!(ledger.seen_and_mark("42"));
        assert!(!ledger.seen_and_mark("43"));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alpha").join("seen.txt");
        {
            let ledger = DedupLedger::open(&path, 100).unwrap();
            assert!(ledger.is_empty());
            assert!(!ledger.seen_and_mark("1001"));
        }
        let ledger = DedupLedger::open(&path, 100).unwrap();
        assert!(ledger.seen_and_mark("1001"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn compaction_keeps_newest_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.txt");
        let ledger = DedupLedger::open(&path, 4).unwrap();
        for id in 1..=6 {
            assert!(!ledger.seen_and_mark(&id.to_string()));
        }
        // 6 is exactly 1.5x, no compaction yet.
        assert_eq!(ledger.len(), 6);

        assert!(!ledger.seen_and_mark("7"));
        assert_eq!(ledger.len(), 4);

        let on_disk = fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk, "7\n6\n5\n4\n");
        assert!(!path.with_extension("tmp").exists());

        // Evicted ids are no longer known.
        assert!(!ledger.seen_and_mark("1"));
        assert!(ledger.seen_and_mark("7"));
    }

    #[tokio::test]
    async fn compaction_in_runtime_keeps_ids_marked_during_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.txt");
        let ledger = DedupLedger::open(&path, 4).unwrap();
        for id in 1..=7 {
            assert!(!ledger.seen_and_mark(&id.to_string()));
        }
        // Rewrite is on the blocking pool; this id may land in the backlog.
        assert!(!ledger.seen_and_mark("8"));

        while lock_journal(&ledger.journal).compacting {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(ledger.len(), 5);

        let reopened = DedupLedger::open(&path, 4).unwrap();
        for id in ["8", "7", "6", "5", "4"] {
            assert!(reopened.seen_and_mark(id), "{id} lost from the log");
        }
        assert!(!reopened.seen_and_mark("1"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn numeric_order_not_lexical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.txt");
        let ledger = DedupLedger::open(&path, 2).unwrap();
        for id in ["9", "100", "abc", "20"] {
            ledger.seen_and_mark(id);
        }
        let on_disk = fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk, "100\n20\n");
    }

    #[test]
    fn concurrent_marks_admit_exactly_one() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(DedupLedger::open(dir.path().join("seen.txt"), 100).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || ledger.seen_and_mark("555"))
            })
            .collect();
        let fresh = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|seen| !seen)
            .count();
        assert_eq!(fresh, 1);
    }

    #[test]
    fn blank_lines_are_ignored_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.txt");
        fs::write(&path, "1\n\n  2  \n").unwrap();
        let ledger = DedupLedger::open(&path, 100).unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.seen_and_mark("2"));
    }
}
