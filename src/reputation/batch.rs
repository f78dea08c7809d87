// src/reputation/batch.rs
//! Write-coalescing recompute queue.
//!
//! Many screening calls can request a refresh for the same number in a short
//! burst; the queue coalesces them into one pending entry and flushes in
//! bulk — when it reaches `max_pending` entries, or after a debounce delay
//! from the first enqueue. A single-flight guard keeps flushes from
//! overlapping.
//!
//! Pending entries are journaled to a JSON-lines file so a process restart
//! does not silently drop queued recomputes; recompute is idempotent, so
//! replaying the journal is always safe.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::gauge;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct BatchQueueCfg {
    pub max_pending: usize,
    pub debounce: Duration,
}

impl Default for BatchQueueCfg {
    fn default() -> Self {
        Self {
            max_pending: 50,
            debounce: Duration::from_secs(5),
        }
    }
}

/// What the caller should do after an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Queue went empty → non-empty; start the debounce timer.
    FirstPending,
    /// Size cap reached; flush now.
    SizeTriggered,
    /// Coalesced into an existing pending entry (or mid-queue add).
    Coalesced,
}

#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    number: String,
    enqueued_at: DateTime<Utc>,
}

/// JSON-lines write-ahead journal for the pending set. Small (≤ max_pending
/// entries), so every mutation rewrites the file whole.
#[derive(Debug)]
struct RecomputeJournal {
    path: PathBuf,
}

impl RecomputeJournal {
    fn persist(&self, pending: &HashMap<String, DateTime<Utc>>) {
        let mut body = String::new();
        for (number, enqueued_at) in pending {
            let entry = JournalEntry {
                number: number.clone(),
                enqueued_at: *enqueued_at,
            };
            match serde_json::to_string(&entry) {
                Ok(line) => {
                    body.push_str(&line);
                    body.push('\n');
                }
                Err(err) => warn!(target: "reputation", error = ?err, "journal encode failed"),
            }
        }
        let write = fs::File::create(&self.path).and_then(|mut f| f.write_all(body.as_bytes()));
        if let Err(err) = write {
            warn!(target: "reputation", path = %self.path.display(), error = ?err,
                  "journal write failed; queue continues in memory only");
        }
    }

    fn load(&self) -> Vec<(String, DateTime<Utc>)> {
        let Ok(body) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        body.lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str::<JournalEntry>(l).ok())
            .map(|e| (e.number, e.enqueued_at))
            .collect()
    }
}

#[derive(Debug)]
pub struct BatchQueue {
    cfg: BatchQueueCfg,
    pending: Mutex<HashMap<String, DateTime<Utc>>>,
    flushing: AtomicBool,
    journal: Option<RecomputeJournal>,
}

impl BatchQueue {
    pub fn new(cfg: BatchQueueCfg, journal_path: Option<PathBuf>) -> Self {
        Self {
            cfg,
            pending: Mutex::new(HashMap::new()),
            flushing: AtomicBool::new(false),
            journal: journal_path.map(|path| RecomputeJournal { path }),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.cfg.debounce
    }

    pub fn len(&self) -> usize {
        self.pending.lock().expect("batch queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a number to the pending set (coalescing repeats) and report which
    /// flush trigger, if any, the caller should arm.
    pub fn enqueue(&self, number: &str, now: DateTime<Utc>) -> EnqueueOutcome {
        let mut pending = self.pending.lock().expect("batch queue mutex poisoned");
        let was_empty = pending.is_empty();
        pending.entry(number.to_string()).or_insert(now);
        if let Some(journal) = &self.journal {
            journal.persist(&pending);
        }
        gauge!("reputation_queue_pending").set(pending.len() as f64);

        if pending.len() >= self.cfg.max_pending {
            EnqueueOutcome::SizeTriggered
        } else if was_empty {
            EnqueueOutcome::FirstPending
        } else {
            EnqueueOutcome::Coalesced
        }
    }

    /// Claim the single-flight guard and drain the pending set. Returns
    /// `None` when another flush is running or nothing is pending.
    pub fn begin_flush(&self) -> Option<Vec<String>> {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let drained: Vec<String> = {
            let mut pending = self.pending.lock().expect("batch queue mutex poisoned");
            let numbers: Vec<String> = pending.keys().cloned().collect();
            pending.clear();
            if let Some(journal) = &self.journal {
                journal.persist(&pending);
            }
            gauge!("reputation_queue_pending").set(0.0);
            numbers
        };
        if drained.is_empty() {
            self.flushing.store(false, Ordering::Release);
            return None;
        }
        Some(drained)
    }

    /// Release the single-flight guard after a flush completes.
    pub fn end_flush(&self) {
        self.flushing.store(false, Ordering::Release);
    }

    /// Re-seed the pending set from the journal (startup). Returns the
    /// replayed numbers so the caller can arm a flush.
    pub fn replay_journal(&self, now: DateTime<Utc>) -> Vec<String> {
        let Some(journal) = &self.journal else {
            return Vec::new();
        };
        let entries = journal.load();
        if entries.is_empty() {
            return Vec::new();
        }
        let mut pending = self.pending.lock().expect("batch queue mutex poisoned");
        let mut replayed = Vec::with_capacity(entries.len());
        for (number, enqueued_at) in entries {
            // Keep the original enqueue time where it parses, cap at `now`.
            let at = enqueued_at.min(now);
            if pending.insert(number.clone(), at).is_none() {
                replayed.push(number);
            }
        }
        gauge!("reputation_queue_pending").set(pending.len() as f64);
        replayed
    }
}
