//! Checkpoint/resume: an append-only JSONL log plus a compacted status map.
//!
//! Resume is a pure fold over the log's parseable lines, so a torn final
//! write (crash mid-append) simply never happened. Each mark is flushed to
//! disk before the citation counts as completed — at-least-once semantics;
//! re-validating on resume is safe because deterministic validation is
//! idempotent.
//!
//! A missing checkpoint store is fatal at run start. If a write fails once
//! the run is underway, the tracker degrades to in-memory tracking with a
//! warning instead of aborting the run.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use citecheck_core::Verdict;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint store unavailable: {0}")]
    StoreUnavailable(#[from] std::io::Error),

    #[error("no checkpoint log for run {0}")]
    RunNotFound(String),
}

/// Per-citation progress state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LogRecord {
    Start {
        run_id: String,
        started_at: DateTime<Utc>,
        citations: Vec<String>,
    },
    Mark {
        citation_id: String,
        status: CitationStatus,
        at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        verdict: Option<Verdict>,
    },
}

/// Owns the checkpoint log for one run. Writes are serialized; each
/// citation's status transition is a single atomic append.
#[derive(Debug)]
pub struct ProgressTracker {
    dir: PathBuf,
    run_id: String,
    file: Mutex<Option<File>>,
    state: Mutex<BTreeMap<String, CitationStatus>>,
    verdicts: Mutex<BTreeMap<String, Verdict>>,
    degraded: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ProgressTracker {
    /// Begin a new run over the given citations. Fatal if the store
    /// directory cannot be created or the log cannot be written.
    pub fn start_run(dir: &Path, citation_ids: &[String]) -> Result<Self, CheckpointError> {
        std::fs::create_dir_all(dir)?;
        let started_at = Utc::now();
        let run_id = format!("run-{}", started_at.format("%Y%m%dT%H%M%S%3f"));
        let path = dir.join(format!("{run_id}.jsonl"));
        let mut file = OpenOptions::new().create_new(true).append(true).open(&path)?;

        let header = LogRecord::Start {
            run_id: run_id.clone(),
            started_at,
            citations: citation_ids.to_vec(),
        };
        append_record(&mut file, &header)?;

        let state: BTreeMap<String, CitationStatus> = citation_ids
            .iter()
            .map(|id| (id.clone(), CitationStatus::Pending))
            .collect();

        info!(run_id = %run_id, citations = citation_ids.len(), "run started");
        Ok(Self {
            dir: dir.to_path_buf(),
            run_id,
            file: Mutex::new(Some(file)),
            state: Mutex::new(state),
            verdicts: Mutex::new(BTreeMap::new()),
            degraded: AtomicBool::new(false),
        })
    }

    /// Reopen an interrupted run. State is folded from the log; the last
    /// parseable record per citation wins, and a torn trailing line is
    /// ignored.
    pub fn resume(dir: &Path, run_id: &str) -> Result<Self, CheckpointError> {
        let path = dir.join(format!("{run_id}.jsonl"));
        if !path.exists() {
            return Err(CheckpointError::RunNotFound(run_id.to_string()));
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut state: BTreeMap<String, CitationStatus> = BTreeMap::new();
        let mut verdicts: BTreeMap<String, Verdict> = BTreeMap::new();
        let mut skipped = 0usize;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogRecord>(&line) {
                Ok(LogRecord::Start { citations, .. }) => {
                    for id in citations {
                        state.entry(id).or_insert(CitationStatus::Pending);
                    }
                }
                Ok(LogRecord::Mark {
                    citation_id,
                    status,
                    verdict,
                    ..
                }) => {
                    state.insert(citation_id.clone(), status);
                    match verdict {
                        Some(v) => {
                            verdicts.insert(citation_id, v);
                        }
                        None => {
                            verdicts.remove(&citation_id);
                        }
                    }
                }
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(run_id, skipped, "ignored unparseable checkpoint lines");
        }

        let file = OpenOptions::new().append(true).open(&path)?;
        let pending = state
            .values()
            .filter(|s| **s != CitationStatus::Completed)
            .count();
        info!(run_id, pending, "run resumed");

        Ok(Self {
            dir: dir.to_path_buf(),
            run_id: run_id.to_string(),
            file: Mutex::new(Some(file)),
            state: Mutex::new(state),
            verdicts: Mutex::new(verdicts),
            degraded: AtomicBool::new(false),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Record a citation as completed, carrying its verdict so a resumed
    /// run can reproduce the full verdict set. Durable before return.
    pub fn mark_completed(&self, verdict: &Verdict) {
        self.mark(
            &verdict.citation_id.clone(),
            CitationStatus::Completed,
            Some(verdict.clone()),
        );
    }

    /// Record a status transition. A write failure degrades the tracker to
    /// in-memory state with a warning; it never aborts the run.
    pub fn mark(&self, citation_id: &str, status: CitationStatus, verdict: Option<Verdict>) {
        lock(&self.state).insert(citation_id.to_string(), status);
        if let Some(v) = &verdict {
            lock(&self.verdicts).insert(citation_id.to_string(), v.clone());
        }

        let record = LogRecord::Mark {
            citation_id: citation_id.to_string(),
            status,
            at: Utc::now(),
            verdict,
        };
        let mut guard = lock(&self.file);
        if let Some(file) = guard.as_mut() {
            if let Err(e) = append_record(file, &record) {
                if !self.degraded.swap(true, Ordering::SeqCst) {
                    warn!(error = %e, "checkpoint write failed; continuing in-memory");
                }
                *guard = None;
            }
        }
    }

    /// Citations not yet completed, in id order.
    pub fn pending(&self) -> Vec<String> {
        lock(&self.state)
            .iter()
            .filter(|(_, s)| **s != CitationStatus::Completed)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Verdicts recovered from completed checkpoints.
    pub fn completed_verdicts(&self) -> Vec<Verdict> {
        lock(&self.verdicts).values().cloned().collect()
    }

    /// Whether checkpoint writes have degraded to in-memory only.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Archive the log after successful completion. The file is renamed,
    /// not deleted, keeping an audit trail.
    pub fn finish(&self) -> Result<(), CheckpointError> {
        *lock(&self.file) = None;
        let from = self.dir.join(format!("{}.jsonl", self.run_id));
        let to = self.dir.join(format!("{}.done.jsonl", self.run_id));
        if from.exists() {
            std::fs::rename(&from, &to)?;
            info!(run_id = %self.run_id, "run archived");
        }
        Ok(())
    }
}

fn append_record(file: &mut File, record: &LogRecord) -> std::io::Result<()> {
    let mut line = serde_json::to_string(record).map_err(std::io::Error::other)?;
    line.push('\n');
    file.write_all(line.as_bytes())?;
    // Durable before the citation counts as completed.
    file.sync_data()
}

#[cfg(test)]
mod tests {
    use super::*;
    use citecheck_core::Verdict;

    fn verdict(citation_id: &str, footnote_number: u32) -> Verdict {
        Verdict {
            citation_id: citation_id.into(),
            footnote_number,
            overall_confidence: 100,
            requires_review: false,
            findings: vec![],
            quote_checks: vec![],
            support: None,
        }
    }

    fn ids(n: u32) -> Vec<String> {
        (1..=n).map(|i| format!("fn-{i}")).collect()
    }

    #[test]
    fn start_run_marks_all_pending() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ProgressTracker::start_run(dir.path(), &ids(3)).unwrap();
        assert_eq!(tracker.pending().len(), 3);
        assert!(tracker.completed_verdicts().is_empty());
    }

    #[test]
    fn mark_completed_shrinks_pending() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ProgressTracker::start_run(dir.path(), &ids(3)).unwrap();
        tracker.mark_completed(&verdict("fn-2", 2));
        let pending = tracker.pending();
        assert_eq!(pending, vec!["fn-1".to_string(), "fn-3".to_string()]);
    }

    #[test]
    fn resume_recovers_state_and_verdicts() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = {
            let tracker = ProgressTracker::start_run(dir.path(), &ids(3)).unwrap();
            tracker.mark_completed(&verdict("fn-1", 1));
            tracker.mark("fn-2", CitationStatus::Failed, None);
            tracker.run_id().to_string()
        };

        let resumed = ProgressTracker::resume(dir.path(), &run_id).unwrap();
        assert_eq!(
            resumed.pending(),
            vec!["fn-2".to_string(), "fn-3".to_string()],
            "failed citations are re-validated"
        );
        let verdicts = resumed.completed_verdicts();
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].citation_id, "fn-1");
    }

    #[test]
    fn resume_ignores_torn_trailing_line() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = {
            let tracker = ProgressTracker::start_run(dir.path(), &ids(2)).unwrap();
            tracker.mark_completed(&verdict("fn-1", 1));
            tracker.run_id().to_string()
        };

        // Simulate a crash mid-append.
        let path = dir.path().join(format!("{run_id}.jsonl"));
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"type\":\"mark\",\"citation_id\":\"fn-2\",\"sta")
            .unwrap();
        drop(file);

        let resumed = ProgressTracker::resume(dir.path(), &run_id).unwrap();
        assert_eq!(
            resumed.pending(),
            vec!["fn-2".to_string()],
            "torn write never happened"
        );
    }

    #[test]
    fn resume_unknown_run_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProgressTracker::resume(dir.path(), "run-nope").unwrap_err();
        assert!(matches!(err, CheckpointError::RunNotFound(_)));
    }

    #[test]
    fn last_record_per_citation_wins() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = {
            let tracker = ProgressTracker::start_run(dir.path(), &ids(1)).unwrap();
            tracker.mark("fn-1", CitationStatus::Failed, None);
            tracker.mark_completed(&verdict("fn-1", 1));
            tracker.run_id().to_string()
        };
        let resumed = ProgressTracker::resume(dir.path(), &run_id).unwrap();
        assert!(resumed.pending().is_empty());
    }

    #[test]
    fn finish_archives_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ProgressTracker::start_run(dir.path(), &ids(1)).unwrap();
        tracker.mark_completed(&verdict("fn-1", 1));
        let run_id = tracker.run_id().to_string();
        tracker.finish().unwrap();

        assert!(!dir.path().join(format!("{run_id}.jsonl")).exists());
        assert!(dir.path().join(format!("{run_id}.done.jsonl")).exists());
    }

    #[test]
    fn missing_store_directory_is_fatal_at_start() {
        let err =
            ProgressTracker::start_run(Path::new("/proc/definitely/not/writable"), &ids(1))
                .unwrap_err();
        assert!(matches!(err, CheckpointError::StoreUnavailable(_)));
    }
}
