//! Historical log of applied transforms.
//!
//! Append-only JSONL keyed by signature: status, timings, and guardrail
//! flags for every fresh transform. Operators read it to audit what the
//! engine did and why; nothing in the serving path depends on it, so
//! writes are fire-and-forget.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use agentic_design_core::now_utc;

/// Outcome classification for one transform run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformStatus {
    Applied,
    AdvisoryOnly,
    Degraded,
}

/// One journal line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformLogEntry {
    pub signature: String,
    pub status: TransformStatus,
    pub duration_ms: u64,
    pub applied_count: usize,
    pub advisory_count: usize,
    pub rejected_count: usize,
    /// Guardrails that fired during the run (`contrast-regression`,
    /// `change-cap`, `reparse-failed`).
    pub guardrail_flags: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

impl TransformLogEntry {
    #[must_use]
    pub fn new(signature: impl Into<String>, status: TransformStatus, duration_ms: u64) -> Self {
        Self {
            signature: signature.into(),
            status,
            duration_ms,
            applied_count: 0,
            advisory_count: 0,
            rejected_count: 0,
            guardrail_flags: Vec::new(),
            recorded_at: now_utc(),
        }
    }
}

/// Append-only transform history journal.
#[derive(Debug, Clone)]
pub struct TransformHistory {
    path: PathBuf,
}

impl TransformHistory {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one entry; failures are logged and dropped.
    pub fn record(&self, entry: &TransformLogEntry) {
        if let Err(e) = self.append(entry) {
            debug!(error = %e, path = %self.path.display(), "transform history append dropped");
        }
    }

    fn append(&self, entry: &TransformLogEntry) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let line = serde_json::to_string(entry)?;
        writeln!(file, "{line}")
    }

    /// The most recent `limit` entries, oldest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<TransformLogEntry> {
        let Ok(contents) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        let mut entries: Vec<TransformLogEntry> = contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        if entries.len() > limit {
            entries.drain(..entries.len() - limit);
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_round_trip_through_the_journal() {
        let dir = tempfile::tempdir().unwrap();
        let history = TransformHistory::new(dir.path().join("transforms.jsonl"));
        for (i, status) in [
            TransformStatus::Applied,
            TransformStatus::AdvisoryOnly,
            TransformStatus::Degraded,
        ]
        .into_iter()
        .enumerate()
        {
            let mut entry = TransformLogEntry::new(format!("sig-{i}"), status, 12);
            entry.applied_count = i;
            entry.guardrail_flags.push("change-cap".to_string());
            history.record(&entry);
        }
        let recent = history.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].signature, "sig-1");
        assert_eq!(recent[1].status, TransformStatus::Degraded);
    }

    #[test]
    fn missing_journal_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = TransformHistory::new(dir.path().join("none.jsonl"));
        assert!(history.recent(10).is_empty());
    }
}
