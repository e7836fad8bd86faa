//! The pattern store: observation aggregates and advisory suggestions.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use fs2::FileExt as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use agentic_design_core::{global_metrics, now_utc};

/// Blend weight for a single new outcome.
const ALPHA: f64 = 0.2;
/// Confidence decays toward this uninformative midpoint.
const MIDPOINT: f64 = 0.5;

/// Where an observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationSource {
    /// An auto-applied edit from a change log.
    Applied,
    /// Explicit accept/reject feedback from the caller.
    Feedback,
    /// Usage tracking: the suggestion was taken downstream.
    Usage,
}

/// One accept/reject event for a `(project, component, rule, token)` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub project_id: String,
    pub component_type: String,
    pub rule_id: String,
    pub token: String,
    pub accepted: bool,
    pub source: ObservationSource,
    pub observed_at: DateTime<Utc>,
}

/// Aggregated pattern state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub project_id: String,
    pub component_type: String,
    pub rule_id: String,
    pub token: String,
    /// EWMA confidence in `[0, 1]`.
    pub confidence: f64,
    pub sample_count: u64,
    pub half_life_days: f64,
    pub last_updated: DateTime<Utc>,
}

impl Pattern {
    /// Confidence as of `now`, with half-life decay toward the midpoint.
    /// Does not mutate stored state.
    #[must_use]
    pub fn effective_confidence(&self, now: DateTime<Utc>) -> f64 {
        let elapsed_days =
            now.signed_duration_since(self.last_updated).num_seconds().max(0) as f64 / 86_400.0;
        let w = 0.5_f64.powf(elapsed_days / self.half_life_days.max(0.01));
        MIDPOINT + (self.confidence - MIDPOINT) * w
    }

    /// Auto-apply eligibility floor: confident and well-sampled. The rule
    /// class safety check stays with the caller.
    #[must_use]
    pub fn eligible_for_auto_apply(&self, now: DateTime<Utc>, min_samples: u64) -> bool {
        self.effective_confidence(now) >= 0.9 && self.sample_count >= min_samples
    }
}

/// A suggestion surfaced for a fragment's rule candidates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternSuggestion {
    pub rule_id: String,
    pub token: String,
    pub confidence: f64,
    pub eligible_auto: bool,
}

/// Store tuning.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub half_life_days: f64,
    pub min_samples_for_auto: u64,
    /// Suggestions below this are suppressed.
    pub suggestion_floor: f64,
    /// Append-only JSONL journal; `None` keeps the store in memory only.
    pub journal_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            half_life_days: 30.0,
            min_samples_for_auto: 10,
            suggestion_floor: 0.8,
            journal_path: None,
        }
    }
}

/// Per-project pattern aggregates with JSONL persistence.
pub struct PatternStore {
    config: StoreConfig,
    patterns: Mutex<HashMap<String, Pattern>>,
}

fn key_of(project_id: &str, component_type: &str, rule_id: &str, token: &str) -> String {
    format!("{project_id}\u{1f}{component_type}\u{1f}{rule_id}\u{1f}{token}")
}

impl PatternStore {
    /// Open the store, replaying the journal when one is configured.
    #[must_use]
    pub fn open(config: StoreConfig) -> Self {
        let store = Self {
            config,
            patterns: Mutex::new(HashMap::new()),
        };
        if let Some(path) = store.config.journal_path.clone() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => {
                    let mut replayed = 0usize;
                    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                        match serde_json::from_str::<Observation>(line) {
                            Ok(observation) => {
                                store.fold(&observation);
                                replayed += 1;
                            }
                            Err(e) => debug!(error = %e, "skipping undecodable journal line"),
                        }
                    }
                    debug!(replayed, path = %path.display(), "pattern journal replayed");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "pattern journal unreadable"),
            }
        }
        store
    }

    /// Record one observation: fold into the aggregate and append to the
    /// journal (best-effort, one retry).
    pub fn observe(&self, observation: &Observation) {
        global_metrics().pattern_observations.inc();
        self.fold(observation);
        if self.config.journal_path.is_some() {
            for attempt in 0..2 {
                match self.append_journal(observation) {
                    Ok(()) => break,
                    Err(e) if attempt == 0 => {
                        debug!(error = %e, "pattern journal append failed, retrying once");
                    }
                    Err(e) => warn!(error = %e, "pattern journal append dropped"),
                }
            }
        }
    }

    /// Usage tracking: a surfaced suggestion was adopted downstream.
    pub fn record_usage(&self, project_id: &str, component_type: &str, rule_id: &str, token: &str) {
        self.observe(&Observation {
            project_id: project_id.to_string(),
            component_type: component_type.to_string(),
            rule_id: rule_id.to_string(),
            token: token.to_string(),
            accepted: true,
            source: ObservationSource::Usage,
            observed_at: now_utc(),
        });
    }

    fn fold(&self, observation: &Observation) {
        let key = key_of(
            &observation.project_id,
            &observation.component_type,
            &observation.rule_id,
            &observation.token,
        );
        let outcome = if observation.accepted { 1.0 } else { 0.0 };
        let mut patterns = self.patterns.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = patterns.entry(key).or_insert_with(|| Pattern {
            project_id: observation.project_id.clone(),
            component_type: observation.component_type.clone(),
            rule_id: observation.rule_id.clone(),
            token: observation.token.clone(),
            confidence: MIDPOINT,
            sample_count: 0,
            half_life_days: self.config.half_life_days,
            last_updated: observation.observed_at,
        });
        // Decay to the observation time, then blend the new outcome in.
        let decayed = entry.effective_confidence(observation.observed_at);
        entry.confidence = (decayed + ALPHA * (outcome - decayed)).clamp(0.0, 1.0);
        entry.sample_count += 1;
        entry.last_updated = observation.observed_at;
    }

    fn append_journal(&self, observation: &Observation) -> std::io::Result<()> {
        let Some(path) = &self.config.journal_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.lock_exclusive()?;
        let line = serde_json::to_string(observation)?;
        let result = writeln!(file, "{line}");
        let _ = fs2::FileExt::unlock(&file);
        result
    }

    /// Pattern for a key, if one exists.
    #[must_use]
    pub fn get(
        &self,
        project_id: &str,
        component_type: &str,
        rule_id: &str,
        token: &str,
    ) -> Option<Pattern> {
        self.patterns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key_of(project_id, component_type, rule_id, token))
            .cloned()
    }

    /// Top-k advisory suggestions for a fragment's rule candidates.
    ///
    /// Suggestions under the floor are suppressed; `eligible_auto` marks
    /// the ≥0.9 + sample-floor patterns (the caller still gates on the
    /// safe rule-class list).
    #[must_use]
    pub fn suggestions(
        &self,
        project_id: &str,
        component_type: &str,
        candidates: &[(String, String)],
        k: usize,
    ) -> Vec<PatternSuggestion> {
        let now = now_utc();
        let patterns = self.patterns.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<PatternSuggestion> = candidates
            .iter()
            .filter_map(|(rule_id, token)| {
                let pattern = patterns.get(&key_of(project_id, component_type, rule_id, token))?;
                let confidence = pattern.effective_confidence(now);
                if confidence < self.config.suggestion_floor {
                    return None;
                }
                Some(PatternSuggestion {
                    rule_id: rule_id.clone(),
                    token: token.clone(),
                    confidence,
                    eligible_auto: pattern
                        .eligible_for_auto_apply(now, self.config.min_samples_for_auto),
                })
            })
            .collect();
        out.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        out.truncate(k);
        global_metrics().pattern_suggestions.add(out.len() as u64);
        out
    }

    #[must_use]
    pub fn pattern_count(&self) -> usize {
        self.patterns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accept(store: &PatternStore, n: usize) {
        for _ in 0..n {
            store.observe(&Observation {
                project_id: "proj".into(),
                component_type: "button".into(),
                rule_id: "spacing-token".into(),
                token: "spacing-md".into(),
                accepted: true,
                source: ObservationSource::Applied,
                observed_at: now_utc(),
            });
        }
    }

    #[test]
    fn repeated_accepts_grow_confidence_toward_one() {
        let store = PatternStore::open(StoreConfig::default());
        accept(&store, 12);
        let pattern = store
            .get("proj", "button", "spacing-token", "spacing-md")
            .unwrap();
        assert!(pattern.confidence > 0.9, "confidence {}", pattern.confidence);
        assert!(pattern.confidence <= 1.0);
        assert_eq!(pattern.sample_count, 12);
        assert!(pattern.eligible_for_auto_apply(now_utc(), 10));
    }

    #[test]
    fn rejects_pull_confidence_down() {
        let store = PatternStore::open(StoreConfig::default());
        accept(&store, 12);
        for _ in 0..12 {
            store.observe(&Observation {
                project_id: "proj".into(),
                component_type: "button".into(),
                rule_id: "spacing-token".into(),
                token: "spacing-md".into(),
                accepted: false,
                source: ObservationSource::Feedback,
                observed_at: now_utc(),
            });
        }
        let pattern = store
            .get("proj", "button", "spacing-token", "spacing-md")
            .unwrap();
        assert!(pattern.confidence < 0.5);
        assert!(!pattern.eligible_for_auto_apply(now_utc(), 10));
    }

    #[test]
    fn confidence_decays_toward_midpoint_with_age() {
        let pattern = Pattern {
            project_id: "p".into(),
            component_type: "c".into(),
            rule_id: "r".into(),
            token: "t".into(),
            confidence: 0.95,
            sample_count: 20,
            half_life_days: 30.0,
            last_updated: now_utc() - chrono::Duration::days(30),
        };
        let effective = pattern.effective_confidence(now_utc());
        // One half-life: halfway back to 0.5.
        assert!((effective - 0.725).abs() < 0.01, "effective {effective}");
        assert!(!pattern.eligible_for_auto_apply(now_utc(), 10));
    }

    #[test]
    fn suggestions_suppress_below_floor_and_rank_by_confidence() {
        let store = PatternStore::open(StoreConfig::default());
        accept(&store, 12);
        // A weaker pattern on another token.
        for accepted in [true, false, true, false] {
            store.observe(&Observation {
                project_id: "proj".into(),
                component_type: "button".into(),
                rule_id: "color-token".into(),
                token: "color-primary".into(),
                accepted,
                source: ObservationSource::Feedback,
                observed_at: now_utc(),
            });
        }
        let candidates = vec![
            ("spacing-token".to_string(), "spacing-md".to_string()),
            ("color-token".to_string(), "color-primary".to_string()),
            ("radius-token".to_string(), "radius-md".to_string()),
        ];
        let suggestions = store.suggestions("proj", "button", &candidates, 10);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].rule_id, "spacing-token");
        assert!(suggestions[0].eligible_auto);
    }

    #[test]
    fn journal_replay_rebuilds_aggregates() {
        let dir = tempfile::tempdir().unwrap();
        let journal = dir.path().join("patterns.jsonl");
        let config = StoreConfig {
            journal_path: Some(journal.clone()),
            ..StoreConfig::default()
        };
        {
            let store = PatternStore::open(config.clone());
            accept(&store, 5);
            store.record_usage("proj", "button", "spacing-token", "spacing-md");
        }
        let reloaded = PatternStore::open(config);
        let pattern = reloaded
            .get("proj", "button", "spacing-token", "spacing-md")
            .unwrap();
        assert_eq!(pattern.sample_count, 6);
        assert_eq!(reloaded.pattern_count(), 1);
    }
}
