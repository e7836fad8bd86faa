//! Auto-apply policy: floors, boosters, caps, and versions.
//!
//! Every threshold the engine consults lives in this one value object.
//! The policy is injected into the engine and its fingerprint participates
//! in the cache signature, so a policy change can never serve a stale
//! transform.

use serde::Serialize;

/// Engine implementation version. Bumping it invalidates every cache
/// entry en masse (the signature changes) without explicit eviction.
pub const ENGINE_VERSION: &str = "2.3.0";

/// Rule-set version: bumped when stage semantics or the utility mapping
/// table change in a way that alters output.
pub const RULESET_VERSION: &str = "ruleset-9";

/// Optimization intensity, only applied when explicitly requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// Whitespace compaction and comment removal.
    Basic,
    /// Basic, plus duplicate-declaration merge and four-side shorthand
    /// collapsing.
    Aggressive,
}

/// Thresholds and booster weights for edit application.
#[derive(Debug, Clone, Serialize)]
pub struct RulePolicy {
    /// Confidence floor for auto-applied edits.
    pub auto_apply_floor: f64,
    /// Confidence floor for advisory suggestions; below this they are
    /// suppressed entirely.
    pub advisory_floor: f64,
    /// Change cap per fragment (`N_max`).
    pub max_auto_edits: usize,

    // Boosters (additive, saturating into [0, 1]).
    /// Same raw value resolves the same way elsewhere in the fragment.
    pub consistency_bonus: f64,
    /// Post-edit AA contrast is at least the pre-edit contrast.
    pub contrast_bonus: f64,
    /// Surrounding rule carries `!important` or lives in `@keyframes`.
    pub layout_safety_penalty: f64,
    /// Two or more candidate tokens tied inside tolerance.
    pub ambiguity_penalty: f64,
    /// Project overrides explicitly prefer the candidate token.
    pub override_bonus: f64,
}

impl Default for RulePolicy {
    fn default() -> Self {
        Self {
            auto_apply_floor: 0.90,
            advisory_floor: 0.80,
            max_auto_edits: 5,
            consistency_bonus: 0.05,
            contrast_bonus: 0.05,
            layout_safety_penalty: 0.10,
            ambiguity_penalty: 0.20,
            override_bonus: 0.05,
        }
    }
}

impl RulePolicy {
    /// Policy with a caller-supplied change cap.
    #[must_use]
    pub fn with_max_auto_edits(max_auto_edits: usize) -> Self {
        Self {
            max_auto_edits,
            ..Self::default()
        }
    }

    /// Stable fingerprint folded into the cache signature. Any threshold
    /// change forces a cache miss.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        format!(
            "{RULESET_VERSION}:{:.2}:{:.2}:{}:{:.2}:{:.2}:{:.2}:{:.2}:{:.2}",
            self.auto_apply_floor,
            self.advisory_floor,
            self.max_auto_edits,
            self.consistency_bonus,
            self.contrast_bonus,
            self.layout_safety_penalty,
            self.ambiguity_penalty,
            self.override_bonus,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_floors_match_policy_table() {
        let policy = RulePolicy::default();
        assert!((policy.auto_apply_floor - 0.90).abs() < f64::EPSILON);
        assert!((policy.advisory_floor - 0.80).abs() < f64::EPSILON);
        assert_eq!(policy.max_auto_edits, 5);
    }

    #[test]
    fn fingerprint_tracks_threshold_changes() {
        let a = RulePolicy::default();
        let mut b = RulePolicy::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.max_auto_edits = 3;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
