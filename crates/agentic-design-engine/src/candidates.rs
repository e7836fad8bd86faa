//! Candidate edits and confidence calibration.
//!
//! Stage collectors produce [`Candidate`]s; the engine turns them into
//! applied/advisory/rejected [`agentic_design_core::Edit`]s after running
//! the boosters and guardrails.

use agentic_design_core::color::Rgba;
use agentic_design_core::{Edit, EditKind};

use crate::policy::RulePolicy;

/// Contrast measured against the candidate's rule block, before and after
/// the edit. Only present for color edits with a known counterpart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContrastCheck {
    pub pre: f64,
    pub post: f64,
}

/// One proposed rewrite, before policy evaluation.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub kind: EditKind,
    pub rule_id: &'static str,
    /// Byte span in the current stage's text snapshot. Insert-only
    /// advisories (state variants) use an empty span.
    pub start: usize,
    pub end: usize,
    /// `selector { property }` for logs.
    pub anchor: String,
    pub before: String,
    pub after: String,
    pub base_confidence: f64,
    /// Surrounding rule carries `!important` or lives in `@keyframes`.
    pub layout_sensitive: bool,
    /// Resolution tied between several tokens.
    pub ambiguous: bool,
    /// Project overrides prefer the chosen token.
    pub preferred: bool,
    /// fg/bg contrast measured over the affected rule block.
    pub contrast: Option<ContrastCheck>,
    /// Resolved color the reference stands for (color edits only).
    pub resolved_color: Option<Rgba>,
    /// Backed by visual-analysis evidence (smart-router adjustment);
    /// eligible for auto-apply outside the safe class list.
    pub guided: bool,
}

impl Candidate {
    /// Calibrated confidence: base plus boosters, saturating into [0, 1].
    ///
    /// `consistent` is computed by the engine across the whole stage
    /// (same raw value, same resolution, seen more than once).
    #[must_use]
    pub fn confidence(&self, policy: &RulePolicy, consistent: bool) -> f64 {
        let mut c = self.base_confidence;
        if consistent {
            c += policy.consistency_bonus;
        }
        if let Some(check) = self.contrast {
            if check.post >= check.pre {
                c += policy.contrast_bonus;
            }
        }
        if self.layout_sensitive {
            c -= policy.layout_safety_penalty;
        }
        if self.ambiguous {
            c -= policy.ambiguity_penalty;
        }
        if self.preferred {
            c += policy.override_bonus;
        }
        c.clamp(0.0, 1.0)
    }

    /// Materialize into an [`Edit`] with the final confidence.
    #[must_use]
    pub fn into_edit(self, confidence: f64) -> Edit {
        Edit {
            rule_id: self.rule_id.to_string(),
            kind: self.kind,
            start: self.start,
            end: self.end,
            anchor: self.anchor,
            before: self.before,
            after: self.after,
            confidence,
        }
    }
}

/// Anchor string in the `selector { property }` form used across logs.
#[must_use]
pub fn anchor(selector: &str, property: &str) -> String {
    format!("{selector} {{ {property} }}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> Candidate {
        Candidate {
            kind: EditKind::SpacingToken,
            rule_id: "spacing-token",
            start: 0,
            end: 4,
            anchor: anchor(".card", "padding"),
            before: "16px".into(),
            after: "var(--spacing-md)".into(),
            base_confidence: 0.92,
            layout_sensitive: false,
            ambiguous: false,
            preferred: false,
            contrast: None,
            resolved_color: None,
            guided: false,
        }
    }

    #[test]
    fn boosters_are_additive_and_saturate() {
        let policy = RulePolicy::default();
        let mut c = candidate();
        assert!((c.confidence(&policy, false) - 0.92).abs() < 1e-9);
        assert!((c.confidence(&policy, true) - 0.97).abs() < 1e-9);
        c.preferred = true;
        c.contrast = Some(ContrastCheck { pre: 4.0, post: 4.6 });
        assert!((c.confidence(&policy, true) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn penalties_subtract() {
        let policy = RulePolicy::default();
        let mut c = candidate();
        c.layout_sensitive = true;
        assert!((c.confidence(&policy, false) - 0.82).abs() < 1e-9);
        c.ambiguous = true;
        assert!((c.confidence(&policy, false) - 0.62).abs() < 1e-9);
    }

    #[test]
    fn contrast_regression_earns_no_bonus() {
        let policy = RulePolicy::default();
        let mut c = candidate();
        c.contrast = Some(ContrastCheck { pre: 7.0, post: 3.0 });
        assert!((c.confidence(&policy, false) - 0.92).abs() < 1e-9);
    }
}
