//! The transform driver: stage loop, floors, guardrails, change cap, and
//! change-log emission.
//!
//! Stages run in the fixed order of [`Stage::ORDER`]; each stage re-parses
//! the previous stage's output so spans always index the text being
//! edited. After splicing a stage's edits the result is re-parsed and the
//! whole stage batch is rejected if that fails.

use tracing::{debug, warn};

use agentic_design_core::color::AA_NORMAL_TEXT;
use agentic_design_core::{
    AutoApplyMode, ChangeLog, CodeType, Diagnostic, DiagnosticKind, EditKind, Fragment,
    RejectedEdit, TokenSnapshot, global_metrics,
};
use agentic_design_parsers::{ParsedFragment, is_vendor_path, parse_fragment};

use crate::candidates::Candidate;
use crate::optimize::optimize_css;
use crate::policy::{OptimizationLevel, RulePolicy};
use crate::stages::{Stage, VisualGuidance, collect};

/// Per-call options: the auto-apply mode, the optional optimization pass,
/// and the smart-router narrowing hint.
#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    pub auto_apply: AutoApplyMode,
    pub optimization: Option<OptimizationLevel>,
    pub guidance: VisualGuidance,
}

/// Result of one engine run over a fragment.
#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub code: String,
    pub change_log: ChangeLog,
    pub diagnostics: Vec<Diagnostic>,
}

impl TransformOutcome {
    fn untouched(fragment: &Fragment) -> Self {
        Self {
            code: fragment.code.clone(),
            change_log: ChangeLog::default(),
            diagnostics: Vec::new(),
        }
    }
}

/// Deterministic transform engine. Holds the injected policy; all other
/// state is per-call.
#[derive(Debug, Default)]
pub struct TransformEngine {
    policy: RulePolicy,
}

impl TransformEngine {
    #[must_use]
    pub fn new(policy: RulePolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &RulePolicy {
        &self.policy
    }

    /// Run the full stage pipeline over one fragment.
    ///
    /// Never fails: parse errors and guardrail demotions surface as
    /// diagnostics on an outcome that echoes the latest good text.
    #[must_use]
    pub fn transform(
        &self,
        fragment: &Fragment,
        snapshot: &TokenSnapshot,
        options: &TransformOptions,
    ) -> TransformOutcome {
        global_metrics().transforms_run.inc();

        // Vendored sources are parsed but never transformed.
        if let Some(path) = &fragment.file_path {
            if is_vendor_path(path) {
                debug!(path, "vendor path excluded from transform");
                return TransformOutcome::untouched(fragment);
            }
        }

        let parsed = parse_fragment(fragment);
        if parsed.parse_failed() {
            let mut outcome = TransformOutcome::untouched(fragment);
            outcome.diagnostics = parsed.diagnostics;
            return outcome;
        }

        let mut current = fragment.code.clone();
        let mut change_log = ChangeLog::default();
        let mut diagnostics = Vec::new();
        let mut budget = self.policy.max_auto_edits;
        let mut parsed = Some(parsed);

        for stage in Stage::ORDER {
            if !options.guidance.runs_stage(stage) {
                continue;
            }
            let stage_parse = match parsed.take() {
                Some(p) => p,
                None => {
                    let p = parse_fragment(&Fragment {
                        code: current.clone(),
                        ..fragment.clone()
                    });
                    if p.parse_failed() {
                        // A previous stage produced unparseable output and
                        // slipped past the batch check; stop conservatively.
                        warn!(stage = stage.as_str(), "reparse failed between stages");
                        break;
                    }
                    p
                }
            };

            let applied = self.run_stage(
                stage,
                &stage_parse,
                snapshot,
                options,
                &mut current,
                &mut change_log,
                &mut diagnostics,
                &mut budget,
            );
            if !applied {
                // Text unchanged: the parse stays valid for the next stage.
                parsed = Some(stage_parse);
            }
        }

        self.run_optimization(fragment.code_type, options, &mut current, &mut change_log);

        let metrics = global_metrics();
        metrics
            .edits_applied
            .add(change_log.applied.len() as u64);
        metrics
            .edits_advisory
            .add(change_log.advisory.len() as u64);

        TransformOutcome {
            code: current,
            change_log,
            diagnostics,
        }
    }

    /// Collect, calibrate, guard, and apply one stage. Returns whether the
    /// text changed.
    #[allow(clippy::too_many_arguments, clippy::too_many_lines)]
    fn run_stage(
        &self,
        stage: Stage,
        stage_parse: &ParsedFragment,
        snapshot: &TokenSnapshot,
        options: &TransformOptions,
        current: &mut String,
        change_log: &mut ChangeLog,
        diagnostics: &mut Vec<Diagnostic>,
        budget: &mut usize,
    ) -> bool {
        let mut candidates = collect(stage, stage_parse, snapshot, &options.guidance);
        if candidates.is_empty() {
            return false;
        }
        candidates.sort_by_key(|c| c.start);

        // Consistency booster: the same raw value resolving the same way
        // more than once in the fragment.
        let consistent = |candidate: &Candidate| {
            candidates
                .iter()
                .filter(|other| other.before == candidate.before && other.after == candidate.after)
                .count()
                >= 2
        };

        struct Scored {
            candidate: Candidate,
            confidence: f64,
            auto: bool,
        }

        let mut scored: Vec<Scored> = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let confidence = candidate.confidence(&self.policy, consistent(candidate));
            let class_allows = match options.auto_apply {
                AutoApplyMode::Off => false,
                // Guided candidates carry visual evidence and may apply
                // outside the safe class list.
                AutoApplyMode::Safe => candidate.kind.is_safe_class() || candidate.guided,
                // Insert-only advisories have no applicable span even in
                // aggressive mode.
                AutoApplyMode::All => candidate.kind != EditKind::StateVariant,
            };
            let mut auto =
                class_allows && !candidate.ambiguous && confidence >= self.policy.auto_apply_floor;

            // Contrast guardrail: an edit may never push a paired fg/bg
            // below AA when it was better before.
            if let Some(check) = candidate.contrast {
                if check.post < AA_NORMAL_TEXT && check.post < check.pre {
                    if auto {
                        global_metrics().guardrail_demotions.inc();
                    }
                    auto = false;
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::GuardrailViolation,
                            format!(
                                "contrast would regress below AA ({:.2} -> {:.2}) at {}",
                                check.pre, check.post, candidate.anchor
                            ),
                        )
                        .with_stage(stage.as_str()),
                    );
                }
            }
            scored.push(Scored {
                candidate: candidate.clone(),
                confidence,
                auto,
            });
        }

        // Change cap: keep the highest-confidence auto edits within the
        // remaining budget, demote the rest to advisory.
        let auto_count = scored.iter().filter(|s| s.auto).count();
        if auto_count > *budget {
            let mut by_confidence: Vec<usize> = (0..scored.len())
                .filter(|&i| scored[i].auto)
                .collect();
            by_confidence
                .sort_by(|&a, &b| scored[b].confidence.total_cmp(&scored[a].confidence));
            for &index in by_confidence.iter().skip(*budget) {
                scored[index].auto = false;
                global_metrics().guardrail_demotions.inc();
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::GuardrailViolation,
                        format!(
                            "change cap reached ({} max); demoted {}",
                            self.policy.max_auto_edits, scored[index].candidate.anchor
                        ),
                    )
                    .with_stage(stage.as_str()),
                );
            }
        }

        // Splice auto edits (descending start keeps earlier spans valid).
        let mut to_apply: Vec<&Scored> = scored.iter().filter(|s| s.auto).collect();
        let mut applied_text = false;
        if !to_apply.is_empty() {
            to_apply.sort_by(|a, b| b.candidate.start.cmp(&a.candidate.start));
            let mut candidate_text = current.clone();
            for entry in &to_apply {
                candidate_text.replace_range(
                    entry.candidate.start..entry.candidate.end,
                    &entry.candidate.after,
                );
            }
            // Conservative batch check: the rewritten text must re-parse.
            let reparse = parse_fragment(&Fragment {
                code_type: stage_parse.code_type.unwrap_or(CodeType::Css),
                code: candidate_text.clone(),
                file_path: None,
            });
            if reparse.parse_failed() {
                warn!(stage = stage.as_str(), "stage batch rejected: output failed to reparse");
                for entry in to_apply {
                    change_log.rejected.push(RejectedEdit {
                        edit: entry.candidate.clone().into_edit(entry.confidence),
                        reason: "reparse-failed".to_string(),
                    });
                }
                for entry in scored.into_iter().filter(|s| !s.auto) {
                    route_non_applied(&self.policy, entry.candidate, entry.confidence, change_log);
                }
                return false;
            }
            *current = candidate_text;
            *budget = budget.saturating_sub(to_apply.len());
            applied_text = true;
            // Record in source order.
            let mut applied: Vec<&Scored> = scored.iter().filter(|s| s.auto).collect();
            applied.sort_by_key(|s| s.candidate.start);
            for entry in applied {
                change_log
                    .applied
                    .push(entry.candidate.clone().into_edit(entry.confidence));
            }
        }

        for entry in scored.into_iter().filter(|s| !s.auto) {
            route_non_applied(&self.policy, entry.candidate, entry.confidence, change_log);
        }
        applied_text
    }

    /// Optimization runs last, only when requested, and only over whole
    /// CSS fragments (markup and script fragments keep their formatting).
    fn run_optimization(
        &self,
        code_type: CodeType,
        options: &TransformOptions,
        current: &mut String,
        change_log: &mut ChangeLog,
    ) {
        let Some(level) = options.optimization else {
            return;
        };
        if code_type != CodeType::Css || !options.guidance.runs_stage(Stage::Optimization) {
            return;
        }
        let Some(optimized) = optimize_css(current, level) else {
            return;
        };
        if optimized == *current {
            return;
        }
        change_log.applied.push(agentic_design_core::Edit {
            rule_id: "optimize".to_string(),
            kind: EditKind::Optimization,
            start: 0,
            end: current.len(),
            anchor: "stylesheet".to_string(),
            before: current.clone(),
            after: optimized.clone(),
            confidence: 1.0,
        });
        *current = optimized;
    }
}

/// Non-applied candidates become advisory when above the floor (state
/// variants always), otherwise rejected with the reason that fits.
fn route_non_applied(
    policy: &RulePolicy,
    candidate: Candidate,
    confidence: f64,
    change_log: &mut ChangeLog,
) {
    let ambiguous = candidate.ambiguous;
    if candidate.kind == EditKind::StateVariant || confidence >= policy.advisory_floor {
        if ambiguous {
            change_log.rejected.push(RejectedEdit {
                edit: candidate.into_edit(confidence),
                reason: "ambiguous-token".to_string(),
            });
        } else {
            change_log.advisory.push(candidate.into_edit(confidence));
        }
    } else {
        change_log.rejected.push(RejectedEdit {
            edit: candidate.into_edit(confidence),
            reason: if ambiguous {
                "ambiguous-token".to_string()
            } else {
                "below-floor".to_string()
            },
        });
    }
}
