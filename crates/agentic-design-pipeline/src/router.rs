//! Smart router: violations → ordered fix plan → guided transforms.
//!
//! Planning partitions violations by recommended endpoint, ranks the
//! groups by `(worst severity, best confidence)` descending, and bounds
//! the run. Execution feeds each fix's output into the next through the
//! ordinary enhancement path, narrowed by a [`VisualGuidance`] hint built
//! from the violation parameters.

use serde::Serialize;
use serde_json::Value;

use agentic_design_engine::stages::{PropertyAdjustment, Stage, VisualGuidance, stage_for_property};
use agentic_design_visual::{FixEndpoint, Severity, Violation, VisualAnalysis};

/// One planned fix: an endpoint plus the violations it answers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixPlanEntry {
    pub endpoint: FixEndpoint,
    pub severity: Severity,
    /// Best violation confidence in the group, `[0, 100]`.
    pub confidence: i64,
    pub locations: Vec<String>,
    /// Property adjustments extracted from violation parameters.
    pub adjustments: Vec<PropertyAdjustment>,
}

/// Build the ordered, bounded fix plan for an analysis.
#[must_use]
pub fn plan(analysis: &VisualAnalysis, cap: usize) -> Vec<FixPlanEntry> {
    let mut groups: Vec<FixPlanEntry> = Vec::new();
    for violation in &analysis.violations {
        let adjustment = adjustment_from(violation);
        match groups
            .iter_mut()
            .find(|g| g.endpoint == violation.recommended_endpoint)
        {
            Some(group) => {
                if violation.severity.rank() > group.severity.rank() {
                    group.severity = violation.severity;
                }
                group.confidence = group.confidence.max(violation.confidence);
                group.locations.push(violation.location.clone());
                if let Some(adj) = adjustment {
                    if !group.adjustments.contains(&adj) {
                        group.adjustments.push(adj);
                    }
                }
            }
            None => groups.push(FixPlanEntry {
                endpoint: violation.recommended_endpoint,
                severity: violation.severity,
                confidence: violation.confidence,
                locations: vec![violation.location.clone()],
                adjustments: adjustment.into_iter().collect(),
            }),
        }
    }
    groups.sort_by(|a, b| {
        (b.severity.rank(), b.confidence).cmp(&(a.severity.rank(), a.confidence))
    });
    groups.truncate(cap);
    groups
}

/// Extract a `{selector, property, value}` adjustment from a violation's
/// parameters, when all three are usable.
fn adjustment_from(violation: &Violation) -> Option<PropertyAdjustment> {
    let params = violation.parameters.as_object()?;
    let property = params.get("property")?.as_str()?.to_string();
    let value = value_string(params.get("value")?)?;
    let selector = params
        .get("selector")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            if violation.location.is_empty() {
                None
            } else {
                Some(violation.location.clone())
            }
        });
    Some(PropertyAdjustment {
        property,
        value,
        selector,
    })
}

fn value_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(format!("{n}px")),
        _ => None,
    }
}

/// Guidance hint for one planned fix: the endpoint's stages plus any
/// stages its adjustments touch.
#[must_use]
pub fn guidance_for(entry: &FixPlanEntry) -> VisualGuidance {
    let mut focus = endpoint_stages(entry.endpoint);
    for adjustment in &entry.adjustments {
        if let Some(stage) = stage_for_property(&adjustment.property) {
            if !focus.contains(&stage) {
                focus.push(stage);
            }
        }
    }
    VisualGuidance {
        focus,
        target_selector: None,
        adjustments: entry.adjustments.clone(),
    }
}

/// Default stage set per endpoint.
#[must_use]
pub fn endpoint_stages(endpoint: FixEndpoint) -> Vec<Stage> {
    match endpoint {
        FixEndpoint::EnhanceTypography => vec![Stage::Typography],
        FixEndpoint::SpacingOptimization => vec![Stage::Spacing, Stage::Radius],
        // Accessibility fixes land on contrast, text size, and target size.
        FixEndpoint::AnalyzeAccessibility => {
            vec![Stage::Colors, Stage::Typography, Stage::Spacing]
        }
        FixEndpoint::EnhanceColors => vec![Stage::Colors, Stage::Gradients],
        FixEndpoint::EnhanceAnimations => vec![Stage::Animations],
        FixEndpoint::EnhanceGradients => vec![Stage::Gradients],
    }
}
