//! The three-pass forensic critique prompt.
//!
//! The prompt forbids praise and demands a violation-first posture: the
//! model must measure first, judge against fixed thresholds second, and
//! only then score. Keeping the thresholds in one place means the prompt
//! and the deterministic fallback can never drift apart.

use agentic_design_core::Viewport;

/// Fixed measurement thresholds (pass 2).
pub mod thresholds {
    /// Minimum body text size in CSS pixels.
    pub const BODY_TEXT_MIN_PX: f64 = 16.0;
    /// Minimum H1 size in CSS pixels.
    pub const H1_MIN_PX: f64 = 24.0;
    /// Minimum AA contrast for normal text.
    pub const CONTRAST_MIN: f64 = 4.5;
    /// Minimum interactive target edge in CSS pixels.
    pub const TOUCH_TARGET_MIN_PX: f64 = 44.0;
    /// Minimum body line-height multiplier.
    pub const LINE_HEIGHT_MIN: f64 = 1.4;
    /// The systematic spacing scale values (px).
    pub const SPACING_SCALE: [f64; 8] = [4.0, 8.0, 12.0, 16.0, 24.0, 32.0, 48.0, 64.0];
}

/// Dimension weights used for the overall score (pass 3).
pub const DIMENSION_WEIGHTS: [(&str, f64); 6] = [
    ("hierarchy", 0.20),
    ("typography", 0.20),
    ("spacing", 0.15),
    ("color", 0.15),
    ("accessibility", 0.20),
    ("brand", 0.10),
];

/// Context the prompt is specialized with.
#[derive(Debug, Clone, Default)]
pub struct CritiqueContext {
    pub component_type: Option<String>,
    /// Short, human-readable summary of the bound brand pack.
    pub brand_summary: Option<String>,
    pub viewport: Option<Viewport>,
}

/// System prompt: posture and output contract.
pub const SYSTEM_PROMPT: &str = "You are a forensic UI design auditor. You never praise. \
You report measurable violations and nothing else. You respond with a single JSON object \
and no surrounding prose.";

/// Build the three-pass user prompt for one screenshot.
#[must_use]
pub fn build_forensic_prompt(context: &CritiqueContext) -> String {
    use std::fmt::Write as _;
    let mut p = String::with_capacity(2048);

    p.push_str("Audit the attached interface screenshot in three passes.\n\n");

    if let Some(component) = &context.component_type {
        let _ = writeln!(p, "Component under review: {component}.");
    }
    if let Some(brand) = &context.brand_summary {
        let _ = writeln!(p, "Brand context: {brand}.");
    }
    if let Some(viewport) = context.viewport {
        let _ = writeln!(p, "Rendered at {viewport}.");
    }

    p.push_str(
        "\nPASS 1 - MEASURE. Measure every text element (font size, line height), every \
         interactive target (width, height), every spacing value between adjacent elements, \
         and every foreground/background color pair. Record concrete pixel and ratio values.\n",
    );

    let _ = write!(
        p,
        "\nPASS 2 - DETECT VIOLATIONS. Flag every measurement that breaks a threshold: \
         body text below {body}px; primary heading below {h1}px; text contrast below \
         {contrast}:1; interactive targets below {touch}x{touch}px; line-height below \
         {lh}; spacing values off the systematic scale {scale:?}. Severity: critical for \
         accessibility and readability failures, high for hierarchy breaks, medium for \
         off-scale spacing, low for polish.\n",
        body = thresholds::BODY_TEXT_MIN_PX,
        h1 = thresholds::H1_MIN_PX,
        contrast = thresholds::CONTRAST_MIN,
        touch = thresholds::TOUCH_TARGET_MIN_PX,
        lh = thresholds::LINE_HEIGHT_MIN,
        scale = thresholds::SPACING_SCALE,
    );

    p.push_str(
        "\nPASS 3 - SCORE. Score the six dimensions hierarchy, typography, spacing, color, \
         accessibility, brand from 0-100, deducting per violation class. The overall score \
         is the weighted sum (hierarchy 0.20, typography 0.20, spacing 0.15, color 0.15, \
         accessibility 0.20, brand 0.10).\n",
    );

    p.push_str(
        "\nRespond with JSON only:\n\
         {\n  \"overallScore\": <0-100>,\n  \"dimensionScores\": {\"hierarchy\": n, \
         \"typography\": n, \"spacing\": n, \"color\": n, \"accessibility\": n, \"brand\": n},\n\
         \"violations\": [{\"severity\": \"critical|high|medium|low\", \"location\": \"css selector or region\", \
         \"evidence\": \"measured value vs threshold\", \"recommendedEndpoint\": \
         \"enhance-typography|spacing-optimization|analyze-accessibility|enhance-colors|enhance-animations|enhance-gradients\", \
         \"parameters\": {\"selector\": \"...\", \"property\": \"...\", \"value\": \"...\"}, \
         \"confidence\": <0-100>}],\n  \"executionOrder\": [\"endpoint\", ...],\n\
         \"estimatedGain\": <0-100>\n}\n\
         Report violations first. Do not praise. Do not include markdown fences.",
    );
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_all_thresholds() {
        let prompt = build_forensic_prompt(&CritiqueContext::default());
        assert!(prompt.contains("16px"));
        assert!(prompt.contains("24px"));
        assert!(prompt.contains("4.5:1"));
        assert!(prompt.contains("44x44px"));
        assert!(prompt.contains("PASS 1"));
        assert!(prompt.contains("PASS 2"));
        assert!(prompt.contains("PASS 3"));
    }

    #[test]
    fn context_fields_are_woven_in() {
        let context = CritiqueContext {
            component_type: Some("pricing card".into()),
            brand_summary: Some("western-star v2.1.0, 24 tokens".into()),
            viewport: Some(Viewport::MOBILE),
        };
        let prompt = build_forensic_prompt(&context);
        assert!(prompt.contains("pricing card"));
        assert!(prompt.contains("western-star"));
        assert!(prompt.contains("375x812"));
    }

    #[test]
    fn weights_sum_to_one() {
        let sum: f64 = DIMENSION_WEIGHTS.iter().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
}
