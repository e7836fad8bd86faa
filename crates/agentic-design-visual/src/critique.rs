//! Structured critique model and lenient response coercion.
//!
//! The vision model is *asked* for a strict JSON shape, but production
//! responses drift: fenced code blocks, prose around the object, legacy
//! field names. Coercion is lenient in one direction only — known aliases
//! are folded onto the single internal representation; anything else is a
//! coercion failure that triggers a retry upstream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::prompt::DIMENSION_WEIGHTS;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Violation severity, ranked for fix ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// critical=3, high=2, medium=1, low=0.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Critical => 3,
            Self::High => 2,
            Self::Medium => 1,
            Self::Low => 0,
        }
    }

    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" | "blocker" => Self::Critical,
            "high" | "major" => Self::High,
            "low" | "minor" | "nit" => Self::Low,
            _ => Self::Medium,
        }
    }
}

/// Transform endpoint a violation routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixEndpoint {
    EnhanceTypography,
    SpacingOptimization,
    AnalyzeAccessibility,
    EnhanceColors,
    EnhanceAnimations,
    EnhanceGradients,
}

impl FixEndpoint {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "enhance-typography" | "typography" => Some(Self::EnhanceTypography),
            "spacing-optimization" | "enhance-spacing" | "spacing" => {
                Some(Self::SpacingOptimization)
            }
            "analyze-accessibility" | "accessibility" => Some(Self::AnalyzeAccessibility),
            "enhance-colors" | "colors" => Some(Self::EnhanceColors),
            "enhance-animations" | "animations" => Some(Self::EnhanceAnimations),
            "enhance-gradients" | "gradients" => Some(Self::EnhanceGradients),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EnhanceTypography => "enhance-typography",
            Self::SpacingOptimization => "spacing-optimization",
            Self::AnalyzeAccessibility => "analyze-accessibility",
            Self::EnhanceColors => "enhance-colors",
            Self::EnhanceAnimations => "enhance-animations",
            Self::EnhanceGradients => "enhance-gradients",
        }
    }
}

impl std::fmt::Display for FixEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One measured violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub severity: Severity,
    pub location: String,
    pub evidence: String,
    pub recommended_endpoint: FixEndpoint,
    /// Free-form parameters (`selector`, `property`, `value`) the router
    /// turns into a guidance hint.
    #[serde(default)]
    pub parameters: Value,
    /// Confidence in `[0, 100]`.
    pub confidence: i64,
}

/// Per-dimension scores in `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub hierarchy: i64,
    pub typography: i64,
    pub spacing: i64,
    pub color: i64,
    pub accessibility: i64,
    pub brand: i64,
}

impl DimensionScores {
    /// Weighted overall score.
    #[must_use]
    pub fn weighted_overall(&self) -> i64 {
        let lookup = |name: &str| -> f64 {
            match name {
                "hierarchy" => self.hierarchy as f64,
                "typography" => self.typography as f64,
                "spacing" => self.spacing as f64,
                "color" => self.color as f64,
                "accessibility" => self.accessibility as f64,
                _ => self.brand as f64,
            }
        };
        let sum: f64 = DIMENSION_WEIGHTS
            .iter()
            .map(|(name, weight)| lookup(name) * weight)
            .sum();
        (sum.round() as i64).clamp(0, 100)
    }

    /// Per-dimension deltas, improved minus original.
    #[must_use]
    pub fn delta(&self, original: &Self) -> [(&'static str, i64); 6] {
        [
            ("hierarchy", self.hierarchy - original.hierarchy),
            ("typography", self.typography - original.typography),
            ("spacing", self.spacing - original.spacing),
            ("color", self.color - original.color),
            ("accessibility", self.accessibility - original.accessibility),
            ("brand", self.brand - original.brand),
        ]
    }
}

/// The coerced critique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualAnalysis {
    pub analysis_id: String,
    pub screenshot_id: String,
    pub overall_score: i64,
    pub dimension_scores: DimensionScores,
    pub violations: Vec<Violation>,
    pub execution_order: Vec<FixEndpoint>,
    pub estimated_gain: i64,
}

impl VisualAnalysis {
    /// Violations at the given severity or worse.
    #[must_use]
    pub fn violations_at_least(&self, severity: Severity) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity.rank() >= severity.rank())
            .count()
    }
}

// ---------------------------------------------------------------------------
// Lenient JSON extraction
// ---------------------------------------------------------------------------

/// Parse JSON from model output using three fallback strategies:
/// 1. Direct parse (trim whitespace first)
/// 2. Fenced code block extraction (```json ... ``` or ``` ... ```)
/// 3. Brace-slice extraction (outermost { ... })
#[must_use]
pub fn parse_json_safely(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(v) = serde_json::from_str(trimmed) {
        return Some(v);
    }
    if let Some(v) = extract_fenced_json(trimmed) {
        return Some(v);
    }
    extract_brace_json(trimmed)
}

fn extract_fenced_json(text: &str) -> Option<Value> {
    let markers = ["```json\n", "```json\r\n", "```\n", "```\r\n"];
    for marker in markers {
        if let Some(start) = text.find(marker) {
            let content_start = start + marker.len();
            if let Some(end_rel) = text[content_start..].find("```") {
                let content = text[content_start..content_start + end_rel].trim();
                if let Ok(v) = serde_json::from_str(content) {
                    return Some(v);
                }
            }
        }
    }
    None
}

fn extract_brace_json(text: &str) -> Option<Value> {
    let open = text.find('{')?;
    let close = text.rfind('}')?;
    if close <= open {
        return None;
    }
    serde_json::from_str(&text[open..=close]).ok()
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// Field aliases accepted for the violation list, in precedence order.
const VIOLATION_ALIASES: [&str; 4] = ["violations", "criticalViolations", "criticalIssues", "issues"];

fn clamp_score(value: f64) -> i64 {
    (value.round() as i64).clamp(0, 100)
}

fn score_from(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    let number = value.as_f64()?;
    // 0-1 floats are rescaled; everything else is treated as 0-100.
    if (0.0..=1.0).contains(&number) && number.fract() != 0.0 {
        Some(clamp_score(number * 100.0))
    } else {
        Some(clamp_score(number))
    }
}

fn string_of(value: &Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), str::to_string)
}

/// Coerce a raw model response into a [`VisualAnalysis`].
///
/// Returns the reason when the shape cannot be coerced; the caller
/// retries and eventually degrades with a `vision-unavailable`
/// diagnostic.
pub fn coerce_analysis(
    raw: &Value,
    screenshot_id: &str,
) -> std::result::Result<VisualAnalysis, String> {
    let obj = raw.as_object().ok_or("response is not a JSON object")?;

    // Violations: fold every accepted alias, first occurrence order.
    let mut violations = Vec::new();
    for alias in VIOLATION_ALIASES {
        if let Some(list) = obj.get(alias).and_then(Value::as_array) {
            for item in list {
                if let Some(v) = coerce_violation(item) {
                    violations.push(v);
                }
            }
        }
    }

    let dims_value = obj
        .get("dimensionScores")
        .or_else(|| obj.get("dimensions"))
        .or_else(|| obj.get("scores"));
    let dimension_scores = dims_value
        .and_then(Value::as_object)
        .map(|dims| DimensionScores {
            hierarchy: score_from(dims.get("hierarchy")).unwrap_or(0),
            typography: score_from(dims.get("typography")).unwrap_or(0),
            spacing: score_from(dims.get("spacing")).unwrap_or(0),
            color: score_from(dims.get("color")).unwrap_or(0),
            accessibility: score_from(dims.get("accessibility")).unwrap_or(0),
            brand: score_from(dims.get("brand")).unwrap_or(0),
        });

    let overall = score_from(
        obj.get("overallScore")
            .or_else(|| obj.get("overall"))
            .or_else(|| obj.get("score")),
    );

    let (overall_score, dimension_scores) = match (overall, dimension_scores) {
        (Some(score), Some(dims)) => (score, dims),
        (None, Some(dims)) => (dims.weighted_overall(), dims),
        (Some(score), None) => {
            // Flat response: mirror the overall into each dimension.
            let dims = DimensionScores {
                hierarchy: score,
                typography: score,
                spacing: score,
                color: score,
                accessibility: score,
                brand: score,
            };
            (score, dims)
        }
        (None, None) => return Err("no overallScore or dimensionScores".to_string()),
    };

    let mut execution_order: Vec<FixEndpoint> = obj
        .get("executionOrder")
        .or_else(|| obj.get("execution_order"))
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str().and_then(FixEndpoint::parse))
                .collect()
        })
        .unwrap_or_default();
    if execution_order.is_empty() {
        execution_order = derive_execution_order(&violations);
    }

    let estimated_gain = score_from(
        obj.get("estimatedGain")
            .or_else(|| obj.get("estimatedImprovement")),
    )
    .unwrap_or(0);

    Ok(VisualAnalysis {
        analysis_id: format!("va-{}", agentic_design_core::correlation_id()),
        screenshot_id: screenshot_id.to_string(),
        overall_score,
        dimension_scores,
        violations,
        execution_order,
        estimated_gain,
    })
}

fn coerce_violation(item: &Value) -> Option<Violation> {
    let obj = item.as_object()?;
    let severity = obj
        .get("severity")
        .and_then(Value::as_str)
        .map_or(Severity::Medium, Severity::parse);
    let location = obj
        .get("location")
        .or_else(|| obj.get("selector"))
        .map(string_of)
        .unwrap_or_default();
    let evidence = obj
        .get("evidence")
        .or_else(|| obj.get("description"))
        .or_else(|| obj.get("message"))
        .map(string_of)
        .unwrap_or_default();
    let endpoint = obj
        .get("recommendedEndpoint")
        .or_else(|| obj.get("endpoint"))
        .or_else(|| obj.get("recommended_endpoint"))
        .and_then(Value::as_str)
        .and_then(FixEndpoint::parse)?;
    let confidence = score_from(obj.get("confidence")).unwrap_or(50);
    Some(Violation {
        severity,
        location,
        evidence,
        recommended_endpoint: endpoint,
        parameters: obj.get("parameters").cloned().unwrap_or(Value::Null),
        confidence,
    })
}

/// When the model omits an order, derive one: endpoints ranked by their
/// worst violation severity, then by violation count.
fn derive_execution_order(violations: &[Violation]) -> Vec<FixEndpoint> {
    let mut buckets: Vec<(FixEndpoint, u8, usize)> = Vec::new();
    for violation in violations {
        match buckets
            .iter_mut()
            .find(|(e, _, _)| *e == violation.recommended_endpoint)
        {
            Some((_, worst, count)) => {
                *worst = (*worst).max(violation.severity.rank());
                *count += 1;
            }
            None => buckets.push((
                violation.recommended_endpoint,
                violation.severity.rank(),
                1,
            )),
        }
    }
    buckets.sort_by(|a, b| (b.1, b.2).cmp(&(a.1, a.2)));
    buckets.into_iter().map(|(endpoint, _, _)| endpoint).collect()
}
