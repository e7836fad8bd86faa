//! Language-neutral request and response records.
//!
//! Every entry point takes a request record and returns a response
//! envelope: `{ success, code?, change_log?, diagnostics, metadata }`.
//! `success = false` is reserved for caller mistakes and internal faults;
//! every degraded condition ships as diagnostics on a successful
//! response so callers stay on the happy path.

use serde::{Deserialize, Serialize};

use agentic_design_core::{ChangeLog, Diagnostic, Viewport};
use agentic_design_patterns::PatternSuggestion;
use agentic_design_visual::VisualAnalysis;

use crate::router::FixPlanEntry;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// `enhance` / `enhance_cached` request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceRequest {
    pub code: String,
    /// One of `css`, `html`, `jsx`, `tsx`, `js`.
    pub code_type: String,
    #[serde(default)]
    pub brand_pack_id: Option<String>,
    #[serde(default)]
    pub brand_version: Option<String>,
    #[serde(default)]
    pub project_path: Option<String>,
    #[serde(default)]
    pub component_type: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    /// `safe` (default), `off`, or `all`.
    #[serde(default)]
    pub auto_apply: Option<String>,
    /// `basic` or `aggressive`; absent = no optimization pass.
    #[serde(default)]
    pub optimize: Option<String>,
}

/// `analyze_and_fix` request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub code: String,
    pub code_type: String,
    #[serde(default)]
    pub brand_pack_id: Option<String>,
    #[serde(default)]
    pub project_path: Option<String>,
    #[serde(default)]
    pub component_type: Option<String>,
    #[serde(default)]
    pub viewport: Option<Viewport>,
    /// `safe` (default), `off` (plan only), or `all`.
    #[serde(default)]
    pub auto_apply: Option<String>,
    #[serde(default)]
    pub validate_after_fix: bool,
}

/// `validate_improvements` request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub original_code: String,
    pub improved_code: String,
    pub code_type: String,
    #[serde(default)]
    pub viewport: Option<Viewport>,
    #[serde(default)]
    pub component_type: Option<String>,
}

/// `analyze_responsive` request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsiveRequest {
    pub code: String,
    pub code_type: String,
    #[serde(default)]
    pub viewports: Vec<Viewport>,
    #[serde(default)]
    pub component_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Envelope metadata
// ---------------------------------------------------------------------------

/// Common response metadata.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub duration_ms: u64,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_pack_source: Option<String>,
    /// Some collaborator was unavailable while serving this request.
    pub degraded: bool,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_log: Option<ChangeLog>,
    /// Learned advisory suggestions (never applied here).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<PatternSuggestion>,
    pub diagnostics: Vec<Diagnostic>,
    pub metadata: ResponseMeta,
}

/// Router verdict after post-validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Accept,
    Review,
    Reject,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_analysis: Option<VisualAnalysis>,
    pub fix_plan: Vec<FixPlanEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_log: Option<ChangeLog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_analysis: Option<VisualAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_delta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
    pub diagnostics: Vec<Diagnostic>,
    pub metadata: ResponseMeta,
}

/// Improvement summary for `validate_improvements`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Improvements {
    pub score_increase: i64,
    pub percentage_increase: i64,
    pub resolved_issues: Vec<String>,
    pub remaining_issues: Vec<String>,
    /// Per-dimension deltas, improved minus original.
    pub category_improvements: Vec<(String, i64)>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improvements: Option<Improvements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
    pub diagnostics: Vec<Diagnostic>,
    pub metadata: ResponseMeta,
}

/// One viewport's slice of a responsive analysis.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportAnalysis {
    pub viewport: Viewport,
    pub analysis: VisualAnalysis,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsiveResponse {
    pub success: bool,
    pub responsive_score: i64,
    pub viewport_analyses: Vec<ViewportAnalysis>,
    /// Cross-viewport consistency findings.
    pub responsive_issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub metadata: ResponseMeta,
}
