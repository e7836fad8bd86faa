//! Data models shared across the enhancement pipeline.
//!
//! A [`Fragment`] is the unit of work: a parseable chunk of CSS/HTML/JSX
//! presented to the engine together with a resolved [`ProjectContext`]. The
//! engine's output is a [`ChangeLog`] — the applied subset of a proposed
//! edit list plus the reasons anything was demoted or dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

// =============================================================================
// Code types
// =============================================================================

/// Source language of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeType {
    Css,
    Html,
    Jsx,
    Tsx,
    Js,
}

impl CodeType {
    /// Stable lowercase name, used in signatures and envelopes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::Html => "html",
            Self::Jsx => "jsx",
            Self::Tsx => "tsx",
            Self::Js => "js",
        }
    }

    /// JSX, TSX and JS fragments all route through the JSX/CSS-in-JS parsers.
    #[must_use]
    pub const fn is_script(self) -> bool {
        matches!(self, Self::Jsx | Self::Tsx | Self::Js)
    }
}

impl std::str::FromStr for CodeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "css" => Ok(Self::Css),
            "html" => Ok(Self::Html),
            "jsx" => Ok(Self::Jsx),
            "tsx" => Ok(Self::Tsx),
            "js" => Ok(Self::Js),
            other => Err(Error::UnknownCodeType(other.to_string())),
        }
    }
}

impl std::fmt::Display for CodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Fragment
// =============================================================================

/// A parseable chunk of source code presented to the pipeline.
///
/// # Invariant
/// Parsing is whole-or-nothing: a fragment either parses completely or the
/// original bytes are echoed back with a `parse-error` diagnostic. Partial
/// parses are never emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub code_type: CodeType,
    /// UTF-8 source text.
    pub code: String,
    /// Optional origin path, consulted for vendor exclusion only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl Fragment {
    #[must_use]
    pub fn new(code_type: CodeType, code: impl Into<String>) -> Self {
        Self {
            code_type,
            code: code.into(),
            file_path: None,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }
}

// =============================================================================
// Edits
// =============================================================================

/// Rule class an edit belongs to. Determines auto-apply policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditKind {
    /// Exact color literal → color token reference.
    ColorToken,
    /// Near color literal → advisory color suggestion.
    ColorSuggestion,
    /// Length literal → spacing token.
    SpacingToken,
    /// Border radius literal → radius token.
    RadiusToken,
    /// Box shadow → elevation token.
    ElevationToken,
    /// Font-family / type-scale nudge.
    Typography,
    /// Transition/animation duration or easing → motion token.
    AnimationToken,
    /// Gradient literal → gradient preset.
    GradientPreset,
    /// Synthesized `:hover` / `:active` variant.
    StateVariant,
    /// Whitespace/comment/shorthand optimization.
    Optimization,
    /// Tailwind-style utility class remap.
    UtilityClass,
}

impl EditKind {
    /// Rule classes on the safe auto-apply list: substitutions that keep
    /// the rendered result pixel-identical when the match is exact.
    #[must_use]
    pub const fn is_safe_class(self) -> bool {
        matches!(
            self,
            Self::ColorToken
                | Self::SpacingToken
                | Self::RadiusToken
                | Self::ElevationToken
                | Self::UtilityClass
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ColorToken => "color-token",
            Self::ColorSuggestion => "color-suggestion",
            Self::SpacingToken => "spacing-token",
            Self::RadiusToken => "radius-token",
            Self::ElevationToken => "elevation-token",
            Self::Typography => "typography",
            Self::AnimationToken => "animation-token",
            Self::GradientPreset => "gradient-preset",
            Self::StateVariant => "state-variant",
            Self::Optimization => "optimization",
            Self::UtilityClass => "utility-class",
        }
    }
}

/// One proposed rewrite of a byte range within a fragment snapshot.
///
/// Spans are relative to the fragment text the edit list was built against;
/// the engine re-anchors after each stage by rebuilding the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edit {
    /// Stable rule identifier, e.g. `color-token`, `spacing-token`.
    pub rule_id: String,
    pub kind: EditKind,
    /// Byte range in the fragment snapshot this edit replaces.
    pub start: usize,
    pub end: usize,
    /// Semantic anchor for logs: `selector { property }`.
    pub anchor: String,
    pub before: String,
    pub after: String,
    /// Calibrated confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Why a proposed edit was not auto-applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedEdit {
    pub edit: Edit,
    /// Guardrail or policy that fired: `contrast-regression`,
    /// `change-cap`, `ambiguous-token`, `below-floor`, `reparse-failed`.
    pub reason: String,
}

/// The applied subset of an edit list, plus demotions and rejections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeLog {
    /// Edits written into the returned code, in application order.
    pub applied: Vec<Edit>,
    /// Suggestions surfaced but not applied (advisory classes, demotions).
    pub advisory: Vec<Edit>,
    /// Edits dropped outright, with the reason.
    pub rejected: Vec<RejectedEdit>,
}

impl ChangeLog {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.advisory.is_empty() && self.rejected.is_empty()
    }

    /// Count of auto-applied edits, bounded by the change cap.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    /// Merge a later stage's log into this one, preserving order.
    pub fn extend(&mut self, other: Self) {
        self.applied.extend(other.applied);
        self.advisory.extend(other.advisory);
        self.rejected.extend(other.rejected);
    }
}

// =============================================================================
// Project context
// =============================================================================

/// Which discovery rung produced the brand binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoverySource {
    Env,
    Config,
    Manifest,
    Marker,
    Mapping,
    AutoBind,
    Lock,
    Degraded,
}

impl DiscoverySource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::Config => "config",
            Self::Manifest => "manifest",
            Self::Marker => "marker",
            Self::Mapping => "mapping",
            Self::AutoBind => "auto-bind",
            Self::Lock => "lock",
            Self::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a brand pack at a resolved version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandPackRef {
    pub id: String,
    /// Resolved semantic version. The transform engine rejects ranges.
    pub version: String,
}

/// Resolved per-project context threaded through every transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project_id: String,
    /// Hash of the project root path, used as the mapping-table key.
    pub root_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_pack: Option<BrandPackRef>,
    /// Project-level token preference overrides (token name → preferred).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub overrides: serde_json::Map<String, serde_json::Value>,
    /// Which rung of the discovery ladder won.
    pub source: DiscoverySource,
}

impl ProjectContext {
    /// A context with no brand binding: structural rules only.
    #[must_use]
    pub fn degraded(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            root_hash: String::new(),
            brand_pack: None,
            overrides: serde_json::Map::new(),
            source: DiscoverySource::Degraded,
        }
    }

    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self.source, DiscoverySource::Degraded)
    }
}

// =============================================================================
// Viewports
// =============================================================================

/// Render viewport for screenshot capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const DESKTOP: Self = Self {
        width: 1280,
        height: 800,
    };
    pub const TABLET: Self = Self {
        width: 768,
        height: 1024,
    };
    pub const MOBILE: Self = Self {
        width: 375,
        height: 812,
    };
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// =============================================================================
// Timestamps
// =============================================================================

/// UTC now, truncated to milliseconds for stable serialization.
#[must_use]
pub fn now_utc() -> DateTime<Utc> {
    let now = Utc::now();
    now - chrono::Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos() % 1_000_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn code_type_parses_case_insensitively() {
        assert_eq!(CodeType::from_str("CSS").unwrap(), CodeType::Css);
        assert_eq!(CodeType::from_str(" tsx ").unwrap(), CodeType::Tsx);
        assert!(CodeType::from_str("vue").is_err());
    }

    #[test]
    fn safe_class_list_matches_policy_table() {
        assert!(EditKind::ColorToken.is_safe_class());
        assert!(EditKind::SpacingToken.is_safe_class());
        assert!(EditKind::RadiusToken.is_safe_class());
        assert!(EditKind::ElevationToken.is_safe_class());
        assert!(!EditKind::ColorSuggestion.is_safe_class());
        assert!(!EditKind::GradientPreset.is_safe_class());
        assert!(!EditKind::StateVariant.is_safe_class());
        assert!(!EditKind::AnimationToken.is_safe_class());
    }

    #[test]
    fn change_log_extend_preserves_order() {
        let mk = |id: &str| Edit {
            rule_id: id.to_string(),
            kind: EditKind::SpacingToken,
            start: 0,
            end: 1,
            anchor: String::new(),
            before: "a".into(),
            after: "b".into(),
            confidence: 0.95,
        };
        let mut log = ChangeLog {
            applied: vec![mk("first")],
            ..ChangeLog::default()
        };
        log.extend(ChangeLog {
            applied: vec![mk("second")],
            ..ChangeLog::default()
        });
        let ids: Vec<&str> = log.applied.iter().map(|e| e.rule_id.as_str()).collect();
        assert_eq!(ids, ["first", "second"]);
    }

    #[test]
    fn degraded_context_has_no_brand() {
        let ctx = ProjectContext::degraded("proj");
        assert!(ctx.is_degraded());
        assert!(ctx.brand_pack.is_none());
    }
}
