//! Rule stages and their candidate collectors.
//!
//! Stages run in a fixed order; each consumes the previous stage's output
//! text. Collectors only *propose* — the engine in [`crate::engine`]
//! decides application after boosters, floors, guardrails, and the change
//! cap.

use agentic_design_core::tokens::{Resolution, split_components};
use agentic_design_core::{EditKind, TokenCategory, TokenSnapshot, contrast_ratio, parse_color};
use agentic_design_parsers::jsx::utility_candidate;
use agentic_design_parsers::{Declaration, ParsedFragment, StyleRule};

use crate::candidates::{Candidate, ContrastCheck, anchor};

// ---------------------------------------------------------------------------
// Stage order
// ---------------------------------------------------------------------------

/// The fixed stage order. Optimization runs last and only on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Typography,
    Colors,
    Spacing,
    Radius,
    Elevation,
    Animations,
    Gradients,
    States,
    Optimization,
}

impl Stage {
    /// Fixed application order; each stage consumes the previous one's
    /// output.
    pub const ORDER: [Self; 8] = [
        Self::Typography,
        Self::Colors,
        Self::Spacing,
        Self::Radius,
        Self::Elevation,
        Self::Animations,
        Self::Gradients,
        Self::States,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Typography => "typography",
            Self::Colors => "colors",
            Self::Spacing => "spacing",
            Self::Radius => "radius",
            Self::Elevation => "elevation",
            Self::Animations => "animations",
            Self::Gradients => "gradients",
            Self::States => "states",
            Self::Optimization => "optimization",
        }
    }
}

/// One concrete adjustment a visual violation asks for: set `property`
/// to `value` on rules matching `selector` (when given).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PropertyAdjustment {
    pub property: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

/// Narrowing hint derived from a visual-analysis violation. Restricts the
/// stages that run, optionally the selectors they may touch, and carries
/// the concrete adjustments the critique asked for.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct VisualGuidance {
    /// Stages to run; empty means all.
    #[serde(default)]
    pub focus: Vec<Stage>,
    /// Only rules whose selector contains this substring are eligible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_selector: Option<String>,
    /// Evidence-backed property adjustments from the critique.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adjustments: Vec<PropertyAdjustment>,
}

impl VisualGuidance {
    #[must_use]
    pub fn runs_stage(&self, stage: Stage) -> bool {
        self.focus.is_empty() || self.focus.contains(&stage)
    }

    #[must_use]
    pub fn allows_selector(&self, selector: &str) -> bool {
        self.target_selector
            .as_deref()
            .is_none_or(|needle| selector.contains(needle))
    }
}

/// Stage that owns a guided adjustment, by property.
#[must_use]
pub fn stage_for_property(property: &str) -> Option<Stage> {
    match property {
        "font-size" | "font-family" | "font-weight" | "line-height" => Some(Stage::Typography),
        "color" | "background" | "background-color" | "border-color" => Some(Stage::Colors),
        "padding" | "margin" | "gap" | "min-height" | "min-width" => Some(Stage::Spacing),
        p if p.starts_with("padding-") || p.starts_with("margin-") => Some(Stage::Spacing),
        "border-radius" => Some(Stage::Radius),
        "box-shadow" => Some(Stage::Elevation),
        p if p.starts_with("transition") || p.starts_with("animation") => Some(Stage::Animations),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Base confidences per rule class
// ---------------------------------------------------------------------------

const BASE_COLOR_EXACT: f64 = 0.95;
const BASE_LENGTH: f64 = 0.92;
const BASE_UTILITY: f64 = 0.92;
const BASE_ADVISORY: f64 = 0.82;
const BASE_NEAR_COLOR: f64 = 0.84;
const BASE_STATE: f64 = 0.85;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Collect candidates for one stage over the current parse.
#[must_use]
pub fn collect(
    stage: Stage,
    parsed: &ParsedFragment,
    snapshot: &TokenSnapshot,
    guidance: &VisualGuidance,
) -> Vec<Candidate> {
    let mut out = match stage {
        Stage::Typography => collect_typography(parsed, snapshot, guidance),
        Stage::Colors => collect_colors(parsed, snapshot, guidance),
        Stage::Spacing => collect_lengths(
            parsed,
            snapshot,
            guidance,
            TokenCategory::Spacing,
            SPACING_PROPERTIES,
            EditKind::SpacingToken,
            "spacing-token",
        ),
        Stage::Radius => collect_lengths(
            parsed,
            snapshot,
            guidance,
            TokenCategory::Radius,
            RADIUS_PROPERTIES,
            EditKind::RadiusToken,
            "radius-token",
        ),
        Stage::Elevation => collect_elevation(parsed, snapshot, guidance),
        Stage::Animations => collect_motion(parsed, snapshot, guidance),
        Stage::Gradients => collect_gradients(parsed, snapshot, guidance),
        Stage::States => collect_states(parsed, snapshot, guidance),
        Stage::Optimization => Vec::new(),
    };
    collect_guided(stage, parsed, snapshot, guidance, &mut out);
    out
}

/// Evidence-backed adjustments from the smart router: set a property to
/// the critiqued value, tokenized when the target value resolves. These
/// take precedence over ordinary candidates on the same span.
fn collect_guided(
    stage: Stage,
    parsed: &ParsedFragment,
    snapshot: &TokenSnapshot,
    guidance: &VisualGuidance,
    out: &mut Vec<Candidate>,
) {
    for adjustment in &guidance.adjustments {
        if stage_for_property(&adjustment.property) != Some(stage) {
            continue;
        }
        for (rule, decl) in editable_decls(parsed, guidance) {
            if decl.property != adjustment.property {
                continue;
            }
            if let Some(selector) = &adjustment.selector {
                if !rule.selector.contains(selector.as_str()) {
                    continue;
                }
            }
            if decl.value == adjustment.value {
                continue;
            }
            // Prefer the token form of the target value when one exists.
            let after = guided_replacement(stage, snapshot, &adjustment.value);
            if after == decl.value {
                continue;
            }
            // The ordinary candidate for this span (if any) is superseded.
            out.retain(|c| c.start != decl.value_start || c.end != decl.value_end);
            out.push(Candidate {
                kind: guided_kind(stage),
                rule_id: "visual-adjustment",
                start: decl.value_start,
                end: decl.value_end,
                anchor: anchor(&rule.selector, &decl.property),
                before: decl.value.clone(),
                after,
                base_confidence: 0.93,
                layout_sensitive: rule_context(rule, decl),
                ambiguous: false,
                preferred: false,
                contrast: None,
                resolved_color: None,
                guided: true,
            });
        }
    }
}

fn guided_kind(stage: Stage) -> EditKind {
    match stage {
        Stage::Colors => EditKind::ColorToken,
        Stage::Spacing => EditKind::SpacingToken,
        Stage::Radius => EditKind::RadiusToken,
        Stage::Elevation => EditKind::ElevationToken,
        Stage::Animations => EditKind::AnimationToken,
        Stage::Gradients => EditKind::GradientPreset,
        Stage::States => EditKind::StateVariant,
        Stage::Typography | Stage::Optimization => EditKind::Typography,
    }
}

fn guided_replacement(stage: Stage, snapshot: &TokenSnapshot, value: &str) -> String {
    let resolution = match stage {
        Stage::Colors => snapshot.resolve_color(value),
        Stage::Spacing => snapshot.resolve_length(value, TokenCategory::Spacing),
        Stage::Radius => snapshot.resolve_length(value, TokenCategory::Radius),
        Stage::Elevation => snapshot.resolve_shadow(value),
        Stage::Typography => snapshot.resolve_font_size(value),
        _ => Resolution::NoMatch,
    };
    resolution
        .as_match()
        .map_or_else(|| value.to_string(), |m| m.reference.clone())
}

fn rule_context(rule: &StyleRule, decl: &Declaration) -> bool {
    decl.important || rule.in_keyframes
}

/// Iterate editable declarations: hole-bearing values are opaque.
fn editable_decls<'a>(
    parsed: &'a ParsedFragment,
    guidance: &'a VisualGuidance,
) -> impl Iterator<Item = (&'a StyleRule, &'a Declaration)> {
    parsed
        .sheets
        .iter()
        .flat_map(|sheet| sheet.declarations())
        .filter(|(rule, decl)| !decl.has_hole && guidance.allows_selector(&rule.selector))
}

// ---------------------------------------------------------------------------
// Typography
// ---------------------------------------------------------------------------

fn collect_typography(
    parsed: &ParsedFragment,
    snapshot: &TokenSnapshot,
    guidance: &VisualGuidance,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    for (rule, decl) in editable_decls(parsed, guidance) {
        match decl.property.as_str() {
            "font-family" => {
                if decl.value.starts_with("var(") {
                    continue;
                }
                if let Some(resolved) = snapshot.suggest_font_family(&decl.value) {
                    out.push(Candidate {
                        kind: EditKind::Typography,
                        rule_id: "font-family-token",
                        start: decl.value_start,
                        end: decl.value_end,
                        anchor: anchor(&rule.selector, &decl.property),
                        before: decl.value.clone(),
                        after: resolved.reference,
                        base_confidence: BASE_ADVISORY,
                        layout_sensitive: rule_context(rule, decl),
                        ambiguous: false,
                        preferred: snapshot.is_preferred(&resolved.token.name),
                        contrast: None,
                        resolved_color: None,
                        guided: false,
                    });
                }
            }
            "font-size" => match snapshot.resolve_font_size(&decl.value) {
                Resolution::Match(resolved) => out.push(Candidate {
                    kind: EditKind::Typography,
                    rule_id: "type-scale",
                    start: decl.value_start,
                    end: decl.value_end,
                    anchor: anchor(&rule.selector, &decl.property),
                    before: decl.value.clone(),
                    after: resolved.reference.clone(),
                    base_confidence: BASE_ADVISORY,
                    layout_sensitive: rule_context(rule, decl),
                    ambiguous: false,
                    preferred: snapshot.is_preferred(&resolved.token.name),
                    contrast: None,
                    resolved_color: None,
                    guided: false,
                }),
                Resolution::Ambiguous { candidates } => {
                    out.push(ambiguous_candidate(
                        EditKind::Typography,
                        "type-scale",
                        rule,
                        decl,
                        BASE_ADVISORY,
                        &candidates,
                    ));
                }
                Resolution::NoMatch => {}
            },
            _ => {}
        }
    }

    // Utility type-scale classes stay advisory: a text-size change is a
    // visible nudge, not a safe rewrite.
    for site in &parsed.class_sites {
        for class in &site.classes {
            let Some(utility) = utility_candidate(&class.name) else {
                continue;
            };
            if utility.category != TokenCategory::FontSize {
                continue;
            }
            if let Resolution::Match(resolved) =
                snapshot.resolve_length(&utility.css_value, TokenCategory::FontSize)
            {
                out.push(Candidate {
                    kind: EditKind::Typography,
                    rule_id: "type-scale",
                    start: class.start,
                    end: class.end,
                    anchor: anchor("className", &class.name),
                    before: class.name.clone(),
                    after: utility.replacement(&resolved.reference),
                    base_confidence: BASE_ADVISORY,
                    layout_sensitive: false,
                    ambiguous: false,
                    preferred: snapshot.is_preferred(&resolved.token.name),
                    contrast: None,
                    resolved_color: None,
                    guided: false,
                });
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Colors
// ---------------------------------------------------------------------------

const COLOR_PROPERTIES: &[&str] = &[
    "color",
    "background-color",
    "background",
    "border-color",
    "outline-color",
    "fill",
    "stroke",
];

/// The counterpart declaration used for the contrast guardrail: `color`
/// pairs with the rule's background and vice versa.
fn counterpart_color(rule: &StyleRule, property: &str) -> Option<agentic_design_core::Rgba> {
    let wanted: &[&str] = if property == "color" {
        &["background-color", "background"]
    } else {
        &["color"]
    };
    rule.decls
        .iter()
        .filter(|d| wanted.contains(&d.property.as_str()))
        .find_map(|d| parse_color(&d.value))
}

fn collect_colors(
    parsed: &ParsedFragment,
    snapshot: &TokenSnapshot,
    guidance: &VisualGuidance,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    for (rule, decl) in editable_decls(parsed, guidance) {
        if !COLOR_PROPERTIES.contains(&decl.property.as_str()) {
            continue;
        }
        let Some(before_color) = parse_color(&decl.value) else {
            continue;
        };
        let counterpart = counterpart_color(rule, &decl.property);
        let make_contrast = |after: agentic_design_core::Rgba| {
            counterpart.map(|other| ContrastCheck {
                pre: contrast_ratio(before_color, other),
                post: contrast_ratio(after, other),
            })
        };

        match snapshot.resolve_color(&decl.value) {
            Resolution::Match(resolved) => {
                let after_color = match &resolved.token.value {
                    agentic_design_core::TokenValue::Color(c) => *c,
                    _ => before_color,
                };
                out.push(Candidate {
                    kind: EditKind::ColorToken,
                    rule_id: "color-token",
                    start: decl.value_start,
                    end: decl.value_end,
                    anchor: anchor(&rule.selector, &decl.property),
                    before: decl.value.clone(),
                    after: resolved.reference.clone(),
                    base_confidence: BASE_COLOR_EXACT,
                    layout_sensitive: rule_context(rule, decl),
                    ambiguous: false,
                    preferred: snapshot.is_preferred(&resolved.token.name),
                    contrast: make_contrast(after_color),
                    resolved_color: Some(after_color),
                    guided: false,
                });
            }
            _ => {
                // Non-exact colors are never auto-applied, only suggested.
                if let Some((resolved, _distance)) = snapshot.near_color(&decl.value) {
                    let after_color = match &resolved.token.value {
                        agentic_design_core::TokenValue::Color(c) => *c,
                        _ => before_color,
                    };
                    out.push(Candidate {
                        kind: EditKind::ColorSuggestion,
                        rule_id: "color-near-match",
                        start: decl.value_start,
                        end: decl.value_end,
                        anchor: anchor(&rule.selector, &decl.property),
                        before: decl.value.clone(),
                        after: resolved.reference.clone(),
                        base_confidence: BASE_NEAR_COLOR,
                        layout_sensitive: rule_context(rule, decl),
                        ambiguous: false,
                        preferred: snapshot.is_preferred(&resolved.token.name),
                        contrast: make_contrast(after_color),
                        resolved_color: Some(after_color),
                        guided: false,
                    });
                }
            }
        }
    }

    // Palette utility classes with an exact token equivalent.
    for site in &parsed.class_sites {
        for class in &site.classes {
            let Some(utility) = utility_candidate(&class.name) else {
                continue;
            };
            if utility.category != TokenCategory::Color {
                continue;
            }
            if let Resolution::Match(resolved) = snapshot.resolve_color(&utility.css_value) {
                out.push(Candidate {
                    kind: EditKind::UtilityClass,
                    rule_id: "utility-color",
                    start: class.start,
                    end: class.end,
                    anchor: anchor("className", &class.name),
                    before: class.name.clone(),
                    after: utility.replacement(&resolved.reference),
                    base_confidence: BASE_UTILITY,
                    layout_sensitive: false,
                    ambiguous: false,
                    preferred: snapshot.is_preferred(&resolved.token.name),
                    contrast: None,
                    resolved_color: None,
                    guided: false,
                });
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Spacing / radius (length stages share a collector)
// ---------------------------------------------------------------------------

const SPACING_PROPERTIES: &[&str] = &[
    "padding",
    "padding-top",
    "padding-right",
    "padding-bottom",
    "padding-left",
    "margin",
    "margin-top",
    "margin-right",
    "margin-bottom",
    "margin-left",
    "gap",
    "row-gap",
    "column-gap",
];

const RADIUS_PROPERTIES: &[&str] = &[
    "border-radius",
    "border-top-left-radius",
    "border-top-right-radius",
    "border-bottom-left-radius",
    "border-bottom-right-radius",
];

#[allow(clippy::too_many_lines)]
fn collect_lengths(
    parsed: &ParsedFragment,
    snapshot: &TokenSnapshot,
    guidance: &VisualGuidance,
    category: TokenCategory,
    properties: &[&str],
    kind: EditKind,
    rule_id: &'static str,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    for (rule, decl) in editable_decls(parsed, guidance) {
        if !properties.contains(&decl.property.as_str()) {
            continue;
        }
        if decl.value.contains("var(") {
            continue;
        }
        // Every space-separated component must resolve for the combined
        // edit to be proposed; a half-tokenized shorthand is worse than
        // none.
        let components = split_components(&decl.value);
        if components.is_empty() {
            continue;
        }
        let mut references = Vec::with_capacity(components.len());
        let mut any_preferred = false;
        let mut ambiguity: Option<Vec<String>> = None;
        let mut resolved_all = true;
        for component in &components {
            match snapshot.resolve_length(component, category) {
                Resolution::Match(resolved) => {
                    any_preferred |= snapshot.is_preferred(&resolved.token.name);
                    references.push(resolved.reference);
                }
                Resolution::Ambiguous { candidates } => {
                    ambiguity = Some(candidates);
                    resolved_all = false;
                    break;
                }
                Resolution::NoMatch => {
                    resolved_all = false;
                    break;
                }
            }
        }
        if let Some(candidates) = ambiguity {
            out.push(ambiguous_candidate(
                kind,
                rule_id,
                rule,
                decl,
                BASE_LENGTH,
                &candidates,
            ));
            continue;
        }
        if !resolved_all {
            continue;
        }
        out.push(Candidate {
            kind,
            rule_id,
            start: decl.value_start,
            end: decl.value_end,
            anchor: anchor(&rule.selector, &decl.property),
            before: decl.value.clone(),
            after: references.join(" "),
            base_confidence: BASE_LENGTH,
            layout_sensitive: rule_context(rule, decl),
            ambiguous: false,
            preferred: any_preferred,
            contrast: None,
            resolved_color: None,
            guided: false,
        });
    }

    // Matching utility classes (spacing scale, rounded-*).
    for site in &parsed.class_sites {
        for class in &site.classes {
            let Some(utility) = utility_candidate(&class.name) else {
                continue;
            };
            if utility.category != category {
                continue;
            }
            match snapshot.resolve_length(&utility.css_value, category) {
                Resolution::Match(resolved) => out.push(Candidate {
                    kind: EditKind::UtilityClass,
                    rule_id: "utility-length",
                    start: class.start,
                    end: class.end,
                    anchor: anchor("className", &class.name),
                    before: class.name.clone(),
                    after: utility.replacement(&resolved.reference),
                    base_confidence: BASE_UTILITY,
                    layout_sensitive: false,
                    ambiguous: false,
                    preferred: snapshot.is_preferred(&resolved.token.name),
                    contrast: None,
                    resolved_color: None,
                    guided: false,
                }),
                Resolution::Ambiguous { .. } | Resolution::NoMatch => {}
            }
        }
    }
    out
}

fn ambiguous_candidate(
    kind: EditKind,
    rule_id: &'static str,
    rule: &StyleRule,
    decl: &Declaration,
    base: f64,
    tied: &[String],
) -> Candidate {
    Candidate {
        kind,
        rule_id,
        start: decl.value_start,
        end: decl.value_end,
        anchor: anchor(&rule.selector, &decl.property),
        before: decl.value.clone(),
        after: format!("tied candidates: {}", tied.join(", ")),
        base_confidence: base,
        layout_sensitive: rule_context(rule, decl),
        ambiguous: true,
        preferred: false,
        contrast: None,
        resolved_color: None,
        guided: false,
    }
}

// ---------------------------------------------------------------------------
// Elevation
// ---------------------------------------------------------------------------

fn collect_elevation(
    parsed: &ParsedFragment,
    snapshot: &TokenSnapshot,
    guidance: &VisualGuidance,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    for (rule, decl) in editable_decls(parsed, guidance) {
        if decl.property != "box-shadow" || decl.value.contains("var(") {
            continue;
        }
        match snapshot.resolve_shadow(&decl.value) {
            Resolution::Match(resolved) => out.push(Candidate {
                kind: EditKind::ElevationToken,
                rule_id: "elevation-token",
                start: decl.value_start,
                end: decl.value_end,
                anchor: anchor(&rule.selector, &decl.property),
                before: decl.value.clone(),
                after: resolved.reference.clone(),
                base_confidence: BASE_LENGTH,
                layout_sensitive: rule_context(rule, decl),
                ambiguous: false,
                preferred: snapshot.is_preferred(&resolved.token.name),
                contrast: None,
                resolved_color: None,
                guided: false,
            }),
            Resolution::Ambiguous { candidates } => out.push(ambiguous_candidate(
                EditKind::ElevationToken,
                "elevation-token",
                rule,
                decl,
                BASE_LENGTH,
                &candidates,
            )),
            Resolution::NoMatch => {}
        }
    }

    for site in &parsed.class_sites {
        for class in &site.classes {
            let Some(utility) = utility_candidate(&class.name) else {
                continue;
            };
            if utility.category != TokenCategory::Elevation {
                continue;
            }
            if let Resolution::Match(resolved) = snapshot.resolve_shadow(&utility.css_value) {
                out.push(Candidate {
                    kind: EditKind::UtilityClass,
                    rule_id: "utility-elevation",
                    start: class.start,
                    end: class.end,
                    anchor: anchor("className", &class.name),
                    before: class.name.clone(),
                    after: utility.replacement(&resolved.reference),
                    base_confidence: BASE_UTILITY,
                    layout_sensitive: false,
                    ambiguous: false,
                    preferred: snapshot.is_preferred(&resolved.token.name),
                    contrast: None,
                    resolved_color: None,
                    guided: false,
                });
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Animations
// ---------------------------------------------------------------------------

const DURATION_PROPERTIES: &[&str] = &["transition-duration", "animation-duration"];
const EASING_PROPERTIES: &[&str] = &["transition-timing-function", "animation-timing-function"];

fn collect_motion(
    parsed: &ParsedFragment,
    snapshot: &TokenSnapshot,
    guidance: &VisualGuidance,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    for (rule, decl) in editable_decls(parsed, guidance) {
        if decl.value.contains("var(") {
            continue;
        }
        let resolved = if DURATION_PROPERTIES.contains(&decl.property.as_str()) {
            snapshot.resolve_duration(&decl.value).as_match().cloned()
        } else if EASING_PROPERTIES.contains(&decl.property.as_str()) {
            snapshot.resolve_easing(&decl.value).as_match().cloned()
        } else if matches!(decl.property.as_str(), "transition" | "animation") {
            // Shorthand: substitute the duration and easing components,
            // leaving everything else (property names, delays) verbatim.
            let mut changed = false;
            let rewritten: Vec<String> = split_components(&decl.value)
                .into_iter()
                .map(|word| {
                    if let Resolution::Match(m) = snapshot.resolve_duration(word) {
                        changed = true;
                        m.reference
                    } else if let Resolution::Match(m) = snapshot.resolve_easing(word) {
                        changed = true;
                        m.reference
                    } else {
                        word.to_string()
                    }
                })
                .collect();
            if changed {
                out.push(Candidate {
                    kind: EditKind::AnimationToken,
                    rule_id: "motion-token",
                    start: decl.value_start,
                    end: decl.value_end,
                    anchor: anchor(&rule.selector, &decl.property),
                    before: decl.value.clone(),
                    after: rewritten.join(" "),
                    base_confidence: BASE_ADVISORY,
                    layout_sensitive: rule_context(rule, decl),
                    ambiguous: false,
                    preferred: false,
                    contrast: None,
                    resolved_color: None,
                    guided: false,
                });
            }
            continue;
        } else {
            continue;
        };

        if let Some(resolved) = resolved {
            out.push(Candidate {
                kind: EditKind::AnimationToken,
                rule_id: "motion-token",
                start: decl.value_start,
                end: decl.value_end,
                anchor: anchor(&rule.selector, &decl.property),
                before: decl.value.clone(),
                after: resolved.reference.clone(),
                base_confidence: BASE_ADVISORY,
                layout_sensitive: rule_context(rule, decl),
                ambiguous: false,
                preferred: snapshot.is_preferred(&resolved.token.name),
                contrast: None,
                resolved_color: None,
                guided: false,
            });
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Gradients
// ---------------------------------------------------------------------------

fn collect_gradients(
    parsed: &ParsedFragment,
    snapshot: &TokenSnapshot,
    guidance: &VisualGuidance,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    for (rule, decl) in editable_decls(parsed, guidance) {
        if !matches!(decl.property.as_str(), "background" | "background-image") {
            continue;
        }
        if decl.value.contains("var(") {
            continue;
        }
        if let Resolution::Match(resolved) = snapshot.resolve_gradient(&decl.value) {
            out.push(Candidate {
                kind: EditKind::GradientPreset,
                rule_id: "gradient-preset",
                start: decl.value_start,
                end: decl.value_end,
                anchor: anchor(&rule.selector, &decl.property),
                before: decl.value.clone(),
                after: resolved.reference.clone(),
                base_confidence: BASE_ADVISORY,
                layout_sensitive: rule_context(rule, decl),
                ambiguous: false,
                preferred: snapshot.is_preferred(&resolved.token.name),
                contrast: None,
                resolved_color: None,
                guided: false,
            });
        }
    }
    out
}

// ---------------------------------------------------------------------------
// State variants
// ---------------------------------------------------------------------------

/// Suggest `:hover` / `:active` variants for interactive-looking rules
/// that have none. Insert-only advisories: the span is empty and the
/// suggestion text carries the synthesized block.
fn collect_states(
    parsed: &ParsedFragment,
    snapshot: &TokenSnapshot,
    guidance: &VisualGuidance,
) -> Vec<Candidate> {
    let _ = snapshot;
    let all_selectors: Vec<&str> = parsed
        .sheets
        .iter()
        .flat_map(|s| s.rules.iter().map(|r| r.selector.as_str()))
        .collect();

    let mut out = Vec::new();
    for sheet in &parsed.sheets {
        for rule in &sheet.rules {
            if rule.in_keyframes || !guidance.allows_selector(&rule.selector) {
                continue;
            }
            if !is_plain_interactive_selector(&rule.selector) {
                continue;
            }
            let has_background = rule
                .decls
                .iter()
                .any(|d| matches!(d.property.as_str(), "background" | "background-color"));
            if !has_background {
                continue;
            }
            for (pseudo, effect) in [(":hover", "brightness(0.96)"), (":active", "brightness(0.92)")]
            {
                let variant = format!("{}{pseudo}", rule.selector);
                if all_selectors
                    .iter()
                    .any(|s| s.starts_with(&variant) || s.contains(pseudo) && s.contains(rule.selector.as_str()))
                {
                    continue;
                }
                out.push(Candidate {
                    kind: EditKind::StateVariant,
                    rule_id: "state-variant",
                    start: 0,
                    end: 0,
                    anchor: anchor(&rule.selector, pseudo),
                    before: String::new(),
                    after: format!("{variant} {{ filter: {effect}; }}"),
                    base_confidence: BASE_STATE,
                    layout_sensitive: false,
                    ambiguous: false,
                    preferred: false,
                    contrast: None,
                    resolved_color: None,
                    guided: false,
                });
            }
        }
    }
    out
}

/// Selectors that look like interactive component hooks: one simple class
/// or element, no pseudo-class, attribute, or combinator parts.
fn is_plain_interactive_selector(selector: &str) -> bool {
    !selector.is_empty()
        && !selector.contains([':', '[', '>', '+', '~', ',', ' ', '&', '@'])
        && INTERACTIVE_HINTS.iter().any(|hint| {
            selector.to_ascii_lowercase().contains(hint)
        })
}

const INTERACTIVE_HINTS: &[&str] = &["btn", "button", "link", "nav", "card", "cta", "chip", "tab"];

#[cfg(test)]
mod tests {
    use super::*;
    use agentic_design_core::{BrandPack, CodeType, Fragment, TokenSnapshot};
    use agentic_design_parsers::parse_fragment;

    fn snapshot() -> TokenSnapshot {
        let pack = BrandPack::from_json(
            "western-star",
            "2.1.0",
            &serde_json::json!({
                "colors": { "primary": "#1b3668", "surface": "#ffffff" },
                "spacing": { "md": "16px", "lg": "32px" },
                "radius": { "md": "6px" },
                "elevation": { "card": "0 4px 6px rgba(0, 0, 0, 0.1)" },
                "duration": { "fast": "150ms" },
                "easing": { "standard": "ease-in-out" },
                "font-size": { "body": "16px" },
                "font-family": { "sans": "Inter, system-ui, sans-serif" },
                "gradients": { "hero": "linear-gradient(135deg, #1b3668 0%, #2d4f8f 100%)" }
            }),
        )
        .unwrap();
        TokenSnapshot::compile(&pack, &serde_json::Map::new())
    }

    fn collect_stage(stage: Stage, code: &str, code_type: CodeType) -> Vec<Candidate> {
        let parsed = parse_fragment(&Fragment::new(code_type, code));
        collect(stage, &parsed, &snapshot(), &VisualGuidance::default())
    }

    #[test]
    fn colors_stage_proposes_exact_and_near() {
        let out = collect_stage(
            Stage::Colors,
            ".btn { color: #1B3668; border-color: #1b3670; }",
            CodeType::Css,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind, EditKind::ColorToken);
        assert_eq!(out[0].after, "var(--color-primary)");
        assert_eq!(out[1].kind, EditKind::ColorSuggestion);
    }

    #[test]
    fn spacing_stage_emits_one_combined_edit_for_shorthand() {
        let out = collect_stage(
            Stage::Spacing,
            ".card { padding: 16.5px 31px; }",
            CodeType::Css,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].after, "var(--spacing-md) var(--spacing-lg)");
    }

    #[test]
    fn spacing_stage_skips_partially_resolvable_shorthand() {
        let out = collect_stage(Stage::Spacing, ".card { padding: 16px 3px; }", CodeType::Css);
        assert!(out.is_empty());
    }

    #[test]
    fn tokenized_values_produce_no_candidates() {
        let out = collect_stage(
            Stage::Spacing,
            ".card { padding: var(--spacing-md); }",
            CodeType::Css,
        );
        assert!(out.is_empty());
        let out = collect_stage(Stage::Colors, ".a { color: var(--color-primary); }", CodeType::Css);
        assert!(out.is_empty());
    }

    #[test]
    fn important_marks_layout_sensitive() {
        let out = collect_stage(
            Stage::Spacing,
            ".x { margin: 16px !important; }",
            CodeType::Css,
        );
        assert_eq!(out.len(), 1);
        assert!(out[0].layout_sensitive);
    }

    #[test]
    fn contrast_check_is_attached_to_paired_colors() {
        let out = collect_stage(
            Stage::Colors,
            ".btn { color: #1b3668; background: #ffffff; }",
            CodeType::Css,
        );
        let color_edit = out.iter().find(|c| c.before == "#1b3668").unwrap();
        let check = color_edit.contrast.expect("contrast pair");
        assert!(check.pre > 4.5);
        // Exact token resolution keeps the rendered color identical.
        assert!((check.pre - check.post).abs() < 1e-9);
    }

    #[test]
    fn motion_shorthand_rewrites_duration_and_easing() {
        let out = collect_stage(
            Stage::Animations,
            ".a { transition: all 150ms ease-in-out; }",
            CodeType::Css,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].after,
            "all var(--duration-fast) var(--easing-standard)"
        );
        assert_eq!(out[0].kind, EditKind::AnimationToken);
    }

    #[test]
    fn gradient_preset_matches() {
        let out = collect_stage(
            Stage::Gradients,
            ".hero { background: linear-gradient(135deg, #1b3668 0%, #2d4f8f 100%); }",
            CodeType::Css,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].after, "var(--gradient-hero)");
    }

    #[test]
    fn state_stage_suggests_hover_for_interactive_rules() {
        let out = collect_stage(
            Stage::States,
            ".btn { background: #1b3668; }",
            CodeType::Css,
        );
        assert_eq!(out.len(), 2);
        assert!(out[0].after.contains(".btn:hover"));
        assert!(out[1].after.contains(".btn:active"));

        // Existing hover rule suppresses the suggestion.
        let out = collect_stage(
            Stage::States,
            ".btn { background: #1b3668; } .btn:hover { opacity: 0.9; }",
            CodeType::Css,
        );
        assert_eq!(out.len(), 1);
        assert!(out[0].after.contains(":active"));
    }

    #[test]
    fn utility_classes_resolve_through_the_table() {
        let out = collect_stage(
            Stage::Spacing,
            r#"<div className="p-4 m-1 flex" />"#,
            CodeType::Jsx,
        );
        // p-4 = 16px resolves to spacing-md; m-1 = 4px has no token; flex
        // is unmapped.
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].before, "p-4");
        assert_eq!(out[0].after, "p-[var(--spacing-md)]");
        assert_eq!(out[0].kind, EditKind::UtilityClass);
    }

    #[test]
    fn guidance_narrows_selector_scope() {
        let guidance = VisualGuidance {
            focus: vec![Stage::Spacing],
            target_selector: Some(".card".into()),
            adjustments: Vec::new(),
        };
        let parsed = parse_fragment(&Fragment::new(
            CodeType::Css,
            ".card { padding: 16px; } .other { margin: 16px; }",
        ));
        let out = collect(Stage::Spacing, &parsed, &snapshot(), &guidance);
        assert_eq!(out.len(), 1);
        assert!(out[0].anchor.contains(".card"));
    }

    #[test]
    fn guided_adjustment_supersedes_ordinary_candidate() {
        let guidance = VisualGuidance {
            focus: vec![Stage::Typography],
            target_selector: None,
            adjustments: vec![PropertyAdjustment {
                property: "font-size".into(),
                value: "16px".into(),
                selector: Some("body".into()),
            }],
        };
        let parsed = parse_fragment(&Fragment::new(
            CodeType::Css,
            "body { font-size: 12px; } h2 { font-size: 12px; }",
        ));
        let out = collect(Stage::Typography, &parsed, &snapshot(), &guidance);
        let guided: Vec<&Candidate> = out.iter().filter(|c| c.guided).collect();
        assert_eq!(guided.len(), 1);
        assert!(guided[0].anchor.contains("body"));
        // The 16px target resolves to the body type-scale token.
        assert_eq!(guided[0].after, "var(--font-size-body)");
        assert_eq!(guided[0].before, "12px");
    }
}
