//! Brand token model and resolver tables.
//!
//! A [`BrandPack`] is an immutable, version-resolved bundle of design
//! tokens. Before any transform runs, the pack (plus project overrides) is
//! compiled into a [`TokenSnapshot`] — read-only lookup tables the rule
//! stages consult. Snapshots are published behind an `Arc` and swapped
//! atomically on brand-pack upgrade; in-flight transforms keep the snapshot
//! they started with.
//!
//! Matching semantics:
//! - Colors: exact equality after normalization. Near matches (RGB distance
//!   ≤ 48) surface as advisory candidates only.
//! - Lengths: `px`/`rem` accepted, converted at a 16px root; a candidate
//!   matches when the numeric distance is within 5% of the candidate. Two
//!   candidates inside tolerance is an ambiguity — no resolution.
//! - Shadows: structural equality per layer, 5% tolerance per numeric field.
//! - Durations: 5% tolerance in milliseconds.
//! - Easings: exact match after whitespace normalization.
//!
//! Resolution never errors on malformed input; it returns no match.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::color::{Rgba, parse_color};

/// Root font size for px ↔ rem conversion.
pub const REM_ROOT_PX: f64 = 16.0;

/// Numeric tolerance for length/shadow/duration matching (fraction of the
/// candidate value).
pub const MATCH_TOLERANCE: f64 = 0.05;

/// RGB distance ceiling for near-color advisory suggestions.
pub const NEAR_COLOR_DISTANCE: f64 = 48.0;

// =============================================================================
// Token categories and values
// =============================================================================

/// Category a brand token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenCategory {
    Color,
    Spacing,
    Radius,
    Elevation,
    FontSize,
    FontFamily,
    Duration,
    Easing,
    Gradient,
}

impl TokenCategory {
    /// CSS custom-property prefix for this category.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::Spacing => "spacing",
            Self::Radius => "radius",
            Self::Elevation => "elevation",
            Self::FontSize => "font-size",
            Self::FontFamily => "font-family",
            Self::Duration => "duration",
            Self::Easing => "easing",
            Self::Gradient => "gradient",
        }
    }
}

/// One layer of a box-shadow value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowLayer {
    pub inset: bool,
    pub x_px: f64,
    pub y_px: f64,
    pub blur_px: f64,
    pub spread_px: f64,
    pub color: Option<Rgba>,
}

/// One stop of a gradient value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub color: Rgba,
    /// Stop position as a percentage, when given.
    pub position_pct: Option<f64>,
}

/// Category-typed token value. The raw form is what matching runs against;
/// the symbolic reference is what gets written into rewritten code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TokenValue {
    Color(Rgba),
    /// Rational number of pixels at a 16px root.
    Length { px: f64 },
    Shadow(Vec<ShadowLayer>),
    FontStack(String),
    DurationMs(f64),
    Easing(String),
    Gradient(Vec<GradientStop>),
    /// Uninterpreted raw value kept for categories without structured
    /// matching (emitted verbatim in suggestions).
    Scalar(String),
}

/// A named design token within a brand pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandToken {
    pub category: TokenCategory,
    pub name: String,
    pub value: TokenValue,
    /// Raw source string the value was parsed from.
    pub raw: String,
}

impl BrandToken {
    /// Symbolic substitute written into rewritten code, e.g.
    /// `var(--color-primary)`.
    #[must_use]
    pub fn reference(&self) -> String {
        format!("var(--{})", self.css_name())
    }

    /// Custom-property name without the `--` sigil. Token names that
    /// already carry their category prefix are not double-prefixed.
    #[must_use]
    pub fn css_name(&self) -> String {
        let prefix = self.category.prefix();
        if self.name == prefix || self.name.starts_with(&format!("{prefix}-")) {
            self.name.clone()
        } else {
            format!("{prefix}-{}", self.name)
        }
    }
}

// =============================================================================
// Brand pack
// =============================================================================

/// Immutable, version-resolved bundle of design tokens.
///
/// Versioning is semantic: token additions bump patch, modifications minor,
/// removals major. A pack is always resolved to a concrete version before
/// it reaches the transform engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandPack {
    pub id: String,
    pub version: String,
    pub tokens: Vec<BrandToken>,
    /// Hash of the project override map in effect when this pack was
    /// compiled into a snapshot. Participates in the cache signature.
    #[serde(default)]
    pub overrides_hash: String,
}

impl BrandPack {
    /// Parse a brand pack from its JSON document form, where `tokens` maps
    /// category names to `{ name: raw-value }` objects.
    pub fn from_json(id: &str, version: &str, tokens: &serde_json::Value) -> crate::Result<Self> {
        let obj = tokens.as_object().ok_or_else(|| {
            crate::Error::InvalidInput("brand pack tokens must be an object".into())
        })?;
        let mut out = Vec::new();
        for (category_name, entries) in obj {
            let Some(category) = parse_category(category_name) else {
                continue;
            };
            let Some(entries) = entries.as_object() else {
                continue;
            };
            for (name, raw) in entries {
                let Some(raw) = raw.as_str() else { continue };
                if let Some(value) = parse_token_value(category, raw) {
                    out.push(BrandToken {
                        category,
                        name: name.clone(),
                        value,
                        raw: raw.to_string(),
                    });
                }
            }
        }
        Ok(Self {
            id: id.to_string(),
            version: version.to_string(),
            tokens: out,
            overrides_hash: String::new(),
        })
    }
}

fn parse_category(name: &str) -> Option<TokenCategory> {
    match name.trim().to_ascii_lowercase().as_str() {
        "color" | "colors" => Some(TokenCategory::Color),
        "spacing" => Some(TokenCategory::Spacing),
        "radius" | "radii" => Some(TokenCategory::Radius),
        "elevation" | "shadows" => Some(TokenCategory::Elevation),
        "font-size" | "fontsize" | "type-scale" => Some(TokenCategory::FontSize),
        "font-family" | "fontfamily" | "typography" => Some(TokenCategory::FontFamily),
        "duration" | "durations" => Some(TokenCategory::Duration),
        "easing" | "easings" => Some(TokenCategory::Easing),
        "gradient" | "gradients" => Some(TokenCategory::Gradient),
        _ => None,
    }
}

/// Parse a raw token value according to its category. Returns `None` when
/// the raw form cannot be interpreted (the token is skipped, not an error).
#[must_use]
pub fn parse_token_value(category: TokenCategory, raw: &str) -> Option<TokenValue> {
    match category {
        TokenCategory::Color => parse_color(raw).map(TokenValue::Color),
        TokenCategory::Spacing | TokenCategory::Radius | TokenCategory::FontSize => {
            parse_length_px(raw).map(|px| TokenValue::Length { px })
        }
        TokenCategory::Elevation => {
            let layers = parse_shadow(raw)?;
            Some(TokenValue::Shadow(layers))
        }
        TokenCategory::FontFamily => Some(TokenValue::FontStack(normalize_ws(raw))),
        TokenCategory::Duration => parse_duration_ms(raw).map(TokenValue::DurationMs),
        TokenCategory::Easing => Some(TokenValue::Easing(normalize_ws(raw))),
        TokenCategory::Gradient => parse_gradient(raw).map(TokenValue::Gradient),
    }
}

/// Parse `px`/`rem`/`em`/unitless lengths into pixels at a 16px root.
#[must_use]
pub fn parse_length_px(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if let Some(n) = raw.strip_suffix("px") {
        return n.trim().parse().ok();
    }
    if let Some(n) = raw.strip_suffix("rem") {
        return n.trim().parse::<f64>().ok().map(|v| v * REM_ROOT_PX);
    }
    if let Some(n) = raw.strip_suffix("em") {
        return n.trim().parse::<f64>().ok().map(|v| v * REM_ROOT_PX);
    }
    // Bare zero is valid CSS; other unitless lengths are not matched.
    if raw == "0" {
        return Some(0.0);
    }
    None
}

/// Parse `ms`/`s` durations into milliseconds.
#[must_use]
pub fn parse_duration_ms(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if let Some(n) = raw.strip_suffix("ms") {
        return n.trim().parse().ok();
    }
    if let Some(n) = raw.strip_suffix('s') {
        return n.trim().parse::<f64>().ok().map(|v| v * 1000.0);
    }
    None
}

/// Parse a (possibly multi-layer) `box-shadow` value.
#[must_use]
pub fn parse_shadow(raw: &str) -> Option<Vec<ShadowLayer>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return None;
    }
    let mut layers = Vec::new();
    for part in split_top_level_commas(raw) {
        layers.push(parse_shadow_layer(part.trim())?);
    }
    if layers.is_empty() { None } else { Some(layers) }
}

fn parse_shadow_layer(part: &str) -> Option<ShadowLayer> {
    let mut inset = false;
    let mut lengths: Vec<f64> = Vec::new();
    let mut color = None;
    for word in split_top_level_spaces(part) {
        if word.eq_ignore_ascii_case("inset") {
            inset = true;
        } else if let Some(px) = parse_length_px(word) {
            lengths.push(px);
        } else if let Some(c) = parse_color(word) {
            color = Some(c);
        } else {
            return None;
        }
    }
    if lengths.len() < 2 || lengths.len() > 4 {
        return None;
    }
    Some(ShadowLayer {
        inset,
        x_px: lengths[0],
        y_px: lengths[1],
        blur_px: lengths.get(2).copied().unwrap_or(0.0),
        spread_px: lengths.get(3).copied().unwrap_or(0.0),
        color,
    })
}

/// Parse a `linear-gradient(...)` into its color-stop list. The angle (or
/// direction keyword) is ignored for matching purposes.
#[must_use]
pub fn parse_gradient(raw: &str) -> Option<Vec<GradientStop>> {
    let raw = raw.trim();
    let lower = raw.to_ascii_lowercase();
    if !lower.starts_with("linear-gradient(") && !lower.starts_with("radial-gradient(") {
        return None;
    }
    let open = raw.find('(')?;
    let close = raw.rfind(')')?;
    let inner = &raw[open + 1..close];
    let mut stops = Vec::new();
    for part in split_top_level_commas(inner) {
        let part = part.trim();
        // Skip the direction segment (`to right`, `135deg`, `circle at ...`).
        if part.starts_with("to ")
            || part.ends_with("deg")
            || part.starts_with("circle")
            || part.starts_with("ellipse")
        {
            continue;
        }
        let mut color = None;
        let mut position = None;
        for word in split_top_level_spaces(part) {
            if let Some(pct) = word.strip_suffix('%') {
                position = pct.parse().ok();
            } else if let Some(c) = parse_color(word) {
                color = Some(c);
            }
        }
        stops.push(GradientStop {
            color: color?,
            position_pct: position,
        });
    }
    if stops.len() < 2 { None } else { Some(stops) }
}

/// Split on commas that are not nested inside parentheses.
fn split_top_level_commas(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Split a CSS value into space-separated components, treating
/// parenthesized groups (`rgba(…)`, `var(…)`) as single components.
#[must_use]
pub fn split_components(s: &str) -> Vec<&str> {
    split_top_level_spaces(s)
}

/// Split on whitespace that is not nested inside parentheses.
fn split_top_level_spaces(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    for (i, c) in s.char_indices() {
        match c {
            '(' => {
                depth += 1;
                if start.is_none() {
                    start = Some(i);
                }
            }
            ')' => depth = depth.saturating_sub(1),
            c if c.is_whitespace() && depth == 0 => {
                if let Some(st) = start.take() {
                    parts.push(&s[st..i]);
                }
            }
            _ => {
                if start.is_none() {
                    start = Some(i);
                }
            }
        }
    }
    if let Some(st) = start {
        parts.push(&s[st..]);
    }
    parts
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// =============================================================================
// Resolution
// =============================================================================

/// A successful token match.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedToken {
    pub token: BrandToken,
    /// `var(--…)` reference to substitute.
    pub reference: String,
}

/// Outcome of a resolution attempt. `Ambiguous` carries the tied candidate
/// names so the engine can apply the ambiguity confidence penalty.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Match(ResolvedToken),
    Ambiguous { candidates: Vec<String> },
    NoMatch,
}

impl Resolution {
    #[must_use]
    pub const fn as_match(&self) -> Option<&ResolvedToken> {
        match self {
            Self::Match(t) => Some(t),
            _ => None,
        }
    }
}

/// Immutable resolver tables compiled from a brand pack plus overrides.
///
/// Built once per (pack, overrides) pair; rule stages hold an `Arc` and the
/// registry swaps the pointer on upgrade.
#[derive(Debug, Default)]
pub struct TokenSnapshot {
    pub pack_id: String,
    pub pack_version: String,
    pub overrides_hash: String,
    tokens: Vec<BrandToken>,
    /// Token names the project overrides explicitly prefer.
    preferred: Vec<String>,
}

impl TokenSnapshot {
    #[must_use]
    pub fn compile(pack: &BrandPack, overrides: &serde_json::Map<String, serde_json::Value>) -> Self {
        let preferred = overrides
            .get("prefer")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            pack_id: pack.id.clone(),
            pack_version: pack.version.clone(),
            overrides_hash: pack.overrides_hash.clone(),
            tokens: pack.tokens.clone(),
            preferred,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    #[must_use]
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the project overrides explicitly prefer this token.
    #[must_use]
    pub fn is_preferred(&self, token_name: &str) -> bool {
        self.preferred.iter().any(|p| p == token_name)
    }

    fn in_category(&self, category: TokenCategory) -> impl Iterator<Item = &BrandToken> {
        self.tokens.iter().filter(move |t| t.category == category)
    }

    /// Exact color match after normalization.
    #[must_use]
    pub fn resolve_color(&self, raw: &str) -> Resolution {
        let Some(color) = parse_color(raw) else {
            return Resolution::NoMatch;
        };
        for token in self.in_category(TokenCategory::Color) {
            if let TokenValue::Color(c) = &token.value {
                if *c == color {
                    return Resolution::Match(ResolvedToken {
                        reference: token.reference(),
                        token: token.clone(),
                    });
                }
            }
        }
        Resolution::NoMatch
    }

    /// Nearest color inside the advisory distance, if any. Never used for
    /// auto-apply.
    #[must_use]
    pub fn near_color(&self, raw: &str) -> Option<(ResolvedToken, f64)> {
        let color = parse_color(raw)?;
        let mut best: Option<(&BrandToken, f64)> = None;
        for token in self.in_category(TokenCategory::Color) {
            if let TokenValue::Color(c) = &token.value {
                let d = c.distance(&color);
                if d <= NEAR_COLOR_DISTANCE && best.is_none_or(|(_, bd)| d < bd) {
                    best = Some((token, d));
                }
            }
        }
        best.map(|(token, d)| {
            (
                ResolvedToken {
                    reference: token.reference(),
                    token: token.clone(),
                },
                d,
            )
        })
    }

    /// Length resolution with the 5% tolerance and ambiguity guard.
    #[must_use]
    pub fn resolve_length(&self, raw: &str, category: TokenCategory) -> Resolution {
        let Some(px) = parse_length_px(raw) else {
            return Resolution::NoMatch;
        };
        let mut inside: Vec<(&BrandToken, f64)> = Vec::new();
        for token in self.in_category(category) {
            if let TokenValue::Length { px: tok_px } = &token.value {
                let tolerance = tok_px.abs() * MATCH_TOLERANCE;
                let dist = (px - tok_px).abs();
                // Zero-valued tokens only match exact zero.
                if (*tok_px == 0.0 && px == 0.0) || (*tok_px != 0.0 && dist <= tolerance) {
                    inside.push((token, dist));
                }
            }
        }
        match inside.len() {
            0 => Resolution::NoMatch,
            1 => Resolution::Match(ResolvedToken {
                reference: inside[0].0.reference(),
                token: inside[0].0.clone(),
            }),
            _ => Resolution::Ambiguous {
                candidates: inside.iter().map(|(t, _)| t.name.clone()).collect(),
            },
        }
    }

    /// Structural shadow match: layer count, inset flags, per-field 5%
    /// tolerance, and exact color equality.
    #[must_use]
    pub fn resolve_shadow(&self, raw: &str) -> Resolution {
        let Some(layers) = parse_shadow(raw) else {
            return Resolution::NoMatch;
        };
        let mut inside: Vec<&BrandToken> = Vec::new();
        for token in self.in_category(TokenCategory::Elevation) {
            if let TokenValue::Shadow(tok_layers) = &token.value {
                if shadow_matches(&layers, tok_layers) {
                    inside.push(token);
                }
            }
        }
        match inside.len() {
            0 => Resolution::NoMatch,
            1 => Resolution::Match(ResolvedToken {
                reference: inside[0].reference(),
                token: inside[0].clone(),
            }),
            _ => Resolution::Ambiguous {
                candidates: inside.iter().map(|t| t.name.clone()).collect(),
            },
        }
    }

    /// Duration resolution with the 5% tolerance.
    #[must_use]
    pub fn resolve_duration(&self, raw: &str) -> Resolution {
        let Some(ms) = parse_duration_ms(raw) else {
            return Resolution::NoMatch;
        };
        let mut inside: Vec<&BrandToken> = Vec::new();
        for token in self.in_category(TokenCategory::Duration) {
            if let TokenValue::DurationMs(tok_ms) = &token.value {
                if *tok_ms != 0.0 && (ms - tok_ms).abs() <= tok_ms.abs() * MATCH_TOLERANCE {
                    inside.push(token);
                }
            }
        }
        match inside.len() {
            0 => Resolution::NoMatch,
            1 => Resolution::Match(ResolvedToken {
                reference: inside[0].reference(),
                token: inside[0].clone(),
            }),
            _ => Resolution::Ambiguous {
                candidates: inside.iter().map(|t| t.name.clone()).collect(),
            },
        }
    }

    /// Exact easing match after whitespace normalization.
    #[must_use]
    pub fn resolve_easing(&self, raw: &str) -> Resolution {
        let needle = normalize_ws(raw);
        if needle.is_empty() {
            return Resolution::NoMatch;
        }
        for token in self.in_category(TokenCategory::Easing) {
            if let TokenValue::Easing(e) = &token.value {
                if *e == needle {
                    return Resolution::Match(ResolvedToken {
                        reference: token.reference(),
                        token: token.clone(),
                    });
                }
            }
        }
        Resolution::NoMatch
    }

    /// Structural gradient preset match: same stop count, exact stop
    /// colors, stop positions within 5 percentage points.
    #[must_use]
    pub fn resolve_gradient(&self, raw: &str) -> Resolution {
        let Some(stops) = parse_gradient(raw) else {
            return Resolution::NoMatch;
        };
        for token in self.in_category(TokenCategory::Gradient) {
            if let TokenValue::Gradient(tok_stops) = &token.value {
                if gradient_matches(&stops, tok_stops) {
                    return Resolution::Match(ResolvedToken {
                        reference: token.reference(),
                        token: token.clone(),
                    });
                }
            }
        }
        Resolution::NoMatch
    }

    /// Font-stack candidate for advisory typography suggestions: the first
    /// family in the raw stack appears in the token's stack.
    #[must_use]
    pub fn suggest_font_family(&self, raw: &str) -> Option<ResolvedToken> {
        let first = raw
            .split(',')
            .next()?
            .trim()
            .trim_matches(|c| c == '"' || c == '\'');
        if first.is_empty() {
            return None;
        }
        for token in self.in_category(TokenCategory::FontFamily) {
            if let TokenValue::FontStack(stack) = &token.value {
                if stack.to_ascii_lowercase().contains(&first.to_ascii_lowercase()) {
                    return Some(ResolvedToken {
                        reference: token.reference(),
                        token: token.clone(),
                    });
                }
            }
        }
        None
    }

    /// Type-scale candidate for a font-size literal (reuses length rules).
    #[must_use]
    pub fn resolve_font_size(&self, raw: &str) -> Resolution {
        self.resolve_length(raw, TokenCategory::FontSize)
    }
}

fn numeric_close(a: f64, b: f64) -> bool {
    if b == 0.0 {
        return a.abs() <= f64::EPSILON;
    }
    (a - b).abs() <= b.abs() * MATCH_TOLERANCE
}

fn shadow_matches(raw: &[ShadowLayer], tok: &[ShadowLayer]) -> bool {
    raw.len() == tok.len()
        && raw.iter().zip(tok).all(|(a, b)| {
            a.inset == b.inset
                && numeric_close(a.x_px, b.x_px)
                && numeric_close(a.y_px, b.y_px)
                && numeric_close(a.blur_px, b.blur_px)
                && numeric_close(a.spread_px, b.spread_px)
                && a.color == b.color
        })
}

fn gradient_matches(raw: &[GradientStop], tok: &[GradientStop]) -> bool {
    raw.len() == tok.len()
        && raw.iter().zip(tok).all(|(a, b)| {
            a.color == b.color
                && match (a.position_pct, b.position_pct) {
                    (Some(pa), Some(pb)) => (pa - pb).abs() <= 5.0,
                    (None, None) => true,
                    _ => false,
                }
        })
}

// =============================================================================
// Snapshot registry
// =============================================================================

/// Holds the published resolver snapshot. Readers clone the `Arc`; writers
/// swap the pointer, so in-flight transforms are never invalidated mid-run.
#[derive(Debug, Default)]
pub struct SnapshotRegistry {
    current: RwLock<Arc<TokenSnapshot>>,
}

impl SnapshotRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot (possibly empty when no brand pack is bound).
    #[must_use]
    pub fn load(&self) -> Arc<TokenSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish a new snapshot; readers pick it up on their next load.
    pub fn publish(&self, snapshot: TokenSnapshot) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack() -> BrandPack {
        BrandPack::from_json(
            "western-star",
            "2.1.0",
            &serde_json::json!({
                "colors": { "primary": "#1b3668", "surface": "#ffffff" },
                "spacing": { "md": "16px", "lg": "2rem" },
                "radius": { "sm": "4px" },
                "elevation": { "card": "0 1px 3px rgba(0, 0, 0, 0.2)" },
                "duration": { "fast": "150ms" },
                "easing": { "standard": "cubic-bezier(0.4, 0, 0.2, 1)" },
                "font-size": { "body": "16px", "h1": "32px" },
                "font-family": { "sans": "Inter, system-ui, sans-serif" },
                "gradients": { "hero": "linear-gradient(135deg, #1b3668 0%, #2d4f8f 100%)" }
            }),
        )
        .unwrap()
    }

    fn snapshot() -> TokenSnapshot {
        TokenSnapshot::compile(&pack(), &serde_json::Map::new())
    }

    #[test]
    fn color_resolves_exact_after_normalization() {
        let snap = snapshot();
        let resolved = snap.resolve_color("#1B3668");
        let m = resolved.as_match().expect("exact match");
        assert_eq!(m.reference, "var(--color-primary)");
        // rgb() form of the same color also matches.
        assert!(snap.resolve_color("rgb(27,54,104)").as_match().is_some());
        // A near-but-not-equal color does not.
        assert!(snap.resolve_color("#1b3669").as_match().is_none());
        assert!(snap.near_color("#1b3669").is_some());
    }

    #[test]
    fn length_tolerance_is_five_percent_of_candidate() {
        let snap = snapshot();
        // 16.5px is within 5% of 16px.
        assert!(snap
            .resolve_length("16.5px", TokenCategory::Spacing)
            .as_match()
            .is_some());
        // 31px is within 5% of 32px (2rem).
        let m = snap.resolve_length("31px", TokenCategory::Spacing);
        assert_eq!(m.as_match().unwrap().reference, "var(--spacing-lg)");
        // 17px is outside 5% of 16px.
        assert!(matches!(
            snap.resolve_length("17px", TokenCategory::Spacing),
            Resolution::NoMatch
        ));
        // rem input converts at the 16px root.
        assert!(snap
            .resolve_length("1rem", TokenCategory::Spacing)
            .as_match()
            .is_some());
    }

    #[test]
    fn ambiguity_guard_yields_no_resolution() {
        let mut pack = pack();
        pack.tokens.push(BrandToken {
            category: TokenCategory::Spacing,
            name: "md2".into(),
            value: TokenValue::Length { px: 16.1 },
            raw: "16.1px".into(),
        });
        let snap = TokenSnapshot::compile(&pack, &serde_json::Map::new());
        match snap.resolve_length("16.05px", TokenCategory::Spacing) {
            Resolution::Ambiguous { candidates } => {
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn shadow_structural_match_within_tolerance() {
        let snap = snapshot();
        assert!(snap
            .resolve_shadow("0 1px 3px rgba(0,0,0,0.2)")
            .as_match()
            .is_some());
        // Blur off by 2% still matches; off by 40% does not.
        assert!(snap
            .resolve_shadow("0 1px 3.05px rgba(0,0,0,0.2)")
            .as_match()
            .is_some());
        assert!(snap
            .resolve_shadow("0 1px 4.2px rgba(0,0,0,0.2)")
            .as_match()
            .is_none());
        // Different alpha is a different color.
        assert!(snap
            .resolve_shadow("0 1px 3px rgba(0,0,0,0.5)")
            .as_match()
            .is_none());
    }

    #[test]
    fn duration_and_easing_resolve() {
        let snap = snapshot();
        assert!(snap.resolve_duration("150ms").as_match().is_some());
        assert!(snap.resolve_duration("0.15s").as_match().is_some());
        assert!(snap.resolve_duration("200ms").as_match().is_none());
        assert!(snap
            .resolve_easing("cubic-bezier(0.4, 0, 0.2, 1)")
            .as_match()
            .is_some());
        assert!(snap.resolve_easing("ease-in").as_match().is_none());
    }

    #[test]
    fn gradient_preset_matches_structurally() {
        let snap = snapshot();
        let m = snap.resolve_gradient("linear-gradient(135deg, #1b3668 0%, #2d4f8f 100%)");
        assert_eq!(m.as_match().unwrap().reference, "var(--gradient-hero)");
        // Angle differences do not matter; stop colors do.
        assert!(snap
            .resolve_gradient("linear-gradient(90deg, #1b3668 0%, #2d4f8f 100%)")
            .as_match()
            .is_some());
        assert!(snap
            .resolve_gradient("linear-gradient(135deg, #000000 0%, #2d4f8f 100%)")
            .as_match()
            .is_none());
    }

    #[test]
    fn css_name_does_not_double_prefix() {
        let token = BrandToken {
            category: TokenCategory::Spacing,
            name: "spacing-md".into(),
            value: TokenValue::Length { px: 16.0 },
            raw: "16px".into(),
        };
        assert_eq!(token.reference(), "var(--spacing-md)");
    }

    #[test]
    fn override_preference_is_visible() {
        let mut overrides = serde_json::Map::new();
        overrides.insert("prefer".into(), serde_json::json!(["md"]));
        let snap = TokenSnapshot::compile(&pack(), &overrides);
        assert!(snap.is_preferred("md"));
        assert!(!snap.is_preferred("lg"));
    }

    #[test]
    fn registry_swaps_snapshots_atomically() {
        let registry = SnapshotRegistry::new();
        assert!(registry.load().is_empty());
        registry.publish(snapshot());
        let held = registry.load();
        assert_eq!(held.pack_version, "2.1.0");
        // A reader holding the old Arc is unaffected by a publish.
        registry.publish(TokenSnapshot::default());
        assert_eq!(held.pack_version, "2.1.0");
        assert!(registry.load().is_empty());
    }
}
