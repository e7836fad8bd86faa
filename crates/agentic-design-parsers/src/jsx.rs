//! `className` expression walker for JSX/TSX fragments.
//!
//! Three supported forms:
//! - string literal: `className="p-4 text-gray-500"`
//! - template literal: `` className={`p-4 ${extra}`} `` (interpolation
//!   holes kept verbatim, never edited)
//! - ternary of the two: `className={active ? "bg-blue-600" : "bg-white"}`
//!   (each branch is its own site; the ternary structure is untouched)
//!
//! Tailwind-style utility classes map to brand-token equivalents through
//! the static table in [`utility_candidate`]; unmapped classes are left
//! intact.

use std::sync::LazyLock;

use regex::Regex;

use crate::{ClassSite, ClassToken, ParsedFragment};
use agentic_design_core::{Diagnostic, DiagnosticKind, TokenCategory};

static CLASS_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bclassName\s*=\s*").expect("className regex"));

/// Collect every `className` site in the fragment into `parsed`.
///
/// Whole-or-nothing: an unterminated literal fails the fragment.
pub fn parse_into(text: &str, parsed: &mut ParsedFragment) {
    let mut sites = Vec::new();
    for m in CLASS_ATTR.find_iter(text) {
        let at = m.end();
        match scan_expression(text, at) {
            Ok(mut found) => sites.append(&mut found),
            Err(offset) => {
                parsed.class_sites.clear();
                parsed.sheets.clear();
                parsed.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::ParseError,
                        format!("unterminated className expression at byte {offset}"),
                    )
                    .with_stage("parse"),
                );
                return;
            }
        }
    }
    parsed.class_sites.extend(sites);
}

/// Scan the expression following `className=`. Returns the class sites it
/// contains, or the byte offset of an unterminated literal.
fn scan_expression(text: &str, at: usize) -> Result<Vec<ClassSite>, usize> {
    let bytes = text.as_bytes();
    match bytes.get(at) {
        Some(b'"') | Some(b'\'') => {
            let quote = bytes[at];
            let site = scan_string_site(text, at, quote)?;
            Ok(vec![site])
        }
        Some(b'{') => {
            let close = find_matching_brace(text, at)?;
            let mut sites = Vec::new();
            collect_literal_sites(text, at + 1, close, &mut sites)?;
            Ok(sites)
        }
        _ => Ok(Vec::new()),
    }
}

/// Walk a braced expression, collecting every string/template literal at
/// any position (covers plain literals, both ternary branches, and
/// `cond && "x"` forms without caring about the surrounding operators).
fn collect_literal_sites(
    text: &str,
    start: usize,
    end: usize,
    sites: &mut Vec<ClassSite>,
) -> Result<(), usize> {
    let bytes = text.as_bytes();
    let mut i = start;
    while i < end {
        match bytes[i] {
            b'"' | b'\'' => {
                let site = scan_string_site(text, i, bytes[i])?;
                let consumed_to = site_end(text, i, bytes[i])?;
                if !site.classes.is_empty() {
                    sites.push(site);
                }
                i = consumed_to;
            }
            b'`' => {
                let (site, consumed_to) = scan_template_site(text, i)?;
                if !site.classes.is_empty() {
                    sites.push(site);
                }
                i = consumed_to;
            }
            _ => i += 1,
        }
    }
    Ok(())
}

/// Byte just past the closing quote of the string starting at `open`.
fn site_end(text: &str, open: usize, quote: u8) -> Result<usize, usize> {
    let bytes = text.as_bytes();
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(open)
}

fn scan_string_site(text: &str, open: usize, quote: u8) -> Result<ClassSite, usize> {
    let close = site_end(text, open, quote)? - 1;
    Ok(ClassSite {
        classes: split_classes(text, open + 1, close),
    })
}

/// Scan a template literal; classes come from the raw chunks between
/// `${…}` holes, which stay verbatim.
fn scan_template_site(text: &str, open: usize) -> Result<(ClassSite, usize), usize> {
    let bytes = text.as_bytes();
    let mut classes = Vec::new();
    let mut chunk_start = open + 1;
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => {
                classes.extend(split_classes(text, chunk_start, i));
                return Ok((ClassSite { classes }, i + 1));
            }
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                classes.extend(split_classes(text, chunk_start, i));
                let hole_close = find_matching_brace(text, i + 1)?;
                i = hole_close + 1;
                chunk_start = i;
            }
            _ => i += 1,
        }
    }
    Err(open)
}

/// Matching `}` for the `{` at `open`, skipping nested braces and strings.
fn find_matching_brace(text: &str, open: usize) -> Result<usize, usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
                i += 1;
            }
            q @ (b'"' | b'\'' | b'`') => {
                i = site_end(text, i, q)?;
            }
            b'\\' => i += 2,
            _ => i += 1,
        }
    }
    Err(open)
}

/// Split `text[start..end]` on whitespace into class tokens with absolute
/// spans.
fn split_classes(text: &str, start: usize, end: usize) -> Vec<ClassToken> {
    let mut out = Vec::new();
    let region = &text[start..end];
    let mut token_start: Option<usize> = None;
    for (i, c) in region.char_indices() {
        if c.is_whitespace() {
            if let Some(ts) = token_start.take() {
                out.push(ClassToken {
                    name: region[ts..i].to_string(),
                    start: start + ts,
                    end: start + i,
                });
            }
        } else if token_start.is_none() {
            token_start = Some(i);
        }
    }
    if let Some(ts) = token_start {
        out.push(ClassToken {
            name: region[ts..].to_string(),
            start: start + ts,
            end,
        });
    }
    out
}

// ---------------------------------------------------------------------------
// Utility class mapping table
// ---------------------------------------------------------------------------

/// What a utility class resolves through.
#[derive(Debug, Clone, PartialEq)]
pub struct UtilityCandidate {
    /// Utility prefix kept in the rewritten class (`p`, `bg`, `rounded`…).
    pub prefix: String,
    /// Token category the raw value resolves against.
    pub category: TokenCategory,
    /// Raw CSS value equivalent of the utility (`16px`, `#6b7280`…).
    pub css_value: String,
}

impl UtilityCandidate {
    /// Brand-token equivalent class, arbitrary-value syntax.
    #[must_use]
    pub fn replacement(&self, reference: &str) -> String {
        format!("{}-[{}]", self.prefix, reference)
    }
}

const SPACING_PREFIXES: &[&str] = &[
    "p", "px", "py", "pt", "pr", "pb", "pl", "m", "mx", "my", "mt", "mr", "mb", "ml", "gap",
    "gap-x", "gap-y", "space-x", "space-y",
];

const TEXT_SIZES: &[(&str, &str)] = &[
    ("xs", "12px"),
    ("sm", "14px"),
    ("base", "16px"),
    ("lg", "18px"),
    ("xl", "20px"),
    ("2xl", "24px"),
    ("3xl", "30px"),
    ("4xl", "36px"),
];

const ROUNDED: &[(&str, &str)] = &[
    ("rounded", "4px"),
    ("rounded-sm", "2px"),
    ("rounded-md", "6px"),
    ("rounded-lg", "8px"),
    ("rounded-xl", "12px"),
    ("rounded-2xl", "16px"),
    ("rounded-full", "9999px"),
];

const SHADOWS: &[(&str, &str)] = &[
    ("shadow-sm", "0 1px 2px rgba(0, 0, 0, 0.05)"),
    ("shadow", "0 1px 3px rgba(0, 0, 0, 0.1)"),
    ("shadow-md", "0 4px 6px rgba(0, 0, 0, 0.1)"),
    ("shadow-lg", "0 10px 15px rgba(0, 0, 0, 0.1)"),
    ("shadow-xl", "0 20px 25px rgba(0, 0, 0, 0.1)"),
];

/// Hex values for the palette shades the mapping table understands.
const PALETTE: &[(&str, &str)] = &[
    ("white", "#ffffff"),
    ("black", "#000000"),
    ("gray-100", "#f3f4f6"),
    ("gray-200", "#e5e7eb"),
    ("gray-300", "#d1d5db"),
    ("gray-400", "#9ca3af"),
    ("gray-500", "#6b7280"),
    ("gray-600", "#4b5563"),
    ("gray-700", "#374151"),
    ("gray-800", "#1f2937"),
    ("gray-900", "#111827"),
    ("red-500", "#ef4444"),
    ("red-600", "#dc2626"),
    ("green-500", "#22c55e"),
    ("green-600", "#16a34a"),
    ("blue-500", "#3b82f6"),
    ("blue-600", "#2563eb"),
    ("blue-700", "#1d4ed8"),
    ("indigo-600", "#4f46e5"),
    ("amber-500", "#f59e0b"),
];

/// Look up a Tailwind-style utility class in the static mapping table.
///
/// Returns `None` for unmapped classes (they pass through untouched).
#[must_use]
pub fn utility_candidate(class: &str) -> Option<UtilityCandidate> {
    // Radius and elevation utilities are fixed-name lookups.
    if let Some((_, value)) = ROUNDED.iter().find(|(name, _)| *name == class) {
        return Some(UtilityCandidate {
            prefix: "rounded".to_string(),
            category: TokenCategory::Radius,
            css_value: (*value).to_string(),
        });
    }
    if let Some((_, value)) = SHADOWS.iter().find(|(name, _)| *name == class) {
        return Some(UtilityCandidate {
            prefix: "shadow".to_string(),
            category: TokenCategory::Elevation,
            css_value: (*value).to_string(),
        });
    }

    let (prefix, suffix) = split_utility(class)?;

    // Spacing scale: n × 4px.
    if SPACING_PREFIXES.contains(&prefix) {
        let n: f64 = suffix.parse().ok()?;
        if !(0.0..=96.0).contains(&n) {
            return None;
        }
        return Some(UtilityCandidate {
            prefix: prefix.to_string(),
            category: TokenCategory::Spacing,
            css_value: format!("{}px", n * 4.0),
        });
    }

    // Type scale.
    if prefix == "text" {
        if let Some((_, value)) = TEXT_SIZES.iter().find(|(name, _)| *name == suffix) {
            return Some(UtilityCandidate {
                prefix: "text".to_string(),
                category: TokenCategory::FontSize,
                css_value: (*value).to_string(),
            });
        }
    }

    // Palette colors.
    if matches!(prefix, "text" | "bg" | "border") {
        if let Some((_, hex)) = PALETTE.iter().find(|(name, _)| *name == suffix) {
            return Some(UtilityCandidate {
                prefix: prefix.to_string(),
                category: TokenCategory::Color,
                css_value: (*hex).to_string(),
            });
        }
    }

    None
}

/// Split `gap-x-4` into `("gap-x", "4")`, preferring the longest known
/// compound prefix.
fn split_utility(class: &str) -> Option<(&str, &str)> {
    for prefix in SPACING_PREFIXES.iter().filter(|p| p.contains('-')) {
        if let Some(rest) = class.strip_prefix(prefix) {
            if let Some(suffix) = rest.strip_prefix('-') {
                return Some((prefix, suffix));
            }
        }
    }
    let dash = class.find('-')?;
    Some((&class[..dash], &class[dash + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentic_design_core::{CodeType, Fragment};

    fn parse(text: &str) -> ParsedFragment {
        crate::parse_fragment(&Fragment::new(CodeType::Jsx, text))
    }

    #[test]
    fn string_literal_classes_have_spans() {
        let src = r#"<button className="p-4 text-gray-500">Go</button>"#;
        let parsed = parse(src);
        assert_eq!(parsed.class_sites.len(), 1);
        let classes = &parsed.class_sites[0].classes;
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].name, "p-4");
        assert_eq!(&src[classes[0].start..classes[0].end], "p-4");
        assert_eq!(&src[classes[1].start..classes[1].end], "text-gray-500");
    }

    #[test]
    fn template_literal_holes_are_skipped() {
        let src = "const c = <div className={`p-4 ${extra} rounded-md`} />;";
        let parsed = parse(src);
        assert_eq!(parsed.class_sites.len(), 1);
        let names: Vec<&str> = parsed.class_sites[0]
            .classes
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, ["p-4", "rounded-md"]);
    }

    #[test]
    fn ternary_branches_are_separate_sites() {
        let src = r#"<a className={active ? "bg-blue-600 text-white" : "bg-white"} />"#;
        let parsed = parse(src);
        assert_eq!(parsed.class_sites.len(), 2);
        assert_eq!(parsed.class_sites[0].classes.len(), 2);
        assert_eq!(parsed.class_sites[1].classes[0].name, "bg-white");
    }

    #[test]
    fn unterminated_literal_fails_the_fragment() {
        let src = r#"<div className="p-4"#;
        let parsed = parse(src);
        assert!(parsed.parse_failed());
        assert!(parsed.class_sites.is_empty());
    }

    #[test]
    fn utility_table_maps_known_classes() {
        let c = utility_candidate("p-4").unwrap();
        assert_eq!(c.category, TokenCategory::Spacing);
        assert_eq!(c.css_value, "16px");
        assert_eq!(c.replacement("var(--spacing-md)"), "p-[var(--spacing-md)]");

        let c = utility_candidate("gap-x-2").unwrap();
        assert_eq!(c.prefix, "gap-x");
        assert_eq!(c.css_value, "8px");

        let c = utility_candidate("text-gray-500").unwrap();
        assert_eq!(c.category, TokenCategory::Color);
        assert_eq!(c.css_value, "#6b7280");

        let c = utility_candidate("text-sm").unwrap();
        assert_eq!(c.category, TokenCategory::FontSize);

        let c = utility_candidate("rounded-md").unwrap();
        assert_eq!(c.category, TokenCategory::Radius);
        assert_eq!(c.css_value, "6px");

        assert!(utility_candidate("flex").is_none());
        assert!(utility_candidate("hover:bg-blue-500").is_none());
        assert!(utility_candidate("text-unknown-999").is_none());
    }
}
