//! HTML fragment support: `<style>` block extraction and inline `style=`
//! attributes.
//!
//! The containing document is never rewritten structurally — each embedded
//! CSS region parses with its absolute byte offset, so edits splice
//! straight back into the original markup. Inline attributes parse as a
//! one-rule declaration list under the `[inline-style]` pseudo selector.

use std::sync::LazyLock;

use regex::Regex;

use crate::{ParsedFragment, StyleRule, StyleSheet, css};

static STYLE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<style\b[^>]*>(.*?)</style\s*>").expect("style block regex")
});

static STYLE_ATTR_DQ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bstyle\s*=\s*"([^"]*)""#).expect("style attr regex"));

static STYLE_ATTR_SQ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bstyle\s*=\s*'([^']*)'").expect("style attr regex"));

/// Selector used for inline `style=` attribute pseudo rules.
pub const INLINE_STYLE_SELECTOR: &str = "[inline-style]";

/// Extract every embedded CSS region of an HTML document into `parsed`.
///
/// Whole-or-nothing: if any `<style>` block fails to parse, the fragment
/// surfaces nothing and carries a single `parse-error` diagnostic.
pub fn parse_into(text: &str, parsed: &mut ParsedFragment) {
    let mut sheets = Vec::new();

    for caps in STYLE_BLOCK.captures_iter(text) {
        let inner = caps.get(1).expect("style block capture");
        match css::parse_stylesheet(inner.as_str(), inner.start()) {
            Ok(sheet) => sheets.push(sheet),
            Err(issue) => {
                parsed.sheets.clear();
                parsed.diagnostics.push(issue.into_diagnostic());
                return;
            }
        }
    }

    let mut inline_rules = Vec::new();
    for caps in STYLE_ATTR_DQ
        .captures_iter(text)
        .chain(STYLE_ATTR_SQ.captures_iter(text))
    {
        let inner = caps.get(1).expect("style attr capture");
        if inside_any_style_block(text, inner.start()) {
            continue;
        }
        match css::parse_declarations(inner.as_str(), inner.start()) {
            Ok(decls) if !decls.is_empty() => inline_rules.push(StyleRule {
                selector: INLINE_STYLE_SELECTOR.to_string(),
                decls,
                in_keyframes: false,
            }),
            // A malformed attribute is skipped rather than failing the
            // document; the attribute grammar is too loose to be strict.
            _ => {}
        }
    }
    if !inline_rules.is_empty() {
        sheets.push(StyleSheet {
            rules: inline_rules,
        });
    }

    parsed.sheets.extend(sheets);
}

/// Whether `offset` falls inside a `<style>` block (those bytes belong to
/// the stylesheet scanner, not the attribute scanner).
fn inside_any_style_block(text: &str, offset: usize) -> bool {
    STYLE_BLOCK.captures_iter(text).any(|caps| {
        let inner = caps.get(1).expect("style block capture");
        inner.range().contains(&offset)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentic_design_core::{CodeType, Fragment};

    fn parse(text: &str) -> ParsedFragment {
        crate::parse_fragment(&Fragment::new(CodeType::Html, text))
    }

    #[test]
    fn style_blocks_parse_with_absolute_spans() {
        let html = "<html><head><style>\n.btn { color: #1b3668; }\n</style></head>\
                    <body><style>p { margin: 8px; }</style></body></html>";
        let parsed = parse(html);
        assert_eq!(parsed.sheets.len(), 2);
        let decl = &parsed.sheets[0].rules[0].decls[0];
        assert_eq!(&html[decl.value_start..decl.value_end], "#1b3668");
        let decl = &parsed.sheets[1].rules[0].decls[0];
        assert_eq!(&html[decl.value_start..decl.value_end], "8px");
    }

    #[test]
    fn inline_style_attributes_become_pseudo_rules() {
        let html = r#"<div style="padding: 16px; color: #fff">x</div>"#;
        let parsed = parse(html);
        assert_eq!(parsed.sheets.len(), 1);
        let rule = &parsed.sheets[0].rules[0];
        assert_eq!(rule.selector, INLINE_STYLE_SELECTOR);
        assert_eq!(rule.decls.len(), 2);
        assert_eq!(&html[rule.decls[0].value_start..rule.decls[0].value_end], "16px");
    }

    #[test]
    fn broken_style_block_fails_the_fragment() {
        let html = "<style>.a { color: red;</style><div style=\"margin: 4px\"></div>";
        let parsed = parse(html);
        assert!(parsed.parse_failed());
        assert!(!parsed.has_surface());
    }

    #[test]
    fn html_without_css_has_no_surface() {
        let parsed = parse("<p>hello</p>");
        assert!(!parsed.has_surface());
        assert!(!parsed.parse_failed());
    }
}
