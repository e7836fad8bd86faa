//! CSS-in-JS detection: ``styled.X`…` ``, ``styled(Comp)`…` ``, ``css`…` ``
//! tagged templates and `css({…})` object literals.
//!
//! Template bodies parse through the CSS scanner with nested-rule support.
//! JS interpolation holes (`${…}`) are replaced by same-length `\u{1}`
//! filler before scanning, so spans stay byte-accurate against the
//! original source; any declaration whose value touches a hole is flagged
//! `has_hole` and the engine refuses to cross it.

use std::sync::LazyLock;

use regex::Regex;

use crate::{Declaration, ParsedFragment, StyleRule, StyleSheet, css};
use agentic_design_core::{Diagnostic, DiagnosticKind};

static TEMPLATE_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(styled\s*\.\s*[A-Za-z_]\w*|styled\s*\(\s*[A-Za-z_][\w.]*\s*\)|css)\s*")
        .expect("template head regex")
});

static OBJECT_HEAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bcss\s*\(\s*\{").expect("css object regex"));

static OBJECT_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_$][\w$]*)\s*:\s*(?:"([^"\\]*)"|'([^'\\]*)')"#).expect("object entry regex")
});

/// Collect every CSS-in-JS region of a script fragment into `parsed`.
pub fn parse_into(text: &str, parsed: &mut ParsedFragment) {
    for caps in TEMPLATE_HEAD.captures_iter(text) {
        let head = caps.get(1).expect("head capture");
        let at = caps.get(0).expect("full match").end();
        if text.as_bytes().get(at) != Some(&b'`') {
            continue;
        }
        let Some(body_end) = template_end(text, at) else {
            parsed.sheets.clear();
            parsed.class_sites.clear();
            parsed.diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::ParseError,
                    format!("unterminated template literal at byte {at}"),
                )
                .with_stage("parse"),
            );
            return;
        };
        let body_start = at + 1;
        let sanitized = sanitize_holes(&text[body_start..body_end]);
        let label = normalize_head(head.as_str());
        match css::parse_rule_body(&sanitized, body_start, &label) {
            Ok(rules) if !rules.is_empty() => parsed.sheets.push(StyleSheet { rules }),
            Ok(_) => {}
            Err(issue) => {
                parsed.sheets.clear();
                parsed.class_sites.clear();
                parsed.diagnostics.push(issue.into_diagnostic());
                return;
            }
        }
    }

    for m in OBJECT_HEAD.find_iter(text) {
        let open = m.end() - 1;
        let Some(close) = matching_brace(text, open) else {
            continue;
        };
        let rules = object_rules(text, open + 1, close);
        if !rules.is_empty() {
            parsed.sheets.push(StyleSheet { rules });
        }
    }
}

/// Byte offset of the closing backtick for the template opening at `open`.
fn template_end(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return Some(i),
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                i = matching_brace(text, i + 1)? + 1;
            }
            _ => i += 1,
        }
    }
    None
}

/// Matching `}` for the `{` at `open`, skipping nested braces and strings.
fn matching_brace(text: &str, open: usize) -> Option<usize> {
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
                    return Some(i);
                }
                i += 1;
            }
            q @ (b'"' | b'\'' | b'`') => {
                i += 1;
                while i < bytes.len() {
                    match bytes[i] {
                        b'\\' => i += 2,
                        b if b == q => {
                            i += 1;
                            break;
                        }
                        _ => i += 1,
                    }
                }
            }
            _ => i += 1,
        }
    }
    None
}

/// Replace each `${…}` hole with same-length `\u{1}` filler so the CSS
/// scanner sees a placeholder it will never match, at identical offsets.
fn sanitize_holes(body: &str) -> String {
    let bytes = body.as_bytes();
    let mut out = body.to_string();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                let Some(close) = matching_brace(body, i + 1) else {
                    break;
                };
                let filler: String = "\u{1}".repeat(close + 1 - i);
                out.replace_range(i..=close, &filler);
                i = close + 1;
            }
            _ => i += 1,
        }
    }
    out
}

fn normalize_head(head: &str) -> String {
    head.split_whitespace().collect()
}

/// Selector used for `css({…})` object-literal pseudo rules.
pub const CSS_OBJECT_SELECTOR: &str = "css-object";

/// Extract `camelCaseKey: "value"` entries from a `css({…})` object body.
/// Only string values are editable (a token reference cannot be spliced
/// into a numeric literal), so numbers are skipped.
fn object_rules(text: &str, start: usize, end: usize) -> Vec<StyleRule> {
    let region = &text[start..end];
    let mut decls = Vec::new();
    for caps in OBJECT_ENTRY.captures_iter(region) {
        let key = caps.get(1).expect("key capture");
        let value = caps.get(2).or_else(|| caps.get(3)).expect("value capture");
        let value_text = value.as_str().trim();
        if value_text.is_empty() {
            continue;
        }
        decls.push(Declaration {
            property: camel_to_kebab(key.as_str()),
            value: value_text.to_string(),
            value_start: start + value.start(),
            value_end: start + value.end(),
            important: false,
            has_hole: false,
        });
    }
    if decls.is_empty() {
        Vec::new()
    } else {
        vec![StyleRule {
            selector: CSS_OBJECT_SELECTOR.to_string(),
            decls,
            in_keyframes: false,
        }]
    }
}

fn camel_to_kebab(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentic_design_core::{CodeType, Fragment};

    fn parse(text: &str) -> ParsedFragment {
        crate::parse_fragment(&Fragment::new(CodeType::Tsx, text))
    }

    #[test]
    fn styled_template_body_parses_with_nested_rules() {
        let src = "const Button = styled.button`\n  padding: 16px;\n  color: #1b3668;\n  &:hover { opacity: 0.9; }\n`;";
        let parsed = parse(src);
        assert_eq!(parsed.sheets.len(), 1);
        let rules = &parsed.sheets[0].rules;
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].selector, "styled.button");
        let padding = &rules[0].decls[0];
        assert_eq!(&src[padding.value_start..padding.value_end], "16px");
        assert_eq!(rules[1].selector, "&:hover");
    }

    #[test]
    fn interpolation_holes_are_opaque() {
        let src = "const S = css`\n  margin: ${props => props.m}px;\n  padding: 8px;\n`;";
        let parsed = parse(src);
        assert_eq!(parsed.sheets.len(), 1);
        let rule = &parsed.sheets[0].rules[0];
        let margin = rule.decls.iter().find(|d| d.property == "margin").unwrap();
        assert!(margin.has_hole);
        let padding = rule.decls.iter().find(|d| d.property == "padding").unwrap();
        assert!(!padding.has_hole);
        assert_eq!(&src[padding.value_start..padding.value_end], "8px");
    }

    #[test]
    fn css_object_form_maps_camel_case_keys() {
        let src = r##"const s = css({ backgroundColor: "#ffffff", padding: "16px", zIndex: 2 });"##;
        let parsed = parse(src);
        assert_eq!(parsed.sheets.len(), 1);
        let rule = &parsed.sheets[0].rules[0];
        assert_eq!(rule.selector, CSS_OBJECT_SELECTOR);
        assert_eq!(rule.decls.len(), 2);
        assert_eq!(rule.decls[0].property, "background-color");
        assert_eq!(&src[rule.decls[0].value_start..rule.decls[0].value_end], "#ffffff");
    }

    #[test]
    fn styled_call_form_is_detected() {
        let src = "const X = styled(Card)`\n  border-radius: 4px;\n`;";
        let parsed = parse(src);
        assert_eq!(parsed.sheets.len(), 1);
        assert_eq!(parsed.sheets[0].rules[0].selector, "styled(Card)");
    }

    #[test]
    fn unterminated_template_fails_the_fragment() {
        let src = "const S = css`margin: 4px;";
        let parsed = parse(src);
        assert!(parsed.parse_failed());
        assert!(!parsed.has_surface());
    }
}
