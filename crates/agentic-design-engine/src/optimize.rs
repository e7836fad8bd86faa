//! Opt-in CSS optimization stage.
//!
//! Level 1 compacts whitespace and strips comments; level 2 additionally
//! merges duplicate declarations (last wins) and collapses four-side
//! margin/padding longhands into the shorthand. Both levels are
//! idempotent: optimizing an already-optimized sheet is a no-op.

use agentic_design_parsers::css;

use crate::policy::OptimizationLevel;

/// Optimize a CSS fragment. Returns `None` when the text cannot be parsed
/// (the engine then skips the stage rather than risking corruption).
#[must_use]
pub fn optimize_css(text: &str, level: OptimizationLevel) -> Option<String> {
    match level {
        OptimizationLevel::Basic => Some(compact(text)),
        OptimizationLevel::Aggressive => regenerate(text),
    }
}

/// Whitespace compaction + comment removal, string-safe.
fn compact(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0usize;
    let mut pending_space = false;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                // Comment: drop it, treat as a separator.
                match text[i + 2..].find("*/") {
                    Some(end) => i += 2 + end + 2,
                    None => break,
                }
                pending_space = true;
            }
            b'"' | b'\'' => {
                flush_space(&mut out, pending_space);
                pending_space = false;
                let start = i;
                i += 1;
                while i < bytes.len() {
                    match bytes[i] {
                        b'\\' => i += 2,
                        q if q == b => {
                            i += 1;
                            break;
                        }
                        _ => i += 1,
                    }
                }
                out.push_str(&text[start..i.min(text.len())]);
            }
            _ if b.is_ascii_whitespace() => {
                pending_space = true;
                i += 1;
            }
            _ => {
                // Separators absorb surrounding whitespace entirely.
                let is_separator = matches!(b, b'{' | b'}' | b':' | b';' | b',' | b'(' | b')');
                let prev_is_separator = out
                    .as_bytes()
                    .last()
                    .is_some_and(|p| matches!(p, b'{' | b'}' | b':' | b';' | b',' | b'('));
                if is_separator || prev_is_separator {
                    pending_space = false;
                }
                flush_space(&mut out, pending_space);
                pending_space = false;
                out.push(b as char);
                i += 1;
            }
        }
    }
    out.trim().to_string()
}

fn flush_space(out: &mut String, pending: bool) {
    if pending && !out.is_empty() {
        out.push(' ');
    }
}

/// Parse and re-print with duplicate-declaration merge and four-side
/// shorthand collapsing. Comments do not survive regeneration.
fn regenerate(text: &str) -> Option<String> {
    let sheet = css::parse_stylesheet(text, 0).ok()?;
    let mut out = String::with_capacity(text.len());
    for rule in &sheet.rules {
        // Last declaration wins; earlier duplicates are dropped.
        let mut seen: Vec<(String, String, bool)> = Vec::new();
        for decl in &rule.decls {
            let entry = (
                decl.property.clone(),
                decl.value.clone(),
                decl.important,
            );
            if let Some(existing) = seen.iter_mut().find(|(p, _, _)| *p == decl.property) {
                *existing = entry;
            } else {
                seen.push(entry);
            }
        }
        collapse_sides(&mut seen, "margin");
        collapse_sides(&mut seen, "padding");
        if seen.is_empty() {
            continue;
        }
        out.push_str(&rule.selector);
        out.push('{');
        for (property, value, important) in &seen {
            out.push_str(property);
            out.push(':');
            out.push_str(value);
            if *important {
                out.push_str(" !important");
            }
            out.push(';');
        }
        out.push('}');
    }
    Some(out)
}

/// Replace `X-top/right/bottom/left` with the `X` shorthand when all four
/// are present and none is `!important`.
fn collapse_sides(decls: &mut Vec<(String, String, bool)>, base: &str) {
    let sides = ["top", "right", "bottom", "left"];
    let mut values = Vec::with_capacity(4);
    for side in sides {
        let name = format!("{base}-{side}");
        match decls.iter().find(|(p, _, imp)| *p == name && !imp) {
            Some((_, value, _)) => values.push(value.clone()),
            None => return,
        }
    }
    let insert_at = decls
        .iter()
        .position(|(p, _, _)| p.starts_with(base))
        .unwrap_or(decls.len());
    decls.retain(|(p, _, _)| !(p.starts_with(&format!("{base}-"))));
    decls.insert(insert_at.min(decls.len()), (base.to_string(), values.join(" "), false));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_compaction_is_idempotent() {
        let input = "/* header */\n.btn  {\n  color :  red ;\n}\n\n.a { margin: 0 ; }";
        let once = optimize_css(input, OptimizationLevel::Basic).unwrap();
        assert_eq!(once, ".btn{color:red;}.a{margin:0;}");
        let twice = optimize_css(&once, OptimizationLevel::Basic).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn strings_survive_compaction() {
        let input = ".a { content: \"a  b\"; }";
        let out = optimize_css(input, OptimizationLevel::Basic).unwrap();
        assert!(out.contains("\"a  b\""));
    }

    #[test]
    fn aggressive_merges_duplicates_last_wins() {
        let input = ".a { color: red; color: blue; }";
        let out = optimize_css(input, OptimizationLevel::Aggressive).unwrap();
        assert_eq!(out, ".a{color:blue;}");
    }

    #[test]
    fn aggressive_collapses_four_side_longhands() {
        let input = ".a { margin-top: 1px; margin-right: 2px; margin-bottom: 3px; margin-left: 4px; }";
        let out = optimize_css(input, OptimizationLevel::Aggressive).unwrap();
        assert_eq!(out, ".a{margin:1px 2px 3px 4px;}");
        // Idempotent: re-running changes nothing.
        let again = optimize_css(&out, OptimizationLevel::Aggressive).unwrap();
        assert_eq!(out, again);
    }

    #[test]
    fn aggressive_returns_none_on_unparseable_input() {
        assert!(optimize_css(".a { color: red;", OptimizationLevel::Aggressive).is_none());
    }
}
