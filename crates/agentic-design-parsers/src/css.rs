//! Byte-accurate CSS scanner.
//!
//! Produces selector rules with per-declaration value spans into the
//! original text; comments and whitespace are untouched (the engine
//! splices replacements by span, so everything it does not edit survives
//! verbatim). `@media`/`@supports`/`@container` bodies are recursed into;
//! `@keyframes` steps are flagged so the layout-safety confidence penalty
//! can apply. Rule bodies may nest (`&:hover { … }`), which is how tagged
//! CSS-in-JS template bodies parse. Unbalanced braces, unterminated
//! comments, and unterminated strings fail the whole parse — partial
//! parses are never emitted.

use agentic_design_core::{Diagnostic, DiagnosticKind};

use crate::{Declaration, StyleRule, StyleSheet};

/// Parse failure with the byte offset where scanning gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    pub message: String,
    pub offset: usize,
}

impl ParseIssue {
    #[must_use]
    pub fn into_diagnostic(self) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::ParseError,
            format!("{} at byte {}", self.message, self.offset),
        )
        .with_stage("parse")
    }
}

/// Parse a stylesheet region. `base` is the byte offset of `text` within
/// the enclosing fragment; all emitted spans are absolute.
pub fn parse_stylesheet(text: &str, base: usize) -> Result<StyleSheet, ParseIssue> {
    let mut scanner = Scanner::new(text, base);
    let mut sheet = StyleSheet::default();
    parse_rule_list(&mut scanner, false, &mut sheet.rules)?;
    scanner.skip_trivia()?;
    if !scanner.at_end() {
        return Err(scanner.error("unexpected closing brace"));
    }
    Ok(sheet)
}

/// Parse a bare declaration list (an inline `style=` attribute body).
pub fn parse_declarations(text: &str, base: usize) -> Result<Vec<Declaration>, ParseIssue> {
    let mut scanner = Scanner::new(text, base);
    let mut nested = Vec::new();
    let decls = parse_body(&mut scanner, BodyStop::EndOfInput, false, &mut nested)?;
    Ok(decls)
}

/// Parse an unbraced rule body under the given selector (a tagged
/// template literal body from CSS-in-JS). Top-level declarations attach
/// to `selector`; nested blocks keep their own selectors.
pub fn parse_rule_body(
    text: &str,
    base: usize,
    selector: &str,
) -> Result<Vec<StyleRule>, ParseIssue> {
    let mut scanner = Scanner::new(text, base);
    let mut rules = Vec::new();
    let decls = parse_body(&mut scanner, BodyStop::EndOfInput, false, &mut rules)?;
    if !decls.is_empty() {
        rules.insert(
            0,
            StyleRule {
                selector: selector.to_string(),
                decls,
                in_keyframes: false,
            },
        );
    }
    Ok(rules)
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

struct Scanner<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str, base: usize) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
            base,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn error(&self, message: &str) -> ParseIssue {
        ParseIssue {
            message: message.to_string(),
            offset: self.base + self.pos,
        }
    }

    /// Skip whitespace and `/* … */` comments.
    fn skip_trivia(&mut self) -> Result<(), ParseIssue> {
        loop {
            while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            if self.bytes[self.pos..].starts_with(b"/*") {
                let rest = &self.text[self.pos + 2..];
                match rest.find("*/") {
                    Some(end) => self.pos += 2 + end + 2,
                    None => return Err(self.error("unterminated comment")),
                }
            } else {
                return Ok(());
            }
        }
    }

    /// Skip a quoted string starting at `pos`.
    fn skip_string(&mut self, quote: u8) -> Result<(), ParseIssue> {
        self.pos += 1; // opening quote
        while let Some(b) = self.peek() {
            match b {
                b'\\' => self.pos = (self.pos + 2).min(self.bytes.len()),
                b if b == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => self.pos += 1,
            }
        }
        Err(self.error("unterminated string"))
    }
}

// ---------------------------------------------------------------------------
// Rule list (top level and grouping at-rules)
// ---------------------------------------------------------------------------

fn parse_rule_list(
    scanner: &mut Scanner<'_>,
    in_keyframes: bool,
    out: &mut Vec<StyleRule>,
) -> Result<(), ParseIssue> {
    loop {
        scanner.skip_trivia()?;
        if scanner.at_end() || scanner.peek() == Some(b'}') {
            return Ok(());
        }
        let prelude_start = scanner.pos;
        let terminator = scan_prelude(scanner)?;
        let selector = scanner.text[prelude_start..scanner.pos].trim().to_string();
        match terminator {
            Prelude::Statement => {
                // `@import …;` and friends: consume the semicolon, no rule.
                scanner.pos += 1;
            }
            Prelude::Block => {
                scanner.pos += 1; // '{'
                if let Some(at_name) = selector.strip_prefix('@') {
                    let name = at_name.split_whitespace().next().unwrap_or("");
                    if matches!(name, "media" | "supports" | "container" | "layer") {
                        parse_rule_list(scanner, in_keyframes, out)?;
                        expect_close(scanner)?;
                    } else if name.ends_with("keyframes") {
                        parse_rule_list(scanner, true, out)?;
                        expect_close(scanner)?;
                    } else {
                        // `@font-face`, `@page`: a declaration block.
                        push_rule_block(scanner, selector, in_keyframes, out)?;
                    }
                } else {
                    push_rule_block(scanner, selector, in_keyframes, out)?;
                }
            }
        }
    }
}

/// Parse a braced rule body (scanner just past `{`), pushing the parent
/// rule first and any nested rules after it.
fn push_rule_block(
    scanner: &mut Scanner<'_>,
    selector: String,
    in_keyframes: bool,
    out: &mut Vec<StyleRule>,
) -> Result<(), ParseIssue> {
    let mut nested = Vec::new();
    let decls = parse_body(scanner, BodyStop::CloseBrace, in_keyframes, &mut nested)?;
    if !decls.is_empty() {
        out.push(StyleRule {
            selector,
            decls,
            in_keyframes,
        });
    }
    out.append(&mut nested);
    Ok(())
}

enum Prelude {
    Block,
    Statement,
}

/// Scan a selector / at-rule prelude up to `{` or `;`.
fn scan_prelude(scanner: &mut Scanner<'_>) -> Result<Prelude, ParseIssue> {
    let mut paren_depth = 0usize;
    while let Some(b) = scanner.peek() {
        match b {
            b'{' if paren_depth == 0 => return Ok(Prelude::Block),
            b';' if paren_depth == 0 => return Ok(Prelude::Statement),
            b'}' => return Err(scanner.error("unexpected closing brace in selector")),
            b'(' => {
                paren_depth += 1;
                scanner.pos += 1;
            }
            b')' => {
                paren_depth = paren_depth.saturating_sub(1);
                scanner.pos += 1;
            }
            b'"' | b'\'' => scanner.skip_string(b)?,
            _ if scanner.bytes[scanner.pos..].starts_with(b"/*") => scanner.skip_trivia()?,
            _ => scanner.pos += 1,
        }
    }
    Err(scanner.error("unterminated rule prelude"))
}

fn expect_close(scanner: &mut Scanner<'_>) -> Result<(), ParseIssue> {
    scanner.skip_trivia()?;
    if scanner.peek() == Some(b'}') {
        scanner.pos += 1;
        Ok(())
    } else {
        Err(scanner.error("unbalanced block"))
    }
}

// ---------------------------------------------------------------------------
// Rule bodies: declarations plus nested rules
// ---------------------------------------------------------------------------

#[derive(PartialEq, Eq, Clone, Copy)]
enum BodyStop {
    /// Body ends at a matching `}` (which is consumed).
    CloseBrace,
    /// Body ends at end of input (template literal / attribute body).
    EndOfInput,
}

/// Scan a rule body: `prop: value;` declarations interleaved with nested
/// rule blocks. Nested rules land in `nested`; declarations are returned.
fn parse_body(
    scanner: &mut Scanner<'_>,
    stop: BodyStop,
    in_keyframes: bool,
    nested: &mut Vec<StyleRule>,
) -> Result<Vec<Declaration>, ParseIssue> {
    let mut decls = Vec::new();
    loop {
        scanner.skip_trivia()?;
        match scanner.peek() {
            None => {
                if stop == BodyStop::CloseBrace {
                    return Err(scanner.error("unbalanced block"));
                }
                return Ok(decls);
            }
            Some(b'}') => {
                if stop == BodyStop::CloseBrace {
                    scanner.pos += 1;
                    return Ok(decls);
                }
                return Err(scanner.error("unexpected closing brace"));
            }
            Some(b';') => {
                scanner.pos += 1;
                continue;
            }
            Some(_) => {}
        }

        let chunk_start = scanner.pos;
        let (terminator, colon) = scan_chunk(scanner)?;
        match terminator {
            Chunk::Nested => {
                let selector = scanner.text[chunk_start..scanner.pos].trim().to_string();
                scanner.pos += 1; // '{'
                push_rule_block(scanner, selector, in_keyframes, nested)?;
            }
            Chunk::End => {
                if let Some(colon_pos) = colon {
                    if let Some(decl) = build_declaration(scanner, chunk_start, colon_pos, scanner.pos)
                    {
                        decls.push(decl);
                    }
                }
                // Chunks without a colon (stray tokens) are skipped,
                // matching browser error recovery.
            }
        }
    }
}

enum Chunk {
    /// Stopped at `{`: the chunk is a nested rule prelude.
    Nested,
    /// Stopped at `;`, `}`, or end of input.
    End,
}

/// Advance over one body chunk, tracking the first top-level colon.
fn scan_chunk(scanner: &mut Scanner<'_>) -> Result<(Chunk, Option<usize>), ParseIssue> {
    let mut colon: Option<usize> = None;
    let mut paren_depth = 0usize;
    loop {
        match scanner.peek() {
            None => return Ok((Chunk::End, colon)),
            Some(b';' | b'}') if paren_depth == 0 => return Ok((Chunk::End, colon)),
            Some(b'{') if paren_depth == 0 => return Ok((Chunk::Nested, colon)),
            Some(b'(') => {
                paren_depth += 1;
                scanner.pos += 1;
            }
            Some(b')') => {
                paren_depth = paren_depth.saturating_sub(1);
                scanner.pos += 1;
            }
            Some(q @ (b'"' | b'\'')) => scanner.skip_string(q)?,
            Some(b':') if colon.is_none() && paren_depth == 0 => {
                colon = Some(scanner.pos);
                scanner.pos += 1;
            }
            Some(_) if scanner.bytes[scanner.pos..].starts_with(b"/*") => {
                scanner.skip_trivia()?;
            }
            Some(_) => scanner.pos += 1,
        }
    }
}

fn build_declaration(
    scanner: &Scanner<'_>,
    decl_start: usize,
    colon_pos: usize,
    decl_end: usize,
) -> Option<Declaration> {
    let property = scanner.text[decl_start..colon_pos].trim().to_ascii_lowercase();
    if property.is_empty() {
        return None;
    }
    let raw_value = &scanner.text[colon_pos + 1..decl_end];

    // Trim surrounding whitespace, tracking the span of what remains.
    let leading = raw_value.len() - raw_value.trim_start().len();
    let value_start = colon_pos + 1 + leading;
    let mut value_end = colon_pos + 1 + raw_value.trim_end().len();
    if value_end <= value_start {
        return None;
    }

    // Split off `!important`, keeping the span on the bare value.
    let mut value = &scanner.text[value_start..value_end];
    let mut important = false;
    let lower = value.to_ascii_lowercase();
    if let Some(stripped_len) = lower.strip_suffix("!important").map(str::len) {
        important = true;
        value_end = value_start + value[..stripped_len].trim_end().len();
        value = &scanner.text[value_start..value_end];
    }
    if value.is_empty() {
        return None;
    }

    Some(Declaration {
        property,
        value: value.to_string(),
        value_start: scanner.base + value_start,
        value_end: scanner.base + value_end,
        important,
        has_hole: value.contains('\u{0001}'),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_index_the_original_text() {
        let text = ".btn {\n  color: #1B3668;\n  padding: 16px 32px;\n}\n";
        let sheet = parse_stylesheet(text, 0).unwrap();
        assert_eq!(sheet.rules.len(), 1);
        let rule = &sheet.rules[0];
        assert_eq!(rule.selector, ".btn");
        assert_eq!(rule.decls.len(), 2);
        let color = &rule.decls[0];
        assert_eq!(color.property, "color");
        assert_eq!(&text[color.value_start..color.value_end], "#1B3668");
        let padding = &rule.decls[1];
        assert_eq!(&text[padding.value_start..padding.value_end], "16px 32px");
    }

    #[test]
    fn base_offset_shifts_spans() {
        let text = "p { margin: 8px; }";
        let sheet = parse_stylesheet(text, 100).unwrap();
        let decl = &sheet.rules[0].decls[0];
        assert_eq!(decl.value_start, 100 + text.find("8px").unwrap());
    }

    #[test]
    fn comments_and_strings_are_opaque() {
        let text = ".a /* { */ { content: \"};\"; color: red; }";
        let sheet = parse_stylesheet(text, 0).unwrap();
        let rule = &sheet.rules[0];
        assert_eq!(rule.decls.len(), 2);
        assert_eq!(rule.decls[0].value, "\"};\"");
        assert_eq!(rule.decls[1].value, "red");
    }

    #[test]
    fn important_is_stripped_and_flagged() {
        let text = ".x { margin: 16px !important; }";
        let sheet = parse_stylesheet(text, 0).unwrap();
        let decl = &sheet.rules[0].decls[0];
        assert!(decl.important);
        assert_eq!(decl.value, "16px");
        assert_eq!(&text[decl.value_start..decl.value_end], "16px");
    }

    #[test]
    fn media_blocks_are_recursed_keyframes_flagged() {
        let text = "@media (min-width: 768px) { .a { gap: 8px; } }\n\
                    @keyframes spin { from { transform: rotate(0deg); } }";
        let sheet = parse_stylesheet(text, 0).unwrap();
        assert_eq!(sheet.rules.len(), 2);
        assert_eq!(sheet.rules[0].selector, ".a");
        assert!(!sheet.rules[0].in_keyframes);
        assert_eq!(sheet.rules[1].selector, "from");
        assert!(sheet.rules[1].in_keyframes);
    }

    #[test]
    fn nested_rules_keep_their_own_selectors() {
        let text = ".card { padding: 16px; &:hover { background: #eee; } color: red; }";
        let sheet = parse_stylesheet(text, 0).unwrap();
        assert_eq!(sheet.rules.len(), 2);
        assert_eq!(sheet.rules[0].selector, ".card");
        assert_eq!(sheet.rules[0].decls.len(), 2);
        assert_eq!(sheet.rules[1].selector, "&:hover");
        assert_eq!(sheet.rules[1].decls[0].property, "background");
    }

    #[test]
    fn at_statements_are_skipped() {
        let text = "@import url(\"x.css\");\n.a { color: blue; }";
        let sheet = parse_stylesheet(text, 0).unwrap();
        assert_eq!(sheet.rules.len(), 1);
    }

    #[test]
    fn unbalanced_input_fails_whole() {
        assert!(parse_stylesheet(".a { color: red;", 0).is_err());
        assert!(parse_stylesheet(".a { color: red; } }", 0).is_err());
        assert!(parse_stylesheet(".a { /* never closed }", 0).is_err());
        assert!(parse_stylesheet(".a { content: \"oops; }", 0).is_err());
    }

    #[test]
    fn inline_declarations_parse_without_braces() {
        let text = "color: #fff; padding: 4px";
        let decls = parse_declarations(text, 0).unwrap();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[1].value, "4px");
    }

    #[test]
    fn rule_body_attaches_top_level_decls_to_selector() {
        let text = "\n  padding: 12px;\n  &:hover {\n    opacity: 0.8;\n  }\n";
        let rules = parse_rule_body(text, 0, "styled(Button)").unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].selector, "styled(Button)");
        assert_eq!(rules[0].decls[0].property, "padding");
        assert_eq!(rules[1].selector, "&:hover");
    }

    #[test]
    fn urls_with_colons_keep_single_property_split() {
        let text = ".a { background: url(https://example.com/x.png); }";
        let sheet = parse_stylesheet(text, 0).unwrap();
        let decl = &sheet.rules[0].decls[0];
        assert_eq!(decl.property, "background");
        assert!(decl.value.starts_with("url("));
    }
}
