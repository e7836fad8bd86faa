//! Fragment parsers for the enhancement pipeline.
//!
//! One parser per code type, all emitting the same edit surface so the
//! transform engine stays code-type-agnostic:
//!
//! - [`css`] — declarative stylesheet scanner with byte-accurate value spans
//! - [`html`] — `<style>` block and inline `style=` attribute extraction,
//!   delegating to the CSS scanner with span offsets
//! - [`jsx`] — `className` expression walker (string / template / ternary)
//!   with the Tailwind-style utility mapping table
//! - [`css_in_js`] — ``styled.X`…` ``/``css`…` ``/`css({…})` detection with
//!   interpolation holes kept opaque
//!
//! Parsing is whole-or-nothing: on failure the caller gets the original
//! bytes back with an empty surface and a `parse-error` diagnostic. No
//! parser panics on malformed input.

#![forbid(unsafe_code)]

pub mod css;
pub mod css_in_js;
pub mod html;
pub mod jsx;
pub mod vendor;

use agentic_design_core::{CodeType, Diagnostic, DiagnosticKind, Fragment};

pub use vendor::is_vendor_path;

// ---------------------------------------------------------------------------
// Edit surface
// ---------------------------------------------------------------------------

/// One CSS declaration with a byte-accurate span for its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Lowercased property name.
    pub property: String,
    /// Value text with `!important` stripped.
    pub value: String,
    /// Absolute byte range of `value` within the fragment.
    pub value_start: usize,
    pub value_end: usize,
    pub important: bool,
    /// Value contains a JS interpolation hole; the engine must not touch it.
    pub has_hole: bool,
}

/// A selector block (or keyframe step / inline-style pseudo rule).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRule {
    pub selector: String,
    pub decls: Vec<Declaration>,
    /// Rule lives inside `@keyframes`; layout-safety penalty applies.
    pub in_keyframes: bool,
}

/// A parsed stylesheet region of the fragment (a whole CSS file, one
/// `<style>` block, one `style=` attribute, one tagged template body).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleSheet {
    pub rules: Vec<StyleRule>,
}

impl StyleSheet {
    /// Iterate all declarations across rules.
    pub fn declarations(&self) -> impl Iterator<Item = (&StyleRule, &Declaration)> {
        self.rules
            .iter()
            .flat_map(|r| r.decls.iter().map(move |d| (r, d)))
    }
}

/// One token inside a `className` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassToken {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

/// A `className` expression site (string literal, template literal, or one
/// branch of a ternary — each branch is its own site).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSite {
    pub classes: Vec<ClassToken>,
}

/// Uniform parse result the transform engine consumes.
///
/// Spans in `sheets` and `class_sites` index into `text`, which is the
/// unmodified fragment source.
#[derive(Debug, Clone, Default)]
pub struct ParsedFragment {
    pub code_type: Option<CodeType>,
    pub text: String,
    pub sheets: Vec<StyleSheet>,
    pub class_sites: Vec<ClassSite>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParsedFragment {
    /// Whether the fragment yielded any editable surface.
    #[must_use]
    pub fn has_surface(&self) -> bool {
        self.sheets.iter().any(|s| !s.rules.is_empty()) || !self.class_sites.is_empty()
    }

    #[must_use]
    pub fn parse_failed(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::ParseError)
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Parse a fragment according to its code type.
///
/// Never fails: a malformed fragment comes back with empty surface and a
/// `parse-error` diagnostic, leaving the orchestrator free to echo the
/// input untouched.
#[must_use]
pub fn parse_fragment(fragment: &Fragment) -> ParsedFragment {
    let mut parsed = ParsedFragment {
        code_type: Some(fragment.code_type),
        text: fragment.code.clone(),
        ..ParsedFragment::default()
    };

    match fragment.code_type {
        CodeType::Css => match css::parse_stylesheet(&fragment.code, 0) {
            Ok(sheet) => parsed.sheets.push(sheet),
            Err(issue) => parsed.diagnostics.push(issue.into_diagnostic()),
        },
        CodeType::Html => html::parse_into(&fragment.code, &mut parsed),
        CodeType::Jsx | CodeType::Tsx | CodeType::Js => {
            jsx::parse_into(&fragment.code, &mut parsed);
            if !parsed.parse_failed() {
                css_in_js::parse_into(&fragment.code, &mut parsed);
            }
        }
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_fragment_produces_one_sheet() {
        let fragment = Fragment::new(CodeType::Css, ".btn { color: #1b3668; }");
        let parsed = parse_fragment(&fragment);
        assert_eq!(parsed.sheets.len(), 1);
        assert!(parsed.has_surface());
        assert!(!parsed.parse_failed());
    }

    #[test]
    fn malformed_css_reports_parse_error_with_empty_surface() {
        let fragment = Fragment::new(CodeType::Css, ".btn { color: #1b3668;");
        let parsed = parse_fragment(&fragment);
        assert!(parsed.parse_failed());
        assert!(!parsed.has_surface());
        assert_eq!(parsed.text, ".btn { color: #1b3668;");
    }
}
