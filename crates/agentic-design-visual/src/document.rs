//! Fragment → renderable HTML document wrapping.
//!
//! Screenshots are taken of a minimal, self-contained document: HTML
//! fragments are embedded (or used whole when they already carry an
//! `<html>` element), CSS fragments are attached to a neutral preview
//! shell so their rules have something to style. Script fragments are not
//! renderable server-side; callers get the preview shell with the code
//! listed, which the critic scores as a degenerate case.

use agentic_design_core::{CodeType, Fragment, Viewport};

/// Neutral markup styled by bare CSS fragments.
const CSS_PREVIEW_BODY: &str = r#"<div class="preview">
  <h1>Heading</h1>
  <p>Body copy for contrast and rhythm checks.</p>
  <button class="btn">Primary action</button>
  <div class="card">Card content</div>
</div>"#;

/// Wrap a fragment into a complete HTML document for capture.
#[must_use]
pub fn wrap_fragment(fragment: &Fragment, viewport: Viewport) -> String {
    let lower = fragment.code.to_ascii_lowercase();
    if fragment.code_type == CodeType::Html && lower.contains("<html") {
        return fragment.code.clone();
    }
    let (head_extra, body) = match fragment.code_type {
        CodeType::Html => (String::new(), fragment.code.clone()),
        CodeType::Css => (
            format!("<style>\n{}\n</style>", fragment.code),
            CSS_PREVIEW_BODY.to_string(),
        ),
        CodeType::Jsx | CodeType::Tsx | CodeType::Js => (
            String::new(),
            format!("<pre class=\"source\">{}</pre>", escape_html(&fragment.code)),
        ),
    };
    format!(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width={width}, initial-scale=1\">\n\
         {head_extra}\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        width = viewport.width,
    )
}

fn escape_html(code: &str) -> String {
    code.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_fragment_is_embedded_in_a_shell() {
        let fragment = Fragment::new(CodeType::Html, "<button>Go</button>");
        let doc = wrap_fragment(&fragment, Viewport::DESKTOP);
        assert!(doc.starts_with("<!doctype html>"));
        assert!(doc.contains("<button>Go</button>"));
        assert!(doc.contains("width=1280"));
    }

    #[test]
    fn full_document_passes_through_unchanged() {
        let full = "<html><body><p>x</p></body></html>";
        let fragment = Fragment::new(CodeType::Html, full);
        assert_eq!(wrap_fragment(&fragment, Viewport::DESKTOP), full);
    }

    #[test]
    fn css_fragment_styles_the_preview_shell() {
        let fragment = Fragment::new(CodeType::Css, ".btn { color: red; }");
        let doc = wrap_fragment(&fragment, Viewport::MOBILE);
        assert!(doc.contains("<style>"));
        assert!(doc.contains(".btn { color: red; }"));
        assert!(doc.contains("class=\"btn\""));
    }

    #[test]
    fn script_fragments_are_escaped() {
        let fragment = Fragment::new(CodeType::Jsx, "<div className=\"p-4\" />");
        let doc = wrap_fragment(&fragment, Viewport::DESKTOP);
        assert!(doc.contains("&lt;div"));
    }
}
