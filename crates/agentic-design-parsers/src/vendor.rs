//! Vendor path exclusion.
//!
//! Fragments whose `file_path` hint matches the vendor pattern set are
//! parsed but never transformed: third-party and generated sources are not
//! ours to rewrite.

use std::sync::LazyLock;

use globset::{Glob, GlobSet, GlobSetBuilder};

/// Glob patterns treated as vendor/generated sources.
pub const VENDOR_PATTERNS: &[&str] = &[
    "**/node_modules/**",
    "**/vendor/**",
    "**/third_party/**",
    "**/dist/**",
    "**/build/**",
    "**/.next/**",
    "**/coverage/**",
    "**/*.min.css",
    "**/*.min.js",
];

static VENDOR_SET: LazyLock<GlobSet> = LazyLock::new(|| {
    let mut builder = GlobSetBuilder::new();
    for pattern in VENDOR_PATTERNS {
        builder.add(Glob::new(pattern).expect("static vendor glob"));
    }
    builder.build().expect("vendor glob set")
});

/// Whether a fragment's path hint marks it as vendored.
#[must_use]
pub fn is_vendor_path(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    VENDOR_SET.is_match(normalized.trim_start_matches("./"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_directories_match() {
        assert!(is_vendor_path("node_modules/lib/styles.css"));
        assert!(is_vendor_path("./web/node_modules/lib/styles.css"));
        assert!(is_vendor_path("packages/app/dist/app.css"));
        assert!(is_vendor_path("src\\vendor\\theme.css"));
        assert!(is_vendor_path("assets/site.min.css"));
    }

    #[test]
    fn project_sources_do_not_match() {
        assert!(!is_vendor_path("src/components/Button.tsx"));
        assert!(!is_vendor_path("styles/site.css"));
        assert!(!is_vendor_path("distillery/notes.css"));
    }
}
