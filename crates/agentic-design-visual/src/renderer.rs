//! Headless renderer collaborator.
//!
//! The core does not own a browser: it hands a wrapped HTML document and a
//! viewport to whatever implements [`Renderer`] and gets PNG bytes back.
//! The capture pool in [`crate::capture`] owns scheduling, timeouts, and
//! worker replacement around this trait.

use agentic_design_core::{Result, Viewport};

/// PNG bytes plus the rendered document-box dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PngImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Headless renderer: HTML document + viewport in, PNG out.
///
/// Implementations must be safe to call from several pool workers at
/// once. A slow or wedged implementation is handled by the pool's capture
/// timeout, not by the trait.
pub trait Renderer: Send + Sync {
    fn render(&self, html: &str, viewport: Viewport) -> Result<PngImage>;
}
