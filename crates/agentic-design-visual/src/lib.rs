//! Screenshot capture and vision critique for Agentic Design.
//!
//! - [`document`] — fragment → renderable HTML document wrapping
//! - [`renderer`] — headless renderer collaborator trait
//! - [`capture`] — bounded worker pool with timeout teardown
//! - [`janitor`] — screenshot retention sweeps
//! - [`prompt`] — the three-pass forensic critique prompt and thresholds
//! - [`critique`] — structured critique model and lenient coercion
//! - [`vision`] — vision model collaborator, retrying client, HTTP impl
//! - [`testing`] — hermetic fakes for pipeline tests

#![forbid(unsafe_code)]

pub mod capture;
pub mod critique;
pub mod document;
pub mod janitor;
pub mod prompt;
pub mod renderer;
pub mod testing;
pub mod vision;

pub use capture::{CaptureConfig, CapturePool, Screenshot};
pub use critique::{
    DimensionScores, FixEndpoint, Severity, VisualAnalysis, Violation, coerce_analysis,
    parse_json_safely,
};
pub use document::wrap_fragment;
pub use janitor::{JanitorConfig, JanitorHandle, SweepStats, sweep};
pub use prompt::{CritiqueContext, SYSTEM_PROMPT, build_forensic_prompt, thresholds};
pub use renderer::{PngImage, Renderer};
pub use vision::{HttpVisionModel, VisionClient, VisionModel, VisionParams};
