//! Deterministic transform engine for Agentic Design.
//!
//! Applies the rule stages (typography → colors → spacing → radius →
//! elevation → animations → gradients → states → optimization) over a
//! parsed fragment, enforcing the auto-apply policy, guardrails, and the
//! per-fragment change cap, and emits the resulting change log.

#![forbid(unsafe_code)]

pub mod candidates;
pub mod engine;
pub mod optimize;
pub mod policy;
pub mod stages;

pub use candidates::{Candidate, ContrastCheck};
pub use engine::{TransformEngine, TransformOptions, TransformOutcome};
pub use optimize::optimize_css;
pub use policy::{ENGINE_VERSION, OptimizationLevel, RULESET_VERSION, RulePolicy};
pub use stages::{Stage, VisualGuidance};
