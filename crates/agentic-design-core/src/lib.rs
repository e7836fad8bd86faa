//! Core types, configuration, and brand token model for Agentic Design.
//!
//! This crate provides:
//! - Data models (`Fragment`, `Edit`, `ChangeLog`, `ProjectContext`)
//! - Brand token model and resolver snapshots (`BrandPack`, `TokenSnapshot`)
//! - sRGB color math and WCAG 2.1 contrast
//! - Configuration management (`Config`, environment parsing)
//! - Brand/project discovery with the precedence ladder and lock snapshot
//! - Error taxonomy and per-request diagnostics
//! - Deadline/cancellation plumbing and correlation ids
//! - Process-wide metrics

#![forbid(unsafe_code)]

pub mod color;
pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod models;
pub mod runtime;
pub mod tokens;

// Re-export key types for convenience
pub use color::{AA_NORMAL_TEXT, Rgba, contrast_ratio, parse_color};
pub use config::{AutoApplyMode, Config};
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use discovery::{
    BrandPackStore, Discovery, LockSnapshot, StaticBrandPackStore, overrides_hash, resolve,
    root_hash,
};
pub use error::{Error, Result};
pub use metrics::{GlobalMetrics, MetricsSnapshot, global_metrics};
pub use models::{
    BrandPackRef, ChangeLog, CodeType, DiscoverySource, Edit, EditKind, Fragment, ProjectContext,
    RejectedEdit, Viewport, now_utc,
};
pub use runtime::{CancelToken, Deadline, correlation_id};
pub use tokens::{
    BrandPack, BrandToken, GradientStop, MATCH_TOLERANCE, REM_ROOT_PX, Resolution, ResolvedToken,
    ShadowLayer, SnapshotRegistry, TokenCategory, TokenSnapshot, TokenValue, parse_duration_ms,
    parse_gradient, parse_length_px, parse_shadow, parse_token_value, split_components,
};
