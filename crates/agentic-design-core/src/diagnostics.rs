//! Per-request diagnostics carried in the response envelope.
//!
//! Degraded conditions keep callers on the happy path: a fragment that fails
//! to parse, a brand pack that cannot be resolved, a blocked auto-apply —
//! all of these ride back as structured diagnostics on a `success = true`
//! response. Only `invalid-input` and `internal` fail a request outright.

use serde::{Deserialize, Serialize};

use crate::error::Error;

// ---------------------------------------------------------------------------
// Diagnostic kinds
// ---------------------------------------------------------------------------

/// Stable classification of a degraded condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    /// Missing or malformed request field; caller-correctable.
    InvalidInput,
    /// Fragment could not be parsed; input echoed back untouched.
    ParseError,
    /// Discovery found no brand pack; structural rules only.
    UnresolvedBrand,
    /// A worker queue was full; the operation is retryable.
    Backpressure,
    /// Deadline expired; the result may be partial.
    Timeout,
    /// Cache, renderer, or vision collaborator is down; degraded mode.
    DependencyUnavailable,
    /// The vision model returned nothing coercible after all retries.
    VisionUnavailable,
    /// An auto-apply edit was demoted or dropped by a guardrail.
    GuardrailViolation,
    /// Catch-all for faults that were contained to one stage.
    Internal,
}

impl DiagnosticKind {
    /// Kind string as it appears in serialized envelopes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid-input",
            Self::ParseError => "parse-error",
            Self::UnresolvedBrand => "unresolved-brand",
            Self::Backpressure => "backpressure",
            Self::Timeout => "timeout",
            Self::DependencyUnavailable => "dependency-unavailable",
            Self::VisionUnavailable => "vision-unavailable",
            Self::GuardrailViolation => "guardrail-violation",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// One degraded condition observed while serving a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Human-readable detail, stable enough to assert on in tests.
    pub message: String,
    /// Pipeline stage that produced the diagnostic (`parse`, `transform`,
    /// `cache`, `capture`, `vision`, `router`, `discovery`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stage: None,
        }
    }

    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Map a degradable [`Error`] into its diagnostic form.
    ///
    /// Callers are expected to have routed `invalid-input` / `internal`
    /// errors elsewhere; those map to [`DiagnosticKind::Internal`] here so
    /// the conversion stays total.
    #[must_use]
    pub fn from_error(err: &Error) -> Self {
        let kind = match err.kind() {
            "invalid-input" => DiagnosticKind::InvalidInput,
            "unresolved-brand" => DiagnosticKind::UnresolvedBrand,
            "backpressure" => DiagnosticKind::Backpressure,
            "timeout" => DiagnosticKind::Timeout,
            "dependency-unavailable" => DiagnosticKind::DependencyUnavailable,
            "vision-unavailable" => DiagnosticKind::VisionUnavailable,
            "guardrail-violation" => DiagnosticKind::GuardrailViolation,
            _ => DiagnosticKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}
