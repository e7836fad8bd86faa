//! Error types for the enhancement pipeline.
//!
//! Variants map one-to-one onto the error taxonomy used across the public
//! response envelope. Conditions that degrade rather than fail (parse
//! failures, missing brand context, guardrail demotions) are *diagnostics*,
//! not errors — see [`crate::diagnostics`]. Only caller-correctable input
//! problems and internal faults surface as `success = false`.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the enhancement pipeline.
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Caller-correctable input errors
    // ==========================================================================
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unknown code type: {0}. Expected one of css, html, jsx, tsx, js")]
    UnknownCodeType(String),

    // ==========================================================================
    // Brand resolution
    // ==========================================================================
    /// Discovery found no brand pack and strict mode is enabled. In
    /// non-strict mode this condition is a diagnostic, never an error.
    #[error("No brand pack resolved for project: {0}")]
    UnresolvedBrand(String),

    #[error("Brand pack version must be resolved before transform, got range: {0}")]
    UnresolvedVersion(String),

    // ==========================================================================
    // Capacity / deadline
    // ==========================================================================
    #[error("Worker queue full: {0}")]
    Backpressure(String),

    #[error("Deadline exceeded in {stage}")]
    Timeout { stage: String },

    #[error("Operation cancelled")]
    Cancelled,

    // ==========================================================================
    // External collaborators
    // ==========================================================================
    /// A collaborator (cache store, renderer, vision model) is down.
    /// The orchestrator maps this into degraded mode, not a failed request.
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Vision critique could not be coerced after {attempts} attempts: {detail}")]
    VisionUnavailable { attempts: u32, detail: String },

    #[error("Renderer error: {0}")]
    Renderer(String),

    // ==========================================================================
    // Guardrails
    // ==========================================================================
    /// An auto-apply was blocked (contrast, ambiguity, change cap). Recorded
    /// in diagnostics on the happy path; only surfaces as an error from
    /// strict internal call sites.
    #[error("Guardrail violation: {0}")]
    GuardrailViolation(String),

    // ==========================================================================
    // I/O and serialization
    // ==========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ==========================================================================
    // Last resort
    // ==========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable kind string used in envelopes and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) | Self::MissingField(_) | Self::UnknownCodeType(_) => {
                "invalid-input"
            }
            Self::UnresolvedBrand(_) | Self::UnresolvedVersion(_) => "unresolved-brand",
            Self::Backpressure(_) => "backpressure",
            Self::Timeout { .. } | Self::Cancelled => "timeout",
            Self::DependencyUnavailable(_) | Self::Renderer(_) => "dependency-unavailable",
            Self::VisionUnavailable { .. } => "vision-unavailable",
            Self::GuardrailViolation(_) => "guardrail-violation",
            Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => "internal",
        }
    }

    /// Whether this error still yields a `success = true` envelope with
    /// diagnostics. Caller mistakes and internal faults fail the request;
    /// so does an unresolved brand, which only surfaces as an error under
    /// strict mode (the non-strict path degrades before erroring).
    #[must_use]
    pub const fn is_degradable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidInput(_)
                | Self::MissingField(_)
                | Self::UnknownCodeType(_)
                | Self::UnresolvedBrand(_)
                | Self::UnresolvedVersion(_)
                | Self::Io(_)
                | Self::Serialization(_)
                | Self::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(Error::InvalidInput("x".into()).kind(), "invalid-input");
        assert_eq!(Error::UnresolvedBrand("p".into()).kind(), "unresolved-brand");
        assert_eq!(Error::Backpressure("q".into()).kind(), "backpressure");
        assert_eq!(
            Error::Timeout {
                stage: "capture".into()
            }
            .kind(),
            "timeout"
        );
        assert_eq!(
            Error::DependencyUnavailable("cache".into()).kind(),
            "dependency-unavailable"
        );
        assert_eq!(
            Error::VisionUnavailable {
                attempts: 3,
                detail: "schema".into()
            }
            .kind(),
            "vision-unavailable"
        );
        assert_eq!(
            Error::GuardrailViolation("contrast".into()).kind(),
            "guardrail-violation"
        );
        assert_eq!(Error::Internal("boom".into()).kind(), "internal");
    }

    #[test]
    fn degradable_split_matches_envelope_policy() {
        assert!(!Error::InvalidInput("x".into()).is_degradable());
        assert!(!Error::Internal("x".into()).is_degradable());
        // Only strict mode surfaces an unresolved brand as an error, and
        // strict mode means fail.
        assert!(!Error::UnresolvedBrand("p".into()).is_degradable());
        assert!(Error::Backpressure("q".into()).is_degradable());
        assert!(Error::DependencyUnavailable("v".into()).is_degradable());
    }
}
