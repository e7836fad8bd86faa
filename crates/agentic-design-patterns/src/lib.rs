//! Per-project pattern learning.
//!
//! Every applied change log produces observations; explicit feedback and
//! usage tracking update the same aggregates. Confidence is an EWMA over
//! accept/reject outcomes with half-life decay toward the uninformative
//! midpoint — a pattern nobody has confirmed in months stops being
//! trusted, but is never hard-deleted.
//!
//! Persistence is an append-only JSONL journal; aggregates are rebuilt on
//! load. Journal writes are fire-and-forget with at most one retry.

#![forbid(unsafe_code)]

pub mod store;

pub use store::{
    Observation, ObservationSource, Pattern, PatternStore, PatternSuggestion, StoreConfig,
};
