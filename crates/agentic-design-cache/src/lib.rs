//! Signature-keyed transform cache for Agentic Design.
//!
//! - [`signature`] — composite SHA-256 signatures; any input change forces
//!   a miss, so version bumps invalidate en masse with no eviction pass
//! - [`store`] — tiered primary/secondary stores with TTL on `last_hit_at`
//! - [`coalesce`] — per-signature singleflight so concurrent misses run
//!   one transform
//! - [`history`] — append-only audit log of applied change logs

#![forbid(unsafe_code)]

pub mod coalesce;
pub mod history;
pub mod signature;
pub mod store;

pub use coalesce::{Role, Singleflight};
pub use history::{TransformHistory, TransformLogEntry, TransformStatus};
pub use signature::{SignatureInputs, compute as compute_signature, env_flags_hash};
pub use store::{
    CacheEntry, CacheStore, CachedTransform, DiskCacheStore, Lookup, MemoryCacheStore, TieredCache,
};
