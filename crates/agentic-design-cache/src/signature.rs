//! Composite transform signatures.
//!
//! `signature = H(code ‖ brandPackId ‖ resolvedVersion ‖ engineVersion ‖
//! rulesetVersion ‖ overridesHash ‖ codeType ‖ envFlagsHash)` with a
//! `0x1f` unit separator between components so no concatenation of two
//! fields can collide with another split. SHA-256 keeps accidental
//! collision negligible; changing any component forces a miss.

use sha2::{Digest, Sha256};

use agentic_design_core::{AutoApplyMode, CodeType};

/// Everything that uniquely determines a transform's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInputs<'a> {
    pub code: &'a str,
    pub brand_pack_id: &'a str,
    pub resolved_version: &'a str,
    pub engine_version: &'a str,
    /// Rule-set fingerprint (policy thresholds included).
    pub ruleset: &'a str,
    pub overrides_hash: &'a str,
    pub code_type: CodeType,
    pub env_flags_hash: &'a str,
}

/// Compute the hex signature for a transform input.
#[must_use]
pub fn compute(inputs: &SignatureInputs<'_>) -> String {
    let mut hasher = Sha256::new();
    for component in [
        inputs.code,
        inputs.brand_pack_id,
        inputs.resolved_version,
        inputs.engine_version,
        inputs.ruleset,
        inputs.overrides_hash,
        inputs.code_type.as_str(),
        inputs.env_flags_hash,
    ] {
        hasher.update(component.as_bytes());
        hasher.update([0x1f]);
    }
    hex::encode(hasher.finalize())
}

/// Hash of the behavior-affecting request flags. Mode and cap changes
/// must never serve each other's cached output.
#[must_use]
pub fn env_flags_hash(auto_apply: AutoApplyMode, max_changes: usize, optimization: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(auto_apply.as_str().as_bytes());
    hasher.update([0x1f]);
    hasher.update(max_changes.to_string().as_bytes());
    hasher.update([0x1f]);
    hasher.update(optimization.unwrap_or("none").as_bytes());
    hex::encode(&hasher.finalize()[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs(code: &'static str) -> SignatureInputs<'static> {
        SignatureInputs {
            code,
            brand_pack_id: "western-star",
            resolved_version: "2.1.0",
            engine_version: "2.3.0",
            ruleset: "ruleset-9",
            overrides_hash: "none",
            code_type: CodeType::Css,
            env_flags_hash: "aaaa",
        }
    }

    #[test]
    fn every_component_forces_a_miss() {
        let base = compute(&base_inputs(".a{}"));
        assert_ne!(base, compute(&base_inputs(".b{}")));

        let mut inputs = base_inputs(".a{}");
        inputs.brand_pack_id = "other";
        assert_ne!(base, compute(&inputs));

        let mut inputs = base_inputs(".a{}");
        inputs.resolved_version = "2.1.1";
        assert_ne!(base, compute(&inputs));

        let mut inputs = base_inputs(".a{}");
        inputs.engine_version = "2.4.0";
        assert_ne!(base, compute(&inputs));

        let mut inputs = base_inputs(".a{}");
        inputs.ruleset = "ruleset-10";
        assert_ne!(base, compute(&inputs));

        let mut inputs = base_inputs(".a{}");
        inputs.overrides_hash = "deadbeef";
        assert_ne!(base, compute(&inputs));

        let mut inputs = base_inputs(".a{}");
        inputs.code_type = CodeType::Html;
        assert_ne!(base, compute(&inputs));

        let mut inputs = base_inputs(".a{}");
        inputs.env_flags_hash = "bbbb";
        assert_ne!(base, compute(&inputs));
    }

    #[test]
    fn signature_is_deterministic() {
        assert_eq!(compute(&base_inputs(".a{}")), compute(&base_inputs(".a{}")));
    }

    #[test]
    fn component_boundaries_do_not_bleed() {
        // "ab" + "c" must not collide with "a" + "bc".
        let mut left = base_inputs("ab");
        left.brand_pack_id = "c";
        let mut right = base_inputs("a");
        right.brand_pack_id = "bc";
        assert_ne!(compute(&left), compute(&right));
    }

    #[test]
    fn env_flags_hash_tracks_mode_and_cap() {
        let a = env_flags_hash(AutoApplyMode::Safe, 5, None);
        let b = env_flags_hash(AutoApplyMode::Off, 5, None);
        let c = env_flags_hash(AutoApplyMode::Safe, 3, None);
        let d = env_flags_hash(AutoApplyMode::Safe, 5, Some("basic"));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a, env_flags_hash(AutoApplyMode::Safe, 5, None));
    }
}
