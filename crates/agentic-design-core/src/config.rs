//! Environment-driven configuration for the enhancement pipeline.
//!
//! Every knob reads an `AGENTIC_*` environment variable with a typed
//! default; malformed values fall back to the default rather than erroring.
//! The env flags sit at the top of the discovery precedence ladder — see
//! [`crate::discovery`].

use std::env;

#[cfg(test)]
use std::collections::HashMap;

/// Auto-apply policy requested by the caller or environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoApplyMode {
    /// Apply only safe rule classes above the confidence floor (default).
    #[default]
    Safe,
    /// Advisory-only: nothing is written into the returned code.
    Off,
    /// Apply any rule class above the confidence floor. Guardrails still run.
    All,
}

impl AutoApplyMode {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" | "0" | "false" | "none" => Self::Off,
            "all" | "aggressive" => Self::All,
            _ => Self::Safe,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Off => "off",
            Self::All => "all",
        }
    }
}

/// Main configuration for the pipeline. Built once at startup via
/// [`Config::from_env`]; request options override per call.
#[derive(Debug, Clone)]
pub struct Config {
    // Brand binding (discovery rung 1)
    pub brand_pack_id: Option<String>,
    pub brand_version: Option<String>,
    pub project_id: Option<String>,

    // Behavior switches
    /// Disable the pipeline entirely: requests echo their input.
    pub disabled: bool,
    /// Strict mode: failed discovery is a hard error instead of degraded.
    pub strict: bool,
    pub auto_apply: AutoApplyMode,
    /// Change cap per fragment (`N_max`).
    pub auto_apply_max_changes: usize,

    // Screenshot pool
    pub shot_pool_size: usize,
    pub shot_queue_max: usize,
    pub capture_timeout_secs: u64,
    pub screenshot_max_age_secs: u64,
    pub screenshot_max_files: usize,

    // Vision critic
    pub vision_pool_size: usize,
    pub vision_retry_attempts: u32,
    pub vision_temperature: f64,

    // Cache
    pub cache_ttl_days: u64,
    pub cache_max_entries: usize,
    /// Singleflight joiner wait before computing independently.
    pub coalesce_wait_ms: u64,

    // Smart router
    pub fix_plan_cap: usize,
    pub accept_threshold: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            brand_pack_id: None,
            brand_version: None,
            project_id: None,
            disabled: false,
            strict: false,
            auto_apply: AutoApplyMode::Safe,
            auto_apply_max_changes: 5,
            shot_pool_size: 4,
            shot_queue_max: 32,
            capture_timeout_secs: 15,
            screenshot_max_age_secs: 3600,
            screenshot_max_files: 500,
            vision_pool_size: 8,
            vision_retry_attempts: 3,
            vision_temperature: 0.2,
            cache_ttl_days: 30,
            cache_max_entries: 10_000,
            coalesce_wait_ms: 5_000,
            fix_plan_cap: 10,
            accept_threshold: 10,
        }
    }
}

impl Config {
    /// Load configuration from `AGENTIC_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            brand_pack_id: env_nonempty("AGENTIC_BRAND_PACK_ID"),
            brand_version: env_nonempty("AGENTIC_BRAND_VERSION"),
            project_id: env_nonempty("AGENTIC_PROJECT_ID"),
            disabled: env_bool("AGENTIC_DISABLE", defaults.disabled),
            strict: env_bool("AGENTIC_STRICT", defaults.strict),
            auto_apply: env_value("AGENTIC_AUTO_APPLY")
                .map_or(defaults.auto_apply, |v| AutoApplyMode::parse(&v)),
            auto_apply_max_changes: env_usize(
                "AGENTIC_AUTO_APPLY_MAX_CHANGES",
                defaults.auto_apply_max_changes,
            ),
            shot_pool_size: env_usize("AGENTIC_SHOT_POOL_SIZE", defaults.shot_pool_size).max(1),
            shot_queue_max: env_usize("AGENTIC_SHOT_QUEUE_MAX", defaults.shot_queue_max),
            capture_timeout_secs: env_u64(
                "AGENTIC_CAPTURE_TIMEOUT_SECONDS",
                defaults.capture_timeout_secs,
            ),
            screenshot_max_age_secs: env_u64(
                "AGENTIC_SCREENSHOT_MAX_AGE_SECONDS",
                defaults.screenshot_max_age_secs,
            ),
            screenshot_max_files: env_usize(
                "AGENTIC_SCREENSHOT_MAX_FILES",
                defaults.screenshot_max_files,
            ),
            vision_pool_size: env_usize("AGENTIC_VISION_POOL_SIZE", defaults.vision_pool_size)
                .max(1),
            vision_retry_attempts: env_u32(
                "AGENTIC_VISION_RETRY_ATTEMPTS",
                defaults.vision_retry_attempts,
            ),
            vision_temperature: env_f64("AGENTIC_VISION_TEMPERATURE", defaults.vision_temperature)
                .clamp(0.0, 0.3),
            cache_ttl_days: env_u64("AGENTIC_CACHE_TTL_DAYS", defaults.cache_ttl_days),
            cache_max_entries: env_usize("AGENTIC_CACHE_MAX_ENTRIES", defaults.cache_max_entries),
            coalesce_wait_ms: env_u64("AGENTIC_COALESCE_WAIT_MS", defaults.coalesce_wait_ms),
            fix_plan_cap: env_usize("AGENTIC_FIX_PLAN_CAP", defaults.fix_plan_cap),
            accept_threshold: env_i32("AGENTIC_ACCEPT_THRESHOLD", defaults.accept_threshold),
        }
    }
}

// ---------------------------------------------------------------------------
// Env helpers
// ---------------------------------------------------------------------------

#[cfg(test)]
thread_local! {
    static TEST_ENV_OVERRIDES: std::cell::RefCell<HashMap<String, String>> =
        std::cell::RefCell::new(HashMap::new());
}

#[cfg(test)]
fn test_env_override_value(key: &str) -> Option<String> {
    TEST_ENV_OVERRIDES.with(|cell| cell.borrow().get(key).cloned())
}

/// Read an environment variable (with the test-override map consulted
/// first, since `set_var` is unsafe under edition 2024).
#[must_use]
pub fn env_value(key: &str) -> Option<String> {
    #[cfg(test)]
    if let Some(v) = test_env_override_value(key) {
        return Some(v);
    }
    env::var(key).ok()
}

fn env_nonempty(key: &str) -> Option<String> {
    env_value(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env_value(key).map_or(default, |v| parse_bool(&v, default))
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_value(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_value(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env_value(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i32(key: &str, default: i32) -> i32 {
    env_value(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env_value(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

/// Scoped env override for tests. Restores the previous override state on
/// drop so tests can run in any order on one thread.
#[cfg(test)]
pub(crate) struct TestEnvOverrideGuard {
    previous: Vec<(String, Option<String>)>,
}

#[cfg(test)]
impl TestEnvOverrideGuard {
    pub(crate) fn set(vars: &[(&str, &str)]) -> Self {
        let mut previous = Vec::new();
        TEST_ENV_OVERRIDES.with(|cell| {
            let mut map = cell.borrow_mut();
            for (key, value) in vars {
                let old = map.get(*key).cloned();
                previous.push(((*key).to_string(), old));
                map.insert((*key).to_string(), (*value).to_string());
            }
        });
        Self { previous }
    }
}

#[cfg(test)]
impl Drop for TestEnvOverrideGuard {
    fn drop(&mut self) {
        TEST_ENV_OVERRIDES.with(|cell| {
            let mut map = cell.borrow_mut();
            for (key, value) in self.previous.drain(..) {
                match value {
                    Some(v) => {
                        map.insert(key, v);
                    }
                    None => {
                        map.remove(&key);
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let config = Config::default();
        assert_eq!(config.auto_apply_max_changes, 5);
        assert_eq!(config.shot_pool_size, 4);
        assert_eq!(config.shot_queue_max, 32);
        assert_eq!(config.capture_timeout_secs, 15);
        assert_eq!(config.vision_pool_size, 8);
        assert_eq!(config.vision_retry_attempts, 3);
        assert_eq!(config.cache_ttl_days, 30);
        assert_eq!(config.fix_plan_cap, 10);
        assert_eq!(config.accept_threshold, 10);
        assert_eq!(config.auto_apply, AutoApplyMode::Safe);
        assert!(!config.strict);
        assert!(!config.disabled);
    }

    #[test]
    fn env_overrides_apply() {
        let _env = TestEnvOverrideGuard::set(&[
            ("AGENTIC_BRAND_PACK_ID", "western-star"),
            ("AGENTIC_STRICT", "1"),
            ("AGENTIC_AUTO_APPLY", "off"),
            ("AGENTIC_AUTO_APPLY_MAX_CHANGES", "3"),
        ]);
        let config = Config::from_env();
        assert_eq!(config.brand_pack_id.as_deref(), Some("western-star"));
        assert!(config.strict);
        assert_eq!(config.auto_apply, AutoApplyMode::Off);
        assert_eq!(config.auto_apply_max_changes, 3);
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let _env = TestEnvOverrideGuard::set(&[
            ("AGENTIC_AUTO_APPLY_MAX_CHANGES", "many"),
            ("AGENTIC_VISION_TEMPERATURE", "2.0"),
            ("AGENTIC_BRAND_PACK_ID", "   "),
        ]);
        let config = Config::from_env();
        assert_eq!(config.auto_apply_max_changes, 5);
        // Temperature clamps to the determinism ceiling.
        assert!(config.vision_temperature <= 0.3);
        assert!(config.brand_pack_id.is_none());
    }

    #[test]
    fn auto_apply_mode_parses_synonyms() {
        assert_eq!(AutoApplyMode::parse("OFF"), AutoApplyMode::Off);
        assert_eq!(AutoApplyMode::parse("all"), AutoApplyMode::All);
        assert_eq!(AutoApplyMode::parse("safe"), AutoApplyMode::Safe);
        assert_eq!(AutoApplyMode::parse("bogus"), AutoApplyMode::Safe);
    }
}
