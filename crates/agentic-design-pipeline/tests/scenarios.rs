//! End-to-end pipeline scenarios, run hermetically against fake
//! renderer/vision collaborators.

use std::sync::Arc;
use std::time::Duration;

use agentic_design_cache::{CacheEntry, CacheStore};
use agentic_design_core::{
    BrandPack, Config, Deadline, DiagnosticKind, Error, Result, StaticBrandPackStore,
};
use agentic_design_pipeline::api::{AnalyzeRequest, EnhanceRequest};
use agentic_design_pipeline::{Orchestrator, Recommendation};
use agentic_design_visual::testing::{EchoRenderer, ScriptedVision};
use agentic_design_visual::{FixEndpoint, Renderer, Severity, VisionModel};

fn brand_pack() -> BrandPack {
    BrandPack::from_json(
        "western-star",
        "2.1.0",
        &serde_json::json!({
            "colors": { "primary": "#1b3668", "surface": "#ffffff" },
            "spacing": { "spacing-md": "16px", "spacing-lg": "32px" },
            "radius": { "md": "6px" },
            "elevation": { "card": "0 4px 6px rgba(0, 0, 0, 0.1)" },
            "font-size": { "body": "16px", "h1": "32px" }
        }),
    )
    .unwrap()
}

struct Harness {
    orchestrator: Orchestrator,
    vision: Arc<ScriptedVision>,
    _dirs: (tempfile::TempDir, tempfile::TempDir),
}

fn harness_with(config: Config, packs: Vec<BrandPack>) -> Harness {
    let project = tempfile::tempdir().unwrap();
    let shots = tempfile::tempdir().unwrap();
    let vision = Arc::new(ScriptedVision::default());
    let orchestrator = Orchestrator::builder(config, Arc::new(StaticBrandPackStore::new(packs)))
        .project_root(project.path())
        .renderer(Arc::new(EchoRenderer::default()) as Arc<dyn Renderer>)
        .vision_model(Arc::clone(&vision) as Arc<dyn VisionModel>)
        .screenshot_dir(shots.path())
        .build();
    Harness {
        orchestrator,
        vision,
        _dirs: (project, shots),
    }
}

fn harness() -> Harness {
    harness_with(Config::default(), vec![brand_pack()])
}

fn css_request(code: &str) -> EnhanceRequest {
    EnhanceRequest {
        code: code.to_string(),
        code_type: "css".to_string(),
        ..EnhanceRequest::default()
    }
}

// ---------------------------------------------------------------------------
// Scenario 1: exact color match, safe auto-apply, cache honesty
// ---------------------------------------------------------------------------

#[test]
fn exact_color_match_auto_applies_and_caches() {
    let h = harness();
    let request = css_request(".btn{color:#1B3668}");

    let first = h.orchestrator.enhance_cached(&request, &Deadline::none());
    assert!(first.success);
    let code = first.code.clone().unwrap();
    assert!(code.contains("color:var(--color-primary)"), "code: {code}");
    let log = first.change_log.clone().unwrap();
    assert_eq!(log.applied.len(), 1);
    assert_eq!(log.applied[0].rule_id, "color-token");
    assert_eq!(first.metadata.cache_hit, Some(false));

    let second = h.orchestrator.enhance_cached(&request, &Deadline::none());
    assert_eq!(second.metadata.cache_hit, Some(true));
    // Byte-identical output and structurally equal change log.
    assert_eq!(second.code.unwrap(), code);
    assert_eq!(second.change_log.unwrap(), log);
}

// ---------------------------------------------------------------------------
// Scenario 2: spacing normalization inside tolerance
// ---------------------------------------------------------------------------

#[test]
fn spacing_shorthand_normalizes_as_one_edit() {
    let h = harness();
    let response = h.orchestrator.enhance(
        &css_request(".card{padding:16.5px 31px}"),
        &Deadline::none(),
    );
    let code = response.code.unwrap();
    assert!(
        code.contains("padding:var(--spacing-md) var(--spacing-lg)"),
        "code: {code}"
    );
    let log = response.change_log.unwrap();
    assert_eq!(log.applied.len(), 1);
    assert!(log.applied.len() <= 5);
}

// ---------------------------------------------------------------------------
// Scenario 3: ambiguity guard
// ---------------------------------------------------------------------------

#[test]
fn ambiguous_tokens_produce_no_edit() {
    let pack = BrandPack::from_json(
        "ambig",
        "1.0.0",
        &serde_json::json!({
            "spacing": { "sm": "8px", "sm2": "8.1px" }
        }),
    )
    .unwrap();
    let h = harness_with(Config::default(), vec![pack]);
    let response = h
        .orchestrator
        .enhance(&css_request(".x{margin:8.05px}"), &Deadline::none());
    assert!(response.success);
    assert_eq!(response.code.unwrap(), ".x{margin:8.05px}");
    let log = response.change_log.unwrap();
    assert!(log.applied.is_empty());
    assert!(log.advisory.is_empty());
    assert_eq!(log.rejected.len(), 1);
    assert_eq!(log.rejected[0].reason, "ambiguous-token");
}

// ---------------------------------------------------------------------------
// Scenario 4: contrast regression blocked
// ---------------------------------------------------------------------------

#[test]
fn contrast_regression_is_demoted_with_guardrail_diagnostic() {
    let pack = BrandPack::from_json(
        "cream",
        "1.0.0",
        &serde_json::json!({
            "colors": { "cream-text": "#fff3dd" }
        }),
    )
    .unwrap();
    let h = harness_with(Config::default(), vec![pack]);
    let mut request = css_request(".warn{color:#fff;background:#ffeecc}");
    request.auto_apply = Some("all".to_string());
    let response = h.orchestrator.enhance(&request, &Deadline::none());
    assert!(response.success);
    let log = response.change_log.unwrap();
    assert!(log.applied.is_empty(), "applied: {:?}", log.applied);
    assert!(response
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::GuardrailViolation));
}

// ---------------------------------------------------------------------------
// Scenario 5: visual loop improves the score
// ---------------------------------------------------------------------------

const LOW_SCORE_CRITIQUE: &str = r##"{
  "overallScore": 28,
  "dimensionScores": {"hierarchy": 35, "typography": 20, "spacing": 40, "color": 30, "accessibility": 15, "brand": 40},
  "violations": [
    {"severity": "critical", "location": "body", "evidence": "body text 12px < 16px",
     "recommendedEndpoint": "enhance-typography", "confidence": 95,
     "parameters": {"selector": "body", "property": "font-size", "value": "16px"}},
    {"severity": "critical", "location": "h1", "evidence": "h1 16px < 24px",
     "recommendedEndpoint": "enhance-typography", "confidence": 94,
     "parameters": {"selector": "h1", "property": "font-size", "value": "24px"}},
    {"severity": "critical", "location": "body", "evidence": "contrast 2.8:1 < 4.5:1",
     "recommendedEndpoint": "analyze-accessibility", "confidence": 90,
     "parameters": {"selector": "body", "property": "color", "value": "#444444"}},
    {"severity": "critical", "location": ".btn", "evidence": "touch target 20px < 44px",
     "recommendedEndpoint": "spacing-optimization", "confidence": 85,
     "parameters": {"selector": ".btn", "property": "min-height", "value": "44px"}}
  ],
  "executionOrder": ["enhance-typography", "analyze-accessibility", "spacing-optimization"],
  "estimatedGain": 45
}"##;

const IMPROVED_CRITIQUE: &str = r#"{
  "overallScore": 72,
  "dimensionScores": {"hierarchy": 70, "typography": 78, "spacing": 68, "color": 72, "accessibility": 74, "brand": 60},
  "violations": [],
  "executionOrder": [],
  "estimatedGain": 5
}"#;

const LOW_QUALITY_HTML: &str = "<div>\n<style>\nbody { font-size: 12px; color: #999999; background: #ffffff; }\nh1 { font-size: 16px; }\n.btn { min-height: 20px; }\n</style>\n<h1>Title</h1><p>copy</p><button class=\"btn\">go</button>\n</div>";

#[test]
fn visual_loop_fixes_and_validates() {
    let h = harness();
    h.vision.push(LOW_SCORE_CRITIQUE);
    h.vision.push(IMPROVED_CRITIQUE);

    let request = AnalyzeRequest {
        code: LOW_QUALITY_HTML.to_string(),
        code_type: "html".to_string(),
        auto_apply: Some("safe".to_string()),
        validate_after_fix: true,
        ..AnalyzeRequest::default()
    };
    let response = h.orchestrator.analyze_and_fix(&request, &Deadline::none());
    assert!(response.success, "diags: {:?}", response.diagnostics);

    let analysis = response.visual_analysis.as_ref().unwrap();
    assert!(analysis.overall_score <= 35);
    assert!(analysis.violations_at_least(Severity::Critical) >= 4);

    // Fix plan ordering: typography before accessibility before spacing.
    let endpoints: Vec<FixEndpoint> = response.fix_plan.iter().map(|p| p.endpoint).collect();
    assert_eq!(
        endpoints,
        vec![
            FixEndpoint::EnhanceTypography,
            FixEndpoint::AnalyzeAccessibility,
            FixEndpoint::SpacingOptimization,
        ]
    );

    // The guided fixes actually landed in the code.
    let code = response.code.as_ref().unwrap();
    assert!(code.contains("var(--font-size-body)"), "code: {code}");
    assert!(code.contains("24px"), "code: {code}");
    assert!(code.contains("#444444"), "code: {code}");
    assert!(code.contains("44px"), "code: {code}");
    // The surrounding markup is untouched.
    assert!(code.contains("<h1>Title</h1><p>copy</p>"));

    assert_eq!(response.score_delta, Some(44));
    assert!(response.score_delta.unwrap() >= 30);
    assert_eq!(response.recommendation, Some(Recommendation::Accept));
    assert_eq!(response.post_analysis.as_ref().unwrap().overall_score, 72);
    assert_eq!(h.vision.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}

// ---------------------------------------------------------------------------
// Scenario 6: degraded mode when the cache store is offline
// ---------------------------------------------------------------------------

struct OfflineStore;

impl CacheStore for OfflineStore {
    fn get(&self, _signature: &str) -> Result<Option<CacheEntry>> {
        Err(Error::DependencyUnavailable("store offline".into()))
    }
    fn put(&self, _entry: CacheEntry) -> Result<()> {
        Err(Error::DependencyUnavailable("store offline".into()))
    }
    fn remove_expired(&self, _ttl: Duration) -> Result<usize> {
        Err(Error::DependencyUnavailable("store offline".into()))
    }
    fn len(&self) -> Result<usize> {
        Err(Error::DependencyUnavailable("store offline".into()))
    }
}

#[test]
fn offline_cache_store_degrades_without_failing() {
    let project = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::builder(
        Config::default(),
        Arc::new(StaticBrandPackStore::new(vec![brand_pack()])),
    )
    .project_root(project.path())
    .cache_stores(Box::new(OfflineStore), None)
    .build();

    let request = css_request(".btn{color:#1b3668}");
    for _ in 0..2 {
        let response = orchestrator.enhance_cached(&request, &Deadline::none());
        assert!(response.success);
        assert_eq!(response.metadata.cache_hit, Some(false));
        assert!(response.metadata.degraded);
        assert!(response
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::DependencyUnavailable));
        assert!(response.code.unwrap().contains("var(--color-primary)"));
    }
}

// ---------------------------------------------------------------------------
// Universal invariants
// ---------------------------------------------------------------------------

#[test]
fn enhance_is_idempotent_and_deterministic() {
    let h = harness();
    let first = h.orchestrator.enhance(
        &css_request(".btn { color: #1b3668; padding: 16px; }"),
        &Deadline::none(),
    );
    let first_code = first.code.unwrap();
    assert!(!first.change_log.as_ref().unwrap().applied.is_empty());

    // Determinism: repeated calls byte-identical.
    let again = h.orchestrator.enhance(
        &css_request(".btn { color: #1b3668; padding: 16px; }"),
        &Deadline::none(),
    );
    assert_eq!(again.code.unwrap(), first_code);
    assert_eq!(again.change_log.unwrap(), first.change_log.unwrap());

    // Idempotence: transforming the output applies nothing further.
    let second = h
        .orchestrator
        .enhance(&css_request(&first_code), &Deadline::none());
    assert!(second.change_log.unwrap().applied.is_empty());
    assert_eq!(second.code.unwrap(), first_code);
}

#[test]
fn vendor_paths_are_parsed_but_never_transformed() {
    let h = harness();
    let mut request = css_request(".btn{color:#1b3668}");
    request.file_path = Some("node_modules/kit/button.css".to_string());
    let response = h.orchestrator.enhance(&request, &Deadline::none());
    assert!(response.success);
    assert_eq!(response.code.unwrap(), ".btn{color:#1b3668}");
    assert!(response.change_log.unwrap().applied.is_empty());
}

#[test]
fn discovery_env_binding_wins_over_project_config() {
    let project = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(project.path().join(".agentic")).unwrap();
    std::fs::write(
        project.path().join(".agentic/config.json"),
        r#"{"brandPackId": "from-config"}"#,
    )
    .unwrap();

    let other = BrandPack::from_json(
        "from-config",
        "1.0.0",
        &serde_json::json!({"colors": {"primary": "#000000"}}),
    )
    .unwrap();
    let config = Config {
        brand_pack_id: Some("western-star".to_string()),
        ..Config::default()
    };
    let orchestrator = Orchestrator::builder(
        config,
        Arc::new(StaticBrandPackStore::new(vec![brand_pack(), other])),
    )
    .project_root(project.path())
    .build();

    let response = orchestrator.enhance(&css_request(".a{color:#1b3668}"), &Deadline::none());
    assert_eq!(response.metadata.brand_pack_source.as_deref(), Some("env"));
    assert!(response.code.unwrap().contains("var(--color-primary)"));
}

#[test]
fn strict_mode_fails_when_nothing_resolves() {
    let project = tempfile::tempdir().unwrap();
    let config = Config {
        strict: true,
        ..Config::default()
    };
    let orchestrator = Orchestrator::builder(config, Arc::new(StaticBrandPackStore::default()))
        .project_root(project.path())
        .build();
    let response = orchestrator.enhance(&css_request(".a{color:#fff}"), &Deadline::none());
    assert!(!response.success);
    assert!(response
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::UnresolvedBrand));
}

#[test]
fn analyze_without_visual_stack_falls_back_deterministically() {
    let project = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::builder(
        Config::default(),
        Arc::new(StaticBrandPackStore::new(vec![brand_pack()])),
    )
    .project_root(project.path())
    .build();

    let request = AnalyzeRequest {
        code: ".btn{color:#1b3668}".to_string(),
        code_type: "css".to_string(),
        ..AnalyzeRequest::default()
    };
    let response = orchestrator.analyze_and_fix(&request, &Deadline::none());
    assert!(response.success);
    assert!(response.visual_analysis.is_none());
    assert!(response.metadata.degraded);
    assert!(response
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::DependencyUnavailable));
    // Deterministic path still tokenizes.
    assert!(response.code.unwrap().contains("var(--color-primary)"));
}

#[test]
fn responsive_analysis_joins_viewports() {
    let h = harness();
    // Three viewports: two consistent, one much worse.
    for score in [80, 78, 40] {
        h.vision.push(format!(
            r#"{{"overallScore": {score}, "violations": [
                {{"severity": "high", "location": ".nav", "evidence": "cramped",
                  "recommendedEndpoint": "spacing-optimization", "confidence": 70}}
            ]}}"#
        ));
    }
    let request = agentic_design_pipeline::ResponsiveRequest {
        code: ".nav{padding:16px}".to_string(),
        code_type: "css".to_string(),
        ..agentic_design_pipeline::ResponsiveRequest::default()
    };
    let response = h.orchestrator.analyze_responsive(&request, &Deadline::none());
    assert!(response.success);
    assert_eq!(response.viewport_analyses.len(), 3);
    assert_eq!(response.responsive_score, (80 + 78 + 40) / 3);
    assert!(!response.responsive_issues.is_empty());
    assert!(!response.recommendations.is_empty());
}

#[test]
fn transform_log_and_feedback_are_recorded() {
    let project = tempfile::tempdir().unwrap();
    let log_path = project.path().join("state/transforms.jsonl");
    let orchestrator = Orchestrator::builder(
        Config::default(),
        Arc::new(StaticBrandPackStore::new(vec![brand_pack()])),
    )
    .project_root(project.path())
    .transform_log(&log_path)
    .build();

    let response = orchestrator.enhance(&css_request(".btn{color:#1b3668}"), &Deadline::none());
    assert!(response.success);

    let journal = std::fs::read_to_string(&log_path).unwrap();
    let entry: serde_json::Value = serde_json::from_str(journal.lines().next().unwrap()).unwrap();
    assert_eq!(entry["status"], "applied");
    assert_eq!(entry["applied_count"], 1);

    // Feedback folds into the same aggregate the applied edit created.
    let project_id = project
        .path()
        .file_name()
        .unwrap()
        .to_string_lossy()
        .to_string();
    orchestrator.record_feedback(&project_id, "generic", "color-token", "color-primary", false);
    let pattern = orchestrator
        .pattern_store()
        .get(&project_id, "generic", "color-token", "color-primary")
        .expect("pattern aggregate");
    assert_eq!(pattern.sample_count, 2);
}

#[test]
fn validate_improvements_reports_deltas() {
    let h = harness();
    h.vision.push(LOW_SCORE_CRITIQUE);
    h.vision.push(IMPROVED_CRITIQUE);
    let request = agentic_design_pipeline::ValidateRequest {
        original_code: LOW_QUALITY_HTML.to_string(),
        improved_code: LOW_QUALITY_HTML.replace("12px", "16px"),
        code_type: "html".to_string(),
        ..agentic_design_pipeline::ValidateRequest::default()
    };
    let response = h.orchestrator.validate_improvements(&request, &Deadline::none());
    assert!(response.success);
    let improvements = response.improvements.unwrap();
    assert_eq!(improvements.score_increase, 44);
    assert_eq!(improvements.resolved_issues.len(), 4);
    assert!(improvements.remaining_issues.is_empty());
    assert_eq!(response.recommendation, Some(Recommendation::Accept));
}
