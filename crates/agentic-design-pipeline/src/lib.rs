//! The orchestrator: public entry points composing discovery, parsing,
//! transform, cache, capture, critique, routing, and pattern learning.
//!
//! Components are constructor-injected; a component whose construction
//! fails is parked in a permanent unavailable state that degraded-mode
//! decisions consult — the pipeline answers every request it can instead
//! of failing whole. Status events for a collaborator going down are
//! emitted once per transition, not per request.

#![forbid(unsafe_code)]

pub mod api;
pub mod router;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use agentic_design_cache::{
    CachedTransform, Lookup, MemoryCacheStore, SignatureInputs, Singleflight, TieredCache,
    TransformHistory, TransformLogEntry, TransformStatus, compute_signature, env_flags_hash,
};
use agentic_design_core::{
    AutoApplyMode, BrandPackStore, ChangeLog, CodeType, Config, Deadline, Diagnostic,
    DiagnosticKind, Error, Fragment, ProjectContext, Result, TokenSnapshot, correlation_id,
    discovery, global_metrics, now_utc,
};
use agentic_design_engine::{
    ENGINE_VERSION, OptimizationLevel, RulePolicy, TransformEngine, TransformOptions,
};
use agentic_design_patterns::{Observation, ObservationSource, PatternStore, StoreConfig};
use agentic_design_visual::{
    CaptureConfig, CapturePool, CritiqueContext, JanitorConfig, Renderer, Screenshot,
    VisionClient, VisionModel, VisionParams, VisualAnalysis, janitor, wrap_fragment,
};

pub use api::{
    AnalyzeRequest, AnalyzeResponse, EnhanceRequest, EnhanceResponse, Improvements,
    Recommendation, ResponseMeta, ResponsiveRequest, ResponsiveResponse, ValidateRequest,
    ValidateResponse, ViewportAnalysis,
};
pub use router::FixPlanEntry;

// ---------------------------------------------------------------------------
// Degraded-state tracking
// ---------------------------------------------------------------------------

/// One-shot down/up transition latches per collaborator.
#[derive(Debug, Default)]
struct AvailabilityLatch {
    cache_down: AtomicBool,
    vision_down: AtomicBool,
    renderer_down: AtomicBool,
}

impl AvailabilityLatch {
    /// Record that a collaborator is down; the status event fires only on
    /// the up→down transition.
    fn mark_down(flag: &AtomicBool, name: &str) {
        if !flag.swap(true, Ordering::AcqRel) {
            global_metrics().degraded_transitions.inc();
            warn!(collaborator = name, "entering degraded mode");
        }
    }

    fn mark_up(flag: &AtomicBool, name: &str) {
        if flag.swap(false, Ordering::AcqRel) {
            info!(collaborator = name, "collaborator recovered");
        }
    }
}

// ---------------------------------------------------------------------------
// Visual stack
// ---------------------------------------------------------------------------

/// Capture + critique components, present only when both collaborators
/// constructed successfully.
struct VisualStack {
    pool: CapturePool,
    vision: VisionClient,
    janitor_config: JanitorConfig,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Constructor-injection builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    config: Config,
    project_root: PathBuf,
    store: Arc<dyn BrandPackStore>,
    renderer: Option<Arc<dyn Renderer>>,
    vision_model: Option<Arc<dyn VisionModel>>,
    cache_primary: Option<Box<dyn agentic_design_cache::CacheStore>>,
    cache_secondary: Option<Box<dyn agentic_design_cache::CacheStore>>,
    screenshot_dir: Option<PathBuf>,
    pattern_journal: Option<PathBuf>,
    transform_log: Option<PathBuf>,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn BrandPackStore>) -> Self {
        Self {
            config,
            project_root: PathBuf::from("."),
            store,
            renderer: None,
            vision_model: None,
            cache_primary: None,
            cache_secondary: None,
            screenshot_dir: None,
            pattern_journal: None,
            transform_log: None,
        }
    }

    #[must_use]
    pub fn project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    #[must_use]
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    #[must_use]
    pub fn vision_model(mut self, model: Arc<dyn VisionModel>) -> Self {
        self.vision_model = Some(model);
        self
    }

    #[must_use]
    pub fn cache_stores(
        mut self,
        primary: Box<dyn agentic_design_cache::CacheStore>,
        secondary: Option<Box<dyn agentic_design_cache::CacheStore>>,
    ) -> Self {
        self.cache_primary = Some(primary);
        self.cache_secondary = secondary;
        self
    }

    #[must_use]
    pub fn screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn pattern_journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.pattern_journal = Some(path.into());
        self
    }

    /// Append applied change logs to an audit journal at `path`.
    #[must_use]
    pub fn transform_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.transform_log = Some(path.into());
        self
    }

    /// Assemble the orchestrator. Collaborators that fail to construct
    /// leave their component permanently unavailable instead of failing
    /// the build.
    #[must_use]
    pub fn build(self) -> Orchestrator {
        let policy = RulePolicy::with_max_auto_edits(self.config.auto_apply_max_changes);
        let engine = TransformEngine::new(policy);

        let primary = self
            .cache_primary
            .unwrap_or_else(|| Box::new(MemoryCacheStore::new(self.config.cache_max_entries)));
        let cache = TieredCache::new(
            primary,
            self.cache_secondary,
            Duration::from_secs(self.config.cache_ttl_days * 24 * 3600),
        );

        let patterns = PatternStore::open(StoreConfig {
            journal_path: self.pattern_journal,
            ..StoreConfig::default()
        });

        let visual = match (self.renderer, self.vision_model, self.screenshot_dir) {
            (Some(renderer), Some(model), Some(dir)) => {
                let capture_config = CaptureConfig {
                    pool_size: self.config.shot_pool_size,
                    queue_max: self.config.shot_queue_max,
                    capture_timeout: Duration::from_secs(self.config.capture_timeout_secs),
                    dir: dir.clone(),
                };
                match CapturePool::new(renderer, capture_config) {
                    Ok(pool) => {
                        let params = VisionParams {
                            temperature: self.config.vision_temperature,
                            ..VisionParams::default()
                        };
                        let vision = VisionClient::new(
                            model,
                            params,
                            self.config.vision_retry_attempts,
                            self.config.vision_pool_size,
                        );
                        let janitor_config = JanitorConfig {
                            dir,
                            max_age: Duration::from_secs(self.config.screenshot_max_age_secs),
                            max_files: self.config.screenshot_max_files,
                        };
                        Some(VisualStack {
                            pool,
                            vision,
                            janitor_config,
                        })
                    }
                    Err(e) => {
                        warn!(error = %e, "capture pool construction failed; visual loop unavailable");
                        None
                    }
                }
            }
            _ => None,
        };

        Orchestrator {
            flight: Singleflight::new(Duration::from_millis(self.config.coalesce_wait_ms)),
            config: self.config,
            project_root: self.project_root,
            store: self.store,
            engine,
            cache,
            patterns,
            visual,
            history: self.transform_log.map(TransformHistory::new),
            latch: AvailabilityLatch::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Result cached and shared between coalesced callers.
#[derive(Clone)]
struct ComputedTransform {
    payload: CachedTransform,
    diagnostics: Vec<Diagnostic>,
}

/// Everything a transform run needs, resolved once per request.
struct Prepared {
    fragment: Fragment,
    context: ProjectContext,
    snapshot: Arc<TokenSnapshot>,
    options: TransformOptions,
    component_type: String,
    diagnostics: Vec<Diagnostic>,
}

/// The public pipeline surface.
pub struct Orchestrator {
    config: Config,
    project_root: PathBuf,
    store: Arc<dyn BrandPackStore>,
    engine: TransformEngine,
    cache: TieredCache,
    flight: Singleflight<ComputedTransform>,
    patterns: PatternStore,
    visual: Option<VisualStack>,
    history: Option<TransformHistory>,
    latch: AvailabilityLatch,
}

impl Orchestrator {
    #[must_use]
    pub fn builder(config: Config, store: Arc<dyn BrandPackStore>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config, store)
    }

    #[must_use]
    pub const fn pattern_store(&self) -> &PatternStore {
        &self.patterns
    }

    // -----------------------------------------------------------------------
    // Enhance
    // -----------------------------------------------------------------------

    /// Deterministic enhancement: parse, transform, change log.
    #[must_use]
    pub fn enhance(&self, request: &EnhanceRequest, deadline: &Deadline) -> EnhanceResponse {
        let started = Instant::now();
        let correlation = correlation_id();
        global_metrics().enhance_requests.inc();
        match self.enhance_inner(request, deadline, false) {
            Ok(response) => finish_enhance(response, started, correlation),
            Err(e) => failure_enhance(&e, started, correlation),
        }
    }

    /// As [`Self::enhance`], but consults the signature cache first and
    /// coalesces concurrent misses on the same signature.
    #[must_use]
    pub fn enhance_cached(&self, request: &EnhanceRequest, deadline: &Deadline) -> EnhanceResponse {
        let started = Instant::now();
        let correlation = correlation_id();
        global_metrics().enhance_requests.inc();
        match self.enhance_inner(request, deadline, true) {
            Ok(response) => finish_enhance(response, started, correlation),
            Err(e) => failure_enhance(&e, started, correlation),
        }
    }

    /// Shared enhance path. `cached` selects the signature-cache route.
    fn enhance_inner(
        &self,
        request: &EnhanceRequest,
        deadline: &Deadline,
        cached: bool,
    ) -> Result<EnhanceResponse> {
        deadline.check("enhance")?;
        let prepared = self.prepare(
            &request.code,
            &request.code_type,
            request.file_path.as_deref(),
            request.brand_pack_id.as_deref(),
            request.brand_version.as_deref(),
            request.project_path.as_deref(),
            request.component_type.as_deref(),
            request.auto_apply.as_deref(),
            request.optimize.as_deref(),
        )?;

        if self.config.disabled {
            return Ok(echo_response(&prepared, prepared.diagnostics.clone(), None));
        }

        let mut cache_hit = None;
        let (payload, mut diagnostics) = if cached {
            let signature = self.signature_for(&prepared);
            match self.cache.lookup(&signature) {
                Lookup::Hit(payload) => {
                    AvailabilityLatch::mark_up(&self.latch.cache_down, "cache");
                    cache_hit = Some(true);
                    (payload, prepared.diagnostics.clone())
                }
                Lookup::Miss => {
                    AvailabilityLatch::mark_up(&self.latch.cache_down, "cache");
                    cache_hit = Some(false);
                    let (computed, _role) = self.flight.run(&signature, || {
                        let computed = self.run_transform(&prepared);
                        if !self.cache.store(&signature, computed.payload.clone()) {
                            AvailabilityLatch::mark_down(&self.latch.cache_down, "cache");
                        }
                        computed
                    });
                    let mut diags = prepared.diagnostics.clone();
                    diags.extend(computed.diagnostics);
                    (computed.payload, diags)
                }
                Lookup::Unavailable => {
                    AvailabilityLatch::mark_down(&self.latch.cache_down, "cache");
                    cache_hit = Some(false);
                    let computed = self.run_transform(&prepared);
                    let mut diags = prepared.diagnostics.clone();
                    diags.push(
                        Diagnostic::new(
                            DiagnosticKind::DependencyUnavailable,
                            "cache store unavailable; computed without caching",
                        )
                        .with_stage("cache"),
                    );
                    diags.extend(computed.diagnostics);
                    (computed.payload, diags)
                }
            }
        } else {
            let computed = self.run_transform(&prepared);
            let mut diags = prepared.diagnostics.clone();
            diags.extend(computed.diagnostics);
            (computed.payload, diags)
        };

        // Deadline may have lapsed while the transform ran; the result is
        // still well-formed, so return it marked partial.
        if deadline.is_expired() {
            diagnostics.push(
                Diagnostic::new(DiagnosticKind::Timeout, "deadline passed during transform")
                    .with_stage("enhance"),
            );
        }

        let suggestions = self.suggestions_for(&prepared, &payload.change_log);
        let degraded = prepared.context.is_degraded()
            || diagnostics
                .iter()
                .any(|d| d.kind == DiagnosticKind::DependencyUnavailable);

        Ok(EnhanceResponse {
            success: true,
            code: Some(payload.code),
            change_log: Some(payload.change_log),
            suggestions,
            diagnostics,
            metadata: ResponseMeta {
                cache_hit,
                brand_pack_source: Some(prepared.context.source.to_string()),
                degraded,
                ..ResponseMeta::default()
            },
        })
    }

    /// Resolve context, parse options, and build the token snapshot.
    #[allow(clippy::too_many_arguments)]
    fn prepare(
        &self,
        code: &str,
        code_type: &str,
        file_path: Option<&str>,
        brand_pack_id: Option<&str>,
        brand_version: Option<&str>,
        project_path: Option<&str>,
        component_type: Option<&str>,
        auto_apply: Option<&str>,
        optimize: Option<&str>,
    ) -> Result<Prepared> {
        if code.is_empty() {
            return Err(Error::MissingField("code".to_string()));
        }
        let code_type: CodeType = code_type.parse()?;

        let mut config = self.config.clone();
        if let Some(id) = brand_pack_id {
            config.brand_pack_id = Some(id.to_string());
            config.brand_version = brand_version.map(str::to_string);
        }
        let root = project_path.map_or_else(|| self.project_root.clone(), PathBuf::from);

        let resolved = discovery::resolve(&config, &root, self.store.as_ref())?;
        let snapshot = resolved.pack.as_ref().map_or_else(
            || Arc::new(TokenSnapshot::default()),
            |pack| Arc::new(TokenSnapshot::compile(pack, &resolved.context.overrides)),
        );

        let options = TransformOptions {
            auto_apply: auto_apply.map_or(config.auto_apply, AutoApplyMode::parse),
            optimization: optimize.and_then(parse_optimization),
            guidance: agentic_design_engine::VisualGuidance::default(),
        };

        let mut fragment = Fragment::new(code_type, code);
        if let Some(path) = file_path {
            fragment = fragment.with_path(path);
        }

        Ok(Prepared {
            fragment,
            context: resolved.context,
            snapshot,
            options,
            component_type: component_type.unwrap_or("generic").to_string(),
            diagnostics: resolved.diagnostics,
        })
    }

    fn signature_for(&self, prepared: &Prepared) -> String {
        let (pack_id, version) = prepared.context.brand_pack.as_ref().map_or(
            ("unbound".to_string(), "none".to_string()),
            |r| (r.id.clone(), r.version.clone()),
        );
        let overrides_hash = if prepared.snapshot.overrides_hash.is_empty() {
            "none".to_string()
        } else {
            prepared.snapshot.overrides_hash.clone()
        };
        let flags = env_flags_hash(
            prepared.options.auto_apply,
            self.engine.policy().max_auto_edits,
            prepared
                .options
                .optimization
                .map(|level| match level {
                    OptimizationLevel::Basic => "basic",
                    OptimizationLevel::Aggressive => "aggressive",
                }),
        );
        compute_signature(&SignatureInputs {
            code: &prepared.fragment.code,
            brand_pack_id: &pack_id,
            resolved_version: &version,
            engine_version: ENGINE_VERSION,
            ruleset: &self.engine.policy().fingerprint(),
            overrides_hash: &overrides_hash,
            code_type: prepared.fragment.code_type,
            env_flags_hash: &flags,
        })
    }

    /// Run the engine, record pattern observations for applied edits, and
    /// append the audit-log entry when a transform journal is configured.
    fn run_transform(&self, prepared: &Prepared) -> ComputedTransform {
        let started = Instant::now();
        let outcome = self
            .engine
            .transform(&prepared.fragment, &prepared.snapshot, &prepared.options);

        if let Some(history) = &self.history {
            let status = if !outcome.change_log.applied.is_empty() {
                TransformStatus::Applied
            } else if prepared.context.is_degraded() {
                TransformStatus::Degraded
            } else {
                TransformStatus::AdvisoryOnly
            };
            let mut entry = TransformLogEntry::new(
                self.signature_for(prepared),
                status,
                started.elapsed().as_millis() as u64,
            );
            entry.applied_count = outcome.change_log.applied.len();
            entry.advisory_count = outcome.change_log.advisory.len();
            entry.rejected_count = outcome.change_log.rejected.len();
            for diagnostic in &outcome.diagnostics {
                if diagnostic.kind == DiagnosticKind::GuardrailViolation {
                    let flag = if diagnostic.message.contains("change cap") {
                        "change-cap"
                    } else {
                        "contrast-regression"
                    };
                    if !entry.guardrail_flags.iter().any(|f| f == flag) {
                        entry.guardrail_flags.push(flag.to_string());
                    }
                }
            }
            if outcome
                .change_log
                .rejected
                .iter()
                .any(|r| r.reason == "reparse-failed")
            {
                entry.guardrail_flags.push("reparse-failed".to_string());
            }
            history.record(&entry);
        }

        for edit in &outcome.change_log.applied {
            if let Some(token) = token_name(&edit.after) {
                self.patterns.observe(&Observation {
                    project_id: prepared.context.project_id.clone(),
                    component_type: prepared.component_type.clone(),
                    rule_id: edit.rule_id.clone(),
                    token,
                    accepted: true,
                    source: ObservationSource::Applied,
                    observed_at: now_utc(),
                });
            }
        }
        ComputedTransform {
            payload: CachedTransform {
                code: outcome.code,
                change_log: outcome.change_log,
            },
            diagnostics: outcome.diagnostics,
        }
    }

    fn suggestions_for(
        &self,
        prepared: &Prepared,
        change_log: &ChangeLog,
    ) -> Vec<agentic_design_patterns::PatternSuggestion> {
        let candidates: Vec<(String, String)> = change_log
            .applied
            .iter()
            .chain(change_log.advisory.iter())
            .filter_map(|edit| token_name(&edit.after).map(|t| (edit.rule_id.clone(), t)))
            .collect();
        if candidates.is_empty() {
            return Vec::new();
        }
        self.patterns.suggestions(
            &prepared.context.project_id,
            &prepared.component_type,
            &candidates,
            5,
        )
    }

    // -----------------------------------------------------------------------
    // Visual loop
    // -----------------------------------------------------------------------

    /// Capture → critique → plan, and (policy permitting) apply the plan
    /// with before/after validation.
    #[must_use]
    pub fn analyze_and_fix(&self, request: &AnalyzeRequest, deadline: &Deadline) -> AnalyzeResponse {
        let started = Instant::now();
        let correlation = correlation_id();
        match self.analyze_inner(request, deadline) {
            Ok(response) => finish_analyze(response, started, correlation),
            Err(e) => failure_analyze(&e, started, correlation),
        }
    }

    fn analyze_inner(&self, request: &AnalyzeRequest, deadline: &Deadline) -> Result<AnalyzeResponse> {
        deadline.check("analyze")?;
        let prepared = self.prepare(
            &request.code,
            &request.code_type,
            None,
            request.brand_pack_id.as_deref(),
            None,
            request.project_path.as_deref(),
            request.component_type.as_deref(),
            request.auto_apply.as_deref(),
            None,
        )?;
        let viewport = request.viewport.unwrap_or(agentic_design_core::Viewport::DESKTOP);

        let (analysis, mut diagnostics) =
            match self.capture_and_critique(&prepared, viewport, deadline) {
                Ok((analysis, _shot)) => (Some(analysis), prepared.diagnostics.clone()),
                Err(e) if e.is_degradable() => {
                    let mut diags = prepared.diagnostics.clone();
                    diags.push(Diagnostic::from_error(&e).with_stage("visual"));
                    (None, diags)
                }
                Err(e) => return Err(e),
            };

        let Some(analysis) = analysis else {
            // Deterministic fallback: plain enhancement, no visual loop.
            let computed = self.run_transform(&prepared);
            diagnostics.extend(computed.diagnostics);
            return Ok(AnalyzeResponse {
                success: true,
                visual_analysis: None,
                fix_plan: Vec::new(),
                code: Some(computed.payload.code),
                change_log: Some(computed.payload.change_log),
                post_analysis: None,
                score_delta: None,
                recommendation: None,
                diagnostics,
                metadata: ResponseMeta {
                    degraded: true,
                    ..ResponseMeta::default()
                },
            });
        };

        let fix_plan = router::plan(&analysis, self.config.fix_plan_cap);
        let auto_apply = request
            .auto_apply
            .as_deref()
            .map_or(self.config.auto_apply, AutoApplyMode::parse);

        if auto_apply == AutoApplyMode::Off || fix_plan.is_empty() {
            return Ok(AnalyzeResponse {
                success: true,
                visual_analysis: Some(analysis),
                fix_plan,
                code: None,
                change_log: None,
                post_analysis: None,
                score_delta: None,
                recommendation: None,
                diagnostics,
                metadata: ResponseMeta::default(),
            });
        }

        // Execute sequentially: each fix sees the previous fix's output.
        let mut current = prepared.fragment.code.clone();
        let mut merged = ChangeLog::default();
        for entry in &fix_plan {
            deadline.check("router")?;
            let options = TransformOptions {
                auto_apply,
                optimization: None,
                guidance: router::guidance_for(entry),
            };
            let fragment = Fragment {
                code: current.clone(),
                ..prepared.fragment.clone()
            };
            let outcome = self.engine.transform(&fragment, &prepared.snapshot, &options);
            diagnostics.extend(outcome.diagnostics);
            merged.extend(outcome.change_log);
            current = outcome.code;
        }
        self.observe_applied(&prepared, &merged);

        let (post_analysis, score_delta, recommendation) = if request.validate_after_fix {
            let improved = Prepared {
                fragment: Fragment {
                    code: current.clone(),
                    ..prepared.fragment.clone()
                },
                context: prepared.context.clone(),
                snapshot: Arc::clone(&prepared.snapshot),
                options: TransformOptions::default(),
                component_type: prepared.component_type.clone(),
                diagnostics: Vec::new(),
            };
            match self.capture_and_critique(&improved, viewport, deadline) {
                Ok((post, _shot)) => {
                    let delta = post.overall_score - analysis.overall_score;
                    let recommendation = self.recommend(delta);
                    (Some(post), Some(delta), Some(recommendation))
                }
                Err(e) if e.is_degradable() => {
                    diagnostics.push(Diagnostic::from_error(&e).with_stage("post-validation"));
                    (None, None, None)
                }
                Err(e) => return Err(e),
            }
        } else {
            (None, None, None)
        };

        Ok(AnalyzeResponse {
            success: true,
            visual_analysis: Some(analysis),
            fix_plan,
            code: Some(current),
            change_log: Some(merged),
            post_analysis,
            score_delta,
            recommendation,
            diagnostics,
            metadata: ResponseMeta::default(),
        })
    }

    /// Two captures, two critiques, and the diff between them.
    #[must_use]
    pub fn validate_improvements(
        &self,
        request: &ValidateRequest,
        deadline: &Deadline,
    ) -> ValidateResponse {
        let started = Instant::now();
        let correlation = correlation_id();
        match self.validate_inner(request, deadline) {
            Ok(response) => finish_validate(response, started, correlation),
            Err(e) => failure_validate(&e, started, correlation),
        }
    }

    fn validate_inner(&self, request: &ValidateRequest, deadline: &Deadline) -> Result<ValidateResponse> {
        deadline.check("validate")?;
        let original = self.prepare(
            &request.original_code,
            &request.code_type,
            None,
            None,
            None,
            None,
            request.component_type.as_deref(),
            None,
            None,
        )?;
        let improved = self.prepare(
            &request.improved_code,
            &request.code_type,
            None,
            None,
            None,
            None,
            request.component_type.as_deref(),
            None,
            None,
        )?;
        let viewport = request.viewport.unwrap_or(agentic_design_core::Viewport::DESKTOP);

        let before = self.capture_and_critique(&original, viewport, deadline);
        let after = self.capture_and_critique(&improved, viewport, deadline);
        let (before, after) = match (before, after) {
            (Ok((b, _)), Ok((a, _))) => (b, a),
            (Err(e), _) | (_, Err(e)) if e.is_degradable() => {
                return Ok(ValidateResponse {
                    success: true,
                    improvements: None,
                    recommendation: None,
                    diagnostics: vec![Diagnostic::from_error(&e).with_stage("visual")],
                    metadata: ResponseMeta {
                        degraded: true,
                        ..ResponseMeta::default()
                    },
                });
            }
            (Err(e), _) | (_, Err(e)) => return Err(e),
        };

        let score_increase = after.overall_score - before.overall_score;
        let percentage = if before.overall_score > 0 {
            (score_increase as f64 / before.overall_score as f64 * 100.0).round() as i64
        } else {
            0
        };
        let after_keys: Vec<String> = after.violations.iter().map(violation_key).collect();
        let resolved_issues: Vec<String> = before
            .violations
            .iter()
            .filter(|v| !after_keys.contains(&violation_key(v)))
            .map(violation_key)
            .collect();
        let remaining_issues = after_keys;
        let category_improvements = after
            .dimension_scores
            .delta(&before.dimension_scores)
            .iter()
            .map(|(name, delta)| ((*name).to_string(), *delta))
            .collect();

        Ok(ValidateResponse {
            success: true,
            improvements: Some(Improvements {
                score_increase,
                percentage_increase: percentage,
                resolved_issues,
                remaining_issues,
                category_improvements,
            }),
            recommendation: Some(self.recommend(score_increase)),
            diagnostics: Vec::new(),
            metadata: ResponseMeta::default(),
        })
    }

    /// Fan out one fragment across several viewports and join the
    /// critiques into a single consistency report.
    #[must_use]
    pub fn analyze_responsive(
        &self,
        request: &ResponsiveRequest,
        deadline: &Deadline,
    ) -> ResponsiveResponse {
        let started = Instant::now();
        let correlation = correlation_id();
        match self.responsive_inner(request, deadline) {
            Ok(response) => finish_responsive(response, started, correlation),
            Err(e) => failure_responsive(&e, started, correlation),
        }
    }

    fn responsive_inner(
        &self,
        request: &ResponsiveRequest,
        deadline: &Deadline,
    ) -> Result<ResponsiveResponse> {
        deadline.check("responsive")?;
        let prepared = self.prepare(
            &request.code,
            &request.code_type,
            None,
            None,
            None,
            None,
            request.component_type.as_deref(),
            None,
            None,
        )?;
        let viewports = if request.viewports.is_empty() {
            vec![
                agentic_design_core::Viewport::MOBILE,
                agentic_design_core::Viewport::TABLET,
                agentic_design_core::Viewport::DESKTOP,
            ]
        } else {
            request.viewports.clone()
        };

        let mut analyses: Vec<ViewportAnalysis> = Vec::new();
        let mut diagnostics = prepared.diagnostics.clone();
        for viewport in viewports {
            deadline.check("responsive")?;
            match self.capture_and_critique(&prepared, viewport, deadline) {
                Ok((analysis, _shot)) => analyses.push(ViewportAnalysis { viewport, analysis }),
                Err(e) if e.is_degradable() => {
                    diagnostics.push(
                        Diagnostic::from_error(&e).with_stage(format!("viewport {viewport}")),
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let (responsive_score, responsive_issues, recommendations) =
            cross_viewport_findings(&analyses);
        Ok(ResponsiveResponse {
            success: true,
            responsive_score,
            viewport_analyses: analyses,
            responsive_issues,
            recommendations,
            diagnostics,
            metadata: ResponseMeta::default(),
        })
    }

    /// Wrap, capture, critique. Sweeps the screenshot directory after
    /// each critique (opportunistic janitor pass).
    fn capture_and_critique(
        &self,
        prepared: &Prepared,
        viewport: agentic_design_core::Viewport,
        deadline: &Deadline,
    ) -> Result<(VisualAnalysis, Screenshot)> {
        let Some(visual) = &self.visual else {
            AvailabilityLatch::mark_down(&self.latch.renderer_down, "renderer");
            return Err(Error::DependencyUnavailable(
                "visual stack not constructed".to_string(),
            ));
        };

        let doc = wrap_fragment(&prepared.fragment, viewport);
        let shot = match visual.pool.capture(doc, viewport, deadline) {
            Ok(shot) => {
                AvailabilityLatch::mark_up(&self.latch.renderer_down, "renderer");
                shot
            }
            Err(e) => {
                if matches!(e, Error::Renderer(_) | Error::DependencyUnavailable(_)) {
                    AvailabilityLatch::mark_down(&self.latch.renderer_down, "renderer");
                }
                return Err(e);
            }
        };

        let image = agentic_design_visual::PngImage {
            bytes: std::fs::read(&shot.path).unwrap_or_default(),
            width: shot.width,
            height: shot.height,
        };
        let context = CritiqueContext {
            component_type: Some(prepared.component_type.clone()),
            brand_summary: prepared.context.brand_pack.as_ref().map(|r| {
                format!("{}@{} ({} tokens)", r.id, r.version, prepared.snapshot.token_count())
            }),
            viewport: Some(viewport),
        };
        let result = visual.vision.critique(&image, &context, &shot.id, deadline);
        match &result {
            Ok(_) => AvailabilityLatch::mark_up(&self.latch.vision_down, "vision"),
            Err(Error::VisionUnavailable { .. } | Error::DependencyUnavailable(_)) => {
                AvailabilityLatch::mark_down(&self.latch.vision_down, "vision");
            }
            Err(_) => {}
        }
        let analysis = result?;

        let _ = janitor::sweep(&visual.janitor_config);
        Ok((analysis, shot))
    }

    fn observe_applied(&self, prepared: &Prepared, change_log: &ChangeLog) {
        for edit in &change_log.applied {
            if let Some(token) = token_name(&edit.after) {
                self.patterns.observe(&Observation {
                    project_id: prepared.context.project_id.clone(),
                    component_type: prepared.component_type.clone(),
                    rule_id: edit.rule_id.clone(),
                    token,
                    accepted: true,
                    source: ObservationSource::Applied,
                    observed_at: now_utc(),
                });
            }
        }
    }

    const fn recommend(&self, delta: i64) -> Recommendation {
        if delta >= self.config.accept_threshold as i64 {
            Recommendation::Accept
        } else if delta > 0 {
            Recommendation::Review
        } else {
            Recommendation::Reject
        }
    }

    /// Structured status report for operators (CLI `doctor`).
    #[must_use]
    pub fn status_report(&self) -> serde_json::Value {
        serde_json::json!({
            "generatedAt": now_utc(),
            "engineVersion": ENGINE_VERSION,
            "policy": self.engine.policy(),
            "components": {
                "cache": !self.latch.cache_down.load(Ordering::Acquire),
                "renderer": self.visual.is_some() && !self.latch.renderer_down.load(Ordering::Acquire),
                "vision": self.visual.is_some() && !self.latch.vision_down.load(Ordering::Acquire),
            },
            "cacheEntries": self.cache.entry_count(),
            "patternCount": self.patterns.pattern_count(),
            "inflightTransforms": self.flight.inflight_count(),
            "metrics": global_metrics().snapshot(),
        })
    }

    /// Sweep expired cache entries; returns how many were removed.
    pub fn cache_maintenance(&self) -> usize {
        self.cache.sweep()
    }

    /// Explicit accept/reject feedback on a previously surfaced token
    /// choice; folds into the same aggregate as applied observations.
    pub fn record_feedback(
        &self,
        project_id: &str,
        component_type: &str,
        rule_id: &str,
        token: &str,
        accepted: bool,
    ) {
        self.patterns.observe(&Observation {
            project_id: project_id.to_string(),
            component_type: component_type.to_string(),
            rule_id: rule_id.to_string(),
            token: token.to_string(),
            accepted,
            source: ObservationSource::Feedback,
            observed_at: now_utc(),
        });
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `var(--spacing-md)` → `spacing-md`; utility forms like
/// `p-[var(--spacing-md)]` resolve to the inner reference.
fn token_name(after: &str) -> Option<String> {
    let start = after.find("var(--")?;
    let rest = &after[start + 6..];
    let end = rest.find(')')?;
    Some(rest[..end].to_string())
}

fn parse_optimization(raw: &str) -> Option<OptimizationLevel> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "basic" | "1" | "true" => Some(OptimizationLevel::Basic),
        "aggressive" | "2" => Some(OptimizationLevel::Aggressive),
        _ => None,
    }
}

fn violation_key(violation: &agentic_design_visual::Violation) -> String {
    format!(
        "{}:{}",
        violation.recommended_endpoint, violation.location
    )
}

fn echo_response(prepared: &Prepared, diagnostics: Vec<Diagnostic>, cache_hit: Option<bool>) -> EnhanceResponse {
    EnhanceResponse {
        success: true,
        code: Some(prepared.fragment.code.clone()),
        change_log: Some(ChangeLog::default()),
        suggestions: Vec::new(),
        diagnostics,
        metadata: ResponseMeta {
            cache_hit,
            brand_pack_source: Some(prepared.context.source.to_string()),
            degraded: false,
            ..ResponseMeta::default()
        },
    }
}

/// Score spread and dimension findings across viewport analyses.
fn cross_viewport_findings(
    analyses: &[ViewportAnalysis],
) -> (i64, Vec<String>, Vec<String>) {
    if analyses.is_empty() {
        return (0, vec!["no viewport could be analyzed".to_string()], Vec::new());
    }
    let scores: Vec<i64> = analyses.iter().map(|a| a.analysis.overall_score).collect();
    let min = scores.iter().copied().min().unwrap_or(0);
    let max = scores.iter().copied().max().unwrap_or(0);
    let mean = scores.iter().sum::<i64>() / scores.len() as i64;

    let mut issues = Vec::new();
    let mut recommendations = Vec::new();
    if max - min > 15 {
        let worst = analyses
            .iter()
            .min_by_key(|a| a.analysis.overall_score)
            .expect("non-empty analyses");
        issues.push(format!(
            "score varies {min}-{max} across viewports; worst at {}",
            worst.viewport
        ));
        for violation in worst.analysis.violations.iter().take(3) {
            recommendations.push(format!(
                "{} at {} ({})",
                violation.recommended_endpoint, worst.viewport, violation.location
            ));
        }
    }
    (mean, issues, recommendations)
}

// ---------------------------------------------------------------------------
// Envelope finishing
// ---------------------------------------------------------------------------

fn meta(started: Instant, correlation: String, mut base: ResponseMeta) -> ResponseMeta {
    base.duration_ms = started.elapsed().as_millis() as u64;
    base.correlation_id = correlation;
    base
}

fn finish_enhance(mut r: EnhanceResponse, started: Instant, correlation: String) -> EnhanceResponse {
    r.metadata = meta(started, correlation, r.metadata);
    r
}

fn failure_enhance(error: &Error, started: Instant, correlation: String) -> EnhanceResponse {
    let success = error.is_degradable();
    EnhanceResponse {
        success,
        code: None,
        change_log: None,
        suggestions: Vec::new(),
        diagnostics: vec![Diagnostic::from_error(error)],
        metadata: meta(started, correlation, ResponseMeta {
            degraded: success,
            ..ResponseMeta::default()
        }),
    }
}

fn finish_analyze(mut r: AnalyzeResponse, started: Instant, correlation: String) -> AnalyzeResponse {
    r.metadata = meta(started, correlation, r.metadata);
    r
}

fn failure_analyze(error: &Error, started: Instant, correlation: String) -> AnalyzeResponse {
    let success = error.is_degradable();
    AnalyzeResponse {
        success,
        visual_analysis: None,
        fix_plan: Vec::new(),
        code: None,
        change_log: None,
        post_analysis: None,
        score_delta: None,
        recommendation: None,
        diagnostics: vec![Diagnostic::from_error(error)],
        metadata: meta(started, correlation, ResponseMeta {
            degraded: success,
            ..ResponseMeta::default()
        }),
    }
}

fn finish_validate(mut r: ValidateResponse, started: Instant, correlation: String) -> ValidateResponse {
    r.metadata = meta(started, correlation, r.metadata);
    r
}

fn failure_validate(error: &Error, started: Instant, correlation: String) -> ValidateResponse {
    let success = error.is_degradable();
    ValidateResponse {
        success,
        improvements: None,
        recommendation: None,
        diagnostics: vec![Diagnostic::from_error(error)],
        metadata: meta(started, correlation, ResponseMeta {
            degraded: success,
            ..ResponseMeta::default()
        }),
    }
}

fn finish_responsive(mut r: ResponsiveResponse, started: Instant, correlation: String) -> ResponsiveResponse {
    r.metadata = meta(started, correlation, r.metadata);
    r
}

fn failure_responsive(error: &Error, started: Instant, correlation: String) -> ResponsiveResponse {
    let success = error.is_degradable();
    ResponsiveResponse {
        success,
        responsive_score: 0,
        viewport_analyses: Vec::new(),
        responsive_issues: Vec::new(),
        recommendations: Vec::new(),
        diagnostics: vec![Diagnostic::from_error(error)],
        metadata: meta(started, correlation, ResponseMeta {
            degraded: success,
            ..ResponseMeta::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_name_extracts_from_references() {
        assert_eq!(token_name("var(--spacing-md)").as_deref(), Some("spacing-md"));
        assert_eq!(
            token_name("p-[var(--spacing-md)]").as_deref(),
            Some("spacing-md")
        );
        assert_eq!(
            token_name("var(--spacing-md) var(--spacing-lg)").as_deref(),
            Some("spacing-md")
        );
        assert!(token_name("16px").is_none());
    }

    #[test]
    fn optimization_parse_accepts_levels() {
        assert_eq!(parse_optimization("basic"), Some(OptimizationLevel::Basic));
        assert_eq!(
            parse_optimization("AGGRESSIVE"),
            Some(OptimizationLevel::Aggressive)
        );
        assert_eq!(parse_optimization("nope"), None);
    }
}
