//! Vision model collaborator and the retrying critique client.
//!
//! The core owns the prompt and the schema coercion; it does not own the
//! model. [`VisionModel`] is the seam: raw model text in exchange for an
//! image and a prompt. [`VisionClient`] layers retries with jittered
//! exponential backoff and coercion on top, and degrades to a
//! `vision-unavailable` error after the attempt budget.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use tracing::{debug, warn};

use agentic_design_core::config::env_value;
use agentic_design_core::runtime::Deadline;
use agentic_design_core::{Error, Result, global_metrics};

use crate::critique::{VisualAnalysis, coerce_analysis, parse_json_safely};
use crate::prompt::{CritiqueContext, SYSTEM_PROMPT, build_forensic_prompt};
use crate::renderer::PngImage;

/// Determinism knobs for the vision call. Temperature stays at or below
/// 0.3; `top_p` is a hint the provider may ignore.
#[derive(Debug, Clone)]
pub struct VisionParams {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

impl Default for VisionParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.9,
            max_tokens: 2048,
        }
    }
}

/// External vision model: `(image, prompt)` in, raw text out.
pub trait VisionModel: Send + Sync {
    fn critique(&self, image: &PngImage, system: &str, prompt: &str, params: &VisionParams)
    -> Result<String>;
}

// ---------------------------------------------------------------------------
// Concurrency gate
// ---------------------------------------------------------------------------

/// Bounded concurrency for vision calls: `pool_size` run at once, up to
/// `queue_max` wait, and anything past that is shed with backpressure.
struct ConcurrencyGate {
    state: std::sync::Mutex<GateState>,
    freed: std::sync::Condvar,
    pool_size: usize,
    queue_max: usize,
}

struct GateState {
    in_flight: usize,
    waiting: usize,
}

struct GatePermit<'a> {
    gate: &'a ConcurrencyGate,
}

impl ConcurrencyGate {
    fn new(pool_size: usize, queue_max: usize) -> Self {
        Self {
            state: std::sync::Mutex::new(GateState {
                in_flight: 0,
                waiting: 0,
            }),
            freed: std::sync::Condvar::new(),
            pool_size: pool_size.max(1),
            queue_max,
        }
    }

    fn acquire(&self, deadline: &Deadline) -> Result<GatePermit<'_>> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.in_flight < self.pool_size {
            state.in_flight += 1;
            return Ok(GatePermit { gate: self });
        }
        if state.waiting >= self.queue_max {
            return Err(Error::Backpressure(format!(
                "vision queue full ({} waiting)",
                state.waiting
            )));
        }
        state.waiting += 1;
        let wait = deadline.remaining_or(Duration::from_secs(60));
        let (mut state, timed_out) = {
            let (guard, result) = self
                .freed
                .wait_timeout_while(state, wait, |s| s.in_flight >= self.pool_size)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            (guard, result.timed_out())
        };
        state.waiting -= 1;
        if timed_out {
            return Err(Error::Timeout {
                stage: "vision".to_string(),
            });
        }
        state.in_flight += 1;
        Ok(GatePermit { gate: self })
    }
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        let mut state = self
            .gate
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.in_flight -= 1;
        drop(state);
        self.gate.freed.notify_one();
    }
}

// ---------------------------------------------------------------------------
// Retrying client
// ---------------------------------------------------------------------------

/// Coerces, bounds, and retries around a [`VisionModel`].
pub struct VisionClient {
    model: Arc<dyn VisionModel>,
    params: VisionParams,
    retry_attempts: u32,
    gate: ConcurrencyGate,
}

/// Queue bound for callers waiting on a vision slot.
const VISION_QUEUE_MAX: usize = 32;

impl VisionClient {
    #[must_use]
    pub fn new(
        model: Arc<dyn VisionModel>,
        params: VisionParams,
        retry_attempts: u32,
        pool_size: usize,
    ) -> Self {
        Self {
            model,
            params,
            retry_attempts: retry_attempts.max(1),
            gate: ConcurrencyGate::new(pool_size, VISION_QUEUE_MAX),
        }
    }

    /// Run the forensic critique over one screenshot.
    ///
    /// Retries transport failures and uncoercible responses with jittered
    /// exponential backoff; after the budget the caller receives
    /// `vision-unavailable` and falls back to the deterministic path.
    pub fn critique(
        &self,
        image: &PngImage,
        context: &CritiqueContext,
        screenshot_id: &str,
        deadline: &Deadline,
    ) -> Result<VisualAnalysis> {
        let _permit = self.gate.acquire(deadline)?;
        let prompt = build_forensic_prompt(context);
        let metrics = global_metrics();
        let mut last_error = String::new();

        for attempt in 0..self.retry_attempts {
            deadline.check("vision")?;
            if attempt > 0 {
                metrics.vision_retries.inc();
                let delay = backoff_delay(attempt);
                std::thread::sleep(deadline.remaining_or(delay));
                deadline.check("vision")?;
            }
            metrics.vision_calls.inc();
            match self
                .model
                .critique(image, SYSTEM_PROMPT, &prompt, &self.params)
            {
                Ok(text) => match parse_json_safely(&text) {
                    Some(value) => match coerce_analysis(&value, screenshot_id) {
                        Ok(analysis) => return Ok(analysis),
                        Err(reason) => {
                            debug!(attempt, reason, "critique coercion failed");
                            last_error = reason;
                        }
                    },
                    None => {
                        debug!(attempt, "critique response carried no JSON");
                        last_error = "no JSON in response".to_string();
                    }
                },
                Err(e) => {
                    warn!(attempt, error = %e, "vision call failed");
                    last_error = e.to_string();
                }
            }
        }

        metrics.vision_failures.inc();
        Err(Error::VisionUnavailable {
            attempts: self.retry_attempts,
            detail: last_error,
        })
    }
}

/// Exponential backoff (250ms base, doubling) with ±25% jitter sourced
/// from the clock's sub-microsecond noise.
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 250u64.saturating_mul(1 << attempt.min(6));
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.subsec_nanos());
    let jitter_span = base_ms / 2; // ±25%
    let jitter = if jitter_span == 0 {
        0
    } else {
        u64::from(nanos) % jitter_span
    };
    Duration::from_millis(base_ms - base_ms / 4 + jitter)
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// OpenAI-compatible (or Anthropic) chat-completions vision call over the
/// asupersync HTTP/1 client.
pub struct HttpVisionModel {
    url: String,
    api_key: String,
    model_name: String,
}

impl HttpVisionModel {
    /// Build from `AGENTIC_VISION_*` environment variables. `None` when
    /// no API key is configured — the orchestrator then marks the vision
    /// component unavailable at construction.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let api_key = env_value("AGENTIC_VISION_API_KEY").filter(|v| !v.is_empty())?;
        let url = env_value("AGENTIC_VISION_API_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());
        let model_name = env_value("AGENTIC_VISION_MODEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        Some(Self {
            url,
            api_key,
            model_name,
        })
    }

    fn is_anthropic(&self) -> bool {
        self.url.contains("api.anthropic.com")
    }

    fn build_payload(
        &self,
        image: &PngImage,
        system: &str,
        prompt: &str,
        params: &VisionParams,
    ) -> serde_json::Value {
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(&image.bytes);
        if self.is_anthropic() {
            serde_json::json!({
                "model": self.model_name,
                "system": system,
                "max_tokens": params.max_tokens,
                "temperature": params.temperature,
                "top_p": params.top_p,
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "image", "source": {
                            "type": "base64", "media_type": "image/png", "data": image_b64
                        }},
                        {"type": "text", "text": prompt}
                    ]
                }]
            })
        } else {
            serde_json::json!({
                "model": self.model_name,
                "max_tokens": params.max_tokens,
                "temperature": params.temperature,
                "top_p": params.top_p,
                "messages": [
                    {"role": "system", "content": system},
                    {"role": "user", "content": [
                        {"type": "image_url", "image_url": {
                            "url": format!("data:image/png;base64,{image_b64}")
                        }},
                        {"type": "text", "text": prompt}
                    ]}
                ]
            })
        }
    }

    fn extract_content(&self, response: &serde_json::Value) -> String {
        if self.is_anthropic() {
            response
                .get("content")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("text"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or("")
                .to_string()
        } else {
            response
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("message"))
                .and_then(|m| m.get("content"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or("")
                .to_string()
        }
    }
}

impl VisionModel for HttpVisionModel {
    fn critique(
        &self,
        image: &PngImage,
        system: &str,
        prompt: &str,
        params: &VisionParams,
    ) -> Result<String> {
        let payload = self.build_payload(image, system, prompt, params);
        let body_bytes = serde_json::to_vec(&payload)?;

        let mut headers = vec![(
            "Content-Type".to_string(),
            "application/json".to_string(),
        )];
        if self.is_anthropic() {
            headers.push(("x-api-key".to_string(), self.api_key.clone()));
            headers.push(("anthropic-version".to_string(), "2023-06-01".to_string()));
        } else {
            headers.push(("Authorization".to_string(), format!("Bearer {}", self.api_key)));
        }

        let rt = asupersync::runtime::RuntimeBuilder::current_thread()
            .build()
            .map_err(|e| Error::DependencyUnavailable(format!("vision runtime: {e:?}")))?;
        let url = self.url.clone();
        let response = rt.block_on(async move {
            let client = asupersync::http::h1::HttpClient::new();
            client
                .request(asupersync::http::h1::Method::Post, &url, headers, body_bytes)
                .await
        });
        let response =
            response.map_err(|e| Error::DependencyUnavailable(format!("vision http: {e}")))?;

        if response.status != 200 {
            return Err(Error::DependencyUnavailable(format!(
                "vision status {}: {}",
                response.status,
                String::from_utf8_lossy(&response.body)
            )));
        }
        let json: serde_json::Value = serde_json::from_slice(&response.body)?;
        Ok(self.extract_content(&json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyModel {
        calls: AtomicU32,
        succeed_on: u32,
    }

    impl VisionModel for FlakyModel {
        fn critique(
            &self,
            _image: &PngImage,
            _system: &str,
            _prompt: &str,
            _params: &VisionParams,
        ) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < self.succeed_on {
                Err(Error::DependencyUnavailable("503".into()))
            } else {
                Ok(r#"{"overallScore": 70, "violations": []}"#.to_string())
            }
        }
    }

    fn image() -> PngImage {
        PngImage {
            bytes: vec![1, 2, 3],
            width: 10,
            height: 10,
        }
    }

    #[test]
    fn transport_failures_are_retried() {
        let model = Arc::new(FlakyModel {
            calls: AtomicU32::new(0),
            succeed_on: 3,
        });
        let client = VisionClient::new(
            Arc::clone(&model) as Arc<dyn VisionModel>,
            VisionParams::default(),
            3,
            8,
        );
        let analysis = client
            .critique(&image(), &CritiqueContext::default(), "shot", &Deadline::none())
            .unwrap();
        assert_eq!(analysis.overall_score, 70);
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn attempt_budget_exhaustion_is_vision_unavailable() {
        let model = Arc::new(FlakyModel {
            calls: AtomicU32::new(0),
            succeed_on: 99,
        });
        let client = VisionClient::new(model, VisionParams::default(), 2, 8);
        let err = client
            .critique(&image(), &CritiqueContext::default(), "shot", &Deadline::none())
            .unwrap_err();
        assert_eq!(err.kind(), "vision-unavailable");
    }

    struct ProseModel;

    impl VisionModel for ProseModel {
        fn critique(
            &self,
            _image: &PngImage,
            _system: &str,
            _prompt: &str,
            _params: &VisionParams,
        ) -> Result<String> {
            Ok("Sure! Here is the audit:\n```json\n{\"overallScore\": 58}\n```".to_string())
        }
    }

    #[test]
    fn fenced_responses_still_coerce() {
        let client = VisionClient::new(Arc::new(ProseModel), VisionParams::default(), 1, 8);
        let analysis = client
            .critique(&image(), &CritiqueContext::default(), "shot", &Deadline::none())
            .unwrap();
        assert_eq!(analysis.overall_score, 58);
    }

    #[test]
    fn concurrency_gate_sheds_overflow_and_recycles_slots() {
        let gate = ConcurrencyGate::new(1, 0);
        let permit = gate.acquire(&Deadline::none()).unwrap();
        let err = gate.acquire(&Deadline::none()).unwrap_err();
        assert_eq!(err.kind(), "backpressure");
        drop(permit);
        assert!(gate.acquire(&Deadline::none()).is_ok());
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let first = backoff_delay(1);
        let third = backoff_delay(3);
        assert!(third > first);
        assert!(first >= Duration::from_millis(375));
        assert!(first < Duration::from_millis(625 + 1));
    }
}
