//! Hermetic collaborator fakes for pipeline tests.
//!
//! `EchoRenderer` pretends the document bytes are the PNG, which lets a
//! scripted or inspecting vision fake see exactly what would have been
//! rendered. `ScriptedVision` replays canned model responses in order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use agentic_design_core::{Error, Result, Viewport};

use crate::renderer::{PngImage, Renderer};
use crate::vision::{VisionModel, VisionParams};

/// Renderer fake: the "PNG" is the document text itself.
#[derive(Debug, Default)]
pub struct EchoRenderer {
    pub renders: AtomicUsize,
}

impl Renderer for EchoRenderer {
    fn render(&self, html: &str, viewport: Viewport) -> Result<PngImage> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(PngImage {
            bytes: html.as_bytes().to_vec(),
            width: viewport.width,
            height: viewport.height,
        })
    }
}

/// Renderer fake that is permanently down.
#[derive(Debug, Default)]
pub struct OfflineRenderer;

impl Renderer for OfflineRenderer {
    fn render(&self, _html: &str, _viewport: Viewport) -> Result<PngImage> {
        Err(Error::DependencyUnavailable("renderer offline".into()))
    }
}

/// Vision fake replaying canned responses in order; errors when drained.
#[derive(Debug, Default)]
pub struct ScriptedVision {
    responses: Mutex<VecDeque<String>>,
    pub calls: AtomicUsize,
}

impl ScriptedVision {
    #[must_use]
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, response: impl Into<String>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response.into());
    }
}

impl VisionModel for ScriptedVision {
    fn critique(
        &self,
        _image: &PngImage,
        _system: &str,
        _prompt: &str,
        _params: &VisionParams,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| Error::DependencyUnavailable("scripted vision drained".into()))
    }
}

/// Vision fake that is permanently down.
#[derive(Debug, Default)]
pub struct OfflineVision;

impl VisionModel for OfflineVision {
    fn critique(
        &self,
        _image: &PngImage,
        _system: &str,
        _prompt: &str,
        _params: &VisionParams,
    ) -> Result<String> {
        Err(Error::DependencyUnavailable("vision offline".into()))
    }
}
