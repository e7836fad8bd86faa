//! Bounded screenshot capture pool.
//!
//! A fixed set of worker threads drains a bounded job queue; overflow is
//! rejected immediately with a backpressure error rather than queueing
//! without bound. Each capture carries a timeout: when it fires, the
//! caller gets a timeout error and the worker that was wedged replaces
//! itself with a fresh thread once the render call returns (a renderer
//! that misbehaved once is not trusted again).

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use agentic_design_core::runtime::Deadline;
use agentic_design_core::{Error, Result, Viewport, correlation_id, global_metrics, now_utc};

use crate::renderer::Renderer;

/// Pool sizing and storage knobs.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub pool_size: usize,
    pub queue_max: usize,
    pub capture_timeout: Duration,
    /// Directory screenshots are written into (owned by the janitor for
    /// deletes).
    pub dir: PathBuf,
}

impl CaptureConfig {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            pool_size: 4,
            queue_max: 32,
            capture_timeout: Duration::from_secs(15),
            dir: dir.into(),
        }
    }
}

/// A captured screenshot, referenced by immutable id.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Screenshot {
    pub id: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub size_bytes: usize,
    pub created_at: DateTime<Utc>,
}

struct Job {
    doc: String,
    viewport: Viewport,
    reply: Sender<Result<Screenshot>>,
    /// Set by the caller when it stopped waiting; the worker treats the
    /// renderer as poisoned and replaces itself.
    abandoned: Arc<AtomicBool>,
    deadline: Deadline,
}

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    ready: Condvar,
    shutdown: AtomicBool,
    config: CaptureConfig,
}

/// Bounded pool of renderer workers.
pub struct CapturePool {
    shared: Arc<Shared>,
    renderer: Arc<dyn Renderer>,
}

impl CapturePool {
    /// Create the screenshot directory and spawn the workers.
    pub fn new(renderer: Arc<dyn Renderer>, config: CaptureConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.dir)?;
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            shutdown: AtomicBool::new(false),
            config,
        });
        for _ in 0..shared.config.pool_size.max(1) {
            spawn_worker(Arc::clone(&shared), Arc::clone(&renderer));
        }
        Ok(Self { shared, renderer })
    }

    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Capture a wrapped document at the given viewport.
    ///
    /// Returns `Backpressure` when the queue is full and `Timeout` when
    /// the capture misses its bound or the caller's deadline.
    pub fn capture(
        &self,
        doc: String,
        viewport: Viewport,
        deadline: &Deadline,
    ) -> Result<Screenshot> {
        deadline.check("capture")?;
        let metrics = global_metrics();
        let (reply_tx, reply_rx) = std::sync::mpsc::channel();
        let abandoned = Arc::new(AtomicBool::new(false));
        {
            let mut queue = self
                .shared
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if queue.len() >= self.shared.config.queue_max {
                metrics.capture_backpressure.inc();
                return Err(Error::Backpressure(format!(
                    "screenshot queue full ({} pending)",
                    queue.len()
                )));
            }
            queue.push_back(Job {
                doc,
                viewport,
                reply: reply_tx,
                abandoned: Arc::clone(&abandoned),
                deadline: deadline.clone(),
            });
            metrics.capture_queue_depth.add(1);
        }
        self.shared.ready.notify_one();

        let wait = deadline.remaining_or(self.shared.config.capture_timeout);
        match reply_rx.recv_timeout(wait) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                abandoned.store(true, Ordering::Release);
                metrics.capture_timeouts.inc();
                Err(Error::Timeout {
                    stage: "capture".to_string(),
                })
            }
        }
    }

    /// Signal workers to exit after their current job.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.ready.notify_all();
    }

    /// Renderer handle, shared with worker replacements.
    #[must_use]
    pub fn renderer(&self) -> Arc<dyn Renderer> {
        Arc::clone(&self.renderer)
    }
}

impl Drop for CapturePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(shared: Arc<Shared>, renderer: Arc<dyn Renderer>) {
    let builder = std::thread::Builder::new().name("capture-worker".into());
    let spawned = builder.spawn(move || worker_loop(&shared, &renderer));
    if let Err(e) = spawned {
        warn!(error = %e, "failed to spawn capture worker");
    }
}

fn worker_loop(shared: &Arc<Shared>, renderer: &Arc<dyn Renderer>) {
    loop {
        let job = {
            let mut queue = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
            loop {
                if shared.shutdown.load(Ordering::Acquire) {
                    return;
                }
                if let Some(job) = queue.pop_front() {
                    global_metrics().capture_queue_depth.add(-1);
                    break job;
                }
                queue = shared
                    .ready
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        if job.deadline.is_expired() {
            let _ = job.reply.send(Err(Error::Timeout {
                stage: "capture".to_string(),
            }));
            continue;
        }

        let result = run_capture(shared, renderer, &job);
        if job.abandoned.load(Ordering::Acquire) {
            // The caller gave up while we rendered. Treat the renderer as
            // suspect: hand our slot to a fresh worker.
            debug!("capture worker replacing itself after an abandoned job");
            if !shared.shutdown.load(Ordering::Acquire) {
                spawn_worker(Arc::clone(shared), Arc::clone(renderer));
            }
            return;
        }
        let _ = job.reply.send(result);
    }
}

fn run_capture(shared: &Shared, renderer: &Arc<dyn Renderer>, job: &Job) -> Result<Screenshot> {
    global_metrics().captures_total.inc();
    let image = renderer.render(&job.doc, job.viewport)?;
    let id = format!("shot-{}", correlation_id());
    let path = shared.config.dir.join(format!("{id}.png"));
    std::fs::write(&path, &image.bytes)?;
    Ok(Screenshot {
        id,
        path,
        width: image.width,
        height: image.height,
        size_bytes: image.bytes.len(),
        created_at: now_utc(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::PngImage;
    use std::sync::atomic::AtomicUsize;

    /// Renderer that sleeps once (first call), then answers instantly.
    struct SleepyOnceRenderer {
        slept: AtomicBool,
        delay: Duration,
    }

    impl Renderer for SleepyOnceRenderer {
        fn render(&self, html: &str, viewport: Viewport) -> Result<PngImage> {
            if !self.slept.swap(true, Ordering::SeqCst) {
                std::thread::sleep(self.delay);
            }
            Ok(PngImage {
                bytes: html.as_bytes().to_vec(),
                width: viewport.width,
                height: viewport.height,
            })
        }
    }

    struct InstantRenderer {
        calls: AtomicUsize,
    }

    impl Renderer for InstantRenderer {
        fn render(&self, html: &str, viewport: Viewport) -> Result<PngImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PngImage {
                bytes: html.as_bytes().to_vec(),
                width: viewport.width,
                height: viewport.height,
            })
        }
    }

    fn pool_config(dir: &std::path::Path, pool: usize, queue: usize, timeout_ms: u64) -> CaptureConfig {
        CaptureConfig {
            pool_size: pool,
            queue_max: queue,
            capture_timeout: Duration::from_millis(timeout_ms),
            dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn capture_writes_a_screenshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(InstantRenderer {
            calls: AtomicUsize::new(0),
        });
        let pool = CapturePool::new(renderer, pool_config(dir.path(), 2, 8, 1000)).unwrap();
        let shot = pool
            .capture("<html></html>".into(), Viewport::DESKTOP, &Deadline::none())
            .unwrap();
        assert!(shot.path.exists());
        assert_eq!(shot.width, 1280);
        assert_eq!(shot.size_bytes, "<html></html>".len());
    }

    #[test]
    fn timeout_returns_error_and_pool_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(SleepyOnceRenderer {
            slept: AtomicBool::new(false),
            delay: Duration::from_millis(400),
        });
        let pool = CapturePool::new(renderer, pool_config(dir.path(), 1, 8, 50)).unwrap();

        let err = pool
            .capture("<html>1</html>".into(), Viewport::DESKTOP, &Deadline::none())
            .unwrap_err();
        assert_eq!(err.kind(), "timeout");

        // The wedged worker replaces itself once the sleep ends; a later
        // capture succeeds.
        std::thread::sleep(Duration::from_millis(500));
        let shot = pool
            .capture("<html>2</html>".into(), Viewport::DESKTOP, &Deadline::none())
            .unwrap();
        assert!(shot.path.exists());
    }

    #[test]
    fn overflow_is_rejected_with_backpressure() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(SleepyOnceRenderer {
            slept: AtomicBool::new(false),
            delay: Duration::from_millis(300),
        });
        let pool = Arc::new(
            CapturePool::new(renderer, pool_config(dir.path(), 1, 1, 2000)).unwrap(),
        );

        // First capture occupies the worker; second sits in the queue;
        // third overflows.
        let p1 = Arc::clone(&pool);
        let first = std::thread::spawn(move || {
            p1.capture("<html>a</html>".into(), Viewport::DESKTOP, &Deadline::none())
        });
        std::thread::sleep(Duration::from_millis(50));
        let p2 = Arc::clone(&pool);
        let second = std::thread::spawn(move || {
            p2.capture("<html>b</html>".into(), Viewport::DESKTOP, &Deadline::none())
        });
        std::thread::sleep(Duration::from_millis(50));

        let overflow = pool.capture("<html>c</html>".into(), Viewport::DESKTOP, &Deadline::none());
        assert!(matches!(overflow, Err(Error::Backpressure(_))));

        assert!(first.join().unwrap().is_ok());
        assert!(second.join().unwrap().is_ok());
    }

    #[test]
    fn expired_deadline_is_rejected_before_enqueue() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(InstantRenderer {
            calls: AtomicUsize::new(0),
        });
        let pool = CapturePool::new(Arc::clone(&renderer) as Arc<dyn Renderer>, pool_config(dir.path(), 1, 8, 1000))
            .unwrap();
        let deadline = Deadline::after(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(2));
        let err = pool
            .capture("<html></html>".into(), Viewport::DESKTOP, &deadline)
            .unwrap_err();
        assert_eq!(err.kind(), "timeout");
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }
}
