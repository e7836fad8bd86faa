//! Screenshot directory janitor.
//!
//! Removes screenshots older than `max_age` and, when the pool exceeds
//! `max_files`, evicts oldest-first until back under the mark. The
//! janitor owns deletes; pool workers own writes; readers open by
//! immutable id — so a sweep never races a capture on the same file.
//!
//! Sweeps run opportunistically after each analysis and, optionally, on a
//! dedicated interval thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use agentic_design_core::global_metrics;

/// Retention knobs for one screenshot directory.
#[derive(Debug, Clone)]
pub struct JanitorConfig {
    pub dir: PathBuf,
    pub max_age: Duration,
    pub max_files: usize,
}

impl JanitorConfig {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_age: Duration::from_secs(3600),
            max_files: 500,
        }
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub removed_old: usize,
    pub removed_excess: usize,
}

/// Run one sweep: age pass first, then oldest-first eviction down to the
/// high-water mark.
#[must_use]
pub fn sweep(config: &JanitorConfig) -> SweepStats {
    let mut stats = SweepStats::default();
    let mut entries = list_screenshots(&config.dir);

    let now = SystemTime::now();
    entries.retain(|(path, modified)| {
        let too_old = now
            .duration_since(*modified)
            .is_ok_and(|age| age > config.max_age);
        if too_old && remove(path) {
            stats.removed_old += 1;
            return false;
        }
        true
    });

    if entries.len() > config.max_files {
        entries.sort_by_key(|(_, modified)| *modified);
        let excess = entries.len() - config.max_files;
        for (path, _) in entries.iter().take(excess) {
            if remove(path) {
                stats.removed_excess += 1;
            }
        }
    }

    let removed = stats.removed_old + stats.removed_excess;
    if removed > 0 {
        global_metrics().screenshots_cleaned.add(removed as u64);
        debug!(
            removed_old = stats.removed_old,
            removed_excess = stats.removed_excess,
            "screenshot sweep"
        );
    }
    stats
}

fn list_screenshots(dir: &Path) -> Vec<(PathBuf, SystemTime)> {
    let Ok(read) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    read.flatten()
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "png") {
                return None;
            }
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((path, modified))
        })
        .collect()
}

fn remove(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "janitor failed to remove screenshot");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Interval worker
// ---------------------------------------------------------------------------

/// Handle to the background sweep thread.
pub struct JanitorHandle {
    shutdown: Arc<AtomicBool>,
}

impl JanitorHandle {
    /// Signal the worker to stop after its current sleep.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

impl Drop for JanitorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start the interval sweep worker on a dedicated OS thread.
#[must_use]
pub fn start(config: JanitorConfig, interval: Duration) -> JanitorHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let spawned = std::thread::Builder::new()
        .name("screenshot-janitor".into())
        .spawn(move || {
            let tick = interval.max(Duration::from_millis(50));
            loop {
                // Sleep in small steps so shutdown is prompt.
                let mut remaining = tick;
                while remaining > Duration::ZERO {
                    if flag.load(Ordering::Acquire) {
                        return;
                    }
                    let step = remaining.min(Duration::from_millis(250));
                    std::thread::sleep(step);
                    remaining = remaining.saturating_sub(step);
                }
                if flag.load(Ordering::Acquire) {
                    return;
                }
                let _ = sweep(&config);
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "failed to spawn screenshot janitor");
    }
    JanitorHandle { shutdown }
}
