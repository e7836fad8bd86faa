//! Request coalescing (singleflight) for identical concurrent transforms.
//!
//! When several threads miss the cache on the same signature at once, only
//! the first ("leader") runs the transform; the rest ("joiners") block on
//! a condvar and share the cloned result. Joiners that wait longer than
//! the configured bound fall through and compute independently — a slow
//! leader must not wedge the pipeline.
//!
//! The in-flight map is sharded so unrelated signatures never contend on
//! one mutex.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use agentic_design_core::global_metrics;

const NUM_SHARDS: usize = 8;

// ---------------------------------------------------------------------------
// Slot: shared state between leader and joiners
// ---------------------------------------------------------------------------

enum SlotState<V> {
    Pending,
    Ready(V),
}

struct Slot<V> {
    state: Mutex<SlotState<V>>,
    done: Condvar,
}

impl<V: Clone> Slot<V> {
    const fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            done: Condvar::new(),
        }
    }

    fn complete(&self, value: &V) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = SlotState::Ready(value.clone());
        drop(state);
        self.done.notify_all();
    }

    /// Wait for the leader; `None` on timeout.
    fn wait(&self, timeout: Duration) -> Option<V> {
        let guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, wait_result) = self
            .done
            .wait_timeout_while(guard, timeout, |s| matches!(s, SlotState::Pending))
            .unwrap_or_else(PoisonError::into_inner);
        if wait_result.timed_out() {
            return None;
        }
        match &*guard {
            SlotState::Ready(v) => Some(v.clone()),
            SlotState::Pending => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Singleflight
// ---------------------------------------------------------------------------

/// How a call got its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// This call executed the computation.
    Leader,
    /// This call reused a leader's result.
    Joiner,
    /// This call waited past the bound and computed independently.
    TimedOut,
}

type Shard<V> = Mutex<HashMap<String, Arc<Slot<V>>>>;

/// Per-signature singleflight. `V` is the shared computation result.
pub struct Singleflight<V> {
    shards: Vec<Shard<V>>,
    /// How long joiners wait before computing independently.
    join_wait: Duration,
}

impl<V: Clone> Singleflight<V> {
    #[must_use]
    pub fn new(join_wait: Duration) -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
            join_wait,
        }
    }

    fn shard(&self, key: &str) -> &Shard<V> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % NUM_SHARDS;
        &self.shards[index]
    }

    /// Run `compute` once per concurrent burst of identical keys.
    ///
    /// The leader executes and publishes; joiners block up to the wait
    /// bound and then fall back to computing themselves.
    pub fn run(&self, key: &str, compute: impl FnOnce() -> V) -> (V, Role) {
        let metrics = global_metrics();
        let shard = self.shard(key);

        let (slot, is_leader) = {
            let mut map = shard.lock().unwrap_or_else(PoisonError::into_inner);
            match map.get(key) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let slot = Arc::new(Slot::new());
                    map.insert(key.to_string(), Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if is_leader {
            metrics.coalesce_leaders.inc();
            let value = compute();
            slot.complete(&value);
            let mut map = shard.lock().unwrap_or_else(PoisonError::into_inner);
            map.remove(key);
            return (value, Role::Leader);
        }

        if let Some(value) = slot.wait(self.join_wait) {
            metrics.coalesce_joiners.inc();
            return (value, Role::Joiner);
        }
        // Leader is slow (or died); compute independently rather than
        // blocking the request.
        (compute(), Role::TimedOut)
    }

    /// Number of keys currently in flight, across all shards.
    #[must_use]
    pub fn inflight_count(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn single_caller_is_leader() {
        let flight: Singleflight<String> = Singleflight::new(Duration::from_secs(1));
        let (value, role) = flight.run("sig", || "computed".to_string());
        assert_eq!(value, "computed");
        assert_eq!(role, Role::Leader);
        assert_eq!(flight.inflight_count(), 0);
    }

    #[test]
    fn concurrent_identical_keys_coalesce() {
        let flight: Arc<Singleflight<usize>> = Arc::new(Singleflight::new(Duration::from_secs(5)));
        let executions = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let flight = Arc::clone(&flight);
                let executions = Arc::clone(&executions);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let (value, _role) = flight.run("same-key", || {
                        executions.fetch_add(1, Ordering::SeqCst);
                        // Hold the slot open long enough for joiners to pile up.
                        std::thread::sleep(Duration::from_millis(50));
                        42usize
                    });
                    value
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42);
        }
        // A few stragglers may arrive after the leader removed the slot
        // and become leaders of their own bursts, but a thundering herd
        // of 8 must not run 8 transforms.
        assert!(executions.load(Ordering::SeqCst) < 8);
        assert_eq!(flight.inflight_count(), 0);
    }

    #[test]
    fn distinct_keys_run_independently() {
        let flight: Singleflight<&'static str> = Singleflight::new(Duration::from_secs(1));
        let (a, role_a) = flight.run("key-a", || "a");
        let (b, role_b) = flight.run("key-b", || "b");
        assert_eq!((a, b), ("a", "b"));
        assert_eq!(role_a, Role::Leader);
        assert_eq!(role_b, Role::Leader);
    }
}
