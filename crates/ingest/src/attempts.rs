//! Attempt numbering per (test, browser) pair
//!
//! Counters are sharded by key, so registrations for distinct tests may
//! arrive concurrently; calls for the same key must follow upstream event
//! emission order, which the manager does not re-establish.

use dashmap::DashMap;
use retake_common::{TestSpec, TestStatus};

type AttemptKey = (String, String);

/// Session-scoped monotonic attempt counters
#[derive(Debug, Default)]
pub struct AttemptManager {
    counters: DashMap<AttemptKey, usize>,
}

impl AttemptManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(spec: &TestSpec) -> AttemptKey {
        (spec.full_name(), spec.browser_id.clone())
    }

    /// Record one incoming result and return its attempt number.
    ///
    /// RUNNING and IDLE mark a test that is still in flight; they observe
    /// the current counter without consuming it. Every other status takes
    /// the current number and advances the counter for the next result.
    pub fn register_attempt(&self, spec: &TestSpec, status: TestStatus) -> usize {
        let mut entry = self.counters.entry(Self::key(spec)).or_insert(0);
        let current = *entry;

        if !status.is_in_progress() {
            *entry = current + 1;
        }

        current
    }

    /// Peek at the counter without mutating it; 0 for unseen pairs
    pub fn current_attempt(&self, spec: &TestSpec) -> usize {
        self.counters
            .get(&Self::key(spec))
            .map(|entry| *entry)
            .unwrap_or(0)
    }

    /// Raise the counter to at least `next_attempt`, for sessions resuming
    /// over previously persisted results. Never lowers an existing counter.
    pub fn seed(&self, spec: &TestSpec, next_attempt: usize) {
        let mut entry = self.counters.entry(Self::key(spec)).or_insert(0);
        if *entry < next_attempt {
            *entry = next_attempt;
        }
    }
}
