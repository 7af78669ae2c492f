//! Target liveness registry
//!
//! Single source of truth for per-target [`LivenessState`]. Every operation
//! takes the registry lock once, so transitions for one target are
//! linearized while distinct targets never wait on a probe.
//!
//! Failure bookkeeping: [`LivenessRegistry::record_failure`] counts
//! consecutive failures reported by check executors. Once an `Alive` target
//! reaches `max_host_error` failures it becomes `NeedsRecheck` and the
//! counter restarts; the sweeper re-probes it on its next pass.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::models::LivenessState;

/// Liveness record for one target
#[derive(Debug, Clone)]
pub struct HostRecord {
    /// Current classification
    pub state: LivenessState,

    /// Consecutive failures since the last successful probe
    pub failure_count: u32,

    /// When the state last changed
    pub updated_at: DateTime<Utc>,
}

impl HostRecord {
    fn new(state: LivenessState) -> Self {
        Self {
            state,
            failure_count: 0,
            updated_at: Utc::now(),
        }
    }

    fn set_state(&mut self, state: LivenessState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

/// Counts per state, for summaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LivenessCounts {
    pub alive: usize,
    pub dead: usize,
    pub needs_recheck: usize,
}

#[derive(Debug, Default)]
struct Hosts {
    records: HashMap<String, HostRecord>,
    /// Original target string -> normalized key
    aliases: HashMap<String, String>,
}

impl Hosts {
    fn key(&self, target: &str) -> String {
        self.aliases
            .get(target)
            .cloned()
            .unwrap_or_else(|| target.to_string())
    }
}

/// Thread-safe target -> liveness store
///
/// Records are keyed by the normalized target. The sweeper registers an
/// alias whenever it normalizes a target, so components still holding the
/// original string resolve to the same record.
#[derive(Debug)]
pub struct LivenessRegistry {
    hosts: Mutex<Hosts>,
    max_host_error: u32,
}

impl LivenessRegistry {
    /// Create a registry; `max_host_error` of zero is treated as one
    pub fn new(max_host_error: u32) -> Self {
        Self {
            hosts: Mutex::new(Hosts::default()),
            max_host_error: max_host_error.max(1),
        }
    }

    pub fn max_host_error(&self) -> u32 {
        self.max_host_error
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Hosts> {
        self.hosts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route `original` to the record of `normalized`
    pub fn alias(&self, original: &str, normalized: &str) {
        if original == normalized {
            return;
        }
        self.lock()
            .aliases
            .insert(original.to_string(), normalized.to_string());
    }

    /// Normalized key for `target`; the target itself if it has no alias
    pub fn resolve(&self, target: &str) -> String {
        self.lock().key(target)
    }

    /// Current state of `target`; never creates an entry
    pub fn query(&self, target: &str) -> LivenessState {
        let hosts = self.lock();
        hosts
            .records
            .get(&hosts.key(target))
            .map_or(LivenessState::Unprobed, |record| record.state)
    }

    /// Full record for `target`, if it was ever classified
    pub fn record(&self, target: &str) -> Option<HostRecord> {
        let hosts = self.lock();
        hosts.records.get(&hosts.key(target)).cloned()
    }

    pub fn is_dead(&self, target: &str) -> bool {
        self.query(target) == LivenessState::Dead
    }

    /// Classify `target` as dead
    pub fn mark_dead(&self, target: &str) {
        let mut hosts = self.lock();
        let key = hosts.key(target);
        let record = hosts
            .records
            .entry(key)
            .or_insert_with(|| HostRecord::new(LivenessState::Dead));
        record.set_state(LivenessState::Dead);
    }

    /// Classify `target` as alive and clear its failure counter
    pub fn mark_alive(&self, target: &str) {
        let mut hosts = self.lock();
        let key = hosts.key(target);
        let record = hosts
            .records
            .entry(key)
            .or_insert_with(|| HostRecord::new(LivenessState::Alive));
        record.failure_count = 0;
        record.set_state(LivenessState::Alive);
    }

    /// Count one failed request against `target`
    ///
    /// Returns the state after bookkeeping. Targets that were never
    /// classified stay `Unprobed` and are not tracked.
    pub fn record_failure(&self, target: &str) -> LivenessState {
        let mut hosts = self.lock();
        let key = hosts.key(target);
        let Some(record) = hosts.records.get_mut(&key) else {
            return LivenessState::Unprobed;
        };

        if record.state != LivenessState::Alive {
            return record.state;
        }

        record.failure_count += 1;
        if record.failure_count >= self.max_host_error {
            record.failure_count = 0;
            record.set_state(LivenessState::NeedsRecheck);
            tracing::debug!(
                host = %key,
                threshold = self.max_host_error,
                "Target flagged for liveness recheck"
            );
        }
        record.state
    }

    /// Count one successful request against `target`
    pub fn record_success(&self, target: &str) {
        let mut hosts = self.lock();
        let key = hosts.key(target);
        if let Some(record) = hosts.records.get_mut(&key) {
            if record.state == LivenessState::Alive {
                record.failure_count = 0;
            }
        }
    }

    pub fn counts(&self) -> LivenessCounts {
        let hosts = self.lock();
        let mut counts = LivenessCounts::default();
        for record in hosts.records.values() {
            match record.state {
                LivenessState::Alive => counts.alive += 1,
                LivenessState::Dead => counts.dead += 1,
                LivenessState::NeedsRecheck => counts.needs_recheck += 1,
                LivenessState::Unprobed => {}
            }
        }
        counts
    }

    /// Sorted copy of every classified target
    pub fn snapshot(&self) -> Vec<(String, LivenessState)> {
        let mut entries: Vec<_> = self
            .lock()
            .records
            .iter()
            .map(|(target, record)| (target.clone(), record.state))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Targets currently classified dead
    pub fn dead_targets(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter(|(_, state)| *state == LivenessState::Dead)
            .map(|(target, _)| target)
            .collect()
    }
}

impl Default for LivenessRegistry {
    fn default() -> Self {
        Self::new(3)
    }
}
