//! Common test utilities

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pocrunner::engine::{CheckContext, CheckExecutor};
use pocrunner::liveness::LivenessProber;
use pocrunner::models::{Poc, ProbeOutcome, ProbeStatus};

/// Prober answering from a fixed script; unknown targets are unreachable
#[derive(Default)]
pub struct FakeProber {
    script: HashMap<String, ProbeOutcome>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

#[allow(dead_code)]
impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `target` with `status`, normalized to `normalized`
    pub fn respond(mut self, target: &str, normalized: &str, status: u16) -> Self {
        self.script.insert(
            target.to_string(),
            ProbeOutcome::new(normalized, ProbeStatus::Status(status)),
        );
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessProber for FakeProber {
    async fn probe(&self, target: &str) -> ProbeOutcome {
        self.calls.lock().unwrap().push(target.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.script
            .get(target)
            .cloned()
            .unwrap_or_else(|| ProbeOutcome::unreachable(target))
    }
}

/// One executor invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub target: String,
    pub poc_id: String,
    pub at: Instant,
}

/// Executor that only records what it was asked to run
#[derive(Default)]
pub struct CountingExecutor {
    invocations: Mutex<Vec<Invocation>>,
    delay: Duration,
}

#[allow(dead_code)]
impl CountingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    /// Sorted (target, poc id) pairs
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = self
            .invocations()
            .into_iter()
            .map(|i| (i.target, i.poc_id))
            .collect();
        pairs.sort();
        pairs
    }
}

#[async_trait]
impl CheckExecutor for CountingExecutor {
    async fn execute(&self, _ctx: &CheckContext, target: &str, poc: &Poc) {
        self.invocations.lock().unwrap().push(Invocation {
            target: target.to_string(),
            poc_id: poc.id.clone(),
            at: Instant::now(),
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// PoCs with ids `p0..pn`
#[allow(dead_code)]
pub fn pocs(n: usize) -> Vec<Poc> {
    (0..n).map(|i| Poc::with_id(format!("p{i}"))).collect()
}

/// Targets `t0.test..tn.test`
#[allow(dead_code)]
pub fn targets(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("t{i}.test")).collect()
}
