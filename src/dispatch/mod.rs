//! Rate-limited dispatch engine
//!
//! Builds the target × PoC execution matrix and drives it through a bounded
//! worker pool at a fixed admission rate.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ targets  rx  │──drain once──▶ materialized target list ─┐
//! └──────────────┘                                          │ for every PoC
//! ┌──────────────┐                                          ▼
//! │ pocs     rx  │──one PoC at a time──▶ Task(target, poc) ──▶ pool permit
//! └──────────────┘                                          │ (backpressure)
//! ┌──────────────┐                                          ▼
//! │ bad tgts rx  │──counted──▶ report        pacing signal ──▶ executor
//! └──────────────┘                          (1 / rate_limit)
//! ```
//!
//! The target stream is a one-shot queue, so it is drained into a list
//! before the PoC loop starts and every PoC is applied to every target.
//! Admission is gated by one shared pacing signal: `n` tasks take at least
//! `(n - 1) / rate_limit` seconds regardless of pool width. The engine
//! returns only after every accepted task has finished.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::Config;
use crate::engine::{CheckContext, CheckExecutor};
use crate::error::{Error, Result};
use crate::models::{Poc, Task};

type Pacer = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

// ============================================================================
// Configuration
// ============================================================================

/// Dispatch configuration
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Admissions per second
    pub rate_limit: u32,

    /// Maximum number of concurrently active tasks
    pub pool_size: usize,

    /// Buffer size of the three input streams
    pub channel_buffer_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            rate_limit: 150,
            pool_size: 150,
            channel_buffer_size: 1000,
        }
    }
}

impl From<&Config> for DispatchConfig {
    fn from(config: &Config) -> Self {
        Self {
            rate_limit: config.scan.rate_limit,
            pool_size: config.pool_size(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Input Streams
// ============================================================================

/// Producer side of the dispatch streams
///
/// Each sender must be dropped once its producer is done; the engine treats
/// a closed stream as "no more items".
#[derive(Debug, Clone)]
pub struct DispatchChannels {
    pub targets: mpsc::Sender<String>,
    pub bad_targets: mpsc::Sender<String>,
    pub pocs: mpsc::Sender<Poc>,
}

/// Consumer side of the dispatch streams
#[derive(Debug)]
pub struct DispatchStreams {
    targets: mpsc::Receiver<String>,
    bad_targets: mpsc::Receiver<String>,
    pocs: mpsc::Receiver<Poc>,
}

/// Create the three dispatch streams
pub fn channels(buffer: usize) -> (DispatchChannels, DispatchStreams) {
    let buffer = buffer.max(1);
    let (targets_tx, targets_rx) = mpsc::channel(buffer);
    let (bad_tx, bad_rx) = mpsc::channel(buffer);
    let (pocs_tx, pocs_rx) = mpsc::channel(buffer);

    (
        DispatchChannels {
            targets: targets_tx,
            bad_targets: bad_tx,
            pocs: pocs_tx,
        },
        DispatchStreams {
            targets: targets_rx,
            bad_targets: bad_rx,
            pocs: pocs_rx,
        },
    )
}

// ============================================================================
// Statistics
// ============================================================================

/// Summary of one dispatch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// PoCs received
    pub pocs: u64,

    /// Targets received
    pub targets: u64,

    /// Tasks admitted to the pool
    pub submitted: u64,

    /// Admitted tasks that finished (always equal to `submitted` on return)
    pub completed: u64,

    /// Admitted tasks that reached the executor
    pub executed: u64,

    /// Pairs dropped because the target or the PoC id was empty
    pub skipped_malformed: u64,

    /// Targets rejected before the scan
    pub bad_targets: u64,

    /// The run was interrupted by cancellation
    pub cancelled: bool,

    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct TaskCounters {
    completed: AtomicU64,
    executed: AtomicU64,
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Rate-limited fan-out of (target, PoC) tasks onto a check executor
pub struct Dispatcher {
    executor: Arc<dyn CheckExecutor>,
    pacer: Arc<Pacer>,
    pool_size: usize,
}

impl Dispatcher {
    /// Create a dispatcher
    ///
    /// # Errors
    ///
    /// Returns `Error::Dispatch` if the rate limit or the pool size is zero,
    /// or the rate is too high to express as a pacing period.
    pub fn new(executor: Arc<dyn CheckExecutor>, config: &DispatchConfig) -> Result<Self> {
        let rate = NonZeroU32::new(config.rate_limit)
            .ok_or_else(|| Error::Dispatch("rate_limit must be greater than 0".to_string()))?;

        if config.pool_size == 0 {
            return Err(Error::Dispatch(
                "pool_size must be greater than 0".to_string(),
            ));
        }

        // Burst of one: the first admission is immediate, each later one
        // waits a full period.
        let period = Duration::from_secs(1) / rate.get();
        let quota = Quota::with_period(period)
            .ok_or_else(|| Error::Dispatch(format!("rate_limit {rate} is too high")))?
            .allow_burst(NonZeroU32::MIN);

        Ok(Self {
            executor,
            pacer: Arc::new(RateLimiter::direct(quota)),
            pool_size: config.pool_size,
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Consume the streams and execute every (target, PoC) pair
    ///
    /// Blocks until the PoC stream closes (or `cancel` fires) and every
    /// accepted task has finished.
    pub async fn run(&self, streams: DispatchStreams, cancel: CancellationToken) -> DispatchReport {
        let started = Instant::now();
        let DispatchStreams {
            mut targets,
            bad_targets,
            mut pocs,
        } = streams;

        let mut report = DispatchReport::default();
        let bad_target_count = Arc::new(AtomicU64::new(0));
        let mut bad_target_drain = tokio::spawn(drain_bad_targets(
            bad_targets,
            Arc::clone(&bad_target_count),
        ));

        let target_list = tokio::select! {
            _ = cancel.cancelled() => Vec::new(),
            list = collect_targets(&mut targets) => list,
        };
        report.targets = target_list.len() as u64;

        tracing::info!(
            targets = report.targets,
            pool_size = self.pool_size,
            "Dispatch started"
        );

        let semaphore = Arc::new(Semaphore::new(self.pool_size));
        let tracker = TaskTracker::new();
        let counters = Arc::new(TaskCounters::default());
        let mut next_task_id = 0u64;

        'pocs: loop {
            let poc = tokio::select! {
                _ = cancel.cancelled() => break 'pocs,
                poc = pocs.recv() => match poc {
                    Some(poc) => poc,
                    None => break 'pocs,
                },
            };
            report.pocs += 1;

            tracing::debug!(poc = %poc.id, targets = target_list.len(), "Dispatching PoC");

            for target in &target_list {
                let task = Task::new(target.clone(), poc.clone());
                if !task.is_well_formed() {
                    report.skipped_malformed += 1;
                    tracing::debug!(host = %task.target, poc = %task.poc.id, "Skipping malformed task");
                    continue;
                }

                let permit = tokio::select! {
                    _ = cancel.cancelled() => break 'pocs,
                    permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::error!("Worker pool closed");
                            break 'pocs;
                        }
                    },
                };

                next_task_id += 1;
                report.submitted += 1;

                let ctx = CheckContext::new(next_task_id, cancel.child_token());
                let executor = Arc::clone(&self.executor);
                let pacer = Arc::clone(&self.pacer);
                let counters = Arc::clone(&counters);

                tracker.spawn(async move {
                    let _permit = permit;

                    tokio::select! {
                        _ = ctx.cancelled() => {}
                        _ = pacer.until_ready() => {
                            counters.executed.fetch_add(1, Ordering::Relaxed);
                            executor.execute(&ctx, &task.target, &task.poc).await;
                        }
                    }

                    counters.completed.fetch_add(1, Ordering::Relaxed);
                });
            }
        }

        tracker.close();
        tracker.wait().await;

        // A still-open bad-target stream must not outlive a cancelled run
        tokio::select! {
            _ = &mut bad_target_drain => {}
            _ = cancel.cancelled() => bad_target_drain.abort(),
        }
        report.bad_targets = bad_target_count.load(Ordering::Relaxed);
        report.completed = counters.completed.load(Ordering::Relaxed);
        report.executed = counters.executed.load(Ordering::Relaxed);
        report.cancelled = cancel.is_cancelled();
        report.elapsed = started.elapsed();

        tracing::info!(
            pocs = report.pocs,
            targets = report.targets,
            submitted = report.submitted,
            executed = report.executed,
            skipped_malformed = report.skipped_malformed,
            bad_targets = report.bad_targets,
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Dispatch completed"
        );

        report
    }
}

async fn collect_targets(targets: &mut mpsc::Receiver<String>) -> Vec<String> {
    let mut list = Vec::new();
    while let Some(target) = targets.recv().await {
        list.push(target);
    }
    list
}

async fn drain_bad_targets(mut bad_targets: mpsc::Receiver<String>, count: Arc<AtomicU64>) {
    while let Some(target) = bad_targets.recv().await {
        count.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(host = %target, "Rejected target");
    }
}
