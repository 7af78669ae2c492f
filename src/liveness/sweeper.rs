//! Target liveness sweeper
//!
//! Repeatedly walks the shared target set and re-classifies targets so that
//! check execution does not waste its rate budget on dead hosts.
//!
//! ```text
//!   pass 1 (first):  probe every target the registry reports Unprobed
//!   pass n (n > 1):  probe every target the registry reports NeedsRecheck
//!
//!   ┌──────────┐  snapshot  ┌───────────────────┐  probe  ┌──────────┐
//!   │ targets  │──────────▶ │ buffer_unordered  │───────▶ │  prober  │
//!   └──────────┘            │ (width = N)       │         └──────────┘
//!        ▲                  └─────────┬─────────┘
//!        │ replace(index)             │ mark_alive / mark_dead
//!        └────────────────────────────┴──────────────▶ registry
//! ```
//!
//! A pass finishes only when every probe it started has finished. Between
//! passes the sweeper sleeps for the configured interval. The loop has no
//! terminal state of its own and stops only through its cancellation token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::liveness::prober::LivenessProber;
use crate::liveness::registry::LivenessRegistry;
use crate::models::{LivenessState, ProbeOutcome, ProbeStatus};
use crate::targets::TargetWriter;
use crate::utils::{is_url, with_default_scheme};

/// Sweeper configuration
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Number of probes in flight at once
    pub concurrency: usize,

    /// Sleep between passes
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            interval: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for SweeperConfig {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.scan.fingerprint_concurrency,
            interval: config.sweep_interval(),
        }
    }
}

/// What happened to one target during a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetOutcome {
    Skipped { rewritten: bool },
    Alive { rewritten: bool },
    Dead { rewritten: bool },
}

impl TargetOutcome {
    fn rewritten(&self) -> bool {
        match self {
            Self::Skipped { rewritten } | Self::Alive { rewritten } | Self::Dead { rewritten } => {
                *rewritten
            }
        }
    }
}

/// Summary of a single pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Targets probed this pass
    pub probed: usize,

    /// Probed targets classified alive
    pub alive: usize,

    /// Probed targets classified dead
    pub dead: usize,

    /// Targets left untouched this pass
    pub skipped: usize,

    /// Target-set slots rewritten
    pub rewritten: usize,

    /// The pass was interrupted by cancellation
    pub cancelled: bool,
}

impl SweepReport {
    fn record(&mut self, outcome: TargetOutcome) {
        match outcome {
            TargetOutcome::Skipped { .. } => self.skipped += 1,
            TargetOutcome::Alive { .. } => {
                self.probed += 1;
                self.alive += 1;
            }
            TargetOutcome::Dead { .. } => {
                self.probed += 1;
                self.dead += 1;
            }
        }
        if outcome.rewritten() {
            self.rewritten += 1;
        }
    }
}

/// Background liveness classifier
pub struct LivenessSweeper {
    registry: Arc<LivenessRegistry>,
    prober: Arc<dyn LivenessProber>,
    targets: TargetWriter,
    config: SweeperConfig,
}

impl LivenessSweeper {
    /// Create a sweeper; it becomes the only writer of `targets`
    pub fn new(
        registry: Arc<LivenessRegistry>,
        prober: Arc<dyn LivenessProber>,
        targets: TargetWriter,
        config: SweeperConfig,
    ) -> Self {
        Self {
            registry,
            prober,
            targets,
            config: SweeperConfig {
                concurrency: config.concurrency.max(1),
                ..config
            },
        }
    }

    pub fn registry(&self) -> &Arc<LivenessRegistry> {
        &self.registry
    }

    /// Run passes until `cancel` fires; returns the number of passes started
    pub async fn run(&self, cancel: CancellationToken) -> u64 {
        let mut first_pass = true;
        let mut passes = 0u64;

        tracing::info!(
            concurrency = self.config.concurrency,
            interval_ms = self.config.interval.as_millis() as u64,
            "Liveness sweeper started"
        );

        loop {
            let started = Instant::now();
            let report = self.run_pass(first_pass, &cancel).await;
            passes += 1;

            tracing::info!(
                pass = passes,
                first_pass,
                probed = report.probed,
                alive = report.alive,
                dead = report.dead,
                rewritten = report.rewritten,
                duration_ms = started.elapsed().as_millis() as u64,
                "Liveness pass finished"
            );

            if report.cancelled {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }

            first_pass = false;
        }

        tracing::info!(passes, "Liveness sweeper stopped");
        passes
    }

    /// Run one pass over a snapshot of the target set
    ///
    /// Returns once every started probe has finished, or as soon as `cancel`
    /// fires (in-flight probes are dropped in that case).
    pub async fn run_pass(&self, first_pass: bool, cancel: &CancellationToken) -> SweepReport {
        let snapshot = self.targets.reader().snapshot();
        let mut report = SweepReport::default();

        if snapshot.is_empty() || cancel.is_cancelled() {
            report.cancelled = cancel.is_cancelled();
            return report;
        }

        let mut outcomes = std::pin::pin!(stream::iter(snapshot.into_iter().enumerate())
            .map(|(index, target)| self.sweep_target(index, target, first_pass))
            .buffer_unordered(self.config.concurrency)
            .take_until(cancel.cancelled()));

        while let Some(outcome) = outcomes.next().await {
            report.record(outcome);
        }

        report.cancelled = cancel.is_cancelled();
        report
    }

    fn should_probe(state: LivenessState, first_pass: bool) -> bool {
        if first_pass {
            state == LivenessState::Unprobed
        } else {
            state == LivenessState::NeedsRecheck
        }
    }

    async fn sweep_target(&self, index: usize, target: String, first_pass: bool) -> TargetOutcome {
        let state = self.registry.query(&target);

        if !Self::should_probe(state, first_pass) {
            return TargetOutcome::Skipped { rewritten: false };
        }

        let ProbeOutcome {
            target: mut current,
            status,
        } = self.prober.probe(&target).await;

        if status == ProbeStatus::Unreachable && !is_url(&current) {
            current = with_default_scheme(&current);
        }
        // Readers that took the target before the rewrite keep the old string
        self.registry.alias(&target, &current);

        let alive = if status.is_failure() {
            self.registry.mark_dead(&current);
            false
        } else {
            self.registry.mark_alive(&current);
            true
        };

        tracing::debug!(
            host = %target,
            normalized = %current,
            status = %status,
            previous = %state,
            alive,
            "Target probed"
        );

        let rewritten = current != target && self.targets.replace(index, current);

        if alive {
            TargetOutcome::Alive { rewritten }
        } else {
            TargetOutcome::Dead { rewritten }
        }
    }
}
