//! Scan orchestration
//!
//! Wires the liveness registry, the sweeper and the dispatcher for one scan:
//!
//! 1. optional blocking liveness pass (skipped with `no_finger`; the whole
//!    scan with `only_finger`)
//! 2. background sweeper on a child cancellation token
//! 3. producers feeding the target, bad-target and PoC streams
//! 4. dispatch to completion, then sweeper shutdown
//!
//! The sweeper and the dispatcher never call each other; they only share the
//! registry and the target set.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::catalog::{feed, TargetList};
use crate::config::Config;
use crate::dispatch::{self, DispatchChannels, DispatchConfig, DispatchReport, Dispatcher};
use crate::engine::{CheckExecutor, HttpCheckExecutor, ResultCollector};
use crate::error::Result;
use crate::liveness::{
    HttpProber, LivenessCounts, LivenessProber, LivenessRegistry, LivenessSweeper, SweepReport,
    SweeperConfig,
};
use crate::models::Poc;
use crate::targets::TargetSet;

/// Inputs of one scan
#[derive(Debug, Clone, Default)]
pub struct ScanInputs {
    pub targets: TargetList,
    pub pocs: Vec<Poc>,
}

/// Outcome of one scan
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    /// Blocking liveness pass run before dispatch
    pub prepass: Option<SweepReport>,

    /// Dispatch statistics; `None` with `only_finger`
    pub dispatch: Option<DispatchReport>,

    /// Passes completed by the background sweeper
    pub sweeper_passes: u64,

    /// Registry counts at the end of the scan
    pub liveness: LivenessCounts,

    /// Target set at the end of the scan, including rewrites
    pub targets: Vec<String>,
}

/// Runs scans with a fixed configuration and collaborators
pub struct Runner {
    config: Config,
    registry: Arc<LivenessRegistry>,
    prober: Arc<dyn LivenessProber>,
    executor: Arc<dyn CheckExecutor>,
}

impl Runner {
    /// Create a runner from explicit collaborators
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration does not validate.
    pub fn new(
        config: Config,
        registry: Arc<LivenessRegistry>,
        prober: Arc<dyn LivenessProber>,
        executor: Arc<dyn CheckExecutor>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            prober,
            executor,
        })
    }

    /// Create a runner with the HTTP prober and the HTTP check executor
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or if the HTTP client (proxy included)
    /// cannot be built.
    pub fn from_config(config: Config, results: ResultCollector) -> Result<Self> {
        config.validate()?;

        let client = config.http_client()?;
        let registry = Arc::new(LivenessRegistry::new(config.scan.max_host_error));
        let prober = Arc::new(HttpProber::new(client.clone()));
        let executor = Arc::new(
            HttpCheckExecutor::new(client, Arc::clone(&registry), results)
                .skip_dead_targets(config.scan.skip_dead_targets),
        );

        Self::new(config, registry, prober, executor)
    }

    pub fn registry(&self) -> &Arc<LivenessRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one scan to completion
    ///
    /// Cancelling `cancel` stops the sweeper and stops admitting tasks; the
    /// call still returns only after every admitted task has finished.
    pub async fn run(&self, inputs: ScanInputs, cancel: CancellationToken) -> Result<ScanSummary> {
        let ScanInputs { targets, pocs } = inputs;
        let TargetList {
            targets: target_list,
            rejected,
        } = targets;

        tracing::info!(
            targets = target_list.len(),
            rejected = rejected.len(),
            pocs = pocs.len(),
            rate_limit = self.config.scan.rate_limit,
            "Scan starting"
        );

        let (writer, reader) = TargetSet::new(target_list);
        let sweeper = Arc::new(LivenessSweeper::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.prober),
            writer,
            SweeperConfig::from(&self.config),
        ));

        let mut summary = ScanSummary::default();

        if !self.config.scan.no_finger {
            summary.prepass = Some(sweeper.run_pass(true, &cancel).await);
        }

        if self.config.scan.only_finger {
            summary.liveness = self.registry.counts();
            summary.targets = reader.snapshot();
            return Ok(summary);
        }

        let dispatch_config = DispatchConfig::from(&self.config);
        let dispatcher = Dispatcher::new(Arc::clone(&self.executor), &dispatch_config)?;

        let sweeper_cancel = cancel.child_token();
        let sweeper_handle = tokio::spawn({
            let sweeper = Arc::clone(&sweeper);
            let token = sweeper_cancel.clone();
            async move { sweeper.run(token).await }
        });

        let (channels, streams) = dispatch::channels(dispatch_config.channel_buffer_size);
        let DispatchChannels {
            targets: targets_tx,
            bad_targets: bad_targets_tx,
            pocs: pocs_tx,
        } = channels;

        let producers = [
            tokio::spawn(feed(targets_tx, reader.snapshot())),
            tokio::spawn(feed(bad_targets_tx, rejected)),
            tokio::spawn(feed(pocs_tx, pocs)),
        ];

        let report = dispatcher.run(streams, cancel.clone()).await;

        for producer in producers {
            if let Err(e) = producer.await {
                tracing::warn!(error = %e, "Stream producer failed");
            }
        }

        sweeper_cancel.cancel();
        summary.sweeper_passes = match sweeper_handle.await {
            Ok(passes) => passes,
            Err(e) => {
                tracing::warn!(error = %e, "Liveness sweeper task failed");
                0
            }
        };

        summary.dispatch = Some(report);
        summary.liveness = self.registry.counts();
        summary.targets = reader.snapshot();

        tracing::info!(
            alive = summary.liveness.alive,
            dead = summary.liveness.dead,
            needs_recheck = summary.liveness.needs_recheck,
            sweeper_passes = summary.sweeper_passes,
            "Scan finished"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_fails() {
        let mut config = Config::default();
        config.scan.rate_limit = 0;
        assert!(Runner::from_config(config, ResultCollector::new()).is_err());
    }

    #[test]
    fn test_invalid_proxy_is_fatal() {
        let mut config = Config::default();
        config.http.proxy = Some("::not-a-proxy".to_string());
        assert!(Runner::from_config(config, ResultCollector::new()).is_err());
    }

    #[tokio::test]
    async fn test_runner_creation() {
        let runner = Runner::from_config(Config::default(), ResultCollector::new()).unwrap();
        assert_eq!(runner.registry().max_host_error(), 3);
        assert_eq!(runner.config().scan.rate_limit, 150);
    }
}
