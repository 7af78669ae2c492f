//! Check execution
//!
//! The dispatcher hands every accepted task to a [`CheckExecutor`]. Executors
//! own their failure handling and result recording; nothing they do is
//! propagated back into the dispatch loop.
//!
//! [`HttpCheckExecutor`] is the bundled executor: it sends the PoC request,
//! evaluates the matcher, and feeds request failures back into the liveness
//! registry so that flaky hosts get re-probed by the sweeper.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::liveness::LivenessRegistry;
use crate::models::{CheckResult, Poc};
use crate::utils::{join_path, with_default_scheme};

/// Per-task execution context
#[derive(Debug, Clone)]
pub struct CheckContext {
    task_id: u64,
    cancel: CancellationToken,
}

impl CheckContext {
    pub fn new(task_id: u64, cancel: CancellationToken) -> Self {
        Self { task_id, cancel }
    }

    pub fn task_id(&self) -> u64 {
        self.task_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the scan is cancelled
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

/// Runs a single check against a single target
///
/// Must tolerate concurrent invocation up to the dispatch pool width.
#[async_trait]
pub trait CheckExecutor: Send + Sync {
    async fn execute(&self, ctx: &CheckContext, target: &str, poc: &Poc);
}

/// Thread-safe store of findings, optionally streaming each one to a channel
#[derive(Debug, Clone, Default)]
pub struct ResultCollector {
    results: Arc<Mutex<Vec<CheckResult>>>,
    sink: Option<mpsc::UnboundedSender<CheckResult>>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collector that also forwards every result to `sink`
    pub fn with_sink(sink: mpsc::UnboundedSender<CheckResult>) -> Self {
        Self {
            results: Arc::default(),
            sink: Some(sink),
        }
    }

    pub fn record(&self, result: CheckResult) {
        if let Some(sink) = &self.sink {
            if sink.send(result.clone()).is_err() {
                tracing::debug!("Result sink closed");
            }
        }
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result);
    }

    pub fn results(&self) -> Vec<CheckResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Executor that evaluates [`Poc`] request/matcher pairs over HTTP
pub struct HttpCheckExecutor {
    client: Client,
    registry: Arc<LivenessRegistry>,
    results: ResultCollector,
    skip_dead_targets: bool,
}

impl HttpCheckExecutor {
    pub fn new(client: Client, registry: Arc<LivenessRegistry>, results: ResultCollector) -> Self {
        Self {
            client,
            registry,
            results,
            skip_dead_targets: true,
        }
    }

    /// Whether targets the registry reports dead are skipped
    pub fn skip_dead_targets(mut self, skip: bool) -> Self {
        self.skip_dead_targets = skip;
        self
    }

    pub fn results(&self) -> &ResultCollector {
        &self.results
    }

    async fn send(&self, method: Method, url: &str) -> reqwest::Result<(u16, String)> {
        let response = self.client.request(method, url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl CheckExecutor for HttpCheckExecutor {
    async fn execute(&self, ctx: &CheckContext, target: &str, poc: &Poc) {
        if self.skip_dead_targets && self.registry.is_dead(target) {
            tracing::debug!(host = %target, poc = %poc.id, "Skipping dead target");
            return;
        }

        let method = match Method::from_bytes(poc.request.method.to_ascii_uppercase().as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                tracing::warn!(poc = %poc.id, method = %poc.request.method, "Invalid request method");
                return;
            }
        };

        // The sweeper may have normalized the target since it was dispatched
        let host = self.registry.resolve(target);
        let url = join_path(&with_default_scheme(&host), &poc.request.path);

        let outcome = tokio::select! {
            _ = ctx.cancelled() => {
                tracing::debug!(task_id = ctx.task_id(), url = %url, "Check cancelled");
                return;
            }
            outcome = self.send(method, &url) => outcome,
        };

        match outcome {
            Ok((status, body)) => {
                self.registry.record_success(target);

                if poc.matcher.matches(status, &body) {
                    tracing::info!(
                        host = %host,
                        poc = %poc.id,
                        severity = poc.severity.as_str(),
                        status,
                        "Check matched"
                    );
                    self.results.record(CheckResult {
                        target: host,
                        poc_id: poc.id.clone(),
                        poc_name: poc.display_name().to_string(),
                        severity: poc.severity,
                        url,
                        status,
                        matched_at: Utc::now(),
                    });
                }
            }
            Err(e) => {
                let state = self.registry.record_failure(target);
                tracing::debug!(
                    task_id = ctx.task_id(),
                    url = %url,
                    error = %e,
                    state = %state,
                    "Check request failed"
                );
            }
        }
    }
}
