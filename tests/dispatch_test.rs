//! Integration tests for the rate-limited dispatcher
//!
//! Executors here are fakes that record invocations, so timing assertions
//! only measure the dispatcher's own pacing and pool bounds.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::CountingExecutor;
use pocrunner::catalog::feed;
use pocrunner::dispatch::{self, DispatchConfig, Dispatcher};
use pocrunner::models::Poc;
use tokio_util::sync::CancellationToken;

fn dispatcher(executor: Arc<CountingExecutor>, rate_limit: u32, pool_size: usize) -> Dispatcher {
    let config = DispatchConfig {
        rate_limit,
        pool_size,
        ..Default::default()
    };
    Dispatcher::new(executor, &config).unwrap()
}

/// Feed the streams from background producers, as a scan does
fn spawn_producers(
    channels: dispatch::DispatchChannels,
    targets: Vec<String>,
    pocs: Vec<Poc>,
) {
    tokio::spawn(feed(channels.targets, targets));
    tokio::spawn(feed(channels.pocs, pocs));
    drop(channels.bad_targets);
}

#[tokio::test]
async fn test_every_poc_runs_against_every_target() {
    let executor = CountingExecutor::new();
    let dispatcher = dispatcher(Arc::clone(&executor), 5, 5);

    let (channels, streams) = dispatch::channels(16);
    spawn_producers(channels, common::targets(3), common::pocs(4));

    let report = dispatcher.run(streams, CancellationToken::new()).await;

    assert_eq!(executor.count(), 12);
    let mut expected = Vec::new();
    for target in common::targets(3) {
        for poc in common::pocs(4) {
            expected.push((target.clone(), poc.id));
        }
    }
    expected.sort();
    assert_eq!(executor.pairs(), expected);

    // 12 admissions at 5/s: the first is immediate, the rest 200ms apart
    assert!(
        report.elapsed >= Duration::from_millis(2100),
        "finished too fast: {:?}",
        report.elapsed
    );
    assert!(report.elapsed < Duration::from_secs(4));
    assert_eq!(report.pocs, 4);
    assert_eq!(report.targets, 3);
    assert_eq!(report.submitted, 12);
    assert_eq!(report.executed, 12);
}

#[tokio::test]
async fn test_admissions_are_paced() {
    let executor = CountingExecutor::new();
    let dispatcher = dispatcher(Arc::clone(&executor), 10, 50);

    let (channels, streams) = dispatch::channels(16);
    spawn_producers(channels, common::targets(2), common::pocs(5));

    let report = dispatcher.run(streams, CancellationToken::new()).await;
    assert_eq!(executor.count(), 10);

    // Wide pool, so only the pacing signal spaces admissions
    let mut times: Vec<_> = executor.invocations().iter().map(|i| i.at).collect();
    times.sort();
    let span = times[times.len() - 1].duration_since(times[0]);
    assert!(span >= Duration::from_millis(850), "span too short: {span:?}");
    assert!(report.elapsed >= Duration::from_millis(850));
}

#[tokio::test]
async fn test_malformed_tasks_never_execute() {
    let executor = CountingExecutor::new();
    let dispatcher = dispatcher(Arc::clone(&executor), 100, 10);

    let (channels, streams) = dispatch::channels(16);
    spawn_producers(
        channels,
        vec![String::new(), "a.test".to_string()],
        vec![Poc::with_id(""), Poc::with_id("p")],
    );

    let report = dispatcher.run(streams, CancellationToken::new()).await;

    assert_eq!(executor.pairs(), vec![("a.test".to_string(), "p".to_string())]);
    assert_eq!(report.skipped_malformed, 3);
    assert_eq!(report.submitted, 1);
}

#[tokio::test]
async fn test_returns_after_all_tasks_finish() {
    let executor = CountingExecutor::with_delay(Duration::from_millis(300));
    let dispatcher = dispatcher(Arc::clone(&executor), 100, 2);

    let (channels, streams) = dispatch::channels(16);
    spawn_producers(channels, common::targets(6), common::pocs(1));

    let report = dispatcher.run(streams, CancellationToken::new()).await;

    // Pool of two, six 300ms tasks: three waves
    assert!(
        report.elapsed >= Duration::from_millis(850),
        "pool bound not honored: {:?}",
        report.elapsed
    );
    assert_eq!(report.submitted, 6);
    assert_eq!(report.completed, 6);
    assert_eq!(report.executed, 6);
    assert_eq!(executor.count(), 6);
}

#[tokio::test]
async fn test_empty_target_stream_runs_nothing() {
    let executor = CountingExecutor::new();
    let dispatcher = dispatcher(Arc::clone(&executor), 100, 10);

    let (channels, streams) = dispatch::channels(16);
    spawn_producers(channels, Vec::new(), common::pocs(3));

    let report = dispatcher.run(streams, CancellationToken::new()).await;

    assert_eq!(executor.count(), 0);
    assert_eq!(report.pocs, 3);
    assert_eq!(report.submitted, 0);
}

#[tokio::test]
async fn test_bad_targets_do_not_become_tasks() {
    let executor = CountingExecutor::new();
    let dispatcher = dispatcher(Arc::clone(&executor), 100, 10);

    let (channels, streams) = dispatch::channels(16);
    tokio::spawn(feed(channels.bad_targets, vec!["bad host".to_string()]));
    tokio::spawn(feed(channels.targets, vec!["a.test".to_string()]));
    tokio::spawn(feed(channels.pocs, common::pocs(2)));

    let report = dispatcher.run(streams, CancellationToken::new()).await;

    assert_eq!(report.bad_targets, 1);
    assert_eq!(executor.count(), 2);
    assert!(executor.pairs().iter().all(|(target, _)| target == "a.test"));
}

#[tokio::test]
async fn test_cancellation_stops_admission() {
    let executor = CountingExecutor::new();
    let dispatcher = dispatcher(Arc::clone(&executor), 2, 10);

    let (channels, streams) = dispatch::channels(128);
    spawn_producers(channels, common::targets(1), common::pocs(100));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(700)).await;
        trigger.cancel();
    });

    let report = dispatcher.run(streams, cancel).await;

    assert!(report.cancelled);
    assert!(executor.count() < 100);
    assert!(executor.count() >= 1);
    assert_eq!(report.completed, report.submitted);
    assert!(report.elapsed < Duration::from_secs(5));
}
