//! Integration tests for the liveness sweeper

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::FakeProber;
use pocrunner::liveness::{LivenessRegistry, LivenessSweeper, SweeperConfig};
use pocrunner::models::LivenessState;
use pocrunner::targets::{TargetReader, TargetSet};
use tokio_util::sync::CancellationToken;

fn sweeper(
    targets: Vec<&str>,
    prober: Arc<FakeProber>,
    registry: Arc<LivenessRegistry>,
    concurrency: usize,
    interval: Duration,
) -> (LivenessSweeper, TargetReader) {
    let (writer, reader) = TargetSet::new(targets.into_iter().map(String::from).collect());
    let config = SweeperConfig {
        concurrency,
        interval,
    };
    (
        LivenessSweeper::new(registry, prober, writer, config),
        reader,
    )
}

#[tokio::test]
async fn test_first_pass_probes_only_unprobed() {
    let registry = Arc::new(LivenessRegistry::new(3));
    registry.mark_alive("alive.test");
    registry.mark_dead("dead.test");

    let prober = Arc::new(
        FakeProber::new()
            .respond("b.test", "https://b.test", 200)
            .with_delay(Duration::from_millis(50)),
    );
    let (sweeper, reader) = sweeper(
        vec!["a.test", "alive.test", "b.test", "dead.test", "c.test"],
        Arc::clone(&prober),
        Arc::clone(&registry),
        2,
        Duration::from_secs(10),
    );

    let report = sweeper.run_pass(true, &CancellationToken::new()).await;

    assert_eq!(prober.call_count(), 3);
    let mut calls = prober.calls();
    calls.sort();
    assert_eq!(calls, vec!["a.test", "b.test", "c.test"]);
    assert!(prober.max_in_flight() <= 2);
    assert_eq!(report.probed, 3);
    assert_eq!(report.skipped, 2);
    assert!(!report.cancelled);

    // Every probed target leaves the pass classified
    assert_eq!(registry.query("http://a.test"), LivenessState::Dead);
    assert_eq!(registry.query("https://b.test"), LivenessState::Alive);
    assert_eq!(registry.query("http://c.test"), LivenessState::Dead);
    for target in ["a.test", "b.test", "c.test"] {
        assert_ne!(registry.query(target), LivenessState::Unprobed, "{target}");
    }
    assert_eq!(registry.query("alive.test"), LivenessState::Alive);
    assert_eq!(registry.query("dead.test"), LivenessState::Dead);
    assert_eq!(
        reader.snapshot(),
        vec![
            "http://a.test",
            "alive.test",
            "https://b.test",
            "dead.test",
            "http://c.test"
        ]
    );
}

#[tokio::test]
async fn test_unreachable_bare_host_gets_default_scheme() {
    let registry = Arc::new(LivenessRegistry::new(3));
    let prober = Arc::new(FakeProber::new());
    let (sweeper, reader) = sweeper(
        vec!["down.test"],
        prober,
        Arc::clone(&registry),
        4,
        Duration::from_secs(10),
    );

    let report = sweeper.run_pass(true, &CancellationToken::new()).await;

    assert_eq!(reader.snapshot(), vec!["http://down.test"]);
    assert_eq!(registry.query("http://down.test"), LivenessState::Dead);
    assert_eq!(report.dead, 1);
    assert_eq!(report.rewritten, 1);
}

#[tokio::test]
async fn test_reachable_host_is_normalized_and_alive() {
    let registry = Arc::new(LivenessRegistry::new(3));
    let prober = Arc::new(
        FakeProber::new()
            .respond("up.test", "https://up.test", 200)
            .respond("http://plain.test", "http://plain.test", 404),
    );
    let (sweeper, reader) = sweeper(
        vec!["up.test", "http://plain.test"],
        prober,
        Arc::clone(&registry),
        4,
        Duration::from_secs(10),
    );

    let report = sweeper.run_pass(true, &CancellationToken::new()).await;

    assert_eq!(reader.snapshot(), vec!["https://up.test", "http://plain.test"]);
    assert_eq!(registry.query("https://up.test"), LivenessState::Alive);
    assert_eq!(registry.query("http://plain.test"), LivenessState::Alive);
    assert_eq!(report.alive, 2);
    assert_eq!(report.rewritten, 1);
}

#[tokio::test]
async fn test_server_error_marks_dead() {
    let registry = Arc::new(LivenessRegistry::new(3));
    let prober = Arc::new(FakeProber::new().respond("err.test", "https://err.test", 503));
    let (sweeper, reader) = sweeper(
        vec!["err.test"],
        prober,
        Arc::clone(&registry),
        4,
        Duration::from_secs(10),
    );

    sweeper.run_pass(true, &CancellationToken::new()).await;

    assert_eq!(reader.snapshot(), vec!["https://err.test"]);
    assert!(registry.is_dead("https://err.test"));
}

#[tokio::test]
async fn test_later_passes_only_recheck_flagged_targets() {
    let registry = Arc::new(LivenessRegistry::new(1));
    let prober = Arc::new(
        FakeProber::new()
            .respond("a.test", "https://a.test", 200)
            .respond("b.test", "https://b.test", 200)
            .respond("https://a.test", "https://a.test", 200),
    );
    let (sweeper, _reader) = sweeper(
        vec!["a.test", "b.test", "gone.test"],
        Arc::clone(&prober),
        Arc::clone(&registry),
        4,
        Duration::from_secs(10),
    );
    let cancel = CancellationToken::new();

    sweeper.run_pass(true, &cancel).await;
    assert_eq!(prober.call_count(), 3);

    // Nothing flagged: a later pass probes nothing
    let report = sweeper.run_pass(false, &cancel).await;
    assert_eq!(report.probed, 0);
    assert_eq!(prober.call_count(), 3);

    assert_eq!(
        registry.record_failure("https://a.test"),
        LivenessState::NeedsRecheck
    );

    let report = sweeper.run_pass(false, &cancel).await;
    assert_eq!(report.probed, 1);
    assert_eq!(prober.calls().last().map(String::as_str), Some("https://a.test"));
    assert_eq!(registry.query("https://a.test"), LivenessState::Alive);
    assert_eq!(registry.query("http://gone.test"), LivenessState::Dead);
}

#[tokio::test]
async fn test_cancelled_pass_probes_nothing() {
    let registry = Arc::new(LivenessRegistry::new(3));
    let prober = Arc::new(FakeProber::new());
    let (sweeper, _reader) = sweeper(
        vec!["a.test", "b.test"],
        Arc::clone(&prober),
        registry,
        4,
        Duration::from_secs(10),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = sweeper.run_pass(true, &cancel).await;

    assert!(report.cancelled);
    assert_eq!(prober.call_count(), 0);
}

#[tokio::test]
async fn test_run_loops_until_cancelled() {
    let registry = Arc::new(LivenessRegistry::new(3));
    let prober = Arc::new(FakeProber::new().respond("a.test", "https://a.test", 200));
    let (sweeper, _reader) = sweeper(
        vec!["a.test"],
        Arc::clone(&prober),
        Arc::clone(&registry),
        4,
        Duration::from_millis(50),
    );
    let sweeper = Arc::new(sweeper);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let sweeper = Arc::clone(&sweeper);
        let cancel = cancel.clone();
        async move { sweeper.run(cancel).await }
    });

    tokio::time::sleep(Duration::from_millis(400)).await;
    cancel.cancel();

    let passes = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("sweeper did not stop after cancellation")
        .unwrap();

    assert!(passes >= 2, "expected repeated passes, got {passes}");
    // Alive targets are never re-probed
    assert_eq!(prober.call_count(), 1);
    assert_eq!(registry.query("https://a.test"), LivenessState::Alive);
}
