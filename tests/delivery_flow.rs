//! End-to-end delivery runs against the simulated channel.
//!
//! All tests run on paused tokio time, so backoff sleeps and settle delays
//! complete instantly while still being measurable.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bulk_courier::channels::simulated::{ChannelCall, SimulatedFault};
use bulk_courier::config::DelayRange;
use bulk_courier::delivery::{Clock, RunFailure};
use bulk_courier::error::Error;
use bulk_courier::stats::RunStatus;

use chrono::{DateTime, Utc};
use common::{channel_with, config_with_limits, dataset, fast_config, orchestrator};

/// Wall clock that never moves, as if the host clock stalled.
struct FrozenClock(DateTime<Utc>);

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[tokio::test(start_paused = true)]
async fn mixed_rows_balance_totals() {
    let data = dataset(&[&["A", "hi"], &["", "hi"], &["B", ""]]);
    assert_eq!(data.report.valid_rows, 1);
    assert_eq!(data.records.len(), 1);
    assert_eq!(data.records[0].identifier, "A");
    assert_eq!(data.skipped.len(), 2);

    let mut orch = orchestrator(channel_with(&["A"]), fast_config());
    let report = orch.run(&data).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.successful, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.total, report.successful + report.failed + report.skipped);
}

#[tokio::test(start_paused = true)]
async fn unknown_contact_is_never_dispatched() {
    let data = dataset(&[&["A", "hello A"], &["Z", "hello Z"]]);
    let mut orch = orchestrator(channel_with(&["A"]), fast_config());

    let report = orch.run(&data).await.unwrap();
    assert_eq!(report.successful, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failed_identifiers, vec!["Z"]);

    let channel = orch.channel();
    assert_eq!(channel.commit_count().await, 1);
    let sent = channel.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "A");

    // Nothing was typed into the compose box for Z.
    let typed_z = channel.calls().await.into_iter().any(|c| {
        matches!(c, ChannelCall::Type { target, text } if target == "compose_box" && text == "hello Z")
    });
    assert!(!typed_z);
}

#[tokio::test(start_paused = true)]
async fn send_failures_are_tagged_and_run_continues() {
    let channel = channel_with(&["A", "B", "C"]).with_fault("B", SimulatedFault::Intercepted);
    let data = dataset(&[&["A", "1"], &["B", "2"], &["C", "3"]]);
    let mut orch = orchestrator(channel, fast_config());

    let report = orch.run(&data).await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.successful, 2);
    assert_eq!(report.failed_identifiers, vec!["B"]);
    assert!((report.success_rate - 2.0 / 3.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn best_effort_match_requires_open_conversation() {
    let channel = channel_with(&[])
        .with_partial_match("ann", true)
        .with_partial_match("bob", false);
    let data = dataset(&[&["ann", "hi"], &["bob", "hi"]]);
    let mut orch = orchestrator(channel, fast_config());

    let report = orch.run(&data).await.unwrap();
    assert_eq!(report.successful, 1);
    assert_eq!(report.failed_identifiers, vec!["bob"]);
    assert_eq!(orch.channel().commit_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn minute_ceiling_blocks_until_cooldown_passes() {
    let data = dataset(&[&["A", "1"], &["B", "2"], &["C", "3"]]);
    let mut orch = orchestrator(channel_with(&["A", "B", "C"]), config_with_limits(2, 50, 60));

    let started = tokio::time::Instant::now();
    let report = orch.run(&data).await.unwrap();

    assert_eq!(report.successful, 3);
    assert!(started.elapsed() >= Duration::from_secs(60));
    assert!(report.processing_time_seconds >= 60.0);
    assert_eq!(orch.limiter().usage().hour, 3);
}

#[tokio::test(start_paused = true)]
async fn zero_cooldown_still_waits_for_the_window() {
    let data = dataset(&[&["A", "1"], &["B", "2"]]);
    let mut orch = orchestrator(channel_with(&["A", "B"]), config_with_limits(1, 50, 0));

    let started = tokio::time::Instant::now();
    let report = orch.run(&data).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.successful, 2);
    assert!(started.elapsed() >= Duration::from_secs(60));
    assert!(started.elapsed() < Duration::from_secs(70));
}

#[tokio::test(start_paused = true)]
async fn stalled_clock_exhausts_denials_and_aborts() {
    let mut config = config_with_limits(10, 1, 60);
    config.max_consecutive_denials = 2;
    let data = dataset(&[&["A", "1"], &["B", "2"], &["C", "3"]]);
    let mut orch = orchestrator(channel_with(&["A", "B", "C"]), config)
        .with_clock(Arc::new(FrozenClock(Utc::now())));

    let RunFailure { error, report } = orch.run(&data).await.unwrap_err();
    assert!(matches!(
        error,
        Error::RateLimitExhausted { denials: 2, last_retry_after } if last_retry_after == Duration::from_secs(3_600)
    ));
    assert_eq!(report.status, RunStatus::Aborted);
    assert_eq!(report.successful, 1);
    assert_eq!(report.unprocessed, 2);
    assert!(report.abort_reason.is_some());
    assert_eq!(orch.channel().commit_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_attempts_do_not_consume_rate_budget() {
    let data = dataset(&[&["Z", "1"], &["A", "2"]]);
    let mut orch = orchestrator(channel_with(&["A"]), config_with_limits(1, 50, 600));

    let started = tokio::time::Instant::now();
    let report = orch.run(&data).await.unwrap();
    assert_eq!(report.successful, 1);
    assert_eq!(report.failed, 1);
    assert!(started.elapsed() < Duration::from_secs(600));
    assert_eq!(orch.limiter().usage().minute, 1);
}

#[tokio::test(start_paused = true)]
async fn dry_run_touches_nothing() {
    let mut config = fast_config();
    config.dry_run = true;
    let data = dataset(&[&["A", "1"], &["", "2"]]);
    let mut orch = orchestrator(channel_with(&["A"]), config);

    let report = orch.run(&data).await.unwrap();
    assert_eq!(report.status, RunStatus::DryRun);
    assert_eq!(
        (report.total, report.successful, report.failed, report.skipped),
        (0, 0, 0, 0)
    );
    assert!(orch.channel().calls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_between_records() {
    let mut config = fast_config();
    config.delay = DelayRange::from_secs(10, 10).unwrap();
    let data = dataset(&[&["A", "1"], &["B", "2"], &["C", "3"]]);
    let mut orch = orchestrator(channel_with(&["A", "B", "C"]), config);

    let cancel = orch.cancel_signal();
    tokio::spawn(async move {
        // A finishes after ~4s of settle time, then the 10s delay starts.
        tokio::time::sleep(Duration::from_secs(6)).await;
        cancel.cancel();
    });

    let report = orch.run(&data).await.unwrap();
    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.successful, 1);
    assert_eq!(report.unprocessed, 2);
    assert_eq!(orch.channel().sent().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn inter_record_delay_is_skipped_after_last_record() {
    let mut config = fast_config();
    config.delay = DelayRange::from_secs(5, 5).unwrap();
    let data = dataset(&[&["A", "1"], &["B", "2"]]);
    let mut orch = orchestrator(channel_with(&["A", "B"]), config.clone());

    let started = tokio::time::Instant::now();
    orch.run(&data).await.unwrap();
    let elapsed = started.elapsed();

    // Per record: search settle + two send settles.
    let per_record = config.resolver.search_settle
        + config.dispatch.settle_before_commit
        + config.dispatch.settle_after_commit;
    let expected = per_record * 2 + Duration::from_secs(5);
    assert!(elapsed >= expected && elapsed < expected + Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_send_lets_record_finish() {
    let data = dataset(&[&["A", "1"], &["B", "2"], &["C", "3"]]);
    let mut orch = orchestrator(channel_with(&["A", "B", "C"]), fast_config());

    let cancel = orch.cancel_signal();
    tokio::spawn(async move {
        // Search settles at 2s; A is between typing and commit at 2.5s.
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        cancel.cancel();
    });

    let report = orch.run(&data).await.unwrap();
    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.successful, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.unprocessed, 2);
    let sent = orch.channel().sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "A");
}

#[tokio::test(start_paused = true)]
async fn rate_windows_carry_over_between_runs() {
    let mut orch = orchestrator(channel_with(&["A", "B"]), config_with_limits(10, 1, 60));
    let first = orch.run(&dataset(&[&["A", "1"]])).await.unwrap();
    assert_eq!(first.successful, 1);

    // The hour window is still full from the first run.
    let started = tokio::time::Instant::now();
    let second = orch.run(&dataset(&[&["B", "2"]])).await.unwrap();
    assert_eq!(second.successful, 1);
    assert!(started.elapsed() >= Duration::from_secs(3_500));
    assert_eq!(orch.limiter().usage().hour, 1);
}
