mod support;

use std::sync::Arc;
use std::time::Duration;

use signoff_core::domain::approval::{ApprovalCode, ApprovalId, ApprovalStatus};
use signoff_db::repositories::RecordListing;
use signoff_service::notify::NotificationEvent;
use signoff_service::service::TIMEOUT_REASON;
use signoff_service::sweeper::{RetryPolicy, SweepReport, SweeperSettings, TimeoutSweeper};

use support::{Harness, Sent};

fn sweeper(harness: &Harness) -> TimeoutSweeper {
    TimeoutSweeper::new(
        Arc::clone(&harness.service),
        SweeperSettings {
            interval: Duration::from_secs(60),
            timeout_millis: 30 * 60_000,
            retry: RetryPolicy { max_retries: 3, base_delay_ms: 1, max_delay_ms: 10 },
        },
    )
}

#[tokio::test]
async fn cancels_only_requests_past_the_timeout() {
    let harness = Harness::new();
    let stale = harness.create("u-alice", "u-bob", "Deploy hotfix").await;
    harness.clock.advance_minutes(26);
    let fresh = harness.create("u-carol", "u-bob", "Rotate keys").await;
    harness.clock.advance_minutes(5);
    harness.notifier.clear();

    let report = sweeper(&harness).sweep_once().await;

    assert_eq!(
        report,
        SweepReport { scanned: 2, eligible: 1, canceled: 1, superseded: 0, failed: 0 }
    );
    let canceled = harness.stored(&stale).await;
    assert_eq!(canceled.status, ApprovalStatus::Canceled);
    assert_eq!(canceled.canceled_reason.as_deref(), Some(TIMEOUT_REASON));
    assert!(canceled.outcome_notified);
    assert_eq!(harness.stored(&fresh).await, fresh);

    assert_eq!(
        harness.notifier.sent(),
        vec![
            Sent::Notify {
                event: NotificationEvent::TimedOut,
                recipient: "u-alice".to_string(),
                code: stale.code.clone(),
            },
            Sent::Edit { post_id: "post-1".to_string(), event: NotificationEvent::TimedOut },
        ]
    );

    let audited = harness.audit.events_of_type("approval.canceled");
    assert_eq!(audited.len(), 1);
    assert_eq!(audited[0].actor, "system");
    assert_eq!(audited[0].metadata.get("origin").map(String::as_str), Some("timeout"));
}

#[tokio::test]
async fn a_second_pass_finds_nothing_left() {
    let harness = Harness::new();
    harness.create("u-alice", "u-bob", "Deploy hotfix").await;
    harness.clock.advance_minutes(45);
    let sweeper = sweeper(&harness);

    assert_eq!(sweeper.sweep_once().await.canceled, 1);
    assert_eq!(
        sweeper.sweep_once().await,
        SweepReport { scanned: 1, ..SweepReport::default() }
    );
}

#[tokio::test]
async fn empty_store_is_a_quiet_pass() {
    let harness = Harness::new();

    assert_eq!(sweeper(&harness).sweep_once().await, SweepReport::default());
    assert!(harness.audit.events().is_empty());
}

#[tokio::test]
async fn persistence_failures_are_retried_with_backoff() {
    let harness = Harness::new();
    let stale = harness.create("u-alice", "u-bob", "Deploy hotfix").await;
    harness.clock.advance_minutes(31);
    harness.kv.fail_next_sets(2, "approval:record:");

    let report = sweeper(&harness).sweep_once().await;

    assert_eq!(report.canceled, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(harness.stored(&stale).await.status, ApprovalStatus::Canceled);
}

#[tokio::test]
async fn gives_up_after_the_retry_budget() {
    let harness = Harness::new();
    let stale = harness.create("u-alice", "u-bob", "Deploy hotfix").await;
    harness.clock.advance_minutes(31);
    harness.kv.fail_next_sets(10, "approval:record:");

    let report = sweeper(&harness).sweep_once().await;

    assert_eq!(report.eligible, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(harness.stored(&stale).await.status, ApprovalStatus::Pending);
}

#[tokio::test]
async fn records_finalized_after_the_scan_are_superseded() {
    let harness = Harness::new();
    let created = harness.create("u-alice", "u-bob", "Deploy hotfix").await;
    harness.clock.advance_minutes(31);
    harness
        .service
        .record_decision(&created.id.0, "u-bob", "approved", None)
        .await
        .expect("approve");
    harness
        .repository
        .serve_stale_scan(RecordListing { records: vec![created.clone()], skipped: Vec::new() });

    let report = sweeper(&harness).sweep_once().await;

    assert_eq!(report.superseded, 1);
    assert_eq!(report.canceled, 0);
    assert_eq!(harness.stored(&created).await.status, ApprovalStatus::Approved);
}

#[tokio::test]
async fn vanished_records_count_as_failures() {
    let harness = Harness::new();
    let mut ghost = harness.create("u-alice", "u-bob", "Deploy hotfix").await;
    ghost.id = ApprovalId("rec-missing".to_string());
    ghost.code = ApprovalCode("A-ZZZZZZ".to_string());
    harness.clock.advance_minutes(31);
    harness
        .repository
        .serve_stale_scan(RecordListing { records: vec![ghost], skipped: Vec::new() });

    let report = sweeper(&harness).sweep_once().await;

    assert_eq!(
        report,
        SweepReport { scanned: 1, eligible: 1, failed: 1, ..SweepReport::default() }
    );
}

#[tokio::test(start_paused = true)]
async fn loop_survives_a_panicking_pass() {
    let harness = Harness::new();
    let stale = harness.create("u-alice", "u-bob", "Deploy hotfix").await;
    harness.clock.advance_minutes(31);
    harness.repository.panic_on_next_scan();
    let sweeper = sweeper(&harness);

    assert!(sweeper.start());
    tokio::time::sleep(Duration::from_secs(90)).await;
    assert!(sweeper.is_running());
    assert_eq!(harness.stored(&stale).await.status, ApprovalStatus::Pending);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.stored(&stale).await.status, ApprovalStatus::Canceled);

    sweeper.stop().await;
    assert!(!sweeper.is_running());
}

#[tokio::test(start_paused = true)]
async fn stop_lets_the_running_pass_finish_and_starts_no_other() {
    for _ in 0..8 {
        let harness = Harness::new();
        let stale = harness.create("u-alice", "u-bob", "Deploy hotfix").await;
        harness.clock.advance_minutes(31);
        harness.repository.slow_scans(Duration::from_secs(90));
        let sweeper = sweeper(&harness);

        assert!(sweeper.start());
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(harness.repository.scans(), 1);
        assert_eq!(harness.stored(&stale).await.status, ApprovalStatus::Pending);

        sweeper.stop().await;
        assert!(!sweeper.is_running());
        assert_eq!(harness.stored(&stale).await.status, ApprovalStatus::Canceled);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(harness.repository.scans(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent_and_restartable() {
    let harness = Harness::new();
    let sweeper = sweeper(&harness);

    assert!(sweeper.start());
    assert!(!sweeper.start());
    sweeper.stop().await;
    assert!(!sweeper.is_running());

    assert!(sweeper.start());
    assert!(sweeper.is_running());
    sweeper.stop().await;
    sweeper.stop().await;
    assert!(!sweeper.is_running());
}
