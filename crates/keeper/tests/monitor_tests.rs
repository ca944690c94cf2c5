//! Sale lifecycle monitor integration tests

mod common;

use anyhow::Result;
use chrono::{Duration, Utc};
use common::Harness;
use launchpad_keeper::{JobOutcome, ScanReport};
use launchpad_types::*;

#[tokio::test]
async fn test_refundable_sale_is_failed_without_job() -> Result<()> {
    let harness = Harness::new();
    let now = Utc::now();
    harness.ended_sale(1, now).await;
    harness.gateway.set_sale(1, false, true);

    let report = harness.keeper.monitor().scan(now).await?;
    assert_eq!(report.scanned, 1);
    assert_eq!(report.refunded, 1);
    assert_eq!(harness.status(1).await, FairLaunchStatus::Failed);
    assert!(harness.keeper.queue().job(1).await?.is_none());

    // Failed sales are terminal and drop out of later scans
    assert_eq!(harness.keeper.monitor().scan(now).await?, ScanReport::default());
    Ok(())
}

#[tokio::test]
async fn test_completable_sale_is_enqueued_once() -> Result<()> {
    let harness = Harness::new();
    let now = Utc::now();
    harness.ended_sale(2, now).await;
    harness.gateway.set_sale(2, true, false);

    let report = harness.keeper.monitor().scan(now).await?;
    assert_eq!(report.enqueued, 1);
    assert_eq!(harness.status(2).await, FairLaunchStatus::Completable);

    let job = harness.keeper.queue().job(2).await?.unwrap();
    assert_eq!(job.state, JobState::Waiting);
    assert_eq!(job.attempts, 0);

    let report = harness.keeper.monitor().scan(now).await?;
    assert_eq!(report.scanned, 0);
    assert_eq!(harness.keeper.queue().jobs(JobState::Waiting).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_open_and_unclassified_sales_stay_pending() -> Result<()> {
    let harness = Harness::new();
    let now = Utc::now();

    let open = FairLaunch::new(3, common::creator(), "Open", "OPN", now + Duration::hours(1));
    harness.store.insert_fair_launch(&open).await?;
    harness.gateway.set_sale(3, true, false);

    harness.ended_sale(4, now).await;

    let report = harness.keeper.monitor().scan(now).await?;
    assert_eq!(report.scanned, 1);
    assert_eq!(report.still_pending, 1);
    assert_eq!(harness.status(3).await, FairLaunchStatus::Pending);
    assert_eq!(harness.status(4).await, FairLaunchStatus::Pending);
    assert!(harness.keeper.queue().job(3).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_one_failing_sale_does_not_stop_the_scan() -> Result<()> {
    let harness = Harness::new();
    let now = Utc::now();
    harness.ended_sale(5, now).await;
    harness.ended_sale(6, now).await;
    harness.gateway.fail_sale_state(5);
    harness.gateway.set_sale(6, true, false);

    let report = harness.keeper.monitor().scan(now).await?;
    assert_eq!(report.scanned, 2);
    assert_eq!(report.errors, 1);
    assert_eq!(report.enqueued, 1);
    assert_eq!(harness.status(5).await, FairLaunchStatus::Pending);
    assert_eq!(harness.status(6).await, FairLaunchStatus::Completable);
    Ok(())
}

#[tokio::test]
async fn test_sale_with_failed_job_is_held_until_requeue() -> Result<()> {
    let harness = Harness::new();
    let now = Utc::now();
    let launch = FairLaunch::new(7, common::creator(), "NoMeta", "NMT", now - Duration::hours(1));
    harness.store.insert_fair_launch(&launch).await?;
    harness.gateway.set_sale(7, true, false);

    let monitor = harness.keeper.monitor();
    let queue = harness.keeper.queue();
    assert_eq!(monitor.scan(now).await?.enqueued, 1);
    assert!(matches!(queue.process_next(now).await?, JobOutcome::Failed { .. }));
    assert_eq!(harness.status(7).await, FairLaunchStatus::Pending);

    let report = monitor.scan(now).await?;
    assert_eq!(report.held, 1);
    assert_eq!(queue.job(7).await?.unwrap().state, JobState::Failed);

    assert!(queue.requeue(7, now).await?);
    assert_eq!(queue.job(7).await?.unwrap().state, JobState::Waiting);
    assert_eq!(monitor.scan(now).await?.already_queued, 1);
    Ok(())
}
