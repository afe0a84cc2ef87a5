use std::sync::Arc;

use chrono::{Duration, Utc};

mod common;
use common::{job_in, reaper, reaper_over, scope, tracker, FailingWrites};

use genflow::jobs::{JobStatus, JobStore, MemoryJobStore};

#[tokio::test]
async fn stale_processing_job_is_failed_with_elapsed_minutes() {
    let store = MemoryJobStore::new();
    let s = scope("brand-a", "user-1");
    let job = job_in(
        &s,
        JobStatus::Processing,
        Some(Utc::now() - Duration::minutes(3)),
        None,
    );
    store.insert(&job).await.unwrap();

    let report = reaper(&store).reap_stale_jobs(&s).await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.reaped, 1);

    let reaped = store.get(job.id).await.unwrap();
    assert_eq!(reaped.status, JobStatus::Failed);
    assert!(reaped.completed_at.is_some());
    assert!(
        reaped.error.as_deref().unwrap().contains("3 minutes"),
        "unexpected error: {:?}",
        reaped.error
    );
    assert_eq!(reaped.started_at, job.started_at);

    let t = tracker(&store);
    assert!(t.get_active_jobs_for_user(&s, 20).await.unwrap().is_empty());
    let recent = t.get_recent_jobs_for_user(&s, 20, 5).await.unwrap();
    assert_eq!(recent[0].id, job.id);
}

#[tokio::test]
async fn fresh_jobs_are_left_alone() {
    let store = MemoryJobStore::new();
    let s = scope("brand-a", "user-1");
    let running = job_in(
        &s,
        JobStatus::Processing,
        Some(Utc::now() - Duration::seconds(30)),
        None,
    );
    let pending = job_in(&s, JobStatus::Pending, None, None);
    store.insert(&running).await.unwrap();
    store.insert(&pending).await.unwrap();

    let report = reaper(&store).reap_stale_jobs(&s).await.unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.reaped, 0);
    assert_eq!(
        store.get(running.id).await.unwrap().status,
        JobStatus::Processing
    );
}

#[tokio::test]
async fn pending_job_uses_created_at() {
    let store = MemoryJobStore::new();
    let s = scope("brand-a", "user-1");
    let mut job = job_in(&s, JobStatus::Pending, None, None);
    job.created_at = Utc::now() - Duration::minutes(4);
    store.insert(&job).await.unwrap();

    reaper(&store).reap_stale_jobs(&s).await.unwrap();
    let reaped = store.get(job.id).await.unwrap();
    assert_eq!(reaped.status, JobStatus::Failed);
    assert!(reaped.error.unwrap().contains("4 minutes"));
}

#[tokio::test]
async fn reap_only_touches_the_requested_tenant() {
    let store = MemoryJobStore::new();
    let mine = scope("brand-a", "user-1");
    let theirs = scope("brand-a", "user-2");
    let stale_at = Some(Utc::now() - Duration::minutes(5));

    let their_job = job_in(&theirs, JobStatus::Processing, stale_at, None);
    store.insert(&their_job).await.unwrap();
    store
        .insert(&job_in(&mine, JobStatus::Processing, stale_at, None))
        .await
        .unwrap();

    let report = reaper(&store).reap_stale_jobs(&mine).await.unwrap();
    assert_eq!(report.reaped, 1);
    assert_eq!(
        store.get(their_job.id).await.unwrap().status,
        JobStatus::Processing
    );
}

#[tokio::test]
async fn sweep_reaps_every_tenant() {
    let store = MemoryJobStore::new();
    let stale_at = Some(Utc::now() - Duration::minutes(5));
    let a = job_in(&scope("brand-a", "u1"), JobStatus::Processing, stale_at, None);
    let b = job_in(&scope("brand-b", "u2"), JobStatus::Processing, stale_at, None);
    let fresh = job_in(
        &scope("brand-b", "u2"),
        JobStatus::Processing,
        Some(Utc::now()),
        None,
    );
    for job in [&a, &b, &fresh] {
        store.insert(job).await.unwrap();
    }

    let report = reaper(&store).sweep().await.unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.reaped, 2);
    assert_eq!(store.get(a.id).await.unwrap().status, JobStatus::Failed);
    assert_eq!(store.get(b.id).await.unwrap().status, JobStatus::Failed);
    assert_eq!(
        store.get(fresh.id).await.unwrap().status,
        JobStatus::Processing
    );
}

#[tokio::test]
async fn second_reap_is_a_no_op() {
    let store = MemoryJobStore::new();
    let s = scope("brand-a", "user-1");
    store
        .insert(&job_in(
            &s,
            JobStatus::Processing,
            Some(Utc::now() - Duration::minutes(3)),
            None,
        ))
        .await
        .unwrap();

    let r = reaper(&store);
    assert_eq!(r.reap_stale_jobs(&s).await.unwrap().reaped, 1);
    let again = r.reap_stale_jobs(&s).await.unwrap();
    assert_eq!(again.scanned, 0);
    assert_eq!(again.reaped, 0);
}

#[tokio::test]
async fn failed_reap_write_is_counted_not_returned() {
    let store = MemoryJobStore::new();
    let s = scope("brand-a", "user-1");
    let stale = job_in(
        &s,
        JobStatus::Processing,
        Some(Utc::now() - Duration::minutes(4)),
        None,
    );
    store.insert(&stale).await.unwrap();

    let report = reaper_over(Arc::new(FailingWrites(store.clone())))
        .reap_stale_jobs(&s)
        .await
        .unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.reaped, 0);
    assert_eq!(report.failed_writes, 1);
    assert_eq!(
        store.get(stale.id).await.unwrap().status,
        JobStatus::Processing
    );
}
