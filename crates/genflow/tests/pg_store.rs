//! PostgreSQL store tests. Run with `TEST_DATABASE_URL` set; skipped otherwise.

use chrono::{Duration, Utc};
use serial_test::serial;

mod common;
use common::{job_in, scope, setup_db};

use genflow::error::JobError;
use genflow::jobs::{BrandAccess, GenerationKind, JobPatch, JobStatus, JobStore, PgJobStore};

#[tokio::test]
#[serial]
async fn create_get_and_update_roundtrip() {
    let Some(pool) = setup_db().await else { return };
    let store = PgJobStore::new(pool);
    let s = scope("brand-a", "user-1");

    let id = store.create(&s, GenerationKind::Music).await.unwrap();
    let job = store.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.kind, GenerationKind::Music);

    let started = store.update(id, JobPatch::started()).await.unwrap();
    assert!(started.started_at.is_some());
    assert_eq!(store.get(id).await.unwrap(), started);

    let done = store
        .update(id, JobPatch::completed(Some("assets/a.mp3".into())))
        .await
        .unwrap();
    assert_eq!(store.get(id).await.unwrap(), done);

    let err = store.update(id, JobPatch::progress(5)).await.unwrap_err();
    assert!(matches!(err, JobError::Immutable { .. }));
}

#[tokio::test]
#[serial]
async fn missing_job_is_not_found() {
    let Some(pool) = setup_db().await else { return };
    let store = PgJobStore::new(pool);
    let id = uuid::Uuid::new_v4();
    assert!(matches!(store.get(id).await, Err(JobError::NotFound { .. })));
    assert!(matches!(
        store.update(id, JobPatch::started()).await,
        Err(JobError::NotFound { .. })
    ));
}

#[tokio::test]
#[serial]
async fn active_recent_and_stale_views() {
    let Some(pool) = setup_db().await else { return };
    let store = PgJobStore::new(pool);
    let s = scope("brand-a", "user-1");
    let now = Utc::now();

    let pending = job_in(&s, JobStatus::Pending, None, None);
    let stale = job_in(
        &s,
        JobStatus::Processing,
        Some(now - Duration::minutes(3)),
        None,
    );
    let fresh_done = job_in(&s, JobStatus::Completed, None, Some(now));
    let old_done = job_in(&s, JobStatus::Failed, None, Some(now - Duration::minutes(10)));
    let foreign = job_in(&scope("brand-b", "user-1"), JobStatus::Pending, None, None);
    for j in [&pending, &stale, &fresh_done, &old_done, &foreign] {
        store.insert(j).await.unwrap();
    }

    let active = store.query_active(&s, 20).await.unwrap();
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|j| j.brand_id == "brand-a"));

    let recent = store
        .query_recent(&s, 20, now - Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, fresh_done.id);

    let stale_rows = store
        .query_stale(now - Duration::minutes(2), 20)
        .await
        .unwrap();
    assert_eq!(stale_rows.len(), 1);
    assert_eq!(stale_rows[0].id, stale.id);
}

#[tokio::test]
#[serial]
async fn brand_membership_lookup() {
    let Some(pool) = setup_db().await else { return };
    let store = PgJobStore::new(pool);
    store.upsert_brand("brand-a").await.unwrap();
    store.add_member("brand-a", "user-1").await.unwrap();

    assert_eq!(
        store.brand_access("brand-a", "user-1").await.unwrap(),
        BrandAccess::Granted
    );
    assert_eq!(
        store.brand_access("brand-a", "user-2").await.unwrap(),
        BrandAccess::Denied
    );
    assert_eq!(
        store.brand_access("nope", "user-1").await.unwrap(),
        BrandAccess::UnknownBrand
    );
}
