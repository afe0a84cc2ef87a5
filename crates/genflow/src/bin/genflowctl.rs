use std::env;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use genflow::auth::JwtKeys;
use genflow::db;
use genflow::jobs::{
    GenerationJob, GenerationKind, JobStatus, JobStore, JobTracker, PgJobStore, StalenessReaper,
    TenantScope,
};
use genflow::poller::{HttpJobFeed, Notification, Poller};
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const USAGE: &str = "genflowctl <command>\n\
    Commands:\n\
    - reset\n\
    - seed-brand <brand> <user>...\n\
    - seed <brand> <user> <n>\n\
    - jobs <brand> <user>\n\
    - reap <brand> <user>\n\
    - token <user>\n\
    - watch <base_url> <brand> <token>\n\
    \n\
    Uses DATABASE_URL or TEST_DATABASE_URL; token uses GENFLOW_JWT_SECRET.\n";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{USAGE}");
        std::process::exit(2);
    }

    match args[1].as_str() {
        "reset" => reset(&connect().await?).await?,
        "seed-brand" => {
            let (brand, users) = match args.get(2) {
                Some(brand) if args.len() > 3 => (brand, &args[3..]),
                _ => usage_exit("usage: genflowctl seed-brand <brand> <user>..."),
            };
            let store = PgJobStore::new(connect().await?);
            store.upsert_brand(brand).await?;
            for user in users {
                store.add_member(brand, user).await?;
            }
            println!("brand {brand}: {} member(s)", users.len());
        }
        "seed" => {
            let scope = scope_arg(&args, "usage: genflowctl seed <brand> <user> <n>");
            let n: usize = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(5);
            seed(&PgJobStore::new(connect().await?), &scope, n).await?;
        }
        "jobs" => {
            let scope = scope_arg(&args, "usage: genflowctl jobs <brand> <user>");
            show_jobs(&tracker(connect().await?), &scope).await?;
        }
        "reap" => {
            let scope = scope_arg(&args, "usage: genflowctl reap <brand> <user>");
            let budget = env::var("GENFLOW_STALE_AFTER_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(genflow::jobs::reaper::DEFAULT_STALE_AFTER_SECS);
            let reaper =
                StalenessReaper::new(tracker(connect().await?), Duration::seconds(budget));
            let report = reaper.reap_stale_jobs(&scope).await?;
            println!(
                "scanned={} reaped={} failed_writes={}",
                report.scanned, report.reaped, report.failed_writes
            );
        }
        "token" => {
            let user = args
                .get(2)
                .unwrap_or_else(|| usage_exit("usage: genflowctl token <user>"));
            let secret = env::var("GENFLOW_JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("GENFLOW_JWT_SECRET must be set"))?;
            let token = JwtKeys::from_secret(&secret).issue_token(user, Duration::hours(12))?;
            println!("{token}");
        }
        "watch" => {
            let (Some(base_url), Some(brand), Some(token)) =
                (args.get(2), args.get(3), args.get(4))
            else {
                usage_exit("usage: genflowctl watch <base_url> <brand> <token>");
            };
            watch(base_url, brand, token).await;
        }
        other => {
            eprintln!("Unknown command: {other}");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn usage_exit(msg: &str) -> ! {
    eprintln!("{msg}");
    std::process::exit(2);
}

fn scope_arg(args: &[String], usage: &str) -> TenantScope {
    match (args.get(2), args.get(3)) {
        (Some(brand), Some(user)) => TenantScope::new(brand.as_str(), user.as_str()),
        _ => usage_exit(usage),
    }
}

async fn connect() -> anyhow::Result<PgPool> {
    let url = env::var("DATABASE_URL")
        .or_else(|_| env::var("TEST_DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("DATABASE_URL or TEST_DATABASE_URL must be set"))?;
    let pool = db::make_pool(&url).await?;
    db::run_migrations(&pool).await?;
    Ok(pool)
}

fn tracker(pool: PgPool) -> JobTracker {
    JobTracker::new(Arc::new(PgJobStore::new(pool)))
}

async fn reset(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        TRUNCATE TABLE
            generation_jobs,
            brand_members,
            brands
        CASCADE
        "#,
    )
    .execute(pool)
    .await?;

    println!("reset OK");
    Ok(())
}

/// Insert `n` jobs cycling through kinds and lifecycle stages, including
/// one processing job already past the default staleness budget.
async fn seed(store: &PgJobStore, scope: &TenantScope, n: usize) -> anyhow::Result<()> {
    let kinds = [GenerationKind::Image, GenerationKind::Video, GenerationKind::Music];
    let now = Utc::now();

    for i in 0..n {
        let mut job = GenerationJob::new(scope, kinds[i % kinds.len()], now);
        match i % 4 {
            0 => {}
            1 => {
                job.status = JobStatus::Processing;
                job.started_at = Some(now);
                job.progress = 35;
            }
            2 => {
                job.status = JobStatus::Completed;
                job.started_at = Some(now - Duration::seconds(40));
                job.completed_at = Some(now);
                job.progress = 100;
                job.result_ref = Some(format!("assets/{}", job.id));
            }
            _ => {
                job.status = JobStatus::Processing;
                job.created_at = now - Duration::minutes(4);
                job.started_at = Some(now - Duration::minutes(3));
                job.progress = 10;
            }
        }
        store.insert(&job).await?;
        println!("+ inserted {} job id={} status={}", job.kind, job.id, job.status);
    }
    Ok(())
}

async fn show_jobs(tracker: &JobTracker, scope: &TenantScope) -> anyhow::Result<()> {
    let active = tracker.get_active_jobs_for_user(scope, 100).await?;
    let recent = tracker.get_recent_jobs_for_user(scope, 100, 60).await?;

    println!("active ({}):", active.len());
    for j in &active {
        println!("  {} {} {} {}%", j.id, j.kind, j.status, j.progress);
    }
    println!("recent, last hour ({}):", recent.len());
    for j in &recent {
        let detail = j.error.as_deref().or(j.result_ref.as_deref()).unwrap_or("-");
        println!("  {} {} {} {}", j.id, j.kind, j.status, detail);
    }
    Ok(())
}

async fn watch(base_url: &str, brand: &str, token: &str) {
    let poller = Poller::new(
        HttpJobFeed::new(base_url, token),
        brand,
        StdDuration::from_secs(3),
    );
    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();

    let poll_task = tokio::spawn(poller.run(tx, cancel.clone()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            msg = rx.recv() => match msg {
                Some(Notification::Progress { job_id, kind, status, progress }) => {
                    println!("[{kind}] {job_id} {status} {progress}%");
                }
                Some(Notification::Succeeded { job_id, kind, result_ref }) => {
                    println!("[{kind}] {job_id} done {}", result_ref.unwrap_or_default());
                }
                Some(Notification::Failed { job_id, kind, error }) => {
                    println!("[{kind}] {job_id} failed: {error}");
                }
                Some(Notification::Dismissed { job_id }) => println!("{job_id} dismissed"),
                None => break,
            }
        }
    }

    cancel.cancel();
    let _ = poll_task.await;
}
