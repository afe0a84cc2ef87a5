use std::sync::Arc;

use genflow::api;
use genflow::auth::JwtKeys;
use genflow::config;
use genflow::db;
use genflow::jobs::reaper::{self, StalenessReaper};
use genflow::jobs::{JobTracker, PgJobStore};

use tokio_util::sync::CancellationToken;

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=info".into());

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::Config::from_env()?;
    init_tracing(cfg.log_json);

    tracing::info!(
        api_addr = %cfg.api_addr,
        stale_after_secs = cfg.stale_after_secs,
        sweep_interval_secs = cfg.sweep_interval_secs,
        recent_window_minutes = cfg.poll.recent_window_minutes,
        agent_callbacks = cfg.service_token.is_some(),
        migrate_on_startup = cfg.migrate_on_startup,
        "genflow starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let tracker = JobTracker::new(Arc::new(PgJobStore::new(pool)));
    let stale_reaper = StalenessReaper::new(tracker.clone(), cfg.stale_after());
    let cancel = CancellationToken::new();

    // ---- API task ----
    let app = api::router(api::ApiState {
        tracker,
        reaper: stale_reaper.clone(),
        jwt: JwtKeys::from_secret(&cfg.jwt_secret),
        service_token: cfg.service_token.clone(),
        poll: cfg.poll.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&cfg.api_addr).await?;
    tracing::info!("api listening on http://{}", cfg.api_addr);

    let api_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await?;
            Ok::<(), anyhow::Error>(())
        })
    };

    // ---- Stale job sweep ----
    let sweep_handle = match cfg.sweep_interval() {
        Some(every) => Some(tokio::spawn(reaper::run_sweep(
            stale_reaper,
            every,
            cancel.clone(),
        ))),
        None => {
            tracing::info!("stale job sweep disabled");
            None
        }
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    cancel.cancel();

    api_handle.await??;
    if let Some(handle) = sweep_handle {
        handle.await?;
    }

    tracing::info!("genflow stopped");
    Ok(())
}
