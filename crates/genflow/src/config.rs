use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::jobs::reaper::DEFAULT_STALE_AFTER_SECS;

/// Runtime configuration, loaded from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub api_addr: String,
    pub jwt_secret: String,
    pub service_token: Option<String>,
    pub migrate_on_startup: bool,
    pub log_json: bool,

    pub stale_after_secs: i64,
    pub sweep_interval_secs: u64,
    pub poll: PollSettings,
}

/// Shape of the poll response.
#[derive(Clone, Debug)]
pub struct PollSettings {
    pub active_limit: i64,
    pub recent_limit: i64,
    pub recent_window_minutes: i64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            active_limit: 20,
            recent_limit: 20,
            recent_window_minutes: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let jwt_secret = env_or_fallback("GENFLOW_JWT_SECRET", "JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("GENFLOW_JWT_SECRET is missing"))?;

        let api_addr = env_or_fallback("GENFLOW_API_ADDR", "API_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let service_token = env_or_fallback("GENFLOW_SERVICE_TOKEN", "SERVICE_TOKEN");

        let migrate_on_startup = env_bool("GENFLOW_MIGRATE_ON_STARTUP").unwrap_or(false);
        let log_json = env_bool("GENFLOW_LOG_JSON").unwrap_or(false);

        let stale_after_secs = env_parse("GENFLOW_STALE_AFTER_SECS")
            .filter(|v: &i64| *v > 0)
            .unwrap_or(DEFAULT_STALE_AFTER_SECS);

        let sweep_interval_secs = env_parse("GENFLOW_SWEEP_INTERVAL_SECS").unwrap_or(30);

        let defaults = PollSettings::default();
        let poll = PollSettings {
            active_limit: env_parse("GENFLOW_ACTIVE_LIMIT").unwrap_or(defaults.active_limit),
            recent_limit: env_parse("GENFLOW_RECENT_LIMIT").unwrap_or(defaults.recent_limit),
            recent_window_minutes: env_parse("GENFLOW_RECENT_WINDOW_MINUTES")
                .unwrap_or(defaults.recent_window_minutes),
        };

        Ok(Self {
            database_url,
            api_addr,
            jwt_secret,
            service_token,
            migrate_on_startup,
            log_json,
            stale_after_secs,
            sweep_interval_secs,
            poll,
        })
    }

    pub fn stale_after(&self) -> Duration {
        Duration::seconds(self.stale_after_secs)
    }

    /// `None` when the background sweep is disabled (`GENFLOW_SWEEP_INTERVAL_SECS=0`).
    pub fn sweep_interval(&self) -> Option<StdDuration> {
        (self.sweep_interval_secs > 0).then(|| StdDuration::from_secs(self.sweep_interval_secs))
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
