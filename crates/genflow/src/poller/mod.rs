//! Client-side poller that turns job snapshots into transient notifications.
//!
//! The poller holds no authoritative state and never writes. Polls are
//! strictly sequential: the next one is only issued once the previous one
//! has resolved. A failed poll is silent and simply retried on the next tick.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::models::JobsSnapshot;

pub mod http;
pub mod session;

pub use http::HttpJobFeed;
pub use session::{Notification, NotificationSession};

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid feed url: {0}")]
    InvalidUrl(String),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Source of job snapshots for one brand.
#[async_trait]
pub trait JobFeed: Send + Sync {
    async fn fetch(&self, brand_id: &str) -> Result<JobsSnapshot, FeedError>;
}

pub struct Poller<F> {
    feed: F,
    brand_id: String,
    every: Duration,
    session: NotificationSession,
}

impl<F: JobFeed> Poller<F> {
    pub fn new(feed: F, brand_id: impl Into<String>, every: Duration) -> Self {
        Self::with_session(feed, brand_id, every, NotificationSession::default())
    }

    pub fn with_session(
        feed: F,
        brand_id: impl Into<String>,
        every: Duration,
        session: NotificationSession,
    ) -> Self {
        Self {
            feed,
            brand_id: brand_id.into(),
            every,
            session,
        }
    }

    pub fn session(&self) -> &NotificationSession {
        &self.session
    }

    /// One poll: fetch, fold into the session, then expire old notifications.
    /// On fetch failure only expiry runs; the last shown state stays on screen.
    pub async fn poll_once(&mut self) -> Vec<Notification> {
        let mut out = match self.feed.fetch(&self.brand_id).await {
            Ok(snapshot) => self.session.apply_snapshot(&snapshot, Utc::now()),
            Err(e) => {
                tracing::debug!(brand_id = %self.brand_id, error = %e, "poll failed; retrying next tick");
                Vec::new()
            }
        };
        out.extend(self.session.expire(Utc::now()));
        out
    }

    /// Poll until `cancel` fires or the receiver goes away.
    pub async fn run(mut self, sink: mpsc::Sender<Notification>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.every);
        // A slow poll delays the next one instead of bunching them up.
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    for notification in self.poll_once().await {
                        if sink.send(notification).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}
