//! Per-session notification bookkeeping for the client poller.
//!
//! Each tracked job walks `unseen -> shown -> resolved -> expired`, driven
//! only by polled snapshots. Skipped polls are tolerated (a job may go
//! straight from unseen to resolved) and an expired job is never shown
//! again in the same session. A shown job that drops out of both lists goes
//! back to unseen rather than expired.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::api::models::JobsSnapshot;
use crate::jobs::{GenerationJob, GenerationKind, JobStatus};

pub const DEFAULT_DISPLAY_FOR_SECS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Job shown or updated with a progress indicator.
    Progress {
        job_id: Uuid,
        kind: GenerationKind,
        status: JobStatus,
        progress: i32,
    },
    Succeeded {
        job_id: Uuid,
        kind: GenerationKind,
        result_ref: Option<String>,
    },
    Failed {
        job_id: Uuid,
        kind: GenerationKind,
        error: String,
    },
    /// Removed from view.
    Dismissed { job_id: Uuid },
}

#[derive(Debug, Clone, PartialEq)]
enum Tracked {
    Shown { status: JobStatus, progress: i32 },
    Resolved { at: DateTime<Utc> },
}

#[derive(Debug, Clone)]
pub struct NotificationSession {
    tracked: HashMap<Uuid, Tracked>,
    expired: HashSet<Uuid>,
    display_for: Duration,
}

impl Default for NotificationSession {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_DISPLAY_FOR_SECS))
    }
}

impl NotificationSession {
    pub fn new(display_for: Duration) -> Self {
        Self {
            tracked: HashMap::new(),
            expired: HashSet::new(),
            display_for,
        }
    }

    pub fn is_expired(&self, job_id: &Uuid) -> bool {
        self.expired.contains(job_id)
    }

    /// Jobs currently on screen.
    pub fn visible(&self) -> usize {
        self.tracked.len()
    }

    /// Fold a fresh snapshot into the session and return what changed on screen.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &JobsSnapshot,
        now: DateTime<Utc>,
    ) -> Vec<Notification> {
        let mut out = Vec::new();

        for job in &snapshot.active_jobs {
            if self.expired.contains(&job.id) {
                continue;
            }
            match self.tracked.get_mut(&job.id) {
                None => {
                    self.tracked.insert(
                        job.id,
                        Tracked::Shown {
                            status: job.status,
                            progress: job.progress,
                        },
                    );
                    out.push(progress_of(job, job.progress));
                }
                Some(Tracked::Shown { status, progress }) => {
                    // Displayed progress never goes backwards.
                    let shown = (*progress).max(job.progress);
                    if *status != job.status || shown != *progress {
                        *status = job.status;
                        *progress = shown;
                        out.push(progress_of(job, shown));
                    }
                }
                Some(Tracked::Resolved { .. }) => {}
            }
        }

        for job in &snapshot.recent_jobs {
            if self.expired.contains(&job.id) {
                continue;
            }
            if matches!(self.tracked.get(&job.id), Some(Tracked::Resolved { .. })) {
                continue;
            }
            self.tracked.insert(job.id, Tracked::Resolved { at: now });
            out.push(resolution_of(job));
        }

        // A shown job missing from both lists may just have been pushed off the
        // capped active list. Take it off screen but leave it unseen, so a later
        // resolution is still announced.
        let listed: HashSet<Uuid> = snapshot
            .active_jobs
            .iter()
            .chain(&snapshot.recent_jobs)
            .map(|j| j.id)
            .collect();
        let vanished: Vec<Uuid> = self
            .tracked
            .iter()
            .filter(|(id, t)| matches!(t, Tracked::Shown { .. }) && !listed.contains(id))
            .map(|(id, _)| *id)
            .collect();
        for job_id in vanished {
            self.tracked.remove(&job_id);
            out.push(Notification::Dismissed { job_id });
        }

        out
    }

    /// Retire resolved notifications that have been displayed long enough.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Vec<Notification> {
        let due: Vec<Uuid> = self
            .tracked
            .iter()
            .filter_map(|(id, t)| match t {
                Tracked::Resolved { at } if now - *at >= self.display_for => Some(*id),
                _ => None,
            })
            .collect();

        due.into_iter()
            .map(|job_id| {
                self.retire(job_id);
                Notification::Dismissed { job_id }
            })
            .collect()
    }

    fn retire(&mut self, job_id: Uuid) {
        self.tracked.remove(&job_id);
        self.expired.insert(job_id);
    }
}

fn progress_of(job: &GenerationJob, progress: i32) -> Notification {
    Notification::Progress {
        job_id: job.id,
        kind: job.kind,
        status: job.status,
        progress,
    }
}

fn resolution_of(job: &GenerationJob) -> Notification {
    match job.status {
        JobStatus::Failed => Notification::Failed {
            job_id: job.id,
            kind: job.kind,
            error: job
                .error
                .clone()
                .unwrap_or_else(|| "Generation failed".to_string()),
        },
        _ => Notification::Succeeded {
            job_id: job.id,
            kind: job.kind,
            result_ref: job.result_ref.clone(),
        },
    }
}
