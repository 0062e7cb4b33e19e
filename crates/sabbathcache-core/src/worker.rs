//! Background jobs that announce the start of the Sabbath.
//!
//! A periodic routine check reads the newest cached Sabbath and arms a
//! one-time job for its start. The one-time job posts the notification.
//! A periodic refresh keeps the cache populated with the coming week.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::cache::SabbathCache;
use crate::calendar::Clock;
use crate::error::SabbathError;
use crate::models::Coordinates;
use crate::notify::{Notification, Notifier, Permission};
use crate::repository::SabbathRepository;
use crate::scheduler::{WorkOutcome, WorkScheduler, Worker};

/// Unique name of the periodic re-evaluation job.
pub const ROUTINE_CHECK_JOB: &str = "sabbath_routine_check";

/// Unique name of the one-time Sabbath start notification job.
pub const SABBATH_START_JOB: &str = "sabbath_start_notify";

/// Unique name of the periodic cache refresh job.
pub const REFRESH_JOB: &str = "sabbath_refresh";

/// Arm the one-time notification for `start`. Nothing is scheduled when the
/// start is not in the future; returns whether a job was armed.
pub fn schedule_sabbath_notification(
    scheduler: &WorkScheduler,
    start: DateTime<FixedOffset>,
    now: DateTime<Utc>,
    worker: Arc<dyn Worker>,
) -> bool {
    let delay = start.with_timezone(&Utc) - now;
    match delay.to_std() {
        Ok(delay) if !delay.is_zero() => {
            scheduler.enqueue_unique_one_time(SABBATH_START_JOB, delay, worker);
            true
        }
        _ => {
            debug!(%start, %now, "Sabbath start not in the future, nothing to schedule");
            false
        }
    }
}

/// Posts the Sabbath start notification.
pub struct SabbathStartWorker {
    notifier: Arc<dyn Notifier>,
    location: Option<String>,
}

impl SabbathStartWorker {
    pub fn new(notifier: Arc<dyn Notifier>, location: Option<String>) -> Self {
        Self { notifier, location }
    }
}

#[async_trait]
impl Worker for SabbathStartWorker {
    async fn run(&self) -> WorkOutcome {
        if self.notifier.permission() == Permission::Denied {
            warn!("Notification permission denied, skipping Sabbath alert");
            return WorkOutcome::Failure;
        }

        let notification = Notification::sabbath_start(self.location.as_deref());
        match self.notifier.post(&notification) {
            Ok(()) => WorkOutcome::Success,
            Err(e) => {
                warn!(error = %e, "Failed to post Sabbath alert");
                WorkOutcome::Failure
            }
        }
    }
}

/// Re-reads the cached Sabbath start and re-arms the one-time job.
pub struct RoutineCheckWorker {
    cache: SabbathCache,
    clock: Arc<dyn Clock>,
    scheduler: Weak<WorkScheduler>,
    start_worker: Arc<dyn Worker>,
}

impl RoutineCheckWorker {
    pub fn new(
        cache: SabbathCache,
        clock: Arc<dyn Clock>,
        scheduler: Weak<WorkScheduler>,
        start_worker: Arc<dyn Worker>,
    ) -> Self {
        Self {
            cache,
            clock,
            scheduler,
            start_worker,
        }
    }
}

#[async_trait]
impl Worker for RoutineCheckWorker {
    async fn run(&self) -> WorkOutcome {
        let Some(scheduler) = self.scheduler.upgrade() else {
            debug!("Scheduler gone, routine check has nothing to arm");
            return WorkOutcome::Failure;
        };

        let entity = match self.cache.latest().await {
            Ok(Some(entity)) => entity,
            Ok(None) => {
                debug!("No cached Sabbath times yet");
                return WorkOutcome::Retry;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read cached Sabbath times");
                return WorkOutcome::Retry;
            }
        };

        let times = match entity.to_times() {
            Ok(times) => times,
            Err(e) => {
                warn!(key = %entity.id, error = %e, "Unreadable cached Sabbath times");
                return WorkOutcome::Retry;
            }
        };

        let now = self.clock.now();
        if schedule_sabbath_notification(&scheduler, times.friday, now, Arc::clone(&self.start_worker)) {
            info!(key = %entity.id, start = %times.friday, "Sabbath start notification armed");
            WorkOutcome::Success
        } else {
            WorkOutcome::Retry
        }
    }
}

/// Resolves Sabbath info through a repository so the cache holds the current week.
pub struct RefreshWorker {
    repository: Arc<dyn SabbathRepository>,
    coords: Coordinates,
}

impl RefreshWorker {
    pub fn new(repository: Arc<dyn SabbathRepository>, coords: Coordinates) -> Self {
        Self { repository, coords }
    }
}

#[async_trait]
impl Worker for RefreshWorker {
    async fn run(&self) -> WorkOutcome {
        let mut outcome = WorkOutcome::Success;
        let mut results = self.repository.get_sabbath_info(self.coords);
        while let Some(result) = results.next().await {
            match result {
                Ok(info) => debug!(week = %info.week_key, "Sabbath info refreshed"),
                Err(SabbathError::Fetch(e)) if e.is_transient() => {
                    warn!(error = %e, "Transient failure refreshing Sabbath times");
                    if outcome == WorkOutcome::Success {
                        outcome = WorkOutcome::Retry;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to refresh Sabbath times");
                    outcome = WorkOutcome::Failure;
                }
            }
        }
        outcome
    }
}

// ============================================================================
// Tests
// ============================================================================
