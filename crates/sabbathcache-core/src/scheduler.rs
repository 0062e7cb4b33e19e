//! Deferred work scheduling on tokio.
//!
//! Jobs are identified by a unique name. Enqueuing under a name that is
//! already scheduled aborts the previous job and replaces it, so repeated
//! scheduling never stacks. Dropping the scheduler aborts every job.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of one run of a [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    Success,
    /// Try again after the backoff delay
    Retry,
    /// Give up on this run
    Failure,
}

#[async_trait]
pub trait Worker: Send + Sync {
    async fn run(&self) -> WorkOutcome;
}

/// Exponential backoff applied to periodic jobs that ask for a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(30),
            max: Duration::from_secs(5 * 60 * 60),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

struct Job {
    id: u64,
    handle: JoinHandle<()>,
}

type JobTable = Arc<Mutex<HashMap<String, Job>>>;

pub struct WorkScheduler {
    jobs: JobTable,
    next_id: AtomicU64,
}

impl Default for WorkScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkScheduler {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Run `worker` once after `delay`, replacing any job with the same name.
    pub fn enqueue_unique_one_time(&self, name: &str, delay: Duration, worker: Arc<dyn Worker>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let jobs = Arc::clone(&self.jobs);
        let job_name = name.to_string();

        info!(job = name, delay_secs = delay.as_secs(), "Scheduling one-time job");
        let mut table = self.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let outcome = worker.run().await;
            info!(job = %job_name, ?outcome, "One-time job finished");
            remove_if_current(&jobs, &job_name, id);
        });
        replace_job(&mut table, name, Job { id, handle });
    }

    /// Run `worker` now and then every `interval`, replacing any job with the
    /// same name. A `Retry` outcome reruns after the backoff delay instead.
    pub fn enqueue_unique_periodic(
        &self,
        name: &str,
        interval: Duration,
        backoff: BackoffPolicy,
        worker: Arc<dyn Worker>,
    ) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let job_name = name.to_string();

        info!(job = name, interval_secs = interval.as_secs(), "Scheduling periodic job");
        let mut table = self.lock();
        let handle = tokio::spawn(async move {
            let mut attempt = 0u32;
            loop {
                let outcome = worker.run().await;
                let wait = match outcome {
                    WorkOutcome::Retry => {
                        attempt += 1;
                        let delay = backoff.delay(attempt);
                        warn!(job = %job_name, attempt, delay_secs = delay.as_secs(), "Periodic job asked for retry");
                        delay
                    }
                    WorkOutcome::Success | WorkOutcome::Failure => {
                        attempt = 0;
                        debug!(job = %job_name, ?outcome, "Periodic job finished");
                        interval
                    }
                };
                tokio::time::sleep(wait).await;
            }
        });
        replace_job(&mut table, name, Job { id, handle });
    }

    /// Cancel the job with `name`. Returns whether one was scheduled.
    pub fn cancel(&self, name: &str) -> bool {
        match self.lock().remove(name) {
            Some(job) => {
                job.handle.abort();
                info!(job = name, "Cancelled job");
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.lock()
            .get(name)
            .map(|job| !job.handle.is_finished())
            .unwrap_or(false)
    }

    /// Names of all pending jobs, sorted.
    pub fn scheduled(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, job)| !job.handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Abort every job.
    pub fn shutdown(&self) {
        for (name, job) in self.lock().drain() {
            debug!(job = %name, "Aborting job");
            job.handle.abort();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Job>> {
        match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for WorkScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn replace_job(table: &mut HashMap<String, Job>, name: &str, job: Job) {
    if let Some(previous) = table.insert(name.to_string(), job) {
        debug!(job = name, "Replacing existing job");
        previous.handle.abort();
    }
}

/// Drop the table entry for a finished job unless it has been replaced since.
fn remove_if_current(jobs: &JobTable, name: &str, id: u64) {
    let mut table = match jobs.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if table.get(name).map(|job| job.id) == Some(id) {
        table.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{sleep, Instant};

    /// Records each run and replays a scripted list of outcomes.
    struct ScriptedWorker {
        outcomes: Mutex<Vec<WorkOutcome>>,
        runs: Mutex<Vec<Instant>>,
    }

    impl ScriptedWorker {
        fn new(outcomes: Vec<WorkOutcome>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                runs: Mutex::new(Vec::new()),
            })
        }

        fn run_count(&self) -> usize {
            self.runs.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Worker for ScriptedWorker {
        async fn run(&self) -> WorkOutcome {
            self.runs.lock().unwrap().push(Instant::now());
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                WorkOutcome::Success
            } else {
                outcomes.remove(0)
            }
        }
    }

    struct CountingWorker(AtomicUsize);

    #[async_trait]
    impl Worker for CountingWorker {
        async fn run(&self) -> WorkOutcome {
            self.0.fetch_add(1, Ordering::SeqCst);
            WorkOutcome::Success
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = BackoffPolicy {
            initial: Duration::from_secs(30),
            max: Duration::from_secs(100),
        };
        assert_eq!(policy.delay(1), Duration::from_secs(30));
        assert_eq!(policy.delay(2), Duration::from_secs(60));
        assert_eq!(policy.delay(3), Duration::from_secs(100));
        assert_eq!(policy.delay(40), Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_time_job_runs_after_delay() {
        let scheduler = WorkScheduler::new();
        let worker = Arc::new(CountingWorker(AtomicUsize::new(0)));
        scheduler.enqueue_unique_one_time("notify", Duration::from_secs(10), worker.clone());
        assert!(scheduler.is_scheduled("notify"));

        sleep(Duration::from_secs(5)).await;
        assert_eq!(worker.0.load(Ordering::SeqCst), 0);

        sleep(Duration::from_secs(6)).await;
        assert_eq!(worker.0.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_scheduled("notify"));
        assert!(scheduler.scheduled().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_name_replaces_previous_job() {
        let scheduler = WorkScheduler::new();
        let first = Arc::new(CountingWorker(AtomicUsize::new(0)));
        let second = Arc::new(CountingWorker(AtomicUsize::new(0)));

        scheduler.enqueue_unique_one_time("notify", Duration::from_secs(10), first.clone());
        scheduler.enqueue_unique_one_time("notify", Duration::from_secs(20), second.clone());
        assert_eq!(scheduler.scheduled(), vec!["notify".to_string()]);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(first.0.load(Ordering::SeqCst), 0);
        assert_eq!(second.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_job_backs_off_on_retry() {
        let scheduler = WorkScheduler::new();
        let worker = ScriptedWorker::new(vec![WorkOutcome::Retry, WorkOutcome::Retry]);
        let backoff = BackoffPolicy {
            initial: Duration::from_secs(10),
            max: Duration::from_secs(15),
        };
        let start = Instant::now();
        scheduler.enqueue_unique_periodic("check", Duration::from_secs(100), backoff, worker.clone());

        sleep(Duration::from_secs(130)).await;
        let offsets: Vec<u64> = worker
            .runs
            .lock()
            .unwrap()
            .iter()
            .map(|t| (*t - start).as_secs())
            .collect();
        // run, retry after 10s, retry after 15s (capped), then the regular interval
        assert_eq!(offsets, vec![0, 10, 25, 125]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_drop_abort_jobs() {
        let worker = Arc::new(CountingWorker(AtomicUsize::new(0)));
        {
            let scheduler = WorkScheduler::new();
            scheduler.enqueue_unique_one_time("a", Duration::from_secs(10), worker.clone());
            scheduler.enqueue_unique_one_time("b", Duration::from_secs(10), worker.clone());
            assert!(scheduler.cancel("a"));
            assert!(!scheduler.cancel("a"));
            assert!(!scheduler.is_scheduled("a"));
            assert!(scheduler.is_scheduled("b"));
        }

        sleep(Duration::from_secs(20)).await;
        assert_eq!(worker.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_failure_waits_full_interval() {
        let scheduler = WorkScheduler::new();
        let worker = ScriptedWorker::new(vec![WorkOutcome::Failure]);
        scheduler.enqueue_unique_periodic(
            "check",
            Duration::from_secs(60),
            BackoffPolicy::default(),
            worker.clone(),
        );

        sleep(Duration::from_secs(59)).await;
        assert_eq!(worker.run_count(), 1);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(worker.run_count(), 2);
    }
}
