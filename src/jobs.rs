use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rusqlite::types::Value;
use tracing::{debug, info, warn};

use crate::db::Selection;
use crate::domain::task::{now_millis, COLUMN_DUE_DATE, COLUMN_IS_COMPLETE};
use crate::provider::{ProviderError, TaskProvider};

pub const CLEANUP_JOB_ID: u32 = 43;
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);
/// Shortest period a [`ThreadJobScheduler`] accepts unless configured otherwise.
pub const MIN_PERIOD: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub id: u32,
    pub interval: Duration,
    pub persisted: bool,
}

impl JobInfo {
    pub fn periodic(id: u32, interval: Duration) -> Self {
        Self {
            id,
            interval,
            persisted: false,
        }
    }

    pub fn persisted(mut self, persisted: bool) -> Self {
        self.persisted = persisted;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobClockError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("job state file is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

/// Last-run times of persisted jobs. File-backed clocks re-read the file on
/// every access so the period carries across processes.
pub struct JobClock {
    path: Option<PathBuf>,
    runs: Mutex<BTreeMap<u32, i64>>,
}

impl JobClock {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            runs: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn open(path: &Path) -> Self {
        Self {
            path: Some(path.to_path_buf()),
            runs: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn last_run(&self, id: u32) -> Result<Option<i64>, JobClockError> {
        let runs = self.lock()?;
        Ok(runs.get(&id).copied())
    }

    pub fn record_run(&self, id: u32, at_millis: i64) -> Result<(), JobClockError> {
        let mut runs = self.lock()?;
        runs.insert(id, at_millis);
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&*runs)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<u32, i64>>, JobClockError> {
        let mut runs = self.runs.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(path) = &self.path {
            if path.exists() {
                let raw = fs::read_to_string(path)?;
                if !raw.trim().is_empty() {
                    *runs = serde_json::from_str(&raw)?;
                }
            }
        }
        Ok(runs)
    }

    /// Decides whether a persisted job is overdue. A job seen for the first
    /// time starts its period now.
    fn overdue(&self, job: &JobInfo, now_millis: i64) -> bool {
        let last = match self.last_run(job.id) {
            Ok(last) => last,
            Err(err) => {
                warn!(job_id = job.id, error = %err, "unable to read job state");
                return false;
            }
        };
        match last {
            Some(last) => {
                let interval = i64::try_from(job.interval.as_millis()).unwrap_or(i64::MAX);
                now_millis.saturating_sub(last) >= interval
            }
            None => {
                self.record(job.id, now_millis);
                false
            }
        }
    }

    /// Returns how long until the next firing of a persisted job that is not
    /// overdue.
    fn remaining(&self, job: &JobInfo, now_millis: i64) -> Duration {
        match self.last_run(job.id) {
            Ok(Some(last)) => {
                let elapsed = u64::try_from(now_millis.saturating_sub(last)).unwrap_or(0);
                job.interval.saturating_sub(Duration::from_millis(elapsed))
            }
            _ => job.interval,
        }
    }

    fn record(&self, id: u32, at_millis: i64) {
        if let Err(err) = self.record_run(id, at_millis) {
            warn!(job_id = id, error = %err, "unable to record job run");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleResult {
    Success,
    Failure,
}

/// Work run on each firing of a periodic job.
pub trait JobService: Send + Sync {
    fn run_job(&self);
}

pub trait JobScheduler {
    /// Registers `job`, replacing any job already registered under the same id.
    fn schedule(&self, job: JobInfo, service: Arc<dyn JobService>) -> ScheduleResult;
    fn cancel(&self, id: u32) -> bool;
}

struct RunningJob {
    info: JobInfo,
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl RunningJob {
    fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            warn!(job_id = self.info.id, "periodic job thread panicked");
        }
    }
}

/// Runs each periodic job on its own thread until cancelled or dropped.
pub struct ThreadJobScheduler {
    min_period: Duration,
    clock: Arc<JobClock>,
    jobs: Mutex<HashMap<u32, RunningJob>>,
}

impl Default for ThreadJobScheduler {
    fn default() -> Self {
        Self::with_min_period(MIN_PERIOD)
    }
}

impl ThreadJobScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_period(min_period: Duration) -> Self {
        Self {
            min_period,
            clock: Arc::new(JobClock::in_memory()),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Keeps last-run times of persisted jobs in `clock`.
    pub fn with_clock(mut self, clock: JobClock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn scheduled(&self) -> Vec<JobInfo> {
        let jobs = self.jobs.lock().unwrap_or_else(|p| p.into_inner());
        let mut infos: Vec<JobInfo> = jobs.values().map(|job| job.info.clone()).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }
}

impl JobScheduler for ThreadJobScheduler {
    fn schedule(&self, job: JobInfo, service: Arc<dyn JobService>) -> ScheduleResult {
        if job.interval < self.min_period {
            debug!(
                job_id = job.id,
                interval_ms = u64::try_from(job.interval.as_millis()).unwrap_or(u64::MAX),
                "rejecting job below minimum period"
            );
            return ScheduleResult::Failure;
        }

        self.cancel(job.id);

        let (stop, stop_rx) = mpsc::channel::<()>();
        let interval = job.interval;
        let now = now_millis();
        let (overdue, first_wait) = if job.persisted {
            let overdue = self.clock.overdue(&job, now);
            (overdue, self.clock.remaining(&job, now))
        } else {
            (false, interval)
        };
        let clock = job.persisted.then(|| Arc::clone(&self.clock));
        let job_id = job.id;
        let run = move || {
            service.run_job();
            if let Some(clock) = &clock {
                clock.record(job_id, now_millis());
            }
        };
        let spawned = thread::Builder::new()
            .name(format!("job-{}", job.id))
            .spawn(move || {
                if overdue {
                    debug!(job_id, "running overdue persisted job");
                    run();
                }
                let mut wait = if overdue { interval } else { first_wait };
                loop {
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => run(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    wait = interval;
                }
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                debug!(job_id = job.id, error = %err, "unable to spawn job thread");
                return ScheduleResult::Failure;
            }
        };

        debug!(job_id = job.id, persisted = job.persisted, "periodic job registered");
        let mut jobs = self.jobs.lock().unwrap_or_else(|p| p.into_inner());
        jobs.insert(
            job.id,
            RunningJob {
                info: job,
                stop,
                handle,
            },
        );
        ScheduleResult::Success
    }

    fn cancel(&self, id: u32) -> bool {
        let running = {
            let mut jobs = self.jobs.lock().unwrap_or_else(|p| p.into_inner());
            jobs.remove(&id)
        };
        match running {
            Some(job) => {
                job.stop();
                true
            }
            None => false,
        }
    }
}

impl Drop for ThreadJobScheduler {
    fn drop(&mut self) {
        let jobs: Vec<RunningJob> = match self.jobs.get_mut() {
            Ok(jobs) => jobs.drain().map(|(_, job)| job).collect(),
            Err(poisoned) => poisoned.into_inner().drain().map(|(_, job)| job).collect(),
        };
        for job in jobs {
            job.stop();
        }
    }
}

/// Purges completed tasks whose due date passed more than `stale_after` ago.
pub struct CleanupJobService {
    provider: Arc<TaskProvider>,
    stale_after: Duration,
}

impl CleanupJobService {
    pub fn new(provider: Arc<TaskProvider>, stale_after: Duration) -> Self {
        Self {
            provider,
            stale_after,
        }
    }

    pub fn stale_selection(&self, now_millis: i64) -> Selection {
        let stale_millis = i64::try_from(self.stale_after.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_millis.saturating_sub(stale_millis);
        Selection::new(
            format!("{COLUMN_IS_COMPLETE} = 1 AND {COLUMN_DUE_DATE} < ?"),
            vec![Value::Integer(cutoff)],
        )
    }

    pub fn purge_stale(&self, now_millis: i64) -> Result<usize, ProviderError> {
        let selection = self.stale_selection(now_millis);
        self.provider
            .delete(&self.provider.collection_uri(), Some(&selection))
    }
}

impl JobService for CleanupJobService {
    fn run_job(&self) {
        match self.purge_stale(now_millis()) {
            Ok(0) => debug!("cleanup job found nothing to purge"),
            Ok(count) => info!(count, "cleanup job purged completed tasks"),
            Err(err) => warn!(error = %err, "cleanup job failed"),
        }
    }
}

/// Registers the hourly cleanup job. A refusal is logged and otherwise ignored.
pub fn manage_cleanup_job(
    scheduler: &dyn JobScheduler,
    service: Arc<CleanupJobService>,
    interval: Duration,
) -> ScheduleResult {
    debug!("scheduling cleanup job");
    let job = JobInfo::periodic(CLEANUP_JOB_ID, interval).persisted(true);
    let result = scheduler.schedule(job, service);
    if result != ScheduleResult::Success {
        warn!("unable to schedule cleanup job");
    }
    result
}
