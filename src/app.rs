use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rusqlite::types::Value;
use time::{Date, OffsetDateTime};
use tracing::info;

use crate::config::{AppConfig, ConfigError};
use crate::db::{self, SchemaError, SchemaOutcome, Selection};
use crate::dispatch::TaskUpdateService;
use crate::domain::sort::SortOrder;
use crate::domain::task::{now_millis, Task, TaskValues, COLUMN_DESCRIPTION, COLUMN_IS_COMPLETE};
use crate::jobs::{
    manage_cleanup_job, CleanupJobService, JobClock, ScheduleResult, ThreadJobScheduler,
};
use crate::loader::{self, LoaderError, TaskLoader};
use crate::provider::{ProviderError, TaskProvider};
use crate::reminders::{
    reminder_time_for_date, Alarm, AlarmScheduler, AlarmService, AlarmStore, ReminderError,
    ReminderReceiver, ReminderSink,
};
use crate::resource::UriRouter;

pub const REMINDERS_FILE: &str = "reminders.json";
pub const JOBS_FILE: &str = "jobs.json";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("load error: {0}")]
    Loader(#[from] LoaderError),
    #[error("reminder error: {0}")]
    Reminder(#[from] ReminderError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("task {0} not found")]
    NotFound(i64),
}

/// Everything the terminal front-end talks to, wired once per process.
pub struct App {
    provider: Arc<TaskProvider>,
    updates: TaskUpdateService,
    alarms: Arc<AlarmStore>,
    jobs: ThreadJobScheduler,
    cleanup: Arc<CleanupJobService>,
    config: AppConfig,
    config_path: PathBuf,
    schema: SchemaOutcome,
    cleanup_registration: ScheduleResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub reminders_fired: usize,
    pub list_loads: usize,
    pub ticks: usize,
}

impl App {
    pub fn open(db_path: &str, config_path: &Path) -> Result<Self, AppError> {
        ensure_parent_dir(db_path)?;
        let config = AppConfig::load(config_path)?;
        let (conn, schema) = db::open_connection(db_path)?;
        if schema == SchemaOutcome::Created {
            info!(db_path, "created task database");
        }

        let provider = Arc::new(TaskProvider::new(
            conn,
            UriRouter::new(config.authority.clone()),
        ));
        let alarms = Arc::new(AlarmStore::open(&reminders_path(db_path))?);
        let updates = TaskUpdateService::start(Arc::clone(&provider));

        let jobs = ThreadJobScheduler::new().with_clock(JobClock::open(&jobs_path(db_path)));
        let cleanup = Arc::new(CleanupJobService::new(
            Arc::clone(&provider),
            config.cleanup.stale_after(),
        ));
        let cleanup_registration =
            manage_cleanup_job(&jobs, Arc::clone(&cleanup), config.cleanup.interval());

        Ok(Self {
            provider,
            updates,
            alarms,
            jobs,
            cleanup,
            config,
            config_path: config_path.to_path_buf(),
            schema,
            cleanup_registration,
        })
    }

    pub fn provider(&self) -> &Arc<TaskProvider> {
        &self.provider
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn schema_outcome(&self) -> SchemaOutcome {
        self.schema
    }

    pub fn cleanup_registered(&self) -> bool {
        self.cleanup_registration == ScheduleResult::Success
    }

    pub fn add_task(
        &self,
        description: &str,
        is_priority: bool,
        due_date_millis: Option<i64>,
    ) -> Result<Task, AppError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(AppError::InvalidArgument(
                "task description cannot be empty".to_string(),
            ));
        }
        let task = match due_date_millis {
            Some(due) => Task::new(description, false, is_priority, due),
            None => Task::without_due_date(description, false, is_priority),
        };
        let collection = self.provider.collection_uri();
        self.provider
            .insert(&collection, &TaskValues::from_task(&task))?;

        // Insert only reports the collection; the newest row with this
        // description is the one just written.
        let selection = Selection::new(
            format!("{COLUMN_DESCRIPTION} = ?"),
            vec![Value::Text(description.to_string())],
        );
        self.provider
            .query(&collection, &selection, None)?
            .into_iter()
            .max_by_key(|row| row.id)
            .ok_or(AppError::NotFound(Task::NO_ID))
    }

    /// Loads the task list on a worker thread, ordered by `sort` or the stored
    /// preference.
    pub fn list_tasks(&self, sort: Option<SortOrder>) -> Result<Vec<Task>, AppError> {
        let sort = sort.unwrap_or(self.config.sort_order);
        let handle = loader::load(
            Arc::clone(&self.provider),
            self.provider.collection_uri(),
            Selection::all(),
            Some(sort),
        );
        Ok(handle.wait()?)
    }

    pub fn show_task(&self, id: i64) -> Result<Option<Task>, AppError> {
        let rows = self
            .provider
            .query(&self.provider.task_uri(id), &Selection::all(), None)?;
        Ok(rows.into_iter().next())
    }

    pub fn set_complete(&self, id: i64, is_complete: bool) -> Result<Task, AppError> {
        self.require_task(id)?;
        self.updates.toggle_complete(id, is_complete);
        self.updates.flush();
        self.show_task(id)?.ok_or(AppError::NotFound(id))
    }

    pub fn delete_task(&self, id: i64) -> Result<Task, AppError> {
        let task = self.require_task(id)?;
        self.updates.delete_task(self.provider.task_uri(id));
        self.updates.flush();
        self.alarms.cancel(id)?;
        Ok(task)
    }

    pub fn clear(&self, completed_only: bool) -> Result<usize, AppError> {
        let selection = completed_only
            .then(|| Selection::new(format!("{COLUMN_IS_COMPLETE} = ?"), vec![Value::Integer(1)]));
        Ok(self
            .provider
            .delete(&self.provider.collection_uri(), selection.as_ref())?)
    }

    pub fn remind(&self, id: i64, date: Date, now: OffsetDateTime) -> Result<Alarm, AppError> {
        self.require_task(id)?;
        let trigger_at = reminder_time_for_date(date, now)?;
        let scheduler = AlarmScheduler::new(self.provider.router().clone(), self.alarm_service());
        Ok(scheduler.schedule_alarm(trigger_at, &self.provider.task_uri(id))?)
    }

    pub fn pending_reminders(&self) -> Result<Vec<Alarm>, AppError> {
        Ok(self.alarms.pending()?)
    }

    pub fn run_cleanup(&self, now_millis: i64) -> Result<usize, AppError> {
        Ok(self.cleanup.purge_stale(now_millis)?)
    }

    /// Fires reminders as they come due until `duration` elapses, or forever.
    /// `on_tasks` receives the task list at start and after every change.
    pub fn run(
        &self,
        duration: Option<Duration>,
        tick: Duration,
        sink: &dyn ReminderSink,
        on_tasks: &mut dyn FnMut(&[Task]),
    ) -> Result<RunSummary, AppError> {
        let receiver = ReminderReceiver::new(Arc::clone(&self.provider), self.alarm_service());
        let mut tasks = TaskLoader::new(
            Arc::clone(&self.provider),
            self.provider.collection_uri(),
            Some(self.config.sort_order),
        )?;
        tasks.start();
        let deadline = duration.map(|d| Instant::now() + d);
        info!(
            jobs = self.jobs.scheduled().len(),
            "running reminder and cleanup loop"
        );

        let mut summary = RunSummary {
            reminders_fired: 0,
            list_loads: 0,
            ticks: 0,
        };
        loop {
            summary.reminders_fired += receiver.fire_due(now_millis(), sink)?;
            self.provider.notify_external_changes()?;
            tasks.reload_if_changed();
            if let Some(rows) = tasks.poll() {
                on_tasks(&rows?);
                summary.list_loads += 1;
            }
            summary.ticks += 1;
            match deadline {
                Some(deadline) if Instant::now() >= deadline => break,
                Some(deadline) => {
                    thread::sleep(tick.min(deadline.saturating_duration_since(Instant::now())))
                }
                None => thread::sleep(tick),
            }
        }
        Ok(summary)
    }

    pub fn set_sort_order(&mut self, sort_order: SortOrder) -> Result<(), AppError> {
        self.config.sort_order = sort_order;
        self.config.save(&self.config_path)?;
        Ok(())
    }

    fn require_task(&self, id: i64) -> Result<Task, AppError> {
        self.show_task(id)?.ok_or(AppError::NotFound(id))
    }

    fn alarm_service(&self) -> Arc<dyn AlarmService> {
        self.alarms.clone()
    }
}

pub fn reminders_path(db_path: &str) -> PathBuf {
    sibling_path(db_path, REMINDERS_FILE)
}

pub fn jobs_path(db_path: &str) -> PathBuf {
    sibling_path(db_path, JOBS_FILE)
}

fn sibling_path(db_path: &str, name: &str) -> PathBuf {
    Path::new(db_path)
        .parent()
        .map(|parent| parent.join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}

fn ensure_parent_dir(path: &str) -> Result<(), AppError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
