use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::db::Selection;
use crate::domain::task::Task;
use crate::provider::{ProviderError, TaskProvider};
use crate::resource::{Resource, UriRouter};

#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    #[error("reminder date {date} is in the past")]
    InPast { date: Date },
    #[error("reminders can only target a single task, got {0}")]
    NotATask(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("reminder store is corrupt: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("reminder store lock poisoned")]
    Poisoned,
}

/// One pending wake-up for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub task_id: i64,
    pub task_uri: String,
    pub trigger_at_millis: i64,
}

/// One-shot timer facility. At most one alarm is kept per task.
pub trait AlarmService: Send + Sync {
    /// Registers `alarm`, replacing any alarm already set for the same task.
    fn set_exact(&self, alarm: Alarm) -> Result<(), ReminderError>;
    fn cancel(&self, task_id: i64) -> Result<bool, ReminderError>;
    fn pending(&self) -> Result<Vec<Alarm>, ReminderError>;
    /// Removes and returns every alarm due at or before `now_millis`.
    fn take_due(&self, now_millis: i64) -> Result<Vec<Alarm>, ReminderError>;
}

/// Alarm registry persisted as JSON so alarms survive restarts.
pub struct AlarmStore {
    path: Option<PathBuf>,
    alarms: Mutex<BTreeMap<i64, Alarm>>,
}

impl AlarmStore {
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            alarms: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn open(path: &Path) -> Result<Self, ReminderError> {
        Ok(Self {
            alarms: Mutex::new(read_alarms(path)?),
            path: Some(path.to_path_buf()),
        })
    }

    /// Locks the registry after re-reading the file, so alarms written by
    /// other processes are seen and kept.
    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<i64, Alarm>>, ReminderError> {
        let mut alarms = self.alarms.lock().map_err(|_| ReminderError::Poisoned)?;
        if let Some(path) = &self.path {
            *alarms = read_alarms(path)?;
        }
        Ok(alarms)
    }

    fn persist(&self, alarms: &BTreeMap<i64, Alarm>) -> Result<(), ReminderError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let list: Vec<&Alarm> = alarms.values().collect();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&list)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl AlarmService for AlarmStore {
    fn set_exact(&self, alarm: Alarm) -> Result<(), ReminderError> {
        let mut alarms = self.lock()?;
        if let Some(previous) = alarms.insert(alarm.task_id, alarm) {
            debug!(
                task_id = previous.task_id,
                replaced_at = previous.trigger_at_millis,
                "replacing pending reminder"
            );
        }
        self.persist(&alarms)
    }

    fn cancel(&self, task_id: i64) -> Result<bool, ReminderError> {
        let mut alarms = self.lock()?;
        let removed = alarms.remove(&task_id).is_some();
        if removed {
            self.persist(&alarms)?;
        }
        Ok(removed)
    }

    fn pending(&self) -> Result<Vec<Alarm>, ReminderError> {
        let alarms = self.lock()?;
        let mut list: Vec<Alarm> = alarms.values().cloned().collect();
        list.sort_by_key(|a| (a.trigger_at_millis, a.task_id));
        Ok(list)
    }

    fn take_due(&self, now_millis: i64) -> Result<Vec<Alarm>, ReminderError> {
        let mut alarms = self.lock()?;
        let due_ids: Vec<i64> = alarms
            .values()
            .filter(|a| a.trigger_at_millis <= now_millis)
            .map(|a| a.task_id)
            .collect();
        if due_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut due: Vec<Alarm> = due_ids
            .iter()
            .filter_map(|id| alarms.remove(id))
            .collect();
        self.persist(&alarms)?;
        due.sort_by_key(|a| (a.trigger_at_millis, a.task_id));
        Ok(due)
    }
}

fn read_alarms(path: &Path) -> Result<BTreeMap<i64, Alarm>, ReminderError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let list: Vec<Alarm> = serde_json::from_str(&raw)?;
    Ok(list.into_iter().map(|a| (a.task_id, a)).collect())
}

/// Turns a picked day into the reminder instant: noon UTC on that day. Days
/// before today are rejected.
pub fn reminder_time_for_date(date: Date, now: OffsetDateTime) -> Result<i64, ReminderError> {
    let chosen = noon_utc(date);
    let today = noon_utc(now.date());
    if chosen < today {
        return Err(ReminderError::InPast { date });
    }
    Ok(chosen.unix_timestamp() * 1000)
}

fn noon_utc(date: Date) -> OffsetDateTime {
    (date.midnight() + time::Duration::hours(12)).assume_utc()
}

pub struct AlarmScheduler {
    router: UriRouter,
    alarms: Arc<dyn AlarmService>,
}

impl AlarmScheduler {
    pub fn new(router: UriRouter, alarms: Arc<dyn AlarmService>) -> Self {
        Self { router, alarms }
    }

    /// Registers the single wake-up for the task at `task_uri`. Callers only
    /// pass future instants.
    pub fn schedule_alarm(
        &self,
        trigger_at_millis: i64,
        task_uri: &str,
    ) -> Result<Alarm, ReminderError> {
        let task_id = match self.router.match_uri(task_uri) {
            Some(Resource::Task(id)) => id,
            _ => return Err(ReminderError::NotATask(task_uri.to_string())),
        };
        let alarm = Alarm {
            task_id,
            task_uri: task_uri.to_string(),
            trigger_at_millis,
        };
        self.alarms.set_exact(alarm.clone())?;
        info!(task_id, trigger_at_millis, "reminder scheduled");
        Ok(alarm)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub task: Task,
    pub alarm: Alarm,
}

/// Surfaces a fired reminder to the user.
pub trait ReminderSink {
    fn notify(&self, reminder: &Reminder);
}

pub struct ReminderReceiver {
    provider: Arc<TaskProvider>,
    alarms: Arc<dyn AlarmService>,
}

impl ReminderReceiver {
    pub fn new(provider: Arc<TaskProvider>, alarms: Arc<dyn AlarmService>) -> Self {
        Self { provider, alarms }
    }

    /// Fires every due alarm whose task still exists and returns how many fired.
    pub fn fire_due(
        &self,
        now_millis: i64,
        sink: &dyn ReminderSink,
    ) -> Result<usize, ReminderError> {
        let mut fired = 0;
        for alarm in self.alarms.take_due(now_millis)? {
            let uri = self.provider.task_uri(alarm.task_id);
            match self.provider.query(&uri, &Selection::all(), None) {
                Ok(rows) => match rows.into_iter().next() {
                    Some(task) => {
                        sink.notify(&Reminder { task, alarm });
                        fired += 1;
                    }
                    None => debug!(task_id = alarm.task_id, "task for reminder no longer exists"),
                },
                Err(err) => warn!(
                    task_id = alarm.task_id,
                    error = %err,
                    "unable to load task for reminder"
                ),
            }
        }
        Ok(fired)
    }
}
