use rusqlite::Row;
use serde::Serialize;
use time::OffsetDateTime;

pub const COLUMN_ID: &str = "_id";
pub const COLUMN_DESCRIPTION: &str = "description";
pub const COLUMN_IS_COMPLETE: &str = "is_complete";
pub const COLUMN_IS_PRIORITY: &str = "is_priority";
pub const COLUMN_DUE_DATE: &str = "due_date";

/// One to-do item as stored in the `tasks` table.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Task {
    pub id: i64,
    pub description: String,
    pub is_complete: bool,
    pub is_priority: bool,
    pub due_date_millis: i64,
}

impl Task {
    /// Due date value meaning "no due date".
    pub const NO_DATE: i64 = i64::MAX;
    /// Identity of a task that has not been persisted yet.
    pub const NO_ID: i64 = -1;

    pub fn new(
        description: impl Into<String>,
        is_complete: bool,
        is_priority: bool,
        due_date_millis: i64,
    ) -> Self {
        Self {
            id: Self::NO_ID,
            description: description.into(),
            is_complete,
            is_priority,
            due_date_millis,
        }
    }

    pub fn without_due_date(
        description: impl Into<String>,
        is_complete: bool,
        is_priority: bool,
    ) -> Self {
        Self::new(description, is_complete, is_priority, Self::NO_DATE)
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let is_complete: i64 = row.get(COLUMN_IS_COMPLETE)?;
        let is_priority: i64 = row.get(COLUMN_IS_PRIORITY)?;
        Ok(Self {
            id: row.get(COLUMN_ID)?,
            description: row.get(COLUMN_DESCRIPTION)?,
            is_complete: is_complete == 1,
            is_priority: is_priority == 1,
            due_date_millis: row.get(COLUMN_DUE_DATE)?,
        })
    }

    pub fn has_due_date(&self) -> bool {
        self.due_date_millis != Self::NO_DATE
    }

    pub fn display_state(&self, now_millis: i64) -> DisplayState {
        if self.is_complete {
            DisplayState::Done
        } else if self.has_due_date() && self.due_date_millis < now_millis {
            DisplayState::Overdue
        } else {
            DisplayState::Normal
        }
    }
}

/// Partial column values for inserts and updates. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskValues {
    pub description: Option<String>,
    pub is_complete: Option<bool>,
    pub is_priority: Option<bool>,
    pub due_date_millis: Option<i64>,
}

impl TaskValues {
    pub fn from_task(task: &Task) -> Self {
        Self {
            description: Some(task.description.clone()),
            is_complete: Some(task.is_complete),
            is_priority: Some(task.is_priority),
            due_date_millis: Some(task.due_date_millis),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn complete(mut self, is_complete: bool) -> Self {
        self.is_complete = Some(is_complete);
        self
    }

    pub fn priority(mut self, is_priority: bool) -> Self {
        self.is_priority = Some(is_priority);
        self
    }

    pub fn due_date(mut self, due_date_millis: i64) -> Self {
        self.due_date_millis = Some(due_date_millis);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.is_complete.is_none()
            && self.is_priority.is_none()
            && self.due_date_millis.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    Done,
    Overdue,
    Normal,
}

impl DisplayState {
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayState::Done => "done",
            DisplayState::Overdue => "overdue",
            DisplayState::Normal => "normal",
        }
    }
}

pub const DATE_NOT_SET: &str = "Not set";

const MINUTE_MILLIS: i64 = 60 * 1000;
const HOUR_MILLIS: i64 = 60 * MINUTE_MILLIS;
const DAY_MILLIS: i64 = 24 * HOUR_MILLIS;
const WEEK_MILLIS: i64 = 7 * DAY_MILLIS;

/// Renders a due date relative to `now_millis`. The NO_DATE value is never
/// formatted as a date.
pub fn format_due_date(due_date_millis: i64, now_millis: i64) -> String {
    if due_date_millis == Task::NO_DATE {
        return DATE_NOT_SET.to_string();
    }

    let delta = due_date_millis.saturating_sub(now_millis);
    let magnitude = delta.saturating_abs();
    if magnitude < MINUTE_MILLIS {
        return "now".to_string();
    }
    if magnitude >= WEEK_MILLIS {
        return format_calendar_date(due_date_millis);
    }

    let span = if magnitude < HOUR_MILLIS {
        plural(magnitude / MINUTE_MILLIS, "minute")
    } else if magnitude < DAY_MILLIS {
        plural(magnitude / HOUR_MILLIS, "hour")
    } else {
        plural(magnitude / DAY_MILLIS, "day")
    };

    if delta > 0 {
        format!("in {span}")
    } else {
        format!("{span} ago")
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

fn format_calendar_date(millis: i64) -> String {
    let format = time::macros::format_description!("[year]-[month]-[day]");
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .ok()
        .and_then(|datetime| datetime.format(&format).ok())
        .unwrap_or_else(|| millis.to_string())
}

pub fn now_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(nanos).unwrap_or(i64::MAX - 1)
}
