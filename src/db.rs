use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, DatabaseName};
use tracing::{debug, info};

use crate::domain::task::{
    Task, TaskValues, COLUMN_DESCRIPTION, COLUMN_DUE_DATE, COLUMN_ID, COLUMN_IS_COMPLETE,
    COLUMN_IS_PRIORITY,
};

pub const DATABASE_VERSION: i64 = 1;
pub const TABLE_TASKS: &str = "tasks";
pub const DEMO_TASK_DESCRIPTION: &str = "Check out TaskMaker: tap a task to see its details";

const SQL_CREATE_TABLE_TASKS: &str = r#"
CREATE TABLE tasks (
    _id INTEGER PRIMARY KEY AUTOINCREMENT,
    description TEXT,
    is_complete INTEGER,
    is_priority INTEGER,
    due_date INTEGER
)
"#;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("cannot downgrade database from version {found} to {supported}")]
    Downgrade { found: i64, supported: i64 },
}

/// What schema management did while opening the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOutcome {
    Created,
    Upgraded { from: i64 },
    Opened,
}

pub fn open_connection(path: &str) -> Result<(Connection, SchemaOutcome), SchemaError> {
    open_versioned(path, DATABASE_VERSION)
}

pub fn open_versioned(
    path: &str,
    version: i64,
) -> Result<(Connection, SchemaOutcome), SchemaError> {
    let mut conn = Connection::open(path)?;
    configure_for_speed(&conn)?;
    let outcome = manage_schema(&mut conn, version)?;
    debug!(path, version, ?outcome, "opened task database");
    Ok((conn, outcome))
}

fn configure_for_speed(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None::<DatabaseName>, "journal_mode", "WAL")?;
    conn.pragma_update(None::<DatabaseName>, "synchronous", "NORMAL")?;
    conn.pragma_update(None::<DatabaseName>, "temp_store", "MEMORY")?;
    conn.pragma_update(None::<DatabaseName>, "busy_timeout", 5000i64)?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

fn manage_schema(conn: &mut Connection, version: i64) -> Result<SchemaOutcome, SchemaError> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current == version {
        return Ok(SchemaOutcome::Opened);
    }
    if current > version {
        return Err(SchemaError::Downgrade {
            found: current,
            supported: version,
        });
    }

    let tx = conn.transaction()?;
    let outcome = if current == 0 {
        create_schema(&tx)?;
        SchemaOutcome::Created
    } else {
        info!(from = current, to = version, "upgrading task database, existing tasks are dropped");
        tx.execute_batch("DROP TABLE IF EXISTS tasks")?;
        create_schema(&tx)?;
        SchemaOutcome::Upgraded { from: current }
    };
    tx.pragma_update(None::<DatabaseName>, "user_version", version)?;
    tx.commit()?;
    Ok(outcome)
}

fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SQL_CREATE_TABLE_TASKS)?;
    load_demo_task(conn)
}

fn load_demo_task(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO tasks (description, is_complete, is_priority, due_date) VALUES (?1, 0, 1, ?2)",
        params![DEMO_TASK_DESCRIPTION, Task::NO_DATE],
    )?;
    Ok(())
}

/// A caller-supplied `WHERE` clause with positional arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub clause: Option<String>,
    pub args: Vec<Value>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(clause: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            clause: Some(clause.into()),
            args,
        }
    }

    pub fn by_id(id: i64) -> Self {
        Self::new(format!("{COLUMN_ID} = ?"), vec![Value::Integer(id)])
    }

    fn where_sql(&self) -> String {
        match self.clause.as_deref() {
            Some(clause) if !clause.trim().is_empty() => format!(" WHERE {clause}"),
            _ => String::new(),
        }
    }
}

pub fn query_tasks(
    conn: &Connection,
    selection: &Selection,
    order_by: Option<&str>,
) -> rusqlite::Result<Vec<Task>> {
    let mut sql = format!(
        "SELECT {COLUMN_ID}, {COLUMN_DESCRIPTION}, {COLUMN_IS_COMPLETE}, {COLUMN_IS_PRIORITY}, \
         {COLUMN_DUE_DATE} FROM {TABLE_TASKS}{}",
        selection.where_sql()
    );
    if let Some(order) = order_by {
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(selection.args.iter()))?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(Task::from_row(row)?);
    }
    Ok(result)
}

/// Counter that moves when another connection commits to the database file.
pub fn data_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("PRAGMA data_version", [], |row| row.get(0))
}

pub fn insert_task(conn: &Connection, values: &TaskValues) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO tasks (description, is_complete, is_priority, due_date) \
         VALUES (?1, ?2, ?3, ?4)",
        params![
            values.description,
            values.is_complete.unwrap_or(false),
            values.is_priority.unwrap_or(false),
            values.due_date_millis.unwrap_or(Task::NO_DATE),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_tasks(
    conn: &Connection,
    values: &TaskValues,
    selection: &Selection,
) -> rusqlite::Result<usize> {
    let mut assignments = Vec::new();
    let mut args = Vec::new();
    if let Some(description) = &values.description {
        assignments.push(format!("{COLUMN_DESCRIPTION} = ?"));
        args.push(Value::Text(description.clone()));
    }
    if let Some(is_complete) = values.is_complete {
        assignments.push(format!("{COLUMN_IS_COMPLETE} = ?"));
        args.push(Value::Integer(i64::from(is_complete)));
    }
    if let Some(is_priority) = values.is_priority {
        assignments.push(format!("{COLUMN_IS_PRIORITY} = ?"));
        args.push(Value::Integer(i64::from(is_priority)));
    }
    if let Some(due_date) = values.due_date_millis {
        assignments.push(format!("{COLUMN_DUE_DATE} = ?"));
        args.push(Value::Integer(due_date));
    }
    args.extend(selection.args.iter().cloned());

    let sql = format!(
        "UPDATE {TABLE_TASKS} SET {}{}",
        assignments.join(", "),
        selection.where_sql()
    );
    conn.execute(&sql, params_from_iter(args.iter()))
}

pub fn delete_tasks(conn: &Connection, selection: &Selection) -> rusqlite::Result<usize> {
    let sql = format!("DELETE FROM {TABLE_TASKS}{}", selection.where_sql());
    conn.execute(&sql, params_from_iter(selection.args.iter()))
}
