use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::debug;

use crate::db::{self, Selection};
use crate::domain::sort::SortOrder;
use crate::domain::task::{Task, TaskValues};
use crate::notify::{ChangeNotifier, Subscription};
use crate::resource::{Resource, UriRouter};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("unknown uri: {0}")]
    UnsupportedUri(String),
    #[error("illegal {operation} uri: {uri}")]
    IllegalUri {
        operation: &'static str,
        uri: String,
    },
    #[error("{0} requires at least one column value")]
    EmptyValues(&'static str),
    #[error("task description is required")]
    MissingDescription,
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("database connection lock poisoned")]
    Poisoned,
}

/// URI-addressed CRUD surface over the `tasks` table.
///
/// Owns the single connection and the notifier; share it behind an `Arc`.
pub struct TaskProvider {
    conn: Mutex<Connection>,
    router: UriRouter,
    notifier: ChangeNotifier,
    data_version: AtomicI64,
}

const UNKNOWN_DATA_VERSION: i64 = i64::MIN;

impl TaskProvider {
    pub fn new(conn: Connection, router: UriRouter) -> Self {
        let data_version = db::data_version(&conn).unwrap_or(UNKNOWN_DATA_VERSION);
        Self {
            conn: Mutex::new(conn),
            router,
            notifier: ChangeNotifier::new(),
            data_version: AtomicI64::new(data_version),
        }
    }

    pub fn router(&self) -> &UriRouter {
        &self.router
    }

    pub fn collection_uri(&self) -> String {
        self.router.collection_uri()
    }

    pub fn task_uri(&self, id: i64) -> String {
        self.router.task_uri(id)
    }

    pub fn register_observer(
        &self,
        uri: &str,
        notify_for_descendants: bool,
    ) -> Result<Subscription, ProviderError> {
        let resource = self
            .router
            .match_uri(uri)
            .ok_or_else(|| ProviderError::UnsupportedUri(uri.to_string()))?;
        Ok(self.notifier.register(resource, notify_for_descendants))
    }

    pub fn query(
        &self,
        uri: &str,
        selection: &Selection,
        sort: Option<SortOrder>,
    ) -> Result<Vec<Task>, ProviderError> {
        let selection = match self.router.match_uri(uri) {
            Some(Resource::Tasks) => selection.clone(),
            Some(Resource::Task(id)) => Selection::by_id(id),
            None => return Err(ProviderError::UnsupportedUri(uri.to_string())),
        };
        let order_by = sort.map(SortOrder::order_by);
        let conn = self.lock_conn()?;
        Ok(db::query_tasks(&conn, &selection, order_by.as_deref())?)
    }

    /// Inserts a row and returns the collection URI; callers re-query to see it.
    pub fn insert(&self, uri: &str, values: &TaskValues) -> Result<String, ProviderError> {
        self.insert_row(uri, values)?;
        Ok(self.router.collection_uri())
    }

    #[cfg(test)]
    pub fn insert_task(&self, task: &Task) -> Result<i64, ProviderError> {
        self.insert_row(&self.router.collection_uri(), &TaskValues::from_task(task))
    }

    fn insert_row(&self, uri: &str, values: &TaskValues) -> Result<i64, ProviderError> {
        match self.router.match_uri(uri) {
            Some(Resource::Tasks) => {}
            _ => return Err(ProviderError::UnsupportedUri(uri.to_string())),
        }
        if values.description.is_none() {
            return Err(ProviderError::MissingDescription);
        }

        let id = {
            let conn = self.lock_conn()?;
            db::insert_task(&conn, values)?
        };
        debug!(id, "inserted task");
        self.notifier.notify_change(Resource::Tasks);
        Ok(id)
    }

    /// Updates the single task named by `uri`. The id in the URI replaces any
    /// caller selection.
    pub fn update(
        &self,
        uri: &str,
        values: &TaskValues,
        _selection: Option<&Selection>,
    ) -> Result<usize, ProviderError> {
        let id = match self.router.match_uri(uri) {
            Some(Resource::Task(id)) => id,
            _ => {
                return Err(ProviderError::IllegalUri {
                    operation: "update",
                    uri: uri.to_string(),
                })
            }
        };
        if values.is_empty() {
            return Err(ProviderError::EmptyValues("update"));
        }

        let count = {
            let conn = self.lock_conn()?;
            db::update_tasks(&conn, values, &Selection::by_id(id))?
        };
        if count > 0 {
            self.notifier.notify_change(Resource::Task(id));
        }
        Ok(count)
    }

    /// Deletes from the collection (no selection removes every row) or the
    /// single task named by `uri`.
    pub fn delete(&self, uri: &str, selection: Option<&Selection>) -> Result<usize, ProviderError> {
        let (resource, selection) = match self.router.match_uri(uri) {
            Some(Resource::Tasks) => (
                Resource::Tasks,
                selection.cloned().unwrap_or_else(Selection::all),
            ),
            Some(Resource::Task(id)) => (Resource::Task(id), Selection::by_id(id)),
            None => {
                return Err(ProviderError::IllegalUri {
                    operation: "delete",
                    uri: uri.to_string(),
                })
            }
        };

        let count = {
            let conn = self.lock_conn()?;
            db::delete_tasks(&conn, &selection)?
        };
        if count > 0 {
            debug!(%resource, count, "deleted tasks");
            self.notifier.notify_change(resource);
        }
        Ok(count)
    }

    /// Notifies collection observers when another connection has committed
    /// since the previous check. Returns whether a notification went out.
    pub fn notify_external_changes(&self) -> Result<bool, ProviderError> {
        let version = {
            let conn = self.lock_conn()?;
            db::data_version(&conn)?
        };
        let previous = self.data_version.swap(version, Ordering::SeqCst);
        if previous == version || previous == UNKNOWN_DATA_VERSION {
            return Ok(false);
        }
        debug!(version, "tasks changed by another connection");
        self.notifier.notify_change(Resource::Tasks);
        Ok(true)
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, ProviderError> {
        self.conn.lock().map_err(|_| ProviderError::Poisoned)
    }
}

#[cfg(test)]
mod tests;
