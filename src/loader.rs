use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::db::Selection;
use crate::domain::sort::SortOrder;
use crate::domain::task::Task;
use crate::notify::Subscription;
use crate::provider::{ProviderError, TaskProvider};

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("query was cancelled")]
    Cancelled,
    #[error("query worker exited without a result")]
    WorkerLost,
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

type QueryResult = Result<Vec<Task>, ProviderError>;

/// Pending result of a query running on a worker thread.
pub struct QueryHandle {
    rx: Receiver<QueryResult>,
    cancelled: Arc<AtomicBool>,
}

impl QueryHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Blocks the calling thread until the rows arrive.
    pub fn wait(self) -> Result<Vec<Task>, LoaderError> {
        if self.is_cancelled() {
            return Err(LoaderError::Cancelled);
        }
        match self.rx.recv() {
            Ok(result) => Ok(result?),
            Err(_) => Err(self.lost()),
        }
    }

    /// Returns `None` while the query is still running.
    pub fn try_take(&self) -> Option<Result<Vec<Task>, LoaderError>> {
        if self.is_cancelled() {
            return Some(Err(LoaderError::Cancelled));
        }
        match self.rx.try_recv() {
            Ok(result) => Some(result.map_err(LoaderError::from)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(self.lost())),
        }
    }

    fn lost(&self) -> LoaderError {
        if self.is_cancelled() {
            LoaderError::Cancelled
        } else {
            LoaderError::WorkerLost
        }
    }
}

pub fn load(
    provider: Arc<TaskProvider>,
    uri: String,
    selection: Selection,
    sort: Option<SortOrder>,
) -> QueryHandle {
    let (tx, rx) = mpsc::channel();
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);

    thread::spawn(move || {
        if flag.load(Ordering::SeqCst) {
            return;
        }
        let result = provider.query(&uri, &selection, sort);
        if flag.load(Ordering::SeqCst) {
            debug!(uri = %uri, "discarding rows of cancelled query");
            return;
        }
        let _ = tx.send(result);
    });

    QueryHandle { rx, cancelled }
}

/// Keeps one observed query alive, restarting it when parameters change or
/// when the provider reports a change.
pub struct TaskLoader {
    provider: Arc<TaskProvider>,
    uri: String,
    sort: Option<SortOrder>,
    subscription: Subscription,
    current: Option<QueryHandle>,
}

impl TaskLoader {
    pub fn new(
        provider: Arc<TaskProvider>,
        uri: impl Into<String>,
        sort: Option<SortOrder>,
    ) -> Result<Self, ProviderError> {
        let uri = uri.into();
        let subscription = provider.register_observer(&uri, true)?;
        Ok(Self {
            provider,
            uri,
            sort,
            subscription,
            current: None,
        })
    }

    #[cfg(test)]
    pub fn sort(&self) -> Option<SortOrder> {
        self.sort
    }

    pub fn start(&mut self) {
        self.restart(self.sort);
    }

    pub fn restart(&mut self, sort: Option<SortOrder>) {
        if let Some(previous) = self.current.take() {
            previous.cancel();
        }
        self.sort = sort;
        self.subscription.drain();
        self.current = Some(load(
            Arc::clone(&self.provider),
            self.uri.clone(),
            Selection::all(),
            sort,
        ));
    }

    /// Restarts the query when change events are pending.
    pub fn reload_if_changed(&mut self) -> bool {
        if self.subscription.drain() == 0 {
            return false;
        }
        self.restart(self.sort);
        true
    }

    /// Takes the in-flight result if it has arrived, without blocking.
    pub fn poll(&mut self) -> Option<Result<Vec<Task>, LoaderError>> {
        let result = self.current.as_ref()?.try_take()?;
        self.current = None;
        Some(result)
    }

    /// Waits for the in-flight query, starting one if none is running.
    #[cfg(test)]
    pub fn wait(&mut self) -> Result<Vec<Task>, LoaderError> {
        if self.current.is_none() {
            self.start();
        }
        match self.current.take() {
            Some(handle) => handle.wait(),
            None => Err(LoaderError::WorkerLost),
        }
    }
}
