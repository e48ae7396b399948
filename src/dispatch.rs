use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::domain::task::TaskValues;
use crate::provider::TaskProvider;

enum Request {
    Update { uri: String, values: TaskValues },
    Delete { uri: String },
    Flush(Sender<()>),
}

/// Applies task writes on a single background worker, in submission order.
pub struct TaskUpdateService {
    tx: Option<Sender<Request>>,
    worker: Option<JoinHandle<()>>,
    provider: Arc<TaskProvider>,
}

impl TaskUpdateService {
    pub fn start(provider: Arc<TaskProvider>) -> Self {
        let (tx, rx) = mpsc::channel::<Request>();
        let worker_provider = Arc::clone(&provider);
        let worker = thread::Builder::new()
            .name("task-updates".to_string())
            .spawn(move || {
                for request in rx {
                    apply(&worker_provider, request);
                }
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(error = %err, "unable to start task update worker");
                None
            }
        };

        Self {
            tx: worker.as_ref().map(|_| tx),
            worker,
            provider,
        }
    }

    pub fn update_task(&self, uri: impl Into<String>, values: TaskValues) {
        self.submit(Request::Update {
            uri: uri.into(),
            values,
        });
    }

    pub fn toggle_complete(&self, id: i64, is_complete: bool) {
        let uri = self.provider.task_uri(id);
        self.update_task(uri, TaskValues::default().complete(is_complete));
    }

    pub fn delete_task(&self, uri: impl Into<String>) {
        self.submit(Request::Delete { uri: uri.into() });
    }

    /// Blocks until every request submitted before this call has been applied.
    pub fn flush(&self) {
        let (done_tx, done_rx) = mpsc::channel();
        if self.send(Request::Flush(done_tx)) {
            let _ = done_rx.recv();
        }
    }

    fn submit(&self, request: Request) {
        if !self.send(request) {
            warn!("task update worker is not running, dropping request");
        }
    }

    fn send(&self, request: Request) -> bool {
        match &self.tx {
            Some(tx) => tx.send(request).is_ok(),
            None => false,
        }
    }

    fn stop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("task update worker panicked");
            }
        }
    }
}

impl Drop for TaskUpdateService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn apply(provider: &TaskProvider, request: Request) {
    match request {
        Request::Update { uri, values } => match provider.update(&uri, &values, None) {
            Ok(count) => debug!(uri = %uri, count, "applied task update"),
            Err(err) => warn!(uri = %uri, error = %err, "task update failed"),
        },
        Request::Delete { uri } => match provider.delete(&uri, None) {
            Ok(count) => debug!(uri = %uri, count, "applied task delete"),
            Err(err) => warn!(uri = %uri, error = %err, "task delete failed"),
        },
        Request::Flush(done) => {
            let _ = done.send(());
        }
    }
}
