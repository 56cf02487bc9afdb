//! PersistenceQueue - single-worker FIFO executor for filesystem mutations
//!
//! Every write issued on behalf of the UI goes through one queue instance and
//! runs on its dedicated worker thread, one task at a time, in submission
//! order. That total order is what keeps concurrent saves from clobbering
//! each other. The worker survives failing and panicking tasks.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// What a queued task does, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    SaveFile,
    ReadFile,
    SaveState,
    GetState,
    UpdateCoords,
    SaveAsset,
    SaveConfig,
    Custom,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SaveFile => "save-file",
            Self::ReadFile => "read-file",
            Self::SaveState => "save-state",
            Self::GetState => "get-state",
            Self::UpdateCoords => "update-coords",
            Self::SaveAsset => "save-asset",
            Self::SaveConfig => "save-config",
            Self::Custom => "custom",
        };
        f.write_str(name)
    }
}

type Completion<T> = Box<dyn FnOnce(&StoreResult<T>) + Send + 'static>;

/// A unit of work consumed exactly once by the worker
pub struct PersistTask {
    kind: TaskKind,
    target: String,
    run: Box<dyn FnOnce() + Send + 'static>,
}

impl fmt::Debug for PersistTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistTask")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl PersistTask {
    /// Build a task and the handle that will receive its result
    pub fn new<T, F>(kind: TaskKind, target: impl Into<String>, job: F) -> (Self, TaskHandle<T>)
    where
        T: Send + 'static,
        F: FnOnce() -> StoreResult<T> + Send + 'static,
    {
        Self::build(kind, target.into(), job, None)
    }

    /// Build a task whose `on_complete` hook runs on the worker right after the job
    ///
    /// The hook sees the result before the waiting caller does; it is where
    /// fire-and-forget saves report back to the UI.
    pub fn with_completion<T, F, C>(
        kind: TaskKind,
        target: impl Into<String>,
        job: F,
        on_complete: C,
    ) -> (Self, TaskHandle<T>)
    where
        T: Send + 'static,
        F: FnOnce() -> StoreResult<T> + Send + 'static,
        C: FnOnce(&StoreResult<T>) + Send + 'static,
    {
        Self::build(kind, target.into(), job, Some(Box::new(on_complete)))
    }

    fn build<T, F>(kind: TaskKind, target: String, job: F, on_complete: Option<Completion<T>>) -> (Self, TaskHandle<T>)
    where
        T: Send + 'static,
        F: FnOnce() -> StoreResult<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let log_target = target.clone();

        let run = move || {
            let result = match panic::catch_unwind(AssertUnwindSafe(job)) {
                Ok(result) => result,
                Err(payload) => Err(StoreError::TaskPanicked(panic_message(payload.as_ref()))),
            };

            if let Err(e) = &result {
                warn!(%kind, target = %log_target, error = %e, "Persist task failed");
            }

            if let Some(on_complete) = on_complete
                && let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| on_complete(&result)))
            {
                warn!(%kind, target = %log_target, panic = %panic_message(payload.as_ref()), "Completion hook panicked");
            }

            // Receiver gone means fire-and-forget or the caller timed out
            let _ = reply_tx.send(result);
        };

        let handle = TaskHandle {
            kind,
            target: target.clone(),
            rx: reply_rx,
        };
        let task = Self {
            kind,
            target,
            run: Box::new(run),
        };
        (task, handle)
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Receives the result of one queued task
#[derive(Debug)]
pub struct TaskHandle<T> {
    kind: TaskKind,
    target: String,
    rx: oneshot::Receiver<StoreResult<T>>,
}

impl<T> TaskHandle<T> {
    /// Wait for the task's result, giving up after `timeout`
    ///
    /// A timeout does not cancel the task; it still runs in its turn.
    pub async fn wait(self, timeout: Duration) -> StoreResult<T> {
        debug!(kind = %self.kind, target = %self.target, ?timeout, "TaskHandle::wait: called");
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(StoreError::WorkerGone),
            Err(_) => {
                warn!(kind = %self.kind, target = %self.target, ?timeout, "Gave up waiting on queued task");
                Err(StoreError::Timeout(timeout))
            }
        }
    }

    /// Stop caring about the result; the task still runs
    pub fn detach(self) {
        debug!(kind = %self.kind, target = %self.target, "TaskHandle::detach: called");
    }
}

/// Single-worker FIFO task executor
pub struct PersistenceQueue {
    tx: Option<mpsc::UnboundedSender<PersistTask>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl PersistenceQueue {
    /// Start the worker thread
    pub fn spawn() -> StoreResult<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = thread::Builder::new()
            .name("persist-worker".to_string())
            .spawn(move || worker_loop(rx))
            .map_err(|e| StoreError::io("persist-worker", e))?;

        info!("PersistenceQueue spawned");
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// Enqueue a prepared task
    ///
    /// If the worker is gone the task is dropped and its handle resolves to
    /// `StoreError::WorkerGone`.
    pub fn enqueue(&self, task: PersistTask) {
        debug!(kind = %task.kind, target = %task.target, "enqueue: called");
        let Some(tx) = &self.tx else {
            warn!(kind = %task.kind, "enqueue: queue is shut down, dropping task");
            return;
        };
        if let Err(mpsc::error::SendError(task)) = tx.send(task) {
            warn!(kind = %task.kind, target = %task.target, "enqueue: worker is gone, dropping task");
        }
    }

    /// Enqueue `job` and return a handle to its result (fire-and-forget if dropped)
    pub fn submit<T, F>(&self, kind: TaskKind, target: impl Into<String>, job: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> StoreResult<T> + Send + 'static,
    {
        let (task, handle) = PersistTask::new(kind, target, job);
        self.enqueue(task);
        handle
    }

    /// Enqueue `job` and wait up to `timeout` for its result
    pub async fn submit_and_wait<T, F>(
        &self,
        kind: TaskKind,
        target: impl Into<String>,
        job: F,
        timeout: Duration,
    ) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> StoreResult<T> + Send + 'static,
    {
        self.submit(kind, target, job).wait(timeout).await
    }

    /// Stop accepting tasks, drain what is queued, and join the worker
    pub fn shutdown(mut self) {
        debug!("shutdown: called");
        self.close_and_join();
    }

    fn close_and_join(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("persist-worker exited abnormally");
        }
    }
}

impl Drop for PersistenceQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit; do not block here
        self.tx.take();
        self.worker.take();
    }
}

fn worker_loop(mut rx: mpsc::UnboundedReceiver<PersistTask>) {
    debug!("persist-worker started");
    while let Some(task) = rx.blocking_recv() {
        debug!(kind = %task.kind, target = %task.target, "worker_loop: running task");
        (task.run)();
    }
    debug!("persist-worker stopped");
}
