//! Cooperative lifecycle management for workers and short-lived tasks.

use std::sync::Arc;
use std::sync::Mutex;

use tokio::sync::watch;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

/// A `Stopper` coordinates the shutdown of an arbitrary set of workers.
///
/// Long-lived workers are spawned through [`run_worker`](Stopper::run_worker)
/// and watch [`should_stop`](Stopper::should_stop) for the stop signal.
/// Short-lived units of work are tracked with [`task`](Stopper::task); while
/// any task is outstanding, shutdown waits.
///
/// Stopping is two-phase: [`stop`](Stopper::stop) first moves the stopper
/// into a draining state in which new tasks are refused, and waits for
/// outstanding tasks to finish. Only then does it fire the stop signal, join
/// every worker, and finally run the attached closers.
#[derive(Clone)]
pub struct Stopper {
    inner: Arc<StopperInner>,
}

struct StopperInner {
    tasks: Mutex<TaskState>,
    drained: Notify,
    stop_tx: watch::Sender<bool>,
    // Kept so that `should_stop` receivers can be created after `stop`.
    stop_rx: watch::Receiver<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closers: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

#[derive(Default)]
struct TaskState {
    draining: bool,
    active: usize,
}

impl Default for Stopper {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopper {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            inner: Arc::new(StopperInner {
                tasks: Mutex::new(TaskState::default()),
                drained: Notify::new(),
                stop_tx,
                stop_rx,
                workers: Mutex::new(Vec::new()),
                closers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Spawn `future` as a worker. The worker must exit once
    /// [`should_stop`](Stopper::should_stop) fires; [`stop`](Stopper::stop)
    /// joins it.
    pub fn run_worker<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.inner.workers.lock().unwrap().push(handle);
    }

    /// A receiver that flips to `true` once the stop signal has fired.
    pub fn should_stop(&self) -> watch::Receiver<bool> {
        self.inner.stop_rx.clone()
    }

    /// Begin a tracked task. Returns `false` while draining, in which case
    /// the work must be refused.
    pub fn start_task(&self) -> bool {
        let mut tasks = self.inner.tasks.lock().unwrap();
        if tasks.draining {
            return false;
        }
        tasks.active += 1;
        true
    }

    /// End a tracked task started with [`start_task`](Stopper::start_task).
    pub fn finish_task(&self) {
        let mut tasks = self.inner.tasks.lock().unwrap();
        tasks.active -= 1;
        if tasks.active == 0 {
            self.inner.drained.notify_waiters();
        }
    }

    /// RAII form of [`start_task`](Stopper::start_task); the task finishes
    /// when the guard drops. `None` means the stopper is draining.
    pub fn task(&self) -> Option<TaskGuard> {
        if self.start_task() {
            Some(TaskGuard {
                stopper: self.clone(),
            })
        } else {
            None
        }
    }

    /// Attach an object to close after every worker has stopped.
    pub fn add_closer<F>(&self, closer: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.closers.lock().unwrap().push(Box::new(closer));
    }

    /// Stop everything: drain tasks, signal workers, join them, run closers.
    pub async fn stop(&self) {
        self.inner.tasks.lock().unwrap().draining = true;
        self.wait_drained().await;

        let _ = self.inner.stop_tx.send(true);

        let workers = std::mem::take(&mut *self.inner.workers.lock().unwrap());
        for worker in workers {
            let _ = worker.await;
        }

        let closers = std::mem::take(&mut *self.inner.closers.lock().unwrap());
        for closer in closers {
            closer();
        }

        debug!("stopper: stopped");
    }

    /// Drain outstanding tasks, then resume accepting. Meant for tests.
    pub async fn quiesce(&self) {
        self.inner.tasks.lock().unwrap().draining = true;
        self.wait_drained().await;
        self.inner.tasks.lock().unwrap().draining = false;
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.inner.drained.notified();
            if self.inner.tasks.lock().unwrap().active == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Keeps one tracked task open until dropped.
pub struct TaskGuard {
    stopper: Stopper,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.stopper.finish_task();
    }
}
