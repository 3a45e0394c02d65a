//! Bounded dispatcher running evaluation units on dedicated worker threads.
//!
//! Each worker is an OS thread driving its own single-threaded tokio runtime,
//! so an async executor can await I/O without a shared runtime. Units flow
//! through a bounded `crossbeam_channel`; when every worker is busy and the
//! queue is full, `submit` blocks the caller instead of growing without bound.
//! Each unit holds a live session while it runs, so the bound is what caps
//! concurrent connections to the fleet.
//!
//! # Example
//!
//! ```rust,ignore
//! use fleet_autoscaler::config::DispatcherConfig;
//! use fleet_autoscaler::core::Dispatcher;
//!
//! let dispatcher = Dispatcher::new(DispatcherConfig::new().with_worker_count(4), executor)?;
//! let handles = payloads
//!     .into_iter()
//!     .map(|p| dispatcher.submit(p))
//!     .collect::<Result<Vec<_>, _>>()?;
//! let outcomes = Dispatcher::<_, _, _>::await_all(handles);
//! ```

use std::any::Any;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::DispatcherConfig;
use crate::util::clock::now_ms;

use super::error::DispatchError;
use super::executor::{TaskMetadata, WorkerExecutor};

/// How long `shutdown` waits for each worker before detaching it.
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Snapshot of dispatcher activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Units accepted by `submit`.
    pub submitted: u64,
    /// Units waiting for a worker.
    pub queued: u64,
    /// Units currently executing.
    pub active: u64,
    /// Units whose executor returned.
    pub completed: u64,
    /// Units whose executor panicked.
    pub panicked: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    queued: AtomicU64,
    active: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

impl Counters {
    fn snapshot(&self, worker_count: usize) -> DispatcherStats {
        DispatcherStats {
            worker_count,
            submitted: self.submitted.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

type Reply<R> = Sender<Result<R, DispatchError>>;

struct WorkerTask<P, R> {
    payload: P,
    meta: TaskMetadata,
    reply: Reply<R>,
}

/// Completion handle for one submitted unit.
#[derive(Debug)]
pub struct UnitHandle<R> {
    id: u64,
    rx: Receiver<Result<R, DispatchError>>,
}

impl<R> UnitHandle<R> {
    /// Dispatcher-assigned unit id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Block until the unit reaches a terminal state.
    ///
    /// # Errors
    ///
    /// - `DispatchError::Panicked` if the executor panicked
    /// - `DispatchError::Lost` if the unit was dropped unexecuted
    pub fn wait(self) -> Result<R, DispatchError> {
        self.rx.recv().unwrap_or(Err(DispatchError::Lost))
    }
}

/// Fixed-size pool of worker threads with a bounded submission queue.
pub struct Dispatcher<P, R, E>
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    config: DispatcherConfig,
    /// Dropped on shutdown so idle workers observe a closed channel.
    task_tx: Mutex<Option<Sender<WorkerTask<P, R>>>>,
    counters: Arc<Counters>,
    shutdown: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicU64,
    _executor: PhantomData<E>,
}

impl<P, R, E> Dispatcher<P, R, E>
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    /// Spawn `config.worker_count` workers sharing `executor`.
    ///
    /// # Errors
    ///
    /// - `DispatchError::InvalidConfig` if the configuration is invalid
    /// - `DispatchError::Spawn` if a worker thread or runtime cannot be created
    pub fn new(config: DispatcherConfig, executor: E) -> Result<Self, DispatchError> {
        config.validate().map_err(DispatchError::InvalidConfig)?;

        let (task_tx, task_rx) = bounded::<WorkerTask<P, R>>(config.max_queue_depth);
        let counters = Arc::new(Counters::default());

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            workers.push(spawn_worker(
                worker_id,
                task_rx.clone(),
                Arc::clone(&counters),
                executor.clone(),
                config.thread_stack_size,
            )?);
        }

        info!(
            worker_count = config.worker_count,
            max_queue_depth = config.max_queue_depth,
            "Dispatcher started"
        );

        Ok(Self {
            config,
            task_tx: Mutex::new(Some(task_tx)),
            counters,
            shutdown: AtomicBool::new(false),
            workers: Mutex::new(workers),
            next_id: AtomicU64::new(0),
            _executor: PhantomData,
        })
    }

    /// Submit a unit, blocking while every worker is busy and the queue is
    /// full.
    ///
    /// # Errors
    ///
    /// `DispatchError::Shutdown` if the dispatcher no longer accepts units.
    pub fn submit(&self, payload: P) -> Result<UnitHandle<R>, DispatchError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(DispatchError::Shutdown);
        }
        // Clone out of the lock so a blocked send never holds it.
        let Some(task_tx) = self.task_tx.lock().as_ref().cloned() else {
            return Err(DispatchError::Shutdown);
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = bounded(1);
        let task = WorkerTask {
            payload,
            meta: TaskMetadata {
                id,
                submitted_at_ms: now_ms(),
            },
            reply,
        };

        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        if task_tx.send(task).is_err() {
            self.counters.queued.fetch_sub(1, Ordering::Relaxed);
            return Err(DispatchError::Shutdown);
        }
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        debug!(unit_id = id, "Unit submitted");
        Ok(UnitHandle { id, rx })
    }

    /// Block until every handle is terminal, returning outcomes in handle
    /// order.
    pub fn await_all(handles: Vec<UnitHandle<R>>) -> Vec<Result<R, DispatchError>> {
        handles.into_iter().map(UnitHandle::wait).collect()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        self.counters.snapshot(self.config.worker_count)
    }

    /// Whether `shutdown` has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop accepting units, let workers drain the queue, and join them.
    ///
    /// A worker that does not exit within two seconds is detached; a hung
    /// unit cannot be interrupted.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down dispatcher");
        self.task_tx.lock().take();

        let mut workers = self.workers.lock();
        let worker_count = workers.len();
        for (idx, worker) in workers.drain(..).enumerate() {
            let (tx, rx) = bounded(1);
            // Detached on timeout; it exits when the worker does.
            let _joiner = thread::spawn(move || {
                let _ = tx.send(worker.join().is_ok());
            });
            match rx.recv_timeout(WORKER_JOIN_TIMEOUT) {
                Ok(true) => debug!(worker_id = idx, "Worker joined"),
                Ok(false) => warn!(worker_id = idx, "Worker thread panicked"),
                Err(_) => warn!(worker_id = idx, "Worker did not exit within timeout, detaching"),
            }
        }
        info!(worker_count, "Dispatcher shut down");
    }
}

impl<P, R, E> Drop for Dispatcher<P, R, E>
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    fn drop(&mut self) {
        // Signal only; joining here could hang on a stuck unit.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.task_tx.lock().take();
            debug!("Dispatcher dropped without explicit shutdown, workers detached");
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

fn spawn_worker<P, R, E>(
    worker_id: usize,
    task_rx: Receiver<WorkerTask<P, R>>,
    counters: Arc<Counters>,
    executor: E,
    stack_size: usize,
) -> Result<JoinHandle<()>, DispatchError>
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let handle = thread::Builder::new()
        .name(format!("autoscale-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id, "Worker thread started");
            // Closed channel means shutdown.
            while let Ok(task) = task_rx.recv() {
                let WorkerTask {
                    payload,
                    meta,
                    reply,
                } = task;
                counters.queued.fetch_sub(1, Ordering::Relaxed);
                counters.active.fetch_add(1, Ordering::Relaxed);

                let outcome = rt.block_on(
                    AssertUnwindSafe(executor.execute(payload, meta)).catch_unwind(),
                );
                let outcome = match outcome {
                    Ok(result) => {
                        counters.completed.fetch_add(1, Ordering::Relaxed);
                        Ok(result)
                    }
                    Err(panic) => {
                        counters.panicked.fetch_add(1, Ordering::Relaxed);
                        let message = panic_message(panic.as_ref());
                        error!(worker_id, unit_id = meta.id, panic = %message, "Unit panicked");
                        Err(DispatchError::Panicked(message))
                    }
                };
                counters.active.fetch_sub(1, Ordering::Relaxed);
                // The submitter may have dropped its handle.
                let _ = reply.send(outcome);
            }
            debug!(worker_id, "Worker thread exiting");
        })?;
    Ok(handle)
}
