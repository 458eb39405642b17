use std::{
    any::Any,
    cmp::Reverse,
    collections::BinaryHeap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{FATIGUE_RANGE, Job, Worker, WorkerReport, WorkerStats};
use crate::error::{EngineError, Result};

/// A fallible unit of work submitted to the pool.
pub type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// The amount of tasks currently running, or the crash that stopped the pool.
///
/// Once `Crashed`, the pool can never report a completed batch again.
#[derive(Debug)]
enum InFlight {
    Running(usize),
    Crashed(String),
}

struct PoolState {
    idle: BinaryHeap<Reverse<Arc<Worker>>>,
    in_flight: InFlight,
    shut_down: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    worker_freed: Condvar,
    task_done: Condvar,
}

impl Shared {
    /// Returns `worker` to the idle queue, or trips the crash state if its task failed.
    fn finish(&self, worker: Arc<Worker>, outcome: std::result::Result<(), String>) {
        let mut state = self.state.lock();

        match outcome {
            Ok(()) => {
                debug!(worker_id = worker.id(); "task finished");
                state.idle.push(Reverse(worker));
                self.worker_freed.notify_one();
            }
            Err(cause) => {
                error!(worker_id = worker.id(); "task failed, the pool is no longer usable: {cause}");

                if let InFlight::Running(_) = state.in_flight {
                    state.in_flight = InFlight::Crashed(cause);
                }

                self.worker_freed.notify_all();
            }
        }

        if let InFlight::Running(n) = &mut state.in_flight {
            *n = n.saturating_sub(1);
        }

        self.task_done.notify_all();
    }
}

/// A fixed-size pool of tired workers.
///
/// Every submitted task goes to the least tired idle worker. A task that fails, either
/// by returning an error or by panicking, crashes the whole pool: the in-flight batch and
/// every later submission fail with `PoolCrashed`, and the worker that ran it never
/// returns to the idle queue.
pub struct TiredExecutor {
    workers: Box<[Arc<Worker>]>,
    shared: Arc<Shared>,
}

impl TiredExecutor {
    /// Creates a new `TiredExecutor` with fatigue multipliers drawn from the OS rng.
    ///
    /// # Arguments
    /// * `nthreads` - The amount of workers, must be positive.
    ///
    /// # Returns
    /// The running pool, or an `InvalidArgument` error for a zero worker count.
    pub fn new(nthreads: usize) -> Result<Self> {
        Self::with_rng(nthreads, &mut StdRng::from_os_rng())
    }

    /// Creates a new `TiredExecutor` with fatigue multipliers drawn from `rng`.
    ///
    /// # Arguments
    /// * `nthreads` - The amount of workers, must be positive.
    /// * `rng` - The random number generator used to seed every worker's fatigue.
    ///
    /// # Returns
    /// The running pool, or an `InvalidArgument` error for a zero worker count.
    pub fn with_rng<R: Rng>(nthreads: usize, rng: &mut R) -> Result<Self> {
        if nthreads == 0 {
            return Err(EngineError::invalid("the amount of workers must be positive"));
        }

        let workers = (0..nthreads)
            .map(|id| Worker::new(id, rng.random_range(FATIGUE_RANGE)).map(Arc::new))
            .collect::<Result<Box<[_]>>>()?;

        for (i, worker) in workers.iter().enumerate() {
            if let Err(e) = worker.start() {
                workers[..i].iter().for_each(|w| w.shutdown());
                workers[..i].iter().for_each(|w| w.join());
                return Err(e);
            }
        }

        let idle = workers.iter().cloned().map(Reverse).collect();
        info!(workers = nthreads; "worker pool started");

        Ok(Self {
            workers,
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState {
                    idle,
                    in_flight: InFlight::Running(0),
                    shut_down: false,
                }),
                worker_freed: Condvar::new(),
                task_done: Condvar::new(),
            }),
        })
    }

    /// Hands `task` to the least tired idle worker, blocking until one is available.
    ///
    /// # Returns
    /// A `PoolCrashed` error if a task has already failed, or an `InvalidState` error if
    /// the pool was shut down.
    pub fn submit(&self, task: Task) -> Result<()> {
        let worker = {
            let mut state = self.shared.state.lock();

            let worker = loop {
                if let InFlight::Crashed(cause) = &state.in_flight {
                    return Err(EngineError::PoolCrashed(cause.clone()));
                }

                if state.shut_down {
                    return Err(EngineError::InvalidState(
                        "the worker pool has been shut down".into(),
                    ));
                }

                if let Some(Reverse(worker)) = state.idle.pop() {
                    break worker;
                }

                self.shared.worker_freed.wait(&mut state);
            };

            if let InFlight::Running(n) = &mut state.in_flight {
                *n += 1;
            }

            worker
        };

        debug!(worker_id = worker.id(); "handing task to worker");
        let job = self.wrap(Arc::clone(&worker), task);

        if let Err(e) = worker.new_task(job) {
            let mut state = self.shared.state.lock();

            if let InFlight::Running(n) = &mut state.in_flight {
                *n = n.saturating_sub(1);
            }

            state.idle.push(Reverse(worker));
            self.shared.worker_freed.notify_one();
            self.shared.task_done.notify_all();
            return Err(e);
        }

        Ok(())
    }

    /// Submits every task and blocks until all of them are done.
    ///
    /// # Returns
    /// A `PoolCrashed` error as soon as any task of the pool is seen failing, without
    /// waiting for the rest of the batch.
    pub fn submit_all<I>(&self, tasks: I) -> Result<()>
    where
        I: IntoIterator<Item = Task>,
    {
        for task in tasks {
            self.submit(task)?;
        }

        let mut state = self.shared.state.lock();

        loop {
            match &state.in_flight {
                InFlight::Crashed(cause) => return Err(EngineError::PoolCrashed(cause.clone())),
                InFlight::Running(0) => return Ok(()),
                InFlight::Running(_) => {}
            }

            self.shared.task_done.wait(&mut state);
        }
    }

    /// Terminates every worker and waits for them to exit, in worker order.
    ///
    /// Running tasks are allowed to finish. Calling it more than once is a no-op.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();

            if state.shut_down {
                return;
            }

            state.shut_down = true;
            self.shared.worker_freed.notify_all();
        }

        self.workers.iter().for_each(|w| w.shutdown());
        self.workers.iter().for_each(|w| w.join());

        if self.workers.iter().any(|w| w.is_alive()) {
            warn!("some workers are still alive after shutdown");
        }

        info!(workers = self.workers.len(); "worker pool shut down");
    }

    /// Collects the statistics of every worker.
    pub fn worker_report(&self) -> WorkerReport {
        WorkerReport::new(self.workers.iter().map(|w| WorkerStats::from(&**w)).collect())
    }

    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    /// The amount of tasks running right now, `None` once the pool crashed.
    pub fn in_flight(&self) -> Option<usize> {
        match self.shared.state.lock().in_flight {
            InFlight::Running(n) => Some(n),
            InFlight::Crashed(_) => None,
        }
    }

    pub fn idle_count(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    pub fn is_crashed(&self) -> bool {
        self.in_flight().is_none()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shut_down
    }

    /// Wraps `task` so the worker's accounting, the idle queue and the in-flight count
    /// are always updated once it's done.
    fn wrap(&self, worker: Arc<Worker>, task: Task) -> Job {
        let shared = Arc::clone(&self.shared);

        Box::new(move || {
            let started = worker.begin_task();

            let outcome = match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(payload) => Err(panic_message(payload)),
            };

            if outcome.is_ok() {
                worker.record_busy(started);
            }

            shared.finish(worker, outcome);
        })
    }
}

impl fmt::Debug for TiredExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();

        f.debug_struct("TiredExecutor")
            .field("workers", &self.workers)
            .field("idle", &state.idle.len())
            .field("in_flight", &state.in_flight)
            .field("shut_down", &state.shut_down)
            .finish()
    }
}

impl Drop for TiredExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(msg) => format!("task panicked: {msg}"),
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(msg) => format!("task panicked: {msg}"),
            Err(_) => "task panicked".to_string(),
        },
    }
}
