use std::{
    cmp::Ordering,
    fmt,
    sync::{
        Arc,
        atomic::{self, AtomicBool, AtomicU64},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, error};
use parking_lot::{Condvar, Mutex};

use crate::error::{EngineError, Result};

/// A unit of work as seen by a single worker thread.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// The valid range for fatigue multipliers.
pub const FATIGUE_RANGE: std::ops::Range<f64> = 0.5..1.5;

/// The one-slot handoff between a submitter and the worker thread.
#[derive(Default)]
struct Slot {
    job: Option<Job>,
    terminated: bool,
}

/// A long-lived worker thread that accumulates "tiredness" as it works.
///
/// Workers are totally ordered by their weighted busy time (`fatigue × time used`), the
/// less tired a worker is, the sooner it's picked up for new work. Two workers that
/// never worked compare equal regardless of their fatigue.
///
/// A task that never records its busy time leaves the worker busy, with no open idle span.
pub struct Worker {
    id: usize,
    fatigue: f64,
    slot: Mutex<Slot>,
    signal: Condvar,
    busy: AtomicBool,
    time_used: AtomicU64,
    time_idle: AtomicU64,
    idle_since: Mutex<Option<Instant>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("fatigue", &self.fatigue)
            .field("time_used", &self.time_used())
            .field("busy", &self.is_busy())
            .finish()
    }
}

impl Worker {
    /// Creates a new `Worker`, it doesn't run until `start` is called.
    ///
    /// # Arguments
    /// * `id` - Identifier used for reports and observability.
    /// * `fatigue` - The multiplier applied to the busy time, must lie in `[0.5, 1.5)`.
    ///
    /// # Returns
    /// A new worker or an `InvalidArgument` error if `fatigue` is out of range.
    pub fn new(id: usize, fatigue: f64) -> Result<Self> {
        if !FATIGUE_RANGE.contains(&fatigue) {
            return Err(EngineError::invalid(format!(
                "fatigue must lie in [0.5, 1.5), got {fatigue}"
            )));
        }

        Ok(Self {
            id,
            fatigue,
            slot: Mutex::new(Slot::default()),
            signal: Condvar::new(),
            busy: AtomicBool::new(false),
            time_used: AtomicU64::new(0),
            time_idle: AtomicU64::new(0),
            idle_since: Mutex::new(Some(Instant::now())),
            handle: Mutex::new(None),
        })
    }

    /// Spawns the worker's thread.
    ///
    /// # Returns
    /// An `InvalidState` error if the worker was already started or the thread
    /// couldn't be spawned.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut handle = self.handle.lock();

        if handle.is_some() {
            return Err(EngineError::InvalidState(format!(
                "worker {} was already started",
                self.id
            )));
        }

        let worker = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("tired-worker-{}", self.id))
            .spawn(move || worker.run_loop())
            .map_err(|e| {
                EngineError::InvalidState(format!("failed to spawn worker {}: {e}", self.id))
            })?;

        *handle = Some(spawned);
        Ok(())
    }

    /// Hands a job to this worker.
    ///
    /// # Returns
    /// An `InvalidState` error if a job is already pending or the worker was shut down.
    pub(crate) fn new_task(&self, job: Job) -> Result<()> {
        let mut slot = self.slot.lock();

        if slot.terminated {
            return Err(EngineError::InvalidState(format!(
                "worker {} has been shut down",
                self.id
            )));
        }

        if slot.job.is_some() {
            return Err(EngineError::InvalidState(format!(
                "worker {} already has a pending task",
                self.id
            )));
        }

        slot.job = Some(job);
        self.signal.notify_one();
        Ok(())
    }

    /// Asks the worker to exit once its current job, if any, is done.
    ///
    /// A worker waiting for work wakes up and exits without running anything else.
    pub fn shutdown(&self) {
        self.slot.lock().terminated = true;
        self.signal.notify_all();
    }

    /// Blocks until the worker's thread has fully exited.
    pub fn join(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };

        if handle.join().is_err() {
            error!(worker_id = self.id; "worker thread panicked");
        }
    }

    /// Whether the worker's thread is still running.
    pub fn is_alive(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn fatigue(&self) -> f64 {
        self.fatigue
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(atomic::Ordering::Acquire)
    }

    pub fn has_pending_task(&self) -> bool {
        self.slot.lock().job.is_some()
    }

    /// The cumulative time spent running jobs.
    pub fn time_used(&self) -> Duration {
        Duration::from_nanos(self.time_used.load(atomic::Ordering::Acquire))
    }

    /// The cumulative time spent waiting for jobs, including the current wait.
    pub fn time_idle(&self) -> Duration {
        let idle_since = self.idle_since.lock();
        let idle = Duration::from_nanos(self.time_idle.load(atomic::Ordering::Acquire));

        match *idle_since {
            Some(since) => idle + since.elapsed(),
            None => idle,
        }
    }

    /// The weighted busy time used to order workers.
    pub fn tiredness(&self) -> f64 {
        self.fatigue * self.time_used.load(atomic::Ordering::Acquire) as f64
    }

    /// Closes the current idle span and marks the worker busy.
    ///
    /// # Returns
    /// The instant the job started at.
    pub(crate) fn begin_task(&self) -> Instant {
        let mut idle_since = self.idle_since.lock();
        let now = Instant::now();

        if let Some(since) = idle_since.take() {
            self.time_idle.fetch_add(
                as_nanos(now.saturating_duration_since(since)),
                atomic::Ordering::AcqRel,
            );
        }

        self.busy.store(true, atomic::Ordering::Release);
        now
    }

    /// Folds the time elapsed since `started` into the busy time, marks the worker idle
    /// and opens a new idle span.
    pub(crate) fn record_busy(&self, started: Instant) {
        let mut idle_since = self.idle_since.lock();
        let now = Instant::now();

        self.time_used.fetch_add(
            as_nanos(now.saturating_duration_since(started)),
            atomic::Ordering::AcqRel,
        );
        self.busy.store(false, atomic::Ordering::Release);
        *idle_since = Some(now);
    }

    fn run_loop(&self) {
        debug!(worker_id = self.id; "worker started");

        while let Some(job) = self.next_job() {
            debug!(worker_id = self.id; "running task");
            job();
        }

        debug!(worker_id = self.id; "worker terminated");
    }

    /// Waits for the next job, a pending job is always drained before termination.
    fn next_job(&self) -> Option<Job> {
        let mut slot = self.slot.lock();

        loop {
            if let Some(job) = slot.job.take() {
                return Some(job);
            }

            if slot.terminated {
                return None;
            }

            self.signal.wait(&mut slot);
        }
    }
}

fn as_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl PartialEq for Worker {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Worker {}

impl PartialOrd for Worker {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Worker {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tiredness().total_cmp(&other.tiredness())
    }
}
