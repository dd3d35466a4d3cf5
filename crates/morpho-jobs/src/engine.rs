//! Job engine: a fixed pool of worker threads executing one job at a time.
//!
//! ```text
//!   run(job) ──► StagePlan ──► ActiveJob { stage, cursor, in_flight }
//!                                   │
//!            work_available ◄───────┤ notify on activation / stage advance
//!                 │                 │
//!   ┌─────────┐ ┌─────────┐ ┌─────────┐
//!   │worker 0 │ │worker 1 │ │worker N │   Idle ─► Scanning ─► Executing ─► Idle
//!   └────┬────┘ └────┬────┘ └────┬────┘
//!        └───────────┴───────────┘
//!                    │ record outcome, advance stage, fire progress
//!                    ▼
//!             ProgressListener(s)
//! ```

use crate::config::JobEngineConfig;
use crate::context::JobContext;
use crate::error::{JobError, JobResult};
use crate::guard::{execute_guarded, Guarded};
use crate::job::Job;
use crate::metrics::{JobMetrics, WorkerMetrics};
use crate::progress::{ItemTransition, JobProgress, ProgressListener};
use crate::stage::StagePlan;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What a worker thread is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Blocked, waiting for work or shutdown.
    Idle,
    /// Looking for a dispatchable item.
    Scanning,
    /// Running an item.
    Executing,
    /// Exited its loop.
    Terminated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Idle => write!(f, "idle"),
            WorkerState::Scanning => write!(f, "scanning"),
            WorkerState::Executing => write!(f, "executing"),
            WorkerState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Result of recording an item outcome against the active job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Advance {
    /// The current stage still has items running or undispatched.
    Pending,
    /// The stage drained and the next one is open for dispatch.
    Advanced,
    /// The job is over.
    Complete { fatal: bool },
}

/// Dispatch bookkeeping for the job currently on the engine.
struct ActiveJob<C: JobContext> {
    job: Arc<Job<C>>,
    plan: StagePlan,
    stage: usize,
    cursor: usize,
    in_flight: usize,
    halted: bool,
    /// Set once the last outcome is recorded.
    finished: bool,
    /// Terminal progress events recorded but not yet delivered.
    undelivered: usize,
}

impl<C: JobContext> ActiveJob<C> {
    fn new(job: Arc<Job<C>>, plan: StagePlan) -> Self {
        Self {
            job,
            plan,
            stage: 0,
            cursor: 0,
            in_flight: 0,
            halted: false,
            finished: false,
            undelivered: 0,
        }
    }

    /// Claims the next undispatched item of the current stage.
    fn next_dispatch(&mut self) -> Option<usize> {
        if self.halted {
            return None;
        }
        let stage = self.plan.get(self.stage)?;
        if self.cursor >= stage.end() {
            return None;
        }
        let index = self.cursor;
        self.cursor += 1;
        self.in_flight += 1;
        Some(index)
    }

    fn record(&mut self, fatal_failure: bool) -> Advance {
        self.in_flight = self.in_flight.saturating_sub(1);
        if fatal_failure {
            self.halted = true;
        }

        let stage_end = self.plan.get(self.stage).map_or(0, |s| s.end());
        if self.in_flight > 0 || (!self.halted && self.cursor < stage_end) {
            return Advance::Pending;
        }
        if self.halted {
            self.finished = true;
            return Advance::Complete { fatal: true };
        }

        self.stage += 1;
        if let Some(next) = self.plan.get(self.stage) {
            self.cursor = next.start();
            Advance::Advanced
        } else {
            self.finished = true;
            Advance::Complete { fatal: false }
        }
    }

    /// The job may leave the engine once its outcome is final and every
    /// terminal progress event went out.
    fn is_settled(&self) -> bool {
        self.finished && self.undelivered == 0
    }
}

struct EngineState<C: JobContext> {
    active: Option<ActiveJob<C>>,
    must_terminate: bool,
    live_workers: usize,
    busy_workers: usize,
    workers: Vec<WorkerState>,
}

struct Shared<C: JobContext> {
    config: JobEngineConfig,
    worker_count: usize,
    state: Mutex<EngineState<C>>,
    /// Wakes idle workers: new job, stage advance, shutdown.
    work_available: Condvar,
    /// Wakes waiters: worker exit, job finished.
    state_changed: Condvar,
    listeners: RwLock<Vec<ProgressListener>>,
    /// Serialises progress delivery so snapshots never go backwards.
    progress_gate: Mutex<()>,
}

impl<C: JobContext> Shared<C> {
    fn terminate(&self) {
        let mut state = self.state.lock();
        if !state.must_terminate {
            state.must_terminate = true;
            info!(
                live_workers = state.live_workers,
                busy_workers = state.busy_workers,
                "Terminating job engine workers"
            );
        }
        drop(state);
        self.work_available.notify_all();
    }

    fn worker_loop(&self, worker: usize) {
        let _exit = ExitGuard {
            shared: self,
            worker,
        };
        debug!(worker, "Worker started");

        loop {
            let (job, index) = {
                let mut state = self.state.lock();
                loop {
                    if state.must_terminate {
                        return;
                    }
                    state.workers[worker] = WorkerState::Scanning;
                    let dispatch = state
                        .active
                        .as_mut()
                        .and_then(|active| {
                            active
                                .next_dispatch()
                                .map(|index| (Arc::clone(&active.job), index))
                        });
                    if let Some(dispatch) = dispatch {
                        state.workers[worker] = WorkerState::Executing;
                        state.busy_workers += 1;
                        WorkerMetrics::set_busy(state.busy_workers);
                        break dispatch;
                    }
                    state.workers[worker] = WorkerState::Idle;
                    self.work_available.wait(&mut state);
                }
            };

            debug!(worker, job_id = %job.id(), item_index = index, "Dispatching job item");
            self.process(worker, &job, index);
        }
    }

    fn process(&self, worker: usize, job: &Arc<Job<C>>, index: usize) {
        let claimed = job.begin_item(index);
        let succeeded = if claimed {
            self.fire(job, index, ItemTransition::Started);
            let succeeded = job.execute_item(index);
            job.finish_item(index, succeeded);
            succeeded
        } else {
            true
        };
        let fatal_failure =
            !succeeded && job.item_flags(index).is_some_and(|flags| flags.is_fatal());

        let advance = {
            let mut state = self.state.lock();
            state.busy_workers = state.busy_workers.saturating_sub(1);
            state.workers[worker] = WorkerState::Idle;
            WorkerMetrics::set_busy(state.busy_workers);
            match state.active.as_mut() {
                Some(active) if Arc::ptr_eq(&active.job, job) => {
                    if claimed {
                        active.undelivered += 1;
                    }
                    active.record(fatal_failure)
                }
                _ => Advance::Pending,
            }
        };

        match advance {
            Advance::Pending => {}
            Advance::Advanced => {
                JobMetrics::stage_advanced();
                debug!(job_id = %job.id(), after_item = index, "Stage drained, advancing");
                self.work_available.notify_all();
            }
            Advance::Complete { fatal } => {
                job.mark_completed(fatal);
                if self.config.log_summary {
                    job.write_summary();
                }
            }
        }

        if claimed {
            let transition = if succeeded {
                ItemTransition::Completed
            } else {
                ItemTransition::Failed
            };
            self.fire(job, index, transition);
        }

        let mut state = self.state.lock();
        let settled = match state.active.as_mut() {
            Some(active) if Arc::ptr_eq(&active.job, job) => {
                if claimed {
                    active.undelivered = active.undelivered.saturating_sub(1);
                }
                active.is_settled()
            }
            _ => false,
        };
        if settled {
            state.active = None;
            drop(state);
            debug!(job_id = %job.id(), "Engine idle");
            self.state_changed.notify_all();
        }
    }

    /// Delivers one progress event to every listener.
    fn fire(&self, job: &Job<C>, index: usize, transition: ItemTransition) {
        let _gate = self.progress_gate.lock();
        let progress = JobProgress {
            job_id: job.id().clone(),
            title: job.title().map(str::to_string),
            is_busy: !job.is_completed(),
            num_items: job.num_items(),
            num_items_done: job.num_items_done(),
            num_items_failed: job.num_items_failed(),
            item_index: index,
            item_title: job.item_title(index).unwrap_or_default().to_string(),
            transition,
        };

        let listeners: Vec<ProgressListener> = self.listeners.read().clone();
        for listener in &listeners {
            if let Guarded::Panicked(message) = execute_guarded(|| listener(&progress)) {
                warn!(job_id = %job.id(), panic_msg = %message, "Progress listener panicked");
            }
        }
    }
}

/// Marks a worker terminated however its loop ends.
struct ExitGuard<'a, C: JobContext> {
    shared: &'a Shared<C>,
    worker: usize,
}

impl<C: JobContext> Drop for ExitGuard<'_, C> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.workers[self.worker] = WorkerState::Terminated;
        state.live_workers = state.live_workers.saturating_sub(1);
        WorkerMetrics::set_live(state.live_workers);
        drop(state);
        self.shared.state_changed.notify_all();
        debug!(worker = self.worker, "Worker exited");
    }
}

/// Handle that can stop an engine from anywhere, including a progress
/// listener, without keeping the engine alive.
pub struct ShutdownHandle<C: JobContext> {
    shared: Weak<Shared<C>>,
}

impl<C: JobContext> ShutdownHandle<C> {
    /// Same as [`JobEngine::terminate_all`]. No-op if the engine is gone.
    pub fn terminate_all(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.terminate();
        }
    }
}

impl<C: JobContext> Clone for ShutdownHandle<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<C: JobContext> fmt::Debug for ShutdownHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

/// Executes jobs on a fixed pool of worker threads.
///
/// One job is active at a time. Its items are released stage by stage (see
/// [`StagePlan`]); workers block on a shared condition variable while no
/// item of the current stage is left to dispatch.
///
/// # Example
///
/// ```rust,ignore
/// let engine = JobEngine::new(4)?;
/// engine.subscribe(|p| println!("{}/{}", p.num_items_finished(), p.num_items));
/// engine.run(Arc::new(job))?;
/// engine.wait_until_idle(Duration::from_secs(60));
/// engine.shutdown();
/// ```
pub struct JobEngine<C: JobContext> {
    shared: Arc<Shared<C>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<C: JobContext> JobEngine<C> {
    /// Starts an engine with `worker_count` workers (`0` = processor count).
    ///
    /// # Errors
    ///
    /// [`JobError::Worker`] if a worker thread cannot be spawned.
    pub fn new(worker_count: usize) -> JobResult<Self> {
        Self::with_config(JobEngineConfig::new(worker_count))
    }

    /// Starts an engine from a full configuration.
    ///
    /// # Errors
    ///
    /// [`JobError::Configuration`] for an empty thread name prefix and
    /// [`JobError::Worker`] if a worker thread cannot be spawned.
    pub fn with_config(config: JobEngineConfig) -> JobResult<Self> {
        if config.thread_name_prefix.trim().is_empty() {
            return Err(JobError::Configuration(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }

        let worker_count = config.effective_worker_count();
        let shared = Arc::new(Shared {
            worker_count,
            state: Mutex::new(EngineState {
                active: None,
                must_terminate: false,
                live_workers: 0,
                busy_workers: 0,
                workers: vec![WorkerState::Idle; worker_count],
            }),
            work_available: Condvar::new(),
            state_changed: Condvar::new(),
            listeners: RwLock::new(Vec::new()),
            progress_gate: Mutex::new(()),
            config,
        });

        info!(
            workers = worker_count,
            prefix = %shared.config.thread_name_prefix,
            "Starting job engine"
        );

        let mut handles = Vec::with_capacity(worker_count);
        for worker in 0..worker_count {
            shared.state.lock().live_workers += 1;
            let thread_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", shared.config.thread_name_prefix, worker))
                .spawn(move || thread_shared.worker_loop(worker));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    {
                        let mut state = shared.state.lock();
                        state.live_workers -= 1;
                        state.workers[worker] = WorkerState::Terminated;
                    }
                    shared.terminate();
                    return Err(JobError::Worker(format!(
                        "failed to spawn worker {worker}: {err}"
                    )));
                }
            }
        }
        WorkerMetrics::set_live(shared.state.lock().live_workers);

        Ok(Self {
            shared,
            handles: Mutex::new(handles),
        })
    }

    /// Activates `job` and wakes the workers. Does not block.
    ///
    /// The engine stays busy until the job's last progress event has been
    /// delivered, so calling `run` from inside a listener fails with
    /// [`JobError::EngineBusy`].
    ///
    /// # Errors
    ///
    /// [`JobError::EngineTerminated`] after shutdown was requested,
    /// [`JobError::EngineBusy`] while another job is active and
    /// [`JobError::AlreadySubmitted`] for a job that ran before.
    pub fn run(&self, job: Arc<Job<C>>) -> JobResult<()> {
        let mut state = self.shared.state.lock();
        if state.must_terminate {
            return Err(JobError::EngineTerminated);
        }
        if state.active.is_some() {
            return Err(JobError::EngineBusy);
        }
        job.mark_submitted()?;

        let plan = StagePlan::for_job(job.as_ref());
        info!(
            job_id = %job.id(),
            title = job.title().unwrap_or_default(),
            items = job.num_items(),
            stages = plan.len(),
            "Job activated"
        );
        state.active = Some(ActiveJob::new(job, plan));
        drop(state);

        JobMetrics::job_submitted("engine");
        self.shared.work_available.notify_all();
        Ok(())
    }

    /// Registers a progress listener.
    ///
    /// Listeners run on worker threads, one event at a time. They must not
    /// call [`JobEngine::wait_for_worker_termination`].
    pub fn subscribe(&self, listener: impl Fn(&JobProgress) + Send + Sync + 'static) {
        self.shared.listeners.write().push(Arc::new(listener));
    }

    /// Handle for stopping the engine from a listener or another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle<C> {
        ShutdownHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Requests orderly shutdown: running items finish, nothing new starts.
    pub fn terminate_all(&self) {
        self.shared.terminate();
    }

    /// Blocks until every worker exited or `timeout` elapsed. A timeout too
    /// large to represent as a deadline waits without one.
    ///
    /// Returns true iff all workers exited. Calling it again after success
    /// returns true immediately.
    pub fn wait_for_worker_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.shared.state.lock();
        while state.live_workers > 0 {
            let Some(deadline) = deadline else {
                self.shared.state_changed.wait(&mut state);
                continue;
            };
            if self
                .shared
                .state_changed
                .wait_until(&mut state, deadline)
                .timed_out()
                && state.live_workers > 0
            {
                return false;
            }
        }
        drop(state);

        for handle in self.handles.lock().drain(..) {
            if handle.join().is_err() {
                warn!("Worker thread panicked while exiting");
            }
        }
        true
    }

    /// [`terminate_all`](Self::terminate_all) followed by a wait bounded by
    /// the configured shutdown timeout.
    pub fn shutdown(&self) -> bool {
        self.terminate_all();
        let stopped = self.wait_for_worker_termination(self.shared.config.shutdown_timeout);
        if stopped {
            info!("Job engine stopped");
        } else {
            warn!(
                live_workers = self.live_workers(),
                "Job engine workers still running after shutdown timeout"
            );
        }
        stopped
    }

    /// Blocks until no job is active or `timeout` elapsed. Returns true if
    /// the engine is idle.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.shared.state.lock();
        while state.active.is_some() {
            let Some(deadline) = deadline else {
                self.shared.state_changed.wait(&mut state);
                continue;
            };
            if self
                .shared
                .state_changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.active.is_none();
            }
        }
        true
    }

    /// The active job, if any.
    pub fn current_job(&self) -> Option<Arc<Job<C>>> {
        self.shared
            .state
            .lock()
            .active
            .as_ref()
            .map(|active| Arc::clone(&active.job))
    }

    /// True while a job is active.
    pub fn is_busy(&self) -> bool {
        self.shared.state.lock().active.is_some()
    }

    /// True once shutdown was requested.
    pub fn is_terminating(&self) -> bool {
        self.shared.state.lock().must_terminate
    }

    /// Size of the worker pool.
    pub fn worker_count(&self) -> usize {
        self.shared.worker_count
    }

    /// Workers that have not exited yet.
    pub fn live_workers(&self) -> usize {
        self.shared.state.lock().live_workers
    }

    /// Workers currently running an item.
    pub fn busy_workers(&self) -> usize {
        self.shared.state.lock().busy_workers
    }

    /// State of every worker, by worker number.
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.shared.state.lock().workers.clone()
    }

    /// Engine configuration.
    pub fn config(&self) -> &JobEngineConfig {
        &self.shared.config
    }
}

impl<C: JobContext> Drop for JobEngine<C> {
    fn drop(&mut self) {
        self.shared.terminate();
    }
}

impl<C: JobContext> fmt::Debug for JobEngine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("JobEngine")
            .field("worker_count", &self.shared.worker_count)
            .field("live_workers", &state.live_workers)
            .field("busy_workers", &state.busy_workers)
            .field("busy", &state.active.is_some())
            .field("must_terminate", &state.must_terminate)
            .finish()
    }
}
