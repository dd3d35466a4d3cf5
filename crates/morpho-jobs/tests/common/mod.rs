//! Common test infrastructure for engine integration tests.

#![allow(dead_code)]

use morpho_jobs::{
    FnItem, Job, JobEngine, JobError, JobItem, JobItemFlags, JobProgress, ProjectContext,
};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub type Ctx = ProjectContext<&'static str>;

/// Upper bound for anything a test waits on.
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// What a traced item does when it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeed,
    Fail,
    Panic,
}

/// Start/end sequence numbers of every item, taken from one global counter.
///
/// `end(i) < start(j)` means item `i` was terminal before item `j` started.
#[derive(Default)]
pub struct Trace {
    clock: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    spans: Mutex<Vec<(usize, Option<usize>, Option<usize>)>>,
    completion_order: Mutex<Vec<usize>>,
    thread_names: Mutex<Vec<String>>,
}

impl Trace {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn tick(&self) -> usize {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    pub fn enter(&self, index: usize) {
        let at = self.tick();
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        if let Some(name) = thread::current().name() {
            self.thread_names.lock().push(name.to_string());
        }
        self.spans.lock().push((index, Some(at), None));
    }

    pub fn exit(&self, index: usize) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        let at = self.tick();
        if let Some(span) = self.spans.lock().iter_mut().find(|s| s.0 == index) {
            span.2 = Some(at);
        }
        self.completion_order.lock().push(index);
    }

    pub fn start(&self, index: usize) -> usize {
        self.span(index).1.expect("item never started")
    }

    pub fn end(&self, index: usize) -> usize {
        self.span(index).2.expect("item never finished")
    }

    pub fn ran(&self, index: usize) -> bool {
        self.spans.lock().iter().any(|s| s.0 == index)
    }

    fn span(&self, index: usize) -> (usize, Option<usize>, Option<usize>) {
        *self
            .spans
            .lock()
            .iter()
            .find(|s| s.0 == index)
            .expect("item not traced")
    }

    pub fn completion_order(&self) -> Vec<usize> {
        self.completion_order.lock().clone()
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn thread_names(&self) -> Vec<String> {
        self.thread_names.lock().clone()
    }

    /// Every item of `before` ended before any item of `after` started.
    pub fn strictly_before(&self, before: &[usize], after: &[usize]) -> bool {
        let last_end = before.iter().map(|&i| self.end(i)).max().unwrap_or(0);
        let first_start = after
            .iter()
            .map(|&i| self.start(i))
            .min()
            .unwrap_or(usize::MAX);
        last_end < first_start
    }
}

/// One-shot latch items can block on.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }

    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }
}

/// Item that records itself in `trace`, optionally sleeps, then behaves per
/// `outcome`.
pub fn traced(
    trace: &Arc<Trace>,
    index: usize,
    flags: JobItemFlags,
    sleep: Duration,
    outcome: Outcome,
) -> Box<dyn JobItem<Ctx>> {
    let trace = Arc::clone(trace);
    FnItem::new(index, format!("Specimen {index}"), move |_, _: &Ctx| {
        trace.enter(index);
        if !sleep.is_zero() {
            thread::sleep(sleep);
        }
        trace.exit(index);
        match outcome {
            Outcome::Succeed => Ok(()),
            Outcome::Fail => Err(JobError::failed(format!("specimen {index} has no landmarks"))),
            Outcome::Panic => panic!("specimen {index} mesh is corrupt"),
        }
    })
    .with_flags(flags)
    .boxed()
}

/// Item that blocks until `gate` opens.
pub fn gated(trace: &Arc<Trace>, index: usize, gate: &Arc<Gate>) -> Box<dyn JobItem<Ctx>> {
    let trace = Arc::clone(trace);
    let gate = Arc::clone(gate);
    FnItem::new(index, format!("Gated {index}"), move |_, _: &Ctx| {
        trace.enter(index);
        gate.wait();
        trace.exit(index);
        Ok(())
    })
    .boxed()
}

/// Builds a job of traced items from a flag list.
pub fn traced_job(
    trace: &Arc<Trace>,
    ctx: &Arc<Ctx>,
    flags: &[JobItemFlags],
    sleep: Duration,
) -> Arc<Job<Ctx>> {
    let items: Vec<Box<dyn JobItem<Ctx>>> = flags
        .iter()
        .enumerate()
        .map(|(i, &f)| traced(trace, i, f, sleep, Outcome::Succeed))
        .collect();
    Arc::new(Job::create(items, Arc::clone(ctx), Some("Traced job")).expect("valid job"))
}

/// Routes engine logs to the test harness output. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("morpho_jobs=debug")
        .with_test_writer()
        .with_thread_names(true)
        .try_init();
}

pub fn context() -> Arc<Ctx> {
    init_tracing();
    Arc::new(ProjectContext::new("specimens.morpho"))
}

/// Subscribes a listener that collects every progress event.
pub fn collect_progress(engine: &JobEngine<Ctx>) -> Arc<Mutex<Vec<JobProgress>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    engine.subscribe(move |progress| sink.lock().push(progress.clone()));
    events
}

/// Runs `job` and blocks until the engine is idle again.
pub fn run_to_completion(engine: &JobEngine<Ctx>, job: &Arc<Job<Ctx>>) {
    engine.run(Arc::clone(job)).expect("engine accepts job");
    assert!(engine.wait_until_idle(TIMEOUT), "job did not finish in time");
    assert!(job.is_completed());
}
