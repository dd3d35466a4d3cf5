//! Job definition: an ordered, immutable collection of items.

use crate::context::{JobContext, MessageKind};
use crate::error::{JobError, JobResult};
use crate::guard::{execute_guarded, Guarded};
use crate::item::{JobItem, JobItemFlags, JobItemStatus};
use crate::metrics::JobMetrics;
use crate::stage::StagePlan;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Creates a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates a job ID from a string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An ordered list of job items sharing one context.
///
/// The item list is fixed at creation. Item statuses and the aggregate
/// counters are written only by the engine (or [`Job::run_immediately`]);
/// everything observable from outside is read-only.
pub struct Job<C: JobContext> {
    id: JobId,
    title: Option<String>,
    items: Vec<Box<dyn JobItem<C>>>,
    statuses: Vec<AtomicU8>,
    context: Arc<C>,
    num_done: AtomicUsize,
    num_failed: AtomicUsize,
    completed: AtomicBool,
    fatally_failed: AtomicBool,
    submitted: AtomicBool,
    created_at: DateTime<Utc>,
    completed_at: Mutex<Option<DateTime<Utc>>>,
}

impl<C: JobContext> Job<C> {
    /// Creates a job from items whose `index()` equals their position.
    ///
    /// # Errors
    ///
    /// [`JobError::EmptyJob`] when `items` is empty and
    /// [`JobError::IndexMismatch`] for the first item out of place.
    pub fn create<I>(items: I, context: Arc<C>, title: Option<&str>) -> JobResult<Self>
    where
        I: IntoIterator<Item = Box<dyn JobItem<C>>>,
    {
        let items: Vec<Box<dyn JobItem<C>>> = items.into_iter().collect();
        if items.is_empty() {
            return Err(JobError::EmptyJob);
        }
        if let Some((position, item)) = items
            .iter()
            .enumerate()
            .find(|(position, item)| item.index() != *position)
        {
            return Err(JobError::IndexMismatch {
                position,
                index: item.index(),
            });
        }

        let statuses = items
            .iter()
            .map(|_| AtomicU8::new(JobItemStatus::Waiting as u8))
            .collect();

        Ok(Self {
            id: JobId::new(),
            title: title.map(str::to_string),
            items,
            statuses,
            context,
            num_done: AtomicUsize::new(0),
            num_failed: AtomicUsize::new(0),
            completed: AtomicBool::new(false),
            fatally_failed: AtomicBool::new(false),
            submitted: AtomicBool::new(false),
            created_at: Utc::now(),
            completed_at: Mutex::new(None),
        })
    }

    /// Job ID.
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Optional title.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Number of items.
    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    /// Number of items that completed successfully.
    pub fn num_items_done(&self) -> usize {
        self.num_done.load(Ordering::SeqCst)
    }

    /// Number of items that failed.
    pub fn num_items_failed(&self) -> usize {
        self.num_failed.load(Ordering::SeqCst)
    }

    /// Number of items in a terminal state.
    pub fn num_items_finished(&self) -> usize {
        self.num_items_done() + self.num_items_failed()
    }

    /// True once every item is terminal or a fatal failure halted the job.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// True if the job was halted by a fatal item failure.
    pub fn is_fatally_failed(&self) -> bool {
        self.fatally_failed.load(Ordering::SeqCst)
    }

    /// True once the job was handed to an engine or run immediately.
    pub fn is_submitted(&self) -> bool {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Status of item `index`.
    pub fn item_status(&self, index: usize) -> Option<JobItemStatus> {
        self.statuses
            .get(index)
            .map(|s| JobItemStatus::from(s.load(Ordering::SeqCst)))
    }

    /// Title of item `index`.
    pub fn item_title(&self, index: usize) -> Option<&str> {
        self.items.get(index).map(|item| item.title())
    }

    /// Flags of item `index`.
    pub fn item_flags(&self, index: usize) -> Option<JobItemFlags> {
        self.items.get(index).map(|item| item.flags())
    }

    /// Snapshot of every item status, in index order.
    pub fn statuses(&self) -> Vec<JobItemStatus> {
        self.statuses
            .iter()
            .map(|s| JobItemStatus::from(s.load(Ordering::SeqCst)))
            .collect()
    }

    /// Shared context.
    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Completion time, once completed.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        *self.completed_at.lock()
    }

    /// One-line description of where the job stands.
    pub fn status_text(&self) -> String {
        let n = self.num_items();
        let done = self.num_items_done();
        let failed = self.num_items_failed();

        if !self.is_submitted() {
            format!("Queued: {n} items")
        } else if !self.is_completed() {
            format!("Running: {} of {n} items finished, {failed} failed", done + failed)
        } else if self.is_fatally_failed() {
            format!(
                "Failed: {done} succeeded, {failed} failed, {} not run",
                n - done - failed
            )
        } else if failed > 0 {
            format!("Finished with errors: {done} succeeded, {failed} failed")
        } else {
            format!("Finished: {done} items succeeded")
        }
    }

    /// Runs the job on the calling thread, stage by stage.
    ///
    /// Failure handling and halting match the engine; the completion summary
    /// is written to the context when the job ends.
    ///
    /// # Errors
    ///
    /// [`JobError::AlreadySubmitted`] if the job was submitted before.
    pub fn run_immediately(&self) -> JobResult<()> {
        self.mark_submitted()?;
        JobMetrics::job_submitted("immediate");
        info!(job_id = %self.id, items = self.num_items(), "Running job immediately");

        let plan = StagePlan::for_job(self);
        let mut fatal = false;
        for stage in plan.stages() {
            for index in stage.range() {
                self.begin_item(index);
                let succeeded = self.execute_item(index);
                self.finish_item(index, succeeded);
                if !succeeded && self.items[index].flags().is_fatal() {
                    fatal = true;
                }
            }
            if fatal {
                break;
            }
        }

        self.mark_completed(fatal);
        self.write_summary();
        Ok(())
    }

    pub(crate) fn items(&self) -> &[Box<dyn JobItem<C>>] {
        &self.items
    }

    pub(crate) fn mark_submitted(&self) -> JobResult<()> {
        if self.submitted.swap(true, Ordering::SeqCst) {
            return Err(JobError::AlreadySubmitted(self.id.to_string()));
        }
        Ok(())
    }

    /// `Waiting -> Running`. Returns false if the item had already left
    /// `Waiting`, which means it was dispatched twice.
    pub(crate) fn begin_item(&self, index: usize) -> bool {
        let claimed = self.statuses.get(index).is_some_and(|status| {
            status
                .compare_exchange(
                    JobItemStatus::Waiting as u8,
                    JobItemStatus::Running as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
        });
        debug_assert!(claimed, "job item {index} dispatched twice");
        if claimed {
            JobMetrics::item_started();
            debug!(job_id = %self.id, item_index = index, "Job item started");
        }
        claimed
    }

    /// Runs item `index` with panic isolation. Returns true on success.
    pub(crate) fn execute_item(&self, index: usize) -> bool {
        let Some(item) = self.items.get(index) else {
            return false;
        };

        let started = Instant::now();
        let outcome = match execute_guarded(|| item.run(self, self.context.as_ref())) {
            Guarded::Returned(result) => result,
            Guarded::Panicked(message) => {
                JobMetrics::item_panicked();
                error!(
                    job_id = %self.id,
                    item_index = index,
                    panic_msg = %message,
                    "Job item panicked"
                );
                Err(JobError::Panicked(message))
            }
        };
        let succeeded = outcome.is_ok();
        JobMetrics::item_finished(succeeded, started.elapsed());

        if let Err(err) = outcome {
            warn!(job_id = %self.id, item_index = index, error = %err, "Job item failed");
            self.log(
                Some(index),
                MessageKind::Error,
                &format!("{} failed: {}", item.title(), err),
            );
        }
        succeeded
    }

    /// `Running -> Completed | Failed`, then bumps the matching counter.
    pub(crate) fn finish_item(&self, index: usize, succeeded: bool) {
        let target = if succeeded {
            JobItemStatus::Completed
        } else {
            JobItemStatus::Failed
        };
        let transitioned = self.statuses.get(index).is_some_and(|status| {
            status
                .compare_exchange(
                    JobItemStatus::Running as u8,
                    target as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
        });
        debug_assert!(transitioned, "job item {index} finished without running");
        if !transitioned {
            return;
        }

        if succeeded {
            self.num_done.fetch_add(1, Ordering::SeqCst);
        } else {
            self.num_failed.fetch_add(1, Ordering::SeqCst);
        }
        debug!(job_id = %self.id, item_index = index, status = %target, "Job item finished");
    }

    /// Marks the job completed. Returns false if it already was.
    pub(crate) fn mark_completed(&self, fatal: bool) -> bool {
        if self.completed.load(Ordering::SeqCst) {
            return false;
        }
        if fatal {
            self.fatally_failed.store(true, Ordering::SeqCst);
        }
        *self.completed_at.lock() = Some(Utc::now());
        if self.completed.swap(true, Ordering::SeqCst) {
            return false;
        }

        JobMetrics::job_finished(fatal);
        info!(
            job_id = %self.id,
            done = self.num_items_done(),
            failed = self.num_items_failed(),
            fatal,
            "Job completed"
        );
        true
    }

    /// Writes the completion summary to the context log.
    pub(crate) fn write_summary(&self) {
        self.log(
            None,
            MessageKind::Information,
            &format!(
                "{} job items queued, {} succeeded, {} failed.",
                self.num_items(),
                self.num_items_done(),
                self.num_items_failed()
            ),
        );
        if self.is_fatally_failed() {
            self.log(None, MessageKind::Error, "The job has FAILED.");
        } else {
            self.log(
                None,
                MessageKind::Information,
                "The job has finished successfully.",
            );
        }
    }

    /// Forwards a message to the context. A panicking log sink is reported
    /// and swallowed so the caller always records the outcome.
    fn log(&self, item_index: Option<usize>, kind: MessageKind, message: &str) {
        if let Guarded::Panicked(panic_msg) =
            execute_guarded(|| self.context.write_log(item_index, kind, message))
        {
            warn!(
                job_id = %self.id,
                item_index = ?item_index,
                panic_msg = %panic_msg,
                "Job context log sink panicked"
            );
        }
    }
}

impl<C: JobContext> fmt::Debug for Job<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("num_items", &self.num_items())
            .field("num_items_done", &self.num_items_done())
            .field("num_items_failed", &self.num_items_failed())
            .field("is_completed", &self.is_completed())
            .finish_non_exhaustive()
    }
}
