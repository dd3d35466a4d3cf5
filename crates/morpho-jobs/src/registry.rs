//! Registry of jobs submitted by one composer.

use crate::context::JobContext;
use crate::engine::JobEngine;
use crate::error::JobResult;
use crate::job::{Job, JobId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Coarse state of a registered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Registered but not submitted.
    Pending,
    /// Submitted, not completed.
    Running,
    /// Every item completed successfully.
    Succeeded,
    /// Every item is terminal and at least one failed.
    CompletedWithErrors,
    /// Halted by a fatal failure.
    Failed,
}

impl JobState {
    /// State of `job` right now.
    pub fn of<C: JobContext>(job: &Job<C>) -> Self {
        if !job.is_submitted() {
            JobState::Pending
        } else if !job.is_completed() {
            JobState::Running
        } else if job.is_fatally_failed() {
            JobState::Failed
        } else if job.num_items_failed() > 0 {
            JobState::CompletedWithErrors
        } else {
            JobState::Succeeded
        }
    }

    /// Returns true once the job will not change any more.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Pending | JobState::Running)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Succeeded => write!(f, "succeeded"),
            JobState::CompletedWithErrors => write!(f, "completed_with_errors"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// Serialisable view of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Job ID.
    pub id: JobId,
    /// Title.
    pub title: Option<String>,
    /// State.
    pub state: JobState,
    /// Total items.
    pub num_items: usize,
    /// Items succeeded.
    pub num_items_done: usize,
    /// Items failed.
    pub num_items_failed: usize,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Completion time.
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobSummary {
    /// Summary of `job` right now.
    pub fn of<C: JobContext>(job: &Job<C>) -> Self {
        Self {
            id: job.id().clone(),
            title: job.title().map(str::to_string),
            state: JobState::of(job),
            num_items: job.num_items(),
            num_items_done: job.num_items_done(),
            num_items_failed: job.num_items_failed(),
            created_at: job.created_at(),
            completed_at: job.completed_at(),
        }
    }
}

/// Jobs known to one part of the application, in registration order.
///
/// Owned by whoever composes the engine and passed around explicitly.
pub struct JobRegistry<C: JobContext> {
    jobs: RwLock<Vec<Arc<Job<C>>>>,
}

impl<C: JobContext> Default for JobRegistry<C> {
    fn default() -> Self {
        Self {
            jobs: RwLock::new(Vec::new()),
        }
    }
}

impl<C: JobContext> JobRegistry<C> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `job` without running it.
    pub fn register(&self, job: Arc<Job<C>>) -> Arc<Job<C>> {
        debug!(job_id = %job.id(), "Job registered");
        self.jobs.write().push(Arc::clone(&job));
        job
    }

    /// Runs `job` on `engine` and registers it.
    ///
    /// # Errors
    ///
    /// Whatever [`JobEngine::run`] returns; the job is not registered then.
    pub fn submit(&self, engine: &JobEngine<C>, job: Arc<Job<C>>) -> JobResult<Arc<Job<C>>> {
        engine.run(Arc::clone(&job))?;
        Ok(self.register(job))
    }

    /// Looks up a job by ID.
    pub fn get(&self, id: &JobId) -> Option<Arc<Job<C>>> {
        self.jobs.read().iter().find(|job| job.id() == id).cloned()
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    /// Returns true if no job is registered.
    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Jobs that are not completed.
    pub fn active(&self) -> Vec<Arc<Job<C>>> {
        self.jobs
            .read()
            .iter()
            .filter(|job| !job.is_completed())
            .cloned()
            .collect()
    }

    /// Completed jobs.
    pub fn completed(&self) -> Vec<Arc<Job<C>>> {
        self.jobs
            .read()
            .iter()
            .filter(|job| job.is_completed())
            .cloned()
            .collect()
    }

    /// Drops completed jobs. Returns how many were removed.
    pub fn prune_completed(&self) -> usize {
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|job| !job.is_completed());
        let removed = before - jobs.len();
        if removed > 0 {
            debug!(removed, "Pruned completed jobs");
        }
        removed
    }

    /// Summaries of every registered job.
    pub fn summaries(&self) -> Vec<JobSummary> {
        self.jobs
            .read()
            .iter()
            .map(|job| JobSummary::of(job.as_ref()))
            .collect()
    }
}

impl<C: JobContext> fmt::Debug for JobRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.len())
            .finish()
    }
}
