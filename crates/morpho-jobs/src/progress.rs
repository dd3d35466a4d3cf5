//! Progress events fired by the engine.

use crate::job::JobId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which item transition triggered a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemTransition {
    /// `Waiting -> Running`.
    Started,
    /// `Running -> Completed`.
    Completed,
    /// `Running -> Failed`.
    Failed,
}

impl ItemTransition {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ItemTransition::Started)
    }
}

impl fmt::Display for ItemTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemTransition::Started => write!(f, "started"),
            ItemTransition::Completed => write!(f, "completed"),
            ItemTransition::Failed => write!(f, "failed"),
        }
    }
}

/// Snapshot of a job's counters taken right after an item transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Job the event belongs to.
    pub job_id: JobId,
    /// Job title.
    pub title: Option<String>,
    /// False once the job is completed.
    pub is_busy: bool,
    /// Total items.
    pub num_items: usize,
    /// Items completed successfully.
    pub num_items_done: usize,
    /// Items failed.
    pub num_items_failed: usize,
    /// Item that transitioned.
    pub item_index: usize,
    /// Title of that item.
    pub item_title: String,
    /// What happened to it.
    pub transition: ItemTransition,
}

impl JobProgress {
    /// Items in a terminal state.
    pub fn num_items_finished(&self) -> usize {
        self.num_items_done + self.num_items_failed
    }

    /// Finished fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.num_items == 0 {
            return 1.0;
        }
        self.num_items_finished() as f64 / self.num_items as f64
    }
}

/// Callback invoked on a worker thread for every progress event.
pub type ProgressListener = Arc<dyn Fn(&JobProgress) + Send + Sync>;
