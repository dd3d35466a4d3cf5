//! Stage planning.
//!
//! A job's items are split into contiguous stages. Items of one stage may
//! run concurrently; stage `k + 1` starts only after every item of stage `k`
//! is terminal. The engine therefore only ever asks "is the current stage
//! drained", never anything about individual dependencies.
//!
//! ```text
//!  index   0    1    2    3    4    5    6    7    8
//!  flags   -    -    -    -    RA   -    -    -    -
//!  stage  [ parallel 0..4    ][ex ][ parallel 5..9    ]
//! ```

use crate::context::JobContext;
use crate::item::JobItemFlags;
use crate::job::Job;
use std::ops::Range;

/// Kind of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Any number of items, run concurrently.
    Parallel,
    /// A single item run in isolation.
    Exclusive {
        /// The item carried `WAITS_FOR_ALL_PREVIOUS`, not only `RUNS_ALONE`.
        waits_for_all_previous: bool,
    },
}

/// A contiguous run of items sharing a dispatch window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    kind: StageKind,
    start: usize,
    end: usize,
}

impl Stage {
    /// Kind of the stage.
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// First item index.
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last item index.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Item indices in the stage.
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Stages are never empty; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns true if `index` belongs to this stage.
    pub fn contains(&self, index: usize) -> bool {
        self.range().contains(&index)
    }

    /// Returns true for single-item isolated stages.
    pub fn is_exclusive(&self) -> bool {
        matches!(self.kind, StageKind::Exclusive { .. })
    }
}

/// Ordered list of stages covering every item of a job exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagePlan {
    stages: Vec<Stage>,
}

impl StagePlan {
    /// Plans stages from item flags given in index order.
    ///
    /// * no exclusive flag: joins the open parallel stage;
    /// * `RUNS_ALONE` or `WAITS_FOR_ALL_PREVIOUS`: closes the open stage and
    ///   gets a stage of its own;
    /// * `FAILURES_ARE_FATAL` on a parallel item: joins the open stage and then
    ///   closes it, so nothing after the item starts before its outcome is known.
    pub fn from_flags<I>(flags: I) -> Self
    where
        I: IntoIterator<Item = JobItemFlags>,
    {
        let mut stages = Vec::new();
        let mut open: Option<usize> = None;
        let mut index = 0;

        for item_flags in flags {
            if item_flags.is_exclusive() {
                if let Some(start) = open.take() {
                    stages.push(Stage {
                        kind: StageKind::Parallel,
                        start,
                        end: index,
                    });
                }
                stages.push(Stage {
                    kind: StageKind::Exclusive {
                        waits_for_all_previous: item_flags
                            .contains(JobItemFlags::WAITS_FOR_ALL_PREVIOUS),
                    },
                    start: index,
                    end: index + 1,
                });
            } else {
                let start = *open.get_or_insert(index);
                if item_flags.is_fatal() {
                    stages.push(Stage {
                        kind: StageKind::Parallel,
                        start,
                        end: index + 1,
                    });
                    open = None;
                }
            }
            index += 1;
        }

        if let Some(start) = open {
            stages.push(Stage {
                kind: StageKind::Parallel,
                start,
                end: index,
            });
        }

        Self { stages }
    }

    /// Plans stages for a job.
    pub fn for_job<C: JobContext>(job: &Job<C>) -> Self {
        Self::from_flags(job.items().iter().map(|item| item.flags()))
    }

    /// The stages in execution order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Stage at position `position`.
    pub fn get(&self, position: usize) -> Option<&Stage> {
        self.stages.get(position)
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the plan has no stages (no items).
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Position of the stage holding item `index`.
    pub fn stage_of(&self, index: usize) -> Option<usize> {
        self.stages.iter().position(|s| s.contains(index))
    }

    /// Total number of items covered.
    pub fn num_items(&self) -> usize {
        self.stages.last().map_or(0, Stage::end)
    }
}
