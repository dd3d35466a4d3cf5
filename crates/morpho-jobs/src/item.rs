//! Job item trait, flags and status.

use crate::context::JobContext;
use crate::error::JobResult;
use crate::job::Job;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Scheduling flags of a job item.
///
/// Flags combine with `|`. An item with no flags is parallel-safe.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobItemFlags(u8);

impl JobItemFlags {
    /// Parallel-safe item.
    pub const NONE: Self = Self(0);
    /// A failure of this item halts the job.
    pub const FAILURES_ARE_FATAL: Self = Self(1 << 0);
    /// The item must not overlap with any other item.
    pub const RUNS_ALONE: Self = Self(1 << 1);
    /// The item must not start before every preceding item is terminal.
    ///
    /// Stronger than [`Self::RUNS_ALONE`] in intent. With contiguous stages
    /// both produce the same ordering; the flag is kept separate so a finer
    /// dependency model can tell them apart.
    pub const WAITS_FOR_ALL_PREVIOUS: Self = Self(1 << 2);

    const ALL: u8 = 0b111;

    const NAMES: [(Self, &'static str); 3] = [
        (Self::RUNS_ALONE, "RUNS_ALONE"),
        (Self::WAITS_FOR_ALL_PREVIOUS, "WAITS_FOR_ALL_PREVIOUS"),
        (Self::FAILURES_ARE_FATAL, "FAILURES_ARE_FATAL"),
    ];

    /// Raw bit representation.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Builds flags from raw bits, dropping unknown bits.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL)
    }

    /// Returns true if every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if the item needs a stage of its own.
    pub const fn is_exclusive(self) -> bool {
        self.0 & (Self::RUNS_ALONE.0 | Self::WAITS_FOR_ALL_PREVIOUS.0) != 0
    }

    /// Returns true if a failure of the item halts the job.
    pub const fn is_fatal(self) -> bool {
        self.contains(Self::FAILURES_ARE_FATAL)
    }
}

impl BitOr for JobItemFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for JobItemFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for JobItemFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for JobItemFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }

        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for JobItemFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobItemFlags({})", self)
    }
}

/// Execution status of a job item.
///
/// `Waiting -> Running -> Completed | Failed`. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum JobItemStatus {
    /// Not dispatched yet.
    #[default]
    Waiting = 0,
    /// Executing on a worker.
    Running = 1,
    /// Finished successfully.
    Completed = 2,
    /// Finished with an error or a panic.
    Failed = 3,
}

impl JobItemStatus {
    /// Returns true for `Completed` and `Failed`.
    pub const fn is_terminal(self) -> bool {
        matches!(self, JobItemStatus::Completed | JobItemStatus::Failed)
    }
}

impl From<u8> for JobItemStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::Waiting,
        }
    }
}

impl fmt::Display for JobItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobItemStatus::Waiting => write!(f, "waiting"),
            JobItemStatus::Running => write!(f, "running"),
            JobItemStatus::Completed => write!(f, "completed"),
            JobItemStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A unit of work inside a [`Job`].
///
/// Implementations carry their own inputs and write results into the
/// context (usually its [`JobWorkspace`](crate::JobWorkspace)). The engine
/// calls [`JobItem::run`] exactly once, from exactly one worker, and owns the
/// item's status; items never change it themselves.
///
/// # Example
///
/// ```rust,ignore
/// struct RigidAlign { index: usize, specimen: usize }
///
/// impl JobItem<ProjectContext<Project>> for RigidAlign {
///     fn index(&self) -> usize { self.index }
///     fn title(&self) -> &str { "Rigid alignment" }
///     fn run(&self, _job: &Job<ProjectContext<Project>>, ctx: &ProjectContext<Project>) -> JobResult<()> {
///         let mesh = ctx.data().mesh(self.specimen)?;
///         ctx.workspace().set_indexed("rigid", self.specimen, align(&mesh)?);
///         Ok(())
///     }
/// }
/// ```
pub trait JobItem<C: JobContext>: Send + Sync {
    /// Position of the item in its job (dense, 0-based).
    fn index(&self) -> usize;

    /// Human readable title used in progress reports and log lines.
    fn title(&self) -> &str;

    /// Scheduling flags.
    fn flags(&self) -> JobItemFlags {
        JobItemFlags::NONE
    }

    /// Execute the item. `Err` marks the item as failed.
    fn run(&self, job: &Job<C>, ctx: &C) -> JobResult<()>;
}
