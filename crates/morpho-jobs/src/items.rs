//! Ready-made job items.

use crate::context::{JobContext, MessageKind};
use crate::error::JobResult;
use crate::item::{JobItem, JobItemFlags};
use crate::job::Job;
use std::fmt;
use std::marker::PhantomData;

/// Item backed by a closure.
///
/// # Example
///
/// ```rust,ignore
/// let item = FnItem::new(0, "Load meshes", |_job, ctx: &ProjectContext<Project>| {
///     ctx.workspace().set("meshes", load(ctx.data())?);
///     Ok(())
/// })
/// .with_flags(JobItemFlags::RUNS_ALONE)
/// .boxed();
/// ```
pub struct FnItem<C, F> {
    index: usize,
    title: String,
    flags: JobItemFlags,
    body: F,
    _context: PhantomData<fn(&C)>,
}

impl<C, F> FnItem<C, F>
where
    C: JobContext,
    F: Fn(&Job<C>, &C) -> JobResult<()> + Send + Sync + 'static,
{
    /// Creates a parallel-safe item.
    pub fn new(index: usize, title: impl Into<String>, body: F) -> Self {
        Self {
            index,
            title: title.into(),
            flags: JobItemFlags::NONE,
            body,
            _context: PhantomData,
        }
    }

    /// Sets the scheduling flags.
    #[must_use]
    pub fn with_flags(mut self, flags: JobItemFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Boxes the item for [`Job::create`].
    pub fn boxed(self) -> Box<dyn JobItem<C>> {
        Box::new(self)
    }
}

impl<C, F> JobItem<C> for FnItem<C, F>
where
    C: JobContext,
    F: Fn(&Job<C>, &C) -> JobResult<()> + Send + Sync,
{
    fn index(&self) -> usize {
        self.index
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn flags(&self) -> JobItemFlags {
        self.flags
    }

    fn run(&self, job: &Job<C>, ctx: &C) -> JobResult<()> {
        (self.body)(job, ctx)
    }
}

impl<C, F> fmt::Debug for FnItem<C, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnItem")
            .field("index", &self.index)
            .field("title", &self.title)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// No-op item separating two groups of parallel items.
#[derive(Debug, Clone, Copy)]
pub struct BarrierItem {
    index: usize,
}

impl BarrierItem {
    /// Creates a barrier at `index`.
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

impl<C: JobContext> JobItem<C> for BarrierItem {
    fn index(&self) -> usize {
        self.index
    }

    fn title(&self) -> &str {
        "(barrier)"
    }

    fn flags(&self) -> JobItemFlags {
        JobItemFlags::RUNS_ALONE | JobItemFlags::WAITS_FOR_ALL_PREVIOUS
    }

    fn run(&self, _job: &Job<C>, _ctx: &C) -> JobResult<()> {
        Ok(())
    }
}

/// Drops intermediate results from the context workspace.
///
/// Usually the last item of a job; runs alone so nothing still reads the
/// keys it removes.
#[derive(Debug, Clone)]
pub struct WorkspaceCleanupItem {
    index: usize,
    keys: Vec<String>,
}

impl WorkspaceCleanupItem {
    /// Creates a cleanup item removing `keys`.
    pub fn new<I, S>(index: usize, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            index,
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Keys removed by the item.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl<C: JobContext> JobItem<C> for WorkspaceCleanupItem {
    fn index(&self) -> usize {
        self.index
    }

    fn title(&self) -> &str {
        "Cleanup"
    }

    fn flags(&self) -> JobItemFlags {
        JobItemFlags::RUNS_ALONE | JobItemFlags::FAILURES_ARE_FATAL
    }

    fn run(&self, _job: &Job<C>, ctx: &C) -> JobResult<()> {
        let removed = self
            .keys
            .iter()
            .filter(|key| ctx.workspace().remove(key))
            .count();
        ctx.write_log(
            Some(self.index),
            MessageKind::Information,
            &format!("Removed {removed} intermediate results."),
        );
        Ok(())
    }
}
