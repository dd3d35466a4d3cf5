//! Morpho Jobs - Staged Background Job Engine
//!
//! Runs an ordered list of heterogeneous job items on a fixed pool of
//! worker threads:
//! - Items flagged `NONE` run concurrently with their neighbours
//! - `RUNS_ALONE` / `WAITS_FOR_ALL_PREVIOUS` items run in isolation
//! - `FAILURES_ARE_FATAL` items halt the job when they fail
//! - Item errors and panics are caught, logged and counted
//! - Progress events after every item transition
//! - Explicit job registry, metrics and `tracing` instrumentation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Morpho Jobs Architecture                      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  Job::create(items, Arc<context>, title)                         │
//! │     │                                                            │
//! │     ▼                                                            │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    Stage Planner                         │    │
//! │  │  ┌──────────────┐ ┌─────────┐ ┌──────────────┐          │    │
//! │  │  │ parallel 0..4│►│ alone 4 │►│ parallel 5..9│          │    │
//! │  │  └──────────────┘ └─────────┘ └──────────────┘          │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │                           │                                      │
//! │                           ▼                                      │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                   JobEngine workers                      │    │
//! │  │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐    │    │
//! │  │  │ Worker 0 │ │ Worker 1 │ │ Worker 2 │ │ Worker N │    │    │
//! │  │  └────┬─────┘ └────┬─────┘ └────┬─────┘ └────┬─────┘    │    │
//! │  │       └────────────┴────────────┴────────────┘          │    │
//! │  │                        │                                 │    │
//! │  │              ┌─────────┴─────────┐                      │    │
//! │  │              ▼                   ▼                      │    │
//! │  │        ┌──────────┐       ┌─────────────┐               │    │
//! │  │        │ Progress │       │ Context log │               │    │
//! │  │        │ events   │       │ + summary   │               │    │
//! │  │        └──────────┘       └─────────────┘               │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │                                                                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use morpho_jobs::prelude::*;
//! use std::sync::Arc;
//!
//! let ctx = Arc::new(ProjectContext::new(project));
//! let mut items: Vec<Box<dyn JobItem<_>>> = Vec::new();
//! for (i, specimen) in specimens.iter().enumerate() {
//!     items.push(RigidAlign::new(i, specimen).boxed());
//! }
//! items.push(Box::new(BarrierItem::new(items.len())));
//!
//! let job = Arc::new(Job::create(items, ctx, Some("Rigid alignment"))?);
//! let engine = JobEngine::new(0)?;
//! engine.subscribe(|p| println!("{} / {}", p.num_items_finished(), p.num_items));
//! engine.run(job)?;
//! ```

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod guard;
pub mod item;
pub mod items;
pub mod job;
pub mod metrics;
pub mod progress;
pub mod registry;
pub mod stage;
pub mod workspace;

pub use config::JobEngineConfig;
pub use context::{JobContext, LogEntry, LogListener, MessageKind, ProjectContext};
pub use engine::{JobEngine, ShutdownHandle, WorkerState};
pub use error::{JobError, JobResult};
pub use item::{JobItem, JobItemFlags, JobItemStatus};
pub use items::{BarrierItem, FnItem, WorkspaceCleanupItem};
pub use job::{Job, JobId};
pub use metrics::{register_metrics, JobMetrics, WorkerMetrics};
pub use progress::{ItemTransition, JobProgress, ProgressListener};
pub use registry::{JobRegistry, JobState, JobSummary};
pub use stage::{Stage, StageKind, StagePlan};
pub use workspace::JobWorkspace;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::context::{JobContext, MessageKind, ProjectContext};
    pub use crate::engine::JobEngine;
    pub use crate::item::{JobItem, JobItemFlags, JobItemStatus};
    pub use crate::items::{BarrierItem, FnItem};
    pub use crate::job::Job;
    pub use crate::{JobError, JobResult};
}
