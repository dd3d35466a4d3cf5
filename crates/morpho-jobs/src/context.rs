//! Job context: the environment shared by every item of a job.

use crate::guard::{execute_guarded, Guarded};
use crate::workspace::JobWorkspace;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Severity of a job log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Informational message.
    Information,
    /// Something went wrong but the job continues.
    Warning,
    /// An item or the job failed.
    Error,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Information => write!(f, "information"),
            MessageKind::Warning => write!(f, "warning"),
            MessageKind::Error => write!(f, "error"),
        }
    }
}

/// Environment handed to every item of a job.
///
/// The context is owned by the caller and shared by all items without any
/// locking from the engine. Data reachable through it must do its own
/// synchronization if items of a parallel stage touch it concurrently.
pub trait JobContext: Send + Sync + 'static {
    /// Forward a message to the user-visible log. `item_index` is `None` for
    /// messages about the job as a whole.
    fn write_log(&self, item_index: Option<usize>, kind: MessageKind, message: &str);

    /// Scratch storage for results passed between items.
    fn workspace(&self) -> &JobWorkspace;
}

/// A single line written to a [`ProjectContext`] log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Item the message is about, if any.
    pub item_index: Option<usize>,
    /// Severity.
    pub kind: MessageKind,
    /// Message text.
    pub message: String,
    /// When the message was written.
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.item_index {
            Some(index) => write!(f, "[{}] #{}: {}", self.kind, index, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Callback receiving every log line of a [`ProjectContext`].
pub type LogListener = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// Standard context around a piece of domain data, typically a project.
///
/// Every message is kept in memory, forwarded to subscribers and emitted
/// through `tracing`.
pub struct ProjectContext<D> {
    data: D,
    workspace: JobWorkspace,
    entries: Mutex<Vec<LogEntry>>,
    listeners: RwLock<Vec<LogListener>>,
}

impl<D: Send + Sync + 'static> ProjectContext<D> {
    /// Wraps `data` in a context with an empty workspace.
    pub fn new(data: D) -> Self {
        Self {
            data,
            workspace: JobWorkspace::new(),
            entries: Mutex::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// The domain data.
    pub fn data(&self) -> &D {
        &self.data
    }

    /// Subscribe to log lines.
    pub fn on_log(&self, listener: impl Fn(&LogEntry) + Send + Sync + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Copy of every log line written so far.
    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Log lines of the given kind.
    pub fn log_entries_of(&self, kind: MessageKind) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }
}

impl<D: Send + Sync + 'static> JobContext for ProjectContext<D> {
    fn write_log(&self, item_index: Option<usize>, kind: MessageKind, message: &str) {
        match kind {
            MessageKind::Information => info!(item_index = ?item_index, "{}", message),
            MessageKind::Warning => warn!(item_index = ?item_index, "{}", message),
            MessageKind::Error => error!(item_index = ?item_index, "{}", message),
        }

        let entry = LogEntry {
            item_index,
            kind,
            message: message.to_string(),
            timestamp: Utc::now(),
        };

        self.entries.lock().push(entry.clone());

        let listeners: Vec<LogListener> = self.listeners.read().clone();
        for listener in &listeners {
            if let Guarded::Panicked(panic_msg) = execute_guarded(|| listener(&entry)) {
                warn!(item_index = ?item_index, panic_msg = %panic_msg, "Log listener panicked");
            }
        }
    }

    fn workspace(&self) -> &JobWorkspace {
        &self.workspace
    }
}

impl<D> fmt::Debug for ProjectContext<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectContext")
            .field("workspace", &self.workspace)
            .field("log_entries", &self.entries.lock().len())
            .finish_non_exhaustive()
    }
}
