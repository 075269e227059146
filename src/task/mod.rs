// src/task/mod.rs
//! Task orchestration: one coordinator per monitoring task, one worker per
//! configured source, a process-wide registry of live and terminal tasks.

pub mod coordinator;
pub mod registry;
pub mod types;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use crate::dedup::DedupStore;
use crate::fetch::{PageFetcher, RetryPolicy, SessionProvider};
use crate::notify::NotificationSink;
use crate::results::ResultLog;

pub use coordinator::TaskHandle;
pub use registry::{RegistryOverview, TaskRegistry};
pub use types::{SourceConfig, SourceCounts, TaskConfig, TaskId, TaskSnapshot, TaskState};

/// Collaborators shared by all workers of all tasks.
pub struct TaskDeps {
    pub fetcher: Arc<dyn PageFetcher>,
    pub sessions: Arc<dyn SessionProvider>,
    pub dedup: DedupStore,
    pub sink: Arc<dyn NotificationSink>,
    /// When set, accepted listings are appended to a per-task JSONL file.
    pub results: Option<ResultLog>,
}

/// Knobs every task runs with; sourced from the application config.
#[derive(Debug, Clone)]
pub struct TaskTuning {
    pub retry: RetryPolicy,
    /// Pause between page fetches within one worker (politeness).
    pub page_delay: Duration,
    /// Worker-event channel capacity.
    pub event_buffer: usize,
    /// How long a stop request may wait for workers before the task is
    /// forced into `Stopped`.
    pub stop_grace: Duration,
}

impl Default for TaskTuning {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            page_delay: Duration::from_millis(0),
            event_buffer: 256,
            stop_grace: Duration::from_secs(5),
        }
    }
}
