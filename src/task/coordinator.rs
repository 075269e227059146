// src/task/coordinator.rs
//
// Owns a task's lifecycle. Workers never touch task state: they emit
// events into an mpsc channel and the coordinator's aggregation loop is
// the single writer of counters and state transitions. Terminal states
// are final; late events are dropped.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::types::{SourceCounts, TaskConfig, TaskId, TaskSnapshot, TaskState};
use super::worker::{EventKind, SourceWorker, WorkerEvent};
use super::{TaskDeps, TaskTuning};

struct TaskStatus {
    state: TaskState,
    sources: BTreeMap<crate::listing::SourceKind, SourceCounts>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

/// Live handle to a task, retained in the registry until evicted. Status
/// reads clone a snapshot under a short lock and never wait on workers.
pub struct TaskHandle {
    pub id: TaskId,
    status: Arc<RwLock<TaskStatus>>,
    cancel: CancellationToken,
    tuning: TaskTuning,
}

impl TaskHandle {
    /// Validate-then-spawn. The caller has already run
    /// `TaskConfig::validate`; setup failures past that point (dedup
    /// ledger unreachable) land the task in `Failed` without spawning
    /// workers.
    pub(crate) async fn spawn(
        id: TaskId,
        cfg: TaskConfig,
        deps: Arc<TaskDeps>,
        tuning: TaskTuning,
    ) -> Arc<TaskHandle> {
        let now = Utc::now();
        let sources = cfg
            .sources
            .iter()
            .map(|s| (s.source, SourceCounts::default()))
            .collect();
        let status = Arc::new(RwLock::new(TaskStatus {
            state: TaskState::Pending,
            sources,
            created_at: now,
            updated_at: now,
            completed_at: None,
            error_message: None,
        }));
        let handle = Arc::new(TaskHandle {
            id,
            status,
            cancel: CancellationToken::new(),
            tuning: tuning.clone(),
        });

        if let Err(e) = deps.dedup.ping().await {
            warn!(task = %id, error = %e, "task setup failed: dedup store unreachable");
            {
                let mut st = handle.status.write().expect("status rwlock poisoned");
                st.state = TaskState::Failed;
                st.error_message = Some(format!("dedup store unreachable: {e}"));
                st.completed_at = Some(Utc::now());
                st.updated_at = Utc::now();
            }
            return handle;
        }

        let (tx, rx) = mpsc::channel::<WorkerEvent>(tuning.event_buffer);
        let filter = Arc::new(cfg.filter);
        let targets = Arc::new(cfg.targets);
        let worker_count = cfg.sources.len();

        for sc in cfg.sources {
            let worker = SourceWorker {
                task_id: id,
                cfg: sc,
                filter: Arc::clone(&filter),
                targets: Arc::clone(&targets),
                dry_run: cfg.dry_run,
                deps: Arc::clone(&deps),
                tuning: tuning.clone(),
                events: tx.clone(),
                cancel: handle.cancel.clone(),
            };
            tokio::spawn(worker.run());
        }
        // aggregator's recv() ends when the last worker drops its sender
        drop(tx);

        {
            let mut st = handle.status.write().expect("status rwlock poisoned");
            st.state = TaskState::Running;
            st.updated_at = Utc::now();
        }
        info!(task = %id, workers = worker_count, "task running");
        counter!("monitor_tasks_started_total").increment(1);

        tokio::spawn(Self::aggregate(
            id,
            Arc::clone(&handle.status),
            handle.cancel.clone(),
            rx,
        ));

        handle
    }

    async fn aggregate(
        id: TaskId,
        status: Arc<RwLock<TaskStatus>>,
        cancel: CancellationToken,
        mut rx: mpsc::Receiver<WorkerEvent>,
    ) {
        while let Some(ev) = rx.recv().await {
            let mut st = status.write().expect("status rwlock poisoned");
            if st.state.is_terminal() {
                continue;
            }
            apply(&mut st, ev);
        }

        // channel drained: every worker has exited
        let mut st = status.write().expect("status rwlock poisoned");
        if st.state.is_terminal() {
            return;
        }
        let now = Utc::now();
        st.state = if cancel.is_cancelled() {
            counter!("monitor_tasks_stopped_total").increment(1);
            TaskState::Stopped
        } else {
            counter!("monitor_tasks_completed_total").increment(1);
            TaskState::Completed
        };
        st.completed_at = Some(now);
        st.updated_at = now;
        info!(task = %id, state = ?st.state, "task reached terminal state");
    }

    /// Idempotent stop. Signals every worker; if they do not drain within
    /// the grace period the task is forced into `Stopped` anyway.
    pub fn stop(self: &Arc<Self>) -> TaskState {
        {
            let st = self.status.read().expect("status rwlock poisoned");
            if st.state.is_terminal() {
                return st.state;
            }
        }
        self.cancel.cancel();

        let handle = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(handle.tuning.stop_grace).await;
            let mut st = handle.status.write().expect("status rwlock poisoned");
            if !st.state.is_terminal() {
                warn!(task = %handle.id, "grace period elapsed, forcing Stopped");
                counter!("monitor_tasks_stopped_total").increment(1);
                let now = Utc::now();
                st.state = TaskState::Stopped;
                st.completed_at = Some(now);
                st.updated_at = now;
            }
        });

        self.status.read().expect("status rwlock poisoned").state
    }

    pub fn state(&self) -> TaskState {
        self.status.read().expect("status rwlock poisoned").state
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let st = self.status.read().expect("status rwlock poisoned");
        TaskSnapshot {
            task_id: self.id,
            state: st.state,
            sources: st.sources.clone(),
            created_at: st.created_at,
            updated_at: st.updated_at,
            completed_at: st.completed_at,
            error_message: st.error_message.clone(),
        }
    }
}

fn apply(st: &mut TaskStatus, ev: WorkerEvent) {
    let counts = st.sources.entry(ev.source).or_default();
    match ev.kind {
        EventKind::Found(n) => counts.found += n,
        EventKind::Duplicate => counts.duplicates += 1,
        EventKind::FilteredOut => counts.filtered_out += 1,
        EventKind::Notified => counts.notified += 1,
        EventKind::PageFetched => counts.pages_fetched += 1,
        EventKind::PageFailed { page, message } => {
            counts.errors += 1;
            counts.last_error = Some(format!("page {page}: {message}"));
        }
        EventKind::DeliveryFailed { target, message } => {
            counts.errors += 1;
            counts.last_error = Some(format!("delivery to {target}: {message}"));
        }
        EventKind::StoreFailed { message } => {
            counts.errors += 1;
            counts.last_error = Some(format!("dedup store: {message}"));
        }
        EventKind::Fatal { message } => {
            counts.errors += 1;
            counts.last_error = Some(message);
            counts.finished = true;
        }
        EventKind::Finished => counts.finished = true,
    }
    st.updated_at = Utc::now();
}
