// src/task/registry.rs
//
// Process-wide task table: concurrent lookups and inserts, no removal
// while a task is live. Lifecycle is tied to process uptime; terminal
// tasks stay queryable until evicted.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::coordinator::TaskHandle;
use super::types::{TaskConfig, TaskId, TaskSnapshot, TaskState};
use super::{TaskDeps, TaskTuning};
use crate::error::{MonitorError, MonitorResult};

pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Arc<TaskHandle>>>,
    deps: Arc<TaskDeps>,
    tuning: TaskTuning,
}

/// Registry-level health numbers for the overview endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryOverview {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub stopped: usize,
    pub failed: usize,
}

impl TaskRegistry {
    pub fn new(deps: Arc<TaskDeps>, tuning: TaskTuning) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            deps,
            tuning,
        }
    }

    /// Validate and launch a task. Returns immediately once workers are
    /// spawned; progress is observed through `status`.
    pub async fn start(&self, cfg: TaskConfig) -> MonitorResult<TaskId> {
        cfg.validate().map_err(MonitorError::Config)?;
        let id = Uuid::new_v4();
        let handle = TaskHandle::spawn(id, cfg, Arc::clone(&self.deps), self.tuning.clone()).await;
        self.tasks
            .write()
            .expect("registry rwlock poisoned")
            .insert(id, handle);
        info!(task = %id, "task registered");
        Ok(id)
    }

    pub fn status(&self, id: &str) -> MonitorResult<TaskSnapshot> {
        Ok(self.lookup(id)?.snapshot())
    }

    /// Idempotent: stopping an already-terminal task is a no-op ack.
    pub fn stop(&self, id: &str) -> MonitorResult<TaskSnapshot> {
        let handle = self.lookup(id)?;
        handle.stop();
        Ok(handle.snapshot())
    }

    /// Remove a terminal task from the table. Live tasks are never
    /// removed; returns whether an eviction happened.
    pub fn evict(&self, id: &str) -> MonitorResult<bool> {
        let handle = self.lookup(id)?;
        if !handle.is_terminal() {
            return Ok(false);
        }
        let mut tasks = self.tasks.write().expect("registry rwlock poisoned");
        Ok(tasks.remove(&handle.id).is_some())
    }

    pub fn overview(&self) -> RegistryOverview {
        let tasks = self.tasks.read().expect("registry rwlock poisoned");
        let mut ov = RegistryOverview {
            total: tasks.len(),
            running: 0,
            completed: 0,
            stopped: 0,
            failed: 0,
        };
        for h in tasks.values() {
            match h.state() {
                TaskState::Pending | TaskState::Running => ov.running += 1,
                TaskState::Completed => ov.completed += 1,
                TaskState::Stopped => ov.stopped += 1,
                TaskState::Failed => ov.failed += 1,
            }
        }
        ov
    }

    /// Graceful shutdown: request stop on every live task and wait until
    /// they are terminal, bounded by the stop grace period.
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<TaskHandle>> = {
            let tasks = self.tasks.read().expect("registry rwlock poisoned");
            tasks.values().cloned().collect()
        };
        let live: Vec<_> = handles.into_iter().filter(|h| !h.is_terminal()).collect();
        if live.is_empty() {
            return;
        }
        info!(count = live.len(), "shutdown: stopping live tasks");
        for h in &live {
            h.stop();
        }
        let deadline = tokio::time::Instant::now() + self.tuning.stop_grace;
        while tokio::time::Instant::now() < deadline {
            if live.iter().all(|h| h.is_terminal()) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
    }

    fn lookup(&self, id: &str) -> MonitorResult<Arc<TaskHandle>> {
        let parsed = Uuid::parse_str(id).map_err(|_| MonitorError::NotFound(id.to_string()))?;
        let tasks = self.tasks.read().expect("registry rwlock poisoned");
        tasks
            .get(&parsed)
            .cloned()
            .ok_or_else(|| MonitorError::NotFound(id.to_string()))
    }
}
