// src/task/types.rs
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filter::FilterCriteria;
use crate::listing::SourceKind;
use crate::notify::NotifyTarget;

pub type TaskId = Uuid;

pub const MAX_PAGES_LIMIT: u32 = 100;

fn default_max_pages() -> u32 {
    3
}

/// One source's slice of a task: which platform, which search URLs, how
/// deep to page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source: SourceKind,
    pub urls: Vec<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

/// Full task definition as accepted by Start. Immutable once validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub filter: FilterCriteria,
    #[serde(default)]
    pub targets: Vec<NotifyTarget>,
    /// Accepts a task without targets; matches are counted, not delivered.
    #[serde(default)]
    pub dry_run: bool,
}

impl TaskConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sources.is_empty() {
            return Err("at least one source configuration is required".into());
        }
        let mut seen = Vec::new();
        for sc in &self.sources {
            if seen.contains(&sc.source) {
                return Err(format!("duplicate source configuration: {}", sc.source));
            }
            seen.push(sc.source);
            if sc.urls.is_empty() || sc.urls.iter().any(|u| u.trim().is_empty()) {
                return Err(format!("source {} needs at least one search URL", sc.source));
            }
            if sc.max_pages == 0 || sc.max_pages > MAX_PAGES_LIMIT {
                return Err(format!(
                    "source {}: max_pages must be in 1..={MAX_PAGES_LIMIT}",
                    sc.source
                ));
            }
        }
        if self.targets.is_empty() && !self.dry_run {
            return Err("at least one notification target is required (or set dry_run)".into());
        }
        self.filter.validate()
    }
}

/// Task lifecycle. Pending and Running are live; the rest are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Stopped,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Stopped | TaskState::Failed
        )
    }
}

/// Per-source running totals. Monotonic: a coordinator only ever
/// increments these, so any snapshot is a lower bound on eventual totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceCounts {
    pub found: u64,
    pub duplicates: u64,
    pub filtered_out: u64,
    pub notified: u64,
    pub errors: u64,
    pub pages_fetched: u64,
    pub last_error: Option<String>,
    pub finished: bool,
}

/// Read-only, point-in-time copy of a task's status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub state: TaskState,
    pub sources: BTreeMap<SourceKind, SourceCounts>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl TaskSnapshot {
    pub fn total_found(&self) -> u64 {
        self.sources.values().map(|c| c.found).sum()
    }

    pub fn total_notified(&self) -> u64 {
        self.sources.values().map(|c| c.notified).sum()
    }

    pub fn total_filtered_out(&self) -> u64 {
        self.sources.values().map(|c| c.filtered_out).sum()
    }

    pub fn total_duplicates(&self) -> u64 {
        self.sources.values().map(|c| c.duplicates).sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.sources.values().map(|c| c.errors).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_source() -> Vec<SourceConfig> {
        vec![SourceConfig {
            source: SourceKind::Avito,
            urls: vec!["https://avito.ru/search".into()],
            max_pages: 3,
        }]
    }

    fn tg_target() -> NotifyTarget {
        NotifyTarget::Telegram {
            bot_token: "t".into(),
            chat_id: 1,
        }
    }

    #[test]
    fn valid_config_passes() {
        let cfg = TaskConfig {
            sources: one_source(),
            filter: FilterCriteria::default(),
            targets: vec![tg_target()],
            dry_run: false,
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_empty_sources_and_urls() {
        let cfg = TaskConfig {
            sources: vec![],
            filter: FilterCriteria::default(),
            targets: vec![tg_target()],
            dry_run: false,
        };
        assert!(cfg.validate().is_err());

        let cfg = TaskConfig {
            sources: vec![SourceConfig {
                source: SourceKind::Cian,
                urls: vec!["  ".into()],
                max_pages: 1,
            }],
            filter: FilterCriteria::default(),
            targets: vec![tg_target()],
            dry_run: false,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_source_kind() {
        let mut sources = one_source();
        sources.push(SourceConfig {
            source: SourceKind::Avito,
            urls: vec!["https://avito.ru/other".into()],
            max_pages: 1,
        });
        let cfg = TaskConfig {
            sources,
            filter: FilterCriteria::default(),
            targets: vec![tg_target()],
            dry_run: false,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn no_targets_requires_dry_run() {
        let cfg = TaskConfig {
            sources: one_source(),
            filter: FilterCriteria::default(),
            targets: vec![],
            dry_run: false,
        };
        assert!(cfg.validate().is_err());

        let cfg = TaskConfig {
            sources: one_source(),
            filter: FilterCriteria::default(),
            targets: vec![],
            dry_run: true,
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Stopped.is_terminal());
        assert!(TaskState::Failed.is_terminal());
    }
}
