// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod listing;
pub mod metrics;
pub mod notify;
pub mod results;
pub mod task;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::config::AppConfig;
pub use crate::dedup::DedupStore;
pub use crate::error::{MonitorError, MonitorResult};
pub use crate::filter::FilterCriteria;
pub use crate::listing::{Listing, SourceKind};
pub use crate::task::{TaskConfig, TaskDeps, TaskRegistry, TaskSnapshot, TaskState, TaskTuning};
