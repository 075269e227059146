// src/config.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::fetch::RetryPolicy;
use crate::task::TaskTuning;

const ENV_PATH: &str = "REALTY_MONITOR_CONFIG";
const DEFAULT_PATH: &str = "config/realty-monitor.toml";

/// Application configuration. Every field has a default so the service
/// boots from an empty file or no file at all.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerCfg,
    pub store: StoreCfg,
    pub monitor: MonitorCfg,
    pub extractor: ExtractorCfg,
    pub session: SessionCfg,
    pub notify: NotifyCfg,
    pub results: ResultsCfg,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerCfg {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreCfg {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorCfg {
    pub fetch_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub page_delay_ms: u64,
    pub stop_grace_ms: u64,
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractorCfg {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionCfg {
    pub cookies: Option<String>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResultsCfg {
    /// Directory for per-task JSONL result logs; unset disables the log.
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyCfg {
    pub timeout_secs: u64,
    pub max_retries: u8,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerCfg::default(),
            store: StoreCfg::default(),
            monitor: MonitorCfg::default(),
            extractor: ExtractorCfg::default(),
            session: SessionCfg::default(),
            notify: NotifyCfg::default(),
            results: ResultsCfg::default(),
        }
    }
}

impl Default for ServerCfg {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8009".into(),
        }
    }
}

impl Default for StoreCfg {
    fn default() -> Self {
        Self {
            path: "data/seen.db".into(),
        }
    }
}

impl Default for MonitorCfg {
    fn default() -> Self {
        Self {
            fetch_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            page_delay_ms: 1_500,
            stop_grace_ms: 5_000,
            event_buffer: 256,
        }
    }
}

impl Default for ExtractorCfg {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8010".into(),
            timeout_secs: 20,
        }
    }
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            cookies: None,
            user_agent: None,
            proxy: None,
        }
    }
}

impl Default for NotifyCfg {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            max_retries: 3,
        }
    }
}

impl AppConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Resolution chain: $REALTY_MONITOR_CONFIG → config/realty-monitor.toml
    /// → built-in defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            return Self::load_from(&pb)
                .with_context(|| format!("{ENV_PATH} points at {}", pb.display()));
        }
        let default = PathBuf::from(DEFAULT_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        Ok(Self::default())
    }

    pub fn task_tuning(&self) -> TaskTuning {
        TaskTuning {
            retry: RetryPolicy {
                max_attempts: self.monitor.fetch_attempts.max(1),
                base_delay: Duration::from_millis(self.monitor.backoff_base_ms),
                max_delay: Duration::from_millis(self.monitor.backoff_max_ms),
            },
            page_delay: Duration::from_millis(self.monitor.page_delay_ms),
            event_buffer: self.monitor.event_buffer.max(16),
            stop_grace: Duration::from_millis(self.monitor.stop_grace_ms),
        }
    }
}
