// tests/common/mod.rs
//
// Shared doubles for the task-flow and API tests: a scripted page fetcher
// and a recording notification sink, plus small builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use realty_monitor::dedup::DedupStore;
use realty_monitor::results::ResultLog;
use realty_monitor::fetch::{
    FetchError, PageFetcher, RetryPolicy, SessionContext, SessionProvider, StaticSessionProvider,
};
use realty_monitor::listing::{Listing, SourceKind};
use realty_monitor::notify::{NotificationSink, NotifyTarget};
use realty_monitor::task::{
    SourceConfig, TaskConfig, TaskDeps, TaskRegistry, TaskSnapshot, TaskTuning,
};
use realty_monitor::FilterCriteria;

/// What one scripted page answers with.
pub enum ScriptedPage {
    Listings(Vec<Listing>),
    Blocked,
    /// Blocked on the first attempt, listings on every retry.
    BlockedThen(Vec<Listing>),
    Network,
    InvalidUrl,
}

/// Scripted `PageFetcher`: pages are looked up by (url, page); anything
/// not scripted is an empty page. An optional delay simulates slow fetches.
pub struct FakeFetcher {
    script: HashMap<String, Vec<ScriptedPage>>,
    delay: Duration,
    attempts: Mutex<HashMap<(String, u32), u32>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            script: HashMap::new(),
            delay: Duration::ZERO,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Append the next page for `url`.
    pub fn page(mut self, url: &str, page: ScriptedPage) -> Self {
        self.script.entry(url.to_string()).or_default().push(page);
        self
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch_page(
        &self,
        _source: SourceKind,
        url: &str,
        page: u32,
        _session: &SessionContext,
    ) -> Result<Vec<Listing>, FetchError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let attempt = {
            let mut attempts = self.attempts.lock().expect("attempts mutex poisoned");
            let n = attempts.entry((url.to_string(), page)).or_insert(0);
            *n += 1;
            *n
        };
        match self
            .script
            .get(url)
            .and_then(|pages| pages.get((page - 1) as usize))
        {
            None => Ok(Vec::new()),
            Some(ScriptedPage::Listings(l)) => Ok(l.clone()),
            Some(ScriptedPage::Blocked) => Err(FetchError::Blocked { status: 403 }),
            Some(ScriptedPage::BlockedThen(l)) => {
                if attempt == 1 {
                    Err(FetchError::Blocked { status: 429 })
                } else {
                    Ok(l.clone())
                }
            }
            Some(ScriptedPage::Network) => Err(FetchError::Network("connection reset".into())),
            Some(ScriptedPage::InvalidUrl) => Err(FetchError::InvalidUrl(url.to_string())),
        }
    }
}

/// Sink that records `(target, source_id)` pairs; can be told to reject
/// everything for one target label.
#[derive(Default)]
pub struct RecordingSink {
    pub delivered: Mutex<Vec<(String, String)>>,
    pub fail_target: Option<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(label: &str) -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail_target: Some(label.to_string()),
        }
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().expect("sink mutex poisoned").len()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, target: &NotifyTarget, listing: &Listing) -> anyhow::Result<()> {
        let label = target.describe();
        if self.fail_target.as_deref() == Some(label.as_str()) {
            anyhow::bail!("simulated delivery failure for {label}");
        }
        self.delivered
            .lock()
            .expect("sink mutex poisoned")
            .push((label, listing.source_id.clone()));
        Ok(())
    }
}

pub fn listing(source: SourceKind, id: &str, price: u64) -> Listing {
    Listing {
        source,
        source_id: id.to_string(),
        title: format!("Квартира {id}"),
        description: None,
        price: Some(price),
        area: Some(40.0),
        location: Some("Москва".into()),
        url: format!("https://example.test/{source}/{id}"),
        published_at: None,
    }
}

pub fn telegram_target() -> NotifyTarget {
    NotifyTarget::Telegram {
        bot_token: "123:TEST".into(),
        chat_id: 42,
    }
}

pub fn source_cfg(source: SourceKind, url: &str, max_pages: u32) -> SourceConfig {
    SourceConfig {
        source,
        urls: vec![url.to_string()],
        max_pages,
    }
}

pub fn task_cfg(sources: Vec<SourceConfig>, filter: FilterCriteria) -> TaskConfig {
    TaskConfig {
        sources,
        filter,
        targets: vec![telegram_target()],
        dry_run: false,
    }
}

/// Fast retry/stop timings so tests finish quickly.
pub fn quick_tuning() -> TaskTuning {
    TaskTuning {
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        },
        page_delay: Duration::ZERO,
        event_buffer: 64,
        stop_grace: Duration::from_millis(500),
    }
}

/// Session provider that counts refresh requests.
#[derive(Default)]
pub struct CountingSessions {
    pub refreshes: AtomicU32,
}

#[async_trait]
impl SessionProvider for CountingSessions {
    async fn session(&self, _source: SourceKind) -> anyhow::Result<SessionContext> {
        Ok(SessionContext::default())
    }

    async fn refresh(&self, _source: SourceKind) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Registry over an in-memory ledger; the ledger handle is returned so a
/// test can pre-seed or inspect it.
pub async fn registry_with(
    fetcher: FakeFetcher,
    sink: Arc<RecordingSink>,
) -> (Arc<TaskRegistry>, DedupStore) {
    let sessions = Arc::new(StaticSessionProvider::new(SessionContext::default()));
    registry_with_parts(fetcher, sink, sessions, None).await
}

pub async fn registry_with_parts(
    fetcher: FakeFetcher,
    sink: Arc<RecordingSink>,
    sessions: Arc<dyn SessionProvider>,
    results: Option<ResultLog>,
) -> (Arc<TaskRegistry>, DedupStore) {
    let dedup = DedupStore::in_memory().await.expect("in-memory store");
    let deps = Arc::new(TaskDeps {
        fetcher: Arc::new(fetcher),
        sessions,
        dedup: dedup.clone(),
        sink,
        results,
    });
    (Arc::new(TaskRegistry::new(deps, quick_tuning())), dedup)
}

/// Poll until the task reaches a terminal state or `timeout` elapses.
pub async fn wait_terminal(
    registry: &TaskRegistry,
    id: &str,
    timeout: Duration,
) -> TaskSnapshot {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let snap = registry.status(id).expect("task exists");
        if snap.state.is_terminal() {
            return snap;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} still {:?} after {timeout:?}",
            snap.state
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
