// src/task/worker.rs
//
// One worker per (task, source). Fetches result pages in ascending order,
// pipes every candidate through dedup → filter → record → deliver, and
// reports progress as events; the coordinator owns all counter state.
//
// Cancellation is checked between fetch attempts, between pages, and
// between individual listings, so stop latency is bounded by one in-flight
// fetch. After cancellation is observed the worker performs no further
// ledger writes or notifications.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::{SourceConfig, TaskId};
use super::{TaskDeps, TaskTuning};
use crate::filter::FilterCriteria;
use crate::listing::{Listing, SourceKind};
use crate::notify::NotifyTarget;

/// Progress report from a worker to its coordinator.
#[derive(Debug)]
pub(crate) struct WorkerEvent {
    pub source: SourceKind,
    pub kind: EventKind,
}

#[derive(Debug)]
pub(crate) enum EventKind {
    /// Candidates seen on a fetched page (pre-dedup, pre-filter).
    Found(u64),
    Duplicate,
    FilteredOut,
    Notified,
    PageFetched,
    /// Retries exhausted for one page; the worker moved on.
    PageFailed { page: u32, message: String },
    /// One target rejected one listing; pipeline continues.
    DeliveryFailed { target: String, message: String },
    /// Ledger unavailable for one listing; not notified, counted as error.
    StoreFailed { message: String },
    /// Non-recoverable source error; this worker is done.
    Fatal { message: String },
    Finished,
}

enum PageError {
    Failed(String),
    Fatal(String),
}

enum Outcome {
    Notified,
    Duplicate,
    FilteredOut,
    StoreError,
    Cancelled,
}

pub(crate) struct SourceWorker {
    pub task_id: TaskId,
    pub cfg: SourceConfig,
    pub filter: Arc<FilterCriteria>,
    pub targets: Arc<Vec<NotifyTarget>>,
    pub dry_run: bool,
    pub deps: Arc<TaskDeps>,
    pub tuning: TaskTuning,
    pub events: mpsc::Sender<WorkerEvent>,
    pub cancel: CancellationToken,
}

impl SourceWorker {
    pub async fn run(self) {
        let source = self.cfg.source;
        debug!(task = %self.task_id, %source, urls = self.cfg.urls.len(), "worker started");

        'urls: for url in self.cfg.urls.clone() {
            for page in 1..=self.cfg.max_pages {
                if self.cancel.is_cancelled() {
                    break 'urls;
                }

                let listings = match self.fetch_with_retry(&url, page).await {
                    Ok(Some(l)) => l,
                    Ok(None) => break 'urls, // cancelled mid-backoff
                    Err(PageError::Failed(message)) => {
                        counter!("monitor_fetch_errors_total").increment(1);
                        self.emit(EventKind::PageFailed { page, message }).await;
                        continue;
                    }
                    Err(PageError::Fatal(message)) => {
                        counter!("monitor_fetch_errors_total").increment(1);
                        warn!(task = %self.task_id, %source, %url, %message, "fatal source error");
                        self.emit(EventKind::Fatal { message }).await;
                        break 'urls;
                    }
                };

                self.emit(EventKind::PageFetched).await;
                if listings.is_empty() {
                    debug!(task = %self.task_id, %source, page, "empty page, done with url");
                    break;
                }

                counter!("monitor_listings_found_total").increment(listings.len() as u64);
                self.emit(EventKind::Found(listings.len() as u64)).await;

                let mut new_on_page = 0u64;
                for mut listing in listings {
                    if self.cancel.is_cancelled() {
                        break 'urls;
                    }
                    listing.normalize();
                    match self.process(listing).await {
                        Outcome::Duplicate => {}
                        Outcome::Cancelled => break 'urls,
                        // store errors kept out of the early-stop heuristic
                        _ => new_on_page += 1,
                    }
                }

                if new_on_page == 0 {
                    debug!(task = %self.task_id, %source, page, "nothing new on page, done with url");
                    break;
                }

                if page < self.cfg.max_pages && !self.tuning.page_delay.is_zero() {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break 'urls,
                        _ = tokio::time::sleep(self.tuning.page_delay) => {}
                    }
                }
            }
        }

        info!(task = %self.task_id, %source, "worker finished");
        self.emit(EventKind::Finished).await;
    }

    /// One page, bounded attempts. `Ok(None)` means cancellation was
    /// observed while waiting to retry.
    async fn fetch_with_retry(
        &self,
        url: &str,
        page: u32,
    ) -> Result<Option<Vec<Listing>>, PageError> {
        let source = self.cfg.source;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if self.cancel.is_cancelled() {
                return Ok(None);
            }

            let session = match self.deps.sessions.session(source).await {
                Ok(s) => s,
                Err(e) => {
                    // no session material is as retryable as a failed fetch
                    if attempt >= self.tuning.retry.max_attempts {
                        return Err(PageError::Failed(format!("session unavailable: {e}")));
                    }
                    if !self.backoff(attempt).await {
                        return Ok(None);
                    }
                    continue;
                }
            };

            match self
                .deps
                .fetcher
                .fetch_page(source, url, page, &session)
                .await
            {
                Ok(listings) => return Ok(Some(listings)),
                Err(e) if e.is_fatal() => return Err(PageError::Fatal(e.to_string())),
                Err(e) => {
                    debug!(task = %self.task_id, %source, page, attempt, error = %e, "fetch attempt failed");
                    if e.is_blocked() {
                        self.deps.sessions.refresh(source).await;
                    }
                    if attempt >= self.tuning.retry.max_attempts {
                        return Err(PageError::Failed(e.to_string()));
                    }
                    if !self.backoff(attempt).await {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Sleep out the backoff for `attempt`; false when cancelled instead.
    async fn backoff(&self, attempt: u32) -> bool {
        let delay = self.tuning.retry.delay_for(attempt);
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn process(&self, listing: Listing) -> Outcome {
        let source = self.cfg.source;

        match self.deps.dedup.contains(source, &listing.source_id).await {
            Ok(true) => {
                counter!("monitor_dedup_hits_total").increment(1);
                self.emit(EventKind::Duplicate).await;
                return Outcome::Duplicate;
            }
            Ok(false) => {}
            Err(e) => {
                // cannot prove the listing is new: do not notify
                self.emit(EventKind::StoreFailed {
                    message: e.to_string(),
                })
                .await;
                return Outcome::StoreError;
            }
        }

        if !self.filter.matches(&listing) {
            self.emit(EventKind::FilteredOut).await;
            return Outcome::FilteredOut;
        }

        // Commit membership before delivering; losing the insert race means
        // a sibling already owns this identifier.
        if self.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        match self.deps.dedup.record(source, &listing.source_id).await {
            Ok(true) => {}
            Ok(false) => {
                counter!("monitor_dedup_hits_total").increment(1);
                self.emit(EventKind::Duplicate).await;
                return Outcome::Duplicate;
            }
            Err(e) => {
                self.emit(EventKind::StoreFailed {
                    message: e.to_string(),
                })
                .await;
                return Outcome::StoreError;
            }
        }

        counter!("monitor_notified_total").increment(1);
        self.emit(EventKind::Notified).await;

        if let Some(log) = &self.deps.results {
            if let Err(e) = log.append(self.task_id, &listing).await {
                warn!(task = %self.task_id, %source, error = %e, "result log append failed");
            }
        }

        if !self.dry_run {
            for target in self.targets.iter() {
                if let Err(e) = self.deps.sink.deliver(target, &listing).await {
                    counter!("monitor_delivery_errors_total").increment(1);
                    warn!(task = %self.task_id, %source, target = %target.describe(), error = %e, "delivery failed");
                    self.emit(EventKind::DeliveryFailed {
                        target: target.describe(),
                        message: e.to_string(),
                    })
                    .await;
                }
            }
        }

        Outcome::Notified
    }

    async fn emit(&self, kind: EventKind) {
        let _ = self
            .events
            .send(WorkerEvent {
                source: self.cfg.source,
                kind,
            })
            .await;
    }
}
