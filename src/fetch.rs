// src/fetch.rs
//
// Collaborator seams for page extraction and session material. The core
// never parses HTML: it asks a `PageFetcher` for the ordered candidates of
// one result page and treats the call as opaque, slow, and failure-prone.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::listing::{Listing, SourceKind};

/// Cookie/user-agent/proxy material a fetch is performed with. How it is
/// obtained (browser automation, proxy pool) is outside the core.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub cookies: Option<String>,
    pub user_agent: Option<String>,
    /// Forwarded to the extraction collaborator, which owns the actual
    /// dialing; the core never opens proxied connections itself.
    pub proxy: Option<String>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Anti-bot block or rate limit (403/429). Retryable after a session
    /// refresh.
    #[error("source blocked the request (status {status})")]
    Blocked { status: u16 },
    /// Transport-level trouble; retryable.
    #[error("network error: {0}")]
    Network(String),
    /// Extractor could not produce candidates for this page; the page is
    /// skipped, the source goes on.
    #[error("extraction failed: {0}")]
    Extract(String),
    /// Permanently unusable search URL. Ends the worker's iteration.
    #[error("invalid search url: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::InvalidUrl(_))
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, FetchError::Blocked { .. })
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one result page (1-based) of `url` and return its candidates
    /// in source-native order.
    async fn fetch_page(
        &self,
        source: SourceKind,
        url: &str,
        page: u32,
        session: &SessionContext,
    ) -> Result<Vec<Listing>, FetchError>;
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn session(&self, source: SourceKind) -> Result<SessionContext>;
    /// Called after a block-classified fetch error so the collaborator can
    /// rotate cookies/IP before the next attempt.
    async fn refresh(&self, source: SourceKind);
}

/// Bounded retry with exponential backoff, parameterized per task.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt `attempt` (1-based):
    /// base * 2^(attempt-1), capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let d = self.base_delay.saturating_mul(1u32 << shift);
        d.min(self.max_delay)
    }
}

/// Session material pinned from configuration. `refresh` only logs: real
/// rotation belongs to the external session collaborator.
pub struct StaticSessionProvider {
    ctx: SessionContext,
}

impl StaticSessionProvider {
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn session(&self, _source: SourceKind) -> Result<SessionContext> {
        Ok(self.ctx.clone())
    }

    async fn refresh(&self, source: SourceKind) {
        tracing::warn!(source = %source, "session refresh requested but session material is static");
    }
}

/// Extractor-service response: candidates of one page, source order.
#[derive(Debug, Deserialize)]
struct ExtractPage {
    listings: Vec<Listing>,
}

/// `PageFetcher` over an external extractor service that does the actual
/// HTML work and answers with normalized listing JSON.
#[derive(Clone)]
pub struct HttpExtractorClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpExtractorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(20),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Extractor request for one page, with the full session material:
    /// cookies and user-agent as headers, proxy as a query param so the
    /// extractor can dial through it.
    fn page_request(
        &self,
        source: SourceKind,
        url: &str,
        page: u32,
        session: &SessionContext,
    ) -> reqwest::RequestBuilder {
        let endpoint = format!("{}/extract/{}", self.base_url.trim_end_matches('/'), source);
        let mut req = self
            .client
            .get(&endpoint)
            .timeout(self.timeout)
            .query(&[("url", url), ("page", &page.to_string())]);
        if let Some(p) = &session.proxy {
            req = req.query(&[("proxy", p.as_str())]);
        }
        if let Some(c) = &session.cookies {
            req = req.header(reqwest::header::COOKIE, c);
        }
        if let Some(ua) = &session.user_agent {
            req = req.header(reqwest::header::USER_AGENT, ua);
        }
        req
    }
}

#[async_trait]
impl PageFetcher for HttpExtractorClient {
    async fn fetch_page(
        &self,
        source: SourceKind,
        url: &str,
        page: u32,
        session: &SessionContext,
    ) -> Result<Vec<Listing>, FetchError> {
        let rsp = self
            .page_request(source, url, page, session)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        match rsp.status().as_u16() {
            200 => {
                let page: ExtractPage = rsp
                    .json()
                    .await
                    .map_err(|e| FetchError::Extract(e.to_string()))?;
                Ok(page.listings)
            }
            s @ (403 | 429) => Err(FetchError::Blocked { status: s }),
            422 => Err(FetchError::InvalidUrl(url.to_string())),
            s if s >= 500 => Err(FetchError::Network(format!("extractor status {s}"))),
            s => Err(FetchError::Extract(format!("extractor status {s}"))),
        }
    }
}
