//! Sequential page cursor
//!
//! [`Paginator`] is a lazy, finite sequence of pages: each call to
//! [`Paginator::next_page`] fetches exactly one page through the
//! [`Retrier`], and the sequence ends after the first page that satisfies
//! [`is_last_page`] or when the per-run page ceiling is reached.

use crate::client::{PageSource, PageResult};
use crate::retry::{Retrier, Sleeper};
use scorecard_common::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Conventional page size; also the Scorecard API maximum
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Hard ceiling on pages fetched in one run
pub const DEFAULT_MAX_PAGES: u32 = 100;

/// Pause between consecutive page requests
pub const DEFAULT_PAGE_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginatorConfig {
    pub page_size: u32,
    pub max_pages: u32,
    pub page_delay: Duration,
}

impl Default for PaginatorConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            page_delay: Duration::from_millis(DEFAULT_PAGE_DELAY_MS),
        }
    }
}

/// Why the page sequence ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Empty page or total count reached
    Exhausted,
    /// Per-run page ceiling hit before the remote signalled the end
    PageLimit,
}

/// One fetched page
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: u32,
    pub records: Vec<Value>,
    pub total: Option<u64>,
    /// No further page will be produced after this one
    pub is_last: bool,
}

/// The single termination predicate
///
/// A page is the last one when it is empty, or when the response carries a
/// total and `page * page_size` covers it.
pub fn is_last_page(page: u32, page_size: u32, record_count: usize, total: Option<u64>) -> bool {
    if record_count == 0 {
        return true;
    }
    match total {
        Some(total) => u64::from(page) * u64::from(page_size) >= total,
        None => false,
    }
}

pub struct Paginator<'a> {
    source: &'a dyn PageSource,
    retrier: &'a Retrier,
    sleeper: Arc<dyn Sleeper>,
    config: PaginatorConfig,
    next: u32,
    last: Option<u32>,
    fetched: u32,
    finished: Option<Termination>,
}

impl<'a> Paginator<'a> {
    /// Start at `start_page` (1-based)
    pub fn new(
        source: &'a dyn PageSource,
        retrier: &'a Retrier,
        sleeper: Arc<dyn Sleeper>,
        config: PaginatorConfig,
        start_page: u32,
    ) -> Self {
        Self {
            source,
            retrier,
            sleeper,
            config,
            next: start_page.max(1),
            last: None,
            fetched: 0,
            finished: None,
        }
    }

    /// Page number the next call will request
    pub fn next_page_number(&self) -> u32 {
        self.next
    }

    /// Most recent page fetched in this run
    pub fn last_page(&self) -> Option<u32> {
        self.last
    }

    /// Pages fetched so far in this run
    pub fn pages_fetched(&self) -> u32 {
        self.fetched
    }

    pub fn termination(&self) -> Option<Termination> {
        self.finished
    }

    /// Fetch the next page, or `None` once the sequence has ended
    ///
    /// Retry exhaustion is returned as an error and leaves the cursor on the
    /// failed page.
    pub async fn next_page(&mut self) -> Result<Option<Page>> {
        if self.finished.is_some() {
            return Ok(None);
        }

        if self.fetched > 0 && !self.config.page_delay.is_zero() {
            self.sleeper.sleep(self.config.page_delay).await;
        }

        let number = self.next;
        let page_size = self.config.page_size;
        let source = self.source;
        let PageResult { records, total } = self
            .retrier
            .run(number, |_| source.fetch_page(number, page_size))
            .await?;

        self.fetched += 1;
        self.last = Some(number);
        self.next = number.saturating_add(1);

        let mut is_last = is_last_page(number, page_size, records.len(), total);
        if is_last {
            debug!(page = number, records = records.len(), ?total, "Reached last page");
            self.finished = Some(Termination::Exhausted);
        } else if self.fetched >= self.config.max_pages || number == u32::MAX {
            warn!(
                page = number,
                max_pages = self.config.max_pages,
                ?total,
                "Page ceiling reached before the remote signalled the end"
            );
            self.finished = Some(Termination::PageLimit);
            is_last = true;
        }

        Ok(Some(Page {
            number,
            records,
            total,
            is_last,
        }))
    }
}
