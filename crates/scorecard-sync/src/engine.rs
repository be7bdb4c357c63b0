//! The incremental sync run
//!
//! One run is a single sequential pipeline:
//!
//! 1. load the checkpoint and the snapshot (once)
//! 2. fetch page → normalize → accumulate in a [`PageBatch`]
//! 3. every `flush_every` pages, absorb the batch into the snapshot, write
//!    the snapshot, then advance the checkpoint
//! 4. after the last page, apply removals, write the snapshot and clear the
//!    checkpoint
//!
//! Page N is always merged before page N+1 is requested, which is what makes
//! "resume at `lastCompletedPage + 1`" correct. A checkpoint is only resumed
//! when the snapshot it describes loaded intact and it carries the seen ids. Cancellation is only honored
//! between pages; the disk is left at the last flushed snapshot/checkpoint
//! pair.

use crate::client::PageSource;
use crate::merge::{MergePolicy, MergeStats, SnapshotMerger};
use crate::normalizer::Normalizer;
use crate::paginator::{Page, Paginator, PaginatorConfig, Termination};
use crate::record::{CanonicalRecord, Snapshot};
use crate::retry::{Retrier, RetryPolicy, Sleeper, TokioSleeper};
use crate::store::{Checkpoint, CheckpointStore, SnapshotOrigin, SnapshotStore};
use scorecard_common::Result;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Pages accumulated between snapshot writes
pub const DEFAULT_FLUSH_EVERY: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub paginator: PaginatorConfig,
    pub flush_every: u32,
    /// Filter value applied to the remote query, if any
    pub filter: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            paginator: PaginatorConfig::default(),
            flush_every: DEFAULT_FLUSH_EVERY,
            filter: None,
        }
    }
}

/// Records fetched since the last flush
#[derive(Debug, Default)]
pub struct PageBatch {
    records: Snapshot,
    pages: u32,
    last_page: Option<u32>,
}

impl PageBatch {
    pub fn push(&mut self, record: CanonicalRecord) {
        self.records.insert(record);
    }

    /// Mark page `number` as fully accumulated
    pub fn complete_page(&mut self, number: u32) {
        self.pages += 1;
        self.last_page = Some(number);
    }

    pub fn page_count(&self) -> u32 {
        self.pages
    }

    pub fn last_page(&self) -> Option<u32> {
        self.last_page
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages == 0
    }

    /// Hand the records over and reset the accumulator
    pub fn take(&mut self) -> Snapshot {
        self.pages = 0;
        self.last_page = None;
        std::mem::take(&mut self.records)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Every page fetched; checkpoint cleared
    Completed,
    /// Page ceiling reached; progress checkpointed for the next run
    Truncated,
    /// Stopped at a page boundary on request; progress checkpointed
    Cancelled,
}

/// Summary of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub status: SyncStatus,
    /// First page of this run when it resumed an interrupted one
    pub resumed_from: Option<u32>,
    pub pages_fetched: u32,
    pub last_page: Option<u32>,
    pub records_fetched: usize,
    pub records_dropped: usize,
    pub stats: MergeStats,
    pub snapshot_records: usize,
}

pub struct SyncEngine<S> {
    source: S,
    normalizer: Normalizer,
    retrier: Retrier,
    sleeper: Arc<dyn Sleeper>,
    snapshots: SnapshotStore,
    checkpoints: CheckpointStore,
    options: EngineOptions,
    cancel: CancellationToken,
}

impl<S: PageSource> SyncEngine<S> {
    pub fn new(
        source: S,
        snapshots: SnapshotStore,
        checkpoints: CheckpointStore,
        options: EngineOptions,
    ) -> Self {
        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
        Self {
            source,
            normalizer: Normalizer::scorecard(),
            retrier: Retrier::new(RetryPolicy::default(), sleeper.clone()),
            sleeper,
            snapshots,
            checkpoints,
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retrier = Retrier::new(policy, self.sleeper.clone());
        self
    }

    /// Route backoff and pacing delays through `sleeper`
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.retrier = Retrier::new(self.retrier.policy().clone(), sleeper.clone());
        self.sleeper = sleeper;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Execute one sync run
    ///
    /// Fetch exhaustion and write failures abort with an error, leaving the
    /// last flushed snapshot and checkpoint on disk.
    pub async fn run(&self) -> Result<SyncReport> {
        let filter = self.options.filter.clone();
        let (snapshot, origin) = self.snapshots.load();
        let checkpoint = self.resume_point(self.checkpoints.load(), origin);

        let resumed_from = checkpoint.is_resume().then(|| checkpoint.next_page());
        match resumed_from {
            Some(page) => info!(
                page,
                seen = checkpoint.seen_ids.as_ref().map_or(0, |ids| ids.len()),
                "Resuming interrupted run"
            ),
            None => info!(filter = ?filter, "Starting sync from page 1"),
        }

        let start_page = checkpoint.next_page();
        let mut merger =
            SnapshotMerger::new(snapshot, checkpoint.seen_ids.unwrap_or_default());
        let mut paginator = Paginator::new(
            &self.source,
            &self.retrier,
            self.sleeper.clone(),
            self.options.paginator.clone(),
            start_page,
        );
        let mut batch = PageBatch::default();
        let mut fetched = 0usize;
        let mut dropped = 0usize;

        let status = loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                page = paginator.next_page() => Some(page?),
            };

            let page = match next {
                Some(Some(page)) => page,
                Some(None) => break SyncStatus::Completed,
                None => {
                    warn!(
                        page = paginator.next_page_number(),
                        "Cancellation requested, stopping at page boundary"
                    );
                    break SyncStatus::Cancelled;
                },
            };

            fetched += page.records.len();
            dropped += self.normalize_page(&page, &mut batch);

            if page.is_last {
                break match paginator.termination() {
                    Some(Termination::PageLimit) => SyncStatus::Truncated,
                    _ => SyncStatus::Completed,
                };
            }

            if batch.page_count() >= self.options.flush_every.max(1) {
                self.flush(&mut merger, &mut batch)?;
            }
        };

        match status {
            SyncStatus::Completed => {
                let stats = merger.absorb(batch.take());
                let removed = merger.finish(MergePolicy::for_filter(filter.as_deref()));
                self.snapshots.save(merger.snapshot())?;
                self.checkpoints.clear()?;
                info!(
                    added = stats.added,
                    updated = stats.updated,
                    removed,
                    records = merger.snapshot().len(),
                    "Final merge written"
                );
            },
            SyncStatus::Truncated | SyncStatus::Cancelled => {
                self.flush(&mut merger, &mut batch)?;
                warn!(
                    status = ?status,
                    next_page = paginator.next_page_number(),
                    "Run stopped early, removals deferred to a completed run"
                );
            },
        }

        let pages_fetched = paginator.pages_fetched();
        let report = SyncReport {
            status,
            resumed_from,
            pages_fetched,
            last_page: paginator.last_page(),
            records_fetched: fetched,
            records_dropped: dropped,
            stats: merger.stats(),
            snapshot_records: merger.snapshot().len(),
        };

        info!(
            status = ?report.status,
            pages = report.pages_fetched,
            fetched = report.records_fetched,
            dropped = report.records_dropped,
            added = report.stats.added,
            updated = report.stats.updated,
            removed = report.stats.removed,
            records = report.snapshot_records,
            "Sync finished"
        );

        Ok(report)
    }

    /// Decide whether `checkpoint` can be resumed against the loaded snapshot
    ///
    /// A resume skips pages `1..=last_completed_page`, so it is only sound
    /// when the snapshot still holds those pages and the checkpoint knows
    /// which ids they contained. Anything else restarts from page 1.
    fn resume_point(&self, checkpoint: Checkpoint, origin: SnapshotOrigin) -> Checkpoint {
        if !checkpoint.is_resume() {
            return checkpoint;
        }

        let reason = if checkpoint.filter != self.options.filter {
            "Checkpoint belongs to a different query, restarting from page 1"
        } else if !origin.is_intact() {
            "Snapshot behind the checkpoint is missing or unreadable, restarting from page 1"
        } else if checkpoint.seen_ids.is_none() {
            "Checkpoint has no seen ids, restarting from page 1"
        } else {
            return checkpoint;
        };

        warn!(
            page = checkpoint.last_completed_page,
            checkpoint_filter = ?checkpoint.filter,
            filter = ?self.options.filter,
            snapshot = ?origin,
            "{reason}"
        );
        Checkpoint::default()
    }

    /// Normalize one page into the batch; returns the number of dropped records
    fn normalize_page(&self, page: &Page, batch: &mut PageBatch) -> usize {
        let mut dropped = 0;
        for raw in &page.records {
            match self.normalizer.normalize(raw) {
                Ok(record) => batch.push(record),
                Err(e) => {
                    dropped += 1;
                    warn!(page = page.number, error = %e, "Dropping malformed record");
                },
            }
        }
        batch.complete_page(page.number);

        info!(
            page = page.number,
            records = page.records.len(),
            dropped,
            total = ?page.total,
            "Fetched page"
        );
        dropped
    }

    /// Absorb the batch, write the snapshot, then advance the checkpoint
    fn flush(&self, merger: &mut SnapshotMerger, batch: &mut PageBatch) -> Result<()> {
        let Some(last_page) = batch.last_page() else {
            return Ok(());
        };
        let pages = batch.page_count();

        let stats = merger.absorb(batch.take());
        self.snapshots.save(merger.snapshot())?;
        self.checkpoints.save(&Checkpoint::new(
            last_page,
            merger.seen().clone(),
            self.options.filter.clone(),
        ))?;

        info!(
            page = last_page,
            pages,
            added = stats.added,
            updated = stats.updated,
            records = merger.snapshot().len(),
            "Flushed batch"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_page_batch_take_resets() {
        let mut batch = PageBatch::default();
        assert!(batch.is_empty());

        batch.push(CanonicalRecord::new(1));
        batch.push(CanonicalRecord::new(1));
        batch.complete_page(4);
        batch.complete_page(5);

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.page_count(), 2);
        assert_eq!(batch.last_page(), Some(5));

        let records = batch.take();
        assert_eq!(records.len(), 1);
        assert!(batch.is_empty());
        assert_eq!(batch.last_page(), None);
    }

    #[test]
    fn test_an_empty_page_still_counts_as_a_page() {
        let mut batch = PageBatch::default();
        batch.complete_page(1);
        assert!(!batch.is_empty());
        assert_eq!(batch.len(), 0);
    }
}
