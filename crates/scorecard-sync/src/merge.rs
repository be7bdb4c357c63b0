//! Delta merge of fetched batches into the snapshot
//!
//! [`merge`] is the pure reconciliation of a previous snapshot against a
//! freshly fetched batch. [`SnapshotMerger`] is the same algorithm split
//! across a run: batches are absorbed as they are flushed, and removals are
//! decided once at the end against every id seen during the run.

use crate::record::{RecordId, Snapshot};
use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::AddAssign;

/// How ids absent from the fetched batch are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Anything not fetched this run was deleted upstream
    FullReplace,
    /// Never remove; used when the fetch was narrowed by a filter
    UpsertOnly,
}

impl MergePolicy {
    /// Unfiltered runs reconcile fully; filtered runs only upsert
    pub fn for_filter(filter: Option<&str>) -> Self {
        match filter {
            Some(_) => MergePolicy::UpsertOnly,
            None => MergePolicy::FullReplace,
        }
    }
}

/// Change counts of a merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl MergeStats {
    pub fn is_unchanged(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

impl AddAssign for MergeStats {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.updated += other.updated;
        self.removed += other.removed;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub snapshot: Snapshot,
    pub stats: MergeStats,
}

/// Reconcile `batch` against `previous`
///
/// Under [`MergePolicy::FullReplace`] the result holds exactly the ids of
/// `batch`, with `batch`'s values.
pub fn merge(previous: &Snapshot, batch: &Snapshot, policy: MergePolicy) -> MergeOutcome {
    let mut merger = SnapshotMerger::new(previous.clone(), BTreeSet::new());
    merger.absorb(batch.clone());
    merger.finish(policy);

    MergeOutcome {
        stats: merger.stats(),
        snapshot: merger.into_snapshot(),
    }
}

/// Run-scoped merge state
///
/// Holds the working snapshot for the whole run and the ids fetched so far,
/// which may be seeded from a checkpoint of an interrupted run.
#[derive(Debug, Clone)]
pub struct SnapshotMerger {
    working: Snapshot,
    seen: BTreeSet<RecordId>,
    stats: MergeStats,
}

impl SnapshotMerger {
    pub fn new(base: Snapshot, seen: BTreeSet<RecordId>) -> Self {
        Self {
            working: base,
            seen,
            stats: MergeStats::default(),
        }
    }

    /// Upsert a batch into the working snapshot
    ///
    /// Returns the counts for this batch alone. Nothing is removed here.
    pub fn absorb(&mut self, batch: Snapshot) -> MergeStats {
        let mut stats = MergeStats::default();

        for record in batch {
            self.seen.insert(record.id);
            match self.working.get(record.id) {
                None => stats.added += 1,
                Some(existing) if *existing != record => stats.updated += 1,
                Some(_) => {},
            }
            self.working.insert(record);
        }

        self.stats += stats;
        stats
    }

    /// Apply removals for ids never seen this run
    ///
    /// Returns the number of records removed; zero under
    /// [`MergePolicy::UpsertOnly`].
    pub fn finish(&mut self, policy: MergePolicy) -> usize {
        if policy == MergePolicy::UpsertOnly {
            return 0;
        }

        let stale: Vec<RecordId> = self
            .working
            .ids()
            .filter(|id| !self.seen.contains(id))
            .collect();

        for id in &stale {
            self.working.remove(*id);
        }

        self.stats.removed += stale.len();
        stale.len()
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.working
    }

    pub fn seen(&self) -> &BTreeSet<RecordId> {
        &self.seen
    }

    /// Cumulative counts since this merger was created
    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    pub fn into_snapshot(self) -> Snapshot {
        self.working
    }
}
