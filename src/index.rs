//! In-memory timeline index rebuilt from the journal.

use crate::journal::JournalOp;
use crate::types::{
    SequencePosition, Status, StatusId, TimelineEntry, TimelineKey, TimelineRow,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;

/// What a batch of operations changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Entries inserted or replaced.
    pub upserted: usize,
    /// Entries deleted.
    pub removed: usize,
    /// Entries whose gap flag went from unset to set.
    pub gaps_opened: usize,
    /// Entries whose gap flag went from set to unset.
    pub gaps_cleared: usize,
}

/// Entries of one timeline, ordered by position.
#[derive(Default)]
struct TimelineSlots {
    /// position -> gap flag.
    by_position: BTreeMap<SequencePosition, bool>,
    /// status id -> position, for boundary lookups.
    positions: HashMap<StatusId, SequencePosition>,
}

impl TimelineSlots {
    /// Insert or replace. Returns the previous gap flag.
    fn upsert(&mut self, position: SequencePosition, is_gap: bool) -> Option<bool> {
        let previous = match self.positions.get(&position.status_id) {
            Some(old) if *old != position => {
                let old = old.clone();
                self.by_position.remove(&old)
            }
            Some(_) => self.by_position.get(&position).copied(),
            None => None,
        };
        self.positions
            .insert(position.status_id.clone(), position.clone());
        self.by_position.insert(position, is_gap);
        previous
    }

    fn remove(&mut self, status_id: &StatusId) -> Option<bool> {
        let position = self.positions.remove(status_id)?;
        self.by_position.remove(&position)
    }

    fn get(&self, status_id: &StatusId) -> Option<(&SequencePosition, bool)> {
        let position = self.positions.get(status_id)?;
        let is_gap = *self.by_position.get(position)?;
        Some((position, is_gap))
    }

    fn len(&self) -> usize {
        self.by_position.len()
    }
}

#[derive(Default)]
struct IndexState {
    timelines: HashMap<TimelineKey, TimelineSlots>,
    statuses: HashMap<StatusId, Status>,
}

/// Ordered entries per timeline plus the shared status table.
///
/// A single lock covers both, so a batch is applied atomically with
/// respect to readers.
pub struct TimelineIndex {
    state: RwLock<IndexState>,
}

fn make_entry(key: &TimelineKey, position: &SequencePosition, is_gap: bool) -> TimelineEntry {
    TimelineEntry {
        owner: key.owner.clone(),
        timeline_type: key.timeline_type.clone(),
        position: position.clone(),
        is_gap,
    }
}

impl TimelineIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Apply a batch of operations under one write lock.
    pub fn apply(&self, ops: &[JournalOp]) -> CommitSummary {
        let mut state = self.state.write();
        let mut summary = CommitSummary::default();

        for op in ops {
            match op {
                JournalOp::UpsertStatus(status) => {
                    state.statuses.insert(status.id.clone(), status.clone());
                }
                JournalOp::UpsertEntry(entry) => {
                    let previous = state
                        .timelines
                        .entry(entry.key())
                        .or_default()
                        .upsert(entry.position.clone(), entry.is_gap);

                    summary.upserted += 1;
                    match (previous, entry.is_gap) {
                        (Some(true), false) => summary.gaps_cleared += 1,
                        (Some(false), true) | (None, true) => summary.gaps_opened += 1,
                        _ => {}
                    }
                }
                JournalOp::RemoveEntry { key, status_id } => {
                    if let Some(slots) = state.timelines.get_mut(key) {
                        if slots.remove(status_id).is_some() {
                            summary.removed += 1;
                        }
                        if slots.len() == 0 {
                            state.timelines.remove(key);
                        }
                    }
                }
            }
        }

        summary
    }

    /// Swap in the contents of `other`.
    pub fn replace_with(&self, other: TimelineIndex) {
        *self.state.write() = other.state.into_inner();
    }

    /// Find the entry referencing `status_id` in one timeline.
    pub fn find_entry(&self, key: &TimelineKey, status_id: &StatusId) -> Option<TimelineEntry> {
        let state = self.state.read();
        let (position, is_gap) = state.timelines.get(key)?.get(status_id)?;
        Some(make_entry(key, position, is_gap))
    }

    /// All entries of a timeline, newest first.
    pub fn entries(&self, key: &TimelineKey) -> Vec<TimelineEntry> {
        self.page(key, None, usize::MAX)
    }

    /// Up to `limit` entries strictly older than `before` (or from the
    /// newest entry when `before` is `None`), newest first.
    pub fn page(
        &self,
        key: &TimelineKey,
        before: Option<&SequencePosition>,
        limit: usize,
    ) -> Vec<TimelineEntry> {
        let state = self.state.read();
        let Some(slots) = state.timelines.get(key) else {
            return Vec::new();
        };

        let upper = match before {
            Some(position) => Bound::Excluded(position),
            None => Bound::Unbounded,
        };

        slots
            .by_position
            .range::<SequencePosition, _>((Bound::Unbounded, upper))
            .rev()
            .take(limit)
            .map(|(position, is_gap)| make_entry(key, position, *is_gap))
            .collect()
    }

    /// Like [`page`](Self::page), joined with each entry's status.
    pub fn rows(
        &self,
        key: &TimelineKey,
        before: Option<&SequencePosition>,
        limit: usize,
    ) -> Vec<TimelineRow> {
        let entries = self.page(key, before, limit);
        let state = self.state.read();
        entries
            .into_iter()
            .filter_map(|entry| {
                let status = state.statuses.get(entry.status_id())?.clone();
                Some(TimelineRow { entry, status })
            })
            .collect()
    }

    /// Entries carrying a gap flag, newest first.
    pub fn gaps(&self, key: &TimelineKey) -> Vec<TimelineEntry> {
        let state = self.state.read();
        let Some(slots) = state.timelines.get(key) else {
            return Vec::new();
        };
        slots
            .by_position
            .iter()
            .rev()
            .filter(|(_, is_gap)| **is_gap)
            .map(|(position, _)| make_entry(key, position, true))
            .collect()
    }

    /// The newest entry of a timeline.
    pub fn newest_entry(&self, key: &TimelineKey) -> Option<TimelineEntry> {
        let state = self.state.read();
        let (position, is_gap) = state.timelines.get(key)?.by_position.iter().next_back()?;
        Some(make_entry(key, position, *is_gap))
    }

    /// The oldest entry of a timeline.
    pub fn oldest_entry(&self, key: &TimelineKey) -> Option<TimelineEntry> {
        let state = self.state.read();
        let (position, is_gap) = state.timelines.get(key)?.by_position.iter().next()?;
        Some(make_entry(key, position, *is_gap))
    }

    pub fn entry_count(&self, key: &TimelineKey) -> usize {
        self.state
            .read()
            .timelines
            .get(key)
            .map(TimelineSlots::len)
            .unwrap_or(0)
    }

    pub fn status(&self, id: &StatusId) -> Option<Status> {
        self.state.read().statuses.get(id).cloned()
    }

    /// Keys of all non-empty timelines, sorted.
    pub fn keys(&self) -> Vec<TimelineKey> {
        let mut keys: Vec<_> = self.state.read().timelines.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// (timelines, entries, statuses, gaps).
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        let state = self.state.read();
        let entries: usize = state.timelines.values().map(TimelineSlots::len).sum();
        let gaps: usize = state
            .timelines
            .values()
            .map(|slots| slots.by_position.values().filter(|g| **g).count())
            .sum();
        (state.timelines.len(), entries, state.statuses.len(), gaps)
    }

    /// Operations that rebuild the current contents, dropping statuses that
    /// no entry references (directly or as a reblog target).
    ///
    /// Returns the operations and the number of statuses dropped.
    pub fn snapshot_ops(&self) -> (Vec<JournalOp>, usize) {
        let state = self.state.read();

        let mut referenced: HashSet<&StatusId> = HashSet::new();
        for slots in state.timelines.values() {
            for id in slots.positions.keys() {
                referenced.insert(id);
                if let Some(target) = state.statuses.get(id).and_then(|s| s.reblog_of.as_ref()) {
                    referenced.insert(target);
                }
            }
        }

        let mut ops = Vec::new();
        let mut status_ids: Vec<_> = referenced.into_iter().collect();
        status_ids.sort();
        for id in &status_ids {
            if let Some(status) = state.statuses.get(*id) {
                ops.push(JournalOp::UpsertStatus(status.clone()));
            }
        }
        let kept = ops.len();

        let mut keys: Vec<_> = state.timelines.keys().collect();
        keys.sort();
        for key in keys {
            for (position, is_gap) in &state.timelines[key].by_position {
                ops.push(JournalOp::UpsertEntry(make_entry(key, position, *is_gap)));
            }
        }

        (ops, state.statuses.len() - kept)
    }
}

impl Default for TimelineIndex {
    fn default() -> Self {
        Self::new()
    }
}
