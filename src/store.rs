//! Persisted timeline store with per-timeline transactions.

use crate::error::{Result, StoreError};
use crate::index::{CommitSummary, TimelineIndex};
use crate::journal::{Journal, JournalOp};
use crate::subscriptions::{SubscriptionConfig, SubscriptionHandle, SubscriptionId, SubscriptionManager};
use crate::types::{
    SequencePosition, Status, StatusId, StoreStats, TimelineEntry, TimelineKey, TimelineRow,
};
use fs2::FileExt;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Base path for the store.
    pub path: PathBuf,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Open without write access. Commits fail with [`StoreError::ReadOnly`].
    pub read_only: bool,

    /// fsync the journal on every commit.
    pub sync_on_commit: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./timeline-store"),
            create_if_missing: true,
            read_only: false,
            sync_on_commit: true,
        }
    }
}

/// Magic bytes for store manifest.
const STORE_MAGIC: &[u8; 4] = b"TLS\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

const JOURNAL_FILE: &str = "timeline.journal";

/// Durable table of timeline entries and the statuses they reference.
///
/// Writes go through [`Transaction`]s scoped to one [`TimelineKey`].
/// Transactions on the same key are serialized; transactions on different
/// keys only contend briefly while their commit frame is written.
pub struct TimelineStore {
    /// Store configuration.
    config: StoreConfig,

    /// Lock file for exclusive (or shared, when read-only) access.
    _lock_file: File,

    /// Commit journal.
    journal: Journal,

    /// In-memory view of everything committed.
    index: TimelineIndex,

    /// Change notifications.
    subscriptions: SubscriptionManager,

    /// One write lock per timeline.
    scope_locks: Mutex<HashMap<TimelineKey, Arc<Mutex<()>>>>,

    /// Orders journal appends with index updates.
    commit_lock: Mutex<()>,
}

impl TimelineStore {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing && !config.read_only {
            Self::create(config)
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Create a new store.
    pub fn create(config: StoreConfig) -> Result<Self> {
        if config.read_only {
            return Err(StoreError::ReadOnly);
        }

        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;

        let lock_file = Self::acquire_lock(&config.path, false)?;
        let (journal, _) = Journal::open(
            config.path.join(JOURNAL_FILE),
            false,
            config.sync_on_commit,
        )?;

        info!(path = %config.path.display(), "created timeline store");

        Ok(Self::assemble(config, lock_file, journal, TimelineIndex::new()))
    }

    /// Open an existing store, replaying its journal.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;

        let lock_file = Self::acquire_lock(&config.path, config.read_only)?;
        let (journal, frames) = Journal::open(
            config.path.join(JOURNAL_FILE),
            config.read_only,
            config.sync_on_commit,
        )?;

        let index = TimelineIndex::new();
        for frame in &frames {
            index.apply(&frame.ops);
        }

        info!(
            path = %config.path.display(),
            frames = frames.len(),
            read_only = config.read_only,
            "opened timeline store"
        );

        Ok(Self::assemble(config, lock_file, journal, index))
    }

    fn assemble(config: StoreConfig, lock_file: File, journal: Journal, index: TimelineIndex) -> Self {
        Self {
            config,
            _lock_file: lock_file,
            journal,
            index,
            subscriptions: SubscriptionManager::new(),
            scope_locks: Mutex::new(HashMap::new()),
            commit_lock: Mutex::new(()),
        }
    }

    // --- Transactions ---

    /// Begin a transaction on one timeline.
    ///
    /// Blocks until no other transaction on `key` is open.
    pub fn begin(&self, key: &TimelineKey) -> Transaction<'_> {
        let scope = {
            let mut locks = self.scope_locks.lock();
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = scope.lock_arc();

        Transaction {
            store: self,
            key: key.clone(),
            _guard: guard,
            staged: Vec::new(),
            staged_entries: HashMap::new(),
            finished: false,
        }
    }

    fn commit_ops(&self, key: &TimelineKey, ops: &[JournalOp]) -> Result<CommitSummary> {
        if self.config.read_only {
            return Err(StoreError::ReadOnly);
        }

        let summary = {
            let _lock = self.commit_lock.lock();
            let seq = self.journal.append(ops)?;
            let summary = self.index.apply(ops);
            debug!(
                timeline = %key,
                seq,
                upserted = summary.upserted,
                removed = summary.removed,
                gaps_opened = summary.gaps_opened,
                gaps_cleared = summary.gaps_cleared,
                "committed timeline transaction"
            );
            summary
        };

        self.subscriptions.broadcast_merged(key, &summary);
        Ok(summary)
    }

    // --- Reads ---

    /// All entries of a timeline, newest first.
    pub fn entries(&self, key: &TimelineKey) -> Vec<TimelineEntry> {
        self.index.entries(key)
    }

    /// Up to `limit` entries older than `before`, newest first.
    pub fn page(
        &self,
        key: &TimelineKey,
        before: Option<&SequencePosition>,
        limit: usize,
    ) -> Vec<TimelineEntry> {
        self.index.page(key, before, limit)
    }

    /// Up to `limit` rows (entry + status) older than `before`, newest first.
    pub fn rows(
        &self,
        key: &TimelineKey,
        before: Option<&SequencePosition>,
        limit: usize,
    ) -> Vec<TimelineRow> {
        self.index.rows(key, before, limit)
    }

    /// Find the entry referencing `status_id` in one timeline.
    pub fn find_entry(&self, key: &TimelineKey, status_id: &StatusId) -> Option<TimelineEntry> {
        self.index.find_entry(key, status_id)
    }

    /// Entries with an open gap below them, newest first.
    pub fn gaps(&self, key: &TimelineKey) -> Vec<TimelineEntry> {
        self.index.gaps(key)
    }

    /// The oldest cached entry (the end of the scrollable timeline).
    pub fn last_entry(&self, key: &TimelineKey) -> Option<TimelineEntry> {
        self.index.oldest_entry(key)
    }

    /// The newest cached entry.
    pub fn first_entry(&self, key: &TimelineKey) -> Option<TimelineEntry> {
        self.index.newest_entry(key)
    }

    pub fn entry_count(&self, key: &TimelineKey) -> usize {
        self.index.entry_count(key)
    }

    pub fn status(&self, id: &StatusId) -> Option<Status> {
        self.index.status(id)
    }

    /// Keys of all non-empty timelines.
    pub fn timelines(&self) -> Vec<TimelineKey> {
        self.index.keys()
    }

    // --- Maintenance ---

    /// Delete all but the newest `keep` entries of a timeline.
    ///
    /// Hook for an external retention policy. Returns the number removed.
    pub fn retain_latest(&self, key: &TimelineKey, keep: usize) -> Result<usize> {
        let mut txn = self.begin(key);
        let doomed: Vec<StatusId> = self
            .index
            .entries(key)
            .into_iter()
            .skip(keep)
            .map(|entry| entry.position.status_id)
            .collect();

        if doomed.is_empty() {
            return Ok(0);
        }

        txn.remove_entries(doomed);
        Ok(txn.commit()?.removed)
    }

    /// Rewrite the journal as a single snapshot frame, dropping statuses no
    /// entry references. Returns the number of statuses dropped.
    pub fn compact(&self) -> Result<usize> {
        if self.config.read_only {
            return Err(StoreError::ReadOnly);
        }

        let dropped = {
            let _lock = self.commit_lock.lock();
            let before = self.journal.size();
            let (ops, dropped) = self.index.snapshot_ops();
            self.journal.rewrite(&ops)?;

            // Rebuild so dropped statuses disappear from memory too.
            let rebuilt = TimelineIndex::new();
            rebuilt.apply(&ops);
            self.index.replace_with(rebuilt);

            info!(
                before_bytes = before,
                after_bytes = self.journal.size(),
                statuses_dropped = dropped,
                "compacted timeline journal"
            );
            dropped
        };

        self.subscriptions.broadcast_compacted(dropped);
        Ok(dropped)
    }

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        let (timelines, entries, statuses, gaps) = self.index.counts();
        StoreStats {
            timeline_count: timelines as u64,
            entry_count: entries as u64,
            status_count: statuses as u64,
            gap_count: gaps as u64,
            journal_size_bytes: self.journal.size(),
        }
    }

    /// Subscribe to commit notifications.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        self.subscriptions.subscribe(config)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.unsubscribe(id)
    }

    /// Get the store path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    // --- Private Helpers ---

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::create(manifest_path)?;

        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let manifest_path = path.join("MANIFEST");
        if !manifest_path.exists() {
            return Err(StoreError::NotInitialized);
        }
        let mut file = File::open(manifest_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path, shared: bool) -> Result<File> {
        let lock_path = path.join("LOCK");
        let lock_file = if shared {
            File::open(&lock_path).or_else(|_| File::create(&lock_path))?
        } else {
            File::create(&lock_path)?
        };

        let locked = if shared {
            FileExt::try_lock_shared(&lock_file)
        } else {
            FileExt::try_lock_exclusive(&lock_file)
        };
        locked.map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

/// A unit of work on one timeline.
///
/// Reads observe the transaction's own staged writes. Nothing is visible to
/// other readers, or durable, until [`commit`](Self::commit) returns `Ok`.
/// Dropping an uncommitted transaction rolls it back.
pub struct Transaction<'a> {
    store: &'a TimelineStore,
    key: TimelineKey,
    _guard: ArcMutexGuard<RawMutex, ()>,
    staged: Vec<JournalOp>,
    /// Staged view of entries: `None` marks a staged removal.
    staged_entries: HashMap<StatusId, Option<TimelineEntry>>,
    finished: bool,
}

impl<'a> Transaction<'a> {
    /// The timeline this transaction writes to.
    pub fn key(&self) -> &TimelineKey {
        &self.key
    }

    /// Find the entry referencing `status_id`, staged writes included.
    pub fn find_entry_by_status_id(&self, status_id: &StatusId) -> Option<TimelineEntry> {
        match self.staged_entries.get(status_id) {
            Some(staged) => staged.clone(),
            None => self.store.index.find_entry(&self.key, status_id),
        }
    }

    /// Stage inserts or replacements of entries.
    ///
    /// Every entry must belong to this transaction's timeline; otherwise
    /// nothing from this call is staged.
    pub fn upsert_entries(
        &mut self,
        entries: impl IntoIterator<Item = TimelineEntry>,
    ) -> Result<()> {
        let entries: Vec<_> = entries.into_iter().collect();
        if let Some(foreign) = entries.iter().find(|e| !e.belongs_to(&self.key)) {
            return Err(StoreError::InvalidOperation(format!(
                "Entry for {} staged in transaction on {}",
                foreign.key(),
                self.key
            )));
        }

        for entry in entries {
            self.staged_entries
                .insert(entry.status_id().clone(), Some(entry.clone()));
            self.staged.push(JournalOp::UpsertEntry(entry));
        }
        Ok(())
    }

    /// Stage inserts or replacements of status entities.
    pub fn upsert_statuses(&mut self, statuses: impl IntoIterator<Item = Status>) {
        self.staged
            .extend(statuses.into_iter().map(JournalOp::UpsertStatus));
    }

    /// Stage removal of entries by status id.
    pub fn remove_entries(&mut self, status_ids: impl IntoIterator<Item = StatusId>) {
        for status_id in status_ids {
            self.staged_entries.insert(status_id.clone(), None);
            self.staged.push(JournalOp::RemoveEntry {
                key: self.key.clone(),
                status_id,
            });
        }
    }

    /// Number of staged operations.
    pub fn pending(&self) -> usize {
        self.staged.len()
    }

    /// Write all staged operations as one journal frame, then publish them.
    ///
    /// On error nothing was applied.
    pub fn commit(mut self) -> Result<CommitSummary> {
        self.finished = true;
        let ops = std::mem::take(&mut self.staged);
        if ops.is_empty() {
            return Ok(CommitSummary::default());
        }

        self.store.commit_ops(&self.key, &ops).map_err(|e| {
            warn!(timeline = %self.key, error = %e, "timeline transaction rolled back");
            e
        })
    }

    /// Discard all staged operations.
    pub fn rollback(mut self) {
        self.finished = true;
        self.staged.clear();
        self.staged_entries.clear();
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished && !self.staged.is_empty() {
            debug!(
                timeline = %self.key,
                discarded = self.staged.len(),
                "uncommitted transaction dropped"
            );
        }
    }
}
