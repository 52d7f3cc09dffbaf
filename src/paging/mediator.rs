//! Direction dispatch shared by all mediators, and the gap-unaware variant.

use super::{LoadDirection, LoadResult, PagingState, TimelineSource};
use crate::error::{LoadError, StoreError};
use crate::mapper::{self, MappedEntry};
use crate::store::TimelineStore;
use crate::types::{RemoteStatus, StatusId, TimelineEntry, TimelineKey, TimelineType, UserKey};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Loads pages of one timeline on behalf of a scroll driver.
#[async_trait]
pub trait PagingMediator: Send + Sync {
    /// The timeline this mediator writes to.
    fn timeline_key(&self) -> &TimelineKey;

    /// Fetch up to `page_size` items older than `max_id` and merge them.
    /// Returns the merged entries in fetch order.
    async fn merge(
        &self,
        page_size: usize,
        max_id: Option<StatusId>,
    ) -> Result<Vec<TimelineEntry>, LoadError>;

    /// Handle one load request.
    ///
    /// `Append` without a last item and every `Prepend` report the end of
    /// pagination without fetching. Failures come back as [`LoadError`]
    /// with the store untouched.
    async fn load(
        &self,
        direction: LoadDirection,
        state: &PagingState,
    ) -> Result<LoadResult, LoadError> {
        let max_id = match direction {
            LoadDirection::Refresh => None,
            LoadDirection::Prepend => return Ok(LoadResult::end_of_pagination()),
            LoadDirection::Append => match state.last_item() {
                Some(last) => Some(last.status_id().clone()),
                None => return Ok(LoadResult::end_of_pagination()),
            },
        };

        debug!(
            timeline = %self.timeline_key(),
            ?direction,
            max_id = ?max_id,
            page_size = state.page_size(),
            "loading page"
        );

        match self.merge(state.page_size(), max_id).await {
            Ok(entries) => Ok(LoadResult::fetched(entries)),
            Err(e) => {
                warn!(timeline = %self.timeline_key(), ?direction, error = %e, "load failed");
                Err(e)
            }
        }
    }
}

/// Fetch through `source`, reporting failures as [`LoadError::Transport`].
pub(crate) async fn fetch<S: TimelineSource + ?Sized>(
    source: &S,
    page_size: usize,
    max_id: Option<&StatusId>,
    since_id: Option<&StatusId>,
) -> Result<Vec<RemoteStatus>, LoadError> {
    let items = source.fetch_between(page_size, max_id, since_id).await?;
    debug!(requested = page_size, fetched = items.len(), "fetched batch");
    Ok(items)
}

/// Run a merge on the blocking pool.
///
/// The closure runs to completion even if the awaiting task is cancelled,
/// so a merge either commits in full or not at all.
pub(crate) async fn run_merge<F>(merge: F) -> Result<Vec<TimelineEntry>, LoadError>
where
    F: FnOnce() -> crate::error::Result<Vec<TimelineEntry>> + Send + 'static,
{
    tokio::task::spawn_blocking(merge)
        .await
        .map_err(|e| StoreError::Transaction(format!("merge task failed: {}", e)))?
        .map_err(LoadError::Transaction)
}

/// Mediator that merges fetched batches without gap bookkeeping.
///
/// The window's oldest entry keeps a gap flag it already had; entries inside
/// the window never carry one.
pub struct BaseMediator<S> {
    key: TimelineKey,
    store: Arc<TimelineStore>,
    source: S,
}

impl<S: TimelineSource> BaseMediator<S> {
    pub fn new(
        store: Arc<TimelineStore>,
        owner: UserKey,
        timeline_type: TimelineType,
        source: S,
    ) -> Self {
        Self {
            key: TimelineKey::new(owner, timeline_type),
            store,
            source,
        }
    }
}

#[async_trait]
impl<S: TimelineSource> PagingMediator for BaseMediator<S> {
    fn timeline_key(&self) -> &TimelineKey {
        &self.key
    }

    async fn merge(
        &self,
        page_size: usize,
        max_id: Option<StatusId>,
    ) -> Result<Vec<TimelineEntry>, LoadError> {
        let items = fetch(&self.source, page_size, max_id.as_ref(), None).await?;
        let mapped = mapper::to_timeline_entries(&items, &self.key.owner, &self.key.timeline_type);

        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        run_merge(move || {
            let mut txn = store.begin(&key);
            let mut entries = Vec::with_capacity(mapped.len());
            for MappedEntry { entry, statuses } in mapped {
                txn.upsert_statuses(statuses);
                entries.push(entry);
            }
            // Only the window's oldest entry may border unseen items.
            if let Some(last) = entries.last_mut() {
                if let Some(existing) = txn.find_entry_by_status_id(last.status_id()) {
                    last.is_gap = existing.is_gap;
                }
            }
            txn.upsert_entries(entries.iter().cloned())?;
            txn.commit()?;
            Ok(entries)
        })
        .await
    }
}
