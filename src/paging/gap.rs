//! Gap-aware mediator.
//!
//! A fetched window that fills a whole page may not reach the data cached
//! below it, so its oldest entry is flagged as a gap. A later fetch anchored
//! at exactly that entry bridges the boundary and clears the flag. Both
//! happen inside the same transaction as the insert, so readers never see a
//! cleared flag without the bridging entries, or the reverse.

use super::mediator::{fetch, run_merge};
use super::{PagingMediator, TimelineSource};
use crate::error::{LoadError, StoreError};
use crate::mapper::{self, MappedEntry};
use crate::store::TimelineStore;
use crate::types::{StatusId, TimelineEntry, TimelineKey, TimelineType, UserKey};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Mediator that tracks gaps between fetched windows.
pub struct GapMediator<S> {
    key: TimelineKey,
    store: Arc<TimelineStore>,
    source: S,
}

impl<S: TimelineSource> GapMediator<S> {
    /// Mediator writing to `owner`'s `timeline_type` timeline.
    ///
    /// The timeline type is fixed for the mediator's lifetime, so ranges it
    /// produced are queryable independently of other feeds.
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

    /// Fetch up to `page_size` items older than `max_id` (newer than
    /// `since_id`, if given) and merge them.
    ///
    /// Returns the merged entries in fetch order. On error the store is
    /// exactly as it was before the call.
    pub async fn load_between(
        &self,
        page_size: usize,
        max_id: Option<StatusId>,
        since_id: Option<StatusId>,
    ) -> Result<Vec<TimelineEntry>, LoadError> {
        let items = fetch(&self.source, page_size, max_id.as_ref(), since_id.as_ref()).await?;
        let mapped = mapper::to_timeline_entries(&items, &self.key.owner, &self.key.timeline_type);

        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        run_merge(move || merge_window(&store, &key, page_size, max_id.as_ref(), mapped)).await
    }

    /// Load the items hidden behind a gap entry.
    pub async fn fill_gap(
        &self,
        gap: &TimelineEntry,
        page_size: usize,
    ) -> Result<Vec<TimelineEntry>, LoadError> {
        if !gap.belongs_to(&self.key) {
            return Err(StoreError::InvalidOperation(format!(
                "Gap entry of {} filled through mediator for {}",
                gap.key(),
                self.key
            ))
            .into());
        }
        self.load_between(page_size, Some(gap.status_id().clone()), None)
            .await
    }
}

/// Merge one fetched window in a single transaction.
///
/// - the cached entry at `max_id`, if any, loses its gap flag
/// - the window's oldest entry gets a gap flag iff the window filled the page
/// - all entries and their statuses are upserted
fn merge_window(
    store: &TimelineStore,
    key: &TimelineKey,
    page_size: usize,
    max_id: Option<&StatusId>,
    mapped: Vec<MappedEntry>,
) -> crate::error::Result<Vec<TimelineEntry>> {
    let mut txn = store.begin(key);

    if let Some(max_id) = max_id {
        if let Some(mut boundary) = txn.find_entry_by_status_id(max_id) {
            if boundary.is_gap {
                debug!(timeline = %key, boundary = %max_id, "bridging gap");
            }
            boundary.is_gap = false;
            txn.upsert_entries([boundary])?;
        }
    }

    let full_page = mapped.len() >= page_size;
    let mut entries = Vec::with_capacity(mapped.len());
    for MappedEntry { entry, statuses } in mapped {
        txn.upsert_statuses(statuses);
        entries.push(entry);
    }
    if let Some(last) = entries.last_mut() {
        last.is_gap = full_page;
    }

    txn.upsert_entries(entries.iter().cloned())?;
    txn.commit()?;
    Ok(entries)
}

#[async_trait]
impl<S: TimelineSource> PagingMediator for GapMediator<S> {
    fn timeline_key(&self) -> &TimelineKey {
        &self.key
    }

    async fn merge(
        &self,
        page_size: usize,
        max_id: Option<StatusId>,
    ) -> Result<Vec<TimelineEntry>, LoadError> {
        self.load_between(page_size, max_id, None).await
    }
}
