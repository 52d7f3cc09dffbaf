//! Paginated sync between a remote source and the timeline store.
//!
//! A scroll driver calls [`PagingMediator::load`] with a direction and its
//! current [`PagingState`]. The mediator decides which cursor to request,
//! fetches through a [`TimelineSource`], and merges the batch into the
//! [`TimelineStore`](crate::store::TimelineStore) in one transaction.
//!
//! Two variants exist:
//! - [`BaseMediator`] merges batches as-is
//! - [`GapMediator`] also marks and bridges gaps between fetched windows

mod gap;
mod mediator;
mod source;

pub use gap::GapMediator;
pub use mediator::{BaseMediator, PagingMediator};
pub use source::TimelineSource;

use crate::store::TimelineStore;
use crate::types::{TimelineEntry, TimelineKey};

/// Which end of the timeline a load extends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadDirection {
    /// Fetch the latest items, with no cursor.
    Refresh,
    /// Fetch items older than the last loaded one.
    Append,
    /// Fetch items newer than the first loaded one. Never fetches; newer
    /// items arrive through `Refresh`.
    Prepend,
}

/// Paging configuration.
#[derive(Clone, Debug)]
pub struct PagingConfig {
    /// Items requested per load. A batch this large is assumed to have more
    /// data behind it.
    pub page_size: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self { page_size: 20 }
    }
}

/// What the scroll driver currently shows.
#[derive(Clone, Debug)]
pub struct PagingState {
    last_item: Option<TimelineEntry>,
    page_size: usize,
}

impl PagingState {
    pub fn new(config: &PagingConfig) -> Self {
        Self {
            last_item: None,
            page_size: config.page_size,
        }
    }

    /// Set the last (oldest) entry of the loaded window.
    pub fn with_last_item(mut self, last_item: Option<TimelineEntry>) -> Self {
        self.last_item = last_item;
        self
    }

    /// State for a driver that shows the whole cached timeline.
    pub fn from_store(store: &TimelineStore, key: &TimelineKey, config: &PagingConfig) -> Self {
        Self::new(config).with_last_item(store.last_entry(key))
    }

    pub fn last_item(&self) -> Option<&TimelineEntry> {
        self.last_item.as_ref()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

/// Outcome of one load.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadResult {
    /// Merged entries in fetch order (newest first).
    pub entries: Vec<TimelineEntry>,
    /// Nothing more can be loaded in this direction.
    pub end_of_pagination: bool,
}

impl LoadResult {
    /// Result of a fetch; the end is reached exactly when it came back empty.
    pub fn fetched(entries: Vec<TimelineEntry>) -> Self {
        let end_of_pagination = entries.is_empty();
        Self {
            entries,
            end_of_pagination,
        }
    }

    /// Result of a load that did not fetch.
    pub fn end_of_pagination() -> Self {
        Self {
            entries: Vec::new(),
            end_of_pagination: true,
        }
    }
}
