//! # Feedline
//!
//! A persisted, gap-aware timeline cache that pages through a remote feed.
//!
//! ## Core Concepts
//!
//! - **Timeline entries**: ordered slots of one owner's feed, each pointing
//!   at a shared status entity
//! - **Gaps**: flags on entries below which unseen items are known to exist
//! - **Mediators**: turn scroll requests (refresh / append / prepend) into
//!   fetches and merge the results
//! - **Transactions**: every merge lands in one atomic, journaled commit
//!
//! ## Example
//!
//! ```ignore
//! use feedline::{GapMediator, LoadDirection, PagingConfig, PagingMediator, PagingState};
//! use feedline::{StoreConfig, TimelineStore, TimelineType, UserKey};
//! use std::sync::Arc;
//!
//! let store = Arc::new(TimelineStore::open_or_create(StoreConfig {
//!     path: "./cache".into(),
//!     ..Default::default()
//! })?);
//!
//! let owner = UserKey::new("42", "mastodon.social");
//! let mediator = GapMediator::new(Arc::clone(&store), owner, TimelineType::Home, api);
//! let config = PagingConfig::default();
//!
//! // Pull to refresh
//! mediator.load(LoadDirection::Refresh, &PagingState::new(&config)).await?;
//!
//! // Scrolled to the bottom
//! let state = PagingState::from_store(&store, mediator.timeline_key(), &config);
//! let result = mediator.load(LoadDirection::Append, &state).await?;
//!
//! // "Load more" tapped on a gap row
//! for gap in store.gaps(mediator.timeline_key()) {
//!     mediator.fill_gap(&gap, config.page_size).await?;
//! }
//! ```

pub mod error;
pub mod index;
pub mod journal;
pub mod mapper;
pub mod paging;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use error::{FetchError, LoadError, Result, StoreError};
pub use index::{CommitSummary, TimelineIndex};
pub use journal::{Journal, JournalFrame, JournalOp};
pub use mapper::{to_timeline_entries, to_timeline_entry, MappedEntry};
pub use paging::{
    BaseMediator, GapMediator, LoadDirection, LoadResult, PagingConfig, PagingMediator,
    PagingState, TimelineSource,
};
pub use store::{StoreConfig, TimelineStore, Transaction};
pub use subscriptions::{
    DropReason, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle, SubscriptionId,
    SubscriptionManager, TimelineEvent,
};
pub use types::*;
