//! Change notifications for committed timeline merges.
//!
//! A scroll driver subscribes to the timelines it renders and re-reads
//! rows whenever a merge lands:
//! - `Merged` after every successful commit touching a matching timeline
//! - `Compacted` after the journal was rewritten
//!
//! Subscribers read from bounded buffers; a subscriber that falls behind
//! is dropped instead of stalling commits.
//!
//! # Example
//!
//! ```ignore
//! let handle = store.subscribe(SubscriptionConfig {
//!     filter: SubscriptionFilter::timeline(key.clone()),
//!     ..Default::default()
//! });
//!
//! while let Ok(event) = handle.recv() {
//!     match event {
//!         TimelineEvent::Merged { key, .. } => redraw(&store.rows(&key, None, 50)),
//!         TimelineEvent::Dropped { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle, SubscriptionId,
    TimelineEvent,
};
