//! The fetch collaborator.

use crate::error::FetchError;
use crate::types::{RemoteStatus, StatusId};
use async_trait::async_trait;
use std::sync::Arc;

/// Remote timeline the engine pages through.
///
/// Implementations wrap a platform API. Items must come back newest first
/// with no duplicates inside one batch; malformed items are dropped here,
/// not by the engine.
#[async_trait]
pub trait TimelineSource: Send + Sync {
    /// Up to `page_size` items strictly older than `max_id` (latest items
    /// when `None`) and strictly newer than `since_id` when given.
    async fn fetch_between(
        &self,
        page_size: usize,
        max_id: Option<&StatusId>,
        since_id: Option<&StatusId>,
    ) -> Result<Vec<RemoteStatus>, FetchError>;
}

#[async_trait]
impl<T: TimelineSource + ?Sized> TimelineSource for Arc<T> {
    async fn fetch_between(
        &self,
        page_size: usize,
        max_id: Option<&StatusId>,
        since_id: Option<&StatusId>,
    ) -> Result<Vec<RemoteStatus>, FetchError> {
        (**self).fetch_between(page_size, max_id, since_id).await
    }
}
