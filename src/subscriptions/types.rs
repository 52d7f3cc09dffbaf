//! Subscription types for timeline change notifications.

use crate::types::{TimelineKey, TimelineType, UserKey};
use serde::{Deserialize, Serialize};

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 256
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            filter: SubscriptionFilter::default(),
        }
    }
}

/// Filter criteria for subscriptions. Empty fields match everything.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    /// Only timelines of this owner.
    pub owner: Option<UserKey>,

    /// Only these timeline types.
    pub timeline_types: Option<Vec<TimelineType>>,
}

impl SubscriptionFilter {
    /// Every timeline of every owner.
    pub fn all() -> Self {
        Self::default()
    }

    /// Every timeline of one owner.
    pub fn owner(owner: UserKey) -> Self {
        Self {
            owner: Some(owner),
            timeline_types: None,
        }
    }

    /// Exactly one timeline.
    pub fn timeline(key: TimelineKey) -> Self {
        Self {
            owner: Some(key.owner),
            timeline_types: Some(vec![key.timeline_type]),
        }
    }

    pub fn matches(&self, key: &TimelineKey) -> bool {
        if let Some(ref owner) = self.owner {
            if *owner != key.owner {
                return false;
            }
        }
        if let Some(ref types) = self.timeline_types {
            if !types.contains(&key.timeline_type) {
                return false;
            }
        }
        true
    }
}

/// Events emitted by subscriptions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEvent {
    /// A transaction on `key` committed.
    Merged {
        key: TimelineKey,
        upserted: usize,
        removed: usize,
        gaps_opened: usize,
        gaps_cleared: usize,
    },

    /// The journal was rewritten; contents are unchanged.
    Compacted { statuses_dropped: usize },

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

impl TimelineEvent {
    /// Encode as a JSON object tagged by `type`, for forwarding to a UI layer.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<TimelineEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<TimelineEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<TimelineEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<TimelineEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
