//! Mapping from remote items to local timeline entries.

use crate::types::{
    RemoteStatus, SequencePosition, Status, TimelineEntry, TimelineType, UserKey,
};

/// A remote item mapped for one timeline: the entry plus every status
/// entity it references (the status itself, and the reblogged one if any).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappedEntry {
    pub entry: TimelineEntry,
    pub statuses: Vec<Status>,
}

/// Map one remote item into an entry of `owner`'s `timeline_type` timeline.
///
/// Pure and total. The entry starts without a gap flag; gap bookkeeping
/// belongs to the merge step.
pub fn to_timeline_entry(
    item: &RemoteStatus,
    owner: &UserKey,
    timeline_type: &TimelineType,
) -> MappedEntry {
    let entry = TimelineEntry {
        owner: owner.clone(),
        timeline_type: timeline_type.clone(),
        position: SequencePosition {
            created_at: item.created_at,
            status_id: item.id.clone(),
        },
        is_gap: false,
    };

    let mut statuses = Vec::with_capacity(2);
    statuses.push(to_status(item));
    if let Some(reblog) = &item.reblog {
        statuses.push(to_status(reblog));
    }

    MappedEntry { entry, statuses }
}

/// Map a fetched batch, preserving its order.
pub fn to_timeline_entries(
    items: &[RemoteStatus],
    owner: &UserKey,
    timeline_type: &TimelineType,
) -> Vec<MappedEntry> {
    items
        .iter()
        .map(|item| to_timeline_entry(item, owner, timeline_type))
        .collect()
}

fn to_status(item: &RemoteStatus) -> Status {
    Status {
        id: item.id.clone(),
        created_at: item.created_at,
        author: item.author.clone(),
        content: item.content.clone(),
        url: item.url.clone(),
        reblog_of: item.reblog.as_ref().map(|r| r.id.clone()),
    }
}
