//! Core types for the timeline cache.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identity of the account that owns a timeline.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserKey {
    /// Account id on its host.
    pub id: String,
    /// Host the account lives on (e.g. `mastodon.social`).
    pub host: String,
}

impl UserKey {
    pub fn new(id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
        }
    }
}

impl fmt::Debug for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserKey({}@{})", self.id, self.host)
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.host)
    }
}

/// Classification of an independent feed.
///
/// Gap state is tracked per timeline type, so a home timeline and a
/// mentions timeline of the same owner never share boundaries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimelineType {
    Home,
    Mentions,
    /// A search, list or user timeline, named by its paging key
    /// (e.g. `list:42` or `search:rust`).
    Custom(String),
}

impl fmt::Display for TimelineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineType::Home => write!(f, "home"),
            TimelineType::Mentions => write!(f, "mentions"),
            TimelineType::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

/// Scope of one timeline: an owner plus a timeline type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimelineKey {
    pub owner: UserKey,
    pub timeline_type: TimelineType,
}

impl TimelineKey {
    pub fn new(owner: UserKey, timeline_type: TimelineType) -> Self {
        Self {
            owner,
            timeline_type,
        }
    }
}

impl fmt::Display for TimelineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.timeline_type)
    }
}

/// Native id of a status on its source platform.
///
/// Ids made only of ASCII digits (snowflakes) compare numerically and sort
/// before any non-numeric id; everything else compares bytewise.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusId(pub String);

impl StatusId {
    pub fn new(id: impl Into<String>) -> Self {
        StatusId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric_digits(&self) -> Option<&str> {
        let s = self.0.as_str();
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            Some(s.trim_start_matches('0'))
        } else {
            None
        }
    }
}

impl Ord for StatusId {
    fn cmp(&self, other: &Self) -> Ordering {
        let ordering = match (self.numeric_digits(), other.numeric_digits()) {
            (Some(a), Some(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        // Raw comparison keeps Ord consistent with Eq ("007" != "7").
        ordering.then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for StatusId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for StatusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusId({})", self.0)
    }
}

impl fmt::Display for StatusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StatusId {
    fn from(s: &str) -> Self {
        StatusId(s.to_string())
    }
}

impl From<String> for StatusId {
    fn from(s: String) -> Self {
        StatusId(s)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }

    pub fn from_millis(millis: i64) -> Self {
        Timestamp(millis.saturating_mul(1000))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Ordering key of a timeline entry.
///
/// Derived from the referenced status: creation time first, native id as
/// the tie breaker, so two distinct statuses never share a position.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequencePosition {
    pub created_at: Timestamp,
    pub status_id: StatusId,
}

impl fmt::Debug for SequencePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pos({}, {})", self.created_at.0, self.status_id)
    }
}

/// A status item as decoded by the fetch collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub id: StatusId,
    pub created_at: Timestamp,
    /// Author's account on the source platform.
    pub author: UserKey,
    pub content: String,
    pub url: Option<String>,
    /// The boosted/retweeted status, when this item is a reblog.
    pub reblog: Option<Box<RemoteStatus>>,
}

impl RemoteStatus {
    pub fn new(
        id: impl Into<StatusId>,
        created_at: Timestamp,
        author: UserKey,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            created_at,
            author,
            content: content.into(),
            url: None,
            reblog: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_reblog(mut self, reblog: RemoteStatus) -> Self {
        self.reblog = Some(Box::new(reblog));
        self
    }
}

/// A status entity in the shared status table.
///
/// Owned by no timeline; any number of entries may reference it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: StatusId,
    pub created_at: Timestamp,
    pub author: UserKey,
    pub content: String,
    pub url: Option<String>,
    pub reblog_of: Option<StatusId>,
}

/// One slot in an owner's ordered feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub owner: UserKey,
    pub timeline_type: TimelineType,
    pub position: SequencePosition,
    /// More items exist between this entry and the next older one that
    /// have not been fetched yet.
    pub is_gap: bool,
}

impl TimelineEntry {
    /// The referenced status.
    pub fn status_id(&self) -> &StatusId {
        &self.position.status_id
    }

    pub fn key(&self) -> TimelineKey {
        TimelineKey::new(self.owner.clone(), self.timeline_type.clone())
    }

    pub fn belongs_to(&self, key: &TimelineKey) -> bool {
        self.owner == key.owner && self.timeline_type == key.timeline_type
    }
}

/// A timeline entry joined with its status, as rendered by a reader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimelineRow {
    pub entry: TimelineEntry,
    pub status: Status,
}

/// Store statistics.
#[derive(Clone, Debug, Default)]
pub struct StoreStats {
    pub timeline_count: u64,
    pub entry_count: u64,
    pub status_count: u64,
    pub gap_count: u64,
    pub journal_size_bytes: u64,
}
