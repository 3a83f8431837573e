use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server's authoritative view of one conversation, as returned by a sync request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub model: Option<String>,
    /// RFC 3339 timestamp. Kept as received so a malformed value can be
    /// classified instead of failing the whole sync response.
    pub updated_at: String,
    #[serde(default)]
    pub message_count: u64,
}

impl ConversationSummary {
    /// Parse `updated_at`, returning `None` when the server sent something unparseable
    pub fn parsed_updated_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.updated_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Lifecycle phase of a cached conversation.
///
/// While `Streaming`, sync reconciliation must not touch the entry's title,
/// counts or external-update flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamPhase {
    #[default]
    Idle,
    Streaming,
}

/// A conversation as held in the local cache
#[derive(Clone, Debug, PartialEq)]
pub struct Conversation {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) model: Option<String>,
    pub(crate) updated_at: String,
    /// Last known *total* message count, not the size of whatever page is loaded
    pub(crate) message_count: u64,
    pub(crate) unread_count: u64,
    pub(crate) has_external_update: bool,
    pub(crate) phase: StreamPhase,
}

impl Conversation {
    /// Create a conversation from a server summary with the given unread badge
    pub fn from_summary(summary: &ConversationSummary, unread_count: u64) -> Self {
        Self {
            id: summary.id.clone(),
            title: summary.title.clone(),
            model: summary.model.clone(),
            updated_at: summary.updated_at.clone(),
            message_count: summary.message_count,
            unread_count,
            has_external_update: false,
            phase: StreamPhase::Idle,
        }
    }

    /// Create a conversation that only exists locally so far
    pub fn local(id: String, title: String, model: Option<String>) -> Self {
        Self {
            id,
            title,
            model,
            updated_at: Utc::now().to_rfc3339(),
            message_count: 0,
            unread_count: 0,
            has_external_update: false,
            phase: StreamPhase::Idle,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn updated_at(&self) -> &str {
        &self.updated_at
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn unread_count(&self) -> u64 {
        self.unread_count
    }

    pub fn has_external_update(&self) -> bool {
        self.has_external_update
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == StreamPhase::Streaming
    }
}

/// Timestamps that drive incremental sync and the pagination/new split.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncCursor {
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Captured on the first full sync only; later syncs never move it.
    pub initial_load_time: Option<DateTime<Utc>>,
}

impl SyncCursor {
    /// Record a server clock reading from a completed sync
    pub fn advance(&mut self, server_time: DateTime<Utc>, full: bool) {
        self.last_sync_time = Some(server_time);
        if full && self.initial_load_time.is_none() {
            self.initial_load_time = Some(server_time);
        }
    }
}

/// How a conversation missing from the cache is treated when a sync reveals it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arrival {
    /// Predates the initial load; scroll pagination would have shown it. No badge.
    PaginationDiscovered,
    /// Created or updated since the initial load. Badged with its full count.
    ActuallyNew,
}
