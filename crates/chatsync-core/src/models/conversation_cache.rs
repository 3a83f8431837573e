use std::collections::HashMap;

use super::conversation::{Arrival, Conversation, ConversationSummary, StreamPhase};

/// What reconciling one server summary did to an existing cache entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reconciliation {
    /// No cached entry with that id
    Missing,
    /// Entry is mid-stream; nothing was written
    StreamingExempt,
    /// Metadata refreshed, no new messages
    UpToDate,
    /// Not viewed: new messages became unread
    Unread { added: u64, unread_count: u64 },
    /// Viewed: new messages exist on the server; fire the one-shot callback
    ExternalUpdate { server_count: u64 },
    /// Viewed: already flagged, callback fired earlier
    ExternalUpdatePending,
}

/// In-memory record of every conversation the client knows about, plus
/// which one the user is currently looking at.
pub struct ConversationCache {
    conversations: HashMap<String, Conversation>,
    viewed_conversation_id: Option<String>,
}

impl ConversationCache {
    pub fn new() -> Self {
        Self {
            conversations: HashMap::new(),
            viewed_conversation_id: None,
        }
    }

    /// Add a conversation, replacing any entry with the same id
    pub fn insert(&mut self, conversation: Conversation) {
        self.conversations
            .insert(conversation.id.clone(), conversation);
    }

    /// Insert a conversation revealed by a sync. Returns the unread badge it received.
    pub fn insert_discovered(&mut self, summary: &ConversationSummary, arrival: Arrival) -> u64 {
        let unread = match arrival {
            Arrival::ActuallyNew if !self.is_viewed(&summary.id) => summary.message_count,
            _ => 0,
        };
        self.insert(Conversation::from_summary(summary, unread));
        unread
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.conversations.contains_key(id)
    }

    /// Remove a conversation. Clears the viewed selection if it pointed here.
    pub fn remove(&mut self, id: &str) -> Option<Conversation> {
        let removed = self.conversations.remove(id);
        if removed.is_some() && self.is_viewed(id) {
            self.viewed_conversation_id = None;
        }
        removed
    }

    /// Move an entry to a new id, carrying the viewed selection with it
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        let Some(mut conversation) = self.conversations.remove(from) else {
            return false;
        };
        conversation.id = to.to_string();
        self.conversations.insert(to.to_string(), conversation);
        if self.is_viewed(from) {
            self.viewed_conversation_id = Some(to.to_string());
        }
        true
    }

    pub fn set_viewed(&mut self, id: Option<String>) {
        self.viewed_conversation_id = id;
    }

    pub fn viewed_id(&self) -> Option<&str> {
        self.viewed_conversation_id.as_deref()
    }

    pub fn is_viewed(&self, id: &str) -> bool {
        self.viewed_conversation_id.as_deref() == Some(id)
    }

    pub fn is_streaming(&self, id: &str) -> bool {
        self.get(id).is_some_and(Conversation::is_streaming)
    }

    /// Toggle the sync exemption. Returns false if the conversation is unknown.
    pub fn set_streaming(&mut self, id: &str, streaming: bool) -> bool {
        let Some(conversation) = self.conversations.get_mut(id) else {
            return false;
        };
        conversation.phase = if streaming {
            StreamPhase::Streaming
        } else {
            StreamPhase::Idle
        };
        true
    }

    /// Add to the known message count, returning the new total
    pub fn increment_message_count(&mut self, id: &str, delta: u64) -> Option<u64> {
        let conversation = self.conversations.get_mut(id)?;
        conversation.message_count += delta;
        Some(conversation.message_count)
    }

    /// Finish a client-initiated send: count the added messages, then leave
    /// the streaming phase. Both happen under one borrow so no reconciliation
    /// can observe the idle phase with the stale count.
    ///
    /// Only a streaming entry is counted. A second completion of the same send
    /// (recovery finished it first) leaves the count alone.
    pub fn complete_send(&mut self, id: &str, added: u64) -> Option<u64> {
        let conversation = self.conversations.get_mut(id)?;
        if conversation.is_streaming() {
            conversation.message_count += added;
            conversation.phase = StreamPhase::Idle;
        }
        Some(conversation.message_count)
    }

    /// Overwrite the known count with the server total and clear both badges
    pub fn mark_read(&mut self, id: &str, total_count: u64) -> bool {
        let Some(conversation) = self.conversations.get_mut(id) else {
            return false;
        };
        conversation.message_count = total_count;
        conversation.unread_count = 0;
        conversation.has_external_update = false;
        true
    }

    /// Apply a server summary to an existing entry
    pub fn reconcile(&mut self, summary: &ConversationSummary) -> Reconciliation {
        let viewed = self.is_viewed(&summary.id);
        let Some(conversation) = self.conversations.get_mut(&summary.id) else {
            return Reconciliation::Missing;
        };
        if conversation.is_streaming() {
            return Reconciliation::StreamingExempt;
        }

        conversation.title = summary.title.clone();
        conversation.model = summary.model.clone();
        conversation.updated_at = summary.updated_at.clone();

        let server_count = summary.message_count;
        if server_count <= conversation.message_count {
            return Reconciliation::UpToDate;
        }

        if viewed {
            if conversation.has_external_update {
                return Reconciliation::ExternalUpdatePending;
            }
            conversation.has_external_update = true;
            return Reconciliation::ExternalUpdate { server_count };
        }

        let added = server_count - conversation.message_count;
        conversation.unread_count += added;
        conversation.message_count = server_count;
        Reconciliation::Unread {
            added,
            unread_count: conversation.unread_count,
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.conversations.keys().cloned().collect()
    }

    /// List all conversations (sorted by updated_at descending)
    pub fn list_all(&self) -> Vec<&Conversation> {
        let mut convs: Vec<&Conversation> = self.conversations.values().collect();
        convs.sort_by_key(|c| {
            std::cmp::Reverse(chrono::DateTime::parse_from_rfc3339(&c.updated_at).ok())
        });
        convs
    }

    pub fn total_unread(&self) -> u64 {
        self.conversations.values().map(|c| c.unread_count).sum()
    }

    pub fn clear(&mut self) {
        self.conversations.clear();
        self.viewed_conversation_id = None;
    }
}

impl Default for ConversationCache {
    fn default() -> Self {
        Self::new()
    }
}
