use crate::models::ServerMessage;

/// A rendered node a recovered message can be written into
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageAnchor {
    /// The live streaming handle is still attached
    LiveStream { conversation_id: String },
    /// A streaming or incomplete placeholder whose handle was lost
    Placeholder { node_id: String },
    /// A node already addressed by the message id
    Message { message_id: String },
}

/// Rendering collaborator for stream recovery.
///
/// Implemented by whatever draws the conversation view. Lookups are asked in
/// priority order (live stream, orphaned placeholder, message id) and the first
/// hit is finalized in place; only when all miss is a new node appended.
pub trait MessageSurface: Send + Sync {
    fn live_stream(&self, conversation_id: &str) -> Option<MessageAnchor>;

    fn orphaned_placeholder(&self, conversation_id: &str) -> Option<MessageAnchor>;

    fn message_node(&self, message_id: &str) -> Option<MessageAnchor>;

    /// Replace the anchor's content with the canonical message and end any streaming state
    fn finalize(&self, anchor: &MessageAnchor, message: &ServerMessage);

    fn append(&self, conversation_id: &str, message: &ServerMessage);

    /// Show or hide the transient "recovering" indicator
    fn set_recovering(&self, conversation_id: &str, recovering: bool);
}

/// Surface for headless use: nothing is rendered, every lookup misses
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSurface;

impl MessageSurface for NullSurface {
    fn live_stream(&self, _conversation_id: &str) -> Option<MessageAnchor> {
        None
    }

    fn orphaned_placeholder(&self, _conversation_id: &str) -> Option<MessageAnchor> {
        None
    }

    fn message_node(&self, _message_id: &str) -> Option<MessageAnchor> {
        None
    }

    fn finalize(&self, _anchor: &MessageAnchor, _message: &ServerMessage) {}

    fn append(&self, _conversation_id: &str, _message: &ServerMessage) {}

    fn set_recovering(&self, _conversation_id: &str, _recovering: bool) {}
}

/// Resolve the node a recovered message belongs in, by priority
pub fn resolve_anchor(
    surface: &dyn MessageSurface,
    conversation_id: &str,
    message_id: &str,
) -> Option<MessageAnchor> {
    surface
        .live_stream(conversation_id)
        .or_else(|| surface.orphaned_placeholder(conversation_id))
        .or_else(|| surface.message_node(message_id))
}
