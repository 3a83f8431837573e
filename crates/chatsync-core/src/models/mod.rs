pub mod conversation;
pub mod conversation_cache;
pub mod notification;
pub mod recovery;

pub use conversation::{Arrival, Conversation, ConversationSummary, StreamPhase, SyncCursor};
pub use conversation_cache::{ConversationCache, Reconciliation};
pub use notification::{Notification, NotificationAction, NotificationCenter, NotificationLevel};
pub use recovery::{PendingRecovery, RecoveryReason, ServerMessage};
