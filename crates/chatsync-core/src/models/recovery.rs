use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Why a stream was marked for recovery, ordered by severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryReason {
    /// The tab/app was hidden while the response streamed
    Visibility,
    /// The connection dropped mid-stream
    Network,
    /// The stream stopped producing data
    Timeout,
}

/// A streamed response that was interrupted and still needs its final message
#[derive(Clone, Debug, PartialEq)]
pub struct PendingRecovery {
    pub conversation_id: String,
    /// Fixed at first mark; later marks never change it
    pub expected_message_id: String,
    pub captured_content: String,
    pub reason: RecoveryReason,
    pub last_attempt_time: Option<Instant>,
}

impl PendingRecovery {
    pub fn new(
        conversation_id: String,
        expected_message_id: String,
        captured_content: String,
        reason: RecoveryReason,
    ) -> Self {
        Self {
            conversation_id,
            expected_message_id,
            captured_content,
            reason,
            last_attempt_time: None,
        }
    }

    /// Fold a repeated mark into this entry: severity only goes up, identity stays
    pub fn merge(&mut self, captured_content: String, reason: RecoveryReason) {
        self.reason = self.reason.max(reason);
        if !captured_content.is_empty() {
            self.captured_content = captured_content;
        }
    }
}

/// Canonical message as stored by the server
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub files: Vec<serde_json::Value>,
    #[serde(default)]
    pub generated_images: Vec<String>,
}

impl ServerMessage {
    /// True if the message carries text, files or generated media
    pub fn has_payload(&self) -> bool {
        !self.content.trim().is_empty() || !self.files.is_empty() || !self.generated_images.is_empty()
    }
}
