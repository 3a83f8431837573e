use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::Shared;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::message_surface::{MessageSurface, resolve_anchor};
use super::sync_manager::SyncManager;
use crate::models::{
    Notification, NotificationAction, NotificationLevel, PendingRecovery, RecoveryReason,
    ServerMessage,
};
use crate::repositories::{BoxFuture, SyncApi};
use crate::settings::RecoverySettings;

type RecoveryAttempt = Shared<BoxFuture<'static, bool>>;

enum FetchResult {
    Found(ServerMessage),
    /// Every attempt failed
    Exhausted,
    /// The pending entry was cleared while we were waiting
    Abandoned,
}

/// Recovers streamed responses that were interrupted (tab hidden, network drop,
/// stalled stream) by fetching the canonical message from the server.
///
/// At most one pending entry exists per conversation and at most one recovery
/// runs per conversation; concurrent callers share its result.
pub struct StreamRecoveryManager {
    api: Arc<dyn SyncApi>,
    sync: Arc<SyncManager>,
    surface: Arc<dyn MessageSurface>,
    settings: RecoverySettings,
    pending: Mutex<HashMap<String, PendingRecovery>>,
    /// conversation id -> (message id, when it was recovered)
    recently_recovered: Mutex<HashMap<String, (String, Instant)>>,
    in_flight: Mutex<HashMap<String, RecoveryAttempt>>,
}

impl StreamRecoveryManager {
    pub fn new(
        api: Arc<dyn SyncApi>,
        sync: Arc<SyncManager>,
        surface: Arc<dyn MessageSurface>,
        settings: RecoverySettings,
    ) -> Self {
        Self {
            api,
            sync,
            surface,
            settings,
            pending: Mutex::new(HashMap::new()),
            recently_recovered: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Register an interrupted stream.
    ///
    /// Repeated marks for the same conversation merge into the existing entry:
    /// the reason only escalates and the expected message id never changes.
    /// Returns false if the mark was ignored because that message was just recovered.
    pub fn mark_stream_for_recovery(
        &self,
        conversation_id: &str,
        expected_message_id: &str,
        captured_content: String,
        reason: RecoveryReason,
    ) -> bool {
        if let Some((message_id, recovered_at)) = self.recently_recovered.lock().get(conversation_id)
            && message_id == expected_message_id
            && recovered_at.elapsed() < self.settings.mark_debounce()
        {
            debug!(conversation_id = %conversation_id, message_id = %expected_message_id, "Ignoring mark for a just-recovered message");
            return false;
        }

        let mut pending = self.pending.lock();
        match pending.get_mut(conversation_id) {
            Some(entry) => {
                if entry.expected_message_id != expected_message_id {
                    debug!(
                        conversation_id = %conversation_id,
                        kept = %entry.expected_message_id,
                        ignored = %expected_message_id,
                        "Keeping first expected message id"
                    );
                }
                entry.merge(captured_content, reason);
            }
            None => {
                info!(conversation_id = %conversation_id, message_id = %expected_message_id, ?reason, "Marked stream for recovery");
                pending.insert(
                    conversation_id.to_string(),
                    PendingRecovery::new(
                        conversation_id.to_string(),
                        expected_message_id.to_string(),
                        captured_content,
                        reason,
                    ),
                );
            }
        }
        true
    }

    pub fn has_pending_recovery(&self, conversation_id: &str) -> bool {
        self.pending.lock().contains_key(conversation_id)
    }

    pub fn get_pending_recovery(&self, conversation_id: &str) -> Option<PendingRecovery> {
        self.pending.lock().get(conversation_id).cloned()
    }

    pub fn pending_conversation_ids(&self) -> Vec<String> {
        self.pending.lock().keys().cloned().collect()
    }

    /// Drop the pending entry and forget any recent recovery, so the next mark is accepted.
    /// A recovery already running for it gives up at its next check.
    pub fn clear_pending_recovery(&self, conversation_id: &str) -> Option<PendingRecovery> {
        self.recently_recovered.lock().remove(conversation_id);
        self.pending.lock().remove(conversation_id)
    }

    pub fn reset(&self) {
        self.pending.lock().clear();
        self.recently_recovered.lock().clear();
        self.in_flight.lock().clear();
    }

    /// Try to recover the pending stream for `conversation_id`.
    ///
    /// Returns true if the canonical message was fetched and applied. A call
    /// made while a recovery for the same conversation is running awaits that
    /// recovery instead of starting another.
    pub async fn attempt_recovery(self: &Arc<Self>, conversation_id: &str) -> bool {
        let attempt = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(conversation_id) {
                Some(attempt) => {
                    debug!(conversation_id = %conversation_id, "Joining in-flight recovery");
                    attempt.clone()
                }
                None => {
                    let manager = Arc::clone(self);
                    let id = conversation_id.to_string();
                    let run: BoxFuture<'static, bool> = Box::pin(async move {
                        let recovered = manager.run_recovery(&id).await;
                        manager.in_flight.lock().remove(&id);
                        recovered
                    });
                    let attempt = run.shared();
                    in_flight.insert(conversation_id.to_string(), attempt.clone());
                    attempt
                }
            }
        };

        attempt.await
    }

    async fn run_recovery(&self, conversation_id: &str) -> bool {
        let Some(pending) = self.get_pending_recovery(conversation_id) else {
            debug!(conversation_id = %conversation_id, "Nothing to recover");
            return false;
        };

        if pending.reason == RecoveryReason::Visibility {
            let hidden_for = self.sync.visibility().hidden_duration();
            if hidden_for < self.settings.min_hidden() {
                debug!(
                    conversation_id = %conversation_id,
                    hidden_ms = hidden_for.as_millis() as u64,
                    "Hidden too briefly to need recovery"
                );
                return false;
            }
        }

        if let Some(entry) = self.pending.lock().get_mut(conversation_id) {
            entry.last_attempt_time = Some(Instant::now());
        }

        self.surface.set_recovering(conversation_id, true);
        let fetched = self
            .fetch_with_retry(conversation_id, &pending.expected_message_id)
            .await;
        self.surface.set_recovering(conversation_id, false);

        match fetched {
            FetchResult::Found(message) => {
                self.apply_recovered(&pending, message).await;
                true
            }
            FetchResult::Exhausted => {
                self.give_up(&pending);
                false
            }
            FetchResult::Abandoned => false,
        }
    }

    async fn fetch_with_retry(&self, conversation_id: &str, message_id: &str) -> FetchResult {
        let delays = self.settings.retry_delays();
        let max_attempts = self.settings.max_attempts();
        let mut attempt = 0;

        loop {
            let result = self.api.fetch_message(message_id).await;
            if !self.has_pending_recovery(conversation_id) {
                debug!(conversation_id = %conversation_id, "Recovery cleared while fetching");
                return FetchResult::Abandoned;
            }

            match result {
                Ok(message) => return FetchResult::Found(message),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = delays[attempt];
                    attempt += 1;
                    debug!(
                        conversation_id = %conversation_id,
                        message_id = %message_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Recovery fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    if !self.has_pending_recovery(conversation_id) {
                        return FetchResult::Abandoned;
                    }
                }
                Err(e) => {
                    warn!(
                        conversation_id = %conversation_id,
                        message_id = %message_id,
                        attempts = attempt + 1,
                        error = %e,
                        "Stream recovery failed"
                    );
                    return FetchResult::Exhausted;
                }
            }
        }
    }

    async fn apply_recovered(&self, pending: &PendingRecovery, message: ServerMessage) {
        let conversation_id = pending.conversation_id.as_str();

        if self.sync.viewed_conversation().as_deref() == Some(conversation_id) {
            match resolve_anchor(
                self.surface.as_ref(),
                conversation_id,
                &pending.expected_message_id,
            ) {
                Some(anchor) => {
                    debug!(conversation_id = %conversation_id, ?anchor, "Finalizing recovered message in place");
                    self.surface.finalize(&anchor, &message);
                }
                None => self.surface.append(conversation_id, &message),
            }
        }

        if !message.has_payload() {
            warn!(conversation_id = %conversation_id, message_id = %message.id, "Recovered message is empty");
            self.sync.notifications().add(
                Notification::new(
                    NotificationLevel::Warning,
                    "The recovered response may be incomplete",
                )
                .for_conversation(conversation_id),
            );
        }

        // The normal completion path never ran; count the send before leaving
        // the streaming phase so the next sync sees no phantom update.
        if self.sync.is_streaming(conversation_id) {
            self.sync
                .complete_send(conversation_id, self.settings.messages_per_send);
        }

        self.settle(conversation_id, Some(&pending.expected_message_id));
        info!(conversation_id = %conversation_id, message_id = %pending.expected_message_id, "Recovered interrupted stream");

        self.sync.incremental_sync().await;
    }

    fn give_up(&self, pending: &PendingRecovery) {
        let conversation_id = pending.conversation_id.as_str();
        self.settle(conversation_id, None);

        if self.sync.is_streaming(conversation_id) {
            self.sync.set_conversation_streaming(conversation_id, false);
        }

        self.sync.notifications().add(
            Notification::new(
                NotificationLevel::Error,
                "Could not recover the interrupted response. Reload to see the latest messages.",
            )
            .for_conversation(conversation_id)
            .with_action(NotificationAction::Reload)
            .persistent(),
        );
    }

    fn settle(&self, conversation_id: &str, recovered_message_id: Option<&str>) {
        self.pending.lock().remove(conversation_id);
        if let Some(message_id) = recovered_message_id {
            self.recently_recovered.lock().insert(
                conversation_id.to_string(),
                (message_id.to_string(), Instant::now()),
            );
        }
    }
}
