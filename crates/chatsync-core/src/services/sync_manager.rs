use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::scheduler::ScheduledTask;
use super::visibility::VisibilityTracker;
use crate::models::{
    Arrival, Conversation, ConversationCache, ConversationSummary, Notification,
    NotificationCenter, NotificationLevel, Reconciliation, SyncCursor,
};
use crate::repositories::{SyncApi, SyncResponse};
use crate::settings::SyncSettings;

const EVENT_CAPACITY: usize = 256;

/// Events emitted by SyncManager for decoupled UI updates.
/// Each variant is tagged with `conversation_id` so subscribers can filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    ConversationAdded {
        conversation_id: String,
        unread_count: u64,
    },
    UnreadChanged {
        conversation_id: String,
        unread_count: u64,
    },
    /// The viewed conversation has messages the client has not loaded.
    /// Fires once until the conversation is marked read again.
    ExternalUpdate {
        conversation_id: String,
        server_count: u64,
    },
    ConversationDeleted {
        conversation_id: String,
        was_viewed: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SyncKind {
    Full,
    Incremental,
}

/// What one applied sync changed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub full: bool,
    pub inserted: usize,
    pub updated: usize,
    /// Skipped because they were streaming
    pub exempt: usize,
    pub removed: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied(SyncReport),
    /// Another sync was running; this request was dropped
    AlreadyInFlight,
    /// The request failed; local state is unchanged
    Failed,
}

/// Clears the in-flight flag however the sync exits
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Keeps the local conversation cache consistent with the server log.
///
/// Owns full and incremental reconciliation, unread and external-update
/// detection, the streaming exemption, deletion detection, and the
/// polling/visibility schedule. At most one sync runs at a time; a request
/// made while one is in flight is dropped, not queued.
pub struct SyncManager {
    api: Arc<dyn SyncApi>,
    settings: SyncSettings,
    cache: Mutex<ConversationCache>,
    cursor: Mutex<SyncCursor>,
    in_flight: AtomicBool,
    visibility: Arc<VisibilityTracker>,
    notifications: Arc<NotificationCenter>,
    events: broadcast::Sender<SyncEvent>,
    poller: Mutex<Option<ScheduledTask>>,
}

impl SyncManager {
    pub fn new(api: Arc<dyn SyncApi>, settings: SyncSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let notifications = Arc::new(NotificationCenter::new(settings.max_notifications));

        Self {
            api,
            settings,
            cache: Mutex::new(ConversationCache::new()),
            cursor: Mutex::new(SyncCursor::default()),
            in_flight: AtomicBool::new(false),
            visibility: Arc::new(VisibilityTracker::new()),
            notifications,
            events,
            poller: Mutex::new(None),
        }
    }

    pub fn with_notifications(mut self, notifications: Arc<NotificationCenter>) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn with_visibility(mut self, visibility: Arc<VisibilityTracker>) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn notifications(&self) -> &Arc<NotificationCenter> {
        &self.notifications
    }

    pub fn visibility(&self) -> &Arc<VisibilityTracker> {
        &self.visibility
    }

    pub fn cursor(&self) -> SyncCursor {
        *self.cursor.lock()
    }

    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.cache.lock().get(id).cloned()
    }

    /// All cached conversations, most recently updated first
    pub fn conversations(&self) -> Vec<Conversation> {
        self.cache.lock().list_all().into_iter().cloned().collect()
    }

    pub fn total_unread(&self) -> u64 {
        self.cache.lock().total_unread()
    }

    // -- Lifecycle --------------------------------------------------------

    /// Run the initial full sync, then poll incrementally on the configured interval
    pub async fn start(self: &Arc<Self>) -> SyncOutcome {
        let outcome = self.full_sync().await;
        self.schedule_polling();
        outcome
    }

    fn schedule_polling(self: &Arc<Self>) {
        let manager = Arc::downgrade(self);
        let task = ScheduledTask::every(self.settings.poll_interval(), move || {
            let manager = manager.clone();
            async move {
                let Some(manager) = manager.upgrade() else {
                    return ControlFlow::Break(());
                };
                if manager.visibility.is_hidden() {
                    debug!("Skipping poll while hidden");
                } else {
                    manager.incremental_sync().await;
                }
                ControlFlow::Continue(())
            }
        });

        // Replacing an earlier poller drops (and cancels) it
        *self.poller.lock() = Some(task);
    }

    pub fn stop(&self) {
        if self.poller.lock().take().is_some() {
            debug!("Stopped sync polling");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Forget everything: cache, cursor, visibility and the poller
    pub fn reset(&self) {
        self.stop();
        self.cache.lock().clear();
        *self.cursor.lock() = SyncCursor::default();
        self.visibility.reset();
    }

    /// Tab/app visibility changed. Coming back after a long absence forces a full sync.
    pub async fn handle_visibility_change(&self, visible: bool) -> Option<SyncOutcome> {
        if !visible {
            self.visibility.mark_hidden();
            return None;
        }

        let hidden_for = self.visibility.mark_visible();
        let outcome = if hidden_for > self.settings.full_sync_after_hidden() {
            info!(hidden_ms = hidden_for.as_millis() as u64, "Back after a long absence, forcing full sync");
            self.full_sync().await
        } else {
            self.incremental_sync().await
        };
        Some(outcome)
    }

    // -- Sync -------------------------------------------------------------

    pub async fn full_sync(&self) -> SyncOutcome {
        self.run(SyncKind::Full).await
    }

    /// Sync changes since the last cursor; without one this is a full sync
    pub async fn incremental_sync(&self) -> SyncOutcome {
        let kind = if self.cursor.lock().last_sync_time.is_some() {
            SyncKind::Incremental
        } else {
            SyncKind::Full
        };
        self.run(kind).await
    }

    async fn run(&self, kind: SyncKind) -> SyncOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(?kind, "Sync already in flight, dropping request");
            return SyncOutcome::AlreadyInFlight;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let full = kind == SyncKind::Full;
        let since = if full {
            None
        } else {
            self.cursor.lock().last_sync_time
        };

        // Entries that appear while the request is out (promoted temp ids,
        // pagination) are not in the server snapshot and must survive it.
        let known_at_request: HashSet<String> = self.cache.lock().ids().into_iter().collect();

        let response = match self.api.sync(since, full).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, full, "Conversation sync failed");
                return SyncOutcome::Failed;
            }
        };

        SyncOutcome::Applied(self.apply(response, full, &known_at_request))
    }

    fn apply(
        &self,
        response: SyncResponse,
        requested_full: bool,
        known_at_request: &HashSet<String>,
    ) -> SyncReport {
        let full = requested_full || response.is_full_sync;
        let mut report = SyncReport {
            full,
            ..Default::default()
        };
        let mut events = Vec::new();

        // The pre-sync cursor decides arrivals; this sync's clock reading is
        // only recorded afterwards.
        let cursor = *self.cursor.lock();
        {
            let mut cache = self.cache.lock();

            for summary in &response.conversations {
                match cache.reconcile(summary) {
                    Reconciliation::Missing => {
                        let arrival = if full {
                            self.classify_arrival(summary, &cursor)
                        } else {
                            Arrival::ActuallyNew
                        };
                        let unread_count = cache.insert_discovered(summary, arrival);
                        debug!(conversation_id = %summary.id, ?arrival, unread_count, "Discovered conversation");
                        report.inserted += 1;
                        events.push(SyncEvent::ConversationAdded {
                            conversation_id: summary.id.clone(),
                            unread_count,
                        });
                    }
                    Reconciliation::StreamingExempt => {
                        debug!(conversation_id = %summary.id, "Streaming, leaving cached entry alone");
                        report.exempt += 1;
                    }
                    Reconciliation::UpToDate | Reconciliation::ExternalUpdatePending => {
                        report.updated += 1;
                    }
                    Reconciliation::Unread { unread_count, .. } => {
                        report.updated += 1;
                        events.push(SyncEvent::UnreadChanged {
                            conversation_id: summary.id.clone(),
                            unread_count,
                        });
                    }
                    Reconciliation::ExternalUpdate { server_count } => {
                        report.updated += 1;
                        events.push(SyncEvent::ExternalUpdate {
                            conversation_id: summary.id.clone(),
                            server_count,
                        });
                    }
                }
            }

            if full {
                let on_server: HashSet<&str> = response
                    .conversations
                    .iter()
                    .map(|c| c.id.as_str())
                    .collect();

                for id in cache.ids() {
                    if on_server.contains(id.as_str())
                        || !known_at_request.contains(&id)
                        || self.settings.is_temp_id(&id)
                        || cache.is_streaming(&id)
                    {
                        continue;
                    }

                    let was_viewed = cache.is_viewed(&id);
                    cache.remove(&id);
                    if was_viewed {
                        info!(conversation_id = %id, "Viewed conversation was deleted elsewhere");
                        self.notifications.add(
                            Notification::new(
                                NotificationLevel::Warning,
                                "This conversation was deleted",
                            )
                            .for_conversation(&id),
                        );
                    }
                    events.push(SyncEvent::ConversationDeleted {
                        conversation_id: id.clone(),
                        was_viewed,
                    });
                    report.removed.push(id);
                }
            }
        }

        self.cursor.lock().advance(response.server_time, full);

        debug!(
            full,
            inserted = report.inserted,
            updated = report.updated,
            exempt = report.exempt,
            removed = report.removed.len(),
            "Sync applied"
        );

        for event in events {
            // No subscribers is fine
            let _ = self.events.send(event);
        }

        report
    }

    /// Tell a newly seen conversation from one scroll pagination would reveal.
    /// Anything undecidable (no initial load yet, bad timestamp) counts as paginated.
    fn classify_arrival(&self, summary: &ConversationSummary, cursor: &SyncCursor) -> Arrival {
        let (Some(initial_load), Some(updated_at)) =
            (cursor.initial_load_time, summary.parsed_updated_at())
        else {
            return Arrival::PaginationDiscovered;
        };

        let boundary = initial_load
            .checked_sub_signed(self.settings.pagination_buffer())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        if updated_at < boundary {
            Arrival::PaginationDiscovered
        } else {
            Arrival::ActuallyNew
        }
    }

    // -- Local mutations --------------------------------------------------

    /// Add rows revealed by scroll pagination. Existing entries are left alone.
    pub fn add_paginated(&self, summaries: &[ConversationSummary]) -> usize {
        let mut cache = self.cache.lock();
        let mut added = 0;
        for summary in summaries {
            if !cache.contains(&summary.id) {
                cache.insert_discovered(summary, Arrival::PaginationDiscovered);
                added += 1;
            }
        }
        added
    }

    /// Create a conversation that exists only locally until the server assigns an id
    pub fn add_local_conversation(&self, title: &str, model: Option<&str>) -> String {
        let id = format!("{}{}", self.settings.temp_id_prefix, Uuid::new_v4());
        self.cache.lock().insert(Conversation::local(
            id.clone(),
            title.to_string(),
            model.map(str::to_string),
        ));
        debug!(conversation_id = %id, "Created local conversation");
        id
    }

    /// Re-key a local conversation under its server id
    pub fn promote_local_conversation(&self, temp_id: &str, real_id: &str) -> bool {
        let promoted = self.cache.lock().rename(temp_id, real_id);
        if promoted {
            debug!(temp_id = %temp_id, conversation_id = %real_id, "Promoted local conversation");
        }
        promoted
    }

    /// Which conversation the user is looking at, if any
    pub fn set_viewed_conversation(&self, id: Option<String>) {
        self.cache.lock().set_viewed(id);
    }

    pub fn viewed_conversation(&self) -> Option<String> {
        self.cache.lock().viewed_id().map(str::to_string)
    }

    /// Set the known count to the server's *total* (never the loaded page size) and clear badges
    pub fn mark_conversation_read(&self, id: &str, total_count: u64) -> bool {
        self.cache.lock().mark_read(id, total_count)
    }

    pub fn increment_local_message_count(&self, id: &str, delta: u64) -> Option<u64> {
        self.cache.lock().increment_message_count(id, delta)
    }

    /// Toggle the sync exemption.
    ///
    /// When a send completes, increment the count before clearing this flag,
    /// or use `complete_send` which does both atomically.
    pub fn set_conversation_streaming(&self, id: &str, streaming: bool) -> bool {
        let found = self.cache.lock().set_streaming(id, streaming);
        if !found {
            warn!(conversation_id = %id, streaming, "Streaming flag set on unknown conversation");
        }
        found
    }

    /// Count the messages a finished send added, then leave the streaming phase.
    /// Does nothing but report the count if the send was already completed.
    pub fn complete_send(&self, id: &str, added: u64) -> Option<u64> {
        self.cache.lock().complete_send(id, added)
    }

    pub fn is_streaming(&self, id: &str) -> bool {
        self.cache.lock().is_streaming(id)
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        self.stop();
    }
}
