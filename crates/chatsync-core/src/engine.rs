use std::sync::Arc;

use tracing::debug;

use crate::models::NotificationCenter;
use crate::repositories::SyncApi;
use crate::services::{
    MessageSurface, NavigationGuard, NavigationToken, StreamRecoveryManager, SyncManager,
    SyncOutcome,
};
use crate::settings::{SettingsResult, SyncSettings, SyncSettingsRepository};

/// Wires the sync manager, stream recovery and navigation guard together
/// around one server connection and one rendering surface.
pub struct SyncEngine {
    sync: Arc<SyncManager>,
    recovery: Arc<StreamRecoveryManager>,
    navigation: NavigationGuard,
}

impl SyncEngine {
    pub fn new(
        api: Arc<dyn SyncApi>,
        surface: Arc<dyn MessageSurface>,
        settings: SyncSettings,
    ) -> Self {
        let recovery_settings = settings.recovery.clone();
        let sync = Arc::new(SyncManager::new(api.clone(), settings));
        let recovery = Arc::new(StreamRecoveryManager::new(
            api,
            sync.clone(),
            surface,
            recovery_settings,
        ));

        Self {
            sync,
            recovery,
            navigation: NavigationGuard::new(),
        }
    }

    /// Build an engine from persisted settings
    pub async fn from_repository(
        api: Arc<dyn SyncApi>,
        surface: Arc<dyn MessageSurface>,
        repository: &dyn SyncSettingsRepository,
    ) -> SettingsResult<Self> {
        let settings = repository.load().await?;
        Ok(Self::new(api, surface, settings))
    }

    pub fn sync(&self) -> &Arc<SyncManager> {
        &self.sync
    }

    pub fn recovery(&self) -> &Arc<StreamRecoveryManager> {
        &self.recovery
    }

    pub fn navigation(&self) -> &NavigationGuard {
        &self.navigation
    }

    pub fn notifications(&self) -> &Arc<NotificationCenter> {
        self.sync.notifications()
    }

    /// Initial full sync, then background polling
    pub async fn start(&self) -> SyncOutcome {
        self.sync.start().await
    }

    pub fn shutdown(&self) {
        self.sync.stop();
    }

    /// Begin a view transition. The token is issued before the viewed
    /// selection changes, so loads started for the previous view are already stale.
    pub fn navigate_to(&self, conversation_id: Option<&str>) -> NavigationToken {
        let token = self.navigation.start_navigation();
        self.sync
            .set_viewed_conversation(conversation_id.map(str::to_string));
        debug!(token = token.value(), conversation_id = ?conversation_id, "Navigated");
        token
    }

    /// Apply the sync visibility policy, then retry every pending recovery once visible
    pub async fn on_visibility_change(&self, visible: bool) -> Option<SyncOutcome> {
        let outcome = self.sync.handle_visibility_change(visible).await;

        if visible {
            for conversation_id in self.recovery.pending_conversation_ids() {
                self.recovery.attempt_recovery(&conversation_id).await;
            }
        }

        outcome
    }

    /// Drop all client state, e.g. on sign-out
    pub fn reset(&self) {
        self.sync.reset();
        self.recovery.reset();
        self.navigation.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationSummary, RecoveryReason, ServerMessage};
    use crate::repositories::InMemorySyncApi;
    use crate::services::NullSurface;
    use crate::settings::SyncSettingsJsonRepository;
    use chrono::{DateTime, Utc};
    use std::time::Duration;
    use tempfile::TempDir;

    fn engine() -> (SyncEngine, InMemorySyncApi) {
        let api = InMemorySyncApi::new(
            DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        api.upsert_conversation(ConversationSummary {
            id: "c1".to_string(),
            title: "First".to_string(),
            model: None,
            updated_at: "2024-05-01T11:00:00Z".to_string(),
            message_count: 2,
        });
        let engine = SyncEngine::new(
            Arc::new(api.clone()),
            Arc::new(NullSurface),
            SyncSettings::default(),
        );
        (engine, api)
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigate_invalidates_previous_loads() {
        let (engine, _api) = engine();
        engine.start().await;

        let first = engine.navigate_to(Some("c1"));
        let second = engine.navigate_to(None);

        assert!(!engine.navigation().is_navigation_valid(first));
        assert!(engine.navigation().is_navigation_valid(second));
        assert_eq!(engine.sync().viewed_conversation(), None);

        let stale = engine.navigation().guarded(first, async { 42 }).await;
        assert_eq!(stale, None);
        engine.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_again_retries_pending_recovery() {
        let (engine, api) = engine();
        engine.start().await;
        engine.navigate_to(Some("c1"));
        engine.sync().set_conversation_streaming("c1", true);

        engine.on_visibility_change(false).await;
        engine.recovery().mark_stream_for_recovery(
            "c1",
            "m1",
            String::new(),
            RecoveryReason::Visibility,
        );
        api.insert_message(ServerMessage {
            id: "m1".to_string(),
            content: "finished while away".to_string(),
            ..Default::default()
        });
        tokio::time::advance(Duration::from_secs(5)).await;

        let outcome = engine.on_visibility_change(true).await;

        assert!(matches!(outcome, Some(SyncOutcome::Applied(_))));
        assert!(!engine.recovery().has_pending_recovery("c1"));
        assert!(!engine.sync().is_streaming("c1"));
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_from_repository_uses_saved_settings() {
        let dir = TempDir::new().unwrap();
        let repository = SyncSettingsJsonRepository::with_path(dir.path().join("sync.json"));
        let settings = SyncSettings {
            temp_id_prefix: "draft-".to_string(),
            ..Default::default()
        };
        repository.save(settings).await.unwrap();

        let api = InMemorySyncApi::new(Utc::now());
        let engine =
            SyncEngine::from_repository(Arc::new(api), Arc::new(NullSurface), &repository)
                .await
                .unwrap();

        let id = engine.sync().add_local_conversation("Draft", None);
        assert!(id.starts_with("draft-"));
    }

    #[tokio::test]
    async fn test_reset() {
        let (engine, _api) = engine();
        engine.start().await;
        engine.navigate_to(Some("c1"));
        engine
            .recovery()
            .mark_stream_for_recovery("c1", "m1", String::new(), RecoveryReason::Network);

        engine.reset();

        assert!(engine.sync().conversations().is_empty());
        assert!(!engine.recovery().has_pending_recovery("c1"));
        assert_eq!(engine.navigation().current().value(), 0);
    }
}
