use std::sync::Arc;
use std::time::Duration;

use chatsync_core::models::ConversationSummary;
use chatsync_core::repositories::InMemorySyncApi;
use chatsync_core::services::{SyncEvent, SyncManager};
use chatsync_core::settings::SyncSettings;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::broadcast;

async fn viewed_conversation(message_count: u64) -> (Arc<SyncManager>, InMemorySyncApi) {
    let api = InMemorySyncApi::new(
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc),
    );
    api.upsert_conversation(ConversationSummary {
        id: "c1".to_string(),
        title: "Long thread".to_string(),
        model: Some("model-1".to_string()),
        updated_at: "2024-05-01T11:00:00Z".to_string(),
        message_count,
    });

    let manager = Arc::new(SyncManager::new(
        Arc::new(api.clone()),
        SyncSettings::default(),
    ));
    manager.full_sync().await;
    manager.set_viewed_conversation(Some("c1".to_string()));
    (manager, api)
}

/// The server records the user's prompt and the assistant reply
fn server_finishes_send(api: &InMemorySyncApi, total: u64) {
    api.advance_clock(TimeDelta::seconds(5));
    api.set_message_count("c1", total);
}

fn external_updates(rx: &mut broadcast::Receiver<SyncEvent>) -> usize {
    let mut count = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, SyncEvent::ExternalUpdate { .. }) {
            count += 1;
        }
    }
    count
}

#[tokio::test]
async fn test_mark_read_with_server_total() {
    let (manager, api) = viewed_conversation(100).await;
    let mut rx = manager.subscribe();

    // Only the newest 50 messages are loaded, but the server total is 100
    manager.mark_conversation_read("c1", 100);

    manager.set_conversation_streaming("c1", true);
    server_finishes_send(&api, 102);
    manager.complete_send("c1", 2);
    manager.incremental_sync().await;

    assert_eq!(external_updates(&mut rx), 0);
    let c1 = manager.conversation("c1").unwrap();
    assert_eq!(c1.message_count(), 102);
    assert!(!c1.has_external_update());
}

#[tokio::test]
async fn test_mark_read_with_page_size_fires_false_update() {
    let (manager, api) = viewed_conversation(100).await;
    let mut rx = manager.subscribe();

    manager.mark_conversation_read("c1", 50);

    manager.set_conversation_streaming("c1", true);
    server_finishes_send(&api, 102);
    manager.complete_send("c1", 2);
    manager.incremental_sync().await;

    assert_eq!(external_updates(&mut rx), 1);
    assert!(manager.conversation("c1").unwrap().has_external_update());
}

#[tokio::test]
async fn test_clear_streaming_before_increment_fires_false_update() {
    let (manager, api) = viewed_conversation(4).await;
    let mut rx = manager.subscribe();

    manager.set_conversation_streaming("c1", true);
    server_finishes_send(&api, 6);

    manager.set_conversation_streaming("c1", false);
    // A poll lands between the two steps
    manager.incremental_sync().await;
    manager.increment_local_message_count("c1", 2);

    assert_eq!(external_updates(&mut rx), 1);
}

#[tokio::test]
async fn test_increment_before_clear_is_silent() {
    let (manager, api) = viewed_conversation(4).await;
    let mut rx = manager.subscribe();

    manager.set_conversation_streaming("c1", true);
    server_finishes_send(&api, 6);

    manager.increment_local_message_count("c1", 2);
    manager.incremental_sync().await;
    manager.set_conversation_streaming("c1", false);
    manager.incremental_sync().await;

    assert_eq!(external_updates(&mut rx), 0);
    assert_eq!(manager.conversation("c1").unwrap().message_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_complete_send_during_in_flight_sync_is_silent() {
    let (manager, api) = viewed_conversation(4).await;
    let mut rx = manager.subscribe();

    manager.set_conversation_streaming("c1", true);
    server_finishes_send(&api, 6);
    api.set_latency(Duration::from_millis(100));

    let sync = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.incremental_sync().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    // The poll's request is out; its response will report the new server count
    assert_eq!(api.sync_requests().len(), 2);

    manager.complete_send("c1", 2);
    sync.await.unwrap();
    manager.incremental_sync().await;

    assert_eq!(external_updates(&mut rx), 0);
    assert!(!manager.is_streaming("c1"));
    assert_eq!(manager.conversation("c1").unwrap().message_count(), 6);
}
