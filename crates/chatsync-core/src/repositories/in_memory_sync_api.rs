use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

use super::error::{ApiError, ApiResult};
use super::sync_api::{BoxFuture, SyncApi, SyncResponse};
use crate::models::{ConversationSummary, ServerMessage};

/// One recorded call to `SyncApi::sync`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncRequest {
    pub since: Option<DateTime<Utc>>,
    pub full: bool,
}

struct ServerState {
    conversations: BTreeMap<String, ConversationSummary>,
    messages: HashMap<String, ServerMessage>,
    server_time: DateTime<Utc>,
    latency: Duration,
    failing_syncs: usize,
    missing_fetches: usize,
    sync_requests: Vec<SyncRequest>,
    fetch_requests: Vec<String>,
}

/// In-process sync server.
/// Useful for testing and offline development.
#[derive(Clone)]
pub struct InMemorySyncApi {
    state: Arc<Mutex<ServerState>>,
}

impl InMemorySyncApi {
    pub fn new(server_time: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                conversations: BTreeMap::new(),
                messages: HashMap::new(),
                server_time,
                latency: Duration::ZERO,
                failing_syncs: 0,
                missing_fetches: 0,
                sync_requests: Vec::new(),
                fetch_requests: Vec::new(),
            })),
        }
    }

    /// Insert or replace a conversation row
    pub fn upsert_conversation(&self, summary: ConversationSummary) {
        self.state
            .lock()
            .conversations
            .insert(summary.id.clone(), summary);
    }

    /// Record new messages on the server side, stamping the row with the server clock
    pub fn set_message_count(&self, id: &str, message_count: u64) {
        let mut state = self.state.lock();
        let now = state.server_time.to_rfc3339();
        if let Some(row) = state.conversations.get_mut(id) {
            row.message_count = message_count;
            row.updated_at = now;
        }
    }

    pub fn remove_conversation(&self, id: &str) {
        self.state.lock().conversations.remove(id);
    }

    pub fn insert_message(&self, message: ServerMessage) {
        self.state
            .lock()
            .messages
            .insert(message.id.clone(), message);
    }

    pub fn server_time(&self) -> DateTime<Utc> {
        self.state.lock().server_time
    }

    pub fn advance_clock(&self, delta: TimeDelta) {
        let mut state = self.state.lock();
        state.server_time += delta;
    }

    /// Delay every response by `latency` (tokio clock)
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Make the next `count` sync requests fail with a 503
    pub fn fail_next_syncs(&self, count: usize) {
        self.state.lock().failing_syncs = count;
    }

    /// Answer the next `count` message fetches with not-found, regardless of the table
    pub fn miss_next_fetches(&self, count: usize) {
        self.state.lock().missing_fetches = count;
    }

    pub fn sync_requests(&self) -> Vec<SyncRequest> {
        self.state.lock().sync_requests.clone()
    }

    pub fn fetch_requests(&self) -> Vec<String> {
        self.state.lock().fetch_requests.clone()
    }
}

impl SyncApi for InMemorySyncApi {
    fn sync(
        &self,
        since: Option<DateTime<Utc>>,
        full: bool,
    ) -> BoxFuture<'static, ApiResult<SyncResponse>> {
        let latency = {
            let mut state = self.state.lock();
            state.sync_requests.push(SyncRequest { since, full });
            state.latency
        };
        let state = self.state.clone();

        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            let mut state = state.lock();
            if state.failing_syncs > 0 {
                state.failing_syncs -= 1;
                return Err(ApiError::ServerError { status: 503 });
            }

            let conversations = state
                .conversations
                .values()
                .filter(|row| match (full, since) {
                    (false, Some(since)) => row.parsed_updated_at().is_some_and(|t| t >= since),
                    _ => true,
                })
                .cloned()
                .collect();

            Ok(SyncResponse {
                conversations,
                server_time: state.server_time,
                is_full_sync: full,
            })
        })
    }

    fn fetch_message(&self, message_id: &str) -> BoxFuture<'static, ApiResult<ServerMessage>> {
        let latency = {
            let mut state = self.state.lock();
            state.fetch_requests.push(message_id.to_string());
            state.latency
        };
        let state = self.state.clone();
        let message_id = message_id.to_string();

        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            let mut state = state.lock();
            if state.missing_fetches > 0 {
                state.missing_fetches -= 1;
                return Err(ApiError::NotFound(message_id));
            }

            state
                .messages
                .get(&message_id)
                .cloned()
                .ok_or(ApiError::NotFound(message_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, updated_at: &str) -> ConversationSummary {
        ConversationSummary {
            id: id.to_string(),
            title: id.to_string(),
            model: None,
            updated_at: updated_at.to_string(),
            message_count: 1,
        }
    }

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_incremental_filters_by_since() {
        let api = InMemorySyncApi::new(at("2024-05-01T12:00:00Z"));
        api.upsert_conversation(row("old", "2024-05-01T09:00:00Z"));
        api.upsert_conversation(row("recent", "2024-05-01T11:00:00Z"));

        let response = api
            .sync(Some(at("2024-05-01T10:00:00Z")), false)
            .await
            .unwrap();
        let ids: Vec<_> = response.conversations.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["recent"]);

        let response = api.sync(None, true).await.unwrap();
        assert_eq!(response.conversations.len(), 2);
        assert!(response.is_full_sync);
        assert_eq!(api.sync_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let api = InMemorySyncApi::new(at("2024-05-01T12:00:00Z"));
        api.fail_next_syncs(1);
        assert!(api.sync(None, true).await.is_err());
        assert!(api.sync(None, true).await.is_ok());

        api.insert_message(ServerMessage {
            id: "m1".to_string(),
            content: "done".to_string(),
            ..Default::default()
        });
        api.miss_next_fetches(1);
        assert!(matches!(
            api.fetch_message("m1").await,
            Err(ApiError::NotFound(_))
        ));
        assert_eq!(api.fetch_message("m1").await.unwrap().content, "done");
        assert_eq!(api.fetch_requests(), vec!["m1", "m1"]);
    }

    #[test]
    fn test_set_message_count_stamps_server_time() {
        let api = InMemorySyncApi::new(at("2024-05-01T12:00:00Z"));
        api.upsert_conversation(row("c1", "2024-05-01T09:00:00Z"));
        api.advance_clock(TimeDelta::minutes(5));
        api.set_message_count("c1", 9);

        let state = api.state.lock();
        let c1 = &state.conversations["c1"];
        assert_eq!(c1.message_count, 9);
        assert_eq!(c1.parsed_updated_at(), Some(at("2024-05-01T12:05:00Z")));
    }
}
