use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ApiResult;
use crate::models::{ConversationSummary, ServerMessage};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Response body of a sync request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub conversations: Vec<ConversationSummary>,
    pub server_time: DateTime<Utc>,
    #[serde(default)]
    pub is_full_sync: bool,
}

/// Server endpoints the sync engine talks to.
///
/// This trait is object-safe and is shared as `Arc<dyn SyncApi>`. Returned
/// futures own everything they need so they can outlive the borrow of `self`.
pub trait SyncApi: Send + Sync + 'static {
    /// Fetch conversations changed since `since`, or the complete list when `full`
    fn sync(
        &self,
        since: Option<DateTime<Utc>>,
        full: bool,
    ) -> BoxFuture<'static, ApiResult<SyncResponse>>;

    /// Fetch the canonical stored message by id
    fn fetch_message(&self, message_id: &str) -> BoxFuture<'static, ApiResult<ServerMessage>>;
}
