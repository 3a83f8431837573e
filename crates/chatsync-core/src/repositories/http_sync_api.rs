use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use tracing::debug;

use super::error::{ApiError, ApiResult};
use super::sync_api::{BoxFuture, SyncApi, SyncResponse};
use crate::models::ServerMessage;

/// `SyncApi` backed by the chat server's HTTP endpoints
#[derive(Clone)]
pub struct HttpSyncApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSyncApi {
    pub fn new(base_url: &str) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("chatsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn sync_url(&self) -> String {
        format!("{}/api/conversations/sync", self.base_url)
    }

    fn message_url(&self, message_id: &str) -> String {
        format!("{}/api/messages/{}", self.base_url, message_id)
    }
}

impl SyncApi for HttpSyncApi {
    fn sync(
        &self,
        since: Option<DateTime<Utc>>,
        full: bool,
    ) -> BoxFuture<'static, ApiResult<SyncResponse>> {
        let client = self.client.clone();
        let url = self.sync_url();

        Box::pin(async move {
            let mut query = vec![("full", full.to_string())];
            if let Some(since) = since {
                query.push(("since", since.to_rfc3339_opts(SecondsFormat::Millis, true)));
            }

            debug!(url = %url, full, "Requesting conversation sync");
            let response = client.get(&url).query(&query).send().await?;

            let status = response.status();
            if !status.is_success() {
                return Err(ApiError::ServerError {
                    status: status.as_u16(),
                });
            }

            Ok(response.json::<SyncResponse>().await?)
        })
    }

    fn fetch_message(&self, message_id: &str) -> BoxFuture<'static, ApiResult<ServerMessage>> {
        let client = self.client.clone();
        let url = self.message_url(message_id);
        let message_id = message_id.to_string();

        Box::pin(async move {
            let response = client.get(&url).send().await?;

            match response.status() {
                StatusCode::NOT_FOUND => Err(ApiError::NotFound(message_id)),
                status if !status.is_success() => Err(ApiError::ServerError {
                    status: status.as_u16(),
                }),
                _ => Ok(response.json::<ServerMessage>().await?),
            }
        })
    }
}
