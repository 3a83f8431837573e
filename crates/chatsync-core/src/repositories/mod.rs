pub mod error;
pub mod http_sync_api;
pub mod in_memory_sync_api;
pub mod sync_api;

pub use error::{ApiError, ApiResult};
pub use http_sync_api::HttpSyncApi;
pub use in_memory_sync_api::{InMemorySyncApi, SyncRequest};
pub use sync_api::{BoxFuture, SyncApi, SyncResponse};
