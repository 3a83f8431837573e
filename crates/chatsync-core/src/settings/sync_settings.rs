use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Tuning for stream recovery
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// A visibility-triggered recovery waits until the app was hidden at least this long
    pub min_hidden_ms: u64,
    /// Delay before each retry of the message fetch; one initial try plus one per entry
    pub retry_delays_ms: Vec<u64>,
    /// Marks for a just-recovered message are ignored within this window
    pub mark_debounce_ms: u64,
    /// Messages a send adds (prompt plus reply), counted when recovery finishes a send
    pub messages_per_send: u64,
}

impl RecoverySettings {
    pub fn min_hidden(&self) -> Duration {
        Duration::from_millis(self.min_hidden_ms)
    }

    pub fn retry_delays(&self) -> Vec<Duration> {
        self.retry_delays_ms
            .iter()
            .copied()
            .map(Duration::from_millis)
            .collect()
    }

    /// Total fetch calls before giving up
    pub fn max_attempts(&self) -> usize {
        1 + self.retry_delays_ms.len()
    }

    pub fn mark_debounce(&self) -> Duration {
        Duration::from_millis(self.mark_debounce_ms)
    }
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            min_hidden_ms: 2_000,
            retry_delays_ms: vec![500, 1_000, 2_000, 4_000],
            mark_debounce_ms: 5_000,
            messages_per_send: 2,
        }
    }
}

/// Settings for conversation sync
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Incremental sync period while visible
    pub poll_interval_ms: u64,
    /// Coming back after being hidden longer than this forces a full sync
    pub full_sync_after_hidden_ms: u64,
    /// Slack subtracted from the initial load time when telling paginated rows from new ones
    pub pagination_buffer_ms: u64,
    /// Id prefix of conversations created locally and not yet persisted
    pub temp_id_prefix: String,
    /// Capacity of the notification log
    pub max_notifications: usize,
    pub recovery: RecoverySettings,
}

impl SyncSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn full_sync_after_hidden(&self) -> Duration {
        Duration::from_millis(self.full_sync_after_hidden_ms)
    }

    /// Buffer as a server-clock delta
    pub fn pagination_buffer(&self) -> TimeDelta {
        TimeDelta::milliseconds(i64::try_from(self.pagination_buffer_ms).unwrap_or(i64::MAX))
    }

    pub fn is_temp_id(&self, id: &str) -> bool {
        !self.temp_id_prefix.is_empty() && id.starts_with(&self.temp_id_prefix)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 30_000,
            full_sync_after_hidden_ms: 300_000, // 5 minutes
            pagination_buffer_ms: 60_000,
            temp_id_prefix: "temp-".to_string(),
            max_notifications: 100,
            recovery: RecoverySettings::default(),
        }
    }
}
