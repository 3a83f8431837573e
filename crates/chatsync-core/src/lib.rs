//! Client-side conversation sync for a chat application.
//!
//! Keeps a local conversation list consistent with a server-side log across
//! devices and tabs: incremental and full reconciliation, unread and
//! external-update detection, recovery of interrupted streamed responses, and
//! guards against stale async view loads.

pub mod engine;
pub mod models;
pub mod repositories;
pub mod services;
pub mod settings;

pub use engine::SyncEngine;
