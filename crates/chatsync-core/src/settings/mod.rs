pub mod sync_settings;
pub mod sync_settings_repository;

pub use sync_settings::{RecoverySettings, SyncSettings};
pub use sync_settings_repository::{
    SettingsError, SettingsResult, SyncSettingsJsonRepository, SyncSettingsRepository,
};
