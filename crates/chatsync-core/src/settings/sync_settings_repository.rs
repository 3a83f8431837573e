use std::path::PathBuf;

use thiserror::Error;

use super::sync_settings::SyncSettings;
use crate::repositories::BoxFuture;

#[derive(Debug, Clone, Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Path error: {0}")]
    PathError(String),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

pub trait SyncSettingsRepository: Send + Sync + 'static {
    /// Load sync settings from storage
    fn load(&self) -> BoxFuture<'static, SettingsResult<SyncSettings>>;

    /// Save sync settings to storage
    fn save(&self, settings: SyncSettings) -> BoxFuture<'static, SettingsResult<()>>;
}

pub struct SyncSettingsJsonRepository {
    file_path: PathBuf,
}

impl SyncSettingsJsonRepository {
    /// Create repository with XDG-compliant path
    pub fn new() -> SettingsResult<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SettingsError::PathError("Cannot determine config directory".into()))?;

        Ok(Self::with_path(
            config_dir.join("chatsync").join("sync_settings.json"),
        ))
    }

    pub fn with_path(file_path: PathBuf) -> Self {
        Self { file_path }
    }
}

impl SyncSettingsRepository for SyncSettingsJsonRepository {
    fn load(&self) -> BoxFuture<'static, SettingsResult<SyncSettings>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(SyncSettings::default());
            }

            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| SettingsError::IoError(e.to_string()))?;

            serde_json::from_str(&contents)
                .map_err(|e| SettingsError::SerializationError(e.to_string()))
        })
    }

    fn save(&self, settings: SyncSettings) -> BoxFuture<'static, SettingsResult<()>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            let json = serde_json::to_string_pretty(&settings)
                .map_err(|e| SettingsError::SerializationError(e.to_string()))?;

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SettingsError::IoError(e.to_string()))?;
            }

            // Write atomically using temp file + rename
            let temp_path = path.with_extension("json.tmp");
            tokio::fs::write(&temp_path, &json)
                .await
                .map_err(|e| SettingsError::IoError(e.to_string()))?;

            tokio::fs::rename(&temp_path, &path)
                .await
                .map_err(|e| SettingsError::IoError(e.to_string()))?;

            Ok(())
        })
    }
}
