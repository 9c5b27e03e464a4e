use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const METADATA_FILE_NAME: &str = ".agentrt-env.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvMetadata {
    pub dependency_fingerprint: String,
    pub installed_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl EnvMetadata {
    pub async fn write(env_path: &Path, metadata: &EnvMetadata) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(metadata).unwrap_or_default();
        tokio::fs::write(env_path.join(METADATA_FILE_NAME), json).await
    }

    pub async fn read(env_path: &Path) -> Option<EnvMetadata> {
        let bytes = tokio::fs::read(env_path.join(METADATA_FILE_NAME)).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub async fn touch_last_used(env_path: &Path) -> std::io::Result<()> {
        if let Some(mut meta) = Self::read(env_path).await {
            meta.last_used_at = Utc::now();
            Self::write(env_path, &meta).await?;
        }
        Ok(())
    }
}
