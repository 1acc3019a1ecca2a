use crate::config::AppConfig;
use crate::services::storage::LocalStagingStore;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &AppConfig) -> anyhow::Result<Arc<LocalStagingStore>> {
    tokio::fs::create_dir_all(&config.staging_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create staging directory {}",
                config.staging_dir.display()
            )
        })?;

    info!("📁 Staging store: {}", config.staging_dir.display());

    Ok(Arc::new(LocalStagingStore::new(config.staging_dir.clone())))
}
