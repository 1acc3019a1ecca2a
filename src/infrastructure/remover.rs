use crate::config::AppConfig;
use crate::services::remover::BackgroundRemover;
use std::sync::Arc;
use tracing::info;

pub async fn setup_remover(config: &AppConfig) -> Arc<dyn BackgroundRemover> {
    let remover = crate::services::remover::create_remover(config);

    // Warm up the backend so a missing model server shows up at boot
    if remover.health_check().await {
        info!("🪄 Background remover '{}' ready", remover.name());
    } else {
        tracing::warn!(
            "⚠️  Background remover '{}' unreachable! Uploads will fail until it is available.",
            remover.name()
        );
    }

    remover.into()
}
