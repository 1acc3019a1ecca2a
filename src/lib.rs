pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::pipeline::ProcessingPipeline;
use crate::services::remover::BackgroundRemover;
use crate::services::storage::StagingStore;
use axum::{Router, middleware::from_fn, routing::get};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StagingStore>,
    pub remover: Arc<dyn BackgroundRemover>,
    pub pipeline: Arc<ProcessingPipeline>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn StagingStore>,
        remover: Arc<dyn BackgroundRemover>,
        config: AppConfig,
    ) -> Self {
        let pipeline = Arc::new(ProcessingPipeline::new(
            store.clone(),
            remover.clone(),
            Duration::from_secs(config.model_timeout_secs),
        ));

        Self {
            store,
            remover,
            pipeline,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route(
            "/",
            get(api::handlers::index::index).post(api::handlers::index::upload),
        )
        .route(
            "/uploads/:filename",
            get(api::handlers::files::serve_upload),
        )
        .route("/download/:filename", get(api::handlers::files::download))
        .route("/health", get(api::handlers::health::health_check))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(axum::extract::DefaultBodyLimit::max(
            state.config.max_upload_size,
        ))
        .with_state(state)
}
