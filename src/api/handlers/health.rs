use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub remover: String,
    pub remover_available: bool,
    pub version: String,
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        remover: state.remover.name().to_string(),
        remover_available: state.remover.health_check().await,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
