use crate::AppState;
use crate::api::error::AppError;
use crate::utils::validation::{is_output_name, is_safe_name};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};

const NOT_DOWNLOADABLE: &str = "File not found or unauthorized for download";

/// Serves any staged file as-is, with a content type sniffed from its bytes
pub async fn serve_upload(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    if !is_safe_name(&filename) {
        return Err(AppError::NotFound("File not found".to_string()));
    }

    let data = state.store.get(&filename).await?;
    let content_type = infer::get(&data)
        .map(|kind| kind.mime_type())
        .unwrap_or(mime::APPLICATION_OCTET_STREAM.as_ref())
        .to_string();

    build_file_response(data, &content_type, None)
}

/// Downloads a processed output.
///
/// Only existing `no_bg_` files are served. A staged file that exists but
/// lacks the prefix is deleted before answering 404.
pub async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let exists = state.store.exists(&filename).await;

    if exists && is_output_name(&filename) {
        let data = state.store.get(&filename).await?;
        tracing::info!("📎 Download {} ({} bytes)", filename, data.len());
        return build_file_response(data, mime::IMAGE_PNG.as_ref(), Some(&filename));
    }

    if exists {
        tracing::warn!("Removing non-output file requested for download: {}", filename);
        if let Err(e) = state.store.delete(&filename).await {
            tracing::error!("Failed to remove {}: {}", filename, e);
        }
    }

    Err(AppError::NotFound(NOT_DOWNLOADABLE.to_string()))
}

fn build_file_response(
    data: Vec<u8>,
    content_type: &str,
    attachment: Option<&str>,
) -> Result<Response, AppError> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, data.len());

    if let Some(filename) = attachment {
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        );
    }

    builder
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}
