use crate::AppState;
use crate::api::error::{AppError, multipart_cause};
use crate::services::pipeline::UploadRequest;
use crate::services::view::{ViewModel, render};
use axum::{
    extract::{Multipart, State},
    response::Html,
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

/// Multipart field carrying the image
const PHOTO_FIELD: &str = "photo";

/// Serves the upload form
pub async fn index() -> Html<String> {
    Html(render(&ViewModel::neutral()))
}

/// Accepts an upload, removes its background and renders the outcome.
///
/// Processing failures are reported in the page with a 200; only a broken
/// or oversized multipart body is turned into an HTTP error. Fields after the
/// first `photo` are never read.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Html<String>, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(PHOTO_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let reader = StreamReader::new(field.map_err(std::io::Error::other));

        let outcome = state
            .pipeline
            .run(UploadRequest {
                filename,
                body: Box::new(reader),
            })
            .await;

        let view = match outcome {
            Ok(processed) => {
                tracing::info!("✅ Background removed: {}", processed.output.name);
                ViewModel::success(processed.url)
            }
            Err(e) => {
                // The request body itself failed while streaming
                if let Some(cause) = multipart_cause(&e) {
                    return Err(AppError::from_multipart(cause));
                }
                ViewModel::error(e.user_message())
            }
        };

        return Ok(Html(render(&view)));
    }

    Ok(Html(render(&ViewModel::error("No file was uploaded."))))
}
