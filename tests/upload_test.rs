use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use bg_eraser::config::AppConfig;
use bg_eraser::services::remover::{BackgroundRemover, BorderKeyRemover, RemoverError};
use bg_eraser::services::storage::{MemoryStagingStore, StagingStore};
use bg_eraser::{AppState, create_app};
use http_body_util::BodyExt;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "---------------------------123456789012345678901234567";

struct CrashingRemover;

#[async_trait]
impl BackgroundRemover for CrashingRemover {
    async fn remove_background(&self, _image: DynamicImage) -> Result<RgbaImage, RemoverError> {
        Err(RemoverError::Failed("inference session crashed".to_string()))
    }

    async fn health_check(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "crashing"
    }
}

fn setup_app(remover: Arc<dyn BackgroundRemover>) -> (Router, Arc<MemoryStagingStore>) {
    setup_app_with_config(remover, AppConfig::development())
}

fn setup_app_with_config(
    remover: Arc<dyn BackgroundRemover>,
    config: AppConfig,
) -> (Router, Arc<MemoryStagingStore>) {
    let _ = tracing_subscriber::fmt::try_init();
    let store = Arc::new(MemoryStagingStore::new());
    let state = AppState::new(store.clone(), remover, config);
    (create_app(state), store)
}

fn small_limit_app() -> (Router, Arc<MemoryStagingStore>) {
    let mut config = AppConfig::development();
    config.max_upload_size = 1024;
    setup_app_with_config(Arc::new(BorderKeyRemover::new(48)), config)
}

fn sample_image(format: ImageOutputFormat) -> Vec<u8> {
    let img = RgbaImage::from_fn(24, 24, |x, y| {
        if (8..16).contains(&x) && (8..16).contains(&y) {
            Rgba([20, 120, 40, 255])
        } else {
            Rgba([245, 245, 245, 255])
        }
    });
    let img = match format {
        ImageOutputFormat::Jpeg(_) => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).to_rgb8()),
        _ => DynamicImage::ImageRgba8(img),
    };
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), format).unwrap();
    out
}

fn multipart_body(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{boundary}\r\n\
        Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
        Content-Type: {content_type}\r\n\r\n",
        boundary = BOUNDARY,
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(body: Vec<u8>) -> Request<Body> {
    upload_request_with_body(Body::from(body))
}

fn upload_request_with_body(body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(body)
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).to_string()
}

fn preview_url(html: &str) -> String {
    let start = html.find("<img src=\"").expect("no preview image") + "<img src=\"".len();
    let end = html[start..].find('"').unwrap();
    html[start..start + end].to_string()
}

#[tokio::test]
async fn test_index_renders_form() {
    let (app, _store) = setup_app(Arc::new(BorderKeyRemover::new(48)));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let html = body_text(response).await;
    assert!(html.contains(r#"enctype="multipart/form-data""#));
    assert!(html.contains(r#"name="photo""#));
    assert!(!html.contains("role=\"alert\""));
}

#[tokio::test]
async fn test_upload_flow_png() {
    let (app, store) = setup_app(Arc::new(BorderKeyRemover::new(48)));

    // 1. Upload
    let body = multipart_body("photo", "Cat Photo.PNG", "image/png", &sample_image(ImageOutputFormat::Png));
    let response = app.clone().oneshot(upload_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let html = body_text(response).await;
    assert!(!html.contains("role=\"alert\""), "unexpected error page: {}", html);
    let url = preview_url(&html);
    assert!(url.starts_with("/uploads/no_bg_CatPhoto_"));
    assert!(url.ends_with(".png"));

    // 2. Only the output stays staged
    let output_name = url.trim_start_matches("/uploads/").to_string();
    assert_eq!(store.list("").await.unwrap(), vec![output_name.clone()]);

    // 3. Preview URL serves a PNG with transparency
    let response = app
        .clone()
        .oneshot(Request::builder().uri(&url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert!(decoded.color().has_alpha());
    assert_eq!(decoded.to_rgba8().get_pixel(0, 0)[3], 0);
    assert_eq!(decoded.to_rgba8().get_pixel(12, 12)[3], 255);

    // 4. Download route serves the same bytes
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/download/{}", output_name))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    let downloaded = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(downloaded, bytes);
}

#[tokio::test]
async fn test_upload_flow_jpeg() {
    let (app, store) = setup_app(Arc::new(BorderKeyRemover::new(48)));

    let body = multipart_body(
        "photo",
        "portrait.jpg",
        "image/jpeg",
        &sample_image(ImageOutputFormat::Jpeg(90)),
    );
    let response = app.oneshot(upload_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let url = preview_url(&body_text(response).await);
    let output_name = url.trim_start_matches("/uploads/");
    assert!(output_name.starts_with("no_bg_portrait_"));

    let png = store.get(output_name).await.unwrap();
    let decoded = image::load_from_memory(&png).unwrap();
    assert!(decoded.color().has_alpha());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_upload_invalid_filename() {
    let (app, store) = setup_app(Arc::new(BorderKeyRemover::new(48)));

    let body = multipart_body("photo", ".png", "image/png", &sample_image(ImageOutputFormat::Png));
    let response = app.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Invalid file name."));
    assert!(!html.contains("<img"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_upload_non_image() {
    let (app, store) = setup_app(Arc::new(BorderKeyRemover::new(48)));

    let body = multipart_body("photo", "notes.png", "image/png", b"just some text, not pixels");
    let response = app.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Processing error:"));
    assert!(html.contains("valid image (e.g., JPG, PNG)"));
    assert!(!html.contains("<img"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_upload_model_failure() {
    let (app, store) = setup_app(Arc::new(CrashingRemover));

    let body = multipart_body("photo", "cat.png", "image/png", &sample_image(ImageOutputFormat::Png));
    let response = app.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("inference session crashed"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_upload_without_photo_field() {
    let (app, store) = setup_app(Arc::new(BorderKeyRemover::new(48)));

    let body = multipart_body("avatar", "cat.png", "image/png", &sample_image(ImageOutputFormat::Png));
    let response = app.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("No file was uploaded."));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_concurrent_uploads_same_name() {
    let (app, store) = setup_app(Arc::new(BorderKeyRemover::new(48)));
    let png = sample_image(ImageOutputFormat::Png);

    let first = app
        .clone()
        .oneshot(upload_request(multipart_body("photo", "dup.png", "image/png", &png)));
    let second = app
        .clone()
        .oneshot(upload_request(multipart_body("photo", "dup.png", "image/png", &png)));
    let (first, second) = tokio::join!(first, second);

    let first_url = preview_url(&body_text(first.unwrap()).await);
    let second_url = preview_url(&body_text(second.unwrap()).await);

    assert_ne!(first_url, second_url);
    assert_eq!(store.list("no_bg_dup_").await.unwrap().len(), 2);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_health() {
    let (app, _store) = setup_app(Arc::new(BorderKeyRemover::new(48)));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["remover"], "border-key");
    assert_eq!(json["remover_available"], true);
}

#[tokio::test]
async fn test_upload_over_limit_is_rejected() {
    let (app, store) = small_limit_app();

    let body = multipart_body("photo", "huge.png", "image/png", &vec![7u8; 64 * 1024]);
    let response = app.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "Request body exceeds the maximum allowed limit");
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_upload_over_limit_while_streaming_is_rejected() {
    let (app, store) = small_limit_app();

    // Headers fit under the limit; the limit trips while the field is read
    let full = multipart_body("photo", "huge.png", "image/png", &vec![7u8; 64 * 1024]);
    let header_end = full.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
    let mut chunks = vec![full[..header_end].to_vec()];
    chunks.extend(full[header_end..].chunks(512).map(|c| c.to_vec()));
    let stream = futures::stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));

    let response = app
        .oneshot(upload_request_with_body(Body::from_stream(stream)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_upload_ignores_fields_after_photo() {
    let (app, store) = setup_app(Arc::new(BorderKeyRemover::new(48)));

    // A photo part followed by a part whose headers never terminate
    let mut body = format!(
        "--{boundary}\r\n\
        Content-Disposition: form-data; name=\"photo\"; filename=\"cat.png\"\r\n\
        Content-Type: image/png\r\n\r\n",
        boundary = BOUNDARY,
    )
    .into_bytes();
    body.extend_from_slice(&sample_image(ImageOutputFormat::Png));
    body.extend_from_slice(format!("\r\n--{}\r\nContent-Disposition: broken", BOUNDARY).as_bytes());

    let response = app.clone().oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(!html.contains("role=\"alert\""), "unexpected error page: {}", html);
    let url = preview_url(&html);
    let output_name = url.trim_start_matches("/uploads/");

    // The staged output is the one the page points at
    assert_eq!(store.list("").await.unwrap(), vec![output_name.to_string()]);
}
