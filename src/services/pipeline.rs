use image::{DynamicImage, RgbaImage};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::{info, warn};

use crate::services::remover::{self, BackgroundRemover, RemoverError};
use crate::services::storage::{StagedFile, StagingStore, StoreError};
use crate::utils::validation::{InvalidFilename, output_filename, secure_filename};

/// Route prefix under which staged files are served
pub const PUBLIC_PREFIX: &str = "/uploads";

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("cannot identify image file ({0})")]
    Decode(String),

    #[error(transparent)]
    Model(#[from] RemoverError),

    #[error("background removal did not finish within {0} seconds")]
    Timeout(u64),

    #[error("failed to encode PNG ({0})")]
    Encode(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ProcessingError {
    /// Message shown in the page's error banner
    pub fn user_message(&self) -> String {
        format!(
            "Processing error: {}. Please ensure the uploaded file is a valid image (e.g., JPG, PNG).",
            self
        )
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error(transparent)]
    InvalidFilename(#[from] InvalidFilename),

    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

impl UploadError {
    pub fn user_message(&self) -> String {
        match self {
            UploadError::InvalidFilename(e) => e.to_string(),
            UploadError::Processing(e) => e.user_message(),
        }
    }
}

/// One uploaded file as received from the client
pub struct UploadRequest<'a> {
    pub filename: String,
    pub body: Box<dyn AsyncRead + Unpin + Send + 'a>,
}

#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub output: StagedFile,
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Save → decode → remove background → encode → cleanup, for one request.
pub struct ProcessingPipeline {
    store: Arc<dyn StagingStore>,
    remover: Arc<dyn BackgroundRemover>,
    model_timeout: Duration,
}

impl ProcessingPipeline {
    pub fn new(
        store: Arc<dyn StagingStore>,
        remover: Arc<dyn BackgroundRemover>,
        model_timeout: Duration,
    ) -> Self {
        Self {
            store,
            remover,
            model_timeout,
        }
    }

    /// Sanitizes the client filename, then processes the upload under it
    pub async fn run(&self, upload: UploadRequest<'_>) -> Result<ProcessedImage, UploadError> {
        let input_name = secure_filename(&upload.filename)?;
        Ok(self.process(&input_name, upload.body).await?)
    }

    /// Processes bytes staged under an already sanitized `input_name`.
    ///
    /// The staged input is removed on every exit path; the output is removed
    /// unless processing succeeded.
    pub async fn process<'a>(
        &self,
        input_name: &str,
        body: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<ProcessedImage, ProcessingError> {
        let input = StagedFile::input(input_name);
        let output = StagedFile::output(output_filename(input_name));

        let result = self.convert(&input, &output, body).await;

        self.discard(&input).await;
        if let Err(e) = &result {
            warn!("⚠️  Processing failed for {}: {}", input.name, e);
            self.discard(&output).await;
        }

        result
    }

    async fn convert<'a>(
        &self,
        input: &StagedFile,
        output: &StagedFile,
        body: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<ProcessedImage, ProcessingError> {
        // 1. Persist the upload
        let written = self.store.put_stream(&input.name, body).await?;
        info!("📥 Staged {} ({} bytes)", input.name, written);

        // 2. Decode
        let bytes = self.store.get(&input.name).await?;
        let image = decode_image(bytes).await?;

        // 3. Remove the background
        let started = Instant::now();
        let matted = tokio::time::timeout(
            self.model_timeout,
            self.remover.remove_background(image),
        )
        .await
        .map_err(|_| ProcessingError::Timeout(self.model_timeout.as_secs()))??;
        let (width, height) = matted.dimensions();
        info!(
            "🪄 {} removed background of {} ({}x{}) in {:?}",
            self.remover.name(),
            input.name,
            width,
            height,
            started.elapsed()
        );

        // 4. Encode as PNG, the only format here that carries alpha
        let png = encode_png(matted).await?;
        self.store.put(&output.name, png).await?;

        // 5. Servable URL
        let url = format!("{}/{}", PUBLIC_PREFIX, output.name);

        Ok(ProcessedImage {
            output: output.clone(),
            url,
            width,
            height,
        })
    }

    async fn discard(&self, file: &StagedFile) {
        if let Err(e) = self.store.delete(&file.name).await {
            warn!("Failed to clean up {:?} file {}: {}", file.role, file.name, e);
        }
    }
}

async fn decode_image(bytes: Vec<u8>) -> Result<DynamicImage, ProcessingError> {
    tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await
        .map_err(|e| ProcessingError::Decode(e.to_string()))?
        .map_err(|e| ProcessingError::Decode(e.to_string()))
}

async fn encode_png(image: RgbaImage) -> Result<Vec<u8>, ProcessingError> {
    tokio::task::spawn_blocking(move || remover::encode_png(&DynamicImage::ImageRgba8(image)))
        .await
        .map_err(|e| ProcessingError::Encode(e.to_string()))?
        .map_err(|e| ProcessingError::Encode(e.to_string()))
}
