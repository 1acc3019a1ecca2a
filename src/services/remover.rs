use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use std::collections::VecDeque;
use std::io::Cursor;
use std::time::Duration;
use thiserror::Error;

use crate::config::AppConfig;

#[derive(Error, Debug)]
pub enum RemoverError {
    #[error("background removal backend unavailable: {0}")]
    Unavailable(String),

    #[error("background removal failed: {0}")]
    Failed(String),
}

/// A pretrained background-removal model, used as a black box.
///
/// Implementations return an image of the same dimensions whose alpha
/// channel masks out the background.
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    async fn remove_background(&self, image: DynamicImage) -> Result<RgbaImage, RemoverError>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Client for a rembg-compatible HTTP server (`rembg s`).
///
/// The image travels as PNG in the `file` field of `POST /api/remove` and
/// comes back as a PNG with alpha.
pub struct RembgRemover {
    client: reqwest::Client,
    base_url: String,
}

impl RembgRemover {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/remove", self.base_url)
    }
}

#[async_trait]
impl BackgroundRemover for RembgRemover {
    async fn remove_background(&self, image: DynamicImage) -> Result<RgbaImage, RemoverError> {
        let png = encode_png(&image).map_err(|e| RemoverError::Failed(e.to_string()))?;

        let part = reqwest::multipart::Part::bytes(png)
            .file_name("image.png")
            .mime_str("image/png")
            .map_err(|e| RemoverError::Failed(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await
            .map_err(|e| RemoverError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoverError::Failed(format!(
                "rembg responded {}: {}",
                status,
                body.trim()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoverError::Unavailable(e.to_string()))?;

        image::load_from_memory(&bytes)
            .map(|img| img.to_rgba8())
            .map_err(|e| RemoverError::Failed(format!("unreadable model output: {}", e)))
    }

    async fn health_check(&self) -> bool {
        // Any HTTP answer means the server is up
        self.client.get(&self.base_url).send().await.is_ok()
    }

    fn name(&self) -> &'static str {
        "rembg"
    }
}

/// Local matting that keys out the colour found along the image border.
///
/// Pixels connected to the border and within `tolerance` of the estimated
/// background colour become transparent; the outer half of the tolerance band
/// is feathered.
pub struct BorderKeyRemover {
    tolerance: u8,
}

impl BorderKeyRemover {
    pub fn new(tolerance: u8) -> Self {
        Self { tolerance }
    }

    pub fn key_out(&self, image: &DynamicImage) -> RgbaImage {
        let mut rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return rgba;
        }

        let background = border_median(&rgba);
        let tolerance = f32::from(self.tolerance.max(1));
        let hard = tolerance / 2.0;

        let idx = |x: u32, y: u32| (y as usize) * (width as usize) + x as usize;
        let mut visited = vec![false; (width as usize) * (height as usize)];
        let mut queue = VecDeque::new();

        for (x, y) in border_coords(width, height) {
            if !visited[idx(x, y)] && distance(rgba.get_pixel(x, y), background) <= tolerance {
                visited[idx(x, y)] = true;
                queue.push_back((x, y));
            }
        }

        while let Some((x, y)) = queue.pop_front() {
            let pixel = rgba.get_pixel_mut(x, y);
            let dist = distance(pixel, background);
            let keep = if dist <= hard {
                0.0
            } else {
                ((dist - hard) / (tolerance - hard)).clamp(0.0, 1.0)
            };
            pixel[3] = (f32::from(pixel[3]) * keep).round() as u8;

            let neighbours = [
                (x.wrapping_sub(1), y),
                (x + 1, y),
                (x, y.wrapping_sub(1)),
                (x, y + 1),
            ];
            for (nx, ny) in neighbours {
                if nx >= width || ny >= height || visited[idx(nx, ny)] {
                    continue;
                }
                if distance(rgba.get_pixel(nx, ny), background) <= tolerance {
                    visited[idx(nx, ny)] = true;
                    queue.push_back((nx, ny));
                }
            }
        }

        rgba
    }
}

#[async_trait]
impl BackgroundRemover for BorderKeyRemover {
    async fn remove_background(&self, image: DynamicImage) -> Result<RgbaImage, RemoverError> {
        let remover = BorderKeyRemover::new(self.tolerance);
        tokio::task::spawn_blocking(move || remover.key_out(&image))
            .await
            .map_err(|e| RemoverError::Failed(format!("matting task aborted: {}", e)))
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "border-key"
    }
}

fn border_coords(width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    let horizontal = (0..width).flat_map(move |x| [(x, 0), (x, height - 1)]);
    let vertical = (0..height).flat_map(move |y| [(0, y), (width - 1, y)]);
    horizontal.chain(vertical)
}

fn border_median(image: &RgbaImage) -> [u8; 3] {
    let (width, height) = image.dimensions();
    let mut channels: [Vec<u8>; 3] = Default::default();

    for (x, y) in border_coords(width, height) {
        let p = image.get_pixel(x, y);
        for (c, values) in channels.iter_mut().enumerate() {
            values.push(p[c]);
        }
    }

    channels.map(|mut values| {
        values.sort_unstable();
        values[values.len() / 2]
    })
}

fn distance(pixel: &Rgba<u8>, background: [u8; 3]) -> f32 {
    let sum: f32 = (0..3)
        .map(|c| {
            let d = f32::from(pixel[c]) - f32::from(background[c]);
            d * d
        })
        .sum();
    sum.sqrt()
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Vec::new();
    image.write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)?;
    Ok(out)
}

/// Remover that always fails (for testing)
#[cfg(test)]
pub struct FailingRemover;

#[cfg(test)]
#[async_trait]
impl BackgroundRemover for FailingRemover {
    async fn remove_background(&self, _image: DynamicImage) -> Result<RgbaImage, RemoverError> {
        Err(RemoverError::Failed("model crashed".to_string()))
    }

    async fn health_check(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Factory function to create the remover selected in config
pub fn create_remover(config: &AppConfig) -> Box<dyn BackgroundRemover> {
    match config.remover_type.to_lowercase().as_str() {
        "rembg" => Box::new(RembgRemover::new(
            config.rembg_url.clone(),
            Duration::from_secs(config.model_timeout_secs),
        )),
        "border-key" | "border" | "local" => {
            Box::new(BorderKeyRemover::new(config.border_key_tolerance))
        }
        other => {
            tracing::warn!(
                "Unknown remover type '{}', using BorderKeyRemover",
                other
            );
            Box::new(BorderKeyRemover::new(config.border_key_tolerance))
        }
    }
}
