use std::env;
use std::path::PathBuf;

/// Runtime configuration for the eraser service
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory used as the staging store (default: "uploads")
    pub staging_dir: PathBuf,

    /// Maximum accepted request body in bytes (default: 20 MB)
    pub max_upload_size: usize,

    /// Background remover backend: "border-key" or "rembg" (default: "border-key")
    pub remover_type: String,

    /// Base URL of a rembg-compatible server (default: "http://127.0.0.1:7000")
    pub rembg_url: String,

    /// Upper bound on a single model invocation in seconds (default: 120)
    pub model_timeout_secs: u64,

    /// Colour distance under which a pixel counts as background (default: 48)
    pub border_key_tolerance: u8,

    /// Age after which staged files are swept. `None` keeps outputs forever.
    pub output_retention_hours: Option<u64>,

    /// How often the retention sweeper wakes up in seconds (default: 3600)
    pub sweep_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("uploads"),
            max_upload_size: 20 * 1024 * 1024, // 20 MB
            remover_type: "border-key".to_string(),
            rembg_url: "http://127.0.0.1:7000".to_string(),
            model_timeout_secs: 120,
            border_key_tolerance: 48,
            output_retention_hours: None,
            sweep_interval_secs: 3600,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            staging_dir: env::var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),

            max_upload_size: env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_size),

            remover_type: env::var("REMOVER_TYPE").unwrap_or(default.remover_type),

            rembg_url: env::var("REMBG_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(default.rembg_url),

            model_timeout_secs: env::var("MODEL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.model_timeout_secs),

            border_key_tolerance: env::var("BORDER_KEY_TOLERANCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.border_key_tolerance),

            // Zero or garbage means "no retention policy"
            output_retention_hours: env::var("OUTPUT_RETENTION_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|hours: &u64| *hours > 0),

            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .unwrap_or(default.sweep_interval_secs),
        }
    }

    /// Create config for development and tests (local remover, short timeout)
    pub fn development() -> Self {
        Self {
            staging_dir: PathBuf::from("uploads"),
            max_upload_size: 20 * 1024 * 1024,
            remover_type: "border-key".to_string(),
            rembg_url: "http://127.0.0.1:7000".to_string(),
            model_timeout_secs: 30,
            border_key_tolerance: 48,
            output_retention_hours: None,
            sweep_interval_secs: 3600,
        }
    }
}
