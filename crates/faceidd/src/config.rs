use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to (default: 127.0.0.1:5000).
    pub listen_addr: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory holding the descriptor and name stores.
    pub data_dir: PathBuf,
    /// Working directory for raw uploaded images.
    pub upload_dir: PathBuf,
    /// Maximum Euclidean distance accepted as the same identity.
    pub match_threshold: f32,
    /// Request body limit for multipart uploads.
    pub max_upload_bytes: usize,
    /// How long a request waits for the embedding engine.
    pub embed_timeout: Duration,
    /// Capacity of the engine request queue.
    pub engine_queue: usize,
}

impl Config {
    /// Load configuration from `FACEID_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("FACEID_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| faceid_core::default_data_dir());

        let model_dir = std::env::var("FACEID_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| faceid_core::default_model_dir());

        let upload_dir = std::env::var("FACEID_UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("uploaded_images"));

        Self {
            listen_addr: std::env::var("FACEID_LISTEN_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:5000".to_string()),
            model_dir,
            data_dir,
            upload_dir,
            match_threshold: env_parse("FACEID_MATCH_THRESHOLD", 0.6),
            max_upload_bytes: env_parse("FACEID_MAX_UPLOAD_BYTES", 16 * 1024 * 1024),
            embed_timeout: Duration::from_secs(env_parse("FACEID_EMBED_TIMEOUT_SECS", 30)),
            engine_queue: env_parse::<usize>("FACEID_ENGINE_QUEUE", 8).max(1),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparseable value; using default");
            default
        }),
        Err(_) => default,
    }
}
