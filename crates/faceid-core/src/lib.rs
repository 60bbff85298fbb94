//! faceid-core — face descriptors, matching and the identity registry.
//!
//! Uses SCRFD for face detection and ArcFace for descriptor extraction,
//! both running via ONNX Runtime for CPU inference.

pub mod alignment;
pub mod detector;
pub mod embedder;
pub mod recognizer;
pub mod registry;
pub mod types;

pub use embedder::{decode_image, EmbedderError, FaceEmbedder, OnnxEmbedder};
pub use registry::{Registry, RegistryError};
pub use types::{BoundingBox, Descriptor, EuclideanMatcher, IdentityRecord, MatchResult, Matcher};

use std::path::PathBuf;

/// Default data directory: `$XDG_DATA_HOME/faceid`, falling back to `~/.local/share/faceid`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("faceid")
}

/// Default directory holding the ONNX model files.
pub fn default_model_dir() -> PathBuf {
    default_data_dir().join("models")
}
