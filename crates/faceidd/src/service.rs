use crate::engine::{EngineError, EngineHandle};
use crate::uploads::UploadDir;
use axum::body::Bytes;
use faceid_core::{
    Descriptor, EmbedderError, EuclideanMatcher, IdentityRecord, Matcher, Registry, RegistryError,
};
use std::sync::Arc;
use thiserror::Error;

pub const MISSING_REGISTRATION_FIELDS: &str = "Image and name are required";
pub const MISSING_IMAGE: &str = "Image is required";

#[derive(Error, Debug)]
pub enum ServiceError {
    /// A required form field was absent or empty; carries the client message.
    #[error("{0}")]
    MissingField(&'static str),
    #[error("upload is not a decodable image: {0}")]
    InvalidImage(#[source] EmbedderError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("no registered face within threshold")]
    AuthenticationFailed,
    #[error("engine: {0}")]
    Engine(#[source] EngineError),
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),
    #[error("upload storage: {0}")]
    Upload(#[from] std::io::Error),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<EngineError> for ServiceError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Embedder(e @ EmbedderError::Decode(_)) => ServiceError::InvalidImage(e),
            other => ServiceError::Engine(other),
        }
    }
}

/// An image as received from a client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub bytes: Bytes,
}

/// Daemon state visible through `/status`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Status {
    pub version: &'static str,
    pub identities: usize,
    pub threshold: f32,
    pub descriptor_len: usize,
}

/// Register and authenticate flows over the shared registry.
#[derive(Clone)]
pub struct FaceService {
    engine: EngineHandle,
    registry: Arc<Registry>,
    uploads: Arc<UploadDir>,
    threshold: f32,
}

impl FaceService {
    pub fn new(
        engine: EngineHandle,
        registry: Arc<Registry>,
        uploads: Arc<UploadDir>,
        threshold: f32,
    ) -> Self {
        Self {
            engine,
            registry,
            uploads,
            threshold,
        }
    }

    /// Enroll `name` with the face found in `image`.
    ///
    /// The raw upload is kept only when the registration succeeds. The
    /// registry is untouched on every failure path.
    pub async fn register(
        &self,
        image: Option<ImageUpload>,
        name: Option<&str>,
    ) -> Result<usize, ServiceError> {
        // Blank names count as missing; others are stored exactly as sent.
        let (image, name) = match (image, name) {
            (Some(image), Some(name)) if !image.bytes.is_empty() && !name.trim().is_empty() => {
                (image, name.to_string())
            }
            _ => return Err(ServiceError::MissingField(MISSING_REGISTRATION_FIELDS)),
        };

        let saved = self
            .uploads
            .save(image.file_name.as_deref(), &image.bytes)
            .await?;
        let descriptor = self.embed(image.bytes).await?;

        // Embedding is done; only the append+persist step takes the lock.
        let registry = Arc::clone(&self.registry);
        let record = IdentityRecord::new(name.clone(), descriptor);
        let total = tokio::task::spawn_blocking(move || registry.append(record)).await??;

        let kept = saved.keep();
        tracing::info!(name = %name, identities = total, upload = %kept.display(), "user registered");
        Ok(total)
    }

    /// Identify the face in `image`, returning the matched name.
    ///
    /// The working copy of the upload is removed however this returns.
    pub async fn authenticate(&self, image: Option<ImageUpload>) -> Result<String, ServiceError> {
        let image = image
            .filter(|i| !i.bytes.is_empty())
            .ok_or(ServiceError::MissingField(MISSING_IMAGE))?;

        let working_copy = self
            .uploads
            .save(image.file_name.as_deref(), &image.bytes)
            .await?;
        tracing::debug!(path = %working_copy.path().display(), "authenticating upload");
        let probe = self.embed(image.bytes).await?;

        let gallery = self.registry.snapshot()?;
        let result = EuclideanMatcher.compare(&probe, &gallery, self.threshold);

        match result.name {
            Some(name) if result.matched => {
                tracing::info!(name = %name, distance = result.distance, "authentication succeeded");
                Ok(name)
            }
            _ => {
                tracing::warn!(
                    distance = result.distance,
                    identities = gallery.len(),
                    "authentication failed"
                );
                Err(ServiceError::AuthenticationFailed)
            }
        }
    }

    pub fn status(&self) -> Status {
        Status {
            version: env!("CARGO_PKG_VERSION"),
            identities: self.registry.len(),
            threshold: self.threshold,
            descriptor_len: self.engine.descriptor_len(),
        }
    }

    async fn embed(&self, bytes: Bytes) -> Result<Descriptor, ServiceError> {
        self.engine
            .embed(bytes)
            .await?
            .ok_or(ServiceError::NoFaceDetected)
    }
}
