//! The embedding provider: image in, at most one descriptor out.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError, ARCFACE_DESCRIPTOR_LEN};
use crate::types::Descriptor;
use image::DynamicImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Decode uploaded bytes into a raster image, sniffing the format.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, EmbedderError> {
    Ok(image::load_from_memory(bytes)?)
}

/// Detects a face in an image and turns it into a descriptor.
///
/// Policy: at most one descriptor is returned, for the first face found
/// (the most confident detection). Additional faces are ignored.
/// `Ok(None)` means no face was found.
pub trait FaceEmbedder {
    fn detect_and_embed(&mut self, image: &DynamicImage)
        -> Result<Option<Descriptor>, EmbedderError>;

    /// Length of every descriptor this provider produces.
    fn descriptor_len(&self) -> usize;
}

/// SCRFD detection followed by ArcFace embedding.
pub struct OnnxEmbedder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxEmbedder {
    pub fn load(detector_path: &Path, recognizer_path: &Path) -> Result<Self, EmbedderError> {
        let detector = FaceDetector::load(detector_path)?;
        let recognizer = FaceRecognizer::load(recognizer_path)?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceEmbedder for OnnxEmbedder {
    fn detect_and_embed(
        &mut self,
        image: &DynamicImage,
    ) -> Result<Option<Descriptor>, EmbedderError> {
        let rgb = image.to_rgb8();
        let faces = self.detector.detect(&rgb)?;

        let Some(face) = faces.first() else {
            return Ok(None);
        };
        if faces.len() > 1 {
            tracing::debug!(count = faces.len(), "multiple faces; using the most confident");
        }

        let descriptor = self.recognizer.extract(&rgb, face)?;
        tracing::debug!(confidence = face.confidence, "face embedded");
        Ok(Some(descriptor))
    }

    fn descriptor_len(&self) -> usize {
        ARCFACE_DESCRIPTOR_LEN
    }
}
