//! Test doubles: a deterministic embedder and a wired-up service.

use crate::engine::spawn_engine;
use crate::service::FaceService;
use crate::uploads::UploadDir;
use axum::body::Bytes;
use faceid_core::{Descriptor, EmbedderError, FaceEmbedder, Registry};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const BLACK: [u8; 3] = [0, 0, 0];
pub const RED: [u8; 3] = [255, 0, 0];
pub const GREEN: [u8; 3] = [0, 255, 0];
pub const BLUE: [u8; 3] = [0, 0, 255];

/// Treats the top-left pixel as the face: black means no face, any other
/// colour becomes the descriptor `[r, g, b] / 255`.
pub struct FakeEmbedder;

impl FaceEmbedder for FakeEmbedder {
    fn detect_and_embed(
        &mut self,
        image: &DynamicImage,
    ) -> Result<Option<Descriptor>, EmbedderError> {
        let pixel = *image.to_rgb8().get_pixel(0, 0);
        if pixel.0 == BLACK {
            return Ok(None);
        }
        Ok(Some(Descriptor::new(
            pixel.0.iter().map(|&c| c as f32 / 255.0).collect(),
        )))
    }

    fn descriptor_len(&self) -> usize {
        3
    }
}

/// A small PNG filled with `color`.
pub fn png(color: [u8; 3]) -> Bytes {
    let img = RgbImage::from_pixel(8, 8, Rgb(color));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode png");
    Bytes::from(buf)
}

/// A service over a fake engine, with registry and uploads in a temp dir.
pub struct TestEnv {
    pub service: FaceService,
    pub registry: Arc<Registry>,
    pub data_dir: PathBuf,
    pub upload_dir: PathBuf,
    _dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path().join("data");
        let upload_dir = dir.path().join("uploads");

        let engine = spawn_engine(FakeEmbedder, 8, Duration::from_secs(5)).expect("engine");
        let registry = Arc::new(Registry::open(&data_dir).expect("registry"));
        let uploads = Arc::new(UploadDir::create(&upload_dir).expect("upload dir"));
        let service = FaceService::new(engine, Arc::clone(&registry), uploads, 0.6);

        Self {
            service,
            registry,
            data_dir,
            upload_dir,
            _dir: dir,
        }
    }

    /// Files currently sitting in the upload directory.
    pub fn uploaded_files(&self) -> usize {
        std::fs::read_dir(&self.upload_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}
