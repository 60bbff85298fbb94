//! Working directory for raw uploaded images.
//!
//! Every upload is written under a unique name. The returned guard deletes
//! the file when dropped unless [`SavedUpload::keep`] was called, so a
//! request cannot leave a temp copy behind on any exit path.

use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const FALLBACK_NAME: &str = "upload";

pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    pub fn create(root: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` under a unique name derived from the client's file name.
    pub async fn save(&self, file_name: Option<&str>, bytes: &[u8]) -> io::Result<SavedUpload> {
        let name = format!(
            "{}_{}",
            Uuid::new_v4().simple(),
            sanitize_file_name(file_name.unwrap_or(FALLBACK_NAME))
        );
        let path = self.root.join(name);
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), len = bytes.len(), "upload saved");
        Ok(SavedUpload { path, keep: false })
    }
}

/// A saved upload, removed on drop unless kept.
#[derive(Debug)]
pub struct SavedUpload {
    path: PathBuf,
    keep: bool,
}

impl SavedUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Retain the file past the guard's lifetime.
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        self.path.clone()
    }
}

impl Drop for SavedUpload {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "upload removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "failed to remove upload"),
        }
    }
}

/// Reduce a client-supplied file name to a safe single path component.
///
/// Keeps ASCII letters, digits, `.`, `-` and `_`; whitespace becomes `_`;
/// any directory part is dropped and leading dots are stripped.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']);

    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}
