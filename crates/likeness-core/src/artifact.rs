//! Scoped temporary artifacts.
//!
//! The comparator takes images by path, so the decoded probe is staged on
//! disk for the duration of one call. Every artifact name carries a fresh
//! UUID: concurrent requests for the same subject never share a file.

use crate::codec::DecodedImage;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Longest subject-derived prefix kept in an artifact filename.
const MAX_HINT_LEN: usize = 64;
const ARTIFACT_EXTENSION: &str = "png";

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("staging directory unavailable: {0}")]
    StagingDir(#[source] io::Error),
    #[error("failed to write temporary artifact: {0}")]
    Write(#[from] image::ImageError),
}

/// Directory that holds in-flight temporary artifacts.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the staging directory if it does not exist yet.
    pub fn ensure(&self) -> Result<(), ArtifactError> {
        std::fs::create_dir_all(&self.root).map_err(ArtifactError::StagingDir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stage `image` under a unique name, run `f` with its path, then remove it.
    ///
    /// Removal happens on every exit path, including a panic inside `f`.
    /// Removal failures are logged and never replace `f`'s result.
    pub fn with_temporary<R>(
        &self,
        image: &DecodedImage,
        name_hint: &str,
        f: impl FnOnce(&Path) -> R,
    ) -> Result<R, ArtifactError> {
        let artifact = TemporaryArtifact::create(&self.root, image, name_hint)?;
        let result = f(artifact.path());
        drop(artifact);
        Ok(result)
    }
}

/// A staged file that is deleted when dropped.
#[derive(Debug)]
pub struct TemporaryArtifact {
    path: PathBuf,
}

impl TemporaryArtifact {
    fn create(root: &Path, image: &DecodedImage, name_hint: &str) -> Result<Self, ArtifactError> {
        let path = root.join(artifact_file_name(name_hint));
        // Guard first: a partially written file is removed as well.
        let artifact = Self { path };
        image.write_png(&artifact.path)?;
        tracing::debug!(path = %artifact.path.display(), "staged temporary artifact");
        Ok(artifact)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TemporaryArtifact {
    fn drop(&mut self) {
        remove_best_effort(&self.path);
    }
}

/// Attempt to remove `path`; log anything other than "already gone".
fn remove_best_effort(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed temporary artifact"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove temporary artifact"
        ),
    }
}

/// `{hint}_{uuid}.png`, with the hint reduced to a safe path component.
fn artifact_file_name(name_hint: &str) -> String {
    let mut hint: String = name_hint
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(MAX_HINT_LEN)
        .collect();
    if hint.is_empty() {
        hint.push_str("probe");
    }
    format!("{hint}_{}.{ARTIFACT_EXTENSION}", Uuid::new_v4().simple())
}
