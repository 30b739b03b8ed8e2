//! Scoped scratch files for intermediate images
//!
//! An enhanced image lives on disk only while its extraction call is in
//! flight. The file is removed when the [`ScratchArtifact`] guard drops, on
//! every exit path of the request. Removal failures are logged, never raised.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory holding in-flight scratch artifacts
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Use `root` as the scratch directory, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create scratch directory {:?}", root))?;
        Ok(Self { root })
    }

    /// Scratch directory path
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Write `data` to a fresh uniquely named file
    pub fn persist(&self, data: &[u8], extension: &str) -> Result<ScratchArtifact> {
        let name = format!("{}_enhanced.{}", uuid::Uuid::new_v4(), extension);
        let path = self.root.join(name);
        std::fs::write(&path, data)
            .with_context(|| format!("Failed to write scratch artifact {:?}", path))?;
        Ok(ScratchArtifact { path })
    }
}

/// A file that is deleted when the guard goes out of scope
#[derive(Debug)]
pub struct ScratchArtifact {
    path: PathBuf,
}

impl ScratchArtifact {
    /// Location of the artifact on disk
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Cleaned up scratch artifact {:?}", self.path),
            Err(e) => warn!("Failed to delete scratch artifact {:?}: {}", self.path, e),
        }
    }
}
