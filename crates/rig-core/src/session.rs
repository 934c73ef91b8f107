//! Temporary state owned by one import/export session
//!
//! Relocated textures and rewritten COLLADA documents live in a temporary
//! directory that is created on first use and removed when the session is
//! dropped.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Directory name used for relocated textures, both in the session and next
/// to exported files
pub const TEXTURE_DIR: &str = "texture";

const TEMP_GEOMETRY_FILE: &str = "tmp.dae";

#[derive(Debug, Default)]
pub struct Session {
    root: Option<PathBuf>,
    dir: Option<TempDir>,
}

impl Session {
    /// Session whose temporary directory lives under the system temp dir
    pub fn new() -> Self {
        Self::default()
    }

    /// Session whose temporary directory lives under `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            dir: None,
        }
    }

    fn dir(&mut self) -> io::Result<&Path> {
        if self.dir.is_none() {
            let mut builder = tempfile::Builder::new();
            builder.prefix("urdf-rig-");
            let dir = match &self.root {
                Some(root) => {
                    std::fs::create_dir_all(root)?;
                    builder.tempdir_in(root)?
                }
                None => builder.tempdir()?,
            };
            tracing::debug!("Created session directory {:?}", dir.path());
            self.dir = Some(dir);
        }

        match &self.dir {
            Some(dir) => Ok(dir.path()),
            None => Err(io::Error::other("session directory unavailable")),
        }
    }

    /// Directory holding relocated textures, created on demand
    pub fn texture_dir(&mut self) -> io::Result<PathBuf> {
        let dir = self.dir()?.join(TEXTURE_DIR);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Texture directory if anything has been relocated into it
    pub fn existing_texture_dir(&self) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?.path().join(TEXTURE_DIR);
        dir.is_dir().then_some(dir)
    }

    /// Path the rewritten COLLADA document is written to
    pub fn temp_geometry_path(&mut self) -> io::Result<PathBuf> {
        Ok(self.dir()?.join(TEMP_GEOMETRY_FILE))
    }

    /// Remove the rewritten COLLADA document if present
    pub fn discard_temp_geometry(&self) {
        let Some(dir) = &self.dir else {
            return;
        };
        let path = dir.path().join(TEMP_GEOMETRY_FILE);
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!("Failed to remove {:?}: {}", path, e);
            }
        }
    }

    /// Delete the temporary directory now instead of on drop
    pub fn close(&mut self) -> io::Result<()> {
        match self.dir.take() {
            Some(dir) => dir.close(),
            None => Ok(()),
        }
    }
}
