//! FBX export
//!
//! The armature, its bones, and every mesh object are written as one binary
//! FBX file; the session texture directory is copied next to it so the
//! relative `texture/<file>` references resolve. Scenes saved as RON get
//! the same texture directory, with their image paths pointed at it.

mod fbx;
mod scene;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub use fbx::{FBX_MAGIC, FBX_VERSION, FbxNode, Property, object_name, write_document};
pub use scene::{SceneWriter, bone_matrix, texture_reference};

use crate::scene::{Document, SceneError};
use crate::session::{Session, TEXTURE_DIR};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to write {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },

    #[error("Failed to copy textures to {}: {reason}", path.display())]
    Textures { path: PathBuf, reason: String },

    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// What an export wrote
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportReport {
    /// The FBX or RON file
    pub path: PathBuf,
    /// Files copied into the `texture/` directory next to it
    pub textures: usize,
}

/// Write `doc` as binary FBX to `path`
pub fn export_fbx(doc: &Document, path: &Path) -> Result<(), ExportError> {
    let write_error = |e: std::io::Error| ExportError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let nodes = SceneWriter::new(doc).build();
    let file = File::create(path).map_err(write_error)?;
    let mut writer = BufWriter::new(file);
    write_document(&mut writer, &nodes).map_err(write_error)?;
    writer.flush().map_err(write_error)?;
    tracing::info!(
        "Exported {} bones and {} objects to {:?}",
        doc.armature.len(),
        doc.objects().len(),
        path
    );
    Ok(())
}

/// Write the FBX file, then copy the session's relocated textures to
/// `<out dir>/texture/`, merging with whatever is already there
pub fn export_fbx_with_textures(
    doc: &Document,
    session: &Session,
    path: &Path,
) -> Result<ExportReport, ExportError> {
    export_fbx(doc, path)?;
    let (_, textures) = copy_session_textures(session, path)?;

    Ok(ExportReport {
        path: path.to_path_buf(),
        textures,
    })
}

/// Save `doc` as RON next to a copy of the session's relocated textures.
/// Image paths in the saved scene point at the copies, so the scene stays
/// usable after the session is closed.
pub fn save_scene_with_textures(
    doc: &Document,
    session: &Session,
    path: &Path,
) -> Result<ExportReport, ExportError> {
    let (target, textures) = copy_session_textures(session, path)?;

    let mut saved = doc.clone();
    if let Some(source) = session.existing_texture_dir() {
        let target = std::path::absolute(&target).map_err(|e| ExportError::Textures {
            path: target.clone(),
            reason: e.to_string(),
        })?;
        let moved = saved.materials.relocate_images(&source, &target);
        tracing::debug!("Pointed {} images at {:?}", moved, target);
    }
    saved.save_ron(path)?;

    Ok(ExportReport {
        path: path.to_path_buf(),
        textures,
    })
}

/// Copy the session texture directory to `texture/` next to `path`.
/// Returns the target directory and the number of files copied.
fn copy_session_textures(session: &Session, path: &Path) -> Result<(PathBuf, usize), ExportError> {
    let out_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let target = out_dir.join(TEXTURE_DIR);
    let textures = match session.existing_texture_dir() {
        Some(source) => copy_dir_all(&source, &target).map_err(|e| ExportError::Textures {
            path: target.clone(),
            reason: e.to_string(),
        })?,
        None => {
            tracing::debug!("No textures to copy");
            0
        }
    };
    if textures > 0 {
        tracing::info!("Copied {} textures to {:?}", textures, target);
    }
    Ok((target, textures))
}

/// Recursively copy `src` into `dst`, overwriting files that exist in both.
/// Returns the number of files copied.
pub fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<usize> {
    std::fs::create_dir_all(dst)?;
    let mut copied = 0;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_copy_dir_merges() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::create_dir_all(&dst).unwrap();
        std::fs::write(src.join("a.png"), b"new").unwrap();
        std::fs::write(src.join("nested/b.png"), b"b").unwrap();
        std::fs::write(dst.join("a.png"), b"old").unwrap();
        std::fs::write(dst.join("keep.png"), b"keep").unwrap();

        assert_eq!(copy_dir_all(&src, &dst).unwrap(), 2);
        assert_eq!(std::fs::read(dst.join("a.png")).unwrap(), b"new");
        assert!(dst.join("keep.png").exists());
        assert!(dst.join("nested/b.png").exists());
    }

    #[test]
    fn test_export_without_textures() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("bot.fbx");
        let doc = Document::new("bot", 1.0);

        let report = export_fbx_with_textures(&doc, &Session::new(), &out).unwrap();
        assert_eq!(report.textures, 0);
        let data = std::fs::read(&out).unwrap();
        assert_eq!(&data[..21], FBX_MAGIC);
        assert!(!temp.path().join(TEXTURE_DIR).exists());
    }

    #[test]
    fn test_unwritable_target() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("missing/dir/bot.fbx");
        let err = export_fbx(&Document::new("bot", 1.0), &out).unwrap_err();
        assert!(matches!(err, ExportError::Write { .. }));
    }

    #[test]
    fn test_saved_scene_points_at_copied_textures() {
        let temp = tempdir().unwrap();
        let mut session = Session::with_root(temp.path().join("scratch"));
        let relocated = session.texture_dir().unwrap().join("T_wood.png");
        std::fs::write(&relocated, b"wood").unwrap();

        let mut doc = Document::new("bot", 1.0);
        let image = doc.materials.load_image(&relocated);
        doc.materials.add("Wood", crate::scene::BaseColor::Image(image));

        let out = temp.path().join("scene/bot.ron");
        std::fs::create_dir_all(out.parent().unwrap()).unwrap();
        let report = save_scene_with_textures(&doc, &session, &out).unwrap();
        assert_eq!(report.textures, 1);
        session.close().unwrap();
        assert!(!relocated.exists());

        let loaded = Document::load_ron(&out).unwrap();
        let saved = &loaded.materials.images()[0];
        assert_eq!(saved.path, temp.path().join("scene/texture/T_wood.png"));
        assert_eq!(std::fs::read(&saved.path).unwrap(), b"wood");
        // the in-memory document still points at the session
        assert_eq!(doc.materials.image(image).unwrap().path, relocated);
    }
}
