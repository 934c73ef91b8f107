//! Mesh file loading (STL, OBJ, DAE) and primitive generation

mod dae;
mod obj;
mod ops;
mod primitive;
mod stl;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use dae::load_dae;
pub use obj::load_obj;
pub use ops::{WELD_DISTANCE, triangle_normal};
pub use primitive::{
    CYLINDER_VERTICES, SPHERE_RINGS, SPHERE_SEGMENTS, generate_box, generate_cylinder,
    generate_uv_sphere,
};
pub use stl::load_stl;

/// Triangle mesh with optional per-vertex UVs and per-triangle material slots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<[f32; 3]>,
    /// One normal per triangle
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    /// One UV per vertex, or empty when the mesh has no UV layer
    pub uvs: Vec<[f32; 2]>,
    /// Material slot index per triangle
    pub face_materials: Vec<u32>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn has_uvs(&self) -> bool {
        !self.uvs.is_empty() && self.uvs.len() == self.vertices.len()
    }

    /// Axis-aligned bounds, `None` for a mesh without vertices
    pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        let first = *self.vertices.first()?;
        let mut min = first;
        let mut max = first;
        for v in &self.vertices {
            for i in 0..3 {
                min[i] = min[i].min(v[i]);
                max[i] = max[i].max(v[i]);
            }
        }
        Some((min, max))
    }
}

/// Material as referenced by a mesh file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMaterial {
    pub name: String,
    pub color: Option<[f32; 4]>,
    /// Absolute path of the diffuse texture
    pub texture: Option<PathBuf>,
}

impl SourceMaterial {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Mesh loaded from a file, with the materials its slots refer to
#[derive(Debug, Clone, Default)]
pub struct ImportedMesh {
    pub mesh: MeshData,
    /// Indexed by `MeshData::face_materials`
    pub materials: Vec<SourceMaterial>,
}

/// Detect mesh format from file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Stl,
    Obj,
    Dae,
    Unknown,
}

impl MeshFormat {
    /// Detect format from file path
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_lowercase())
            .as_deref()
        {
            Some("stl") => MeshFormat::Stl,
            Some("obj") => MeshFormat::Obj,
            Some("dae") => MeshFormat::Dae,
            _ => MeshFormat::Unknown,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, MeshFormat::Unknown)
    }

    pub fn name(&self) -> &'static str {
        match self {
            MeshFormat::Stl => "STL",
            MeshFormat::Obj => "OBJ",
            MeshFormat::Dae => "DAE (COLLADA)",
            MeshFormat::Unknown => "Unknown",
        }
    }
}

/// Load any supported mesh format
pub fn load_mesh(path: impl AsRef<Path>) -> Result<ImportedMesh, MeshError> {
    let path = path.as_ref();

    let imported = match MeshFormat::from_path(path) {
        MeshFormat::Stl => load_stl(path)?,
        MeshFormat::Obj => load_obj(path)?,
        MeshFormat::Dae => load_dae(path)?,
        MeshFormat::Unknown => {
            return Err(MeshError::UnsupportedFormat(
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("unknown")
                    .to_string(),
            ));
        }
    };

    if imported.mesh.is_empty() {
        return Err(MeshError::EmptyMesh);
    }
    Ok(imported)
}

/// Mesh-related errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum MeshError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Empty mesh: no geometry found")]
    EmptyMesh,
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(MeshFormat::from_path(Path::new("a/b.STL")), MeshFormat::Stl);
        assert_eq!(MeshFormat::from_path(Path::new("b.obj")), MeshFormat::Obj);
        assert_eq!(MeshFormat::from_path(Path::new("b.Dae")), MeshFormat::Dae);
        assert_eq!(MeshFormat::from_path(Path::new("b.ply")), MeshFormat::Unknown);
        assert!(!MeshFormat::Unknown.is_supported());
    }

    #[test]
    fn test_unknown_extension() {
        assert!(matches!(
            load_mesh("robot/meshes/base.ply"),
            Err(MeshError::UnsupportedFormat(ext)) if ext == "ply"
        ));
    }

    #[test]
    fn test_bounds() {
        let mesh = MeshData {
            vertices: vec![[1.0, -2.0, 0.0], [-1.0, 3.0, 0.5]],
            ..Default::default()
        };
        assert_eq!(mesh.bounds(), Some(([-1.0, -2.0, 0.0], [1.0, 3.0, 0.5])));
        assert_eq!(MeshData::default().bounds(), None);
    }
}
