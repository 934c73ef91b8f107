//! Visual geometry descriptors

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Geometry of a URDF visual, one variant per supported kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    /// Mesh file reference; `filename` is rewritten to an absolute path
    /// once package and file URIs are resolved
    Mesh {
        filename: String,
        scale: Option<[f32; 3]>,
    },
    Cylinder {
        radius: f32,
        length: f32,
    },
    Cube {
        size: [f32; 3],
    },
    Sphere {
        radius: f32,
    },
    /// A geometry kind the builder cannot generate (e.g. capsule)
    Unsupported {
        kind: String,
    },
    Empty,
}

impl Geometry {
    /// Short kind name used in object names and diagnostics
    pub fn kind(&self) -> &str {
        match self {
            Geometry::Mesh { .. } => "mesh",
            Geometry::Cylinder { .. } => "cylinder",
            Geometry::Cube { .. } => "cube",
            Geometry::Sphere { .. } => "sphere",
            Geometry::Unsupported { kind } => kind,
            Geometry::Empty => "empty",
        }
    }

    /// Mesh file path, if this is a mesh reference
    pub fn mesh_path(&self) -> Option<PathBuf> {
        match self {
            Geometry::Mesh { filename, .. } => Some(PathBuf::from(filename)),
            _ => None,
        }
    }

    /// Visual scale; only mesh references carry one
    pub fn scale(&self) -> [f32; 3] {
        match self {
            Geometry::Mesh {
                scale: Some(scale), ..
            } => *scale,
            _ => [1.0; 3],
        }
    }
}

impl From<&urdf_rs::Geometry> for Geometry {
    fn from(geometry: &urdf_rs::Geometry) -> Self {
        match geometry {
            urdf_rs::Geometry::Mesh { filename, scale } => {
                if filename.is_empty() {
                    return Geometry::Empty;
                }
                Geometry::Mesh {
                    filename: filename.clone(),
                    scale: scale
                        .as_ref()
                        .map(|s| [s.0[0] as f32, s.0[1] as f32, s.0[2] as f32]),
                }
            }
            urdf_rs::Geometry::Box { size } => Geometry::Cube {
                size: [size.0[0] as f32, size.0[1] as f32, size.0[2] as f32],
            },
            urdf_rs::Geometry::Cylinder { radius, length } => Geometry::Cylinder {
                radius: *radius as f32,
                length: *length as f32,
            },
            urdf_rs::Geometry::Sphere { radius } => Geometry::Sphere {
                radius: *radius as f32,
            },
            urdf_rs::Geometry::Capsule { .. } => Geometry::Unsupported {
                kind: "capsule".to_string(),
            },
        }
    }
}
