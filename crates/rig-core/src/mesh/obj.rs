//! Wavefront OBJ loading via `tobj`

use std::path::Path;

use super::{ImportedMesh, MeshData, MeshError, SourceMaterial, triangle_normal};

/// Load an OBJ file, joining all of its models into one mesh.
///
/// Materials from the companion MTL file become the mesh's slots; a missing
/// MTL file is not an error.
pub fn load_obj(path: impl AsRef<Path>) -> Result<ImportedMesh, MeshError> {
    let path = path.as_ref();
    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };

    let (models, materials) = tobj::load_obj(path, &options).map_err(|e| match e {
        tobj::LoadError::OpenFileFailed => MeshError::Io(format!("cannot open {}", path.display())),
        other => MeshError::Parse(other.to_string()),
    })?;

    let obj_dir = path.parent().unwrap_or(Path::new(""));
    let materials: Vec<SourceMaterial> = match materials {
        Ok(materials) => materials
            .into_iter()
            .map(|m| {
                let alpha = m.dissolve.unwrap_or(1.0);
                SourceMaterial {
                    color: m.diffuse.map(|d| [d[0], d[1], d[2], alpha]),
                    texture: m
                        .diffuse_texture
                        .filter(|t| !t.is_empty())
                        .map(|t| obj_dir.join(t)),
                    name: m.name,
                }
            })
            .collect(),
        Err(e) => {
            tracing::debug!("No materials for {:?}: {}", path, e);
            Vec::new()
        }
    };

    let mut mesh = MeshData::default();
    let mut with_uvs = true;

    for model in &models {
        let m = &model.mesh;
        let base = mesh.vertices.len() as u32;
        let slot = m.material_id.unwrap_or(0) as u32;

        mesh.vertices
            .extend(m.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]));

        if m.texcoords.len() / 2 == m.positions.len() / 3 && !m.texcoords.is_empty() {
            mesh.uvs
                .extend(m.texcoords.chunks_exact(2).map(|t| [t[0], t[1]]));
        } else {
            with_uvs = false;
        }

        for tri in m.indices.chunks_exact(3) {
            let idx = [tri[0] + base, tri[1] + base, tri[2] + base];
            let normal = triangle_normal(
                mesh.vertices[idx[0] as usize],
                mesh.vertices[idx[1] as usize],
                mesh.vertices[idx[2] as usize],
            );
            mesh.indices.extend_from_slice(&idx);
            mesh.normals.push(normal);
            mesh.face_materials.push(slot);
        }
    }

    // a partial UV layer is worse than none
    if !with_uvs {
        mesh.uvs.clear();
    }

    tracing::debug!(
        "Loaded OBJ {:?}: {} models, {} triangles, {} materials",
        path,
        models.len(),
        mesh.triangle_count(),
        materials.len()
    );

    Ok(ImportedMesh { mesh, materials })
}
