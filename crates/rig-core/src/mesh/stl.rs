//! STL file loading

use std::collections::HashMap;
use std::io::BufReader;
use std::path::Path;

use super::{ImportedMesh, MeshData, MeshError};

/// Load an STL file (ASCII or binary) as a single-slot mesh
pub fn load_stl(path: impl AsRef<Path>) -> Result<ImportedMesh, MeshError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| MeshError::Io(e.to_string()))?;
    let mut reader = BufReader::new(file);

    let stl = stl_io::read_stl(&mut reader).map_err(|e| MeshError::Parse(e.to_string()))?;
    let mesh = index_mesh(&stl);

    tracing::debug!(
        "Loaded STL {:?}: {} vertices, {} triangles",
        path,
        mesh.vertices.len(),
        mesh.triangle_count()
    );

    Ok(ImportedMesh {
        mesh,
        materials: Vec::new(),
    })
}

/// Convert triangle soup to indexed mesh
fn index_mesh(stl: &stl_io::IndexedMesh) -> MeshData {
    let mut mesh = MeshData::default();
    let mut vertex_map: HashMap<[i32; 3], u32> = HashMap::new();

    // Precision for vertex comparison (multiply by this, then round to int)
    const PRECISION: f32 = 10000.0;

    for face in &stl.faces {
        let normal = face.normal;
        mesh.normals.push([normal[0], normal[1], normal[2]]);
        mesh.face_materials.push(0);

        for &vertex_idx in &face.vertices {
            let vertex = stl.vertices[vertex_idx];
            let v = [vertex[0], vertex[1], vertex[2]];

            let key = [
                (v[0] * PRECISION).round() as i32,
                (v[1] * PRECISION).round() as i32,
                (v[2] * PRECISION).round() as i32,
            ];

            let index = *vertex_map.entry(key).or_insert_with(|| {
                mesh.vertices.push(v);
                (mesh.vertices.len() - 1) as u32
            });
            mesh.indices.push(index);
        }
    }

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TETRA: &str = "solid t
facet normal 0 0 -1
 outer loop
  vertex 0 0 0
  vertex 0 1 0
  vertex 1 0 0
 endloop
endfacet
facet normal 0 -1 0
 outer loop
  vertex 0 0 0
  vertex 1 0 0
  vertex 0 0 1
 endloop
endfacet
endsolid t
";

    #[test]
    fn test_load_ascii_stl_shares_vertices() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("t.stl");
        std::fs::write(&path, TETRA).unwrap();

        let imported = load_stl(&path).unwrap();
        assert_eq!(imported.mesh.triangle_count(), 2);
        assert_eq!(imported.mesh.vertices.len(), 4);
        assert_eq!(imported.mesh.normals[1], [0.0, -1.0, 0.0]);
        assert_eq!(imported.mesh.face_materials, vec![0, 0]);
        assert!(imported.materials.is_empty());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_stl("/definitely/not/here.stl"),
            Err(MeshError::Io(_))
        ));
    }
}
