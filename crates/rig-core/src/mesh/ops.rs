//! In-place mesh operations used while building scene objects

use std::collections::HashMap;

use glam::{Mat4, Vec3};

use super::MeshData;

/// Default merge distance of [`MeshData::weld`]
pub const WELD_DISTANCE: f32 = 0.001;

/// Unit normal of a triangle, `+Z` for degenerate triangles
pub fn triangle_normal(v0: [f32; 3], v1: [f32; 3], v2: [f32; 3]) -> [f32; 3] {
    let (v0, v1, v2) = (Vec3::from(v0), Vec3::from(v1), Vec3::from(v2));
    let cross = (v1 - v0).cross(v2 - v0);
    if cross.length_squared() > f32::EPSILON * f32::EPSILON {
        cross.normalize().to_array()
    } else {
        [0.0, 0.0, 1.0]
    }
}

impl MeshData {
    /// Recompute every face normal from the triangle winding
    pub fn recompute_normals(&mut self) {
        self.normals = self
            .indices
            .chunks_exact(3)
            .map(|t| {
                triangle_normal(
                    self.vertices[t[0] as usize],
                    self.vertices[t[1] as usize],
                    self.vertices[t[2] as usize],
                )
            })
            .collect();
    }

    /// Apply an affine transform to the vertices; normals are recomputed so
    /// mirroring transforms keep them consistent with the winding
    pub fn transform(&mut self, matrix: Mat4) {
        for v in &mut self.vertices {
            *v = matrix.transform_point3(Vec3::from(*v)).to_array();
        }
        self.recompute_normals();
    }

    /// Reverse the winding of every triangle and negate its normal
    pub fn flip_normals(&mut self) {
        for tri in self.indices.chunks_exact_mut(3) {
            tri.swap(1, 2);
        }
        for n in &mut self.normals {
            *n = [-n[0], -n[1], -n[2]];
        }
    }

    /// Give the mesh a UV layer if it has none, by planar projection of the
    /// two largest bounding box extents
    pub fn ensure_uvs(&mut self) {
        if self.has_uvs() {
            return;
        }
        let Some((min, max)) = self.bounds() else {
            self.uvs.clear();
            return;
        };

        let size = [max[0] - min[0], max[1] - min[1], max[2] - min[2]];
        let mut axes = [0usize, 1, 2];
        axes.sort_by(|a, b| size[*b].total_cmp(&size[*a]));
        let (u, v) = (axes[0], axes[1]);

        let scale = |value: f32, axis: usize| {
            if size[axis] > 0.0 {
                (value - min[axis]) / size[axis]
            } else {
                0.0
            }
        };
        self.uvs = self
            .vertices
            .iter()
            .map(|p| [scale(p[u], u), scale(p[v], v)])
            .collect();
    }

    /// Merge vertices closer than `distance` and drop triangles that collapse
    pub fn weld(&mut self, distance: f32) {
        let precision = 1.0 / distance.max(f32::EPSILON);
        let mut map: HashMap<[i64; 3], u32> = HashMap::new();
        let mut remap = Vec::with_capacity(self.vertices.len());
        let mut vertices = Vec::new();
        let mut uvs = Vec::new();
        let keep_uvs = self.has_uvs();

        for (i, v) in self.vertices.iter().enumerate() {
            let key = [
                (v[0] * precision).round() as i64,
                (v[1] * precision).round() as i64,
                (v[2] * precision).round() as i64,
            ];
            let index = *map.entry(key).or_insert_with(|| {
                vertices.push(*v);
                if keep_uvs {
                    uvs.push(self.uvs[i]);
                }
                (vertices.len() - 1) as u32
            });
            remap.push(index);
        }

        let mut indices = Vec::with_capacity(self.indices.len());
        let mut normals = Vec::with_capacity(self.normals.len());
        let mut face_materials = Vec::with_capacity(self.face_materials.len());
        for (face, tri) in self.indices.chunks_exact(3).enumerate() {
            let t = [
                remap[tri[0] as usize],
                remap[tri[1] as usize],
                remap[tri[2] as usize],
            ];
            if t[0] == t[1] || t[1] == t[2] || t[0] == t[2] {
                continue;
            }
            indices.extend_from_slice(&t);
            normals.push(self.normals.get(face).copied().unwrap_or([0.0, 0.0, 1.0]));
            face_materials.push(self.face_materials.get(face).copied().unwrap_or(0));
        }

        let removed = self.vertices.len() - vertices.len();
        if removed > 0 {
            tracing::debug!("Weld merged {} vertices", removed);
        }

        self.vertices = vertices;
        self.uvs = uvs;
        self.indices = indices;
        self.normals = normals;
        self.face_materials = face_materials;
    }

    /// Append another mesh, shifting its material slots by `slot_offset`.
    ///
    /// If only one side has UVs, the other side gets zero UVs so the layer
    /// stays complete.
    pub fn append(&mut self, other: &MeshData, slot_offset: u32) {
        let base = self.vertices.len() as u32;
        let self_uvs = self.has_uvs() || self.vertices.is_empty();
        let other_uvs = other.has_uvs();

        if other_uvs && !self_uvs {
            self.uvs = vec![[0.0, 0.0]; self.vertices.len()];
        }
        if other_uvs || self.has_uvs() {
            if other_uvs {
                self.uvs.extend_from_slice(&other.uvs);
            } else {
                self.uvs
                    .extend(std::iter::repeat_n([0.0, 0.0], other.vertices.len()));
            }
        }

        self.vertices.extend_from_slice(&other.vertices);
        self.indices.extend(other.indices.iter().map(|i| i + base));
        self.normals.extend_from_slice(&other.normals);
        self.face_materials
            .extend(other.face_materials.iter().map(|m| m + slot_offset));
    }
}
