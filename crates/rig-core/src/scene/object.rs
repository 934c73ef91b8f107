//! Mesh objects placed in the scene

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::material::MaterialId;
use crate::mesh::MeshData;
use crate::types::Frame;

/// Location, rotation and scale of an object
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub location: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            location: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            location: frame.position,
            rotation: frame.rotation,
            scale: Vec3::ONE,
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.location)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneObject {
    pub id: Uuid,
    pub name: String,
    /// Name of the mesh data, kept when the object is renamed
    pub mesh_name: String,
    pub mesh: MeshData,
    pub transform: Transform,
    /// Indexed by `MeshData::face_materials`
    pub material_slots: Vec<Option<MaterialId>>,
    pub parent_bone: Option<String>,
}

impl SceneObject {
    pub fn new(name: impl Into<String>, mesh: MeshData) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            mesh_name: name.clone(),
            name,
            mesh,
            transform: Transform::default(),
            material_slots: Vec::new(),
            parent_bone: None,
        }
    }

    /// Vertices in world space
    pub fn world_vertices(&self) -> Vec<Vec3> {
        let matrix = self.transform.to_matrix();
        self.mesh
            .vertices
            .iter()
            .map(|v| matrix.transform_point3(Vec3::from(*v)))
            .collect()
    }

    /// Replace the transform while keeping the geometry in place.
    ///
    /// A target scale with a zero component cannot be inverted; the current
    /// scale is baked instead and the target keeps a unit scale.
    fn retransform(&mut self, transform: Transform) {
        if transform.scale.cmpeq(Vec3::ZERO).any() {
            tracing::warn!(
                "{}: degenerate scale {:?} baked into the mesh",
                self.name,
                transform.scale
            );
            self.retransform(Transform {
                scale: Vec3::ONE,
                ..self.transform
            });
            self.retransform(Transform {
                scale: Vec3::ONE,
                ..transform
            });
            return;
        }

        let old = self.transform.to_matrix();
        let new = transform.to_matrix();
        self.mesh.transform(new.inverse() * old);
        self.transform = transform;
    }

    /// Move the object origin to `point` (world space) without moving the geometry
    pub fn set_origin(&mut self, point: Vec3) {
        let transform = Transform {
            location: point,
            ..self.transform
        };
        self.retransform(transform);
    }

    /// Bake the scale into the vertices, leaving a unit scale
    pub fn apply_scale(&mut self) {
        if self.transform.scale == Vec3::ONE {
            return;
        }
        let transform = Transform {
            scale: Vec3::ONE,
            ..self.transform
        };
        self.retransform(transform);
    }

    /// Whether the scale mirrors the geometry
    pub fn has_negative_scale(&self) -> bool {
        let s = self.transform.scale;
        s.x * s.y * s.z < 0.0
    }

    /// Append a material slot
    pub fn push_material(&mut self, material: Option<MaterialId>) {
        self.material_slots.push(material);
    }

    /// Merge `other` into this object, keeping both in place.
    ///
    /// Slots referring to a material this object already uses are shared.
    pub fn join(&mut self, mut other: SceneObject) {
        let to_local = self.transform.to_matrix().inverse() * other.transform.to_matrix();
        other.mesh.transform(to_local);

        let mut slot_map = Vec::with_capacity(other.material_slots.len());
        for slot in &other.material_slots {
            let existing = slot.and_then(|id| {
                self.material_slots
                    .iter()
                    .position(|s| *s == Some(id))
            });
            let index = match existing {
                Some(index) => index,
                None => {
                    self.material_slots.push(*slot);
                    self.material_slots.len() - 1
                }
            };
            slot_map.push(index as u32);
        }

        for slot in &mut other.mesh.face_materials {
            if let Some(&mapped) = slot_map.get(*slot as usize) {
                *slot = mapped;
            }
        }
        self.mesh.append(&other.mesh, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::generate_box;
    use approx::assert_relative_eq;

    fn assert_vec_eq(a: Vec3, b: Vec3) {
        assert_relative_eq!(a.x, b.x, epsilon = 1e-5);
        assert_relative_eq!(a.y, b.y, epsilon = 1e-5);
        assert_relative_eq!(a.z, b.z, epsilon = 1e-5);
    }

    #[test]
    fn test_set_origin_keeps_world_geometry() {
        let mut object = SceneObject::new("box", generate_box([1.0, 1.0, 1.0]));
        object.transform = Transform {
            location: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_z(0.7),
            scale: Vec3::new(2.0, 1.0, 0.5),
        };
        let before = object.world_vertices();

        object.set_origin(Vec3::new(-1.0, 0.0, 4.0));
        object.apply_scale();

        assert_eq!(object.transform.location, Vec3::new(-1.0, 0.0, 4.0));
        assert_eq!(object.transform.scale, Vec3::ONE);
        for (a, b) in before.iter().zip(object.world_vertices()) {
            assert_vec_eq(*a, b);
        }
    }

    #[test]
    fn test_zero_scale_stays_finite() {
        let mut object = SceneObject::new("box", generate_box([1.0, 1.0, 1.0]));
        object.transform.scale = Vec3::new(0.0, 1.0, 1.0);
        let before = object.world_vertices();

        object.set_origin(Vec3::new(1.0, 0.0, 0.0));
        object.apply_scale();

        assert_eq!(object.transform.scale, Vec3::ONE);
        assert!(object.mesh.vertices.iter().flatten().all(|c| c.is_finite()));
        for (a, b) in before.iter().zip(object.world_vertices()) {
            assert_vec_eq(*a, b);
        }
    }

    #[test]
    fn test_join_shares_slots() {
        let shared = MaterialId(Uuid::new_v4());
        let other_material = MaterialId(Uuid::new_v4());

        let mut a = SceneObject::new("a", generate_box([1.0, 1.0, 1.0]));
        a.push_material(Some(shared));

        let mut b = SceneObject::new("b", generate_box([1.0, 1.0, 1.0]));
        b.transform.location = Vec3::X * 3.0;
        b.push_material(Some(other_material));
        b.push_material(Some(shared));
        b.mesh.face_materials = (0..12).map(|i| (i % 2) as u32).collect();

        a.join(b);
        assert_eq!(a.material_slots, vec![Some(shared), Some(other_material)]);
        assert_eq!(a.mesh.triangle_count(), 24);
        // b's slot 0 became slot 1, its slot 1 became slot 0
        assert_eq!(a.mesh.face_materials[12], 1);
        assert_eq!(a.mesh.face_materials[13], 0);
        let (_, max) = a.mesh.bounds().unwrap();
        assert_relative_eq!(max[0], 3.5, epsilon = 1e-6);
    }
}
