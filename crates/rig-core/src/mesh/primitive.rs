//! Primitive shapes for URDF `<cylinder>`, `<box>` and `<sphere>` visuals
//!
//! All primitives are centered on the origin, wound counter-clockwise when
//! seen from outside, and carry a UV layer.

use std::f32::consts::{PI, TAU};

use super::MeshData;

/// Vertices around a cylinder
pub const CYLINDER_VERTICES: u32 = 32;
/// Segments around a UV sphere
pub const SPHERE_SEGMENTS: u32 = 32;
/// Rings from pole to pole of a UV sphere
pub const SPHERE_RINGS: u32 = 16;

struct Builder {
    mesh: MeshData,
}

impl Builder {
    fn new() -> Self {
        Self {
            mesh: MeshData::default(),
        }
    }

    fn vertex(&mut self, position: [f32; 3], uv: [f32; 2]) -> u32 {
        self.mesh.vertices.push(position);
        self.mesh.uvs.push(uv);
        (self.mesh.vertices.len() - 1) as u32
    }

    fn triangle(&mut self, a: u32, b: u32, c: u32) {
        self.mesh.indices.extend_from_slice(&[a, b, c]);
        self.mesh.face_materials.push(0);
    }

    fn finish(mut self) -> MeshData {
        self.mesh.recompute_normals();
        self.mesh
    }
}

/// Cylinder along Z with the given radius and total length
pub fn generate_cylinder(radius: f32, depth: f32) -> MeshData {
    let mut b = Builder::new();
    let half = depth / 2.0;
    let n = CYLINDER_VERTICES;

    // side, with a duplicated seam column for the UV wrap
    let mut bottom = Vec::with_capacity(n as usize + 1);
    let mut top = Vec::with_capacity(n as usize + 1);
    for i in 0..=n {
        let t = i as f32 / n as f32;
        let (sin, cos) = (t * TAU).sin_cos();
        bottom.push(b.vertex([radius * cos, radius * sin, -half], [t, 0.0]));
        top.push(b.vertex([radius * cos, radius * sin, half], [t, 0.5]));
    }
    for i in 0..n as usize {
        b.triangle(bottom[i], bottom[i + 1], top[i + 1]);
        b.triangle(bottom[i], top[i + 1], top[i]);
    }

    // caps, laid out side by side in the upper half of UV space
    for (z, u_offset, up) in [(half, 0.0, true), (-half, 0.5, false)] {
        let center = b.vertex([0.0, 0.0, z], [u_offset + 0.25, 0.75]);
        let ring: Vec<u32> = (0..n)
            .map(|i| {
                let (sin, cos) = (i as f32 / n as f32 * TAU).sin_cos();
                b.vertex(
                    [radius * cos, radius * sin, z],
                    [u_offset + 0.25 + 0.25 * cos, 0.75 + 0.25 * sin],
                )
            })
            .collect();
        for i in 0..n as usize {
            let next = ring[(i + 1) % n as usize];
            if up {
                b.triangle(center, ring[i], next);
            } else {
                b.triangle(center, next, ring[i]);
            }
        }
    }

    b.finish()
}

/// Axis-aligned box with the given edge lengths
pub fn generate_box(size: [f32; 3]) -> MeshData {
    let mut b = Builder::new();
    let half = [size[0] / 2.0, size[1] / 2.0, size[2] / 2.0];

    // (normal, u axis, v axis) with u x v = normal
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
        ([-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
        ([0.0, -1.0, 0.0], [0.0, 0.0, -1.0], [1.0, 0.0, 0.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];

    for (normal, u, v) in FACES {
        let corners: Vec<u32> = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
            .into_iter()
            .map(|(a, c): (f32, f32)| {
                let p: [f32; 3] =
                    std::array::from_fn(|k| (normal[k] + a * u[k] + c * v[k]) * half[k]);
                b.vertex(p, [(a + 1.0) / 2.0, (c + 1.0) / 2.0])
            })
            .collect();
        b.triangle(corners[0], corners[1], corners[2]);
        b.triangle(corners[0], corners[2], corners[3]);
    }

    b.finish()
}

/// UV sphere with poles on the Z axis
pub fn generate_uv_sphere(radius: f32) -> MeshData {
    let mut b = Builder::new();
    let (segments, rings) = (SPHERE_SEGMENTS, SPHERE_RINGS);
    let columns = segments + 1;

    for j in 0..=rings {
        let phi = PI * j as f32 / rings as f32;
        let (sin_phi, cos_phi) = phi.sin_cos();
        for i in 0..=segments {
            let t = i as f32 / segments as f32;
            let (sin_theta, cos_theta) = (t * TAU).sin_cos();
            b.vertex(
                [
                    radius * sin_phi * cos_theta,
                    radius * sin_phi * sin_theta,
                    radius * cos_phi,
                ],
                [t, 1.0 - j as f32 / rings as f32],
            );
        }
    }

    for j in 0..rings {
        for i in 0..segments {
            let a = j * columns + i;
            let below = a + columns;
            // poles collapse one triangle of each quad
            if j != rings - 1 {
                b.triangle(a, below, below + 1);
            }
            if j != 0 {
                b.triangle(a, below + 1, a + 1);
            }
        }
    }

    b.finish()
}
