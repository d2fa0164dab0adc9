// SPDX-FileCopyrightText: 2025 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use glam::{Quat, Vec3};

/// Magnitudes below this are treated as a degenerate rotation.
const MIN_QUAT_LENGTH: f32 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: [f32; 2],
}

/// Axis-aligned bounds of a vertex stream.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

/// A plain triangle mesh as produced by the format readers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub bounds: BoundingBox,
}

impl MeshData {
    /// Recomputes the axis-aligned bounds from the current vertices.
    pub fn calculate_bounds(&mut self) {
        let Some(first) = self.vertices.first() else {
            return;
        };

        let mut min = first.position;
        let mut max = first.position;
        for vertex in &self.vertices {
            min = min.min(vertex.position);
            max = max.max(vertex.position);
        }
        self.bounds = BoundingBox { min, max };
    }
}

// The rotation is expanded algebraically instead of going through a full
// quaternion-conjugate product: t = 2(q x v), v' = v + w*t + (q x t).
fn quat_rotate(q: Quat, v: Vec3) -> Vec3 {
    let tx = 2.0 * (q.y * v.z - q.z * v.y);
    let ty = 2.0 * (q.z * v.x - q.x * v.z);
    let tz = 2.0 * (q.x * v.y - q.y * v.x);

    Vec3::new(
        v.x + q.w * tx + (q.y * tz - q.z * ty),
        v.y + q.w * ty + (q.z * tx - q.x * tz),
        v.z + q.w * tz + (q.x * ty - q.y * tx),
    )
}

fn normalize_or_identity(q: Quat) -> Quat {
    let length = (q.x * q.x + q.y * q.y + q.z * q.z + q.w * q.w).sqrt();
    if length > MIN_QUAT_LENGTH {
        Quat::from_xyzw(q.x / length, q.y / length, q.z / length, q.w / length)
    } else {
        Quat::IDENTITY
    }
}

/// Applies uniform scale, rotation and translation to every vertex in place
/// and recomputes the mesh bounds. Normals are rotated but neither scaled nor
/// translated. A near-zero rotation falls back to identity.
pub fn transform_vertices(mesh: &mut MeshData, translation: Vec3, rotation: Quat, scale: f32) {
    let rotation = normalize_or_identity(rotation);

    for vertex in &mut mesh.vertices {
        vertex.position = quat_rotate(rotation, vertex.position * scale) + translation;
        vertex.normal = quat_rotate(rotation, vertex.normal);
    }

    mesh.calculate_bounds();
}

/// Linear interpolation of two position streams over the shorter of the two
/// lengths; any tail beyond that is ignored.
pub fn blend_vertices(base: &[Vec3], target: &[Vec3], amount: f32) -> Vec<Vec3> {
    let count = base.len().min(target.len());
    let inverse = 1.0 - amount;

    (0..count)
        .map(|i| base[i] * inverse + target[i] * amount)
        .collect()
}
