//! Vertex layouts and built-in demo geometry.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Position + color vertex used by the triangle demo.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ColorVertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
}

/// Position + color + texture coordinate vertex used by the cube and model demos.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TexturedVertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

/// Indexed triangle list ready for upload.
#[derive(Clone, Debug, Default)]
pub struct MeshData<V> {
    pub vertices: Vec<V>,
    pub indices: Vec<u32>,
}

impl<V: Pod> MeshData<V> {
    /// Number of indices to draw.
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Vertex data as raw bytes.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index data as raw bytes.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// The red/blue/green triangle.
pub fn triangle() -> MeshData<ColorVertex> {
    let red = [1.0, 0.0, 0.0];
    let green = [0.0, 1.0, 0.0];
    let blue = [0.0, 0.0, 1.0];

    MeshData {
        vertices: vec![
            ColorVertex { pos: [-0.5, -0.5, 0.0], color: red },
            ColorVertex { pos: [0.5, -0.5, 0.0], color: blue },
            ColorVertex { pos: [0.0, 0.5, 0.0], color: green },
        ],
        indices: vec![0, 1, 2],
    }
}

/// Unit cube centered at the origin: 4 vertices per face so every face gets
/// its own UVs and color, 6 indices per face wound counter-clockwise when
/// seen from outside.
pub fn cube() -> MeshData<TexturedVertex> {
    // (outward normal, u axis, v axis, face color); u x v == normal
    let faces = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y, [1.0, 0.5, 0.5]),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y, [0.5, 1.0, 0.5]),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z, [0.5, 0.5, 1.0]),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z, [1.0, 1.0, 0.5]),
        (Vec3::Z, Vec3::X, Vec3::Y, [1.0, 0.5, 1.0]),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y, [0.5, 1.0, 1.0]),
    ];
    let corners = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

    let mut mesh = MeshData {
        vertices: Vec::with_capacity(24),
        indices: Vec::with_capacity(36),
    };

    for (normal, u, v, color) in faces {
        let base = mesh.vertices.len() as u32;
        for [s, t] in corners {
            let pos = normal * 0.5 + u * (s - 0.5) + v * (t - 0.5);
            mesh.vertices.push(TexturedVertex {
                pos: pos.to_array(),
                color,
                // Image rows run top to bottom.
                uv: [s, 1.0 - t],
            });
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layouts() {
        assert_eq!(std::mem::size_of::<ColorVertex>(), 24);
        assert_eq!(std::mem::offset_of!(ColorVertex, color), 12);

        assert_eq!(std::mem::size_of::<TexturedVertex>(), 32);
        assert_eq!(std::mem::offset_of!(TexturedVertex, color), 12);
        assert_eq!(std::mem::offset_of!(TexturedVertex, uv), 24);
    }

    #[test]
    fn triangle_data() {
        let mesh = triangle();
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.index_count(), 3);
        assert_eq!(mesh.vertex_bytes().len(), 3 * 24);
        assert_eq!(mesh.index_bytes().len(), 12);
    }

    #[test]
    fn cube_counts() {
        let mesh = cube();
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.index_count(), 36);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }

    #[test]
    fn cube_corners_on_unit_box() {
        for v in cube().vertices {
            for c in v.pos {
                approx::assert_relative_eq!(c.abs(), 0.5);
            }
            for t in v.uv {
                assert!((0.0..=1.0).contains(&t));
            }
        }
    }

    #[test]
    fn cube_faces_wind_outward() {
        let mesh = cube();
        for tri in mesh.indices.chunks(3) {
            let a = Vec3::from(mesh.vertices[tri[0] as usize].pos);
            let b = Vec3::from(mesh.vertices[tri[1] as usize].pos);
            let c = Vec3::from(mesh.vertices[tri[2] as usize].pos);
            let normal = (b - a).cross(c - a);
            let center = (a + b + c) / 3.0;
            assert!(normal.dot(center) > 0.0, "triangle {tri:?} faces inward");
        }
    }
}
