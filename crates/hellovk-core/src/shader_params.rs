//! Uniform blocks shared with the shaders.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// World/view/projection matrices, laid out as three column-major `mat4`s.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ShaderParameters {
    pub world: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl Default for ShaderParameters {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

impl ShaderParameters {
    /// Size in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Build from matrices.
    pub fn new(world: Mat4, view: Mat4, proj: Mat4) -> Self {
        Self {
            world: world.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
        }
    }

    /// Object rotated `angle` radians around Y, seen from a fixed camera.
    ///
    /// The projection uses a 0..1 depth range; the renderer flips the
    /// viewport vertically so +Y stays up on screen.
    pub fn orbit(angle: f32, eye: Vec3, aspect: f32) -> Self {
        let world = Mat4::from_rotation_y(angle);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(60f32.to_radians(), aspect, 0.01, 100.0);
        Self::new(world, view, proj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_size() {
        // Three mat4 with std140 layout
        assert_eq!(ShaderParameters::SIZE, 192);
        assert_eq!(std::mem::offset_of!(ShaderParameters, view), 64);
        assert_eq!(std::mem::offset_of!(ShaderParameters, proj), 128);
    }

    #[test]
    fn orbit_projects_origin_inside_clip_volume() {
        let params = ShaderParameters::orbit(0.7, Vec3::new(0.0, 2.0, 4.0), 16.0 / 9.0);
        let mvp = Mat4::from_cols_array_2d(&params.proj)
            * Mat4::from_cols_array_2d(&params.view)
            * Mat4::from_cols_array_2d(&params.world);
        let clip = mvp * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;

        approx::assert_abs_diff_eq!(ndc.x, 0.0, epsilon = 1e-5);
        approx::assert_abs_diff_eq!(ndc.y, 0.0, epsilon = 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }
}
