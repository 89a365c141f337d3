//! Core data types for the hellovk demos.
//!
//! This crate holds everything the demos need that does not touch the GPU:
//! - Vertex layouts and the built-in triangle and cube geometry
//! - Shader parameter blocks and camera matrices
//! - Decoded textures
//! - Meshes and materials read from glTF files

pub mod error;
pub mod geometry;
pub mod model;
pub mod shader_params;
pub mod texture;

pub use error::{Error, Result};
pub use geometry::{ColorVertex, MeshData, TexturedVertex};
pub use model::{AlphaMode, MaterialData, ModelData, ModelMesh};
pub use shader_params::ShaderParameters;
pub use texture::TextureData;

/// Constants shared by every demo.
pub mod constants {
    /// Default window width.
    pub const WINDOW_WIDTH: u32 = 1280;
    /// Default window height.
    pub const WINDOW_HEIGHT: u32 = 720;
    /// Default window title.
    pub const APP_TITLE: &str = "Hello Vulkan";
    /// Color the render pass clears to.
    pub const CLEAR_COLOR: [f32; 4] = [0.2, 0.2, 0.7, 0.0];
    /// Depth the render pass clears to.
    pub const CLEAR_DEPTH: f32 = 1.0;
}
