//! glTF model loading.
//!
//! Each triangle primitive becomes one [`ModelMesh`]. Normals are carried in
//! the vertex color slot, matching the [`TexturedVertex`] layout the cube
//! demo already uses.

use std::path::Path;

use gltf::image::Format;

use crate::geometry::{MeshData, TexturedVertex};
use crate::texture::TextureData;
use crate::{Error, Result};

/// How a material's alpha channel is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum AlphaMode {
    /// Alpha ignored.
    #[default]
    Opaque,
    /// Alpha tested against a cutoff.
    Mask,
    /// Alpha blended over what was drawn before.
    Blend,
}

impl From<gltf::material::AlphaMode> for AlphaMode {
    fn from(mode: gltf::material::AlphaMode) -> Self {
        match mode {
            gltf::material::AlphaMode::Opaque => Self::Opaque,
            gltf::material::AlphaMode::Mask => Self::Mask,
            gltf::material::AlphaMode::Blend => Self::Blend,
        }
    }
}

impl AlphaMode {
    /// Whether meshes using this mode go through the blending pipeline.
    pub fn is_blended(self) -> bool {
        self == Self::Blend
    }
}

/// A material: one texture plus its alpha mode.
#[derive(Clone, Debug, Default)]
pub struct MaterialData {
    /// Base color texture, falling back to the normal map. `None` when the
    /// material references neither.
    pub texture: Option<TextureData>,
    pub alpha_mode: AlphaMode,
}

/// One drawable primitive.
#[derive(Clone, Debug)]
pub struct ModelMesh {
    pub mesh: MeshData<TexturedVertex>,
    /// Index into [`ModelData::materials`].
    pub material_index: usize,
}

/// Every mesh and material of a glTF/GLB file.
#[derive(Clone, Debug, Default)]
pub struct ModelData {
    pub meshes: Vec<ModelMesh>,
    pub materials: Vec<MaterialData>,
}

impl ModelData {
    /// Load a `.gltf` or `.glb` file along with its buffers and images.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.display().to_string()));
        }

        let (document, buffers, images) = gltf::import(path)?;

        let mut materials = Vec::with_capacity(document.materials().len() + 1);
        for material in document.materials() {
            let texture = material
                .pbr_metallic_roughness()
                .base_color_texture()
                .map(|info| info.texture())
                .or_else(|| material.normal_texture().map(|normal| normal.texture()));

            let texture = match texture {
                Some(texture) => {
                    let index = texture.source().index();
                    let image = images.get(index).ok_or_else(|| {
                        Error::InvalidData(format!("texture references missing image {index}"))
                    })?;
                    Some(convert_image(image)?)
                }
                None => None,
            };

            materials.push(MaterialData {
                texture,
                alpha_mode: material.alpha_mode().into(),
            });
        }

        // Primitives without a material share one default entry at the end.
        let default_material = materials.len();
        let mut uses_default = false;

        let mut meshes = Vec::new();
        for mesh in document.meshes() {
            for primitive in mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    tracing::warn!(
                        "Skipping non-triangle primitive in mesh {:?}",
                        mesh.name().unwrap_or("<unnamed>")
                    );
                    continue;
                }

                let reader = primitive
                    .reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));

                let positions: Vec<[f32; 3]> = reader
                    .read_positions()
                    .ok_or_else(|| Error::InvalidData("primitive has no positions".into()))?
                    .collect();
                let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(Iterator::collect);
                let uvs: Option<Vec<[f32; 2]>> =
                    reader.read_tex_coords(0).map(|uv| uv.into_f32().collect());

                let vertices =
                    assemble_vertices(&positions, normals.as_deref(), uvs.as_deref())?;
                let indices: Vec<u32> = match reader.read_indices() {
                    Some(indices) => indices.into_u32().collect(),
                    None => (0..vertices.len() as u32).collect(),
                };

                let material_index = primitive.material().index().unwrap_or_else(|| {
                    uses_default = true;
                    default_material
                });

                meshes.push(ModelMesh {
                    mesh: MeshData { vertices, indices },
                    material_index,
                });
            }
        }

        if uses_default {
            materials.push(MaterialData::default());
        }

        tracing::info!(
            "Loaded model {}: {} meshes, {} materials",
            path.display(),
            meshes.len(),
            materials.len()
        );

        Ok(Self { meshes, materials })
    }

    /// Meshes drawn by the opaque pipeline, in file order.
    pub fn opaque_meshes(&self) -> impl Iterator<Item = &ModelMesh> {
        self.meshes
            .iter()
            .filter(|m| !self.alpha_mode(m).is_blended())
    }

    /// Meshes drawn by the blending pipeline, in file order.
    pub fn blended_meshes(&self) -> impl Iterator<Item = &ModelMesh> {
        self.meshes
            .iter()
            .filter(|m| self.alpha_mode(m).is_blended())
    }

    fn alpha_mode(&self, mesh: &ModelMesh) -> AlphaMode {
        self.materials
            .get(mesh.material_index)
            .map_or(AlphaMode::Opaque, |m| m.alpha_mode)
    }
}

/// Zip per-vertex attributes into [`TexturedVertex`]es.
///
/// Missing normals become white, missing UVs become zero. Attribute streams
/// whose length differs from the position count are rejected.
pub fn assemble_vertices(
    positions: &[[f32; 3]],
    normals: Option<&[[f32; 3]]>,
    uvs: Option<&[[f32; 2]]>,
) -> Result<Vec<TexturedVertex>> {
    let count = positions.len();
    if let Some(normals) = normals {
        if normals.len() != count {
            return Err(Error::InvalidData(format!(
                "{} normals for {count} positions",
                normals.len()
            )));
        }
    }
    if let Some(uvs) = uvs {
        if uvs.len() != count {
            return Err(Error::InvalidData(format!(
                "{} texture coordinates for {count} positions",
                uvs.len()
            )));
        }
    }

    Ok(positions
        .iter()
        .enumerate()
        .map(|(i, &pos)| TexturedVertex {
            pos,
            color: normals.map_or([1.0; 3], |n| n[i]),
            uv: uvs.map_or([0.0; 2], |t| t[i]),
        })
        .collect())
}

/// Expand an 8-bit glTF image to RGBA8.
fn convert_image(image: &gltf::image::Data) -> Result<TextureData> {
    let pixels = expand_to_rgba8(image.format, &image.pixels)?;
    TextureData::from_rgba8(image.width, image.height, pixels)
}

fn expand_to_rgba8(format: Format, pixels: &[u8]) -> Result<Vec<u8>> {
    let rgba = match format {
        Format::R8G8B8A8 => pixels.to_vec(),
        Format::R8G8B8 => pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        Format::R8G8 => pixels
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[1], 0, 255])
            .collect(),
        Format::R8 => pixels.iter().flat_map(|&r| [r, r, r, 255]).collect(),
        other => {
            return Err(Error::InvalidData(format!(
                "unsupported texture format {other:?}"
            )))
        }
    };
    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_with_all_attributes() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let normals = [[0.0, 0.0, 1.0], [0.0, 1.0, 0.0]];
        let uvs = [[0.25, 0.5], [1.0, 1.0]];

        let vertices = assemble_vertices(&positions, Some(&normals), Some(&uvs)).unwrap();
        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[1].pos, [1.0, 0.0, 0.0]);
        assert_eq!(vertices[1].color, [0.0, 1.0, 0.0]);
        assert_eq!(vertices[0].uv, [0.25, 0.5]);
    }

    #[test]
    fn assemble_defaults_missing_attributes() {
        let vertices = assemble_vertices(&[[1.0, 2.0, 3.0]], None, None).unwrap();
        assert_eq!(vertices[0].color, [1.0; 3]);
        assert_eq!(vertices[0].uv, [0.0; 2]);
    }

    #[test]
    fn assemble_rejects_length_mismatch() {
        let positions = [[0.0; 3]; 3];
        assert!(assemble_vertices(&positions, Some(&[[0.0; 3]; 2]), None).is_err());
        assert!(assemble_vertices(&positions, None, Some(&[[0.0; 2]; 4])).is_err());
    }

    #[test]
    fn expands_rgb_and_gray() {
        let rgb = expand_to_rgba8(Format::R8G8B8, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(rgb, vec![1, 2, 3, 255, 4, 5, 6, 255]);

        let gray = expand_to_rgba8(Format::R8, &[9]).unwrap();
        assert_eq!(gray, vec![9, 9, 9, 255]);

        assert!(expand_to_rgba8(Format::R16G16B16A16, &[0; 8]).is_err());
    }

    #[test]
    fn alpha_mode_partitions_meshes() {
        let mesh = |material_index| ModelMesh {
            mesh: MeshData::default(),
            material_index,
        };
        let model = ModelData {
            meshes: vec![mesh(0), mesh(1), mesh(0), mesh(7)],
            materials: vec![
                MaterialData::default(),
                MaterialData {
                    texture: None,
                    alpha_mode: AlphaMode::Blend,
                },
            ],
        };

        assert_eq!(model.opaque_meshes().count(), 3);
        let blended: Vec<_> = model.blended_meshes().map(|m| m.material_index).collect();
        assert_eq!(blended, vec![1]);
    }

    #[test]
    fn missing_model_is_not_found() {
        assert!(matches!(
            ModelData::load("nope/missing.glb"),
            Err(Error::NotFound(_))
        ));
    }
}
