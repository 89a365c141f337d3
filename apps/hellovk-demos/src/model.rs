//! glTF / GLB / VRM model viewer.
//!
//! Every mesh gets one descriptor set per swapchain slot, pairing that slot's
//! uniform buffer with the mesh's material texture. Opaque meshes are drawn
//! first, blended meshes after them with the alpha pipeline.

use std::sync::Arc;

use anyhow::Context;
use ash::vk;
use glam::Vec3;
use hellovk_app::{AppContext, DemoApp, FrameContext};
use hellovk_core::{ModelData, ShaderParameters, TextureData};
use hellovk_gpu::{
    create_sampler, write_combined_image_sampler, write_uniform_buffer, DescriptorPool,
    DescriptorSetLayoutBuilder, GpuBuffer, GraphicsPipeline, GraphicsPipelineConfig, Owned,
    Texture,
};
use tracing::{debug, info, warn};

use crate::draw::{bind_pipeline, create_uniform_buffers, textured_vertex_input, MeshBuffers};

const EYE: Vec3 = Vec3::new(0.0, 1.0, 3.0);
/// Radians per second.
const SPIN_SPEED: f32 = 0.4;

struct GpuMesh {
    buffers: MeshBuffers,
    /// One per swapchain slot.
    descriptor_sets: Vec<vk::DescriptorSet>,
}

struct ModelResources {
    device: Arc<ash::Device>,
    pipeline: GraphicsPipeline,
    alpha_pipeline: Owned<vk::Pipeline>,
    opaque: Vec<GpuMesh>,
    blended: Vec<GpuMesh>,
    _descriptor_pool: DescriptorPool,
    _set_layout: Owned<vk::DescriptorSetLayout>,
    uniform_buffers: Vec<GpuBuffer>,
    _sampler: Owned<vk::Sampler>,
    _textures: Vec<Texture>,
}

/// Draws every mesh of a model file, slowly turning it.
#[derive(Default)]
pub struct ModelViewer {
    angle: f32,
    resources: Option<ModelResources>,
}

impl ModelViewer {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 1x1 white texture for materials that reference no image.
fn blank_texture() -> TextureData {
    TextureData {
        width: 1,
        height: 1,
        pixels: vec![255; 4],
    }
}

impl DemoApp for ModelViewer {
    fn prepare(&mut self, ctx: &AppContext) -> anyhow::Result<()> {
        let path = ctx
            .config
            .model
            .as_ref()
            .context("the model demo needs a model file (--model <path>)")?;
        let model = ModelData::load(path)
            .with_context(|| format!("failed to load model {}", path.display()))?;

        let textures = model
            .materials
            .iter()
            .enumerate()
            .map(|(i, material)| match &material.texture {
                Some(data) => ctx.upload_texture(data, &format!("material {i}")),
                None => ctx.upload_texture(&blank_texture(), &format!("material {i} (blank)")),
            })
            .collect::<hellovk_gpu::Result<Vec<_>>>()?;

        let device = ctx.shared_device();
        let sampler = unsafe { create_sampler(Arc::clone(&device))? };
        let uniform_buffers = create_uniform_buffers(ctx, "model")?;

        let drawable: Vec<_> = model
            .opaque_meshes()
            .map(|m| (m, false))
            .chain(model.blended_meshes().map(|m| (m, true)))
            .filter(|(m, _)| {
                let empty = m.mesh.indices.is_empty() || m.mesh.vertices.is_empty();
                if empty {
                    debug!("Skipping empty mesh");
                }
                !empty
            })
            .collect();

        let layout = DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .sampled_image(1, vk::ShaderStageFlags::FRAGMENT);
        let slot_count = ctx.image_count();
        let max_sets = (drawable.len() * slot_count).max(1) as u32;

        let set_layout = unsafe { layout.build(Arc::clone(&device))? };
        let descriptor_pool = unsafe {
            DescriptorPool::new(Arc::clone(&device), max_sets, &layout.pool_sizes(max_sets))?
        };

        let mut opaque = Vec::new();
        let mut blended = Vec::new();
        for (i, (mesh, is_blended)) in drawable.into_iter().enumerate() {
            let texture = textures.get(mesh.material_index).with_context(|| {
                format!("mesh {i} uses missing material {}", mesh.material_index)
            })?;

            let layouts = vec![set_layout.handle(); slot_count];
            let descriptor_sets = unsafe { descriptor_pool.allocate(&device, &layouts)? };
            for (&set, buffer) in descriptor_sets.iter().zip(&uniform_buffers) {
                unsafe {
                    write_uniform_buffer(&device, set, 0, buffer.handle());
                    write_combined_image_sampler(&device, set, 1, texture.view(), sampler.handle());
                }
            }

            let gpu_mesh = GpuMesh {
                buffers: MeshBuffers::upload(ctx, &mesh.mesh, &format!("mesh {i}"))?,
                descriptor_sets,
            };
            if is_blended {
                blended.push(gpu_mesh);
            } else {
                opaque.push(gpu_mesh);
            }
        }

        let (vertex_bindings, vertex_attributes) = textured_vertex_input();
        let config = GraphicsPipelineConfig {
            vertex_bindings,
            vertex_attributes,
            ..Default::default()
        }
        .with_shaders(ctx.shader_path("model.vert.spv"), ctx.shader_path("model.frag.spv"))?;
        let alpha_config = GraphicsPipelineConfig {
            alpha_blend: true,
            depth_write: false,
            ..config.clone()
        };

        let (pipeline, alpha_pipeline) = unsafe {
            let pipeline = GraphicsPipeline::new(
                Arc::clone(&device),
                ctx.render_pass(),
                &config,
                &[set_layout.handle()],
            )?;
            let alpha = pipeline.variant(Arc::clone(&device), ctx.render_pass(), &alpha_config)?;
            (pipeline, alpha)
        };

        info!(
            "Model ready: {} opaque meshes, {} blended meshes, {} textures",
            opaque.len(),
            blended.len(),
            textures.len()
        );
        self.resources = Some(ModelResources {
            device,
            pipeline,
            alpha_pipeline,
            opaque,
            blended,
            _descriptor_pool: descriptor_pool,
            _set_layout: set_layout,
            uniform_buffers,
            _sampler: sampler,
            _textures: textures,
        });
        Ok(())
    }

    fn cleanup(&mut self, _ctx: &AppContext) {
        self.resources = None;
    }

    fn update(&mut self, dt: f32) {
        self.angle = (self.angle + SPIN_SPEED * dt) % std::f32::consts::TAU;
    }

    fn record_draw_commands(&mut self, frame: &FrameContext) {
        let Some(res) = &self.resources else {
            return;
        };
        let slot = frame.slot_index;

        let params = ShaderParameters::orbit(self.angle, EYE, frame.aspect_ratio());
        if let Err(e) = res.uniform_buffers[slot].write(&[params]) {
            warn!("Failed to update model uniforms for slot {slot}: {e}");
        }

        let cmd = frame.command_buffer;
        let passes = [
            (res.pipeline.handle(), &res.opaque),
            (res.alpha_pipeline.handle(), &res.blended),
        ];
        for (pipeline, meshes) in passes {
            if meshes.is_empty() {
                continue;
            }
            unsafe {
                bind_pipeline(&res.device, cmd, pipeline, frame.extent);
                for mesh in meshes {
                    res.device.cmd_bind_descriptor_sets(
                        cmd,
                        vk::PipelineBindPoint::GRAPHICS,
                        res.pipeline.layout(),
                        0,
                        &[mesh.descriptor_sets[slot]],
                        &[],
                    );
                    mesh.buffers.draw(&res.device, cmd);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_texture_is_one_white_pixel() {
        let blank = blank_texture();
        assert_eq!((blank.width, blank.height), (1, 1));
        assert_eq!(blank.pixels, vec![255, 255, 255, 255]);
        assert_eq!(blank.byte_size(), 4);
    }
}
