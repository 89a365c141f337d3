//! A spinning textured cube.
//!
//! Each swapchain slot has its own uniform buffer and descriptor set, so the
//! matrices for a frame are written only into the buffer of the slot the
//! scheduler just waited on.

use std::sync::Arc;

use ash::vk;
use glam::Vec3;
use hellovk_app::{AppContext, DemoApp, FrameContext};
use hellovk_core::{geometry, ShaderParameters, TextureData};
use hellovk_gpu::{
    create_sampler, write_combined_image_sampler, write_uniform_buffer, DescriptorPool,
    DescriptorSetLayoutBuilder, GpuBuffer, GraphicsPipeline, GraphicsPipelineConfig, Owned,
    Texture,
};
use tracing::{info, warn};

use crate::draw::{bind_pipeline, create_uniform_buffers, textured_vertex_input, MeshBuffers};

const EYE: Vec3 = Vec3::new(0.0, 1.5, 3.0);
/// Radians per second.
const SPIN_SPEED: f32 = 0.8;

struct CubeResources {
    device: Arc<ash::Device>,
    pipeline: GraphicsPipeline,
    /// Freed with the pool.
    descriptor_sets: Vec<vk::DescriptorSet>,
    _descriptor_pool: DescriptorPool,
    _set_layout: Owned<vk::DescriptorSetLayout>,
    uniform_buffers: Vec<GpuBuffer>,
    _sampler: Owned<vk::Sampler>,
    _texture: Texture,
    mesh: MeshBuffers,
}

/// Textured cube rotating around the Y axis.
#[derive(Default)]
pub struct TexturedCube {
    angle: f32,
    resources: Option<CubeResources>,
}

impl TexturedCube {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DemoApp for TexturedCube {
    fn prepare(&mut self, ctx: &AppContext) -> anyhow::Result<()> {
        let image = match &ctx.config.texture {
            Some(path) => TextureData::from_path(path)?,
            None => {
                info!("No texture given, using a checkerboard");
                TextureData::checkerboard(256, 8)
            }
        };
        let texture = ctx.upload_texture(&image, "cube texture")?;

        let device = ctx.shared_device();
        let sampler = unsafe { create_sampler(Arc::clone(&device))? };

        let layout = DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .sampled_image(1, vk::ShaderStageFlags::FRAGMENT);
        let slot_count = ctx.image_count() as u32;

        let (set_layout, descriptor_pool, descriptor_sets) = unsafe {
            let set_layout = layout.build(Arc::clone(&device))?;
            let pool = DescriptorPool::new(
                Arc::clone(&device),
                slot_count,
                &layout.pool_sizes(slot_count),
            )?;
            let layouts = vec![set_layout.handle(); slot_count as usize];
            let sets = pool.allocate(&device, &layouts)?;
            (set_layout, pool, sets)
        };

        let uniform_buffers = create_uniform_buffers(ctx, "cube")?;
        for (&set, buffer) in descriptor_sets.iter().zip(&uniform_buffers) {
            unsafe {
                write_uniform_buffer(&device, set, 0, buffer.handle());
                write_combined_image_sampler(&device, set, 1, texture.view(), sampler.handle());
            }
        }

        let (vertex_bindings, vertex_attributes) = textured_vertex_input();
        let config = GraphicsPipelineConfig {
            vertex_bindings,
            vertex_attributes,
            ..Default::default()
        }
        .with_shaders(ctx.shader_path("cube.vert.spv"), ctx.shader_path("cube.frag.spv"))?;
        let pipeline = unsafe {
            GraphicsPipeline::new(
                Arc::clone(&device),
                ctx.render_pass(),
                &config,
                &[set_layout.handle()],
            )?
        };

        let mesh = MeshBuffers::upload(ctx, &geometry::cube(), "cube")?;

        info!(
            "Cube ready: {}x{} texture, {} slots",
            image.width, image.height, slot_count
        );
        self.resources = Some(CubeResources {
            device,
            pipeline,
            descriptor_sets,
            _descriptor_pool: descriptor_pool,
            _set_layout: set_layout,
            uniform_buffers,
            _sampler: sampler,
            _texture: texture,
            mesh,
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
            warn!("Failed to update cube uniforms for slot {slot}: {e}");
        }

        let cmd = frame.command_buffer;
        unsafe {
            bind_pipeline(&res.device, cmd, res.pipeline.handle(), frame.extent);
            res.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                res.pipeline.layout(),
                0,
                &[res.descriptor_sets[slot]],
                &[],
            );
            res.mesh.draw(&res.device, cmd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_wraps() {
        let mut cube = TexturedCube::new();
        for _ in 0..100 {
            cube.update(0.5);
        }
        assert!((0.0..std::f32::consts::TAU).contains(&cube.angle));
        assert!(cube.angle > 0.0);
    }
}
