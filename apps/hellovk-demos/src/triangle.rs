//! A single vertex-colored triangle.

use std::sync::Arc;

use hellovk_app::{AppContext, DemoApp, FrameContext};
use hellovk_core::geometry;
use hellovk_gpu::{GraphicsPipeline, GraphicsPipelineConfig};
use tracing::info;

use crate::draw::{bind_pipeline, color_vertex_input, MeshBuffers};

struct TriangleResources {
    device: Arc<ash::Device>,
    pipeline: GraphicsPipeline,
    mesh: MeshBuffers,
}

/// Red, blue and green corners interpolated across the face.
#[derive(Default)]
pub struct Triangle {
    resources: Option<TriangleResources>,
}

impl Triangle {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DemoApp for Triangle {
    fn prepare(&mut self, ctx: &AppContext) -> anyhow::Result<()> {
        let mesh = MeshBuffers::upload(ctx, &geometry::triangle(), "triangle")?;

        let (vertex_bindings, vertex_attributes) = color_vertex_input();
        let config = GraphicsPipelineConfig {
            vertex_bindings,
            vertex_attributes,
            ..Default::default()
        }
        .with_shaders(
            ctx.shader_path("triangle.vert.spv"),
            ctx.shader_path("triangle.frag.spv"),
        )?;

        // SAFETY: the render pass outlives the pipeline; both are released in
        // cleanup before the scheduler is torn down.
        let pipeline =
            unsafe { GraphicsPipeline::new(ctx.shared_device(), ctx.render_pass(), &config, &[])? };

        info!("Triangle ready");
        self.resources = Some(TriangleResources {
            device: ctx.shared_device(),
            pipeline,
            mesh,
        });
        Ok(())
    }

    fn cleanup(&mut self, _ctx: &AppContext) {
        self.resources = None;
    }

    fn record_draw_commands(&mut self, frame: &FrameContext) {
        let Some(res) = &self.resources else {
            return;
        };

        unsafe {
            bind_pipeline(&res.device, frame.command_buffer, res.pipeline.handle(), frame.extent);
            res.mesh.draw(&res.device, frame.command_buffer);
        }
    }
}
