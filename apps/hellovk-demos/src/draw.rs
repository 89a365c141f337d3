//! Vertex layouts and command helpers shared by the demos.

use std::mem::{offset_of, size_of};

use ash::vk;
use hellovk_core::{ColorVertex, MeshData, TexturedVertex};
use hellovk_app::AppContext;
use hellovk_core::ShaderParameters;
use hellovk_gpu::{flipped_viewport, full_scissor, GpuBuffer, MemoryLocation};

/// Vertex input state for [`ColorVertex`].
pub fn color_vertex_input() -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let bindings = vec![vertex_binding(size_of::<ColorVertex>())];
    let attributes = vec![
        attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(ColorVertex, pos)),
        attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(ColorVertex, color)),
    ];
    (bindings, attributes)
}

/// Vertex input state for [`TexturedVertex`].
pub fn textured_vertex_input() -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let bindings = vec![vertex_binding(size_of::<TexturedVertex>())];
    let attributes = vec![
        attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(TexturedVertex, pos)),
        attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(TexturedVertex, color)),
        attribute(2, vk::Format::R32G32_SFLOAT, offset_of!(TexturedVertex, uv)),
    ];
    (bindings, attributes)
}

fn vertex_binding(stride: usize) -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription::default()
        .binding(0)
        .stride(stride as u32)
        .input_rate(vk::VertexInputRate::VERTEX)
}

fn attribute(location: u32, format: vk::Format, offset: usize) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription::default()
        .binding(0)
        .location(location)
        .format(format)
        .offset(offset as u32)
}

/// Vertex and index buffers of one indexed mesh.
pub struct MeshBuffers {
    pub vertices: GpuBuffer,
    pub indices: GpuBuffer,
    pub index_count: u32,
}

impl MeshBuffers {
    /// Upload `mesh` into host-visible buffers.
    pub fn upload<V: bytemuck::Pod>(
        ctx: &AppContext,
        mesh: &MeshData<V>,
        name: &str,
    ) -> hellovk_gpu::Result<Self> {
        Ok(Self {
            vertices: GpuBuffer::with_data(
                ctx.allocator(),
                mesh.vertex_bytes(),
                vk::BufferUsageFlags::VERTEX_BUFFER,
                &format!("{name} vertices"),
            )?,
            indices: GpuBuffer::with_data(
                ctx.allocator(),
                mesh.index_bytes(),
                vk::BufferUsageFlags::INDEX_BUFFER,
                &format!("{name} indices"),
            )?,
            index_count: mesh.index_count(),
        })
    }

    /// Bind both buffers and draw every index.
    ///
    /// # Safety
    /// `cmd` must be recording inside a render pass with a compatible
    /// pipeline bound.
    pub unsafe fn draw(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertices.handle()], &[0]);
        device.cmd_bind_index_buffer(cmd, self.indices.handle(), 0, vk::IndexType::UINT32);
        device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
    }
}

/// One host-visible [`ShaderParameters`] buffer per swapchain slot.
pub fn create_uniform_buffers(ctx: &AppContext, name: &str) -> hellovk_gpu::Result<Vec<GpuBuffer>> {
    (0..ctx.image_count())
        .map(|slot| {
            GpuBuffer::new(
                ctx.allocator(),
                ShaderParameters::SIZE,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
                &format!("{name} uniforms {slot}"),
            )
        })
        .collect()
}

/// Bind `pipeline` and cover `extent` with a y-up viewport.
///
/// # Safety
/// `cmd` must be recording inside a render pass.
pub unsafe fn bind_pipeline(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    pipeline: vk::Pipeline,
    extent: vk::Extent2D,
) {
    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
    device.cmd_set_viewport(cmd, 0, &[flipped_viewport(extent)]);
    device.cmd_set_scissor(cmd, 0, &[full_scissor(extent)]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_layout_matches_vertex() {
        let (bindings, attributes) = color_vertex_input();
        assert_eq!(bindings[0].stride, 24);
        assert_eq!(
            attributes.iter().map(|a| a.offset).collect::<Vec<_>>(),
            vec![0, 12]
        );
    }

    #[test]
    fn textured_layout_matches_vertex() {
        let (bindings, attributes) = textured_vertex_input();
        assert_eq!(bindings[0].stride, 32);
        assert_eq!(
            attributes.iter().map(|a| a.offset).collect::<Vec<_>>(),
            vec![0, 12, 24]
        );
        assert_eq!(attributes[2].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(
            attributes.iter().map(|a| a.location).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }
}
