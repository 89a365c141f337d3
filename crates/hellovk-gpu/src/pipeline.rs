//! Graphics pipeline creation and SPIR-V loading.

use crate::error::{GpuError, Result};
use crate::owned::Owned;
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// Read a compiled SPIR-V file.
pub fn load_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| GpuError::ShaderLoad(format!("{}: {e}", path.display())))?;
    parse_spirv(&bytes).map_err(|e| match e {
        GpuError::ShaderLoad(msg) => GpuError::ShaderLoad(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Decode SPIR-V words from bytes, fixing up endianness.
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| GpuError::ShaderLoad(e.to_string()))
}

/// Graphics pipeline configuration.
#[derive(Clone)]
pub struct GraphicsPipelineConfig {
    pub vertex_shader: Vec<u32>,
    pub fragment_shader: Vec<u32>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: vk::CompareOp,
    /// Standard `src_alpha, 1 - src_alpha` blending.
    pub alpha_blend: bool,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            vertex_shader: Vec::new(),
            fragment_shader: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
            depth_compare: vk::CompareOp::LESS_OR_EQUAL,
            alpha_blend: false,
        }
    }
}

impl GraphicsPipelineConfig {
    /// Load vertex and fragment shaders from SPIR-V files.
    pub fn with_shaders(mut self, vertex: impl AsRef<Path>, fragment: impl AsRef<Path>) -> Result<Self> {
        self.vertex_shader = load_spirv(vertex)?;
        self.fragment_shader = load_spirv(fragment)?;
        Ok(self)
    }

    fn color_blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        if self.alpha_blend {
            state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD)
        } else {
            state.blend_enable(false)
        }
    }
}

/// Graphics pipeline and its layout, both destroyed on drop.
pub struct GraphicsPipeline {
    pipeline: Owned<vk::Pipeline>,
    layout: Owned<vk::PipelineLayout>,
}

impl GraphicsPipeline {
    /// Create a pipeline for subpass 0 of `render_pass` with dynamic
    /// viewport and scissor.
    ///
    /// # Safety
    /// The device must be valid and shader code must be valid SPIR-V.
    pub unsafe fn new(
        device: Arc<ash::Device>,
        render_pass: vk::RenderPass,
        config: &GraphicsPipelineConfig,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Self> {
        let layout_info =
            vk::PipelineLayoutCreateInfo::default().set_layouts(descriptor_set_layouts);
        let layout = device
            .create_pipeline_layout(&layout_info, None)
            .map_err(|e| GpuError::PipelineCreation(e.to_string()))?;
        let layout = Owned::new(Arc::clone(&device), layout);

        let pipeline = Self::create_pipeline(&device, render_pass, config, layout.handle())?;

        Ok(Self {
            pipeline: Owned::new(device, pipeline),
            layout,
        })
    }

    /// Create a second pipeline sharing this one's layout.
    ///
    /// # Safety
    /// Same requirements as [`GraphicsPipeline::new`].
    pub unsafe fn variant(
        &self,
        device: Arc<ash::Device>,
        render_pass: vk::RenderPass,
        config: &GraphicsPipelineConfig,
    ) -> Result<Owned<vk::Pipeline>> {
        let pipeline = Self::create_pipeline(&device, render_pass, config, self.layout())?;
        Ok(Owned::new(device, pipeline))
    }

    unsafe fn create_pipeline(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        config: &GraphicsPipelineConfig,
        layout: vk::PipelineLayout,
    ) -> Result<vk::Pipeline> {
        let vert_info = vk::ShaderModuleCreateInfo::default().code(&config.vertex_shader);
        let vert_module = device
            .create_shader_module(&vert_info, None)
            .map_err(|e| GpuError::ShaderLoad(format!("Vertex: {e}")))?;

        let frag_info = vk::ShaderModuleCreateInfo::default().code(&config.fragment_shader);
        let frag_module = match device.create_shader_module(&frag_info, None) {
            Ok(module) => module,
            Err(e) => {
                device.destroy_shader_module(vert_module, None);
                return Err(GpuError::ShaderLoad(format!("Fragment: {e}")));
            }
        };

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(c"main"),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&config.vertex_bindings)
            .vertex_attribute_descriptions(&config.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth_test)
            .depth_write_enable(config.depth_write)
            .depth_compare_op(config.depth_compare)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [config.color_blend_attachment()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let result =
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None);

        // Shader modules are no longer needed once the pipeline exists.
        device.destroy_shader_module(vert_module, None);
        device.destroy_shader_module(frag_module, None);

        let pipelines =
            result.map_err(|(_pipelines, e)| GpuError::PipelineCreation(e.to_string()))?;
        Ok(pipelines[0])
    }

    /// The pipeline handle.
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline.handle()
    }

    /// The pipeline layout.
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }
}

/// Viewport covering `extent` with +Y pointing up (negative height).
pub fn flipped_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: extent.height as f32,
        width: extent.width as f32,
        height: -(extent.height as f32),
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering `extent`.
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_spirv_words() {
        let mut bytes = 0x0723_0203_u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000_u32.to_le_bytes());
        let words = parse_spirv(&bytes).unwrap();
        assert_eq!(words, vec![0x0723_0203, 0x0001_0000]);
    }

    #[test]
    fn rejects_truncated_spirv() {
        let err = parse_spirv(&[0x03, 0x02, 0x23]).unwrap_err();
        assert!(matches!(err, GpuError::ShaderLoad(_)));
    }

    #[test]
    fn missing_shader_names_path() {
        let err = load_spirv("no/such/shader.spv").unwrap_err();
        match err {
            GpuError::ShaderLoad(msg) => assert!(msg.contains("shader.spv")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn viewport_is_flipped() {
        let vp = flipped_viewport(vk::Extent2D {
            width: 1280,
            height: 720,
        });
        assert_eq!(vp.y, 720.0);
        assert_eq!(vp.height, -720.0);
        assert_eq!(vp.width, 1280.0);
    }

    #[test]
    fn blend_state_follows_config() {
        let opaque = GraphicsPipelineConfig::default().color_blend_attachment();
        assert_eq!(opaque.blend_enable, vk::FALSE);

        let blended = GraphicsPipelineConfig {
            alpha_blend: true,
            ..Default::default()
        }
        .color_blend_attachment();
        assert_eq!(blended.blend_enable, vk::TRUE);
        assert_eq!(blended.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
    }
}
