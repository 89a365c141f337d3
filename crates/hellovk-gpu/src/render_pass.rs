//! Render pass, depth buffer and framebuffers for drawing to the swapchain.

use crate::error::Result;
use crate::memory::{create_image_view, GpuImage, SharedAllocator};
use crate::owned::Owned;
use ash::vk;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// Depth attachment format.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Single-subpass render pass: one color attachment presented afterwards,
/// one depth attachment. Both are cleared on load.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_render_pass(
    device: Arc<ash::Device>,
    color_format: vk::Format,
) -> Result<Owned<vk::RenderPass>> {
    let attachments = [
        vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        vk::AttachmentDescription::default()
            .format(DEPTH_FORMAT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
    ];

    let color_ref = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
    let depth_ref = vk::AttachmentReference::default()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_ref)
        .depth_stencil_attachment(&depth_ref)];

    // The layout transition must wait for the acquire semaphore, which is
    // waited on at the color output stage.
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    let render_pass = device.create_render_pass(&create_info, None)?;
    Ok(Owned::new(device, render_pass))
}

/// Depth image shared by every framebuffer of a swapchain.
pub struct DepthBuffer {
    // View first so it is destroyed before the image.
    view: Owned<vk::ImageView>,
    image: GpuImage,
}

impl DepthBuffer {
    /// Allocate a device-local depth image of `extent`.
    ///
    /// # Safety
    /// The device must be the allocator's device.
    pub unsafe fn new(
        device: Arc<ash::Device>,
        allocator: &SharedAllocator,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = GpuImage::new(allocator, &create_info, MemoryLocation::GpuOnly, "depth")?;
        let view = create_image_view(
            &device,
            image.handle(),
            DEPTH_FORMAT,
            vk::ImageAspectFlags::DEPTH,
        )?;

        Ok(Self {
            view: Owned::new(device, view),
            image,
        })
    }

    /// The depth attachment view.
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    /// The depth image.
    pub fn image(&self) -> &GpuImage {
        &self.image
    }
}

/// Create a framebuffer binding `color_view` and `depth_view` to `render_pass`.
///
/// The caller owns the returned handle.
///
/// # Safety
/// All handles must be valid and match the render pass attachments.
pub unsafe fn create_framebuffer(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    color_view: vk::ImageView,
    depth_view: vk::ImageView,
    extent: vk::Extent2D,
) -> Result<vk::Framebuffer> {
    let attachments = [color_view, depth_view];
    let create_info = vk::FramebufferCreateInfo::default()
        .render_pass(render_pass)
        .attachments(&attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(1);

    let framebuffer = device.create_framebuffer(&create_info, None)?;
    Ok(framebuffer)
}
