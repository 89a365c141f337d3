//! [`FrameBackend`] implemented on a real device and swapchain.

use std::sync::Arc;

use ash::vk;
use hellovk_gpu::command::{begin_command_buffer, end_command_buffer, submit_command_buffers};
use hellovk_gpu::sync::{create_fence, create_semaphore, reset_fence, wait_for_fence};
use hellovk_gpu::{
    create_framebuffer, create_image_view, create_render_pass, CommandPool, DepthBuffer,
    GpuContext, Owned, Result, SurfaceContext, Swapchain,
};

use crate::backend::{FrameBackend, FrameSyncPair, PresentDesc, SubmitDesc, SwapchainSlot};

/// Swapchain, render pass, depth buffer and command pool for one window.
pub struct VulkanFrameBackend {
    device: Arc<ash::Device>,
    queue: vk::Queue,
    swapchain: Swapchain,
    render_pass: Option<Owned<vk::RenderPass>>,
    depth: Option<DepthBuffer>,
    command_pool: CommandPool,
}

impl VulkanFrameBackend {
    /// Create the swapchain for `surface` and everything drawn into it.
    pub fn new(
        gpu: &GpuContext,
        surface: &SurfaceContext,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Self> {
        let device = gpu.shared_device();

        // SAFETY: the context and surface are valid and this is the only
        // swapchain created for the surface.
        let swapchain = unsafe { surface.create_swapchain(gpu, width, height, vsync)? };
        let render_pass = unsafe { create_render_pass(Arc::clone(&device), swapchain.format())? };
        let depth =
            unsafe { DepthBuffer::new(Arc::clone(&device), gpu.allocator(), swapchain.extent())? };
        let command_pool =
            unsafe { CommandPool::new(Arc::clone(&device), gpu.graphics_queue_family())? };

        Ok(Self {
            device,
            queue: gpu.graphics_queue(),
            swapchain,
            render_pass: Some(render_pass),
            depth: Some(depth),
            command_pool,
        })
    }

    /// The render pass every framebuffer was created against.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
            .as_ref()
            .map_or(vk::RenderPass::null(), Owned::handle)
    }

    /// Color format of the swapchain images.
    pub fn color_format(&self) -> vk::Format {
        self.swapchain.format()
    }

    /// Number of swapchain images.
    pub fn image_count(&self) -> usize {
        self.swapchain.images().len()
    }

    fn create_slot(&self, image: vk::Image, cmd: vk::CommandBuffer) -> Result<SwapchainSlot> {
        let depth_view = self.depth.as_ref().map_or(vk::ImageView::null(), DepthBuffer::view);
        let device = &*self.device;

        unsafe {
            let view = create_image_view(
                device,
                image,
                self.swapchain.format(),
                vk::ImageAspectFlags::COLOR,
            )?;
            let framebuffer = match create_framebuffer(
                device,
                self.render_pass(),
                view,
                depth_view,
                self.swapchain.extent(),
            ) {
                Ok(framebuffer) => framebuffer,
                Err(e) => {
                    device.destroy_image_view(view, None);
                    return Err(e);
                }
            };
            let fence = match create_fence(device, true) {
                Ok(fence) => fence,
                Err(e) => {
                    device.destroy_framebuffer(framebuffer, None);
                    device.destroy_image_view(view, None);
                    return Err(e);
                }
            };

            Ok(SwapchainSlot {
                image,
                view,
                framebuffer,
                command_buffer: cmd,
                fence,
            })
        }
    }

    unsafe fn destroy_slot(&self, slot: &SwapchainSlot) {
        self.device.destroy_fence(slot.fence, None);
        self.device.destroy_framebuffer(slot.framebuffer, None);
        self.device.destroy_image_view(slot.view, None);
    }
}

impl FrameBackend for VulkanFrameBackend {
    fn create_slots(&mut self) -> Result<Vec<SwapchainSlot>> {
        let images = self.swapchain.images().to_vec();
        let command_buffers = unsafe {
            self.command_pool
                .allocate_command_buffers(&self.device, images.len() as u32)?
        };

        let mut slots = Vec::with_capacity(images.len());
        for (&image, &cmd) in images.iter().zip(&command_buffers) {
            match self.create_slot(image, cmd) {
                Ok(slot) => slots.push(slot),
                Err(e) => unsafe {
                    for slot in &slots {
                        self.destroy_slot(slot);
                    }
                    self.command_pool
                        .free_command_buffers(&self.device, &command_buffers);
                    return Err(e);
                },
            }
        }

        tracing::debug!("Created {} swapchain slots", slots.len());
        Ok(slots)
    }

    fn create_sync_pair(&mut self) -> Result<FrameSyncPair> {
        unsafe {
            let image_acquired = create_semaphore(&self.device)?;
            let render_finished = match create_semaphore(&self.device) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    self.device.destroy_semaphore(image_acquired, None);
                    return Err(e);
                }
            };
            Ok(FrameSyncPair {
                image_acquired,
                render_finished,
            })
        }
    }

    fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> Result<u32> {
        unsafe { self.swapchain.acquire_next_image(signal, u64::MAX) }
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> Result<()> {
        unsafe { wait_for_fence(&self.device, fence, u64::MAX) }
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()> {
        unsafe { reset_fence(&self.device, fence) }
    }

    fn begin_commands(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            begin_command_buffer(&self.device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
        }
    }

    fn begin_render_pass(
        &mut self,
        cmd: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        clear_values: &[vk::ClearValue],
    ) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass())
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.swapchain.extent(),
            })
            .clear_values(clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
        }
    }

    fn end_render_pass(&mut self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) };
    }

    fn end_commands(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe { end_command_buffer(&self.device, cmd) }
    }

    fn submit(&mut self, desc: &SubmitDesc) -> Result<()> {
        unsafe {
            submit_command_buffers(
                &self.device,
                self.queue,
                &[desc.command_buffer],
                &[desc.wait_semaphore],
                &[desc.wait_stage],
                &[desc.signal_semaphore],
                desc.fence,
            )
        }
    }

    fn present(&mut self, desc: &PresentDesc) -> Result<()> {
        unsafe {
            self.swapchain
                .present(self.queue, desc.image_index, &[desc.wait_semaphore])
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    fn free_command_buffers(&mut self, command_buffers: &[vk::CommandBuffer]) {
        unsafe {
            self.command_pool
                .free_command_buffers(&self.device, command_buffers);
        }
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) };
    }

    fn destroy_render_pass(&mut self) {
        self.render_pass = None;
    }

    fn destroy_depth(&mut self) {
        self.depth = None;
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn destroy_swapchain(&mut self) {
        unsafe { self.swapchain.destroy() };
    }
}
