//! The device operations the frame scheduler needs.
//!
//! [`FrameScheduler`](crate::FrameScheduler) drives every Vulkan call through
//! [`FrameBackend`], so the frame lifecycle can be exercised against a
//! recording backend without a GPU.

use ash::vk;
use hellovk_gpu::Result;

/// Resources tied to one swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainSlot {
    /// Owned by the presentation engine.
    pub image: vk::Image,
    pub view: vk::ImageView,
    /// Color view plus the shared depth view.
    pub framebuffer: vk::Framebuffer,
    /// Reset and re-recorded every time the slot is acquired.
    pub command_buffer: vk::CommandBuffer,
    /// Signaled when the slot's last submission finished. Created signaled.
    pub fence: vk::Fence,
}

/// The two semaphores shared by every slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSyncPair {
    pub image_acquired: vk::Semaphore,
    pub render_finished: vk::Semaphore,
}

/// One queue submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitDesc {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal_semaphore: vk::Semaphore,
    pub fence: vk::Fence,
}

/// One presentation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentDesc {
    pub image_index: u32,
    pub wait_semaphore: vk::Semaphore,
}

/// Device operations used by the frame scheduler.
///
/// Creation methods hand ownership of the returned handles to the caller,
/// which gives each one back through the matching `destroy_*` exactly once.
/// The render pass, depth buffer and swapchain stay inside the backend and
/// are released by their own `destroy_*` calls.
pub trait FrameBackend {
    /// Create one slot per swapchain image, in image index order.
    fn create_slots(&mut self) -> Result<Vec<SwapchainSlot>>;

    /// Create the shared acquire/render semaphores.
    fn create_sync_pair(&mut self) -> Result<FrameSyncPair>;

    /// Size of the swapchain images.
    fn extent(&self) -> vk::Extent2D;

    /// Acquire the next image with no timeout, signalling `signal`.
    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> Result<u32>;

    /// Block until `fence` is signaled.
    fn wait_for_fence(&mut self, fence: vk::Fence) -> Result<()>;

    /// Return `fence` to the unsignaled state.
    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()>;

    /// Reset `cmd` and start recording it for a single submission.
    fn begin_commands(&mut self, cmd: vk::CommandBuffer) -> Result<()>;

    /// Begin the render pass on `framebuffer` with the given clear values.
    fn begin_render_pass(
        &mut self,
        cmd: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        clear_values: &[vk::ClearValue],
    );

    /// End the render pass.
    fn end_render_pass(&mut self, cmd: vk::CommandBuffer);

    /// Finish recording `cmd`.
    fn end_commands(&mut self, cmd: vk::CommandBuffer) -> Result<()>;

    /// Submit to the graphics queue.
    fn submit(&mut self, desc: &SubmitDesc) -> Result<()>;

    /// Queue an image for presentation.
    fn present(&mut self, desc: &PresentDesc) -> Result<()>;

    /// Block until the device has finished all work.
    fn wait_idle(&mut self) -> Result<()>;

    fn free_command_buffers(&mut self, command_buffers: &[vk::CommandBuffer]);
    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer);
    fn destroy_render_pass(&mut self);
    fn destroy_depth(&mut self);
    fn destroy_image_view(&mut self, view: vk::ImageView);
    fn destroy_fence(&mut self, fence: vk::Fence);
    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore);
    fn destroy_swapchain(&mut self);
}
