//! Application context.

use std::path::PathBuf;
use std::sync::Arc;

use ash::vk;
use hellovk_core::TextureData;
use hellovk_gpu::{CommandPool, GpuContext, SharedAllocator, SurfaceContext, Texture};
use winit::window::Window;

use crate::runner::AppConfig;
use crate::scheduler::FrameScheduler;
use crate::vulkan::VulkanFrameBackend;

/// Everything a demo needs to create and draw its resources.
///
/// Fields drop in declaration order: the scheduler releases the swapchain
/// resources first, then the upload pool, the surface, and finally the
/// device and the window.
pub struct AppContext {
    /// Frame lifecycle for the window's swapchain.
    pub scheduler: FrameScheduler<VulkanFrameBackend>,
    /// Pool for one-off upload commands.
    command_pool: CommandPool,
    /// Surface for the window.
    pub surface: SurfaceContext,
    /// Instance, device and queue.
    pub gpu: GpuContext,
    /// The window handle.
    pub window: Arc<Window>,
    /// Configuration the app was started with.
    pub config: AppConfig,
}

impl AppContext {
    /// Create the surface, swapchain and frame scheduler for `window`.
    pub(crate) fn new(window: Arc<Window>, gpu: GpuContext, config: AppConfig) -> anyhow::Result<Self> {
        // SAFETY: the window outlives the surface through the field order.
        let surface = unsafe { SurfaceContext::from_window(&gpu, window.as_ref())? };

        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        let backend = VulkanFrameBackend::new(&gpu, &surface, width, height, config.vsync)?;
        let scheduler = FrameScheduler::new(backend)?;

        // SAFETY: the device is valid for the lifetime of the context.
        let command_pool =
            unsafe { CommandPool::new(gpu.shared_device(), gpu.graphics_queue_family())? };

        Ok(Self {
            scheduler,
            command_pool,
            surface,
            gpu,
            window,
            config,
        })
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        self.gpu.device()
    }

    /// Shared handle to the device.
    pub fn shared_device(&self) -> Arc<ash::Device> {
        self.gpu.shared_device()
    }

    /// The shared memory allocator.
    pub fn allocator(&self) -> &SharedAllocator {
        self.gpu.allocator()
    }

    /// Render pass pipelines must be compatible with.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.scheduler.backend().render_pass()
    }

    /// Swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.scheduler.extent()
    }

    /// Number of swapchain slots; per-slot resources need this many copies.
    pub fn image_count(&self) -> usize {
        self.scheduler.slot_count()
    }

    /// Get the aspect ratio (width / height).
    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        extent.width as f32 / extent.height.max(1) as f32
    }

    /// Upload `data` into a sampled texture, blocking until the copy is done.
    pub fn upload_texture(&self, data: &TextureData, name: &str) -> hellovk_gpu::Result<Texture> {
        Texture::upload(&self.gpu, &self.command_pool, data, name)
    }

    /// Path of the compiled shader `name` inside the configured shader
    /// directory.
    pub fn shader_path(&self, name: &str) -> PathBuf {
        self.config.shader_dir.join(name)
    }
}
