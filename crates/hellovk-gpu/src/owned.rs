//! Owning wrappers for device-level Vulkan handles.

use ash::vk;
use std::sync::Arc;

/// A device-level handle that knows how to destroy itself.
pub trait DeviceHandle: vk::Handle + Copy {
    /// Destroy the handle.
    ///
    /// # Safety
    /// The handle must have been created from `device` and must not be in use.
    unsafe fn destroy(self, device: &ash::Device);
}

macro_rules! device_handle {
    ($($handle:ty => $destroy:ident),* $(,)?) => {
        $(
            impl DeviceHandle for $handle {
                unsafe fn destroy(self, device: &ash::Device) {
                    device.$destroy(self, None);
                }
            }
        )*
    };
}

device_handle! {
    vk::Pipeline => destroy_pipeline,
    vk::PipelineLayout => destroy_pipeline_layout,
    vk::ShaderModule => destroy_shader_module,
    vk::RenderPass => destroy_render_pass,
    vk::Framebuffer => destroy_framebuffer,
    vk::ImageView => destroy_image_view,
    vk::Sampler => destroy_sampler,
    vk::DescriptorPool => destroy_descriptor_pool,
    vk::DescriptorSetLayout => destroy_descriptor_set_layout,
    vk::CommandPool => destroy_command_pool,
    vk::Semaphore => destroy_semaphore,
    vk::Fence => destroy_fence,
}

/// Owns a handle and destroys it exactly once when dropped.
pub struct Owned<H: DeviceHandle> {
    handle: H,
    device: Arc<ash::Device>,
}

impl<H: DeviceHandle> Owned<H> {
    /// Take ownership of `handle`.
    ///
    /// # Safety
    /// `handle` must have been created from `device` and nothing else may
    /// destroy it.
    pub unsafe fn new(device: Arc<ash::Device>, handle: H) -> Self {
        Self { handle, device }
    }

    /// The raw handle.
    pub fn handle(&self) -> H {
        self.handle
    }

    /// Give up ownership without destroying the handle.
    pub fn into_raw(self) -> H {
        let handle = self.handle;
        std::mem::forget(self);
        handle
    }
}

impl<H: DeviceHandle> Drop for Owned<H> {
    fn drop(&mut self) {
        if self.handle.as_raw() != 0 {
            unsafe { self.handle.destroy(&self.device) };
        }
    }
}

impl<H: DeviceHandle + std::fmt::Debug> std::fmt::Debug for Owned<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Owned").field(&self.handle).finish()
    }
}
