//! Vulkan plumbing for the hellovk demos.
//!
//! This crate provides:
//! - Instance, debug messenger and device creation
//! - Surface and swapchain handling
//! - Render pass, depth buffer and framebuffers
//! - Memory allocation via gpu-allocator
//! - Command pools, sync primitives, pipelines and descriptors
//! - Owning wrappers that destroy their handle on drop

pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod memory;
pub mod owned;
pub mod pipeline;
pub mod render_pass;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::CommandPool;
pub use context::{find_graphics_queue_family, GpuContext, GpuContextBuilder};
pub use descriptors::{
    write_combined_image_sampler, write_uniform_buffer, DescriptorPool,
    DescriptorSetLayoutBuilder,
};
pub use error::{GpuError, Result};
pub use gpu_allocator::MemoryLocation;
pub use memory::{create_image_view, GpuAllocator, GpuBuffer, GpuImage, SharedAllocator};
pub use owned::{DeviceHandle, Owned};
pub use pipeline::{
    flipped_viewport, full_scissor, load_spirv, GraphicsPipeline, GraphicsPipelineConfig,
};
pub use render_pass::{create_framebuffer, create_render_pass, DepthBuffer, DEPTH_FORMAT};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::Swapchain;
pub use sync::{create_fence, create_semaphore, reset_fence, wait_for_fence};
pub use texture::{create_sampler, Texture, TEXTURE_FORMAT};
