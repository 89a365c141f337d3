//! GPU memory management.
//!
//! [`GpuBuffer`] and [`GpuImage`] keep a handle to the shared allocator and
//! return their memory when dropped.

use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use std::sync::Arc;

/// Allocator shared between the context and every resource it created.
pub type SharedAllocator = Arc<Mutex<GpuAllocator>>;

/// GPU memory allocator wrapper.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            allocator: Some(allocator),
            device,
        })
    }

    fn inner(&mut self) -> Result<&mut Allocator> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator already shut down".to_string()))
    }

    fn allocate_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<(vk::Buffer, Allocation)> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocated = self.inner()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocated {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(GpuError::AllocationFailed(e.to_string()));
            }
        };

        let bound = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            self.release_buffer(buffer, Some(allocation));
            return Err(e.into());
        }

        Ok((buffer, allocation))
    }

    fn allocate_image(
        &mut self,
        create_info: &vk::ImageCreateInfo,
        location: MemoryLocation,
        name: &str,
    ) -> Result<(vk::Image, Allocation)> {
        let image = unsafe { self.device.create_image(create_info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocated = self.inner()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocated {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(GpuError::AllocationFailed(e.to_string()));
            }
        };

        let bound = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            self.release_image(image, Some(allocation));
            return Err(e.into());
        }

        Ok((image, allocation))
    }

    fn release_buffer(&mut self, buffer: vk::Buffer, allocation: Option<Allocation>) {
        self.free_allocation(allocation);
        unsafe { self.device.destroy_buffer(buffer, None) };
    }

    fn release_image(&mut self, image: vk::Image, allocation: Option<Allocation>) {
        self.free_allocation(allocation);
        unsafe { self.device.destroy_image(image, None) };
    }

    fn free_allocation(&mut self, allocation: Option<Allocation>) {
        let Some(allocation) = allocation else {
            return;
        };
        match self.allocator.as_mut() {
            Some(allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    tracing::error!("Failed to free GPU allocation: {e}");
                }
            }
            // Memory already returned to the driver by shutdown().
            None => tracing::warn!("GPU resource dropped after allocator shutdown"),
        }
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// This must be called before the Vulkan device is destroyed.
    /// Any remaining allocations will be freed (and logged as leaks).
    pub fn shutdown(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            drop(allocator);
        }
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A GPU buffer with its allocation. Freed on drop.
pub struct GpuBuffer {
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
    allocator: SharedAllocator,
}

impl GpuBuffer {
    /// Allocate a buffer.
    pub fn new(
        allocator: &SharedAllocator,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Self> {
        let (buffer, allocation) = allocator
            .lock()
            .allocate_buffer(size, usage, location, name)?;

        Ok(Self {
            buffer,
            allocation: Some(allocation),
            size,
            allocator: Arc::clone(allocator),
        })
    }

    /// Allocate a host-visible buffer and fill it with `data`.
    pub fn with_data(
        allocator: &SharedAllocator,
        data: &[u8],
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<Self> {
        let buffer = Self::new(
            allocator,
            data.len() as u64,
            usage,
            MemoryLocation::CpuToGpu,
            name,
        )?;
        buffer.write_bytes(0, data)?;
        Ok(buffer)
    }

    /// The raw buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Map the buffer memory for CPU access.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .map(|p| p.as_ptr().cast::<u8>())
    }

    /// Write plain-old-data values at the start of the buffer (must be host-visible).
    pub fn write<T: bytemuck::Pod>(&self, data: &[T]) -> Result<()> {
        self.write_bytes(0, bytemuck::cast_slice(data))
    }

    /// Write raw bytes to the buffer at the given offset (must be host-visible).
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let ptr = self
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;

        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| GpuError::InvalidState("Offset overflow".to_string()))?;
        if end > self.size {
            return Err(GpuError::InvalidState(format!(
                "Writing {} bytes at {offset} overflows a {}-byte buffer",
                data.len(),
                self.size
            )));
        }

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
        }

        Ok(())
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        let allocation = self.allocation.take();
        self.allocator.lock().release_buffer(self.buffer, allocation);
    }
}

/// A GPU image with its allocation. Freed on drop.
pub struct GpuImage {
    image: vk::Image,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent3D,
    allocator: SharedAllocator,
}

impl GpuImage {
    /// Allocate an image.
    pub fn new(
        allocator: &SharedAllocator,
        create_info: &vk::ImageCreateInfo,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Self> {
        let (image, allocation) = allocator
            .lock()
            .allocate_image(create_info, location, name)?;

        Ok(Self {
            image,
            allocation: Some(allocation),
            format: create_info.format,
            extent: create_info.extent,
            allocator: Arc::clone(allocator),
        })
    }

    /// The raw image handle.
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Pixel format.
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Image dimensions.
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        let allocation = self.allocation.take();
        self.allocator.lock().release_image(self.image, allocation);
    }
}

/// Create a 2D view covering one mip level and layer of `image`.
///
/// # Safety
/// The device and image must be valid.
pub unsafe fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    let view = device.create_image_view(&view_info, None)?;
    Ok(view)
}
