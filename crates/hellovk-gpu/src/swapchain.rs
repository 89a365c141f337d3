//! Swapchain creation, acquisition and presentation.
//!
//! The swapchain owns only the `VkSwapchainKHR`; views, framebuffers and
//! everything else bound to its images belong to whoever drives the frames.

use crate::error::{GpuError, Result};
use ash::vk;

/// Swapchain handle plus the images and parameters it was created with.
pub struct Swapchain {
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a new swapchain.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn new(
        loader: &ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        surface_format: vk::SurfaceFormatKHR,
        present_mode: vk::PresentModeKHR,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let image_count = select_image_count(surface_capabilities);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = loader
            .create_swapchain(&create_info, None)
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let images = match loader.get_swapchain_images(swapchain) {
            Ok(images) => images,
            Err(e) => {
                loader.destroy_swapchain(swapchain, None);
                return Err(e.into());
            }
        };

        tracing::info!(
            "Created swapchain: {} images, {:?}, {:?}, {}x{}",
            images.len(),
            surface_format.format,
            present_mode,
            extent.width,
            extent.height
        );

        Ok(Self {
            loader: loader.clone(),
            swapchain,
            images,
            format: surface_format.format,
            extent,
        })
    }

    /// The swapchain images, in presentation-engine index order.
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Color format of the images.
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Size of the images.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Acquire the next image, signalling `semaphore` once it is ready.
    ///
    /// Out-of-date swapchains are reported as [`GpuError::SwapchainStale`].
    /// A suboptimal acquire still returns the image.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn acquire_next_image(&self, semaphore: vk::Semaphore, timeout_ns: u64) -> Result<u32> {
        let result = self.loader.acquire_next_image(
            self.swapchain,
            timeout_ns,
            semaphore,
            vk::Fence::null(),
        );

        match result {
            Ok((index, false)) => Ok(index),
            Ok((index, true)) => {
                tracing::warn!("Swapchain suboptimal on acquire");
                Ok(index)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(GpuError::SwapchainStale),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Present an image once `wait_semaphores` are signaled.
    ///
    /// Both `SUBOPTIMAL` and `OUT_OF_DATE` are reported as
    /// [`GpuError::SwapchainStale`].
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<()> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match self.loader.queue_present(queue, &present_info) {
            Ok(false) => Ok(()),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(GpuError::SwapchainStale),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Destroy the swapchain. Safe to call more than once.
    ///
    /// # Safety
    /// No image may still be in use.
    pub unsafe fn destroy(&mut self) {
        if self.swapchain != vk::SwapchainKHR::null() {
            self.loader.destroy_swapchain(self.swapchain, None);
            self.swapchain = vk::SwapchainKHR::null();
            self.images.clear();
        }
    }
}

/// Pick the surface format: `B8G8R8A8_UNORM` when offered, else the first one.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|f| f.format == vk::Format::B8G8R8A8_UNORM)
        .or_else(|| available.first())
        .copied()
}

/// Pick the present mode: FIFO with vsync, otherwise MAILBOX, IMMEDIATE or
/// FIFO in that order of preference.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// At least two images, at least the surface minimum, never above a
/// non-zero surface maximum.
pub fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count.max(2);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Calculate swapchain extent.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 16,
                height: 16,
            },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 1024,
            },
            ..Default::default()
        }
    }

    #[test]
    fn prefers_bgra_unorm() {
        let available = [
            format(vk::Format::R8G8B8A8_SRGB),
            format(vk::Format::B8G8R8A8_UNORM),
        ];
        assert_eq!(
            select_surface_format(&available).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_UNORM)
        );
    }

    #[test]
    fn falls_back_to_first_format() {
        let available = [
            format(vk::Format::R8G8B8A8_SRGB),
            format(vk::Format::A2B10G10R10_UNORM_PACK32),
        ];
        assert_eq!(
            select_surface_format(&available).map(|f| f.format),
            Some(vk::Format::R8G8B8A8_SRGB)
        );
        assert!(select_surface_format(&[]).is_none());
    }

    #[test]
    fn vsync_always_fifo() {
        let available = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(select_present_mode(&available, true), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn no_vsync_preference_order() {
        use vk::PresentModeKHR as M;
        assert_eq!(
            select_present_mode(&[M::FIFO, M::IMMEDIATE, M::MAILBOX], false),
            M::MAILBOX
        );
        assert_eq!(select_present_mode(&[M::FIFO, M::IMMEDIATE], false), M::IMMEDIATE);
        assert_eq!(select_present_mode(&[M::FIFO], false), M::FIFO);
    }

    #[test]
    fn image_count_rules() {
        assert_eq!(select_image_count(&caps(1, 0)), 2);
        assert_eq!(select_image_count(&caps(3, 0)), 3);
        assert_eq!(select_image_count(&caps(2, 8)), 2);
        assert_eq!(select_image_count(&caps(1, 1)), 1);
    }

    #[test]
    fn extent_uses_current_when_defined() {
        let mut c = caps(2, 0);
        c.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let extent = calculate_extent(&c, 1280, 720);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn extent_clamps_window_size() {
        let extent = calculate_extent(&caps(2, 0), 1280, 8);
        assert_eq!((extent.width, extent.height), (1024, 16));
    }
}
