//! Per-frame context for recording draw commands.

use ash::vk;

/// The frame currently being recorded.
///
/// Handed to the draw callback between the scheduler's begin and end of the
/// render pass.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    /// Command buffer for the acquired slot, already inside the render pass.
    pub command_buffer: vk::CommandBuffer,
    /// Index of the acquired swapchain slot. Per-slot resources such as
    /// uniform buffers must be indexed with this.
    pub slot_index: usize,
    /// Size of the swapchain images.
    pub extent: vk::Extent2D,
    /// Number of frames presented before this one.
    pub frame_number: u64,
    /// Seconds since the previous frame was recorded (0 for the first).
    pub dt: f32,
}

impl FrameContext {
    /// Width divided by height of the render target.
    pub fn aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height.max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_ratio_of_extent() {
        let frame = FrameContext {
            command_buffer: vk::CommandBuffer::null(),
            slot_index: 0,
            extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            frame_number: 0,
            dt: 0.0,
        };
        assert!((frame.aspect_ratio() - 16.0 / 9.0).abs() < 1e-6);
    }
}
