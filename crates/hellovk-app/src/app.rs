//! `DemoApp` trait definition.

use crate::context::AppContext;
use crate::frame::FrameContext;
use winit::event::WindowEvent;

/// A demo driven by [`run_app`](crate::run_app).
///
/// The runner owns the window, the device and the frame scheduler. The demo
/// only creates its own pipelines and buffers and records draw commands.
pub trait DemoApp {
    /// Create GPU resources.
    ///
    /// Called once after the swapchain exists and before the first frame.
    fn prepare(&mut self, ctx: &AppContext) -> anyhow::Result<()>;

    /// Destroy GPU resources.
    ///
    /// Called once before the scheduler is torn down. The device is idle.
    fn cleanup(&mut self, ctx: &AppContext);

    /// Record draw commands for `frame`.
    ///
    /// The render pass has been begun with the standard clear values and is
    /// ended after this returns.
    fn record_draw_commands(&mut self, frame: &FrameContext);

    /// Advance animation state by `dt` seconds.
    ///
    /// Called every frame before recording. Default implementation does
    /// nothing.
    #[allow(unused_variables)]
    fn update(&mut self, dt: f32) {}

    /// Handle a window event. Return `true` to stop the runner from
    /// processing it further.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }
}
