//! Application framework for the hellovk demos.
//!
//! The center of this crate is [`FrameScheduler`], which takes one frame at
//! a time through acquire, fence wait, record, submit and present. Around it:
//! - [`FrameBackend`], the device operations the scheduler issues, with a
//!   Vulkan implementation in [`VulkanFrameBackend`]
//! - [`DemoApp`], implemented by each demo
//! - [`AppContext`], the window, device and scheduler handed to demos
//! - [`run_app`], the winit event loop
//!
//! # Example
//!
//! ```no_run
//! use hellovk_app::{run_app, AppConfig, AppContext, DemoApp, FrameContext};
//!
//! struct Blank;
//!
//! impl DemoApp for Blank {
//!     fn prepare(&mut self, _ctx: &AppContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//!
//!     fn cleanup(&mut self, _ctx: &AppContext) {}
//!
//!     fn record_draw_commands(&mut self, _frame: &FrameContext) {
//!         // The render pass already clears the screen.
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app(AppConfig::default(), Box::new(Blank))
//! }
//! ```

mod app;
pub mod backend;
mod context;
mod frame;
mod runner;
pub mod scheduler;
mod vulkan;

pub use app::DemoApp;
pub use backend::{FrameBackend, FrameSyncPair, PresentDesc, SubmitDesc, SwapchainSlot};
pub use context::AppContext;
pub use frame::FrameContext;
pub use runner::{init_logging, run_app, AppConfig};
pub use scheduler::{FramePhase, FrameScheduler};
pub use vulkan::VulkanFrameBackend;

// Re-export commonly used types for convenience
pub use hellovk_gpu::{GpuContext, GpuContextBuilder, GpuError};
pub use winit::event::WindowEvent;
