//! Application runner and event loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hellovk_core::constants::{APP_TITLE, WINDOW_HEIGHT, WINDOW_WIDTH};
use hellovk_gpu::GpuContextBuilder;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::DemoApp;
use crate::context::AppContext;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Window width.
    pub width: u32,
    /// Window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Use FIFO presentation.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Directory holding the compiled `.spv` shaders.
    pub shader_dir: PathBuf,
    /// Image for the textured cube.
    pub texture: Option<PathBuf>,
    /// glTF file for the model viewer.
    pub model: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: APP_TITLE.to_string(),
            width: WINDOW_WIDTH,
            height: WINDOW_HEIGHT,
            target_fps: None,
            vsync: true,
            validation: cfg!(debug_assertions),
            shader_dir: PathBuf::from("shaders"),
            texture: None,
            model: None,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the shader directory.
    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    /// Set the texture path.
    pub fn with_texture(mut self, path: impl Into<PathBuf>) -> Self {
        self.texture = Some(path.into());
        self
    }

    /// Set the model path.
    pub fn with_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.model = Some(path.into());
        self
    }

    fn target_frame_time(&self) -> Option<Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }
}

/// Install the `tracing` subscriber, honouring `RUST_LOG` and defaulting to
/// `info`. Does nothing if a subscriber is already installed.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

/// Run `app` in a new window until it is closed.
///
/// Returns the error that stopped the loop, if any. Initialization and
/// render errors both end the run.
pub fn run_app(config: AppConfig, app: Box<dyn DemoApp>) -> anyhow::Result<()> {
    init_logging();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner {
        config,
        app: Some(app),
        state: None,
        error: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Drives the app from winit's callbacks.
struct AppRunner {
    config: AppConfig,
    /// Waiting for the first `resumed`.
    app: Option<Box<dyn DemoApp>>,
    state: Option<AppState>,
    /// First error that stopped the loop.
    error: Option<anyhow::Error>,
}

struct AppState {
    // Dropped before the context.
    app: Box<dyn DemoApp>,
    ctx: AppContext,
    target_frame_time: Option<Duration>,
    last_frame_time: Instant,
    // FPS tracking
    frames: u64,
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
}

impl ApplicationHandler for AppRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        let Some(app) = self.app.take() else {
            return;
        };

        info!("Creating application state...");

        match self.create_state(event_loop, app) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                match state.render_frame() {
                    Ok(()) => state.ctx.window.request_redraw(),
                    Err(e) => {
                        error!("Render error: {e}");
                        self.error = Some(e.into());
                        self.shutdown(event_loop);
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
    }
}

impl AppRunner {
    fn create_state(
        &self,
        event_loop: &ActiveEventLoop,
        mut app: Box<dyn DemoApp>,
    ) -> anyhow::Result<AppState> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build()?;

        info!("GPU: {}", gpu.capabilities().summary());

        let ctx = AppContext::new(window, gpu, self.config.clone())?;

        app.prepare(&ctx)?;

        Ok(AppState {
            app,
            ctx,
            target_frame_time: self.config.target_frame_time(),
            last_frame_time: Instant::now(),
            frames: 0,
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
        })
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
        event_loop.exit();
    }
}

impl AppState {
    fn render_frame(&mut self) -> hellovk_gpu::Result<()> {
        let frame_start = Instant::now();

        let dt = frame_start
            .duration_since(self.last_frame_time)
            .as_secs_f32();
        self.last_frame_time = frame_start;

        if dt > 0.0 {
            let fps = 1.0 / f64::from(dt);
            self.min_fps = self.min_fps.min(fps);
            self.max_fps = self.max_fps.max(fps);
            self.fps_sum += fps;
            self.frames += 1;
        }

        self.app.update(dt);

        let app = &mut self.app;
        self.ctx
            .scheduler
            .render_one_frame(|frame| app.record_draw_commands(frame))?;

        // Frame pacing
        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    fn cleanup(&mut self) {
        if self.frames > 0 {
            let avg_fps = self.fps_sum / self.frames as f64;
            info!("FPS Statistics:");
            info!("  Min: {:.1}", self.min_fps);
            info!("  Max: {:.1}", self.max_fps);
            info!("  Avg: {:.1}", avg_fps);
            info!("  Total frames: {}", self.ctx.scheduler.frame_number());
        }

        info!("Starting cleanup...");
        if let Err(e) = self.ctx.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        self.app.cleanup(&self.ctx);

        if let Err(e) = self.ctx.scheduler.teardown() {
            error!("Scheduler teardown failed: {e}");
        }

        info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_demo_window() {
        let config = AppConfig::default();
        assert_eq!(config.title, "Hello Vulkan");
        assert_eq!((config.width, config.height), (1280, 720));
        assert!(config.vsync);
        assert_eq!(config.shader_dir, PathBuf::from("shaders"));
        assert!(config.texture.is_none());
    }

    #[test]
    fn builders_set_fields() {
        let config = AppConfig::new("cube")
            .with_size(640, 480)
            .with_target_fps(30)
            .with_vsync(false)
            .with_validation(false)
            .with_shader_dir("out/spv")
            .with_texture("brick.png")
            .with_model("duck.glb");

        assert_eq!(config.title, "cube");
        assert_eq!((config.width, config.height), (640, 480));
        assert_eq!(config.target_fps, Some(30));
        assert!(!config.vsync);
        assert!(!config.validation);
        assert_eq!(config.shader_dir, PathBuf::from("out/spv"));
        assert_eq!(config.texture, Some(PathBuf::from("brick.png")));
        assert_eq!(config.model, Some(PathBuf::from("duck.glb")));
    }

    #[test]
    fn frame_time_from_fps() {
        let config = AppConfig::default().with_target_fps(50);
        assert_eq!(config.target_frame_time(), Some(Duration::from_millis(20)));
        assert_eq!(AppConfig::default().target_frame_time(), None);
        assert_eq!(
            AppConfig::default().with_target_fps(0).target_frame_time(),
            None
        );
    }
}
