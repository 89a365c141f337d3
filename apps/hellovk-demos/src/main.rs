//! Hello Vulkan demos
//!
//! Three small renderers sharing one frame loop: a colored triangle, a
//! spinning textured cube and a glTF model viewer.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p hellovk-demos -- [OPTIONS]
//! ```
//!
//! Shaders are loaded at runtime as SPIR-V. Compile the GLSL sources in
//! `shaders/` first, e.g. `glslc shaders/cube.vert -o shaders/cube.vert.spv`.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod cube;
mod draw;
mod model;
mod triangle;

use std::path::PathBuf;

use anyhow::{bail, Context};
use hellovk_app::{run_app, AppConfig, DemoApp};
use hellovk_core::constants::APP_TITLE;

use crate::cube::TexturedCube;
use crate::model::ModelViewer;
use crate::triangle::Triangle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Demo {
    Triangle,
    #[default]
    Cube,
    Model,
}

impl Demo {
    fn parse(name: &str) -> anyhow::Result<Self> {
        match name {
            "triangle" => Ok(Self::Triangle),
            "cube" => Ok(Self::Cube),
            "model" => Ok(Self::Model),
            other => bail!("unknown demo {other:?} (expected triangle, cube or model)"),
        }
    }

    fn title(self) -> String {
        let name = match self {
            Self::Triangle => "Triangle",
            Self::Cube => "Textured Cube",
            Self::Model => "Model",
        };
        format!("{APP_TITLE} - {name}")
    }

    fn create(self) -> Box<dyn DemoApp> {
        match self {
            Self::Triangle => Box::new(Triangle::new()),
            Self::Cube => Box::new(TexturedCube::new()),
            Self::Model => Box::new(ModelViewer::new()),
        }
    }
}

/// Command line options.
#[derive(Debug, Clone, PartialEq)]
struct Options {
    demo: Demo,
    shader_dir: PathBuf,
    texture: Option<PathBuf>,
    model: Option<PathBuf>,
    vsync: bool,
    validation: bool,
    target_fps: Option<u32>,
}

impl Default for Options {
    fn default() -> Self {
        let config = AppConfig::default();
        Self {
            demo: Demo::default(),
            shader_dir: config.shader_dir,
            texture: None,
            model: None,
            vsync: config.vsync,
            validation: config.validation,
            target_fps: None,
        }
    }
}

impl Options {
    fn parse(args: &[String]) -> anyhow::Result<Self> {
        let mut options = Self::default();
        let mut i = 0;

        while i < args.len() {
            let flag = args[i].as_str();
            let mut value = || {
                i += 1;
                args.get(i)
                    .map(String::as_str)
                    .with_context(|| format!("{flag} needs a value"))
            };

            match flag {
                "--demo" => options.demo = Demo::parse(value()?)?,
                "--shaders" => options.shader_dir = PathBuf::from(value()?),
                "--texture" => options.texture = Some(PathBuf::from(value()?)),
                "--model" => options.model = Some(PathBuf::from(value()?)),
                "--fps" => {
                    let raw = value()?;
                    let fps = raw
                        .parse()
                        .with_context(|| format!("--fps expects a number, got {raw:?}"))?;
                    options.target_fps = Some(fps);
                }
                "--vsync" => options.vsync = true,
                "--no-vsync" => options.vsync = false,
                "--no-validation" => options.validation = false,
                other => bail!("unknown option {other:?} (see --help)"),
            }
            i += 1;
        }

        if options.demo == Demo::Model && options.model.is_none() {
            bail!("--demo model needs --model <path>");
        }
        Ok(options)
    }

    fn app_config(&self) -> AppConfig {
        let mut config = AppConfig::new(self.demo.title())
            .with_vsync(self.vsync)
            .with_validation(self.validation)
            .with_shader_dir(&self.shader_dir);
        if let Some(fps) = self.target_fps {
            config = config.with_target_fps(fps);
        }
        if let Some(texture) = &self.texture {
            config = config.with_texture(texture);
        }
        if let Some(model) = &self.model {
            config = config.with_model(model);
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Check for help flag before starting the app
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    let options = Options::parse(&args)?;
    run_app(options.app_config(), options.demo.create())
}

fn print_help() {
    eprintln!(
        "Hello Vulkan demos

USAGE:
    cargo run -p hellovk-demos -- [OPTIONS]

OPTIONS:
    --demo <NAME>       triangle, cube or model (default: cube)
    --shaders <DIR>     Directory with compiled .spv shaders (default: shaders)
    --texture <PATH>    Image for the cube (default: generated checkerboard)
    --model <PATH>      glTF, GLB or VRM file for the model demo
    --vsync             Present with FIFO (default)
    --no-vsync          Prefer MAILBOX, then IMMEDIATE
    --no-validation     Disable Vulkan validation layers
    --fps <N>           Limit the frame rate
    -h, --help          Print this help message

EXAMPLES:
    cargo run -p hellovk-demos -- --demo triangle
    cargo run -p hellovk-demos -- --texture assets/brick.png
    cargo run -p hellovk-demos -- --demo model --model assets/model.vrm

ENVIRONMENT VARIABLES:
    RUST_LOG            Set log level (e.g., info, debug, trace)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn defaults_to_cube() {
        let options = Options::parse(&[]).unwrap();
        assert_eq!(options, Options::default());
        assert_eq!(options.demo, Demo::Cube);
        assert!(options.vsync);
    }

    #[test]
    fn parses_every_flag() {
        let options = Options::parse(&args(&[
            "--demo",
            "model",
            "--model",
            "duck.glb",
            "--shaders",
            "out",
            "--texture",
            "brick.png",
            "--no-vsync",
            "--no-validation",
            "--fps",
            "60",
        ]))
        .unwrap();

        assert_eq!(options.demo, Demo::Model);
        assert_eq!(options.model, Some(PathBuf::from("duck.glb")));
        assert_eq!(options.shader_dir, PathBuf::from("out"));
        assert_eq!(options.texture, Some(PathBuf::from("brick.png")));
        assert!(!options.vsync);
        assert!(!options.validation);
        assert_eq!(options.target_fps, Some(60));

        let config = options.app_config();
        assert_eq!(config.title, "Hello Vulkan - Model");
        assert_eq!(config.target_fps, Some(60));
        assert_eq!(config.model, Some(PathBuf::from("duck.glb")));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Options::parse(&args(&["--demo", "teapot"])).is_err());
        assert!(Options::parse(&args(&["--fps", "fast"])).is_err());
        assert!(Options::parse(&args(&["--shaders"])).is_err());
        assert!(Options::parse(&args(&["--wat"])).is_err());
        assert!(Options::parse(&args(&["--demo", "model"])).is_err());
    }
}
