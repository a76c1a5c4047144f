//! Command line front end.
//!
//! Loads a scene, compiles its render graph and drives it for a number of
//! frames on the headless device, printing the pass order and a summary of
//! every frame.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use glam::Vec2;

use shadertool::backend::HeadlessDevice;
use shadertool::resources::FsAssetLoader;
use shadertool::scene::CameraInput;
use shadertool::{Engine, EngineConfig, FrameInput, SceneWatcher};

const FRAME_TIME: f32 = 1.0 / 60.0;

/// shadertool command line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "shadertool",
    about = "Compile and run declarative multi-pass scenes",
    long_about = "Compiles a JSON or RON scene description into a render graph and \
        runs it on the headless device.\n\n\
        EXAMPLES:\n\
          # Print the pass order of a scene\n\
          shadertool scenes/two_pass.json --check\n\
        \n\
          # Run 10 frames and resize halfway through\n\
          shadertool scenes/two_pass.json --frames 10 --resize 1920x1080",
    version
)]
struct Args {
    /// Scene description (.json or .ron)
    scene: PathBuf,

    /// Number of frames to render.
    #[arg(long, default_value = "1")]
    frames: u64,

    /// Initial viewport size, as WIDTHxHEIGHT.
    #[arg(long, value_parser = parse_size)]
    size: Option<(u32, u32)>,

    /// Viewport size to switch to halfway through the run.
    #[arg(long, value_parser = parse_size)]
    resize: Option<(u32, u32)>,

    /// Only load and compile the scene.
    #[arg(long, conflicts_with = "watch")]
    check: bool,

    /// Keep running and reload the scene when its files change.
    #[arg(long)]
    watch: bool,

    /// Engine config file (RON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter, overrides RUST_LOG.
    #[arg(long)]
    log: Option<String>,
}

fn parse_size(text: &str) -> Result<(u32, u32), String> {
    let (width, height) = text
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{text}`"))?;
    let parse = |value: &str| {
        value
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid dimension `{value}`: {e}"))
    };
    Ok((parse(width)?, parse(height)?))
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(filter) = &args.log {
        logger.parse_filters(filter);
    }
    logger.init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> shadertool::SceneResult<()> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some((width, height)) = args.size {
        config.width = width;
        config.height = height;
    }
    config.watch |= args.watch;

    let root = args
        .scene
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let watch = config.watch;
    let mut viewport = (config.width, config.height);
    let mut engine = Engine::new(HeadlessDevice::new(), FsAssetLoader::new(root), config);
    engine.load_scene(&args.scene)?;

    if let Some(scene) = engine.scene() {
        println!("Pass order: {}", scene.pass_order().join(" -> "));
        for edge in &scene.graph.edges {
            println!(
                "  {} -> {} via `{}`",
                scene.passes[edge.from].name,
                scene.passes[edge.to].name,
                scene.registry.textures.name(edge.texture)
            );
        }
    }
    if args.check {
        return Ok(());
    }

    let watcher = if watch {
        Some(SceneWatcher::new(&args.scene)?)
    } else {
        None
    };

    let mut frame = 0u64;
    while watch || frame < args.frames {
        if let Some(watcher) = &watcher {
            let changed = watcher.poll_changes();
            if !changed.is_empty() {
                log::info!("Changed: {:?}", changed);
                engine.request_reload();
            }
        }
        if let Some(size) = args.resize {
            if frame == args.frames / 2 {
                viewport = size;
            }
        }

        let input = FrameInput {
            viewport,
            time: frame as f32 * FRAME_TIME,
            delta_time: FRAME_TIME,
            pointer: Vec2::new(viewport.0 as f32, viewport.1 as f32) / 2.0,
        };
        let report = engine.render_frame(&input, &CameraInput::new())?;
        println!(
            "Frame {}: {}x{}, {} passes, {} draws, {} draw errors",
            frame,
            report.viewport.0,
            report.viewport.1,
            report.executed_passes.len(),
            report.draw_calls,
            report.draw_errors.len()
        );
        for error in &report.draw_errors {
            println!("  {}", error);
        }
        engine.device_mut().take_commands();

        frame += 1;
        if watch {
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    engine.unload();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("800x600"), Ok((800, 600)));
        assert_eq!(parse_size("1920X1080"), Ok((1920, 1080)));
        assert!(parse_size("800").is_err());
        assert!(parse_size("wide x 600").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["shadertool", "scene.json", "--frames", "3", "--resize", "64x32"])
            .unwrap();
        assert_eq!(args.frames, 3);
        assert_eq!(args.resize, Some((64, 32)));
        assert!(Args::try_parse_from(["shadertool", "scene.json", "--check", "--watch"]).is_err());
    }
}
