use std::path::PathBuf;

use clap::Parser;
use twinview::prelude::*;

mod scenes;
use scenes::{idle, plasma};

/// Dual-display crossfade compositor
#[derive(Parser, Debug)]
#[command(name = "twinview")]
#[command(version, about, long_about = None)]
struct Args {
    /// Engine config file (defaults to <config_dir>/Twinview/engine.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Composite in software without opening a window
    #[arg(long)]
    headless: bool,

    /// Scene both displays start on and return to after an app stops
    #[arg(long)]
    initial_scene: Option<String>,

    /// Override the configured frame rate
    #[arg(long)]
    fps: Option<f32>,

    /// Exit after rendering this many frames (headless only)
    #[arg(long, requires = "headless")]
    frames: Option<u64>,
}

fn main() {
    init_logger();

    let args = Args::parse();

    if let Err(err) = run_with_args(args) {
        error!("{}", err);
        eprintln!("twinview failed: {}", err);
        std::process::exit(1);
    }
}

fn run_with_args(args: Args) -> Result<(), String> {
    let registry = twinview::register_scenes!(idle, plasma)
        .map_err(|err| format!("scene registry failed: {}", err))?;

    let config_path = args.config.or_else(EngineConfig::default_path);

    let mut config = match config_path.as_deref() {
        Some(path) => EngineConfig::load_or_default(path)?,
        None => {
            warn!("no config directory available; using defaults");
            let mut config = EngineConfig::default();
            config.apply_env_overrides()?;
            config
        }
    };

    let overrides = ConfigOverrides {
        default_scene: args.initial_scene,
        fps: args.fps,
    };
    overrides.apply(&mut config);

    config.validate()?;

    info!(
        "scenes: {} (+ debug)",
        registry.scene_names().join(", ")
    );

    run(
        registry,
        RunOptions {
            config,
            config_path,
            overrides,
            headless: args.headless,
            max_frames: args.frames,
        },
    )
}
