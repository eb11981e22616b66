mod support;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use support::*;
use twinview::RunOptions;
use twinview::runtime::events::{RuntimeCommand, command_channel};
use twinview::scene::{SceneConfig, SceneRegistry, ShaderScene};

static IDLE: SceneConfig = SceneConfig {
    name: "idle",
    display_name: "Idle",
};

static PLASMA: SceneConfig = SceneConfig {
    name: "plasma",
    display_name: "Plasma",
};

fn registry() -> SceneRegistry {
    let mut registry = SceneRegistry::new();
    registry
        .register(&IDLE, ShaderScene::new("idle.wgsl"))
        .unwrap();
    registry
        .register(&PLASMA, ShaderScene::new("plasma.wgsl"))
        .unwrap();
    registry
}

#[test]
fn headless_loop_exits_on_quit() {
    let (tx, rx) = command_channel();
    tx.send(RuntimeCommand::Inbound(message(
        "scene/set",
        r#"{"channel":"both","name":"plasma"}"#,
    )))
    .unwrap();
    tx.send(RuntimeCommand::Quit).unwrap();

    let options = RunOptions {
        config: small_config(),
        ..RunOptions::default()
    };

    let started = Instant::now();
    run_headless_ok(options, rx);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn headless_loop_stops_after_max_frames() {
    let (_tx, rx) = command_channel();

    let mut config = small_config();
    config.fps = 240.0;

    let options = RunOptions {
        config,
        max_frames: Some(12),
        ..RunOptions::default()
    };

    let started = Instant::now();
    run_headless_ok(options, rx);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn headless_loop_rejects_an_unknown_default_scene() {
    let (_tx, rx) = command_channel();

    let mut config = small_config();
    config.default_scene = "nebula".to_string();

    let result = twinview::run_headless(
        registry(),
        RunOptions {
            config,
            ..RunOptions::default()
        },
        rx,
        Arc::new(AtomicBool::new(false)),
    );

    assert!(result.is_err());
}

fn run_headless_ok(
    options: RunOptions,
    rx: twinview::runtime::events::RuntimeCommandReceiver,
) {
    let result = twinview::run_headless(
        registry(),
        options,
        rx,
        Arc::new(AtomicBool::new(false)),
    );
    assert_eq!(result, Ok(()));
}
