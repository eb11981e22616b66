use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Instant;

use log::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use super::engine::Engine;
use super::events::{RuntimeCommandReceiver, command_channel};
use super::frame_clock::FrameClock;
use super::gateway::CommandGateway;
use super::osc::{OscStatusSink, OscTransport};
use crate::compose::{SoftwareBackend, SurfaceBackend};
use crate::framework::config::{ConfigOverrides, EngineConfig};
use crate::gpu::GpuBackend;
use crate::scene::SceneRegistry;

#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub config: EngineConfig,
    /// Where `engine/reload` re-reads the config from.
    pub config_path: Option<PathBuf>,
    /// Already applied to `config`; kept so reloads honor them too.
    pub overrides: ConfigOverrides,
    pub headless: bool,
    /// Stop after this many rendered frames. Headless only.
    pub max_frames: Option<u64>,
}

struct TwinviewRuntime {
    registry: SceneRegistry,
    options: RunOptions,
    command_rx: RuntimeCommandReceiver,
    connected: Arc<AtomicBool>,
    window: Option<Arc<Window>>,
    window_id: Option<WindowId>,
    engine: Option<Engine<GpuBackend>>,
    clock: FrameClock,
    pending_dt: f32,
    render_requested: bool,
    failure: Option<String>,
    shutdown_done: bool,
}

impl TwinviewRuntime {
    fn new(
        registry: SceneRegistry,
        options: RunOptions,
        command_rx: RuntimeCommandReceiver,
        connected: Arc<AtomicBool>,
    ) -> Self {
        let clock = FrameClock::new(options.config.fps);

        Self {
            registry,
            options,
            command_rx,
            connected,
            window: None,
            window_id: None,
            engine: None,
            clock,
            pending_dt: 0.0,
            render_requested: false,
            failure: None,
            shutdown_done: false,
        }
    }

    fn init_runtime(
        &mut self,
        event_loop: &ActiveEventLoop,
    ) -> Result<(), String> {
        let [width, height] = self.options.config.display.output_size();

        let attrs = WindowAttributes::default()
            .with_title("twinview")
            .with_inner_size(PhysicalSize::new(width, height))
            .with_position(PhysicalPosition::new(0, 0))
            .with_decorations(false)
            .with_resizable(false);

        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .map_err(|err| err.to_string())?,
        );

        let backend = GpuBackend::for_window(
            window.clone(),
            &self.registry,
            self.options.config.clear_color,
        )?;

        let engine = build_engine(
            backend,
            &self.registry,
            &self.options,
            self.connected.clone(),
        )?;

        self.window_id = Some(window.id());
        self.window = Some(window);
        self.engine = Some(engine);
        self.clock = FrameClock::new(self.options.config.fps);

        Ok(())
    }

    fn render(&mut self, event_loop: &ActiveEventLoop) {
        self.render_requested = false;

        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        let dt = std::mem::take(&mut self.pending_dt);
        if let Err(err) = engine.tick(dt, Instant::now()) {
            self.fail(event_loop, err);
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: String) {
        error!("{}", err);
        self.failure = Some(err);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if !self.shutdown_done {
            if let Some(engine) = self.engine.as_mut() {
                engine.shutdown();
            }
            self.shutdown_done = true;
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for TwinviewRuntime {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        if let Err(err) = self.init_runtime(event_loop) {
            self.fail(
                event_loop,
                format!("failed to initialize twinview: {}", err),
            );
            return;
        }

        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window_id != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.backend_mut().resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                self.render(event_loop);
            }
            _ => {}
        }
    }

    // Commands are drained before the clock advances so they never land
    // mid-frame.
    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        if engine.drain_commands(&self.command_rx) {
            info!("quit requested");
            self.shutdown(event_loop);
            return;
        }

        let tick = self.clock.tick(Instant::now());
        if tick.should_render {
            self.pending_dt += tick.dt;
            if !self.render_requested {
                self.render_requested = true;
                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            }
        }

        event_loop
            .set_control_flow(ControlFlow::WaitUntil(self.clock.next_deadline()));
    }

    fn exiting(&mut self, event_loop: &ActiveEventLoop) {
        self.shutdown(event_loop);
    }
}

/// Starts the OSC transport and runs the windowed or headless loop until
/// quit.
pub fn run(registry: SceneRegistry, options: RunOptions) -> Result<(), String> {
    let (command_tx, command_rx) = command_channel();
    let connected = Arc::new(AtomicBool::new(false));

    let _transport = match OscTransport::start(
        options.config.osc_port,
        command_tx,
        connected.clone(),
    ) {
        Ok(transport) => Some(transport),
        Err(err) => {
            warn!("{}; continuing without remote control", err);
            None
        }
    };

    if options.headless {
        return run_headless(registry, options, command_rx, connected);
    }

    let event_loop = EventLoop::new().map_err(|err| err.to_string())?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut runner =
        TwinviewRuntime::new(registry, options, command_rx, connected);

    event_loop
        .run_app(&mut runner)
        .map_err(|err| err.to_string())?;

    match runner.failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Drives the engine with the software compositor and no window.
pub fn run_headless(
    registry: SceneRegistry,
    options: RunOptions,
    command_rx: RuntimeCommandReceiver,
    connected: Arc<AtomicBool>,
) -> Result<(), String> {
    let mut backend = SoftwareBackend::from_registry(
        options.config.display.output_size(),
        &registry,
    );
    backend.set_clear_color(options.config.clear_color);

    let mut engine = build_engine(backend, &registry, &options, connected)?;
    let mut clock = FrameClock::new(options.config.fps);

    info!("running headless at {} fps", options.config.fps);

    let result = loop {
        if engine.drain_commands(&command_rx) {
            info!("quit requested");
            break Ok(());
        }

        let now = Instant::now();
        let tick = clock.tick(now);
        if tick.should_render {
            if let Err(err) = engine.tick(tick.dt, now) {
                break Err(err);
            }
        }

        if options
            .max_frames
            .is_some_and(|max| clock.frame_count() >= max)
        {
            break Ok(());
        }

        let deadline = clock.next_deadline();
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
    };

    if let Some(fps) = clock.measured_fps() {
        info!(
            "headless run finished after {} frames ({:.1} fps)",
            clock.frame_count(),
            fps
        );
    }

    engine.shutdown();
    result
}

fn build_engine<B: SurfaceBackend>(
    backend: B,
    registry: &SceneRegistry,
    options: &RunOptions,
    connected: Arc<AtomicBool>,
) -> Result<Engine<B>, String> {
    let mut engine = Engine::new(
        backend,
        options.config.clone(),
        CommandGateway::from_registry(registry),
    )?
    .with_config_path(options.config_path.clone())
    .with_overrides(options.overrides.clone())
    .with_connected(connected);

    if let Some(addr) = options.config.status_addr.as_deref() {
        match OscStatusSink::connect(addr) {
            Ok(sink) => engine.subscribe(Box::new(sink)),
            Err(err) => warn!("status output disabled: {}", err),
        }
    }

    Ok(engine)
}
