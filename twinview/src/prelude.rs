pub use crate::compose::{
    Layer, Region, SceneParams, SoftwareBackend, SurfaceBackend,
    TransitionScheduler,
};
pub use crate::framework::config::{ConfigOverrides, DisplayLayout, EngineConfig};
pub use crate::framework::logging::init_logger;
pub use crate::framework::logging::{debug, error, info, trace, warn};
pub use crate::gpu::GpuBackend;
pub use crate::process::{AppSpec, KeyAction, KeyForwarder, ProcessSupervisor};
pub use crate::register_scenes;
pub use crate::runtime::app::{RunOptions, run, run_headless};
pub use crate::runtime::engine::Engine;
pub use crate::runtime::events::{
    InboundMessage, RuntimeCommand, RuntimeCommandReceiver,
    RuntimeCommandSender, command_channel,
};
pub use crate::runtime::gateway::{Command, CommandGateway, DispatchOutcome};
pub use crate::runtime::status::{SceneStatus, StatusPublisher, StatusSink};
pub use crate::scene::*;
