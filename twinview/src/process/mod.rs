pub mod geometry;
pub mod input;
pub mod supervisor;

pub use geometry::DisplayGeometry;
pub use input::{KeyAction, KeyForwarder, QueuedForwarder, XdotoolForwarder};
pub use supervisor::{AppSpec, ProcessSupervisor, SupervisorError};
