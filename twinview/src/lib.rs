pub mod compose;
#[path = "render/frame.rs"]
pub mod frame;
pub mod framework;
#[path = "render/gpu.rs"]
pub mod gpu;
pub mod prelude;
pub mod process;
pub mod runtime;
pub mod scene;

pub use runtime::app::{RunOptions, run, run_headless};
