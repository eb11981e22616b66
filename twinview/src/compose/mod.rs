pub mod backend;
pub mod software;
pub mod surface_pool;
pub mod transition;

pub use backend::{Layer, NEUTRAL_COLOR, Region, SceneParams, SurfaceBackend};
pub use software::{SoftwareBackend, SoftwareTarget};
pub use surface_pool::{RenderSurfacePair, Which};
pub use transition::{Advance, TransitionRequest, TransitionScheduler};
