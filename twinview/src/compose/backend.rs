use crate::scene::Scene;

/// Neutral content shown behind an external application's own window.
pub const NEUTRAL_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// A display's rectangle on the combined output surface, in pixels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn size(&self) -> [u32; 2] {
        [self.width, self.height]
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneParams {
    /// Seconds since engine start.
    pub time: f32,
    /// Transport liveness, shown by the debug scene.
    pub connected: bool,
}

pub struct Layer<'a, T> {
    pub target: &'a T,
    pub opacity: f32,
}

/// Drawing primitives the compositor needs from a graphics backend.
///
/// Within one frame: scenes are drawn into targets, then each display region
/// is composited from its layers, then `finish_frame` presents. Compositing
/// sums `layer * opacity` over the region, so opacities that add up to 1 give
/// an exact linear blend.
pub trait SurfaceBackend {
    type Target;

    fn create_target(
        &mut self,
        label: &str,
        size: [u32; 2],
    ) -> Result<Self::Target, String>;

    /// Fully overwrites `target` with opaque content for `scene`.
    /// `Scene::ExternalApp` has no content of its own and is an error here.
    fn draw_scene(
        &mut self,
        target: &mut Self::Target,
        scene: &Scene,
        params: &SceneParams,
    ) -> Result<(), String>;

    fn clear(
        &mut self,
        target: &mut Self::Target,
        color: [f32; 4],
    ) -> Result<(), String>;

    fn composite(
        &mut self,
        region: Region,
        layers: &[Layer<'_, Self::Target>],
    ) -> Result<(), String>;

    fn finish_frame(&mut self) -> Result<(), String>;
}
