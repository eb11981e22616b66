use log::trace;

use super::backend::{
    Layer, NEUTRAL_COLOR, Region, SceneParams, SurfaceBackend,
};
use crate::scene::{DisplayChannel, Scene};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Which {
    /// The target currently on screen, or fading out.
    Live,
    /// The target being faded in.
    Staged,
}

/// Two off-screen targets owned by one channel. Which of them is live flips
/// each time a transition completes.
pub struct RenderSurfacePair<T> {
    front: T,
    back: T,
    front_is_live: bool,
}

impl<T> RenderSurfacePair<T> {
    pub fn new<B>(
        backend: &mut B,
        channel: DisplayChannel,
        size: [u32; 2],
    ) -> Result<Self, String>
    where
        B: SurfaceBackend<Target = T>,
    {
        let front = backend
            .create_target(&format!("twinview-{}-front", channel), size)
            .map_err(|err| {
                format!("failed to allocate {} front target: {}", channel, err)
            })?;
        let back = backend
            .create_target(&format!("twinview-{}-back", channel), size)
            .map_err(|err| {
                format!("failed to allocate {} back target: {}", channel, err)
            })?;

        Ok(Self {
            front,
            back,
            front_is_live: true,
        })
    }

    pub fn front_is_live(&self) -> bool {
        self.front_is_live
    }

    pub fn live(&self) -> &T {
        if self.front_is_live {
            &self.front
        } else {
            &self.back
        }
    }

    pub fn staged(&self) -> &T {
        if self.front_is_live {
            &self.back
        } else {
            &self.front
        }
    }

    fn target_mut(&mut self, which: Which) -> &mut T {
        match (which, self.front_is_live) {
            (Which::Live, true) | (Which::Staged, false) => &mut self.front,
            (Which::Live, false) | (Which::Staged, true) => &mut self.back,
        }
    }

    pub fn flip(&mut self) {
        self.front_is_live = !self.front_is_live;
        trace!("surface pair flipped; front_is_live={}", self.front_is_live);
    }

    pub fn draw<B>(
        &mut self,
        backend: &mut B,
        which: Which,
        scene: &Scene,
        params: &SceneParams,
    ) -> Result<(), String>
    where
        B: SurfaceBackend<Target = T>,
    {
        let target = self.target_mut(which);

        match scene {
            Scene::ExternalApp => backend.clear(target, NEUTRAL_COLOR),
            _ => backend.draw_scene(target, scene, params),
        }
    }

    pub fn clear<B>(
        &mut self,
        backend: &mut B,
        which: Which,
    ) -> Result<(), String>
    where
        B: SurfaceBackend<Target = T>,
    {
        backend.clear(self.target_mut(which), NEUTRAL_COLOR)
    }

    /// Outgoing content first at `1 - progress`, incoming at `progress`.
    pub fn composite<B>(
        &self,
        backend: &mut B,
        region: Region,
        progress: f32,
        in_flight: bool,
    ) -> Result<(), String>
    where
        B: SurfaceBackend<Target = T>,
    {
        if !in_flight {
            return backend.composite(
                region,
                &[Layer {
                    target: self.live(),
                    opacity: 1.0,
                }],
            );
        }

        let progress = progress.clamp(0.0, 1.0);

        backend.composite(
            region,
            &[
                Layer {
                    target: self.live(),
                    opacity: 1.0 - progress,
                },
                Layer {
                    target: self.staged(),
                    opacity: progress,
                },
            ],
        )
    }
}
