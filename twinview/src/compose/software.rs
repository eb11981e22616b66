use std::collections::HashSet;

use super::backend::{Layer, Region, SceneParams, SurfaceBackend};
use crate::scene::{Scene, SceneRegistry};

pub type Rgba = [f32; 4];

pub struct SoftwareTarget {
    label: String,
    size: [u32; 2],
    pixels: Vec<Rgba>,
}

impl SoftwareTarget {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        let index = (y * self.size[0] + x) as usize;
        self.pixels.get(index).copied().unwrap_or_default()
    }

    fn fill(&mut self, color: Rgba) {
        self.pixels.fill(color);
    }
}

/// CPU compositor over flat RGBA float buffers. Generated scenes render as
/// a flat color derived from the scene name so output is deterministic.
pub struct SoftwareBackend {
    output_size: [u32; 2],
    output: Vec<Rgba>,
    clear_color: Rgba,
    scenes: HashSet<String>,
    frame_open: bool,
    frames_finished: u64,
    scene_draws: u64,
}

impl SoftwareBackend {
    pub fn new<I, S>(output_size: [u32; 2], scenes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let [w, h] = output_size;
        let clear_color = [0.0, 0.0, 0.0, 1.0];

        Self {
            output_size,
            output: vec![clear_color; (w * h) as usize],
            clear_color,
            scenes: scenes.into_iter().map(Into::into).collect(),
            frame_open: false,
            frames_finished: 0,
            scene_draws: 0,
        }
    }

    pub fn from_registry(
        output_size: [u32; 2],
        registry: &SceneRegistry,
    ) -> Self {
        Self::new(output_size, registry.scene_names().iter().cloned())
    }

    pub fn set_clear_color(&mut self, color: Rgba) {
        self.clear_color = color;
    }

    pub fn output_size(&self) -> [u32; 2] {
        self.output_size
    }

    pub fn output_pixel(&self, x: u32, y: u32) -> Rgba {
        let index = (y * self.output_size[0] + x) as usize;
        self.output.get(index).copied().unwrap_or_default()
    }

    pub fn frames_finished(&self) -> u64 {
        self.frames_finished
    }

    pub fn scene_draws(&self) -> u64 {
        self.scene_draws
    }

    /// The flat color `draw_scene` fills a target with.
    pub fn scene_color(scene: &Scene, params: &SceneParams) -> Rgba {
        match scene {
            Scene::Debug => {
                let indicator = if params.connected { 0.8 } else { 0.2 };
                [0.1, indicator, 0.1, 1.0]
            }
            Scene::ExternalApp => [0.0, 0.0, 0.0, 1.0],
            Scene::Generated(name) => {
                let hash = fnv1a(name.as_bytes());
                let channel = |shift: u32| {
                    ((hash >> shift) & 0xff) as f32 / 255.0
                };
                [channel(0), channel(8), channel(16), 1.0]
            }
        }
    }

    fn begin_frame_if_needed(&mut self) {
        if !self.frame_open {
            self.output.fill(self.clear_color);
            self.frame_open = true;
        }
    }
}

impl SurfaceBackend for SoftwareBackend {
    type Target = SoftwareTarget;

    fn create_target(
        &mut self,
        label: &str,
        size: [u32; 2],
    ) -> Result<Self::Target, String> {
        if size[0] == 0 || size[1] == 0 {
            return Err(format!(
                "target '{}' has zero size {}x{}",
                label, size[0], size[1]
            ));
        }

        Ok(SoftwareTarget {
            label: label.to_string(),
            size,
            pixels: vec![[0.0; 4]; (size[0] * size[1]) as usize],
        })
    }

    fn draw_scene(
        &mut self,
        target: &mut Self::Target,
        scene: &Scene,
        params: &SceneParams,
    ) -> Result<(), String> {
        match scene {
            Scene::ExternalApp => {
                return Err(format!(
                    "scene '{}' has no drawable content",
                    scene
                ));
            }
            Scene::Generated(name) if !self.scenes.contains(name) => {
                return Err(format!("scene '{}' is not registered", name));
            }
            _ => {}
        }

        target.fill(Self::scene_color(scene, params));
        self.scene_draws += 1;
        Ok(())
    }

    fn clear(
        &mut self,
        target: &mut Self::Target,
        color: [f32; 4],
    ) -> Result<(), String> {
        target.fill(color);
        Ok(())
    }

    fn composite(
        &mut self,
        region: Region,
        layers: &[Layer<'_, Self::Target>],
    ) -> Result<(), String> {
        self.begin_frame_if_needed();

        let [out_w, out_h] = self.output_size;
        let x_end = region.x.saturating_add(region.width).min(out_w);
        let y_end = region.y.saturating_add(region.height).min(out_h);

        for y in region.y..y_end {
            for x in region.x..x_end {
                let mut sum = [0.0f32; 4];

                for layer in layers {
                    let [tw, th] = layer.target.size;
                    let tx = (x - region.x) * tw / region.width.max(1);
                    let ty = (y - region.y) * th / region.height.max(1);
                    let texel = layer.target.pixel(tx, ty);

                    for (acc, value) in sum.iter_mut().zip(texel) {
                        *acc += value * layer.opacity;
                    }
                }

                self.output[(y * out_w + x) as usize] = sum;
            }
        }

        Ok(())
    }

    fn finish_frame(&mut self) -> Result<(), String> {
        self.begin_frame_if_needed();
        self.frame_open = false;
        self.frames_finished += 1;
        Ok(())
    }
}

fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811c9dc5u32, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(0x01000193)
    })
}
