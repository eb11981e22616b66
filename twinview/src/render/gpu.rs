use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use log::{debug, info, warn};
use naga::front::wgsl;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use winit::window::Window;

use super::frame::Frame;
use crate::compose::{Layer, Region, SceneParams, SurfaceBackend};
use crate::scene::{Scene, SceneRegistry};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEBUG_SHADER: &str = include_str!("shaders/debug.wgsl");
const COMPOSITE_SHADER: &str = include_str!("shaders/composite.wgsl");

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct SceneUniforms {
    resolution: [f32; 2],
    time: f32,
    connected: f32,
}

pub struct GpuTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: [u32; 2],
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    sample_bind_group: wgpu::BindGroup,
}

impl GpuTarget {
    pub fn size(&self) -> [u32; 2] {
        self.size
    }
}

enum Output {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Texture {
        texture: wgpu::Texture,
    },
}

enum Acquired {
    View(wgpu::TextureView),
    Surface(wgpu::SurfaceTexture),
    Skipped,
}

/// wgpu implementation of the compositor. Scene shaders render into
/// per-channel textures; compositing samples those into each display's
/// viewport on the output with a constant blend factor per layer.
pub struct GpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    output: Output,
    output_format: wgpu::TextureFormat,
    clear_color: wgpu::Color,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    scene_pipelines: HashMap<String, wgpu::RenderPipeline>,
    debug_pipeline: wgpu::RenderPipeline,
    composite_first: wgpu::RenderPipeline,
    composite_add: wgpu::RenderPipeline,
    frame: Option<Frame>,
    output_skipped: bool,
}

impl GpuBackend {
    pub fn for_window(
        window: Arc<Window>,
        registry: &SceneRegistry,
        clear_color: [f32; 4],
    ) -> Result<Self, String> {
        let instance =
            wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let surface = instance
            .create_surface(window.clone())
            .map_err(|err| err.to_string())?;

        let (adapter, device, queue) =
            request_device(&instance, Some(&surface))?;

        let size = window.inner_size();
        let caps = surface.get_capabilities(&adapter);
        let format = choose_surface_format(&caps.formats)
            .ok_or_else(|| "surface has no supported formats".to_string())?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &config);
        info!(
            "surface configured: {}x{} {:?}",
            config.width, config.height, format
        );

        Self::build(
            device,
            queue,
            Output::Window { surface, config },
            format,
            registry,
            clear_color,
        )
    }

    /// Renders into a texture instead of a window.
    pub fn offscreen(
        size: [u32; 2],
        registry: &SceneRegistry,
        clear_color: [f32; 4],
    ) -> Result<Self, String> {
        let instance =
            wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let (_adapter, device, queue) = request_device(&instance, None)?;

        let texture = create_texture(
            &device,
            "twinview-offscreen-output",
            size,
            wgpu::TextureUsages::COPY_SRC,
        );

        Self::build(
            device,
            queue,
            Output::Texture { texture },
            TARGET_FORMAT,
            registry,
            clear_color,
        )
    }

    fn build(
        device: wgpu::Device,
        queue: wgpu::Queue,
        output: Output,
        output_format: wgpu::TextureFormat,
        registry: &SceneRegistry,
        clear_color: [f32; 4],
    ) -> Result<Self, String> {
        let uniform_layout = create_uniform_layout(&device);
        let texture_layout = create_texture_layout(&device);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("twinview-composite-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let mut scene_pipelines = HashMap::new();
        for entry in registry.entries() {
            let path = entry.content.shader_path();
            let source = fs::read_to_string(path).map_err(|err| {
                format!("failed to read shader '{}': {}", path.display(), err)
            })?;

            validate_shader(&source).map_err(|err| {
                format!(
                    "shader validation failed for '{}': {}",
                    path.display(),
                    err
                )
            })?;

            let pipeline = create_render_pipeline(
                &device,
                TARGET_FORMAT,
                &uniform_layout,
                &source,
                entry.config.name,
                wgpu::BlendState::REPLACE,
            );
            debug!("compiled scene '{}' from {}", entry.config.name, path.display());
            scene_pipelines.insert(entry.config.name.to_string(), pipeline);
        }

        validate_shader(DEBUG_SHADER)
            .map_err(|err| format!("debug shader is invalid: {}", err))?;
        let debug_pipeline = create_render_pipeline(
            &device,
            TARGET_FORMAT,
            &uniform_layout,
            DEBUG_SHADER,
            "twinview-debug-scene",
            wgpu::BlendState::REPLACE,
        );

        validate_shader(COMPOSITE_SHADER)
            .map_err(|err| format!("composite shader is invalid: {}", err))?;
        let composite_first = create_render_pipeline(
            &device,
            output_format,
            &texture_layout,
            COMPOSITE_SHADER,
            "twinview-composite-first",
            constant_blend(wgpu::BlendFactor::Zero),
        );
        let composite_add = create_render_pipeline(
            &device,
            output_format,
            &texture_layout,
            COMPOSITE_SHADER,
            "twinview-composite-add",
            constant_blend(wgpu::BlendFactor::One),
        );

        let [r, g, b, a] = clear_color.map(f64::from);

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            output,
            output_format,
            clear_color: wgpu::Color { r, g, b, a },
            uniform_layout,
            texture_layout,
            sampler,
            scene_pipelines,
            debug_pipeline,
            composite_first,
            composite_add,
            frame: None,
            output_skipped: false,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn output_format(&self) -> wgpu::TextureFormat {
        self.output_format
    }

    pub fn output_size(&self) -> [u32; 2] {
        match &self.output {
            Output::Window { config, .. } => [config.width, config.height],
            Output::Texture { texture } => {
                [texture.width(), texture.height()]
            }
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        if let Output::Window { surface, config } = &mut self.output {
            config.width = width;
            config.height = height;
            surface.configure(&self.device, config);
        }
    }

    fn ensure_frame(&mut self) -> &mut Frame {
        let device = &self.device;
        let queue = &self.queue;
        self.frame
            .get_or_insert_with(|| Frame::new(device, queue.clone()))
    }

    /// Attaches the presentation texture to the current frame. Returns false
    /// when this frame cannot be presented and compositing should be skipped.
    fn acquire_output(&mut self) -> Result<bool, String> {
        if self.output_skipped {
            return Ok(false);
        }

        if self.frame.as_ref().is_some_and(Frame::has_output) {
            return Ok(true);
        }

        let acquired = match &self.output {
            Output::Texture { texture } => Ok(Acquired::View(
                texture.create_view(&wgpu::TextureViewDescriptor::default()),
            )),
            Output::Window { surface, config } => {
                match surface.get_current_texture() {
                    Ok(output) => Ok(Acquired::Surface(output)),
                    Err(
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated,
                    ) => {
                        surface.configure(&self.device, config);
                        Ok(Acquired::Skipped)
                    }
                    Err(wgpu::SurfaceError::Timeout) => {
                        warn!("surface timeout while acquiring frame");
                        Ok(Acquired::Skipped)
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        Err("surface out of memory".to_string())
                    }
                    Err(wgpu::SurfaceError::Other) => {
                        warn!("surface error while acquiring frame");
                        Ok(Acquired::Skipped)
                    }
                }
            }
        };

        match acquired? {
            Acquired::View(view) => {
                self.ensure_frame().attach_view(view);
                Ok(true)
            }
            Acquired::Surface(output) => {
                self.ensure_frame().attach_surface(output);
                Ok(true)
            }
            Acquired::Skipped => {
                self.output_skipped = true;
                Ok(false)
            }
        }
    }

    fn viewport(&self, region: Region) -> Option<[f32; 4]> {
        let [out_w, out_h] = self.output_size();
        let x_end = region.x.saturating_add(region.width).min(out_w);
        let y_end = region.y.saturating_add(region.height).min(out_h);

        if region.x >= x_end || region.y >= y_end {
            return None;
        }

        Some([
            region.x as f32,
            region.y as f32,
            (x_end - region.x) as f32,
            (y_end - region.y) as f32,
        ])
    }
}

impl SurfaceBackend for GpuBackend {
    type Target = GpuTarget;

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

        let limit = self.device.limits().max_texture_dimension_2d;
        if size[0] > limit || size[1] > limit {
            return Err(format!(
                "target '{}' exceeds the device texture limit of {}",
                label, limit
            ));
        }

        let texture = create_texture(
            &self.device,
            label,
            size,
            wgpu::TextureUsages::empty(),
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<SceneUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind_group =
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("twinview-scene-uniforms"),
                layout: &self.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            });

        let sample_bind_group =
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("twinview-composite-source"),
                layout: &self.texture_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&view),
                    },
                ],
            });

        Ok(GpuTarget {
            _texture: texture,
            view,
            size,
            uniform_buffer,
            uniform_bind_group,
            sample_bind_group,
        })
    }

    fn draw_scene(
        &mut self,
        target: &mut Self::Target,
        scene: &Scene,
        params: &SceneParams,
    ) -> Result<(), String> {
        let uniforms = SceneUniforms {
            resolution: [target.size[0] as f32, target.size[1] as f32],
            time: params.time,
            connected: if params.connected { 1.0 } else { 0.0 },
        };
        self.queue.write_buffer(
            &target.uniform_buffer,
            0,
            bytemuck::bytes_of(&uniforms),
        );

        let pipeline = match scene {
            Scene::Debug => &self.debug_pipeline,
            Scene::Generated(name) => {
                self.scene_pipelines.get(name).ok_or_else(|| {
                    format!("scene '{}' is not registered", name)
                })?
            }
            Scene::ExternalApp => {
                return Err(format!("scene '{}' has no drawable content", scene));
            }
        };

        let device = &self.device;
        let queue = &self.queue;
        let frame = self
            .frame
            .get_or_insert_with(|| Frame::new(device, queue.clone()));

        let mut pass =
            frame.encoder().begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(scene.name()),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &target.uniform_bind_group, &[]);
        pass.draw(0..4, 0..1);

        Ok(())
    }

    fn clear(
        &mut self,
        target: &mut Self::Target,
        color: [f32; 4],
    ) -> Result<(), String> {
        let [r, g, b, a] = color.map(f64::from);
        let frame = self.ensure_frame();

        let _pass =
            frame.encoder().begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("twinview-clear-target"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

        Ok(())
    }

    fn composite(
        &mut self,
        region: Region,
        layers: &[Layer<'_, Self::Target>],
    ) -> Result<(), String> {
        self.ensure_frame();

        if !self.acquire_output()? {
            return Ok(());
        }

        let viewport = self.viewport(region);
        let clear_color = self.clear_color;

        let Some(frame) = self.frame.as_mut() else {
            return Ok(());
        };
        let Some(view) = frame.output_view() else {
            return Ok(());
        };

        let load = if frame.take_output_clear() {
            wgpu::LoadOp::Clear(clear_color)
        } else {
            wgpu::LoadOp::Load
        };

        let mut pass =
            frame.encoder().begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("twinview-composite"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

        let Some([x, y, w, h]) = viewport else {
            return Ok(());
        };
        pass.set_viewport(x, y, w, h, 0.0, 1.0);

        for (index, layer) in layers.iter().enumerate() {
            let pipeline = if index == 0 {
                &self.composite_first
            } else {
                &self.composite_add
            };

            let opacity = f64::from(layer.opacity.clamp(0.0, 1.0));
            pass.set_pipeline(pipeline);
            pass.set_blend_constant(wgpu::Color {
                r: opacity,
                g: opacity,
                b: opacity,
                a: opacity,
            });
            pass.set_bind_group(0, &layer.target.sample_bind_group, &[]);
            pass.draw(0..4, 0..1);
        }

        Ok(())
    }

    fn finish_frame(&mut self) -> Result<(), String> {
        self.output_skipped = false;

        if let Some(frame) = self.frame.take() {
            frame.submit();
        }

        Ok(())
    }
}

fn request_device(
    instance: &wgpu::Instance,
    compatible_surface: Option<&wgpu::Surface<'_>>,
) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue), String> {
    let adapter = pollster::block_on(instance.request_adapter(
        &wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface,
        },
    ))
    .map_err(|err| format!("no suitable GPU adapter: {}", err))?;

    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("twinview-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        },
    ))
    .map_err(|err| format!("failed to open GPU device: {}", err))?;

    Ok((adapter, device, queue))
}

// Blending must not go through an sRGB conversion, or the crossfade stops
// being linear in stored values.
fn choose_surface_format(
    formats: &[wgpu::TextureFormat],
) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .copied()
        .find(|f| {
            matches!(
                f,
                wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Rgba8Unorm
            )
        })
        .or_else(|| formats.first().copied())
}

fn create_texture(
    device: &wgpu::Device,
    label: &str,
    size: [u32; 2],
    extra_usage: wgpu::TextureUsages,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | extra_usage,
        view_formats: &[],
    })
}

fn constant_blend(dst_factor: wgpu::BlendFactor) -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::Constant,
        dst_factor,
        operation: wgpu::BlendOperation::Add,
    };

    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

fn create_uniform_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("twinview-scene-uniform-layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX
                | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(
                    std::mem::size_of::<SceneUniforms>() as u64,
                ),
            },
            count: None,
        }],
    })
}

fn create_texture_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("twinview-composite-texture-layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(
                    wgpu::SamplerBindingType::Filtering,
                ),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float {
                        filterable: true,
                    },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
        ],
    })
}

fn create_render_pipeline(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    layout: &wgpu::BindGroupLayout,
    source: &str,
    label: &str,
    blend: wgpu::BlendState,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let pipeline_layout =
        device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[layout],
            push_constant_ranges: &[],
        });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

fn validate_shader(source: &str) -> Result<(), String> {
    let module = wgsl::parse_str(source).map_err(|err| err.to_string())?;

    let mut validator =
        Validator::new(ValidationFlags::all(), Capabilities::all());

    validator
        .validate(&module)
        .map_err(|err| err.to_string())
        .map(|_| ())
}
