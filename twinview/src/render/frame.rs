use std::sync::Arc;

/// Command recording for one output frame. Scene draws are encoded first;
/// the presentation texture is attached lazily by the first composite.
pub struct Frame {
    encoder: wgpu::CommandEncoder,
    output: Option<wgpu::SurfaceTexture>,
    output_view: Option<wgpu::TextureView>,
    output_cleared: bool,
    queue: Arc<wgpu::Queue>,
}

impl Frame {
    pub fn new(device: &wgpu::Device, queue: Arc<wgpu::Queue>) -> Self {
        let encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("twinview-frame-encoder"),
            });

        Self {
            encoder,
            output: None,
            output_view: None,
            output_cleared: false,
            queue,
        }
    }

    pub fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        &mut self.encoder
    }

    pub fn has_output(&self) -> bool {
        self.output_view.is_some()
    }

    pub fn attach_surface(&mut self, output: wgpu::SurfaceTexture) {
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.output = Some(output);
        self.output_view = Some(view);
    }

    pub fn attach_view(&mut self, view: wgpu::TextureView) {
        self.output_view = Some(view);
    }

    pub fn output_view(&self) -> Option<wgpu::TextureView> {
        self.output_view.clone()
    }

    /// True exactly once per frame: the first pass onto the output clears it.
    pub fn take_output_clear(&mut self) -> bool {
        !std::mem::replace(&mut self.output_cleared, true)
    }

    pub fn submit(self) {
        self.queue.submit(Some(self.encoder.finish()));

        if let Some(output) = self.output {
            output.present();
        }
    }
}
