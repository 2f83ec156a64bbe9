use std::collections::HashMap;

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::backend::{
    AllocError, DrawCall, FrameError, GpuBackend, PresentParams, TextureDesc,
};
use crate::types::{
    BufferPrecision, Filter, Resolution, Sampling, ShaderCompiler, TexelFormat, Wrap,
};
use crate::uniforms::{CustomBlock, ShaderUniforms};

use super::context::GpuContext;
use super::pipeline::{self, WgpuProgram, WgpuProgramBuilder};
use super::present::PresentPipeline;

/// A channel texture and its default view.
pub struct WgpuTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    resolution: Resolution,
}

impl WgpuTarget {
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}

/// [`GpuBackend`] rendering through wgpu into a window surface.
///
/// Every draw is submitted on its own: the shared uniform buffers are
/// rewritten per pass, and queue writes land before the next submission.
pub struct WgpuBackend {
    context: GpuContext,
    builder: WgpuProgramBuilder,
    present: PresentPipeline,
    uniform_buffer: wgpu::Buffer,
    custom_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    samplers: HashMap<Sampling, wgpu::Sampler>,
}

impl WgpuBackend {
    /// Opens a device on `target` and prepares pass and present pipelines.
    ///
    /// `precision` must match the engine's so pass pipelines target the
    /// format buffer channels are allocated in.
    pub fn new<T>(
        target: &T,
        size: Resolution,
        compiler: ShaderCompiler,
        precision: BufferPrecision,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, size)?;
        let device = &context.device;

        let uniform_layout = pipeline::uniform_layout(device);
        let vertex_module = pipeline::vertex_module(device);
        let buffer_format = texture_format(precision.resolve(context.float32_targets));
        let present = PresentPipeline::new(device, &vertex_module, context.surface_format);
        let builder = WgpuProgramBuilder::new(
            device.clone(),
            uniform_layout.clone(),
            vertex_module,
            buffer_format,
            compiler,
        );

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shader params"),
            size: std::mem::size_of::<ShaderUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let custom_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("custom params"),
            size: std::mem::size_of::<CustomBlock>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pass uniforms"),
            layout: &uniform_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: custom_buffer.as_entire_binding(),
                },
            ],
        });

        let mut samplers = HashMap::new();
        for filter in [Filter::Nearest, Filter::Linear] {
            for wrap in [Wrap::Clamp, Wrap::Repeat] {
                let sampling = Sampling { filter, wrap };
                samplers.insert(sampling, create_sampler(device, sampling));
            }
        }

        tracing::info!(
            ?buffer_format,
            surface_format = ?context.surface_format,
            %compiler,
            "wgpu backend ready"
        );

        Ok(Self {
            context,
            builder,
            present,
            uniform_buffer,
            custom_buffer,
            uniform_bind_group,
            samplers,
        })
    }

    pub fn surface_size(&self) -> Resolution {
        Resolution::new(self.context.config.width, self.context.config.height)
    }

    fn sampler(&self, sampling: Sampling) -> &wgpu::Sampler {
        // Every combination is created up front.
        &self.samplers[&sampling]
    }

    fn check_limits(&self, desc: &TextureDesc) -> Result<(), AllocError> {
        let Resolution {
            width,
            height,
            depth,
        } = desc.resolution;
        let limit = match depth {
            Some(_) => self.context.max_dimension_3d,
            None => self.context.max_dimension_2d,
        };
        let largest = width.max(height).max(depth.unwrap_or(1));
        if largest > limit {
            return Err(AllocError::Rejected {
                label: desc.label.clone(),
                reason: format!("{} exceeds the device limit of {limit}", desc.resolution),
            });
        }
        Ok(())
    }
}

impl GpuBackend for WgpuBackend {
    type Target = WgpuTarget;
    type Program = WgpuProgram;
    type Builder = WgpuProgramBuilder;

    fn supports_float32_targets(&self) -> bool {
        self.context.float32_targets
    }

    fn allocate(&mut self, desc: &TextureDesc) -> Result<WgpuTarget, AllocError> {
        self.check_limits(desc)?;
        let device = &self.context.device;
        let (dimension, depth) = match desc.resolution.depth {
            Some(depth) => (wgpu::TextureDimension::D3, depth),
            None => (wgpu::TextureDimension::D2, 1),
        };
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if desc.renderable {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.resolution.width,
                height: desc.resolution.height,
                depth_or_array_layers: depth,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension,
            format: texture_format(desc.format),
            usage,
            view_formats: &[],
        });
        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());

        if out_of_memory.is_some() {
            texture.destroy();
            return Err(AllocError::OutOfMemory {
                label: desc.label.clone(),
            });
        }
        if let Some(error) = validation {
            texture.destroy();
            return Err(AllocError::Rejected {
                label: desc.label.clone(),
                reason: error.to_string(),
            });
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuTarget {
            texture,
            view,
            resolution: desc.resolution,
        })
    }

    fn destroy(&mut self, target: WgpuTarget) {
        target.texture.destroy();
    }

    fn upload(&mut self, target: &WgpuTarget, texels: &[u8]) {
        let size = target.texture.size();
        let bytes_per_texel = target
            .texture
            .format()
            .block_copy_size(None)
            .unwrap_or(4);
        self.context.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size.width * bytes_per_texel),
                rows_per_image: Some(size.height),
            },
            size,
        );
    }

    fn builder(&self) -> WgpuProgramBuilder {
        self.builder.clone()
    }

    fn begin_frame(&mut self) {
        // Draws submit individually; nothing to open.
    }

    fn draw(&mut self, call: DrawCall<'_, Self>) {
        let device = &self.context.device;
        let queue = &self.context.queue;
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(call.uniforms));
        queue.write_buffer(&self.custom_buffer, 0, bytemuck::bytes_of(call.custom));

        let mut entries = Vec::with_capacity(call.inputs.len() * 2);
        for bound in &call.inputs {
            entries.push(wgpu::BindGroupEntry {
                binding: bound.slot.unit * 2,
                resource: wgpu::BindingResource::TextureView(&bound.texture.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: bound.slot.unit * 2 + 1,
                resource: wgpu::BindingResource::Sampler(self.sampler(bound.sampling)),
            });
        }
        let channel_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(call.label),
            layout: &call.program.channel_layout,
            entries: &entries,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(call.label),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(call.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &call.output.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&call.program.pipeline);
            pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            pass.set_bind_group(1, &channel_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        queue.submit(Some(encoder.finish()));
    }

    fn present(
        &mut self,
        source: Option<&WgpuTarget>,
        params: PresentParams,
    ) -> Result<(), FrameError> {
        let frame = match self.context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(error @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                self.context.reconfigure();
                return Err(FrameError::Surface(error.to_string()));
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(FrameError::OutOfMemory),
            Err(error) => return Err(FrameError::Surface(error.to_string())),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("present encoder"),
                });
        let sampler = self.sampler(Sampling {
            filter: Filter::Linear,
            wrap: Wrap::Clamp,
        });
        self.present.record(
            &self.context.device,
            &self.context.queue,
            &mut encoder,
            &view,
            source.map(|target| (&target.view, sampler)),
            params.exponent,
        );
        self.context.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.context.resize(width, height);
    }
}

fn texture_format(format: TexelFormat) -> wgpu::TextureFormat {
    match format {
        TexelFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TexelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TexelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
    }
}

fn create_sampler(device: &wgpu::Device, sampling: Sampling) -> wgpu::Sampler {
    let address_mode = match sampling.wrap {
        Wrap::Clamp => wgpu::AddressMode::ClampToEdge,
        Wrap::Repeat => wgpu::AddressMode::Repeat,
    };
    let filter = match sampling.filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("channel sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texel_formats_map_to_matching_wgpu_sizes() {
        for format in [
            TexelFormat::Rgba32Float,
            TexelFormat::Rgba16Float,
            TexelFormat::Rgba8,
        ] {
            let wgpu_format = texture_format(format);
            assert_eq!(
                wgpu_format.block_copy_size(None),
                Some(format.bytes_per_texel() as u32)
            );
        }
    }
}
