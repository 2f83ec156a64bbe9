use std::borrow::Cow;

use wgpu::naga::ShaderStage;

use crate::backend::{ProgramBuilder, ProgramSource, SamplerSlot};
use crate::compile::VERTEX_SHADER_GLSL;
use crate::types::{SamplerDim, ShaderCompiler};

/// Bind group layout for set 0: `ShaderParams` at binding 0, custom block at binding 1.
pub(crate) fn uniform_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let entry = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("pass uniform layout"),
        entries: &[entry(0), entry(1)],
    })
}

/// Compiles the full-screen triangle shared by passes and the present blit.
pub(crate) fn vertex_module(device: &wgpu::Device) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("fullscreen triangle vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(VERTEX_SHADER_GLSL),
            stage: ShaderStage::Vertex,
            defines: &[],
        },
    })
}

/// A linked pass: render pipeline plus the layout its channel bind group must follow.
pub struct WgpuProgram {
    pub(crate) pipeline: wgpu::RenderPipeline,
    pub(crate) channel_layout: wgpu::BindGroupLayout,
}

/// Builds pass pipelines. Cheap to clone; every field is a shared wgpu handle.
#[derive(Clone)]
pub struct WgpuProgramBuilder {
    device: wgpu::Device,
    uniform_layout: wgpu::BindGroupLayout,
    vertex_module: wgpu::ShaderModule,
    target_format: wgpu::TextureFormat,
    compiler: ShaderCompiler,
}

impl WgpuProgramBuilder {
    pub(crate) fn new(
        device: wgpu::Device,
        uniform_layout: wgpu::BindGroupLayout,
        vertex_module: wgpu::ShaderModule,
        target_format: wgpu::TextureFormat,
        compiler: ShaderCompiler,
    ) -> Self {
        Self {
            device,
            uniform_layout,
            vertex_module,
            target_format,
            compiler,
        }
    }

    fn fragment_module(&self, source: &ProgramSource) -> Result<wgpu::ShaderModule, String> {
        let descriptor = match self.compiler {
            ShaderCompiler::Shaderc => wgpu::ShaderModuleDescriptor {
                label: Some(&source.label),
                source: wgpu::ShaderSource::SpirV(Cow::Owned(compile_spirv(source)?)),
            },
            ShaderCompiler::NagaGlsl => {
                // wgpu only reports GLSL frontend failures without positions,
                // so parse once up front to get a log with line numbers.
                parse_glsl(&source.fragment)?;
                wgpu::ShaderModuleDescriptor {
                    label: Some(&source.label),
                    source: wgpu::ShaderSource::Glsl {
                        shader: Cow::Borrowed(&source.fragment),
                        stage: ShaderStage::Fragment,
                        defines: &[],
                    },
                }
            }
        };
        Ok(self.device.create_shader_module(descriptor))
    }
}

impl ProgramBuilder for WgpuProgramBuilder {
    type Program = WgpuProgram;

    fn build(&self, source: &ProgramSource) -> Result<WgpuProgram, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let fragment_module = match self.fragment_module(source) {
            Ok(module) => module,
            Err(log) => {
                let _ = pollster::block_on(self.device.pop_error_scope());
                return Err(log);
            }
        };

        let channel_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("channel layout"),
                entries: &channel_layout_entries(&source.samplers),
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("pass pipeline layout"),
                bind_group_layouts: &[&self.uniform_layout, &channel_layout],
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&source.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.vertex_module,
                    entry_point: Some("main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.target_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(error.to_string());
        }
        Ok(WgpuProgram {
            pipeline,
            channel_layout,
        })
    }
}

/// Texture at `2 * unit`, sampler at `2 * unit + 1`, matching the synthesized declarations.
pub(crate) fn channel_layout_entries(samplers: &[SamplerSlot]) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(samplers.len() * 2);
    for slot in samplers {
        let view_dimension = match slot.dim {
            SamplerDim::D2 => wgpu::TextureViewDimension::D2,
            SamplerDim::D3 => wgpu::TextureViewDimension::D3,
        };
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot.unit * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot.unit * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

#[cfg(feature = "shaderc")]
fn compile_spirv(source: &ProgramSource) -> Result<Vec<u32>, String> {
    let compiler = shaderc::Compiler::new().map_err(|err| err.to_string())?;
    let mut options = shaderc::CompileOptions::new().map_err(|err| err.to_string())?;
    options.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    let file_name = format!("{}.frag", source.label);
    let artifact = compiler
        .compile_into_spirv(
            &source.fragment,
            shaderc::ShaderKind::Fragment,
            &file_name,
            "main",
            Some(&options),
        )
        .map_err(|err| match err {
            shaderc::Error::CompilationError(_, log) => log,
            other => other.to_string(),
        })?;
    if artifact.get_num_warnings() > 0 {
        tracing::debug!(label = %source.label, warnings = %artifact.get_warning_messages(), "shaderc warnings");
    }
    Ok(artifact.as_binary().to_vec())
}

#[cfg(not(feature = "shaderc"))]
fn compile_spirv(_: &ProgramSource) -> Result<Vec<u32>, String> {
    Err("shaderc support is not enabled in this build".to_string())
}

/// Runs naga's GLSL frontend, rendering failures as `ERROR: 0:<line>: <message>` lines.
fn parse_glsl(fragment: &str) -> Result<(), String> {
    use wgpu::naga::front::glsl::{Frontend, Options};

    let mut frontend = Frontend::default();
    frontend
        .parse(&Options::from(ShaderStage::Fragment), fragment)
        .map(|_| ())
        .map_err(|failure| {
            failure
                .errors
                .iter()
                .map(|error| {
                    let line = error.meta.location(fragment).line_number;
                    format!("ERROR: 0:{line}: {}", error.kind)
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_entries_follow_unit_numbering() {
        let entries = channel_layout_entries(&[
            SamplerSlot {
                unit: 0,
                channel: 1,
                dim: SamplerDim::D2,
            },
            SamplerSlot {
                unit: 1,
                channel: 4,
                dim: SamplerDim::D3,
            },
        ]);
        let bindings: Vec<u32> = entries.iter().map(|entry| entry.binding).collect();
        assert_eq!(bindings, vec![0, 1, 2, 3]);
        assert!(matches!(
            entries[2].ty,
            wgpu::BindingType::Texture {
                view_dimension: wgpu::TextureViewDimension::D3,
                ..
            }
        ));
    }

    #[test]
    fn naga_failures_carry_line_numbers() {
        let source = "#version 450\nlayout(location = 0) out vec4 outColor;\nvoid main() {\n    outColor = missing;\n}\n";
        let log = parse_glsl(source).expect_err("undeclared identifier");
        assert!(log.starts_with("ERROR: 0:4:"), "{log}");
    }
}
