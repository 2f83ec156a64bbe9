use std::fmt;

/// Highest channel index a pass may reference (`iChannel0`..`iChannel15`).
pub const MAX_CHANNELS: usize = 16;

/// Channel written by the primary ("Image") pass and presented by default.
pub const PRIMARY_CHANNEL: u8 = 0;

/// Number of custom uniform slots carried by the custom uniform block.
pub const MAX_CUSTOM_UNIFORMS: usize = 16;

/// Nominal audio sample rate exposed as `iSampleRate`.
pub const DEFAULT_SAMPLE_RATE: f32 = 44100.0;

/// Role a channel plays in the data-flow graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Written by a pass; double-buffered so the pass can read its previous output.
    Buffer,
    /// Static image decoded once at import.
    Image,
    /// Decoded video frames refreshed by an external producer.
    Video,
    /// Audio spectrum/waveform texture refreshed by an external producer.
    Audio,
    /// Procedural feeds such as keyboard state, webcam or microphone.
    ProceduralInput,
}

impl ChannelKind {
    pub fn is_buffer(self) -> bool {
        matches!(self, ChannelKind::Buffer)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelKind::Buffer => "buffer",
            ChannelKind::Image => "image",
            ChannelKind::Video => "video",
            ChannelKind::Audio => "audio",
            ChannelKind::ProceduralInput => "procedural-input",
        };
        f.write_str(name)
    }
}

/// Texel extent of a channel. `depth` is only set for volumetric channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    pub depth: Option<u32>,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: None,
        }
    }

    pub fn volume(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth: Some(depth),
        }
    }

    /// Clamps every axis to at least one texel.
    pub fn clamped(self) -> Self {
        Self {
            width: self.width.max(1),
            height: self.height.max(1),
            depth: self.depth.map(|depth| depth.max(1)),
        }
    }

    pub fn dimension(&self) -> SamplerDim {
        if self.depth.is_some() {
            SamplerDim::D3
        } else {
            SamplerDim::D2
        }
    }

    /// Number of texels across all layers.
    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize * self.depth.unwrap_or(1) as usize
    }

    /// `vec3` form used for `iResolution` and `iChannelResolution`.
    pub fn as_uniform(&self) -> [f32; 4] {
        [
            self.width as f32,
            self.height as f32,
            self.depth.map(|depth| depth as f32).unwrap_or(1.0),
            0.0,
        ]
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.depth {
            Some(depth) => write!(f, "{}x{}x{}", self.width, self.height, depth),
            None => write!(f, "{}x{}", self.width, self.height),
        }
    }
}

/// Sampler dimensionality declared for a channel in the synthesized program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerDim {
    D2,
    D3,
}

/// How a channel's resolution is decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sizing {
    /// Follows the presentation surface; reallocated whenever it resizes.
    Surface,
    /// Explicit resolution that surface resizes never touch.
    Fixed(Resolution),
}

/// Texture filtering requested for a channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

/// Texture addressing requested for a channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Wrap {
    #[default]
    Clamp,
    Repeat,
}

/// Sampler state used whenever a channel is bound as a pass input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Sampling {
    pub filter: Filter,
    pub wrap: Wrap,
}

/// Storage format of a channel texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    /// 32-bit float RGBA render target.
    Rgba32Float,
    /// 16-bit float RGBA render target used when 32-bit float targets are unavailable.
    Rgba16Float,
    /// 8-bit RGBA used for decoded media and procedural feeds.
    Rgba8,
}

impl TexelFormat {
    pub fn bytes_per_texel(self) -> usize {
        match self {
            TexelFormat::Rgba32Float => 16,
            TexelFormat::Rgba16Float => 8,
            TexelFormat::Rgba8 => 4,
        }
    }
}

/// Preference for buffer channel storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BufferPrecision {
    /// 32-bit float when the host can render and filter it, 16-bit float otherwise.
    #[default]
    Auto,
    /// Always 16-bit float.
    Half,
}

impl BufferPrecision {
    /// Storage format for buffer channels given what the host can render into.
    pub fn resolve(self, float32_targets: bool) -> TexelFormat {
        match self {
            BufferPrecision::Auto if float32_targets => TexelFormat::Rgba32Float,
            _ => TexelFormat::Rgba16Float,
        }
    }
}

/// Output color handling for the presentation blit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpaceMode {
    /// Shader outputs are already gamma-encoded; present them untouched.
    #[default]
    Gamma,
    /// Shader outputs are linear; present with a fixed 2.2 gamma encode.
    Linear,
}

impl ColorSpaceMode {
    /// Exponent applied per pixel by the passthrough program.
    pub fn present_exponent(self) -> f32 {
        match self {
            ColorSpaceMode::Gamma => 1.0,
            ColorSpaceMode::Linear => 1.0 / 2.2,
        }
    }
}

impl fmt::Display for ColorSpaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorSpaceMode::Gamma => f.write_str("gamma"),
            ColorSpaceMode::Linear => f.write_str("linear"),
        }
    }
}

/// Shader compilation backend requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderCompiler {
    /// Compile synthesized GLSL through shaderc into SPIR-V.
    Shaderc,
    /// Hand GLSL to naga's built-in frontend.
    NagaGlsl,
}

impl Default for ShaderCompiler {
    fn default() -> Self {
        if cfg!(feature = "shaderc") {
            ShaderCompiler::Shaderc
        } else {
            ShaderCompiler::NagaGlsl
        }
    }
}

impl fmt::Display for ShaderCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderCompiler::Shaderc => f.write_str("shaderc"),
            ShaderCompiler::NagaGlsl => f.write_str("naga"),
        }
    }
}

/// Where program builds run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompileStrategy {
    /// Link on the caller's thread; `compile` reports the outcome directly.
    #[default]
    Immediate,
    /// Link on a worker thread; the program is swapped in at the next tick boundary.
    Threaded,
}

/// GLSL type of a custom uniform. Every custom uniform occupies one `vec4` slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CustomUniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
}

impl CustomUniformKind {
    pub fn components(self) -> usize {
        match self {
            CustomUniformKind::Float => 1,
            CustomUniformKind::Vec2 => 2,
            CustomUniformKind::Vec3 => 3,
            CustomUniformKind::Vec4 => 4,
        }
    }

    pub(crate) fn swizzle(self) -> &'static str {
        match self {
            CustomUniformKind::Float => ".x",
            CustomUniformKind::Vec2 => ".xy",
            CustomUniformKind::Vec3 => ".xyz",
            CustomUniformKind::Vec4 => "",
        }
    }
}

/// Custom uniform exposed to every pass under `name`.
#[derive(Clone, Debug, PartialEq)]
pub struct CustomUniformDecl {
    pub name: String,
    pub kind: CustomUniformKind,
    pub initial: [f32; 4],
}

impl CustomUniformDecl {
    pub fn new(name: impl Into<String>, kind: CustomUniformKind) -> Self {
        Self {
            name: name.into(),
            kind,
            initial: [0.0; 4],
        }
    }

    pub fn with_initial(mut self, values: &[f32]) -> Self {
        for (slot, value) in self.initial.iter_mut().zip(values) {
            *slot = *value;
        }
        self
    }
}

/// Engine-wide settings fixed at construction time.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Value reported through `iSampleRate`.
    pub sample_rate: f32,
    /// Presentation color handling.
    pub color_space: ColorSpaceMode,
    /// Buffer channel storage preference.
    pub precision: BufferPrecision,
    /// Whether program builds block the caller.
    pub compile_strategy: CompileStrategy,
    /// Custom uniforms declared in every synthesized program.
    pub custom_uniforms: Vec<CustomUniformDecl>,
    /// Channel blitted to the presentation surface after every tick.
    pub present_channel: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            color_space: ColorSpaceMode::default(),
            precision: BufferPrecision::default(),
            compile_strategy: CompileStrategy::default(),
            custom_uniforms: Vec::new(),
            present_channel: PRIMARY_CHANNEL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volumetric_resolution_reports_depth() {
        let volume = Resolution::volume(32, 32, 16);
        assert_eq!(volume.dimension(), SamplerDim::D3);
        assert_eq!(volume.as_uniform(), [32.0, 32.0, 16.0, 0.0]);
        assert_eq!(volume.texel_count(), 32 * 32 * 16);
        assert_eq!(Resolution::new(4, 2).as_uniform()[2], 1.0);
    }

    #[test]
    fn custom_initial_values_fill_leading_components() {
        let decl = CustomUniformDecl::new("uTint", CustomUniformKind::Vec3).with_initial(&[0.5, 0.25]);
        assert_eq!(decl.initial, [0.5, 0.25, 0.0, 0.0]);
    }
}
