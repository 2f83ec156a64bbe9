//! The seam between the engine and a graphics API.
//!
//! The channel pool and scheduler only ever talk to a [`GpuBackend`]; the
//! `wgpu` implementation lives in `gpu`, and tests drive the engine through a
//! recording backend that needs no device.

use crate::types::{Resolution, SamplerDim, Sampling, TexelFormat};
use crate::uniforms::{CustomBlock, ShaderUniforms};

/// Failure to allocate a texture or render target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("out of GPU memory while allocating {label}")]
    OutOfMemory { label: String },
    #[error("texture allocation for {label} rejected: {reason}")]
    Rejected { label: String, reason: String },
}

/// Failure that aborts the current frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("out of GPU memory during frame")]
    OutOfMemory,
    #[error("presentation surface error: {0}")]
    Surface(String),
}

/// Description of a texture the pool asks the backend to allocate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: String,
    pub resolution: Resolution,
    pub format: TexelFormat,
    /// Whether passes render into this texture.
    pub renderable: bool,
}

/// One sampler declared by a synthesized program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerSlot {
    /// Texture unit; sequential from zero in required-channel order.
    pub unit: u32,
    pub channel: u8,
    pub dim: SamplerDim,
}

/// Everything a [`ProgramBuilder`] needs to link a pass program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramSource {
    pub label: String,
    pub fragment: String,
    pub samplers: Vec<SamplerSlot>,
}

/// Links programs. Builders are cloned onto worker threads for threaded compiles.
pub trait ProgramBuilder: Clone + Send + 'static {
    type Program: Send + 'static;

    /// Compiles and links `source`; on failure returns the raw compiler log.
    fn build(&self, source: &ProgramSource) -> Result<Self::Program, String>;
}

/// A texture bound to a sampler unit for one draw.
pub struct BoundTexture<'a, T> {
    pub slot: SamplerSlot,
    pub sampling: Sampling,
    pub texture: &'a T,
}

/// One full-screen draw of a pass program into a channel's back buffer.
pub struct DrawCall<'a, B: GpuBackend + ?Sized> {
    pub label: &'a str,
    pub program: &'a B::Program,
    pub inputs: Vec<BoundTexture<'a, B::Target>>,
    pub output: &'a B::Target,
    pub uniforms: &'a ShaderUniforms,
    pub custom: &'a CustomBlock,
}

/// Parameters of the passthrough blit to the presentation surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PresentParams {
    /// Per-pixel exponent applied to RGB; `1.0` is a straight copy.
    pub exponent: f32,
}

/// Graphics API operations the engine relies on.
pub trait GpuBackend {
    type Target;
    type Program: Send + 'static;
    type Builder: ProgramBuilder<Program = Self::Program>;

    /// Whether 32-bit float RGBA targets can be rendered into and filtered.
    fn supports_float32_targets(&self) -> bool;

    fn allocate(&mut self, desc: &TextureDesc) -> Result<Self::Target, AllocError>;

    /// Releases a texture immediately.
    fn destroy(&mut self, target: Self::Target);

    /// Replaces the contents of a texture with tightly packed texels.
    fn upload(&mut self, target: &Self::Target, texels: &[u8]);

    /// Handle used to build programs on this or another thread.
    fn builder(&self) -> Self::Builder;

    /// Starts recording a frame.
    fn begin_frame(&mut self);

    fn draw(&mut self, call: DrawCall<'_, Self>);

    /// Blits `source` (or black when absent) to the surface and submits the frame.
    fn present(
        &mut self,
        source: Option<&Self::Target>,
        params: PresentParams,
    ) -> Result<(), FrameError>;

    /// Reconfigures the presentation surface.
    fn resize_surface(&mut self, width: u32, height: u32);
}
