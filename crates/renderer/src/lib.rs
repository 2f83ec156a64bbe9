//! Multi-pass fragment shader engine.
//!
//! A project is a set of passes, each a `mainImage` fragment program writing
//! into one numbered channel. Buffer channels are ping-ponged so a pass can
//! read its own previous frame; the primary pass (channel 0) renders last and
//! one channel is blitted to the window every tick.
//!
//! ```text
//!   source ──▶ PassCompiler ──▶ ProgramBuilder ──▶ LinkedProgram
//!                  │ injected lines        │ raw log
//!                  ▼                       ▼
//!             diagnostics::translate ◀─────┘
//!
//!   Engine::tick ──▶ buffer passes ──▶ primary pass ──▶ present
//!        │               │ read front / write back, then flip
//!        ▼               ▼
//!   EngineHandle     ChannelPool ──▶ GpuBackend (wgpu or recording fake)
//! ```
//!
//! [`Engine`] is generic over [`GpuBackend`] so everything above the graphics
//! API is exercised without a device; [`WgpuBackend`] is the real
//! implementation and [`run_preview`] hosts it in a `winit` window.

pub mod backend;
pub mod channels;
pub mod compile;
pub mod diagnostics;
pub mod gpu;
pub mod media;
pub mod pass;
pub mod runtime;
pub mod scan;
pub mod scheduler;
pub mod types;
pub mod uniforms;
mod window;

#[cfg(test)]
mod testing;

pub use backend::{AllocError, FrameError, GpuBackend, ProgramBuilder};
pub use channels::{ChannelError, ChannelHandle, ChannelPool};
pub use compile::PassCompiler;
pub use diagnostics::{Diagnostic, Severity};
pub use gpu::WgpuBackend;
pub use media::MediaError;
pub use pass::{CompileError, CompileOutcome, PassId, PassInfo};
pub use scan::{ChannelScanner, TokenScanner};
pub use scheduler::{Engine, EngineCommand, EngineEvent, EngineHandle, FrameReport, FrameState};
pub use types::{
    BufferPrecision, ChannelKind, ColorSpaceMode, CompileStrategy, CustomUniformDecl,
    CustomUniformKind, EngineConfig, Filter, Resolution, Sampling, ShaderCompiler, Sizing, Wrap,
    MAX_CHANNELS, PRIMARY_CHANNEL,
};
pub use window::{run_preview, PreviewOptions};
