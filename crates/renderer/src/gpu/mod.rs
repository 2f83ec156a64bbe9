//! The wgpu implementation of [`GpuBackend`](crate::backend::GpuBackend).
//!
//! - `context` owns instance, device and surface wiring and rebuilds the
//!   swapchain when the window resizes.
//! - `pipeline` turns synthesized GLSL into render pipelines via shaderc or
//!   naga, reporting compiler logs verbatim for diagnostics.
//! - `present` blits the presented channel to the surface.
//! - `backend` glues them into [`WgpuBackend`].

mod backend;
mod context;
mod pipeline;
mod present;

pub use backend::{WgpuBackend, WgpuTarget};
pub use pipeline::{WgpuProgram, WgpuProgramBuilder};
