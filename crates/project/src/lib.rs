//! On-disk description of a multi-pass shader project.
//!
//! A project directory holds `project.toml` and the GLSL and media files it
//! references. This crate parses and validates the manifest and assigns output
//! channels; turning it into a running engine is left to the caller.

mod manifest;
mod project;

pub use manifest::{
    ColorSpace, CompileMode, FilterMode, InputEntry, InputSource, PassEntry, PassKind,
    PlannedPass, ProjectManifest, Settings, UniformEntry, UniformKind, WrapMode, MAX_CHANNEL,
    MAX_UNIFORMS,
};
pub use project::{PassSource, Project, ProjectError, MANIFEST_FILE};
