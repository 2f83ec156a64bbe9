use std::path::PathBuf;

use clap::Parser;
use renderer::{ColorSpaceMode, ShaderCompiler};

#[derive(Parser, Debug)]
#[command(
    name = "toypass",
    author,
    version,
    about = "Live preview of multi-pass fragment shader projects"
)]
pub struct Cli {
    /// Project directory containing `project.toml`.
    #[arg(value_name = "PROJECT", default_value = ".")]
    pub project: PathBuf,

    /// Initial window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, default_value = "1280x720")]
    pub size: (u32, u32),

    /// Output color space handling: `gamma` or `linear`. Overrides the manifest.
    #[arg(long, value_name = "MODE", value_parser = parse_color_space)]
    pub color_space: Option<ColorSpaceMode>,

    /// Shader compiler backend: `shaderc` (default) or `naga`.
    #[arg(
        long,
        value_name = "COMPILER",
        value_parser = parse_shader_compiler,
        default_value_t = ShaderCompiler::default()
    )]
    pub shader_compiler: ShaderCompiler,

    /// Build programs on worker threads and swap them in when ready.
    #[arg(long)]
    pub threaded_compile: bool,

    /// Channel blitted to the window. Overrides the manifest.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(0..=15))]
    pub present_channel: Option<u8>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{w}'"))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{h}'"))?;
    if width == 0 || height == 0 {
        return Err("window size must be greater than zero".into());
    }
    Ok((width, height))
}

pub fn parse_shader_compiler(value: &str) -> Result<ShaderCompiler, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("shader compiler must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    match normalized.as_str() {
        "shaderc" => {
            if cfg!(feature = "shaderc") {
                Ok(ShaderCompiler::Shaderc)
            } else {
                Err("shaderc support is not enabled in this build".to_string())
            }
        }
        "naga" | "naga-glsl" => Ok(ShaderCompiler::NagaGlsl),
        _ => Err("unknown shader compiler (expected shaderc or naga)".to_string()),
    }
}

pub fn parse_color_space(value: &str) -> Result<ColorSpaceMode, String> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "gamma" | "shadertoy" => Ok(ColorSpaceMode::Gamma),
        "linear" | "srgb" => Ok(ColorSpaceMode::Linear),
        "" => Err("color space must not be empty".to_string()),
        other => Err(format!(
            "unknown color space '{other}'; expected gamma or linear"
        )),
    }
}
