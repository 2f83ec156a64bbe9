use anyhow::{Context, Result};
use project::{
    ColorSpace, CompileMode, FilterMode, InputEntry, InputSource, Project, UniformKind, WrapMode,
};
use renderer::{
    run_preview, ChannelKind, ColorSpaceMode, CompileError, CompileStrategy, CustomUniformDecl,
    CustomUniformKind, Engine, EngineConfig, Filter, GpuBackend, PreviewOptions, Resolution,
    Sampling, Sizing, Wrap,
};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let project = Project::load(&cli.project)
        .with_context(|| format!("failed to load project at {}", cli.project.display()))?;
    let options = preview_options(&cli, &project);
    tracing::info!(
        project = project.name(),
        compiler = %options.compiler,
        color_space = %options.config.color_space,
        present_channel = options.config.present_channel,
        "starting preview"
    );
    run_preview(options, |engine| load_project(engine, &project))
}

fn preview_options(cli: &Cli, project: &Project) -> PreviewOptions {
    let settings = &project.manifest().settings;
    let color_space = cli.color_space.unwrap_or(match settings.color_space {
        ColorSpace::Gamma => ColorSpaceMode::Gamma,
        ColorSpace::Linear => ColorSpaceMode::Linear,
    });
    let compile_strategy = if cli.threaded_compile || settings.compile == CompileMode::Threaded {
        CompileStrategy::Threaded
    } else {
        CompileStrategy::Immediate
    };
    let custom_uniforms = settings
        .uniforms
        .iter()
        .map(|(name, entry)| {
            let kind = match entry.kind {
                UniformKind::Float => CustomUniformKind::Float,
                UniformKind::Vec2 => CustomUniformKind::Vec2,
                UniformKind::Vec3 => CustomUniformKind::Vec3,
                UniformKind::Vec4 => CustomUniformKind::Vec4,
            };
            CustomUniformDecl::new(name.clone(), kind).with_initial(&entry.value)
        })
        .collect();
    let keyboard_channel = project
        .manifest()
        .inputs
        .iter()
        .find(|input| input.source == InputSource::Keyboard)
        .map(|input| input.channel);

    PreviewOptions {
        title: format!("toypass - {}", project.name()),
        size: Resolution::new(cli.size.0, cli.size.1),
        compiler: cli.shader_compiler,
        config: EngineConfig {
            sample_rate: settings.sample_rate,
            color_space,
            compile_strategy,
            custom_uniforms,
            present_channel: cli.present_channel.unwrap_or(settings.present_channel),
            ..EngineConfig::default()
        },
        keyboard_channel,
    }
}

/// Creates media channels, then compiles every pass. Compile failures are
/// logged and leave that pass idle; missing media aborts start-up.
fn load_project<B: GpuBackend>(engine: &mut Engine<B>, project: &Project) -> Result<()> {
    for input in &project.manifest().inputs {
        load_input(engine, project, input)?;
    }

    let common = project.common_source()?;
    engine.set_common(&common);

    for pass in project.pass_sources()? {
        let sizing = match pass.size {
            Some([width, height]) => Sizing::Fixed(Resolution::new(width, height)),
            None => Sizing::Surface,
        };
        match engine.compile_sized(pass.name.as_str(), &pass.code, pass.channel, sizing) {
            Ok(outcome) => {
                tracing::debug!(pass = %pass.name, channel = pass.channel, ?outcome, "pass submitted")
            }
            Err(CompileError::Diagnostics(diagnostics)) => {
                for diagnostic in &diagnostics {
                    tracing::warn!(pass = %pass.name, "{diagnostic}");
                }
            }
            Err(error) => tracing::warn!(pass = %pass.name, error = %error, "pass rejected"),
        }
    }
    Ok(())
}

fn load_input<B: GpuBackend>(
    engine: &mut Engine<B>,
    project: &Project,
    input: &InputEntry,
) -> Result<()> {
    let channel = input.channel;
    let sampling = Sampling {
        filter: match input.filter {
            FilterMode::Nearest => Filter::Nearest,
            FilterMode::Linear => Filter::Linear,
        },
        wrap: match input.wrap {
            WrapMode::Clamp => Wrap::Clamp,
            WrapMode::Repeat => Wrap::Repeat,
        },
    };
    match &input.source {
        InputSource::Image { path } => {
            let path = project.asset_path(path);
            engine
                .load_image(channel, &path, sampling)
                .with_context(|| format!("failed to load image input {}", path.display()))?;
        }
        InputSource::Volume { path, size } => {
            let path = project.asset_path(path);
            let resolution = Resolution::volume(size[0], size[1], size[2]);
            engine
                .load_volume(channel, &path, resolution, sampling)
                .with_context(|| format!("failed to load volume input {}", path.display()))?;
        }
        InputSource::Video { size } | InputSource::Audio { size } => {
            let kind = if matches!(input.source, InputSource::Video { .. }) {
                ChannelKind::Video
            } else {
                ChannelKind::Audio
            };
            engine
                .create_media_channel(channel, kind, Resolution::new(size[0], size[1]), sampling)
                .with_context(|| format!("failed to create {kind} input on channel {channel}"))?;
            tracing::info!(channel, %kind, "input waits for an external producer");
        }
        // Bound by the preview window, which owns the key state.
        InputSource::Keyboard => {}
    }
    Ok(())
}
