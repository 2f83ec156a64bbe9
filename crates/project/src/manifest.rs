//! Schema of `project.toml` and the channel numbering it implies.
//!
//! Types:
//!
//! - `ProjectManifest` holds the pass list, media inputs, common fragment path
//!   and engine settings.
//! - `PassEntry` names a pass source and whether it is the image pass or a
//!   buffer; `InputEntry` binds a media source to an explicit channel.
//! - `Settings` carries presentation, timing and compile preferences plus the
//!   custom uniform declarations.
//!
//! Functions:
//!
//! - `ProjectManifest::channel_plan` applies the numbering contract: the image
//!   pass writes channel 0, buffers take 1..N in declaration order.
//! - `ProjectManifest::validate` returns every issue at once so a broken
//!   manifest can be fixed in one pass.
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Highest channel index a project may reference.
pub const MAX_CHANNEL: u8 = 15;
/// Custom uniforms a project may declare.
pub const MAX_UNIFORMS: usize = 16;

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ProjectManifest {
    pub name: Option<String>,
    #[serde(default)]
    pub common: Option<PathBuf>,
    #[serde(default)]
    pub passes: Vec<PassEntry>,
    #[serde(default)]
    pub inputs: Vec<InputEntry>,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PassEntry {
    pub name: String,
    #[serde(default)]
    pub kind: PassKind,
    pub source: PathBuf,
    /// Fixed `[width, height]`; buffers follow the window when absent.
    #[serde(default)]
    pub size: Option<[u32; 2]>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PassKind {
    #[default]
    Image,
    Buffer,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct InputEntry {
    pub channel: u8,
    #[serde(flatten)]
    pub source: InputSource,
    #[serde(default)]
    pub filter: FilterMode,
    #[serde(default)]
    pub wrap: WrapMode,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InputSource {
    Image { path: PathBuf },
    /// Raw RGBA8 texels, slice after slice.
    Volume { path: PathBuf, size: [u32; 3] },
    /// Frames pushed by an external decoder.
    Video { size: [u32; 2] },
    /// Spectrum/waveform rows pushed by an external analyser.
    Audio {
        #[serde(default = "default_audio_size")]
        size: [u32; 2],
    },
    Keyboard,
}

fn default_audio_size() -> [u32; 2] {
    [512, 2]
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WrapMode {
    #[default]
    Clamp,
    Repeat,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub color_space: ColorSpace,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f32,
    #[serde(default)]
    pub present_channel: u8,
    #[serde(default)]
    pub compile: CompileMode,
    #[serde(default)]
    pub uniforms: BTreeMap<String, UniformEntry>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            color_space: ColorSpace::default(),
            sample_rate: default_sample_rate(),
            present_channel: 0,
            compile: CompileMode::default(),
            uniforms: BTreeMap::new(),
        }
    }
}

fn default_sample_rate() -> f32 {
    44100.0
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    #[default]
    Gamma,
    Linear,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompileMode {
    #[default]
    Immediate,
    Threaded,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct UniformEntry {
    #[serde(rename = "type")]
    pub kind: UniformKind,
    #[serde(default)]
    pub value: Vec<f32>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
}

impl UniformKind {
    pub fn components(self) -> usize {
        match self {
            UniformKind::Float => 1,
            UniformKind::Vec2 => 2,
            UniformKind::Vec3 => 3,
            UniformKind::Vec4 => 4,
        }
    }
}

/// A pass together with the channel it writes.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPass<'a> {
    pub channel: u8,
    pub entry: &'a PassEntry,
}

impl ProjectManifest {
    /// Output channels in execution-relevant order: buffers first, image last.
    pub fn channel_plan(&self) -> Vec<PlannedPass<'_>> {
        let mut plan: Vec<PlannedPass<'_>> = self
            .passes
            .iter()
            .filter(|pass| pass.kind == PassKind::Buffer)
            .enumerate()
            .map(|(index, entry)| PlannedPass {
                channel: (index + 1) as u8,
                entry,
            })
            .collect();
        if let Some(entry) = self.passes.iter().find(|pass| pass.kind == PassKind::Image) {
            plan.push(PlannedPass { channel: 0, entry });
        }
        plan
    }

    pub fn buffer_count(&self) -> usize {
        self.passes
            .iter()
            .filter(|pass| pass.kind == PassKind::Buffer)
            .count()
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        let images = self
            .passes
            .iter()
            .filter(|pass| pass.kind == PassKind::Image)
            .count();
        if images != 1 {
            issues.push(format!(
                "manifest must declare exactly one image pass (found {images})"
            ));
        }

        let buffers = self.buffer_count();
        if buffers > MAX_CHANNEL as usize {
            issues.push(format!(
                "{buffers} buffer passes declared but only {MAX_CHANNEL} channels are available"
            ));
        }

        let mut names = HashSet::new();
        for pass in &self.passes {
            if pass.name.trim().is_empty() {
                issues.push("pass names must not be empty".to_string());
            } else if !names.insert(pass.name.as_str()) {
                issues.push(format!("pass '{}' is declared more than once", pass.name));
            }
            match (pass.kind, pass.size) {
                (PassKind::Image, Some(_)) => issues.push(format!(
                    "image pass '{}' always matches the window and cannot set a size",
                    pass.name
                )),
                (PassKind::Buffer, Some([width, height])) if width == 0 || height == 0 => {
                    issues.push(format!(
                        "buffer '{}' has an empty size {width}x{height}",
                        pass.name
                    ))
                }
                _ => {}
            }
        }

        let mut input_channels = HashSet::new();
        for input in &self.inputs {
            let channel = input.channel;
            if channel as usize <= buffers || channel > MAX_CHANNEL {
                issues.push(format!(
                    "input on channel {channel} must use a channel between {} and {MAX_CHANNEL}",
                    buffers + 1
                ));
            }
            if !input_channels.insert(channel) {
                issues.push(format!("channel {channel} has more than one input"));
            }
            let empty = match &input.source {
                InputSource::Volume { size, .. } => size.contains(&0),
                InputSource::Video { size } | InputSource::Audio { size } => size.contains(&0),
                InputSource::Image { .. } | InputSource::Keyboard => false,
            };
            if empty {
                issues.push(format!("input on channel {channel} has an empty size"));
            }
        }

        let settings = &self.settings;
        if settings.present_channel > MAX_CHANNEL {
            issues.push(format!(
                "present_channel {} exceeds the highest channel {MAX_CHANNEL}",
                settings.present_channel
            ));
        } else if settings.present_channel as usize > buffers {
            let presentable = self.inputs.iter().any(|input| {
                input.channel == settings.present_channel
                    && !matches!(input.source, InputSource::Volume { .. })
            });
            if !presentable {
                issues.push(format!(
                    "present_channel {} is neither a pass output nor a 2D input",
                    settings.present_channel
                ));
            }
        }
        if !(settings.sample_rate.is_finite() && settings.sample_rate > 0.0) {
            issues.push(format!(
                "sample_rate must be positive (got {})",
                settings.sample_rate
            ));
        }

        if settings.uniforms.len() > MAX_UNIFORMS {
            issues.push(format!(
                "{} custom uniforms declared; at most {MAX_UNIFORMS} are supported",
                settings.uniforms.len()
            ));
        }
        for (name, uniform) in &settings.uniforms {
            if !is_identifier(name) {
                issues.push(format!("uniform name '{name}' is not a GLSL identifier"));
            }
            if uniform.value.len() > uniform.kind.components() {
                issues.push(format!(
                    "uniform '{name}' has {} initial values but its type holds {}",
                    uniform.value.len(),
                    uniform.kind.components()
                ));
            }
        }

        issues
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        && !name.starts_with("gl_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ProjectManifest {
        toml::from_str(raw).expect("parse manifest")
    }

    #[test]
    fn buffers_take_channels_in_declaration_order() {
        let manifest = parse(
            r#"
            [[passes]]
            name = "Image"
            source = "image.glsl"

            [[passes]]
            name = "Buffer A"
            kind = "buffer"
            source = "a.glsl"

            [[passes]]
            name = "Buffer B"
            kind = "buffer"
            source = "b.glsl"
            size = [256, 256]
            "#,
        );
        let plan: Vec<(u8, &str)> = manifest
            .channel_plan()
            .iter()
            .map(|planned| (planned.channel, planned.entry.name.as_str()))
            .collect();
        assert_eq!(plan, vec![(1, "Buffer A"), (2, "Buffer B"), (0, "Image")]);
        assert!(manifest.validate().is_empty());
    }

    #[test]
    fn parses_inputs_and_settings() {
        let manifest = parse(
            r#"
            [[passes]]
            name = "Image"
            source = "image.glsl"

            [[inputs]]
            channel = 1
            type = "image"
            path = "noise.png"
            filter = "nearest"
            wrap = "repeat"

            [[inputs]]
            channel = 2
            type = "keyboard"

            [[inputs]]
            channel = 3
            type = "volume"
            path = "cloud.bin"
            size = [32, 32, 32]

            [settings]
            color_space = "linear"
            compile = "threaded"

            [settings.uniforms]
            uTint = { type = "vec3", value = [1.0, 0.5, 0.25] }
            "#,
        );
        assert_eq!(manifest.inputs.len(), 3);
        assert_eq!(manifest.inputs[0].filter, FilterMode::Nearest);
        assert_eq!(manifest.inputs[0].wrap, WrapMode::Repeat);
        assert_eq!(manifest.inputs[1].source, InputSource::Keyboard);
        assert_eq!(manifest.settings.color_space, ColorSpace::Linear);
        assert_eq!(manifest.settings.compile, CompileMode::Threaded);
        assert_eq!(manifest.settings.sample_rate, 44100.0);
        assert_eq!(manifest.settings.uniforms["uTint"].kind, UniformKind::Vec3);
        assert!(manifest.validate().is_empty());
    }

    #[test]
    fn validation_reports_every_issue() {
        let manifest = parse(
            r#"
            [[passes]]
            name = "A"
            kind = "buffer"
            source = "a.glsl"

            [[passes]]
            name = "A"
            kind = "buffer"
            source = "b.glsl"
            size = [0, 64]

            [[inputs]]
            channel = 2
            type = "keyboard"

            [[inputs]]
            channel = 16
            type = "keyboard"

            [settings]
            present_channel = 9

            [settings.uniforms]
            "2bad" = { type = "float", value = [1.0, 2.0] }
            "#,
        );
        let issues = manifest.validate();
        let expected = [
            "exactly one image pass",
            "declared more than once",
            "empty size 0x64",
            "input on channel 2",
            "input on channel 16",
            "present_channel 9",
            "not a GLSL identifier",
            "2 initial values",
        ];
        for fragment in expected {
            assert!(
                issues.iter().any(|issue| issue.contains(fragment)),
                "missing issue containing {fragment:?} in {issues:?}"
            );
        }
    }
}
