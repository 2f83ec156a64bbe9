use std::fmt::Write as _;
use std::thread;

use crossbeam_channel::{bounded, Receiver, TryRecvError};

use crate::backend::{ProgramBuilder, ProgramSource, SamplerSlot};
use crate::diagnostics::{self, Diagnostic};
use crate::scan::{ChannelScanner, TokenScanner};
use crate::types::{CustomUniformDecl, SamplerDim, MAX_CHANNELS, MAX_CUSTOM_UNIFORMS};

/// Identifiers user code may not redeclare; the prologue already provides them.
const STANDARD_UNIFORMS: &[&str] = &[
    "iResolution",
    "iTime",
    "iTimeDelta",
    "iFrame",
    "iMouse",
    "iDate",
    "iSampleRate",
    "iChannelTime",
    "iChannelResolution",
];

/// A pass program ready to hand to a [`ProgramBuilder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedProgram {
    /// Required-channel set: distinct channel indices the pass reads, ascending.
    pub required: Vec<u8>,
    pub source: ProgramSource,
    /// Lines synthesized ahead of the first line of user code.
    pub injected_lines: usize,
    /// Line count of the user code itself.
    pub user_lines: usize,
}

impl PreparedProgram {
    /// Maps a raw compiler log onto user source lines.
    pub fn diagnostics(&self, raw_log: &str) -> Vec<Diagnostic> {
        diagnostics::translate(raw_log, self.injected_lines, self.user_lines)
    }

    /// Builds the program on the caller's thread.
    pub fn link<P: ProgramBuilder>(&self, builder: &P) -> Result<P::Program, Vec<Diagnostic>> {
        builder
            .build(&self.source)
            .map_err(|log| self.diagnostics(&log))
    }
}

/// Synthesizes complete programs from pass sources.
pub struct PassCompiler {
    scanner: Box<dyn ChannelScanner>,
    custom: Vec<CustomUniformDecl>,
}

impl PassCompiler {
    pub fn new(custom: &[CustomUniformDecl]) -> Self {
        Self {
            scanner: Box::new(TokenScanner),
            custom: custom.iter().take(MAX_CUSTOM_UNIFORMS).cloned().collect(),
        }
    }

    /// Replaces the dependency scanner.
    pub fn with_scanner(mut self, scanner: Box<dyn ChannelScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn required_channels(&self, source: &str) -> Vec<u8> {
        self.scanner.required_channels(source)
    }

    /// Assembles prologue, sampler declarations, common fragment, user code and epilogue.
    ///
    /// `sampler_dim` reports the dimensionality to declare for each required
    /// channel. Sampler units are assigned sequentially from zero in
    /// ascending channel order.
    pub fn prepare(
        &self,
        label: &str,
        source: &str,
        common: &str,
        sampler_dim: impl Fn(u8) -> SamplerDim,
    ) -> PreparedProgram {
        let required = self.required_channels(source);
        let samplers: Vec<SamplerSlot> = required
            .iter()
            .enumerate()
            .map(|(unit, &channel)| SamplerSlot {
                unit: unit as u32,
                channel,
                dim: sampler_dim(channel),
            })
            .collect();

        let mut fragment = String::with_capacity(PROLOGUE.len() + common.len() + source.len() + 1024);
        fragment.push_str(PROLOGUE);
        self.write_custom_block(&mut fragment);
        for slot in &samplers {
            write_sampler(&mut fragment, slot);
        }
        if !common.trim().is_empty() {
            sanitize_into(&mut fragment, common, &self.custom);
            ensure_newline(&mut fragment);
        }
        let injected_lines = fragment.lines().count();

        sanitize_into(&mut fragment, source, &self.custom);
        ensure_newline(&mut fragment);
        fragment.push_str(EPILOGUE);

        PreparedProgram {
            required,
            source: ProgramSource {
                label: label.to_string(),
                fragment,
                samplers,
            },
            injected_lines,
            user_lines: source.lines().count().max(1),
        }
    }

    fn write_custom_block(&self, out: &mut String) {
        if self.custom.is_empty() {
            return;
        }
        let _ = writeln!(
            out,
            "layout(std140, set = 0, binding = 1) uniform CustomParams {{ vec4 _custom[{MAX_CUSTOM_UNIFORMS}]; }} custom_params;"
        );
        for (slot, decl) in self.custom.iter().enumerate() {
            let _ = writeln!(
                out,
                "#define {} custom_params._custom[{slot}]{}",
                decl.name,
                decl.kind.swizzle()
            );
        }
    }
}

impl Default for PassCompiler {
    fn default() -> Self {
        Self::new(&[])
    }
}

fn write_sampler(out: &mut String, slot: &SamplerSlot) {
    let channel = slot.channel;
    let (texture_type, sampler_type) = match slot.dim {
        SamplerDim::D2 => ("texture2D", "sampler2D"),
        SamplerDim::D3 => ("texture3D", "sampler3D"),
    };
    let _ = writeln!(
        out,
        "layout(set = 1, binding = {}) uniform {texture_type} _channel{channel}_texture;",
        slot.unit * 2
    );
    let _ = writeln!(
        out,
        "layout(set = 1, binding = {}) uniform sampler _channel{channel}_sampler;",
        slot.unit * 2 + 1
    );
    let _ = writeln!(
        out,
        "#define iChannel{channel} {sampler_type}(_channel{channel}_texture, _channel{channel}_sampler)"
    );
}

/// Copies `source` into `out`, commenting out lines the prologue supersedes.
///
/// Lines are never removed so compiler line numbers stay aligned with the
/// user's text.
fn sanitize_into(out: &mut String, source: &str, custom: &[CustomUniformDecl]) {
    for line in source.lines() {
        if supersedes(line, custom) {
            out.push_str("// ");
        }
        out.push_str(line);
        out.push('\n');
    }
}

fn supersedes(line: &str, custom: &[CustomUniformDecl]) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with("#version") {
        return true;
    }
    if !trimmed.starts_with("uniform ") {
        return false;
    }
    trimmed
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|word| is_reserved(word) || custom.iter().any(|decl| decl.name == word))
}

fn is_reserved(word: &str) -> bool {
    if STANDARD_UNIFORMS.contains(&word) {
        return true;
    }
    word.strip_prefix("iChannel")
        .and_then(|digits| digits.parse::<usize>().ok())
        .is_some_and(|index| index < MAX_CHANNELS)
}

fn ensure_newline(out: &mut String) {
    if !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Result of polling a [`BuildTicket`].
pub enum BuildPoll<P> {
    Pending,
    Done(Result<P, String>),
    /// The worker exited without reporting.
    Lost,
}

/// A program build running on a worker thread.
pub struct BuildTicket<P> {
    receiver: Receiver<Result<P, String>>,
}

impl<P: Send + 'static> BuildTicket<P> {
    /// Starts building `source` on a new thread.
    pub fn spawn<B>(builder: B, source: ProgramSource) -> Self
    where
        B: ProgramBuilder<Program = P>,
    {
        let (sender, receiver) = bounded(1);
        thread::spawn(move || {
            let result = builder.build(&source);
            let _ = sender.send(result);
        });
        Self { receiver }
    }

    pub fn poll(&self) -> BuildPoll<P> {
        match self.receiver.try_recv() {
            Ok(result) => BuildPoll::Done(result),
            Err(TryRecvError::Empty) => BuildPoll::Pending,
            Err(TryRecvError::Disconnected) => BuildPoll::Lost,
        }
    }

    /// Blocks until the worker reports.
    pub fn wait(self) -> BuildPoll<P> {
        match self.receiver.recv() {
            Ok(result) => BuildPoll::Done(result),
            Err(_) => BuildPoll::Lost,
        }
    }
}

/// GLSL prologue injected ahead of every pass.
///
/// The `ShaderParams` layout must match [`ShaderUniforms`](crate::uniforms::ShaderUniforms).
const PROLOGUE: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform ShaderParams {
    vec3 _iResolution;
    float _iTime;
    float _iTimeDelta;
    int _iFrame;
    float _iSampleRate;
    float _padding0;
    vec4 _iMouse;
    vec4 _iDate;
    vec3 _iChannelResolution[16];
    float _iChannelTime[16];
} ubo;

#define iResolution ubo._iResolution
#define iTime ubo._iTime
#define iTimeDelta ubo._iTimeDelta
#define iFrame ubo._iFrame
#define iSampleRate ubo._iSampleRate
#define iMouse ubo._iMouse
#define iDate ubo._iDate
#define iChannelResolution ubo._iChannelResolution
#define iChannelTime ubo._iChannelTime
";

/// Calls `mainImage` with the fragment's pixel coordinate.
const EPILOGUE: &str = r"
void main() {
    vec4 color = vec4(0.0, 0.0, 0.0, 1.0);
    mainImage(color, gl_FragCoord.xy);
    outColor = color;
}
";

/// Full-screen triangle shared by every pass and the present blit.
pub const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

/// Passthrough blit of a channel's front texture with an optional gamma encode.
pub const PRESENT_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(set = 0, binding = 0) uniform texture2D present_texture;
layout(set = 0, binding = 1) uniform sampler present_sampler;
layout(std140, set = 0, binding = 2) uniform PresentParams {
    vec4 exponent;
} present;

void main() {
    vec4 color = texture(sampler2D(present_texture, present_sampler), v_uv);
    vec3 encoded = pow(max(color.rgb, vec3(0.0)), vec3(present.exponent.x));
    outColor = vec4(encoded, 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CustomUniformKind;

    const SOURCE: &str = "void mainImage(out vec4 c, in vec2 p) {\n    c = texture(iChannel2, p) + texture(iChannel0, p);\n}\n";

    fn flat(_: u8) -> SamplerDim {
        SamplerDim::D2
    }

    fn user_line_at(prepared: &PreparedProgram, user_line: usize) -> &str {
        prepared
            .source
            .fragment
            .lines()
            .nth(prepared.injected_lines + user_line - 1)
            .unwrap_or_default()
    }

    #[test]
    fn samplers_follow_required_channels() {
        let prepared = PassCompiler::default().prepare("image", SOURCE, "", flat);
        assert_eq!(prepared.required, vec![0, 2]);
        assert_eq!(
            prepared.source.samplers,
            vec![
                SamplerSlot { unit: 0, channel: 0, dim: SamplerDim::D2 },
                SamplerSlot { unit: 1, channel: 2, dim: SamplerDim::D2 },
            ]
        );
        let fragment = &prepared.source.fragment;
        assert!(fragment.contains("binding = 0) uniform texture2D _channel0_texture"));
        assert!(fragment.contains("binding = 3) uniform sampler _channel2_sampler"));
        assert!(fragment.contains("#define iChannel2 sampler2D("));
        assert!(!fragment.contains("_channel1_texture"));
    }

    #[test]
    fn injected_lines_point_at_first_user_line() {
        let common = "float helper() { return 1.0; }\nfloat other() { return 2.0; }";
        let prepared = PassCompiler::default().prepare("image", SOURCE, common, flat);
        assert_eq!(user_line_at(&prepared, 1), "void mainImage(out vec4 c, in vec2 p) {");
        assert_eq!(user_line_at(&prepared, 3), "}");
        assert_eq!(prepared.user_lines, 3);

        let without_common = PassCompiler::default().prepare("image", SOURCE, "", flat);
        assert_eq!(prepared.injected_lines, without_common.injected_lines + 2);
    }

    #[test]
    fn redeclarations_are_commented_in_place() {
        let source = "#version 300 es\nuniform float iTime;\nuniform sampler2D iChannel1;\nuniform float iTimeScale;\nvoid mainImage(out vec4 c, in vec2 p) { c = vec4(iTime); }";
        let prepared = PassCompiler::default().prepare("image", source, "", flat);
        assert_eq!(user_line_at(&prepared, 1), "// #version 300 es");
        assert_eq!(user_line_at(&prepared, 2), "// uniform float iTime;");
        assert_eq!(user_line_at(&prepared, 3), "// uniform sampler2D iChannel1;");
        assert_eq!(user_line_at(&prepared, 4), "uniform float iTimeScale;");
        assert!(user_line_at(&prepared, 5).starts_with("void mainImage"));
    }

    #[test]
    fn volumetric_channels_declare_3d_samplers() {
        let prepared = PassCompiler::default().prepare(
            "image",
            "void mainImage(out vec4 c, in vec2 p) { c = texture(iChannel3, vec3(p, 0.0)); }",
            "",
            |channel| if channel == 3 { SamplerDim::D3 } else { SamplerDim::D2 },
        );
        let fragment = &prepared.source.fragment;
        assert!(fragment.contains("uniform texture3D _channel3_texture"));
        assert!(fragment.contains("#define iChannel3 sampler3D("));
    }

    #[test]
    fn custom_uniforms_become_macros() {
        let compiler = PassCompiler::new(&[
            CustomUniformDecl::new("uGain", CustomUniformKind::Float),
            CustomUniformDecl::new("uTint", CustomUniformKind::Vec3),
        ]);
        let prepared = compiler.prepare(
            "image",
            "uniform vec3 uTint;\nvoid mainImage(out vec4 c, in vec2 p) { c = vec4(uTint * uGain, 1.0); }",
            "",
            flat,
        );
        let fragment = &prepared.source.fragment;
        assert!(fragment.contains("#define uGain custom_params._custom[0].x"));
        assert!(fragment.contains("#define uTint custom_params._custom[1].xyz"));
        assert_eq!(user_line_at(&prepared, 1), "// uniform vec3 uTint;");
    }

    #[test]
    fn link_failure_is_remapped_to_user_lines() {
        #[derive(Clone)]
        struct Failing(usize);

        impl ProgramBuilder for Failing {
            type Program = ();

            fn build(&self, _: &ProgramSource) -> Result<(), String> {
                Err(format!("pass.frag:{}: error: 'x' : undeclared identifier", self.0))
            }
        }

        let prepared = PassCompiler::default().prepare("image", SOURCE, "", flat);
        let diagnostics = prepared
            .link(&Failing(prepared.injected_lines + 2))
            .expect_err("build fails");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].line, 2);
    }

    #[test]
    fn threaded_build_reports_through_ticket() {
        #[derive(Clone)]
        struct Echo;

        impl ProgramBuilder for Echo {
            type Program = String;

            fn build(&self, source: &ProgramSource) -> Result<String, String> {
                Ok(source.label.clone())
            }
        }

        let prepared = PassCompiler::default().prepare("buffer-a", SOURCE, "", flat);
        let ticket = BuildTicket::spawn(Echo, prepared.source);
        match ticket.wait() {
            BuildPoll::Done(Ok(label)) => assert_eq!(label, "buffer-a"),
            _ => panic!("expected a finished build"),
        }
    }
}
