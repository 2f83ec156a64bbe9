//! A [`GpuBackend`] that records what the engine asks of it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::{
    AllocError, DrawCall, FrameError, GpuBackend, PresentParams, ProgramBuilder, ProgramSource,
    TextureDesc,
};
use crate::types::{Resolution, TexelFormat};
use crate::uniforms::{CustomBlock, ShaderUniforms};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeTexture {
    pub id: u64,
    pub resolution: Resolution,
    pub format: TexelFormat,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeProgram {
    pub id: u64,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    Allocate { id: u64, label: String },
    Destroy { id: u64 },
    Upload { id: u64, bytes: usize },
    BeginFrame,
    Draw {
        label: String,
        program: u64,
        /// `(channel, texture id)` per bound sampler, in unit order.
        inputs: Vec<(u8, u64)>,
        output: u64,
        uniforms: ShaderUniforms,
        custom: CustomBlock,
    },
    Present { source: Option<u64>, exponent: f32 },
    ResizeSurface { width: u32, height: u32 },
}

/// Fails any fragment containing `BROKEN` or lacking a `mainImage` definition,
/// reporting the offending line.
#[derive(Clone, Default)]
pub struct RecordingBuilder {
    next: Arc<AtomicU64>,
}

impl ProgramBuilder for RecordingBuilder {
    type Program = FakeProgram;

    fn build(&self, source: &ProgramSource) -> Result<FakeProgram, String> {
        if let Some(index) = source
            .fragment
            .lines()
            .position(|line| line.contains("BROKEN"))
        {
            return Err(format!(
                "{}.frag:{}: error: 'BROKEN' : undeclared identifier\n1 error generated.",
                source.label,
                index + 1
            ));
        }
        if !source.fragment.contains("void mainImage") {
            let call = source
                .fragment
                .lines()
                .position(|line| line.contains("mainImage("))
                .unwrap_or(0);
            return Err(format!(
                "{}.frag:{}: error: 'mainImage' : no matching overloaded function found",
                source.label,
                call + 1
            ));
        }
        Ok(FakeProgram {
            id: self.next.fetch_add(1, Ordering::Relaxed) + 1,
            label: source.label.clone(),
        })
    }
}

type DrawHook = Box<dyn FnMut(&str)>;

pub struct RecordingBackend {
    pub records: Vec<Record>,
    next_texture: u64,
    failing: HashSet<String>,
    float32: bool,
    builder: RecordingBuilder,
    on_draw: Option<DrawHook>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            next_texture: 0,
            failing: HashSet::new(),
            float32: true,
            builder: RecordingBuilder::default(),
            on_draw: None,
        }
    }

    pub fn without_float32(mut self) -> Self {
        self.float32 = false;
        self
    }

    /// Makes every allocation with this label fail as out-of-memory.
    pub fn fail_allocation(&mut self, label: &str) {
        self.failing.insert(label.to_string());
    }

    pub fn clear_failures(&mut self) {
        self.failing.clear();
    }

    /// Runs `hook` with the pass label after each recorded draw.
    pub fn on_draw(&mut self, hook: impl FnMut(&str) + 'static) {
        self.on_draw = Some(Box::new(hook));
    }

    pub fn count(&self, predicate: impl Fn(&Record) -> bool) -> usize {
        self.records.iter().filter(|record| predicate(record)).count()
    }

    pub fn destroyed(&self, id: u64) -> bool {
        self.records
            .iter()
            .any(|record| matches!(record, Record::Destroy { id: destroyed } if *destroyed == id))
    }

    /// Id of the most recent allocation carrying `label`.
    pub fn allocated_id(&self, label: &str) -> Option<u64> {
        self.records.iter().rev().find_map(|record| match record {
            Record::Allocate { id, label: allocated } if allocated == label => Some(*id),
            _ => None,
        })
    }

    /// Draws recorded so far, as `(label, inputs, output)`.
    pub fn draws(&self) -> Vec<(&str, &[(u8, u64)], u64)> {
        self.records
            .iter()
            .filter_map(|record| match record {
                Record::Draw {
                    label,
                    inputs,
                    output,
                    ..
                } => Some((label.as_str(), inputs.as_slice(), *output)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for RecordingBackend {
    type Target = FakeTexture;
    type Program = FakeProgram;
    type Builder = RecordingBuilder;

    fn supports_float32_targets(&self) -> bool {
        self.float32
    }

    fn allocate(&mut self, desc: &TextureDesc) -> Result<FakeTexture, AllocError> {
        self.next_texture += 1;
        let id = self.next_texture;
        self.records.push(Record::Allocate {
            id,
            label: desc.label.clone(),
        });
        if self.failing.contains(&desc.label) {
            return Err(AllocError::OutOfMemory {
                label: desc.label.clone(),
            });
        }
        Ok(FakeTexture {
            id,
            resolution: desc.resolution,
            format: desc.format,
        })
    }

    fn destroy(&mut self, target: FakeTexture) {
        self.records.push(Record::Destroy { id: target.id });
    }

    fn upload(&mut self, target: &FakeTexture, texels: &[u8]) {
        self.records.push(Record::Upload {
            id: target.id,
            bytes: texels.len(),
        });
    }

    fn builder(&self) -> RecordingBuilder {
        self.builder.clone()
    }

    fn begin_frame(&mut self) {
        self.records.push(Record::BeginFrame);
    }

    fn draw(&mut self, call: DrawCall<'_, Self>) {
        self.records.push(Record::Draw {
            label: call.label.to_string(),
            program: call.program.id,
            inputs: call
                .inputs
                .iter()
                .map(|bound| (bound.slot.channel, bound.texture.id))
                .collect(),
            output: call.output.id,
            uniforms: *call.uniforms,
            custom: *call.custom,
        });
        if let Some(hook) = self.on_draw.as_mut() {
            hook(call.label);
        }
    }

    fn present(
        &mut self,
        source: Option<&FakeTexture>,
        params: PresentParams,
    ) -> Result<(), FrameError> {
        self.records.push(Record::Present {
            source: source.map(|texture| texture.id),
            exponent: params.exponent,
        });
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.records.push(Record::ResizeSurface { width, height });
    }
}
