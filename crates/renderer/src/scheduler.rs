//! The execution scheduler: owns the channel pool and every pass, and drives
//! one frame tick at a time.
//!
//! A tick renders every buffer pass (ascending output channel, ties broken by
//! declaration order), then the primary pass, then blits the presented channel.
//! Program swaps, channel (re)allocation and removals happen only between
//! ticks: requests from other threads go through an [`EngineHandle`] and are
//! drained at the tick boundary.

use std::path::Path;
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};

use crate::backend::{AllocError, BoundTexture, DrawCall, FrameError, GpuBackend, PresentParams};
use crate::channels::{ChannelError, ChannelHandle, ChannelPool};
use crate::compile::{BuildPoll, BuildTicket, PassCompiler, PreparedProgram};
use crate::diagnostics::Diagnostic;
use crate::media::{self, MediaError, Texels};
use crate::pass::{
    CompileError, CompileOutcome, LinkedProgram, Pass, PassId, PassInfo, PendingBuild,
};
use crate::runtime::{BoxedTimeSource, RenderStats, SystemTimeSource};
use crate::scan::ChannelScanner;
use crate::types::{
    ChannelKind, CompileStrategy, EngineConfig, Resolution, SamplerDim, Sampling, Sizing,
    MAX_CHANNELS, PRIMARY_CHANNEL,
};
use crate::uniforms::{CustomUniforms, FrameClock, ShaderUniforms};

const EVENT_CAPACITY: usize = 256;

/// Per-frame state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    RenderingBuffers,
    RenderingMain,
    Presenting,
}

/// Requests queued through an [`EngineHandle`].
#[derive(Clone, Debug, PartialEq)]
pub enum EngineCommand {
    Compile {
        id: PassId,
        source: String,
        output: u8,
        sizing: Option<Sizing>,
    },
    Remove(PassId),
    SetCommon(String),
    Restart,
    Resize { width: u32, height: u32 },
    SetUniform { name: String, values: Vec<f32> },
}

/// Outcomes the engine reports asynchronously.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    Linked { id: PassId, required: Vec<u8> },
    CompileFailed { id: PassId, error: CompileError },
    Removed { id: PassId },
    ChannelFailed { channel: u8, error: ChannelError },
}

/// Cloneable sender for engine commands. Commands apply at the next tick boundary.
#[derive(Clone, Debug)]
pub struct EngineHandle {
    sender: Sender<EngineCommand>,
}

impl EngineHandle {
    /// Queues a command; returns `false` once the engine is gone.
    pub fn send(&self, command: EngineCommand) -> bool {
        self.sender.send(command).is_ok()
    }

    pub fn compile(&self, id: impl Into<PassId>, source: impl Into<String>, output: u8) -> bool {
        self.send(EngineCommand::Compile {
            id: id.into(),
            source: source.into(),
            output,
            sizing: None,
        })
    }

    pub fn remove(&self, id: impl Into<PassId>) -> bool {
        self.send(EngineCommand::Remove(id.into()))
    }

    pub fn set_common(&self, source: impl Into<String>) -> bool {
        self.send(EngineCommand::SetCommon(source.into()))
    }

    pub fn restart(&self) -> bool {
        self.send(EngineCommand::Restart)
    }

    pub fn resize(&self, width: u32, height: u32) -> bool {
        self.send(EngineCommand::Resize { width, height })
    }

    pub fn set_uniform(&self, name: impl Into<String>, values: &[f32]) -> bool {
        self.send(EngineCommand::SetUniform {
            name: name.into(),
            values: values.to_vec(),
        })
    }
}

/// What one tick did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub time: f32,
    /// Passes drawn this tick, in execution order.
    pub rendered: Vec<PassId>,
    /// Passes with no linked program or no usable output channel.
    pub skipped: Vec<PassId>,
    /// Channel blitted to the surface, if it had a texture.
    pub presented: Option<u8>,
}

pub struct Engine<B: GpuBackend> {
    backend: B,
    builder: B::Builder,
    pool: ChannelPool<B>,
    compiler: PassCompiler,
    passes: Vec<Pass<B::Program>>,
    next_seq: u64,
    common: String,
    config: EngineConfig,
    uniforms: ShaderUniforms,
    custom: CustomUniforms,
    clock: FrameClock,
    mouse: [f32; 4],
    state: FrameState,
    command_tx: Sender<EngineCommand>,
    command_rx: Receiver<EngineCommand>,
    event_tx: Sender<EngineEvent>,
    event_rx: Receiver<EngineEvent>,
    stats: RenderStats,
}

impl<B: GpuBackend> Engine<B> {
    /// Builds an engine rendering to a surface of `surface` texels.
    ///
    /// Fails only if the placeholder textures cannot be allocated.
    pub fn new(
        mut backend: B,
        config: EngineConfig,
        surface: Resolution,
    ) -> Result<Self, AllocError> {
        let format = config.precision.resolve(backend.supports_float32_targets());
        tracing::info!(?format, %surface, "buffer channel format selected");

        let pool = ChannelPool::new(&mut backend, format, surface)?;
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = bounded(EVENT_CAPACITY);
        Ok(Self {
            builder: backend.builder(),
            backend,
            pool,
            compiler: PassCompiler::new(&config.custom_uniforms),
            passes: Vec::new(),
            next_seq: 0,
            common: String::new(),
            uniforms: ShaderUniforms::new(config.sample_rate),
            custom: CustomUniforms::new(&config.custom_uniforms),
            clock: FrameClock::new(Box::new(SystemTimeSource::new())),
            mouse: [0.0; 4],
            state: FrameState::Idle,
            command_tx,
            command_rx,
            event_tx,
            event_rx,
            stats: RenderStats::new(Instant::now()),
            config,
        })
    }

    /// Replaces the clock driving `iTime` and `iFrame`.
    pub fn with_time_source(mut self, source: BoxedTimeSource) -> Self {
        self.clock.replace_source(source);
        self
    }

    /// Replaces how pass sources are scanned for channel references.
    ///
    /// Applies to compiles issued afterwards.
    pub fn with_scanner(mut self, scanner: Box<dyn ChannelScanner>) -> Self {
        self.compiler = self.compiler.with_scanner(scanner);
        self
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            sender: self.command_tx.clone(),
        }
    }

    pub fn events(&self) -> Receiver<EngineEvent> {
        self.event_rx.clone()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn pool(&self) -> &ChannelPool<B> {
        &self.pool
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn surface(&self) -> Resolution {
        self.pool.surface()
    }

    pub fn fps(&self) -> Option<f32> {
        self.stats.fps()
    }

    /// Passes in execution order.
    pub fn passes(&self) -> Vec<PassInfo> {
        self.execution_slots()
            .into_iter()
            .map(|slot| PassInfo::from(&self.passes[slot]))
            .collect()
    }

    pub fn pass(&self, id: &PassId) -> Option<PassInfo> {
        self.find(id).map(|slot| PassInfo::from(&self.passes[slot]))
    }

    pub fn execution_order(&self) -> Vec<PassId> {
        self.execution_slots()
            .into_iter()
            .map(|slot| self.passes[slot].id.clone())
            .collect()
    }

    /// Compiles `source` as pass `id` writing `output`.
    ///
    /// An existing pass keeps its sizing; a new pass follows the surface.
    pub fn compile(
        &mut self,
        id: impl Into<PassId>,
        source: &str,
        output: u8,
    ) -> Result<CompileOutcome, CompileError> {
        let id = id.into();
        let sizing = self
            .find(&id)
            .map(|slot| self.passes[slot].sizing)
            .unwrap_or(Sizing::Surface);
        self.compile_sized(id, source, output, sizing)
    }

    /// Compiles `source` as pass `id` writing `output` at `sizing`.
    ///
    /// On failure the pass keeps rendering with its previous program. With
    /// [`CompileStrategy::Threaded`] the build runs on a worker and the outcome
    /// arrives as an [`EngineEvent`].
    pub fn compile_sized(
        &mut self,
        id: impl Into<PassId>,
        source: &str,
        output: u8,
        sizing: Sizing,
    ) -> Result<CompileOutcome, CompileError> {
        let id = id.into();
        if output as usize >= MAX_CHANNELS {
            return Err(CompileError::ChannelOutOfRange(output));
        }
        if output != PRIMARY_CHANNEL && source.trim().is_empty() {
            self.remove_pass(&id);
            return Ok(CompileOutcome::Removed);
        }
        self.check_output(&id, output)?;

        let prepared = self.prepare(&id, source);
        let slot = self.slot_for(&id, output, sizing);
        self.passes[slot].source = source.to_string();

        match self.config.compile_strategy {
            CompileStrategy::Immediate => {
                self.passes[slot].pending = None;
                let result = match prepared.link(&self.builder) {
                    Ok(program) => {
                        let linked = LinkedProgram::new(program, &prepared);
                        self.install(slot, linked, output, sizing)
                    }
                    Err(diagnostics) => Err(CompileError::Diagnostics(diagnostics)),
                };
                match result {
                    Ok(required) => Ok(CompileOutcome::Linked { required }),
                    Err(error) => {
                        self.record_failure(slot, &error);
                        Err(error)
                    }
                }
            }
            CompileStrategy::Threaded => {
                let ticket = BuildTicket::spawn(self.builder.clone(), prepared.source.clone());
                let superseded = self.passes[slot]
                    .pending
                    .replace(PendingBuild {
                        ticket,
                        prepared,
                        output,
                        sizing,
                    })
                    .is_some();
                tracing::debug!(pass = %id, superseded, "queued program build");
                Ok(CompileOutcome::Queued)
            }
        }
    }

    /// Removes a pass and destroys its output channel.
    pub fn remove_pass(&mut self, id: &PassId) -> bool {
        let Some(slot) = self.find(id) else {
            return false;
        };
        let pass = self.passes.remove(slot);
        if self.pool.kind(pass.output) == Some(ChannelKind::Buffer) {
            self.pool.destroy(&mut self.backend, pass.output);
        }
        tracing::info!(pass = %pass.id, channel = pass.output, "pass removed");
        self.emit(EngineEvent::Removed { id: pass.id });
        true
    }

    /// Replaces the common fragment and recompiles every pass.
    pub fn set_common(
        &mut self,
        source: &str,
    ) -> Vec<(PassId, Result<CompileOutcome, CompileError>)> {
        self.common = source.to_string();
        let requests: Vec<_> = self
            .passes
            .iter()
            .map(|pass| (pass.id.clone(), pass.source.clone(), pass.output, pass.sizing))
            .collect();
        requests
            .into_iter()
            .map(|(id, source, output, sizing)| {
                let result = self.compile_sized(id.clone(), &source, output, sizing);
                (id, result)
            })
            .collect()
    }

    pub fn common(&self) -> &str {
        &self.common
    }

    /// Sets a declared custom uniform; unknown names are ignored.
    pub fn set_uniform(&mut self, name: &str, values: &[f32]) -> bool {
        self.custom.set(name, values)
    }

    /// Pointer state in bottom-left-origin pixels: current xy, click origin zw.
    pub fn set_mouse(&mut self, mouse: [f32; 4]) {
        self.mouse = mouse;
    }

    /// Clears temporal state: time origin, frame counter and every front bit.
    pub fn restart(&mut self) {
        self.clock.restart();
        self.pool.reset_ping_pong();
        tracing::info!("restarted timeline");
    }

    /// Resizes the surface and every surface-sized buffer channel.
    ///
    /// Returns `false` when the size is unchanged, in which case nothing is
    /// reallocated.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        let surface = Resolution::new(width, height).clamped();
        if surface == self.pool.surface() {
            return false;
        }
        self.backend.resize_surface(surface.width, surface.height);
        for (channel, error) in self.pool.set_surface(&mut self.backend, surface) {
            tracing::warn!(channel, error = %error, "failed to reallocate channel after resize");
            self.emit(EngineEvent::ChannelFailed { channel, error });
        }
        tracing::debug!(%surface, "surface resized");
        true
    }

    /// Creates a single-texture channel fed by an external producer.
    ///
    /// Passes already sampling `index` with another dimensionality are relinked.
    pub fn create_media_channel(
        &mut self,
        index: u8,
        kind: ChannelKind,
        resolution: Resolution,
        sampling: Sampling,
    ) -> Result<ChannelHandle, ChannelError> {
        if let Some(pass) = self.passes.iter().find(|pass| pass.output == index) {
            tracing::warn!(channel = index, pass = %pass.id, "media channel collides with a pass output");
            return Err(ChannelError::KindConflict {
                index,
                existing: ChannelKind::Buffer,
            });
        }
        let handle = self
            .pool
            .create_media_channel(&mut self.backend, index, kind, resolution, sampling)?;
        self.relink_readers(index);
        Ok(handle)
    }

    /// Replaces the texels of a media channel.
    pub fn upload_media(&mut self, index: u8, texels: &[u8]) -> Result<(), ChannelError> {
        self.pool.upload(&mut self.backend, index, texels)
    }

    /// Decodes an image file into a new image channel.
    pub fn load_image(
        &mut self,
        index: u8,
        path: &Path,
        sampling: Sampling,
    ) -> Result<ChannelHandle, MediaError> {
        let texels = media::load_image(path)?;
        self.install_texels(index, ChannelKind::Image, texels, sampling)
    }

    /// Reads a raw RGBA8 volume into a new volumetric channel.
    pub fn load_volume(
        &mut self,
        index: u8,
        path: &Path,
        resolution: Resolution,
        sampling: Sampling,
    ) -> Result<ChannelHandle, MediaError> {
        let texels = media::load_volume(path, resolution)?;
        self.install_texels(index, ChannelKind::Image, texels, sampling)
    }

    /// Destroys a media channel. Pass outputs are removed with their pass instead.
    pub fn destroy_channel(&mut self, index: u8) -> bool {
        if self.passes.iter().any(|pass| pass.output == index) {
            return false;
        }
        self.pool.destroy(&mut self.backend, index)
    }

    /// Blocks until every queued build has finished and installs the results.
    pub fn finish_builds(&mut self) {
        for slot in 0..self.passes.len() {
            if let Some(PendingBuild {
                ticket,
                prepared,
                output,
                sizing,
            }) = self.passes[slot].pending.take()
            {
                let poll = ticket.wait();
                self.finish_build(slot, poll, prepared, output, sizing);
            }
        }
    }

    /// Renders one frame: buffer passes, the primary pass, then presentation.
    pub fn tick(&mut self) -> Result<FrameReport, FrameError> {
        self.apply_commands();
        self.poll_builds();

        let (time, delta, frame) = self.clock.advance();
        self.uniforms.set_time(time, delta, frame);
        self.uniforms.mouse = self.mouse;
        self.uniforms.refresh_date();
        self.refresh_channel_uniforms();
        self.pool.begin_frame();
        self.backend.begin_frame();

        let mut report = FrameReport {
            frame,
            time,
            ..FrameReport::default()
        };

        self.state = FrameState::RenderingBuffers;
        for slot in self.execution_slots() {
            if self.passes[slot].is_primary() {
                self.state = FrameState::RenderingMain;
            }
            let id = self.passes[slot].id.clone();
            if self.render_pass(slot) {
                report.rendered.push(id);
            } else {
                report.skipped.push(id);
            }
        }

        self.state = FrameState::Presenting;
        let present = self.config.present_channel;
        let source = self
            .pool
            .front_texture(present)
            .filter(|_| self.pool.sampler_dim(present) == SamplerDim::D2);
        report.presented = source.map(|_| present);
        let presented = self.backend.present(
            source,
            PresentParams {
                exponent: self.config.color_space.present_exponent(),
            },
        );
        self.state = FrameState::Idle;
        self.apply_commands();
        presented?;

        if let Some(fps) = self.stats.record(Instant::now()) {
            tracing::debug!(fps, frame, time, "render stats");
        }
        Ok(report)
    }

    fn render_pass(&mut self, slot: usize) -> bool {
        let output = self.passes[slot].output;
        if self.passes[slot].active.is_none() || self.pool.is_failed(output) {
            return false;
        }
        if let Err(error) = self.pool.ensure_allocated(&mut self.backend, output) {
            self.emit(EngineEvent::ChannelFailed {
                channel: output,
                error,
            });
            return false;
        }
        let Some(resolution) = self.pool.resolution(output) else {
            return false;
        };
        self.uniforms.set_resolution(resolution);

        let Self {
            backend,
            pool,
            passes,
            uniforms,
            custom,
            ..
        } = self;
        let pass = &passes[slot];
        let Some(linked) = pass.active.as_ref() else {
            return false;
        };
        let Some(target) = pool.back_texture(output) else {
            return false;
        };
        let inputs = linked
            .samplers
            .iter()
            .map(|sampler| BoundTexture {
                slot: *sampler,
                sampling: pool.sampling(sampler.channel),
                texture: pool.binding_texture(sampler.channel, sampler.dim),
            })
            .collect();
        backend.draw(DrawCall {
            label: pass.id.as_str(),
            program: &linked.program,
            inputs,
            output: target,
            uniforms,
            custom: custom.block(),
        });
        pool.flip(output);
        true
    }

    fn execution_slots(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.passes.len()).collect();
        order.sort_by_key(|&slot| {
            let pass = &self.passes[slot];
            (pass.is_primary(), pass.output, pass.seq)
        });
        order
    }

    fn refresh_channel_uniforms(&mut self) {
        for channel in 0..MAX_CHANNELS as u8 {
            let resolution = self
                .pool
                .resolution(channel)
                .map(|resolution| resolution.as_uniform())
                .unwrap_or([0.0; 4]);
            self.uniforms.set_channel_resolution(channel, resolution);
        }
    }

    fn prepare(&self, id: &PassId, source: &str) -> PreparedProgram {
        let pool = &self.pool;
        self.compiler
            .prepare(id.as_str(), source, &self.common, |channel| pool.sampler_dim(channel))
    }

    fn check_output(&self, id: &PassId, output: u8) -> Result<(), CompileError> {
        if let Some(owner) = self
            .passes
            .iter()
            .find(|pass| pass.output == output && pass.id != *id)
        {
            return Err(CompileError::ChannelConflict {
                channel: output,
                owner: owner.id.clone(),
            });
        }
        match self.pool.kind(output) {
            Some(kind) if !kind.is_buffer() => Err(CompileError::Allocation {
                channel: output,
                source: ChannelError::KindConflict {
                    index: output,
                    existing: kind,
                },
            }),
            _ => Ok(()),
        }
    }

    fn find(&self, id: &PassId) -> Option<usize> {
        self.passes.iter().position(|pass| pass.id == *id)
    }

    fn slot_for(&mut self, id: &PassId, output: u8, sizing: Sizing) -> usize {
        if let Some(slot) = self.find(id) {
            return slot;
        }
        self.next_seq += 1;
        self.passes
            .push(Pass::new(id.clone(), output, sizing, self.next_seq));
        self.passes.len() - 1
    }

    /// Makes `linked` the active program of the pass in `slot`.
    ///
    /// The output channel is declared (or resized) first; the previous program
    /// is dropped only after the swap.
    fn install(
        &mut self,
        slot: usize,
        linked: LinkedProgram<B::Program>,
        output: u8,
        sizing: Sizing,
    ) -> Result<Vec<u8>, CompileError> {
        let allocation = |source| CompileError::Allocation {
            channel: output,
            source,
        };
        self.pool
            .declare_buffer(&mut self.backend, output, sizing)
            .map_err(allocation)?;
        if self.pool.is_failed(output) {
            self.pool
                .ensure_allocated(&mut self.backend, output)
                .map_err(allocation)?;
        }

        let previous_output = self.passes[slot].output;
        if previous_output != output
            && self.pool.kind(previous_output) == Some(ChannelKind::Buffer)
        {
            self.pool.destroy(&mut self.backend, previous_output);
        }

        let pass = &mut self.passes[slot];
        pass.output = output;
        pass.sizing = sizing;
        let required = linked.required.clone();
        let replaced = pass.swap(linked).is_some();
        tracing::info!(
            pass = %pass.id,
            channel = output,
            ?required,
            replaced,
            "pass linked"
        );
        Ok(required)
    }

    fn record_failure(&mut self, slot: usize, error: &CompileError) {
        let pass = &mut self.passes[slot];
        if let CompileError::Diagnostics(diagnostics) = error {
            pass.diagnostics = diagnostics.clone();
            tracing::warn!(
                pass = %pass.id,
                diagnostics = diagnostics.len(),
                first = %diagnostics.first().map(ToString::to_string).unwrap_or_default(),
                "compile failed; keeping last linked program"
            );
        } else {
            tracing::warn!(pass = %pass.id, error = %error, "compile rejected");
        }
    }

    fn poll_builds(&mut self) {
        for slot in 0..self.passes.len() {
            let poll = match &self.passes[slot].pending {
                Some(pending) => pending.ticket.poll(),
                None => continue,
            };
            if matches!(poll, BuildPoll::Pending) {
                continue;
            }
            if let Some(PendingBuild {
                prepared,
                output,
                sizing,
                ..
            }) = self.passes[slot].pending.take()
            {
                self.finish_build(slot, poll, prepared, output, sizing);
            }
        }
    }

    fn finish_build(
        &mut self,
        slot: usize,
        poll: BuildPoll<B::Program>,
        prepared: PreparedProgram,
        output: u8,
        sizing: Sizing,
    ) {
        let id = self.passes[slot].id.clone();
        let result = match poll {
            BuildPoll::Done(Ok(program)) => self.check_output(&id, output).and_then(|_| {
                let linked = LinkedProgram::new(program, &prepared);
                self.install(slot, linked, output, sizing)
            }),
            BuildPoll::Done(Err(log)) => {
                Err(CompileError::Diagnostics(prepared.diagnostics(&log)))
            }
            BuildPoll::Pending | BuildPoll::Lost => Err(CompileError::Diagnostics(vec![
                Diagnostic::error(1, "program build worker exited without a result"),
            ])),
        };
        match result {
            Ok(required) => self.emit(EngineEvent::Linked { id, required }),
            Err(error) => {
                self.record_failure(slot, &error);
                self.emit(EngineEvent::CompileFailed { id, error });
            }
        }
    }

    fn relink_readers(&mut self, channel: u8) {
        let dim = self.pool.sampler_dim(channel);
        let stale: Vec<(PassId, String, u8, Sizing)> = self
            .passes
            .iter()
            .filter(|pass| {
                pass.active.as_ref().is_some_and(|linked| {
                    linked
                        .samplers
                        .iter()
                        .any(|slot| slot.channel == channel && slot.dim != dim)
                })
            })
            .map(|pass| (pass.id.clone(), pass.source.clone(), pass.output, pass.sizing))
            .collect();
        for (id, source, output, sizing) in stale {
            tracing::debug!(pass = %id, channel, "relinking for new sampler dimensionality");
            if let Err(error) = self.compile_sized(id.clone(), &source, output, sizing) {
                self.emit(EngineEvent::CompileFailed { id, error });
            }
        }
    }

    fn install_texels(
        &mut self,
        index: u8,
        kind: ChannelKind,
        texels: Texels,
        sampling: Sampling,
    ) -> Result<ChannelHandle, MediaError> {
        let handle = self.create_media_channel(index, kind, texels.resolution, sampling)?;
        self.upload_media(index, &texels.data)?;
        Ok(handle)
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            match command {
                EngineCommand::Compile {
                    id,
                    source,
                    output,
                    sizing,
                } => {
                    let result = match sizing {
                        Some(sizing) => self.compile_sized(id.clone(), &source, output, sizing),
                        None => self.compile(id.clone(), &source, output),
                    };
                    match result {
                        Ok(CompileOutcome::Linked { required }) => {
                            self.emit(EngineEvent::Linked { id, required })
                        }
                        Ok(CompileOutcome::Removed | CompileOutcome::Queued) => {}
                        Err(error) => self.emit(EngineEvent::CompileFailed { id, error }),
                    }
                }
                EngineCommand::Remove(id) => {
                    if !self.remove_pass(&id) {
                        tracing::debug!(pass = %id, "ignoring removal of unknown pass");
                    }
                }
                EngineCommand::SetCommon(source) => {
                    for (id, result) in self.set_common(&source) {
                        match result {
                            Ok(CompileOutcome::Linked { required }) => {
                                self.emit(EngineEvent::Linked { id, required })
                            }
                            Ok(_) => {}
                            Err(error) => self.emit(EngineEvent::CompileFailed { id, error }),
                        }
                    }
                }
                EngineCommand::Restart => self.restart(),
                EngineCommand::Resize { width, height } => {
                    self.resize(width, height);
                }
                EngineCommand::SetUniform { name, values } => {
                    self.set_uniform(&name, &values);
                }
            }
        }
    }

    fn emit(&self, event: EngineEvent) {
        if let Err(TrySendError::Full(event)) = self.event_tx.try_send(event) {
            tracing::debug!(?event, "event queue full; dropping engine event");
        }
    }
}
