use bytemuck::{Pod, Zeroable};
use chrono::{Datelike, Local, Timelike};

use crate::runtime::{BoxedTimeSource, TimeSample};
use crate::types::{CustomUniformDecl, Resolution, MAX_CHANNELS, MAX_CUSTOM_UNIFORMS};

/// CPU mirror of the `ShaderParams` uniform block.
///
/// The layout must match the block declared in the program prologue
/// (`compile.rs`); every field sits at its std140 offset.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ShaderUniforms {
    pub resolution: [f32; 3],
    pub time: f32,
    pub time_delta: f32,
    pub frame: i32,
    pub sample_rate: f32,
    pub padding0: f32,
    pub mouse: [f32; 4],
    pub date: [f32; 4],
    pub channel_resolution: [[f32; 4]; MAX_CHANNELS],
    pub channel_time: [[f32; 4]; MAX_CHANNELS],
}

impl ShaderUniforms {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            ..Self::zeroed()
        }
    }

    /// `iResolution` of the pass about to draw: its output channel's size.
    pub fn set_resolution(&mut self, resolution: Resolution) {
        self.resolution = [resolution.width as f32, resolution.height as f32, 1.0];
    }

    pub fn set_channel_resolution(&mut self, channel: u8, resolution: [f32; 4]) {
        if let Some(slot) = self.channel_resolution.get_mut(channel as usize) {
            *slot = resolution;
        }
    }

    pub fn set_time(&mut self, seconds: f32, delta: f32, frame: u64) {
        self.time = seconds;
        self.time_delta = delta;
        self.frame = frame.min(i32::MAX as u64) as i32;
        for channel in &mut self.channel_time {
            channel[0] = seconds;
        }
    }

    pub fn refresh_date(&mut self) {
        let local_now = Local::now();
        let seconds_since_midnight = local_now.num_seconds_from_midnight() as f32
            + local_now.nanosecond() as f32 / 1_000_000_000.0;
        self.date = [
            local_now.year() as f32,
            // `iDate.y` is zero-based like JavaScript's `Date.getMonth()`.
            local_now.month0() as f32,
            local_now.day() as f32,
            seconds_since_midnight,
        ];
    }
}

/// CPU mirror of the `CustomParams` block: one `vec4` per declared uniform.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CustomBlock {
    pub slots: [[f32; 4]; MAX_CUSTOM_UNIFORMS],
}

/// Externally-set uniforms shared by every pass.
#[derive(Clone, Debug)]
pub struct CustomUniforms {
    decls: Vec<CustomUniformDecl>,
    block: CustomBlock,
}

impl CustomUniforms {
    /// Keeps the first `MAX_CUSTOM_UNIFORMS` declarations.
    pub fn new(decls: &[CustomUniformDecl]) -> Self {
        if decls.len() > MAX_CUSTOM_UNIFORMS {
            tracing::warn!(
                declared = decls.len(),
                limit = MAX_CUSTOM_UNIFORMS,
                "too many custom uniforms; extra declarations ignored"
            );
        }
        let decls: Vec<_> = decls.iter().take(MAX_CUSTOM_UNIFORMS).cloned().collect();
        let mut block = CustomBlock::zeroed();
        for (slot, decl) in block.slots.iter_mut().zip(&decls) {
            *slot = decl.initial;
        }
        Self { decls, block }
    }

    pub fn decls(&self) -> &[CustomUniformDecl] {
        &self.decls
    }

    pub fn block(&self) -> &CustomBlock {
        &self.block
    }

    /// Updates a declared uniform. Returns `false` for unknown names.
    pub fn set(&mut self, name: &str, values: &[f32]) -> bool {
        let Some(index) = self.decls.iter().position(|decl| decl.name == name) else {
            tracing::warn!(uniform = name, "ignoring value for undeclared custom uniform");
            return false;
        };
        let components = self.decls[index].kind.components();
        if values.len() != components {
            tracing::debug!(
                uniform = name,
                expected = components,
                actual = values.len(),
                "custom uniform component count mismatch"
            );
        }
        let slot = &mut self.block.slots[index];
        for (target, value) in slot.iter_mut().take(components).zip(values) {
            *target = *value;
        }
        true
    }
}

/// Frame timing derived from a [`TimeSource`](crate::runtime::TimeSource).
pub struct FrameClock {
    source: BoxedTimeSource,
    last: Option<TimeSample>,
}

impl FrameClock {
    pub fn new(source: BoxedTimeSource) -> Self {
        Self { source, last: None }
    }

    /// Samples the next frame: `(seconds, delta, frame index)`.
    pub fn advance(&mut self) -> (f32, f32, u64) {
        let sample = self.source.sample();
        let delta = self
            .last
            .map(|previous| (sample.seconds - previous.seconds).max(0.0))
            .unwrap_or(0.0);
        self.last = Some(sample);
        (sample.seconds, delta, sample.frame_index)
    }

    /// Moves the time origin to now and the frame counter back to zero.
    pub fn restart(&mut self) {
        self.source.reset();
        self.last = None;
    }

    pub fn replace_source(&mut self, source: BoxedTimeSource) {
        self.source = source;
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::SteppedTimeSource;
    use crate::types::CustomUniformKind;
    use std::mem::{align_of, size_of};

    #[test]
    fn shader_uniforms_follow_std140_layout() {
        let uniforms = ShaderUniforms::new(44100.0);
        let base = &uniforms as *const _ as usize;

        assert_eq!(align_of::<ShaderUniforms>(), 16);
        assert_eq!(size_of::<ShaderUniforms>(), 576);
        assert_eq!((&uniforms.time as *const _ as usize) - base, 12);
        assert_eq!((&uniforms.time_delta as *const _ as usize) - base, 16);
        assert_eq!((&uniforms.frame as *const _ as usize) - base, 20);
        assert_eq!((&uniforms.sample_rate as *const _ as usize) - base, 24);
        assert_eq!((&uniforms.mouse as *const _ as usize) - base, 32);
        assert_eq!((&uniforms.date as *const _ as usize) - base, 48);
        assert_eq!(
            (&uniforms.channel_resolution as *const _ as usize) - base,
            64
        );
        assert_eq!((&uniforms.channel_time as *const _ as usize) - base, 320);
    }

    #[test]
    fn resolution_third_component_is_one() {
        let mut uniforms = ShaderUniforms::new(44100.0);
        uniforms.set_resolution(Resolution::new(640, 360));
        assert_eq!(uniforms.resolution, [640.0, 360.0, 1.0]);
    }

    #[test]
    fn date_month_is_zero_based() {
        let mut uniforms = ShaderUniforms::new(44100.0);
        uniforms.refresh_date();
        assert!(uniforms.date[1] >= 0.0 && uniforms.date[1] <= 11.0);
        assert!(uniforms.date[3] < 86_401.0);
    }

    #[test]
    fn custom_uniforms_write_declared_components() {
        let mut custom = CustomUniforms::new(&[
            CustomUniformDecl::new("uGain", CustomUniformKind::Float).with_initial(&[2.0]),
            CustomUniformDecl::new("uTint", CustomUniformKind::Vec3),
        ]);
        assert_eq!(custom.block().slots[0], [2.0, 0.0, 0.0, 0.0]);
        assert!(custom.set("uTint", &[0.1, 0.2, 0.3, 9.0]));
        assert_eq!(custom.block().slots[1], [0.1, 0.2, 0.3, 0.0]);
        assert!(!custom.set("uMissing", &[1.0]));
    }

    #[test]
    fn clock_reports_delta_and_restarts() {
        let mut clock = FrameClock::new(Box::new(SteppedTimeSource::new(0.25)));
        assert_eq!(clock.advance(), (0.0, 0.0, 0));
        assert_eq!(clock.advance(), (0.25, 0.25, 1));
        clock.restart();
        assert_eq!(clock.advance(), (0.0, 0.0, 0));
    }
}
