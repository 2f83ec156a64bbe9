use std::time::{Duration, Instant};

/// Snapshot of the time state supplied to the shader uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Elapsed wall-clock or simulated time in seconds.
    pub seconds: f32,
    /// Monotonic frame counter for the running session.
    pub frame_index: u64,
}

impl TimeSample {
    /// Creates a new time sample.
    pub fn new(seconds: f32, frame_index: u64) -> Self {
        Self {
            seconds,
            frame_index,
        }
    }
}

/// Abstraction over where time values originate from.
pub trait TimeSource: Send {
    /// Resets the source to its initial state.
    fn reset(&mut self);
    /// Produces a time sample for the next frame.
    fn sample(&mut self) -> TimeSample;
}

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
    frame: u64,
}

impl SystemTimeSource {
    /// Creates a system time source initialised to `Instant::now()`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            frame: 0,
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn reset(&mut self) {
        self.origin = Instant::now();
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        let elapsed = self.origin.elapsed();
        let sample = TimeSample::new(elapsed.as_secs_f32(), self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Time source that advances by a fixed step per frame.
///
/// Useful for deterministic offline rendering where every frame must see the
/// same timeline regardless of how long it took to draw.
#[derive(Debug, Clone, Copy)]
pub struct SteppedTimeSource {
    step: f32,
    frame: u64,
}

impl SteppedTimeSource {
    /// Builds a source advancing `step` seconds per sample.
    pub fn new(step: f32) -> Self {
        Self {
            step: step.max(0.0),
            frame: 0,
        }
    }
}

impl TimeSource for SteppedTimeSource {
    fn reset(&mut self) {
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.frame as f32 * self.step, self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Convenient alias for owning time sources behind trait objects.
pub type BoxedTimeSource = Box<dyn TimeSource + Send>;

const STATS_WINDOW: Duration = Duration::from_secs(1);

/// Frames-per-second estimate over one-second windows.
#[derive(Debug, Clone)]
pub struct RenderStats {
    window_start: Instant,
    frames: u32,
    fps: Option<f32>,
}

impl RenderStats {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
            fps: None,
        }
    }

    /// Counts one presented frame; returns a fresh estimate when a window closes.
    pub fn record(&mut self, now: Instant) -> Option<f32> {
        self.frames = self.frames.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < STATS_WINDOW {
            return None;
        }
        let fps = self.frames as f32 / elapsed.as_secs_f32();
        self.window_start = now;
        self.frames = 0;
        self.fps = Some(fps);
        self.fps
    }

    /// Most recent estimate.
    pub fn fps(&self) -> Option<f32> {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepped_source_counts_frames_and_resets() {
        let mut source = SteppedTimeSource::new(0.5);
        assert_eq!(source.sample(), TimeSample::new(0.0, 0));
        assert_eq!(source.sample(), TimeSample::new(0.5, 1));
        source.reset();
        assert_eq!(source.sample(), TimeSample::new(0.0, 0));
    }

    #[test]
    fn stats_report_once_per_window() {
        let start = Instant::now();
        let mut stats = RenderStats::new(start);
        for frame in 1..30 {
            assert_eq!(stats.record(start + Duration::from_millis(frame * 30)), None);
        }
        let fps = stats
            .record(start + Duration::from_millis(1000))
            .expect("window closed");
        assert!((fps - 30.0).abs() < 0.01);
        assert_eq!(stats.fps(), Some(fps));
        assert_eq!(stats.record(start + Duration::from_millis(1010)), None);
    }

    #[test]
    fn system_source_restarts_frame_counter() {
        let mut source = SystemTimeSource::new();
        source.sample();
        source.sample();
        source.reset();
        assert_eq!(source.sample().frame_index, 0);
    }
}
