//! Windowed preview host: owns a `winit` window, the wgpu-backed engine and
//! the pointer/keyboard state that feeds it.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use tracing::{debug, error, info, warn};

use crate::backend::FrameError;
use crate::gpu::WgpuBackend;
use crate::scheduler::{Engine, EngineEvent};
use crate::types::{
    ChannelKind, EngineConfig, Filter, Resolution, Sampling, ShaderCompiler, Wrap,
};

/// Settings for [`run_preview`].
#[derive(Clone, Debug)]
pub struct PreviewOptions {
    pub title: String,
    pub size: Resolution,
    pub compiler: ShaderCompiler,
    pub config: EngineConfig,
    /// Channel receiving the 256x3 keyboard texture, if any.
    pub keyboard_channel: Option<u8>,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            title: "toypass".to_string(),
            size: Resolution::new(1280, 720),
            compiler: ShaderCompiler::default(),
            config: EngineConfig::default(),
            keyboard_channel: None,
        }
    }
}

/// Opens the preview window and renders until it is closed.
///
/// `setup` runs once the engine exists and before the first tick; it is where
/// passes are compiled and media channels loaded.
pub fn run_preview<F>(options: PreviewOptions, setup: F) -> Result<()>
where
    F: FnOnce(&mut Engine<WgpuBackend>) -> Result<()>,
{
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title(&options.title)
        .with_inner_size(PhysicalSize::new(options.size.width, options.size.height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);

    let mut state = PreviewState::new(window.clone(), &options)?;
    setup(&mut state.engine).context("failed to set up project")?;
    state.engine.finish_builds();
    state.drain_events();

    let run_result = event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == state.window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && !event.repeat
                    && matches!(event.logical_key, Key::Named(NamedKey::F5))
                {
                    state.engine.restart();
                }
                state.handle_key(&event);
            }
            WindowEvent::CursorMoved { position, .. } => {
                state.mouse.handle_cursor_moved(position);
            }
            WindowEvent::MouseInput {
                state: button_state,
                button: MouseButton::Left,
                ..
            } => {
                state.mouse.handle_button(button_state);
            }
            WindowEvent::Resized(size) => state.resize(size),
            WindowEvent::RedrawRequested => {
                if let Err(err) = state.render_frame() {
                    error!(error = %err, "frame aborted; closing preview");
                    elwt.exit();
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            state.window.request_redraw();
            elwt.set_control_flow(ControlFlow::Poll);
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

// The engine holds a surface created from raw window handles, so it must drop first.
struct PreviewState {
    engine: Engine<WgpuBackend>,
    window: Arc<Window>,
    mouse: MouseState,
    keyboard: KeyboardState,
    keyboard_channel: Option<u8>,
}

impl PreviewState {
    fn new(window: Arc<Window>, options: &PreviewOptions) -> Result<Self> {
        let size = window.inner_size();
        let surface = Resolution::new(size.width, size.height).clamped();
        let backend = WgpuBackend::new(
            window.as_ref(),
            surface,
            options.compiler,
            options.config.precision,
        )?;
        let mut engine = Engine::new(backend, options.config.clone(), surface)
            .context("failed to allocate placeholder textures")?;

        let keyboard = KeyboardState::default();
        if let Some(channel) = options.keyboard_channel {
            engine
                .create_media_channel(
                    channel,
                    ChannelKind::ProceduralInput,
                    Resolution::new(KEYBOARD_WIDTH as u32, KEYBOARD_HEIGHT as u32),
                    Sampling {
                        filter: Filter::Nearest,
                        wrap: Wrap::Clamp,
                    },
                )
                .with_context(|| format!("failed to create keyboard channel {channel}"))?;
            engine
                .upload_media(channel, &keyboard.data)
                .with_context(|| format!("failed to clear keyboard channel {channel}"))?;
            info!(channel, "keyboard input bound");
        }

        Ok(Self {
            engine,
            window,
            mouse: MouseState::default(),
            keyboard,
            keyboard_channel: options.keyboard_channel,
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        // Minimised windows report a zero extent; keep the last real size.
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.engine.resize(size.width, size.height);
    }

    fn handle_key(&mut self, event: &KeyEvent) {
        if self.keyboard.handle_event(event) {
            self.sync_keyboard();
        }
    }

    fn sync_keyboard(&mut self) {
        let Some(channel) = self.keyboard_channel else {
            self.keyboard.clear_dirty();
            return;
        };
        if let Some(snapshot) = self.keyboard.take_dirty_snapshot() {
            if let Err(err) = self.engine.upload_media(channel, &snapshot) {
                warn!(channel, error = %err, "failed to update keyboard channel");
            }
        }
    }

    fn render_frame(&mut self) -> Result<(), FrameError> {
        let height = self.engine.surface().height as f32;
        self.engine.set_mouse(self.mouse.as_uniform(height));

        let result = match self.engine.tick() {
            Ok(_) => Ok(()),
            Err(FrameError::Surface(reason)) => {
                // The backend already reconfigured the swapchain; retry next frame.
                debug!(%reason, "surface unavailable this frame");
                Ok(())
            }
            Err(err) => Err(err),
        };

        // Pulses last exactly one rendered frame.
        self.mouse.end_frame();
        if self.keyboard.reset_pulses() {
            self.sync_keyboard();
        }
        self.drain_events();
        result
    }

    fn drain_events(&mut self) {
        for event in self.engine.events().try_iter() {
            match event {
                EngineEvent::CompileFailed { id, error } => {
                    warn!(pass = %id, error = %error, "compile failed");
                    if let crate::pass::CompileError::Diagnostics(diagnostics) = &error {
                        for diagnostic in diagnostics {
                            warn!(pass = %id, "{diagnostic}");
                        }
                    }
                }
                EngineEvent::ChannelFailed { channel, error } => {
                    warn!(channel, error = %error, "channel unavailable");
                }
                EngineEvent::Linked { id, required } => {
                    debug!(pass = %id, ?required, "pass linked");
                }
                EngineEvent::Removed { id } => {
                    debug!(pass = %id, "pass removed");
                }
            }
        }
    }
}

/// Pointer state reported through `iMouse`.
#[derive(Debug, Default)]
struct MouseState {
    position: Option<PhysicalPosition<f64>>,
    pressed_anchor: Option<PhysicalPosition<f64>>,
    is_pressed: bool,
    click_pending: bool,
}

impl MouseState {
    fn handle_cursor_moved(&mut self, position: PhysicalPosition<f64>) {
        self.position = Some(position);
        if self.is_pressed && self.pressed_anchor.is_none() {
            self.pressed_anchor = Some(position);
            self.click_pending = true;
        }
    }

    fn handle_button(&mut self, state: ElementState) {
        match state {
            ElementState::Pressed => {
                self.is_pressed = true;
                if let Some(pos) = self.position {
                    self.pressed_anchor = Some(pos);
                    self.click_pending = true;
                }
            }
            ElementState::Released => self.is_pressed = false,
        }
    }

    /// Ends the click pulse once a frame has seen it.
    fn end_frame(&mut self) {
        self.click_pending = false;
    }

    /// `xy` is the pointer and `zw` the last click origin, both with a
    /// bottom-left origin. `z` is negative once the button is released and
    /// `w` is positive only on the frame of the click.
    fn as_uniform(&self, height: f32) -> [f32; 4] {
        let mut data = [0.0; 4];

        if let Some(pos) = self.position {
            data[0] = pos.x as f32;
            data[1] = height - pos.y as f32;
        }

        if let Some(anchor) = self.pressed_anchor {
            let x = anchor.x as f32;
            let y = height - anchor.y as f32;
            data[2] = if self.is_pressed { x } else { -x };
            data[3] = if self.click_pending { y } else { -y };
        }

        data
    }
}

const KEYBOARD_WIDTH: usize = 256;
const KEYBOARD_HEIGHT: usize = 3;
const KEYBOARD_CHANNELS: usize = 4;
const KEYBOARD_ROW_STATE: usize = 0;
const KEYBOARD_ROW_PULSE: usize = 1;
const KEYBOARD_ROW_TOGGLE: usize = 2;

/// RGBA8 keyboard texture: row 0 held keys, row 1 keys pressed this frame,
/// row 2 toggles, one column per ASCII code.
struct KeyboardState {
    pressed: [bool; KEYBOARD_WIDTH],
    toggled: [bool; KEYBOARD_WIDTH],
    pulse_pending: [bool; KEYBOARD_WIDTH],
    data: Vec<u8>,
    dirty: bool,
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self {
            pressed: [false; KEYBOARD_WIDTH],
            toggled: [false; KEYBOARD_WIDTH],
            pulse_pending: [false; KEYBOARD_WIDTH],
            data: vec![0u8; KEYBOARD_WIDTH * KEYBOARD_HEIGHT * KEYBOARD_CHANNELS],
            dirty: false,
        }
    }
}

impl KeyboardState {
    fn handle_event(&mut self, event: &KeyEvent) -> bool {
        let Some(code) = ascii_from_key(&event.logical_key) else {
            return false;
        };
        self.apply(code, event.state, event.repeat)
    }

    fn apply(&mut self, code: u8, state: ElementState, repeat: bool) -> bool {
        let index = code as usize;
        match state {
            ElementState::Pressed => {
                if repeat || self.pressed[index] {
                    return false;
                }
                self.pressed[index] = true;
                self.write_cell(KEYBOARD_ROW_STATE, index, 255);
                self.write_cell(KEYBOARD_ROW_PULSE, index, 255);
                self.pulse_pending[index] = true;

                self.toggled[index] = !self.toggled[index];
                let toggle = if self.toggled[index] { 255 } else { 0 };
                self.write_cell(KEYBOARD_ROW_TOGGLE, index, toggle);
            }
            ElementState::Released => {
                if !self.pressed[index] {
                    return false;
                }
                self.pressed[index] = false;
                self.write_cell(KEYBOARD_ROW_STATE, index, 0);
            }
        }
        self.dirty = true;
        true
    }

    fn take_dirty_snapshot(&mut self) -> Option<Vec<u8>> {
        if self.dirty {
            self.dirty = false;
            Some(self.data.clone())
        } else {
            None
        }
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Clears the pulse row; returns whether anything changed.
    fn reset_pulses(&mut self) -> bool {
        let mut any = false;
        for index in 0..KEYBOARD_WIDTH {
            if self.pulse_pending[index] {
                self.pulse_pending[index] = false;
                self.write_cell(KEYBOARD_ROW_PULSE, index, 0);
                any = true;
            }
        }
        if any {
            self.dirty = true;
        }
        any
    }

    fn cell(&self, row: usize, column: usize) -> u8 {
        self.data[row * KEYBOARD_WIDTH * KEYBOARD_CHANNELS + column * KEYBOARD_CHANNELS]
    }

    fn write_cell(&mut self, row: usize, column: usize, value: u8) {
        let stride = KEYBOARD_WIDTH * KEYBOARD_CHANNELS;
        let offset = row * stride + column * KEYBOARD_CHANNELS;
        self.data[offset..offset + KEYBOARD_CHANNELS].fill(value);
    }
}

fn ascii_from_key(key: &Key) -> Option<u8> {
    match key {
        Key::Character(value) => {
            let mut chars = value.chars();
            let ch = chars.next()?;
            if chars.next().is_some() || !ch.is_ascii() {
                return None;
            }
            // Letters report as their uppercase code, as in browser key codes.
            Some(ch.to_ascii_uppercase() as u8)
        }
        Key::Named(NamedKey::Space) => Some(b' '),
        Key::Named(NamedKey::Enter) => Some(13),
        Key::Named(NamedKey::Tab) => Some(9),
        Key::Named(NamedKey::Backspace) => Some(8),
        Key::Named(NamedKey::Escape) => Some(27),
        Key::Named(NamedKey::ArrowLeft) => Some(37),
        Key::Named(NamedKey::ArrowUp) => Some(38),
        Key::Named(NamedKey::ArrowRight) => Some(39),
        Key::Named(NamedKey::ArrowDown) => Some(40),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::keyboard::SmolStr;

    #[test]
    fn mouse_is_reported_with_bottom_left_origin() {
        let mut mouse = MouseState::default();
        mouse.handle_cursor_moved(PhysicalPosition::new(10.0, 30.0));
        assert_eq!(mouse.as_uniform(100.0), [10.0, 70.0, 0.0, 0.0]);

        mouse.handle_button(ElementState::Pressed);
        mouse.handle_cursor_moved(PhysicalPosition::new(20.0, 40.0));
        assert_eq!(mouse.as_uniform(100.0), [20.0, 60.0, 10.0, 70.0]);
    }

    #[test]
    fn click_origin_keeps_its_sign_encoded_state() {
        let mut mouse = MouseState::default();
        mouse.handle_cursor_moved(PhysicalPosition::new(10.0, 30.0));
        mouse.handle_button(ElementState::Pressed);
        assert_eq!(mouse.as_uniform(100.0)[2..], [10.0, 70.0]);

        mouse.end_frame();
        assert_eq!(mouse.as_uniform(100.0)[2..], [10.0, -70.0]);

        mouse.handle_button(ElementState::Released);
        assert_eq!(mouse.as_uniform(100.0)[2..], [-10.0, -70.0]);

        mouse.handle_cursor_moved(PhysicalPosition::new(50.0, 50.0));
        mouse.handle_button(ElementState::Pressed);
        assert_eq!(mouse.as_uniform(100.0)[2..], [50.0, 50.0]);
    }

    #[test]
    fn keyboard_rows_track_state_pulse_and_toggle() {
        let mut keyboard = KeyboardState::default();
        let a = ascii_from_key(&Key::Character(SmolStr::new("a"))).expect("ascii");
        assert_eq!(a, b'A');

        assert!(keyboard.apply(a, ElementState::Pressed, false));
        assert!(!keyboard.apply(a, ElementState::Pressed, true));
        let column = a as usize;
        assert_eq!(keyboard.cell(KEYBOARD_ROW_STATE, column), 255);
        assert_eq!(keyboard.cell(KEYBOARD_ROW_PULSE, column), 255);
        assert_eq!(keyboard.cell(KEYBOARD_ROW_TOGGLE, column), 255);
        assert!(keyboard.take_dirty_snapshot().is_some());

        assert!(keyboard.reset_pulses());
        assert_eq!(keyboard.cell(KEYBOARD_ROW_PULSE, column), 0);
        assert!(!keyboard.reset_pulses());

        assert!(keyboard.apply(a, ElementState::Released, false));
        assert_eq!(keyboard.cell(KEYBOARD_ROW_STATE, column), 0);
        assert_eq!(keyboard.cell(KEYBOARD_ROW_TOGGLE, column), 255);

        keyboard.apply(a, ElementState::Pressed, false);
        assert_eq!(keyboard.cell(KEYBOARD_ROW_TOGGLE, column), 0);
    }
}
