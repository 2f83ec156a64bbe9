//! The channel pool: every texture a pass can read or write.
//!
//! Buffer channels own a ping-pong pair of render targets plus a front bit;
//! passes read the front target and write the back one, then flip. Every other
//! kind owns a single texture refreshed by an external producer. The pool is
//! owned by the engine and receives the backend by reference for every
//! operation that touches GPU memory, so nothing else can mutate textures
//! behind the scheduler's back.

use std::collections::BTreeMap;

use crate::backend::{AllocError, GpuBackend, TextureDesc};
use crate::types::{
    ChannelKind, Resolution, SamplerDim, Sampling, Sizing, TexelFormat, MAX_CHANNELS,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("channel {0} exceeds the supported channel range (0-15)")]
    OutOfRange(u8),
    #[error("channel {index} already holds a {existing} channel")]
    KindConflict { index: u8, existing: ChannelKind },
    #[error("channel {0} does not exist")]
    Missing(u8),
    #[error("channel {index} expects {expected} bytes of texels, got {actual}")]
    TexelSize {
        index: u8,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// Public summary of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelHandle {
    pub index: u8,
    pub kind: ChannelKind,
    pub resolution: Resolution,
}

enum Storage<T> {
    PingPong {
        targets: Option<[T; 2]>,
        front: usize,
        flipped: bool,
    },
    Single(T),
}

struct Channel<T> {
    kind: ChannelKind,
    resolution: Resolution,
    sizing: Sizing,
    sampling: Sampling,
    storage: Storage<T>,
    failed: bool,
}

impl<T> Channel<T> {
    fn front(&self) -> Option<&T> {
        match &self.storage {
            Storage::PingPong {
                targets: Some(pair),
                front,
                ..
            } => Some(&pair[*front]),
            Storage::PingPong { targets: None, .. } => None,
            Storage::Single(texture) => Some(texture),
        }
    }
}

struct Placeholders<T> {
    flat: T,
    volume: T,
}

pub struct ChannelPool<B: GpuBackend> {
    channels: BTreeMap<u8, Channel<B::Target>>,
    placeholders: Placeholders<B::Target>,
    buffer_format: TexelFormat,
    surface: Resolution,
}

impl<B: GpuBackend> ChannelPool<B> {
    /// Creates an empty pool and the 1x1 placeholders bound for missing channels.
    pub fn new(
        backend: &mut B,
        buffer_format: TexelFormat,
        surface: Resolution,
    ) -> Result<Self, AllocError> {
        let flat = allocate_placeholder(backend, Resolution::new(1, 1))?;
        let volume = match allocate_placeholder(backend, Resolution::volume(1, 1, 1)) {
            Ok(volume) => volume,
            Err(err) => {
                backend.destroy(flat);
                return Err(err);
            }
        };
        Ok(Self {
            channels: BTreeMap::new(),
            placeholders: Placeholders { flat, volume },
            buffer_format,
            surface: surface.clamped(),
        })
    }

    pub fn buffer_format(&self) -> TexelFormat {
        self.buffer_format
    }

    pub fn surface(&self) -> Resolution {
        self.surface
    }

    /// Allocates a ping-pong pair at a fixed resolution.
    ///
    /// Calling again with a different resolution destroys and reallocates both
    /// targets and resets the front bit; the same resolution is a no-op.
    pub fn create_buffer_channel(
        &mut self,
        backend: &mut B,
        index: u8,
        width: u32,
        height: u32,
    ) -> Result<ChannelHandle, ChannelError> {
        let resolution = Resolution::new(width, height).clamped();
        self.declare_buffer(backend, index, Sizing::Fixed(resolution))?;
        self.ensure_allocated(backend, index)?;
        self.handle(index).ok_or(ChannelError::Missing(index))
    }

    /// Registers a buffer channel without allocating its targets.
    ///
    /// Targets are created on first write. If the channel already exists at a
    /// different resolution it is reallocated immediately.
    pub fn declare_buffer(
        &mut self,
        backend: &mut B,
        index: u8,
        sizing: Sizing,
    ) -> Result<ChannelHandle, ChannelError> {
        check_range(index)?;
        let resolution = self.resolve(sizing);
        match self.channels.get_mut(&index) {
            Some(channel) if channel.kind != ChannelKind::Buffer => {
                return Err(ChannelError::KindConflict {
                    index,
                    existing: channel.kind,
                });
            }
            Some(channel) => {
                channel.sizing = sizing;
                self.resize_channel(backend, index, resolution)?;
            }
            None => {
                tracing::debug!(channel = index, %resolution, "declared buffer channel");
                self.channels.insert(
                    index,
                    Channel {
                        kind: ChannelKind::Buffer,
                        resolution,
                        sizing,
                        sampling: Sampling::default(),
                        storage: Storage::PingPong {
                            targets: None,
                            front: 0,
                            flipped: false,
                        },
                        failed: false,
                    },
                );
            }
        }
        self.handle(index).ok_or(ChannelError::Missing(index))
    }

    /// Allocates both targets of a declared buffer channel if still missing.
    ///
    /// Either both targets exist afterwards or neither does.
    pub fn ensure_allocated(&mut self, backend: &mut B, index: u8) -> Result<(), ChannelError> {
        let format = self.buffer_format;
        let channel = self
            .channels
            .get_mut(&index)
            .ok_or(ChannelError::Missing(index))?;
        let Storage::PingPong { targets, front, .. } = &mut channel.storage else {
            return Ok(());
        };
        if targets.is_some() {
            return Ok(());
        }
        match allocate_pair(backend, index, channel.resolution, format) {
            Ok(pair) => {
                *targets = Some(pair);
                *front = 0;
                channel.failed = false;
                tracing::debug!(
                    channel = index,
                    resolution = %channel.resolution,
                    ?format,
                    "allocated ping-pong targets"
                );
                Ok(())
            }
            Err(err) => {
                if !channel.failed {
                    tracing::warn!(channel = index, error = %err, "buffer channel allocation failed");
                }
                channel.failed = true;
                Err(err.into())
            }
        }
    }

    /// Creates (or recreates) a single-texture media channel.
    pub fn create_media_channel(
        &mut self,
        backend: &mut B,
        index: u8,
        kind: ChannelKind,
        resolution: Resolution,
        sampling: Sampling,
    ) -> Result<ChannelHandle, ChannelError> {
        check_range(index)?;
        let resolution = resolution.clamped();
        if let Some(existing) = self.channels.get_mut(&index) {
            if existing.kind != kind || kind.is_buffer() {
                return Err(ChannelError::KindConflict {
                    index,
                    existing: existing.kind,
                });
            }
            existing.sampling = sampling;
            if existing.resolution == resolution {
                return self.handle(index).ok_or(ChannelError::Missing(index));
            }
            self.destroy(backend, index);
        } else if kind.is_buffer() {
            return Err(ChannelError::KindConflict {
                index,
                existing: ChannelKind::Buffer,
            });
        }

        let texture = backend.allocate(&TextureDesc {
            label: format!("channel {index} {kind}"),
            resolution,
            format: TexelFormat::Rgba8,
            renderable: false,
        })?;
        tracing::debug!(channel = index, %kind, %resolution, "created media channel");
        self.channels.insert(
            index,
            Channel {
                kind,
                resolution,
                sizing: Sizing::Fixed(resolution),
                sampling,
                storage: Storage::Single(texture),
                failed: false,
            },
        );
        self.handle(index).ok_or(ChannelError::Missing(index))
    }

    /// Refreshes a media channel from tightly packed RGBA8 texels.
    pub fn upload(&self, backend: &mut B, index: u8, texels: &[u8]) -> Result<(), ChannelError> {
        let channel = self.channels.get(&index).ok_or(ChannelError::Missing(index))?;
        let Storage::Single(texture) = &channel.storage else {
            return Err(ChannelError::KindConflict {
                index,
                existing: channel.kind,
            });
        };
        let expected = channel.resolution.texel_count() * TexelFormat::Rgba8.bytes_per_texel();
        if texels.len() != expected {
            return Err(ChannelError::TexelSize {
                index,
                expected,
                actual: texels.len(),
            });
        }
        backend.upload(texture, texels);
        Ok(())
    }

    /// Currently readable texture: the front target of a buffer or the single media texture.
    pub fn front_texture(&self, index: u8) -> Option<&B::Target> {
        self.channels.get(&index).and_then(Channel::front)
    }

    /// Target the next draw into `index` writes.
    pub fn back_texture(&self, index: u8) -> Option<&B::Target> {
        match &self.channels.get(&index)?.storage {
            Storage::PingPong {
                targets: Some(pair),
                front,
                ..
            } => Some(&pair[1 - *front]),
            _ => None,
        }
    }

    /// Texture bound for a sampler reading `index`, falling back to a placeholder.
    ///
    /// Missing channels, unallocated buffers and dimension mismatches all bind
    /// the placeholder of the declared dimensionality.
    pub fn binding_texture(&self, index: u8, dim: SamplerDim) -> &B::Target {
        self.channels
            .get(&index)
            .filter(|channel| channel.resolution.dimension() == dim)
            .and_then(Channel::front)
            .unwrap_or_else(|| self.placeholder(dim))
    }

    pub fn placeholder(&self, dim: SamplerDim) -> &B::Target {
        match dim {
            SamplerDim::D2 => &self.placeholders.flat,
            SamplerDim::D3 => &self.placeholders.volume,
        }
    }

    /// Swaps front and back after a pass finished writing.
    ///
    /// Only the first flip of a channel between two [`begin_frame`](Self::begin_frame)
    /// calls has an effect; returns whether the bit changed.
    pub fn flip(&mut self, index: u8) -> bool {
        let Some(channel) = self.channels.get_mut(&index) else {
            return false;
        };
        match &mut channel.storage {
            Storage::PingPong {
                targets: Some(_),
                front,
                flipped,
            } if !*flipped => {
                *front = 1 - *front;
                *flipped = true;
                true
            }
            _ => false,
        }
    }

    /// Re-arms [`flip`](Self::flip) for a new frame.
    pub fn begin_frame(&mut self) {
        for channel in self.channels.values_mut() {
            if let Storage::PingPong { flipped, .. } = &mut channel.storage {
                *flipped = false;
            }
        }
    }

    /// Index of the front target of a buffer channel (0 or 1).
    pub fn front_index(&self, index: u8) -> Option<usize> {
        match &self.channels.get(&index)?.storage {
            Storage::PingPong { front, .. } => Some(*front),
            Storage::Single(_) => None,
        }
    }

    pub fn resolution(&self, index: u8) -> Option<Resolution> {
        self.channels.get(&index).map(|channel| channel.resolution)
    }

    pub fn kind(&self, index: u8) -> Option<ChannelKind> {
        self.channels.get(&index).map(|channel| channel.kind)
    }

    pub fn sampling(&self, index: u8) -> Sampling {
        self.channels
            .get(&index)
            .map(|channel| channel.sampling)
            .unwrap_or_default()
    }

    pub fn set_sampling(&mut self, index: u8, sampling: Sampling) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get_mut(&index)
            .ok_or(ChannelError::Missing(index))?;
        channel.sampling = sampling;
        Ok(())
    }

    /// Dimensionality a program should declare for a sampler on `index`.
    pub fn sampler_dim(&self, index: u8) -> SamplerDim {
        self.resolution(index)
            .map(|resolution| resolution.dimension())
            .unwrap_or(SamplerDim::D2)
    }

    pub fn is_allocated(&self, index: u8) -> bool {
        self.front_texture(index).is_some()
    }

    /// Whether the last allocation attempt for this channel failed.
    pub fn is_failed(&self, index: u8) -> bool {
        self.channels
            .get(&index)
            .map(|channel| channel.failed)
            .unwrap_or(false)
    }

    pub fn handle(&self, index: u8) -> Option<ChannelHandle> {
        self.channels.get(&index).map(|channel| ChannelHandle {
            index,
            kind: channel.kind,
            resolution: channel.resolution,
        })
    }

    pub fn handles(&self) -> impl Iterator<Item = ChannelHandle> + '_ {
        self.channels.iter().map(|(index, channel)| ChannelHandle {
            index: *index,
            kind: channel.kind,
            resolution: channel.resolution,
        })
    }

    /// Moves a buffer channel to `resolution`.
    ///
    /// Same resolution is a no-op returning `false`. Otherwise allocated
    /// targets are destroyed and reallocated at the new size with the front
    /// bit reset to 0. Unallocated channels only record the new size unless
    /// their last allocation failed, in which case it is retried.
    pub fn resize_channel(
        &mut self,
        backend: &mut B,
        index: u8,
        resolution: Resolution,
    ) -> Result<bool, ChannelError> {
        let resolution = resolution.clamped();
        let channel = self
            .channels
            .get_mut(&index)
            .ok_or(ChannelError::Missing(index))?;
        if channel.resolution == resolution {
            return Ok(false);
        }
        let Storage::PingPong { targets, front, .. } = &mut channel.storage else {
            return Err(ChannelError::KindConflict {
                index,
                existing: channel.kind,
            });
        };

        let previous = channel.resolution;
        channel.resolution = resolution;
        *front = 0;
        let old = targets.take();
        // A channel that failed to allocate retries at the new size.
        if old.is_none() && !channel.failed {
            return Ok(true);
        }
        for target in old.into_iter().flatten() {
            backend.destroy(target);
        }
        tracing::debug!(channel = index, from = %previous, to = %resolution, "reallocating buffer channel");
        self.ensure_allocated(backend, index)?;
        Ok(true)
    }

    /// Records a new surface size and reallocates every surface-sized buffer.
    ///
    /// Returns the channels whose reallocation failed.
    pub fn set_surface(&mut self, backend: &mut B, surface: Resolution) -> Vec<(u8, ChannelError)> {
        let surface = surface.clamped();
        self.surface = surface;
        let tied: Vec<u8> = self
            .channels
            .iter()
            .filter(|(_, channel)| channel.kind.is_buffer() && channel.sizing == Sizing::Surface)
            .map(|(index, _)| *index)
            .collect();

        let mut failures = Vec::new();
        for index in tied {
            if let Err(err) = self.resize_channel(backend, index, surface) {
                failures.push((index, err));
            }
        }
        failures
    }

    /// Points every buffer channel's front bit back at target 0 without reallocating.
    pub fn reset_ping_pong(&mut self) {
        for channel in self.channels.values_mut() {
            if let Storage::PingPong { front, flipped, .. } = &mut channel.storage {
                *front = 0;
                *flipped = false;
            }
        }
    }

    /// Removes a channel and releases its textures immediately.
    pub fn destroy(&mut self, backend: &mut B, index: u8) -> bool {
        let Some(channel) = self.channels.remove(&index) else {
            return false;
        };
        match channel.storage {
            Storage::PingPong {
                targets: Some(pair),
                ..
            } => {
                for target in pair {
                    backend.destroy(target);
                }
            }
            Storage::PingPong { targets: None, .. } => {}
            Storage::Single(texture) => backend.destroy(texture),
        }
        tracing::debug!(channel = index, kind = %channel.kind, "destroyed channel");
        true
    }

    fn resolve(&self, sizing: Sizing) -> Resolution {
        match sizing {
            Sizing::Surface => self.surface,
            Sizing::Fixed(resolution) => resolution.clamped(),
        }
    }
}

fn check_range(index: u8) -> Result<(), ChannelError> {
    if (index as usize) < MAX_CHANNELS {
        Ok(())
    } else {
        Err(ChannelError::OutOfRange(index))
    }
}

fn allocate_pair<B: GpuBackend>(
    backend: &mut B,
    index: u8,
    resolution: Resolution,
    format: TexelFormat,
) -> Result<[B::Target; 2], AllocError> {
    let desc = |slot: usize| TextureDesc {
        label: format!("channel {index} buffer {slot}"),
        resolution,
        format,
        renderable: true,
    };
    let first = backend.allocate(&desc(0))?;
    match backend.allocate(&desc(1)) {
        Ok(second) => Ok([first, second]),
        Err(err) => {
            backend.destroy(first);
            Err(err)
        }
    }
}

fn allocate_placeholder<B: GpuBackend>(
    backend: &mut B,
    resolution: Resolution,
) -> Result<B::Target, AllocError> {
    let texture = backend.allocate(&TextureDesc {
        label: format!("placeholder {resolution}"),
        resolution,
        format: TexelFormat::Rgba8,
        renderable: false,
    })?;
    backend.upload(&texture, &[0, 0, 0, 0]);
    Ok(texture)
}
