use std::fmt;

use crate::backend::SamplerSlot;
use crate::channels::ChannelError;
use crate::compile::{BuildTicket, PreparedProgram};
use crate::diagnostics::Diagnostic;
use crate::types::Sizing;

/// Stable identifier of a pass, e.g. `"Image"` or `"Buffer A"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(String);

impl PassId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PassId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PassId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a compile request was not applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("shader failed to compile ({} diagnostic(s))", .0.len())]
    Diagnostics(Vec<Diagnostic>),
    #[error("channel {channel} is already written by pass `{owner}`")]
    ChannelConflict { channel: u8, owner: PassId },
    #[error("output channel {0} is outside the supported range (0-15)")]
    ChannelOutOfRange(u8),
    #[error("output channel {channel} is unusable: {source}")]
    Allocation {
        channel: u8,
        #[source]
        source: ChannelError,
    },
}

/// What a successful compile request did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompileOutcome {
    /// The new program is active; carries its required-channel set.
    Linked { required: Vec<u8> },
    /// Empty source on a non-primary pass removed the pass.
    Removed,
    /// A worker thread is building the program; the result arrives as an event.
    Queued,
}

/// A successfully linked program together with its binding metadata.
pub struct LinkedProgram<P> {
    pub program: P,
    pub required: Vec<u8>,
    pub samplers: Vec<SamplerSlot>,
    pub injected_lines: usize,
}

impl<P> LinkedProgram<P> {
    pub(crate) fn new(program: P, prepared: &PreparedProgram) -> Self {
        Self {
            program,
            required: prepared.required.clone(),
            samplers: prepared.source.samplers.clone(),
            injected_lines: prepared.injected_lines,
        }
    }
}

/// A build running on a worker, with what to apply once it links.
pub(crate) struct PendingBuild<P> {
    pub ticket: BuildTicket<P>,
    pub prepared: PreparedProgram,
    pub output: u8,
    pub sizing: Sizing,
}

/// One pass: an output channel, the active program and at most one pending build.
pub(crate) struct Pass<P> {
    pub id: PassId,
    pub output: u8,
    pub sizing: Sizing,
    /// Declaration order, used to break ordering ties.
    pub seq: u64,
    pub source: String,
    pub active: Option<LinkedProgram<P>>,
    pub pending: Option<PendingBuild<P>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<P> Pass<P> {
    pub fn new(id: PassId, output: u8, sizing: Sizing, seq: u64) -> Self {
        Self {
            id,
            output,
            sizing,
            seq,
            source: String::new(),
            active: None,
            pending: None,
            diagnostics: Vec::new(),
        }
    }

    /// Replaces the active program, handing back the previous one.
    pub fn swap(&mut self, linked: LinkedProgram<P>) -> Option<LinkedProgram<P>> {
        self.diagnostics.clear();
        self.active.replace(linked)
    }

    pub fn is_primary(&self) -> bool {
        self.output == crate::types::PRIMARY_CHANNEL
    }
}

/// Read-only view of a pass for hosts and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassInfo {
    pub id: PassId,
    pub output: u8,
    pub required: Vec<u8>,
    pub linked: bool,
    pub pending: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl<P> From<&Pass<P>> for PassInfo {
    fn from(pass: &Pass<P>) -> Self {
        Self {
            id: pass.id.clone(),
            output: pass.output,
            required: pass
                .active
                .as_ref()
                .map(|linked| linked.required.clone())
                .unwrap_or_default(),
            linked: pass.active.is_some(),
            pending: pass.pending.is_some(),
            diagnostics: pass.diagnostics.clone(),
        }
    }
}
