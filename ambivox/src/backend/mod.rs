//! Boundary to the hardware (or software) audio backend.
//!
//! The core never touches a device directly. Everything it needs from the
//! platform goes through [`AudioBackend`]: device lifetime, buffer upload,
//! playback channels ("sources"), listener and global parameters, and the
//! optional auxiliary effect objects.
//!
//! Capabilities are not queried through globals. [`AudioBackend::open`]
//! returns a [`BackendCaps`] value that the context stores and hands to
//! whoever needs it.

#[cfg(test)]
pub(crate) mod mock;
pub mod output;
pub mod software;

use crate::error::{AmbivoxError, Result};
use crate::math::Vec3;

pub use output::{OutputDesc, OutputStream};
pub use software::{SoftwareBackend, SoftwareBackendDesc, SoftwareMixer};

/// Backend handle of an uploaded sample buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Backend handle of a playback channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u32);

/// Backend handle of an auxiliary effect slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

/// Backend handle of an effect object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(pub u32);

/// Backend handle of a filter object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(pub u32);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SourceId({})", self.0)
    }
}

/// Playback state of a source as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Source exists but has never played (or was rewound)
    #[default]
    Initial,
    /// Source is producing sound
    Playing,
    /// Source is paused and keeps its cursor
    Paused,
    /// Source finished or was stopped
    Stopped,
}

/// Distance attenuation model applied to every non-relative source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceModel {
    None,
    Inverse,
    #[default]
    InverseClamped,
    Linear,
    LinearClamped,
    Exponent,
    ExponentClamped,
}

/// What the core asks for when opening the device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRequest {
    pub frequency: u32,
    pub mono_voices: usize,
    pub stereo_voices: usize,
    pub enable_effects: bool,
}

/// What the backend actually granted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendCaps {
    /// Output frequency in Hz
    pub frequency: u32,
    pub max_mono_voices: usize,
    pub max_stereo_voices: usize,
    /// Auxiliary sends per source; zero means no effect support
    pub max_auxiliary_sends: usize,
    pub vendor: String,
    pub renderer: String,
    pub version: String,
    pub extensions: Vec<String>,
}

impl BackendCaps {
    pub fn max_voices(&self) -> usize {
        self.max_mono_voices + self.max_stereo_voices
    }

    pub fn effects_available(&self) -> bool {
        self.max_auxiliary_sends > 0
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| ext == name)
    }
}

/// Interleaved f32 PCM handed to the backend for upload.
#[derive(Debug, Clone, Copy)]
pub struct BufferData<'a> {
    pub samples: &'a [f32],
    pub channels: u16,
    pub sample_rate: u32,
}

impl BufferData<'_> {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// A single per-source parameter push.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceParam {
    Position(Vec3),
    Velocity(Vec3),
    Direction(Vec3),
    Gain(f32),
    Pitch(f32),
    Looping(bool),
    Relative(bool),
    ReferenceDistance(f32),
    RolloffFactor(f32),
    MaxDistance(f32),
    ConeInnerAngle(f32),
    ConeOuterAngle(f32),
    ConeOuterGain(f32),
}

/// A single listener parameter push.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ListenerParam {
    Position(Vec3),
    Velocity(Vec3),
    Orientation { forward: Vec3, up: Vec3 },
    Gain(f32),
}

/// Reverb parameters, in the usual environmental-reverb units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbParams {
    pub density: f32,
    pub diffusion: f32,
    pub gain: f32,
    pub gain_hf: f32,
    pub decay_time: f32,
    pub decay_hf_ratio: f32,
    pub reflections_gain: f32,
    pub reflections_delay: f32,
    pub late_reverb_gain: f32,
    pub late_reverb_delay: f32,
}

/// Echo parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EchoParams {
    pub delay: f32,
    pub lr_delay: f32,
    pub damping: f32,
    pub feedback: f32,
    pub spread: f32,
}

/// Effect object description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectKind {
    Reverb(ReverbParams),
    Echo(EchoParams),
}

/// Filter object description. Gains are linear multipliers in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterKind {
    LowPass { gain: f32, gain_hf: f32 },
    HighPass { gain: f32, gain_lf: f32 },
    BandPass { gain: f32, gain_lf: f32, gain_hf: f32 },
}

impl FilterKind {
    /// Broadband gain of the filter.
    pub fn gain(&self) -> f32 {
        match self {
            Self::LowPass { gain, .. } | Self::HighPass { gain, .. } | Self::BandPass { gain, .. } => {
                *gain
            }
        }
    }
}

/// Everything the core needs from a playback backend.
///
/// All calls are synchronous and expected to be fast. Parameter pushes are
/// fire-and-forget; only object creation reports failure.
///
/// Effect methods have default implementations for backends without
/// auxiliary effect support; such backends should report
/// `max_auxiliary_sends == 0` from [`open`](Self::open).
pub trait AudioBackend: Send {
    /// Opens the device and context and reports the granted capabilities.
    fn open(&mut self, request: &DeviceRequest) -> Result<BackendCaps>;

    /// Closes the device. Every object created so far becomes invalid.
    fn close(&mut self);

    fn create_buffer(&mut self, data: &BufferData<'_>) -> Result<BufferId>;
    fn delete_buffer(&mut self, buffer: BufferId);

    fn create_source(&mut self) -> Result<SourceId>;
    fn delete_source(&mut self, source: SourceId);

    fn play(&mut self, source: SourceId);
    fn pause(&mut self, source: SourceId);
    fn stop(&mut self, source: SourceId);
    fn rewind(&mut self, source: SourceId);
    fn source_state(&self, source: SourceId) -> PlaybackState;

    /// Binds a single static buffer, or unbinds with `None`.
    fn set_buffer(&mut self, source: SourceId, buffer: Option<BufferId>);
    /// Appends buffers to the source's stream queue in order.
    fn queue_buffers(&mut self, source: SourceId, buffers: &[BufferId]);
    /// Removes every queued buffer from the source.
    fn unqueue_all(&mut self, source: SourceId);

    fn set_source_param(&mut self, source: SourceId, param: SourceParam);
    fn set_listener_param(&mut self, param: ListenerParam);

    fn set_doppler_factor(&mut self, factor: f32);
    fn set_speed_of_sound(&mut self, speed: f32);
    fn set_distance_model(&mut self, model: DistanceModel);

    fn create_effect_slot(&mut self) -> Result<SlotId> {
        Err(AmbivoxError::Unsupported("auxiliary effect slots".into()))
    }

    fn delete_effect_slot(&mut self, _slot: SlotId) {}

    fn create_effect(&mut self, _kind: &EffectKind) -> Result<EffectId> {
        Err(AmbivoxError::Unsupported("effects".into()))
    }

    fn delete_effect(&mut self, _effect: EffectId) {}

    fn create_filter(&mut self, _kind: &FilterKind) -> Result<FilterId> {
        Err(AmbivoxError::Unsupported("filters".into()))
    }

    fn delete_filter(&mut self, _filter: FilterId) {}

    /// Loads an effect into a slot, or empties the slot with `None`.
    fn attach_effect(&mut self, _slot: SlotId, _effect: Option<EffectId>) {}

    /// Routes auxiliary send `send` of `source` into `slot` through an
    /// optional filter. `slot == None` disables the send.
    fn set_send(
        &mut self,
        _source: SourceId,
        _send: usize,
        _slot: Option<SlotId>,
        _filter: Option<FilterId>,
    ) {
    }

    fn set_direct_filter(&mut self, _source: SourceId, _filter: Option<FilterId>) {}
}
