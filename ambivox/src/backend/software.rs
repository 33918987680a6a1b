//! In-process mixing backend.
//!
//! [`SoftwareBackend`] keeps every source, buffer and listener parameter in a
//! shared [`MixState`]. A [`SoftwareMixer`] handle renders that state into
//! interleaved frames, typically from a device callback driven by
//! [`OutputStream`](super::OutputStream). Without an output stream attached
//! the backend still behaves like a device whose clock never advances, which
//! is what headless hosts and tests want.
//!
//! Spatialization is deliberately simple: distance attenuation following the
//! selected [`DistanceModel`] and equal-power panning of mono sources in
//! listener space. Stereo buffers bypass spatialization.

use super::{
    AudioBackend, BackendCaps, BufferData, BufferId, DeviceRequest, DistanceModel, FilterId,
    FilterKind, ListenerParam, PlaybackState, SourceId, SourceParam,
};
use crate::error::{AmbivoxError, Result};
use crate::math::{Pose, Quat, Vec3};
use std::collections::{HashMap, VecDeque};
use std::f32::consts::FRAC_PI_4;
use std::sync::{Arc, Mutex};

/// Limits of the software backend.
#[derive(Debug, Clone)]
pub struct SoftwareBackendDesc {
    /// Hard cap on simultaneously existing sources
    pub max_voices: usize,
    /// Stereo voices are reported out of `max_voices`
    pub stereo_voices: usize,
}

impl Default for SoftwareBackendDesc {
    fn default() -> Self {
        Self {
            max_voices: 64,
            stereo_voices: 4,
        }
    }
}

#[derive(Debug)]
struct SoftBuffer {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl SoftBuffer {
    fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Returns (left, right) for a frame, duplicating mono.
    fn frame(&self, index: usize) -> (f32, f32) {
        let channels = self.channels.max(1) as usize;
        let base = index * channels;
        match channels {
            1 => {
                let s = self.samples.get(base).copied().unwrap_or(0.0);
                (s, s)
            }
            _ => (
                self.samples.get(base).copied().unwrap_or(0.0),
                self.samples.get(base + 1).copied().unwrap_or(0.0),
            ),
        }
    }
}

#[derive(Debug)]
struct SoftSource {
    state: PlaybackState,
    static_buffer: Option<u32>,
    queue: VecDeque<u32>,
    queue_index: usize,
    cursor: f64,
    looping: bool,
    relative: bool,
    position: Vec3,
    gain: f32,
    pitch: f32,
    reference_distance: f32,
    rolloff_factor: f32,
    max_distance: f32,
    direct_filter: Option<u32>,
}

impl Default for SoftSource {
    fn default() -> Self {
        Self {
            state: PlaybackState::Initial,
            static_buffer: None,
            queue: VecDeque::new(),
            queue_index: 0,
            cursor: 0.0,
            looping: false,
            relative: false,
            position: Vec3::ZERO,
            gain: 1.0,
            pitch: 1.0,
            reference_distance: 1.0,
            rolloff_factor: 1.0,
            max_distance: f32::MAX,
            direct_filter: None,
        }
    }
}

impl SoftSource {
    fn current_buffer(&self) -> Option<u32> {
        if self.queue.is_empty() {
            self.static_buffer
        } else {
            self.queue.get(self.queue_index).copied()
        }
    }

    fn reset_cursor(&mut self) {
        self.cursor = 0.0;
        self.queue_index = 0;
    }
}

/// Everything the mixer reads. Shared between the backend and its mixers.
#[derive(Debug, Default)]
pub(crate) struct MixState {
    open: bool,
    frequency: u32,
    next_id: u32,
    buffers: HashMap<u32, Arc<SoftBuffer>>,
    sources: HashMap<u32, SoftSource>,
    filters: HashMap<u32, FilterKind>,
    listener_pose: Pose,
    listener_gain: f32,
    distance_model: DistanceModel,
    doppler_factor: f32,
    speed_of_sound: f32,
}

impl MixState {
    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn distance_gain(&self, source: &SoftSource, distance: f32) -> f32 {
        let reference = source.reference_distance.max(f32::EPSILON);
        let rolloff = source.rolloff_factor;
        let max = source.max_distance;
        let clamped = distance.clamp(reference, max.max(reference));
        let gain = match self.distance_model {
            DistanceModel::None => 1.0,
            DistanceModel::Inverse => {
                let denom = reference + rolloff * (distance - reference);
                if denom <= 0.0 { 1.0 } else { reference / denom }
            }
            DistanceModel::InverseClamped => {
                let denom = reference + rolloff * (clamped - reference);
                if denom <= 0.0 { 1.0 } else { reference / denom }
            }
            DistanceModel::Linear | DistanceModel::LinearClamped => {
                let d = if self.distance_model == DistanceModel::LinearClamped {
                    clamped
                } else {
                    distance.min(max)
                };
                let span = max - reference;
                if span <= 0.0 {
                    1.0
                } else {
                    1.0 - rolloff * (d - reference) / span
                }
            }
            DistanceModel::Exponent => (distance.max(f32::EPSILON) / reference).powf(-rolloff),
            DistanceModel::ExponentClamped => (clamped / reference).powf(-rolloff),
        };
        gain.clamp(0.0, 1.0)
    }

    /// Per-channel gains for one source over a whole render block.
    fn channel_gains(&self, source: &SoftSource, buffer: &SoftBuffer) -> (f32, f32) {
        let filter_gain = source
            .direct_filter
            .and_then(|id| self.filters.get(&id))
            .map(|filter| filter.gain())
            .unwrap_or(1.0);
        let base = source.gain.max(0.0) * self.listener_gain * filter_gain;

        if buffer.channels >= 2 {
            return (base, base);
        }

        let local = if source.relative {
            source.position
        } else {
            self.listener_pose.to_local(source.position)
        };
        let distance = local.length();
        let attenuation = self.distance_gain(source, distance);
        let pan = if distance > f32::EPSILON {
            (local.x / distance).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let angle = (pan + 1.0) * FRAC_PI_4;
        (base * attenuation * angle.cos(), base * attenuation * angle.sin())
    }

    fn mix_source(&mut self, id: u32, out: &mut [f32], channels: usize) -> usize {
        let (left_gain, right_gain, step) = {
            let Some(source) = self.sources.get(&id) else {
                return 0;
            };
            let Some(buffer) = source.current_buffer().and_then(|b| self.buffers.get(&b)) else {
                return 0;
            };
            let (l, r) = self.channel_gains(source, buffer);
            let step =
                source.pitch as f64 * buffer.sample_rate as f64 / self.frequency.max(1) as f64;
            (l, r, step)
        };

        let frame_count = out.len() / channels;
        let mut frames_filled = 0;
        for frame_idx in 0..frame_count {
            let Some(source) = self.sources.get_mut(&id) else {
                break;
            };
            let sample = loop {
                if source.state != PlaybackState::Playing {
                    break None;
                }
                let Some(buffer) = source.current_buffer().and_then(|b| self.buffers.get(&b))
                else {
                    source.state = PlaybackState::Stopped;
                    break None;
                };
                let frames = buffer.frames();
                if frames == 0 {
                    source.state = PlaybackState::Stopped;
                    break None;
                }
                let index = source.cursor as usize;
                if index < frames {
                    break Some(buffer.frame(index));
                }
                advance_past_end(source, frames);
            };
            let Some((left, right)) = sample else {
                break;
            };

            let base = frame_idx * channels;
            if channels == 1 {
                out[base] += 0.5 * (left * left_gain + right * right_gain);
            } else {
                out[base] += left * left_gain;
                out[base + 1] += right * right_gain;
            }
            source.cursor += step;
            frames_filled += 1;
        }
        frames_filled
    }
}

/// Moves a source past the end of its current buffer: next queued chunk,
/// loop back to the start, or stop.
fn advance_past_end(source: &mut SoftSource, frames: usize) {
    source.cursor -= frames as f64;
    if source.cursor < 0.0 {
        source.cursor = 0.0;
    }
    if !source.queue.is_empty() && source.queue_index + 1 < source.queue.len() {
        source.queue_index += 1;
        return;
    }
    if source.looping {
        source.queue_index = 0;
        return;
    }
    source.state = PlaybackState::Stopped;
    source.reset_cursor();
}

/// Renders the shared mix state into interleaved output frames.
#[derive(Clone)]
pub struct SoftwareMixer {
    shared: Arc<Mutex<MixState>>,
}

impl SoftwareMixer {
    /// Output frequency the backend was opened with (0 before `open`).
    pub fn frequency(&self) -> u32 {
        self.shared.lock().map(|s| s.frequency).unwrap_or(0)
    }

    /// Mixes every playing source into `out`, overwriting it.
    ///
    /// Never blocks: if the state is being updated by the tick thread the
    /// block is rendered as silence. Returns the number of frames produced by
    /// the busiest source.
    pub fn render(&self, out: &mut [f32], channels: u16) -> usize {
        out.fill(0.0);
        let channels = channels.max(1) as usize;
        let Ok(mut state) = self.shared.try_lock() else {
            log::warn!("Failed to acquire mix state lock in render");
            return 0;
        };
        if !state.open {
            return 0;
        }

        let playing: Vec<u32> = state
            .sources
            .iter()
            .filter(|(_, s)| s.state == PlaybackState::Playing)
            .map(|(id, _)| *id)
            .collect();

        let mut frames_filled_max = 0;
        for id in playing {
            let frames = state.mix_source(id, out, channels);
            frames_filled_max = frames_filled_max.max(frames);
        }
        frames_filled_max
    }
}

/// Backend that mixes in software. See the module docs.
pub struct SoftwareBackend {
    desc: SoftwareBackendDesc,
    shared: Arc<Mutex<MixState>>,
}

impl SoftwareBackend {
    pub fn new(desc: SoftwareBackendDesc) -> Self {
        Self {
            desc,
            shared: Arc::new(Mutex::new(MixState {
                listener_gain: 1.0,
                doppler_factor: 1.0,
                speed_of_sound: 343.3,
                ..Default::default()
            })),
        }
    }

    /// Handle that renders this backend's output.
    pub fn mixer(&self) -> SoftwareMixer {
        SoftwareMixer {
            shared: self.shared.clone(),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MixState> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_source(&mut self, source: SourceId, f: impl FnOnce(&mut SoftSource)) {
        match self.state().sources.get_mut(&source.0) {
            Some(s) => f(s),
            None => log::warn!("Software backend: unknown source {}", source),
        }
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new(SoftwareBackendDesc::default())
    }
}

impl AudioBackend for SoftwareBackend {
    fn open(&mut self, request: &DeviceRequest) -> Result<BackendCaps> {
        if request.frequency == 0 {
            return Err(AmbivoxError::AudioDevice(
                "Requested frequency must be greater than 0".into(),
            ));
        }
        let stereo = request.stereo_voices.min(self.desc.stereo_voices);
        let mono = request
            .mono_voices
            .min(self.desc.max_voices.saturating_sub(stereo));

        let mut state = self.state();
        state.open = true;
        state.frequency = request.frequency;
        log::info!(
            "Software backend opened at {} Hz ({} mono + {} stereo voices)",
            request.frequency,
            mono,
            stereo
        );

        Ok(BackendCaps {
            frequency: request.frequency,
            max_mono_voices: mono,
            max_stereo_voices: stereo,
            max_auxiliary_sends: 0,
            vendor: "ambivox".into(),
            renderer: "software mixer".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            extensions: vec!["direct-filter".into()],
        })
    }

    fn close(&mut self) {
        let mut state = self.state();
        state.open = false;
        state.sources.clear();
        state.buffers.clear();
        state.filters.clear();
        log::info!("Software backend closed");
    }

    fn create_buffer(&mut self, data: &BufferData<'_>) -> Result<BufferId> {
        if data.channels == 0 || data.channels > 2 {
            return Err(AmbivoxError::AudioFormat(format!(
                "Software backend supports mono or stereo buffers, got {} channels",
                data.channels
            )));
        }
        if data.sample_rate == 0 {
            return Err(AmbivoxError::AudioFormat("Buffer sample rate is 0".into()));
        }
        let mut state = self.state();
        if !state.open {
            return Err(AmbivoxError::Backend("Device is not open".into()));
        }
        let id = state.allocate_id();
        state.buffers.insert(
            id,
            Arc::new(SoftBuffer {
                samples: data.samples.to_vec(),
                channels: data.channels,
                sample_rate: data.sample_rate,
            }),
        );
        Ok(BufferId(id))
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.state().buffers.remove(&buffer.0);
    }

    fn create_source(&mut self) -> Result<SourceId> {
        let max = self.desc.max_voices;
        let mut state = self.state();
        if !state.open {
            return Err(AmbivoxError::Backend("Device is not open".into()));
        }
        if state.sources.len() >= max {
            return Err(AmbivoxError::Backend(format!(
                "Source limit of {} reached",
                max
            )));
        }
        let id = state.allocate_id();
        state.sources.insert(id, SoftSource::default());
        Ok(SourceId(id))
    }

    fn delete_source(&mut self, source: SourceId) {
        self.state().sources.remove(&source.0);
    }

    fn play(&mut self, source: SourceId) {
        self.with_source(source, |s| {
            if s.state != PlaybackState::Paused {
                s.reset_cursor();
            }
            s.state = if s.current_buffer().is_some() {
                PlaybackState::Playing
            } else {
                PlaybackState::Stopped
            };
        });
    }

    fn pause(&mut self, source: SourceId) {
        self.with_source(source, |s| {
            if s.state == PlaybackState::Playing {
                s.state = PlaybackState::Paused;
            }
        });
    }

    fn stop(&mut self, source: SourceId) {
        self.with_source(source, |s| {
            if s.state != PlaybackState::Initial {
                s.state = PlaybackState::Stopped;
            }
            s.reset_cursor();
        });
    }

    fn rewind(&mut self, source: SourceId) {
        self.with_source(source, |s| {
            s.state = PlaybackState::Initial;
            s.reset_cursor();
        });
    }

    fn source_state(&self, source: SourceId) -> PlaybackState {
        self.state()
            .sources
            .get(&source.0)
            .map(|s| s.state)
            .unwrap_or(PlaybackState::Initial)
    }

    fn set_buffer(&mut self, source: SourceId, buffer: Option<BufferId>) {
        self.with_source(source, |s| {
            s.queue.clear();
            s.static_buffer = buffer.map(|b| b.0);
            s.reset_cursor();
        });
    }

    fn queue_buffers(&mut self, source: SourceId, buffers: &[BufferId]) {
        self.with_source(source, |s| {
            s.static_buffer = None;
            s.queue.extend(buffers.iter().map(|b| b.0));
        });
    }

    fn unqueue_all(&mut self, source: SourceId) {
        self.with_source(source, |s| {
            s.queue.clear();
            s.reset_cursor();
        });
    }

    fn set_source_param(&mut self, source: SourceId, param: SourceParam) {
        self.with_source(source, |s| match param {
            SourceParam::Position(p) => s.position = p,
            SourceParam::Gain(g) => s.gain = g,
            SourceParam::Pitch(p) => s.pitch = p,
            SourceParam::Looping(l) => s.looping = l,
            SourceParam::Relative(r) => s.relative = r,
            SourceParam::ReferenceDistance(d) => s.reference_distance = d,
            SourceParam::RolloffFactor(r) => s.rolloff_factor = r,
            SourceParam::MaxDistance(d) => s.max_distance = d,
            // Doppler and cones are not rendered by the software mixer.
            SourceParam::Velocity(_)
            | SourceParam::Direction(_)
            | SourceParam::ConeInnerAngle(_)
            | SourceParam::ConeOuterAngle(_)
            | SourceParam::ConeOuterGain(_) => {}
        });
    }

    fn set_listener_param(&mut self, param: ListenerParam) {
        let mut state = self.state();
        match param {
            ListenerParam::Position(p) => state.listener_pose.position = p,
            ListenerParam::Orientation { forward, up } => {
                state.listener_pose.rotation = orientation_to_rotation(forward, up);
            }
            ListenerParam::Gain(g) => state.listener_gain = g,
            ListenerParam::Velocity(_) => {}
        }
    }

    fn set_doppler_factor(&mut self, factor: f32) {
        self.state().doppler_factor = factor;
    }

    fn set_speed_of_sound(&mut self, speed: f32) {
        self.state().speed_of_sound = speed;
    }

    fn set_distance_model(&mut self, model: DistanceModel) {
        self.state().distance_model = model;
    }

    fn create_filter(&mut self, kind: &FilterKind) -> Result<FilterId> {
        let mut state = self.state();
        let id = state.allocate_id();
        state.filters.insert(id, *kind);
        Ok(FilterId(id))
    }

    fn delete_filter(&mut self, filter: FilterId) {
        self.state().filters.remove(&filter.0);
    }

    fn set_direct_filter(&mut self, source: SourceId, filter: Option<FilterId>) {
        self.with_source(source, |s| s.direct_filter = filter.map(|f| f.0));
    }
}

/// Rotation whose forward axis is `forward` and whose up axis is as close to
/// `up` as the forward axis allows.
fn orientation_to_rotation(forward: Vec3, up: Vec3) -> Quat {
    let forward = forward.normalize_or_zero();
    if forward == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    let right = forward.cross(up).normalize_or_zero();
    if right == Vec3::ZERO {
        return Quat::from_rotation_arc(-Vec3::Z, forward);
    }
    let up = right.cross(forward);
    Quat::from_mat3(&glam::Mat3::from_cols(right, up, -forward))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_backend(max_voices: usize) -> SoftwareBackend {
        let mut backend = SoftwareBackend::new(SoftwareBackendDesc {
            max_voices,
            stereo_voices: 0,
        });
        backend
            .open(&DeviceRequest {
                frequency: 100,
                mono_voices: max_voices,
                stereo_voices: 0,
                enable_effects: false,
            })
            .unwrap();
        backend
    }

    fn constant_buffer(backend: &mut SoftwareBackend, frames: usize) -> BufferId {
        let samples = vec![1.0; frames];
        backend
            .create_buffer(&BufferData {
                samples: &samples,
                channels: 1,
                sample_rate: 100,
            })
            .unwrap()
    }

    #[test]
    fn test_source_limit_is_enforced() {
        let mut backend = open_backend(2);
        assert!(backend.create_source().is_ok());
        assert!(backend.create_source().is_ok());
        assert!(backend.create_source().is_err());
    }

    #[test]
    fn test_centered_relative_source_pans_equally() {
        let mut backend = open_backend(1);
        let source = backend.create_source().unwrap();
        let buffer = constant_buffer(&mut backend, 16);
        backend.set_source_param(source, SourceParam::Relative(true));
        backend.set_source_param(source, SourceParam::Gain(0.5));
        backend.set_buffer(source, Some(buffer));
        backend.play(source);

        let mixer = backend.mixer();
        let mut out = vec![0.0; 8];
        assert_eq!(mixer.render(&mut out, 2), 4);
        let expected = 0.5 * FRAC_PI_4.cos();
        assert!((out[0] - expected).abs() < 1e-5);
        assert!((out[1] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_source_stops_at_end_without_looping() {
        let mut backend = open_backend(1);
        let source = backend.create_source().unwrap();
        let buffer = constant_buffer(&mut backend, 4);
        backend.set_buffer(source, Some(buffer));
        backend.play(source);

        let mut out = vec![0.0; 20];
        backend.mixer().render(&mut out, 2);
        assert_eq!(backend.source_state(source), PlaybackState::Stopped);
    }

    #[test]
    fn test_looping_source_keeps_playing() {
        let mut backend = open_backend(1);
        let source = backend.create_source().unwrap();
        let buffer = constant_buffer(&mut backend, 4);
        backend.set_buffer(source, Some(buffer));
        backend.set_source_param(source, SourceParam::Looping(true));
        backend.play(source);

        let mut out = vec![0.0; 40];
        backend.mixer().render(&mut out, 2);
        assert_eq!(backend.source_state(source), PlaybackState::Playing);
    }

    #[test]
    fn test_queue_advances_through_chunks() {
        let mut backend = open_backend(1);
        let source = backend.create_source().unwrap();
        let first = constant_buffer(&mut backend, 4);
        let second = constant_buffer(&mut backend, 4);
        backend.queue_buffers(source, &[first, second]);
        backend.play(source);

        let mut out = vec![0.0; 12];
        backend.mixer().render(&mut out, 2);
        assert_eq!(backend.source_state(source), PlaybackState::Playing);
        let mut out = vec![0.0; 12];
        backend.mixer().render(&mut out, 2);
        assert_eq!(backend.source_state(source), PlaybackState::Stopped);
    }

    #[test]
    fn test_inverse_clamped_attenuation() {
        let mut backend = open_backend(1);
        let source = backend.create_source().unwrap();
        let buffer = constant_buffer(&mut backend, 16);
        backend.set_source_param(source, SourceParam::Position(Vec3::new(0.0, 0.0, -4.0)));
        backend.set_source_param(source, SourceParam::ReferenceDistance(2.0));
        backend.set_buffer(source, Some(buffer));
        backend.play(source);

        let mut out = vec![0.0; 2];
        backend.mixer().render(&mut out, 2);
        // 2 / (2 + 1 * (4 - 2)) = 0.5 before panning
        let expected = 0.5 * FRAC_PI_4.cos();
        assert!((out[0] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_orientation_round_trip() {
        let rotation = orientation_to_rotation(Vec3::X, Vec3::Y);
        let pose = Pose::new(Vec3::ZERO, rotation);
        assert!((pose.forward() - Vec3::X).length() < 1e-5);
        assert!((pose.up() - Vec3::Y).length() < 1e-5);
    }
}
