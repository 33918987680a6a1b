//! Voices: pooled playback channels and their state machine.
//!
//! A voice moves between [`PlaybackState::Initial`], `Playing`, `Paused` and
//! `Stopped`. Transitions are driven by the state the backend reports, so a
//! voice that finished on its own is seen as `Stopped` without any polling on
//! our side.
//!
//! [`Voice`] is the owning handle callers get from
//! [`AudioContext::allocate_voice`](crate::AudioContext::allocate_voice).
//! Dropping it returns the slot to the pool. The per-slot data lives in
//! [`VoiceState`] inside the context.

use crate::backend::{AudioBackend, BufferId, PlaybackState, SourceId, SourceParam};
use crate::context::AudioContext;
use crate::effects::{Effect, EffectSlot, Filter};
use crate::math::Vec3;
use crate::playback::{LoopMode, Playable};
use crate::pool::SlotKey;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const MIN_PITCH: f32 = 0.5;
pub const MAX_PITCH: f32 = 2.0;

/// Cached spatial and gain parameters of a voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParams {
    pub position: Vec3,
    pub velocity: Vec3,
    pub direction: Vec3,
    pub gain: f32,
    pub pitch: f32,
    pub reference_distance: f32,
    pub rolloff_factor: f32,
    pub max_distance: f32,
    pub cone_inner_angle: f32,
    pub cone_outer_angle: f32,
    pub cone_outer_gain: f32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            direction: Vec3::ZERO,
            gain: 1.0,
            pitch: 1.0,
            reference_distance: 1.0,
            rolloff_factor: 1.0,
            max_distance: f32::MAX,
            cone_inner_angle: 360.0,
            cone_outer_angle: 360.0,
            cone_outer_gain: 0.0,
        }
    }
}

impl VoiceParams {
    fn apply(&mut self, param: SourceParam) {
        match param {
            SourceParam::Position(p) => self.position = p,
            SourceParam::Velocity(v) => self.velocity = v,
            SourceParam::Direction(d) => self.direction = d,
            SourceParam::Gain(g) => self.gain = g,
            SourceParam::Pitch(p) => self.pitch = p,
            SourceParam::ReferenceDistance(d) => self.reference_distance = d,
            SourceParam::RolloffFactor(r) => self.rolloff_factor = r,
            SourceParam::MaxDistance(d) => self.max_distance = d,
            SourceParam::ConeInnerAngle(a) => self.cone_inner_angle = a,
            SourceParam::ConeOuterAngle(a) => self.cone_outer_angle = a,
            SourceParam::ConeOuterGain(g) => self.cone_outer_gain = g,
            SourceParam::Looping(_) | SourceParam::Relative(_) => {}
        }
    }

    fn to_source_params(self) -> [SourceParam; 11] {
        [
            SourceParam::Position(self.position),
            SourceParam::Velocity(self.velocity),
            SourceParam::Direction(self.direction),
            SourceParam::Gain(self.gain),
            SourceParam::Pitch(self.pitch),
            SourceParam::ReferenceDistance(self.reference_distance),
            SourceParam::RolloffFactor(self.rolloff_factor),
            SourceParam::MaxDistance(self.max_distance),
            SourceParam::ConeInnerAngle(self.cone_inner_angle),
            SourceParam::ConeOuterAngle(self.cone_outer_angle),
            SourceParam::ConeOuterGain(self.cone_outer_gain),
        ]
    }
}

/// Named playback flags of a voice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceFlags {
    pub looping: bool,
    pub relative: bool,
    /// The attached playable is bound as a buffer queue
    pub streaming: bool,
}

/// Per-slot voice data owned by the pool.
pub(crate) struct VoiceState {
    source: Option<SourceId>,
    params: VoiceParams,
    flags: VoiceFlags,
    saved_gain: Option<f32>,
    playable: Option<Arc<dyn Playable>>,
    direct_filter: Option<Arc<Filter>>,
    effect_slots: BTreeMap<usize, EffectSlot>,
}

impl VoiceState {
    pub fn new(source: Option<SourceId>) -> Self {
        Self {
            source,
            params: VoiceParams::default(),
            flags: VoiceFlags::default(),
            saved_gain: None,
            playable: None,
            direct_filter: None,
            effect_slots: BTreeMap::new(),
        }
    }

    pub fn source(&self) -> Option<SourceId> {
        self.source
    }

    pub fn params(&self) -> VoiceParams {
        self.params
    }

    pub fn flags(&self) -> VoiceFlags {
        self.flags
    }

    pub fn playable(&self) -> Option<Arc<dyn Playable>> {
        self.playable.clone()
    }

    pub fn state(&self, backend: &dyn AudioBackend) -> PlaybackState {
        self.source
            .map(|s| backend.source_state(s))
            .unwrap_or(PlaybackState::Initial)
    }

    /// Binds `playable` and starts it, stopping whatever was playing.
    pub fn play(
        &mut self,
        backend: &mut dyn AudioBackend,
        playable: Arc<dyn Playable>,
        mode: LoopMode,
    ) -> bool {
        let Some(source) = self.source else {
            log::warn!("Cannot play '{}': voice has no backend source", playable.name());
            return false;
        };
        if !playable.is_loaded() || playable.chunk_count() == 0 {
            log::warn!("Cannot play '{}': sound is not loaded", playable.name());
            return false;
        }

        if matches!(
            backend.source_state(source),
            PlaybackState::Playing | PlaybackState::Paused
        ) {
            backend.stop(source);
        }
        self.detach_buffers(backend, source);

        let chunks = playable.chunk_count();
        if chunks == 1 {
            backend.set_buffer(source, playable.buffer(0));
            self.flags.streaming = false;
        } else {
            let buffers: Vec<BufferId> = (0..chunks).filter_map(|i| playable.buffer(i)).collect();
            backend.queue_buffers(source, &buffers);
            self.flags.streaming = true;
        }

        self.flags.looping = mode.is_looping();
        backend.set_source_param(source, SourceParam::Looping(self.flags.looping));
        backend.play(source);

        log::debug!(
            "{} playing '{}' ({} chunk(s), {:?})",
            source,
            playable.name(),
            chunks,
            mode
        );
        self.playable = Some(playable);
        true
    }

    pub fn pause(&mut self, backend: &mut dyn AudioBackend) -> bool {
        let Some(source) = self.source else {
            return false;
        };
        let state = backend.source_state(source);
        if state != PlaybackState::Playing {
            log::debug!("{} pause ignored in state {:?}", source, state);
            return false;
        }
        backend.pause(source);
        true
    }

    pub fn resume(&mut self, backend: &mut dyn AudioBackend) -> bool {
        let Some(source) = self.source else {
            return false;
        };
        let state = backend.source_state(source);
        if state != PlaybackState::Paused {
            log::debug!("{} resume ignored in state {:?}", source, state);
            return false;
        }
        backend.play(source);
        true
    }

    pub fn stop(&mut self, backend: &mut dyn AudioBackend) -> bool {
        let Some(source) = self.source else {
            return false;
        };
        match backend.source_state(source) {
            PlaybackState::Playing | PlaybackState::Paused => {
                backend.stop(source);
                true
            }
            _ => false,
        }
    }

    pub fn rewind(&mut self, backend: &mut dyn AudioBackend) -> bool {
        let Some(source) = self.source else {
            return false;
        };
        match backend.source_state(source) {
            PlaybackState::Playing | PlaybackState::Paused | PlaybackState::Stopped => {
                backend.rewind(source);
                true
            }
            PlaybackState::Initial => false,
        }
    }

    /// Detaches the playable; stops first since bound buffers can't change mid-play.
    pub fn remove_sound(&mut self, backend: &mut dyn AudioBackend) {
        let Some(source) = self.source else {
            return;
        };
        if self.playable.is_none() {
            return;
        }
        self.stop(backend);
        self.detach_buffers(backend, source);
        self.flags.streaming = false;
        if let Some(playable) = self.playable.take() {
            log::debug!("{} detached '{}'", source, playable.name());
        }
    }

    fn detach_buffers(&mut self, backend: &mut dyn AudioBackend, source: SourceId) {
        if self.flags.streaming {
            backend.unqueue_all(source);
        } else {
            backend.set_buffer(source, None);
        }
    }

    pub fn set_param(&mut self, backend: &mut dyn AudioBackend, param: SourceParam) {
        let Some(source) = self.source else {
            return;
        };
        let param = match param {
            SourceParam::Pitch(p) => SourceParam::Pitch(p.clamp(MIN_PITCH, MAX_PITCH)),
            SourceParam::Gain(g) => SourceParam::Gain(g.max(0.0)),
            other => other,
        };
        if let SourceParam::Gain(g) = param {
            if self.saved_gain.is_some() && self.is_muted() {
                // Muted: remember the gain for unmute, keep the source silent
                self.saved_gain = Some(g);
                return;
            }
        }
        match param {
            SourceParam::Looping(l) => self.flags.looping = l,
            SourceParam::Relative(r) => self.flags.relative = r,
            other => self.params.apply(other),
        }
        backend.set_source_param(source, param);
    }

    pub fn set_gain(&mut self, backend: &mut dyn AudioBackend, gain: f32) {
        self.set_param(backend, SourceParam::Gain(gain));
    }

    pub fn is_muted(&self) -> bool {
        self.params.gain <= 0.0
    }

    pub fn set_muted(&mut self, backend: &mut dyn AudioBackend, muted: bool) {
        if muted == self.is_muted() {
            return;
        }
        if muted {
            self.saved_gain = Some(self.params.gain);
            self.set_gain(backend, 0.0);
        } else {
            let restored = self.saved_gain.take().unwrap_or(1.0);
            self.set_gain(backend, restored);
        }
    }

    fn ensure_slot(
        &mut self,
        backend: &mut dyn AudioBackend,
        max_sends: usize,
        index: usize,
    ) -> Option<&mut EffectSlot> {
        if index >= max_sends {
            log::warn!(
                "Effect send {} out of range (backend offers {} send(s))",
                index,
                max_sends
            );
            return None;
        }
        if !self.effect_slots.contains_key(&index) {
            match EffectSlot::create(backend) {
                Ok(slot) => {
                    self.effect_slots.insert(index, slot);
                }
                Err(e) => {
                    log::error!("Failed to create effect slot {}: {}", index, e);
                    return None;
                }
            }
        }
        self.effect_slots.get_mut(&index)
    }

    pub fn add_effect(
        &mut self,
        backend: &mut dyn AudioBackend,
        max_sends: usize,
        effect: Arc<Effect>,
        index: usize,
    ) -> bool {
        let Some(source) = self.source else {
            return false;
        };
        let Some(slot) = self.ensure_slot(backend, max_sends, index) else {
            return false;
        };
        slot.set_effect(backend, Some(effect));
        slot.set_enabled(true);
        slot.route(backend, source, index);
        true
    }

    pub fn add_filter(
        &mut self,
        backend: &mut dyn AudioBackend,
        max_sends: usize,
        filter: Arc<Filter>,
        index: usize,
    ) -> bool {
        let Some(source) = self.source else {
            return false;
        };
        let Some(slot) = self.ensure_slot(backend, max_sends, index) else {
            return false;
        };
        slot.set_filter(Some(filter));
        slot.set_enabled(true);
        slot.route(backend, source, index);
        true
    }

    pub fn set_effect_slot_enabled(
        &mut self,
        backend: &mut dyn AudioBackend,
        index: usize,
        enabled: bool,
    ) -> bool {
        let Some(source) = self.source else {
            return false;
        };
        let Some(slot) = self.effect_slots.get_mut(&index) else {
            log::warn!("No effect slot at send {}", index);
            return false;
        };
        slot.set_enabled(enabled);
        slot.route(backend, source, index);
        true
    }

    pub fn remove_effect_slot(&mut self, backend: &mut dyn AudioBackend, index: usize) -> bool {
        let Some(source) = self.source else {
            return false;
        };
        match self.effect_slots.remove(&index) {
            Some(slot) => {
                slot.destroy(backend, source, index);
                true
            }
            None => false,
        }
    }

    pub fn effect_slot(&self, index: usize) -> Option<&EffectSlot> {
        self.effect_slots.get(&index)
    }

    pub fn set_direct_filter(&mut self, backend: &mut dyn AudioBackend, filter: Option<Arc<Filter>>) {
        let Some(source) = self.source else {
            return;
        };
        backend.set_direct_filter(source, filter.as_ref().map(|f| f.id()));
        self.direct_filter = filter;
    }

    pub fn direct_filter(&self) -> Option<&Arc<Filter>> {
        self.direct_filter.as_ref()
    }

    /// Returns the voice to the state a fresh pool slot has.
    pub fn reset(&mut self, backend: &mut dyn AudioBackend) {
        let Some(source) = self.source else {
            return;
        };
        self.stop(backend);
        self.detach_buffers(backend, source);
        self.playable = None;

        let slots = std::mem::take(&mut self.effect_slots);
        for (index, slot) in slots {
            slot.destroy(backend, source, index);
        }
        if self.direct_filter.take().is_some() {
            backend.set_direct_filter(source, None);
        }

        self.params = VoiceParams::default();
        self.flags = VoiceFlags::default();
        self.saved_gain = None;
        for param in self.params.to_source_params() {
            backend.set_source_param(source, param);
        }
        backend.set_source_param(source, SourceParam::Looping(false));
        backend.set_source_param(source, SourceParam::Relative(false));
    }

    /// Deletes the backend source. The voice is unusable afterwards.
    pub fn destroy(&mut self, backend: &mut dyn AudioBackend) {
        if let Some(source) = self.source {
            self.reset(backend);
            backend.delete_source(source);
        }
        self.source = None;
    }
}

/// Owning handle to a pooled voice.
///
/// All methods are no-ops (returning `false` / defaults) once the context
/// has been shut down. Dropping the handle stops the voice, clears its
/// routing and parameters, and makes the slot available again.
pub struct Voice {
    context: Arc<AudioContext>,
    key: SlotKey,
}

impl Voice {
    pub(crate) fn new(context: Arc<AudioContext>, key: SlotKey) -> Self {
        Self { context, key }
    }

    pub fn key(&self) -> SlotKey {
        self.key
    }

    pub fn context(&self) -> &Arc<AudioContext> {
        &self.context
    }

    /// Whether the handle still refers to a live pool slot.
    pub fn is_valid(&self) -> bool {
        self.context.with_voice(self.key, |_, _, _| ()).is_some()
    }

    fn with<R>(
        &self,
        default: R,
        f: impl FnOnce(&mut VoiceState, &mut dyn AudioBackend, usize) -> R,
    ) -> R {
        self.context.with_voice(self.key, f).unwrap_or(default)
    }

    fn push(&self, param: SourceParam) {
        self.with((), |voice, backend, _| voice.set_param(backend, param));
    }

    fn read<R>(&self, default: R, f: impl FnOnce(&VoiceState) -> R) -> R {
        self.with(default, |voice, _, _| f(voice))
    }

    pub fn play(&self, playable: Arc<dyn Playable>, mode: LoopMode) -> bool {
        self.with(false, |voice, backend, _| voice.play(backend, playable, mode))
    }

    pub fn pause(&self) -> bool {
        self.with(false, |voice, backend, _| voice.pause(backend))
    }

    pub fn resume(&self) -> bool {
        self.with(false, |voice, backend, _| voice.resume(backend))
    }

    pub fn stop(&self) -> bool {
        self.with(false, |voice, backend, _| voice.stop(backend))
    }

    pub fn rewind(&self) -> bool {
        self.with(false, |voice, backend, _| voice.rewind(backend))
    }

    pub fn remove_sound(&self) {
        self.with((), |voice, backend, _| voice.remove_sound(backend));
    }

    pub fn state(&self) -> PlaybackState {
        self.with(PlaybackState::Initial, |voice, backend, _| voice.state(backend))
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn playable(&self) -> Option<Arc<dyn Playable>> {
        self.read(None, |voice| voice.playable())
    }

    pub fn params(&self) -> VoiceParams {
        self.read(VoiceParams::default(), |voice| voice.params())
    }

    pub fn flags(&self) -> VoiceFlags {
        self.read(VoiceFlags::default(), |voice| voice.flags())
    }

    pub fn set_position(&self, position: Vec3) {
        self.push(SourceParam::Position(position));
    }

    pub fn set_velocity(&self, velocity: Vec3) {
        self.push(SourceParam::Velocity(velocity));
    }

    pub fn set_direction(&self, direction: Vec3) {
        self.push(SourceParam::Direction(direction));
    }

    pub fn set_gain(&self, gain: f32) {
        self.push(SourceParam::Gain(gain));
    }

    /// Sets the pitch multiplier, clamped to `MIN_PITCH..=MAX_PITCH`.
    pub fn set_pitch(&self, pitch: f32) {
        self.push(SourceParam::Pitch(pitch));
    }

    pub fn set_relative(&self, relative: bool) {
        self.push(SourceParam::Relative(relative));
    }

    pub fn set_reference_distance(&self, distance: f32) {
        self.push(SourceParam::ReferenceDistance(distance));
    }

    pub fn set_rolloff_factor(&self, factor: f32) {
        self.push(SourceParam::RolloffFactor(factor));
    }

    pub fn set_max_distance(&self, distance: f32) {
        self.push(SourceParam::MaxDistance(distance));
    }

    /// Cone angles are in degrees.
    pub fn set_cone(&self, inner_angle: f32, outer_angle: f32, outer_gain: f32) {
        self.push(SourceParam::ConeInnerAngle(inner_angle));
        self.push(SourceParam::ConeOuterAngle(outer_angle));
        self.push(SourceParam::ConeOuterGain(outer_gain));
    }

    pub fn position(&self) -> Vec3 {
        self.params().position
    }

    pub fn gain(&self) -> f32 {
        self.params().gain
    }

    pub fn pitch(&self) -> f32 {
        self.params().pitch
    }

    pub fn is_muted(&self) -> bool {
        self.read(false, |voice| voice.is_muted())
    }

    pub fn set_muted(&self, muted: bool) {
        self.with((), |voice, backend, _| voice.set_muted(backend, muted));
    }

    pub fn toggle_mute(&self) {
        self.with((), |voice, backend, _| {
            let muted = voice.is_muted();
            voice.set_muted(backend, !muted)
        });
    }

    /// Routes the voice into `effect` through auxiliary send `index`,
    /// creating the slot on first use.
    pub fn add_effect(&self, effect: Arc<Effect>, index: usize) -> bool {
        self.with(false, |voice, backend, max_sends| {
            voice.add_effect(backend, max_sends, effect, index)
        })
    }

    /// Filters the auxiliary send `index`, creating the slot on first use.
    pub fn add_filter(&self, filter: Arc<Filter>, index: usize) -> bool {
        self.with(false, |voice, backend, max_sends| {
            voice.add_filter(backend, max_sends, filter, index)
        })
    }

    pub fn enable_effect_slot(&self, index: usize) -> bool {
        self.with(false, |voice, backend, _| {
            voice.set_effect_slot_enabled(backend, index, true)
        })
    }

    pub fn disable_effect_slot(&self, index: usize) -> bool {
        self.with(false, |voice, backend, _| {
            voice.set_effect_slot_enabled(backend, index, false)
        })
    }

    pub fn remove_effect_slot(&self, index: usize) -> bool {
        self.with(false, |voice, backend, _| voice.remove_effect_slot(backend, index))
    }

    pub fn has_effect_slot(&self, index: usize) -> bool {
        self.read(false, |voice| voice.effect_slot(index).is_some())
    }

    pub fn is_effect_slot_enabled(&self, index: usize) -> bool {
        self.read(false, |voice| {
            voice.effect_slot(index).is_some_and(|slot| slot.is_enabled())
        })
    }

    pub fn set_direct_filter(&self, filter: Arc<Filter>) {
        self.with((), |voice, backend, _| {
            voice.set_direct_filter(backend, Some(filter))
        });
    }

    pub fn clear_direct_filter(&self) {
        self.with((), |voice, backend, _| voice.set_direct_filter(backend, None));
    }

    pub fn has_direct_filter(&self) -> bool {
        self.read(false, |voice| voice.direct_filter().is_some())
    }
}

impl Drop for Voice {
    fn drop(&mut self) {
        self.context.release_voice(self.key);
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice").field("key", &self.key).finish()
    }
}
