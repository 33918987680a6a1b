//! The audio context: device lifetime, global parameters and the voice pool.
//!
//! An [`AudioContext`] is created once, wrapped in an `Arc`, and passed to
//! every subsystem that plays sound. All methods take `&self`; mutable state
//! sits behind one mutex shared with [`Voice`] handles.
//!
//! Shared backend objects (buffers, effects, filters) never reach for the
//! mutex when dropped. They post a [`Released`] id on a channel, and the
//! context deletes the backend object the next time it takes the lock.

use crate::backend::{
    AudioBackend, BackendCaps, BufferData, BufferId, DeviceRequest, DistanceModel, EffectId,
    EffectKind, FilterId, FilterKind, ListenerParam,
};
use crate::config::AudioDesc;
use crate::effects::{Effect, Filter};
use crate::error::Result;
use crate::math::{ListenerState, Pose, Vec3};
use crate::playback::{LoopMode, Playable};
use crate::pool::{SlotKey, VoicePool};
use crate::voice::{Voice, VoiceState};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::{Arc, Mutex, MutexGuard};

pub const DEFAULT_DOPPLER_FACTOR: f32 = 1.0;
pub const DEFAULT_SPEED_OF_SOUND: f32 = 343.3;

/// Backend object whose last owner went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Released {
    Buffer(BufferId),
    Effect(EffectId),
    Filter(FilterId),
}

pub(crate) type ReleaseSender = Sender<Released>;

/// Lifecycle of an [`AudioContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStatus {
    /// Created, [`AudioContext::initialize`] not called yet
    Uninitialized,
    /// Device open and voices allocated
    Running,
    /// Initialization failed; every operation is a no-op
    Disabled,
    /// Torn down by [`AudioContext::shutdown`]
    ShutDown,
}

struct ContextState {
    backend: Box<dyn AudioBackend>,
    status: ContextStatus,
    caps: BackendCaps,
    listener: ListenerState,
    master_volume: f32,
    doppler_factor: f32,
    speed_of_sound: f32,
    distance_model: DistanceModel,
    pool: VoicePool,
    default_voice: Option<SlotKey>,
}

impl ContextState {
    fn is_running(&self) -> bool {
        self.status == ContextStatus::Running
    }

    fn collect_released(&mut self, released: &Receiver<Released>) {
        while let Ok(object) = released.try_recv() {
            if !self.is_running() {
                continue;
            }
            match object {
                Released::Buffer(id) => self.backend.delete_buffer(id),
                Released::Effect(id) => self.backend.delete_effect(id),
                Released::Filter(id) => self.backend.delete_filter(id),
            }
        }
    }

    fn push_listener(&mut self) {
        let pose = self.listener.pose;
        self.backend
            .set_listener_param(ListenerParam::Position(pose.position));
        self.backend
            .set_listener_param(ListenerParam::Velocity(self.listener.velocity));
        self.backend.set_listener_param(ListenerParam::Orientation {
            forward: pose.forward(),
            up: pose.up(),
        });
    }

    fn teardown(&mut self, released: &Receiver<Released>) {
        self.default_voice = None;
        self.pool.teardown(self.backend.as_mut());
        self.collect_released(released);
        self.backend.close();
        self.status = ContextStatus::ShutDown;
    }
}

/// Owner of the audio device and the voice pool.
pub struct AudioContext {
    desc: AudioDesc,
    state: Mutex<ContextState>,
    release_tx: Sender<Released>,
    release_rx: Receiver<Released>,
}

impl AudioContext {
    /// Wraps `backend` in a new, uninitialized context.
    pub fn new(desc: AudioDesc, backend: impl AudioBackend + 'static) -> Arc<Self> {
        Self::with_boxed_backend(desc, Box::new(backend))
    }

    pub fn with_boxed_backend(desc: AudioDesc, backend: Box<dyn AudioBackend>) -> Arc<Self> {
        let (release_tx, release_rx) = unbounded();
        let master_volume = desc.master_volume.clamp(0.0, 1.0);
        Arc::new(Self {
            desc,
            state: Mutex::new(ContextState {
                backend,
                status: ContextStatus::Uninitialized,
                caps: BackendCaps::default(),
                listener: ListenerState::default(),
                master_volume,
                doppler_factor: DEFAULT_DOPPLER_FACTOR,
                speed_of_sound: DEFAULT_SPEED_OF_SOUND,
                distance_model: DistanceModel::default(),
                pool: VoicePool::empty(),
                default_voice: None,
            }),
            release_tx,
            release_rx,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ContextState> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.collect_released(&self.release_rx);
        state
    }

    /// Opens the device and allocates the voice pool.
    ///
    /// Returns `false` and leaves the context permanently disabled when the
    /// device can't be opened or not a single voice could be created. Getting
    /// fewer voices than requested is logged but still succeeds.
    pub fn initialize(&self) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state.status {
            ContextStatus::Running => {
                log::warn!("Audio context already initialized");
                return true;
            }
            ContextStatus::Disabled => return false,
            ContextStatus::ShutDown => {
                log::warn!("Audio context was shut down and can't be reinitialized");
                return false;
            }
            ContextStatus::Uninitialized => {}
        }

        let request = DeviceRequest {
            frequency: self.desc.frequency,
            mono_voices: self.desc.mono_voices,
            stereo_voices: self.desc.stereo_voices,
            enable_effects: self.desc.enable_effects,
        };
        let caps = match state.backend.open(&request) {
            Ok(caps) => caps,
            Err(e) => {
                log::error!("Failed to open audio device, audio disabled: {}", e);
                state.status = ContextStatus::Disabled;
                return false;
            }
        };

        let wanted = self.desc.requested_voices().min(caps.max_voices());
        let pool = VoicePool::build(state.backend.as_mut(), wanted);
        if pool.capacity() == 0 {
            log::error!("No voices could be allocated, audio disabled");
            state.backend.close();
            state.status = ContextStatus::Disabled;
            return false;
        }
        if pool.capacity() < self.desc.requested_voices() {
            log::warn!(
                "Requested {} voices, got {}",
                self.desc.requested_voices(),
                pool.capacity()
            );
        }

        log::info!(
            "Audio device opened: {} {} ({} Hz, {} voices, {} aux sends)",
            caps.vendor,
            caps.renderer,
            caps.frequency,
            pool.capacity(),
            caps.max_auxiliary_sends
        );

        state.caps = caps;
        state.pool = pool;
        state.status = ContextStatus::Running;

        let master = state.master_volume;
        state.backend.set_listener_param(ListenerParam::Gain(master));
        let (model, doppler, speed) = (
            state.distance_model,
            state.doppler_factor,
            state.speed_of_sound,
        );
        state.backend.set_distance_model(model);
        state.backend.set_doppler_factor(doppler);
        state.backend.set_speed_of_sound(speed);
        state.push_listener();
        true
    }

    /// Stops and deletes every voice and closes the device. Idempotent.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        match state.status {
            ContextStatus::Running => {
                state.teardown(&self.release_rx);
                log::info!("Audio context shut down");
            }
            ContextStatus::Uninitialized => state.status = ContextStatus::ShutDown,
            ContextStatus::Disabled | ContextStatus::ShutDown => {}
        }
    }

    pub fn status(&self) -> ContextStatus {
        self.lock().status
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().is_running()
    }

    pub fn desc(&self) -> &AudioDesc {
        &self.desc
    }

    /// Capabilities granted by the backend (default values before initialization).
    pub fn capabilities(&self) -> BackendCaps {
        self.lock().caps.clone()
    }

    /// Whether auxiliary effects are both configured and offered by the backend.
    pub fn effects_available(&self) -> bool {
        let state = self.lock();
        state.is_running() && self.desc.enable_effects && state.caps.effects_available()
    }

    fn max_sends(&self, state: &ContextState) -> usize {
        if self.desc.enable_effects {
            state.caps.max_auxiliary_sends
        } else {
            0
        }
    }

    /// Takes a free voice from the pool, or `None` when all are held.
    pub fn allocate_voice(self: &Arc<Self>) -> Option<Voice> {
        let key = {
            let mut state = self.lock();
            if !state.is_running() {
                return None;
            }
            match state.pool.acquire() {
                Some(key) => key,
                None => {
                    log::debug!("Voice pool exhausted ({} voices)", state.pool.capacity());
                    return None;
                }
            }
        };
        Some(Voice::new(self.clone(), key))
    }

    pub fn available_voice_count(&self) -> usize {
        self.lock().pool.available()
    }

    pub fn voice_capacity(&self) -> usize {
        self.lock().pool.capacity()
    }

    pub(crate) fn release_voice(&self, key: SlotKey) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.pool.release(key, state.backend.as_mut()) {
            log::trace!("Voice {} returned to pool", key.index());
        }
    }

    /// Runs `f` on the voice behind `key`. `None` when the key is stale.
    pub(crate) fn with_voice<R>(
        &self,
        key: SlotKey,
        f: impl FnOnce(&mut VoiceState, &mut dyn AudioBackend, usize) -> R,
    ) -> Option<R> {
        let mut guard = self.lock();
        let max_sends = self.max_sends(&guard);
        let state = &mut *guard;
        let voice = state.pool.get_mut(key)?;
        Some(f(voice, state.backend.as_mut(), max_sends))
    }

    pub fn set_listener_pose(&self, pose: Pose, velocity: Vec3) {
        let mut state = self.lock();
        if !state.is_running() {
            return;
        }
        state.listener = ListenerState { pose, velocity };
        state.push_listener();
    }

    pub fn listener(&self) -> ListenerState {
        self.lock().listener
    }

    /// Sets the listener gain, clamped to `0.0..=1.0`.
    pub fn set_master_volume(&self, gain: f32) {
        let mut state = self.lock();
        if !state.is_running() {
            return;
        }
        let gain = gain.clamp(0.0, 1.0);
        state.master_volume = gain;
        state.backend.set_listener_param(ListenerParam::Gain(gain));
    }

    pub fn master_volume(&self) -> f32 {
        self.lock().master_volume
    }

    pub fn set_doppler_factor(&self, factor: f32) {
        let mut state = self.lock();
        if !state.is_running() {
            return;
        }
        let factor = factor.max(0.0);
        state.doppler_factor = factor;
        state.backend.set_doppler_factor(factor);
    }

    pub fn doppler_factor(&self) -> f32 {
        self.lock().doppler_factor
    }

    pub fn set_speed_of_sound(&self, speed: f32) {
        let mut state = self.lock();
        if !state.is_running() || speed <= 0.0 {
            return;
        }
        state.speed_of_sound = speed;
        state.backend.set_speed_of_sound(speed);
    }

    pub fn speed_of_sound(&self) -> f32 {
        self.lock().speed_of_sound
    }

    pub fn set_distance_model(&self, model: DistanceModel) {
        let mut state = self.lock();
        if !state.is_running() {
            return;
        }
        state.distance_model = model;
        state.backend.set_distance_model(model);
    }

    pub fn distance_model(&self) -> DistanceModel {
        self.lock().distance_model
    }

    /// Plays `playable` on the context's default voice.
    ///
    /// The default voice is taken from the pool on first use and kept until
    /// shutdown. Whatever it was playing is replaced.
    pub fn play(&self, playable: Arc<dyn Playable>, mode: LoopMode, gain: f32) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.is_running() {
            return false;
        }
        let key = match state.default_voice {
            Some(key) => key,
            None => match state.pool.acquire() {
                Some(key) => {
                    state.default_voice = Some(key);
                    key
                }
                None => {
                    log::warn!("No free voice for '{}'", playable.name());
                    return false;
                }
            },
        };
        let Some(voice) = state.pool.get_mut(key) else {
            return false;
        };
        voice.set_gain(state.backend.as_mut(), gain);
        voice.play(state.backend.as_mut(), playable, mode)
    }

    /// Stops the default voice if it has been used.
    pub fn stop_default_voice(&self) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(key) = state.default_voice else {
            return false;
        };
        match state.pool.get_mut(key) {
            Some(voice) => voice.stop(state.backend.as_mut()),
            None => false,
        }
    }

    /// Creates a shared effect object. `None` when effects are unavailable.
    pub fn create_effect(&self, kind: EffectKind) -> Option<Arc<Effect>> {
        let mut state = self.lock();
        if !state.is_running() || !self.desc.enable_effects || !state.caps.effects_available() {
            log::warn!("Effects are not available");
            return None;
        }
        match state.backend.create_effect(&kind) {
            Ok(id) => Some(Arc::new(Effect::new(id, kind, self.release_tx.clone()))),
            Err(e) => {
                log::error!("Failed to create effect: {}", e);
                None
            }
        }
    }

    /// Creates a shared filter object. `None` when the backend has no filters.
    pub fn create_filter(&self, kind: FilterKind) -> Option<Arc<Filter>> {
        let mut state = self.lock();
        if !state.is_running() || !self.desc.enable_effects {
            return None;
        }
        match state.backend.create_filter(&kind) {
            Ok(id) => Some(Arc::new(Filter::new(id, kind, self.release_tx.clone()))),
            Err(e) => {
                log::warn!("Failed to create filter: {}", e);
                None
            }
        }
    }

    pub(crate) fn upload_buffer(&self, data: &BufferData<'_>) -> Result<BufferId> {
        let mut state = self.lock();
        if !state.is_running() {
            return Err(crate::error::AmbivoxError::AudioDevice(
                "Audio context is not running".into(),
            ));
        }
        state.backend.create_buffer(data)
    }

    pub(crate) fn release_sender(&self) -> ReleaseSender {
        self.release_tx.clone()
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if state.is_running() {
            state.teardown(&self.release_rx);
        }
    }
}

impl std::fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioContext")
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, MockHandle};
    use crate::backend::{PlaybackState, ReverbParams};
    use std::time::Duration;

    struct TestSound {
        buffers: Vec<BufferId>,
    }

    impl Playable for TestSound {
        fn name(&self) -> &str {
            "test"
        }
        fn chunk_count(&self) -> usize {
            self.buffers.len()
        }
        fn buffer(&self, chunk: usize) -> Option<BufferId> {
            self.buffers.get(chunk).copied()
        }
        fn duration(&self) -> Duration {
            Duration::from_secs(1)
        }
        fn is_loaded(&self) -> bool {
            true
        }
    }

    fn running(voices: usize, sends: usize) -> (Arc<AudioContext>, MockHandle) {
        let (backend, handle) = MockBackend::new(voices, sends);
        let desc = AudioDesc::default().mono_voices(voices).stereo_voices(0);
        let context = AudioContext::new(desc, backend);
        assert!(context.initialize());
        (context, handle)
    }

    fn sound(chunks: u32) -> Arc<dyn Playable> {
        Arc::new(TestSound {
            buffers: (1..=chunks).map(|i| BufferId(1000 + i)).collect(),
        })
    }

    #[test]
    fn test_initialize_failure_disables() {
        let (backend, _handle) = MockBackend::failing();
        let context = AudioContext::new(AudioDesc::default(), backend);
        assert!(!context.initialize());
        assert_eq!(context.status(), ContextStatus::Disabled);
        assert!(!context.initialize());
        assert!(context.allocate_voice().is_none());
        assert!(!context.play(sound(1), LoopMode::Once, 1.0));
    }

    #[test]
    fn test_partial_grant_sizes_pool() {
        let (backend, _handle) = MockBackend::new(3, 0);
        let context = AudioContext::new(AudioDesc::default().mono_voices(16), backend);
        assert!(context.initialize());
        assert_eq!(context.voice_capacity(), 3);
        assert_eq!(context.capabilities().max_mono_voices, 3);
    }

    #[test]
    fn test_pool_exhaustion_and_reuse() {
        let (context, _handle) = running(2, 0);
        let a = context.allocate_voice().unwrap();
        let b = context.allocate_voice().unwrap();
        assert!(context.allocate_voice().is_none());

        drop(a);
        assert_eq!(context.available_voice_count(), 1);
        let c = context.allocate_voice().unwrap();
        assert!(c.is_valid());
        assert!(b.is_valid());
    }

    #[test]
    fn test_master_volume_clamped() {
        let (context, handle) = running(1, 0);
        context.set_master_volume(1.7);
        assert_eq!(context.master_volume(), 1.0);
        context.set_master_volume(-0.3);
        assert_eq!(context.master_volume(), 0.0);
        context.set_master_volume(0.4);
        assert_eq!(context.master_volume(), 0.4);
        assert_eq!(handle.state().listener_gain(), Some(0.4));
    }

    #[test]
    fn test_globals_pushed_and_cached() {
        let (context, handle) = running(1, 0);
        context.set_doppler_factor(0.5);
        context.set_speed_of_sound(300.0);
        context.set_distance_model(DistanceModel::Linear);
        assert_eq!(context.doppler_factor(), 0.5);
        assert_eq!(context.speed_of_sound(), 300.0);
        assert_eq!(context.distance_model(), DistanceModel::Linear);

        let state = handle.state();
        assert_eq!(state.doppler_factor, Some(0.5));
        assert_eq!(state.speed_of_sound, Some(300.0));
        assert_eq!(state.distance_model, Some(DistanceModel::Linear));
    }

    #[test]
    fn test_play_and_state_machine() {
        let (context, handle) = running(1, 0);
        let voice = context.allocate_voice().unwrap();
        assert_eq!(voice.state(), PlaybackState::Initial);
        assert!(!voice.pause());
        assert!(!voice.resume());
        assert!(!voice.stop());

        assert!(voice.play(sound(1), LoopMode::Infinite));
        assert_eq!(voice.state(), PlaybackState::Playing);
        assert!(voice.flags().looping);
        assert!(!voice.resume());

        assert!(voice.pause());
        assert_eq!(voice.state(), PlaybackState::Paused);
        assert!(!voice.pause());
        assert!(voice.resume());
        assert!(voice.stop());
        assert_eq!(voice.state(), PlaybackState::Stopped);
        assert!(voice.rewind());
        assert_eq!(voice.state(), PlaybackState::Initial);

        let source = handle.state().sources.keys().copied().next().unwrap();
        assert_eq!(handle.state().source(source).rewinds, 1);
    }

    #[test]
    fn test_play_from_any_state_restarts() {
        let (context, handle) = running(1, 0);
        let voice = context.allocate_voice().unwrap();
        assert!(voice.play(sound(1), LoopMode::Once));
        assert!(voice.pause());
        assert!(voice.play(sound(1), LoopMode::Once));
        assert_eq!(voice.state(), PlaybackState::Playing);

        let source = handle.state().sources.keys().copied().next().unwrap();
        handle.finish(source);
        assert_eq!(voice.state(), PlaybackState::Stopped);
        assert!(voice.play(sound(1), LoopMode::Once));
        assert_eq!(voice.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_streamed_playable_is_queued() {
        let (context, handle) = running(1, 0);
        let voice = context.allocate_voice().unwrap();
        assert!(voice.play(sound(3), LoopMode::Once));
        assert!(voice.flags().streaming);

        let source = handle.state().sources.keys().copied().next().unwrap();
        assert_eq!(handle.state().source(source).queue.len(), 3);

        assert!(voice.play(sound(1), LoopMode::Once));
        let state = handle.state();
        assert!(state.source(source).queue.is_empty());
        assert_eq!(state.source(source).buffer, Some(BufferId(1001)));
    }

    #[test]
    fn test_pitch_clamped_and_mute_restores_gain() {
        let (context, _handle) = running(1, 0);
        let voice = context.allocate_voice().unwrap();
        voice.set_pitch(5.0);
        assert_eq!(voice.pitch(), 2.0);
        voice.set_pitch(0.1);
        assert_eq!(voice.pitch(), 0.5);

        voice.set_gain(0.6);
        voice.toggle_mute();
        assert!(voice.is_muted());
        assert_eq!(voice.gain(), 0.0);
        voice.toggle_mute();
        assert!(!voice.is_muted());
        assert_eq!(voice.gain(), 0.6);
    }

    #[test]
    fn test_released_voice_is_reset() {
        let (context, handle) = running(1, 0);
        let voice = context.allocate_voice().unwrap();
        voice.set_gain(0.2);
        voice.set_position(Vec3::new(1.0, 2.0, 3.0));
        assert!(voice.play(sound(1), LoopMode::Infinite));
        drop(voice);

        let source = handle.state().sources.keys().copied().next().unwrap();
        assert_eq!(handle.state().source(source).state, PlaybackState::Stopped);

        let voice = context.allocate_voice().unwrap();
        assert_eq!(voice.gain(), 1.0);
        assert_eq!(voice.position(), Vec3::ZERO);
        assert!(voice.playable().is_none());
        assert_eq!(handle.state().source(source).last_gain(), Some(1.0));
        assert_eq!(handle.state().source(source).last_looping(), Some(false));
    }

    #[test]
    fn test_effect_slots_require_sends() {
        let (context, _handle) = running(1, 0);
        assert!(!context.effects_available());
        assert!(context.create_effect(EffectKind::Reverb(ReverbParams::CAVE)).is_none());

        let (context, handle) = running(1, 2);
        assert!(context.effects_available());
        let reverb = context
            .create_effect(EffectKind::Reverb(ReverbParams::CAVE))
            .unwrap();
        let voice = context.allocate_voice().unwrap();
        assert!(voice.add_effect(reverb.clone(), 0));
        assert!(!voice.add_effect(reverb.clone(), 2));
        assert!(voice.has_effect_slot(0));
        assert!(voice.disable_effect_slot(0));
        assert!(!voice.is_effect_slot_enabled(0));
        assert!(voice.enable_effect_slot(0));
        assert!(voice.remove_effect_slot(0));
        assert!(!voice.has_effect_slot(0));
        assert!(handle.state().slots.is_empty());
    }

    #[test]
    fn test_dropped_effect_deleted_on_next_lock() {
        let (context, handle) = running(1, 1);
        let effect = context
            .create_effect(EffectKind::Reverb(ReverbParams::default()))
            .unwrap();
        assert_eq!(handle.state().effects.len(), 1);
        drop(effect);
        let _ = context.master_volume();
        assert!(handle.state().effects.is_empty());
    }

    #[test]
    fn test_shutdown_invalidates_voices() {
        let (context, handle) = running(2, 0);
        let voice = context.allocate_voice().unwrap();
        context.shutdown();
        context.shutdown();
        assert_eq!(context.status(), ContextStatus::ShutDown);
        assert!(handle.state().closed);
        assert!(!voice.is_valid());
        assert!(!voice.play(sound(1), LoopMode::Once));
        assert!(context.allocate_voice().is_none());
    }

    #[test]
    fn test_default_voice_play() {
        let (context, _handle) = running(2, 0);
        assert!(context.play(sound(1), LoopMode::Once, 0.5));
        assert_eq!(context.available_voice_count(), 1);
        assert!(context.play(sound(1), LoopMode::Once, 0.5));
        assert_eq!(context.available_voice_count(), 1);
        assert!(context.stop_default_voice());
    }
}
