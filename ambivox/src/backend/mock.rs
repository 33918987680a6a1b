//! Recording backend for unit tests.

use super::{
    AudioBackend, BackendCaps, BufferData, BufferId, DeviceRequest, DistanceModel, EffectId,
    EffectKind, FilterId, FilterKind, ListenerParam, PlaybackState, SlotId, SourceId, SourceParam,
};
use crate::error::{AmbivoxError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default, Clone)]
pub(crate) struct MockSource {
    pub state: PlaybackState,
    pub buffer: Option<BufferId>,
    pub queue: Vec<BufferId>,
    pub params: Vec<SourceParam>,
    pub sends: BTreeMap<usize, (Option<SlotId>, Option<FilterId>)>,
    pub direct_filter: Option<FilterId>,
    pub rewinds: usize,
}

impl MockSource {
    pub fn last_gain(&self) -> Option<f32> {
        self.params.iter().rev().find_map(|p| match p {
            SourceParam::Gain(g) => Some(*g),
            _ => None,
        })
    }

    pub fn last_looping(&self) -> Option<bool> {
        self.params.iter().rev().find_map(|p| match p {
            SourceParam::Looping(l) => Some(*l),
            _ => None,
        })
    }
}

#[derive(Debug)]
pub(crate) struct MockState {
    pub fail_open: bool,
    pub max_voices: usize,
    pub max_sends: usize,
    pub opened: bool,
    pub closed: bool,
    next_id: u32,
    pub sources: HashMap<SourceId, MockSource>,
    pub buffers: HashSet<BufferId>,
    pub slots: HashMap<SlotId, Option<EffectId>>,
    pub effects: HashSet<EffectId>,
    pub filters: HashSet<FilterId>,
    pub listener: Vec<ListenerParam>,
    pub doppler_factor: Option<f32>,
    pub speed_of_sound: Option<f32>,
    pub distance_model: Option<DistanceModel>,
}

impl MockState {
    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn source(&self, id: SourceId) -> &MockSource {
        &self.sources[&id]
    }

    pub fn listener_gain(&self) -> Option<f32> {
        self.listener.iter().rev().find_map(|p| match p {
            ListenerParam::Gain(g) => Some(*g),
            _ => None,
        })
    }
}

/// Test-side view of a [`MockBackend`]'s state.
#[derive(Clone)]
pub(crate) struct MockHandle(Arc<Mutex<MockState>>);

impl MockHandle {
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap()
    }

    /// Simulates the device finishing playback of a source.
    pub fn finish(&self, source: SourceId) {
        if let Some(s) = self.state().sources.get_mut(&source) {
            s.state = PlaybackState::Stopped;
        }
    }
}

pub(crate) struct MockBackend(Arc<Mutex<MockState>>);

impl MockBackend {
    pub fn new(max_voices: usize, max_sends: usize) -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState {
            fail_open: false,
            max_voices,
            max_sends,
            opened: false,
            closed: false,
            next_id: 0,
            sources: HashMap::new(),
            buffers: HashSet::new(),
            slots: HashMap::new(),
            effects: HashSet::new(),
            filters: HashSet::new(),
            listener: Vec::new(),
            doppler_factor: None,
            speed_of_sound: None,
            distance_model: None,
        }));
        (Self(state.clone()), MockHandle(state))
    }

    pub fn failing() -> (Self, MockHandle) {
        let (backend, handle) = Self::new(4, 0);
        handle.state().fail_open = true;
        (backend, handle)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap()
    }

    fn source_mut(&mut self, source: SourceId, f: impl FnOnce(&mut MockSource)) {
        if let Some(s) = self.state().sources.get_mut(&source) {
            f(s);
        }
    }
}

impl AudioBackend for MockBackend {
    fn open(&mut self, request: &DeviceRequest) -> Result<BackendCaps> {
        let mut state = self.state();
        if state.fail_open {
            return Err(AmbivoxError::AudioDevice("mock device refused to open".into()));
        }
        state.opened = true;
        let granted = request.mono_voices.min(state.max_voices);
        Ok(BackendCaps {
            frequency: request.frequency,
            max_mono_voices: granted,
            max_stereo_voices: 0,
            max_auxiliary_sends: if request.enable_effects { state.max_sends } else { 0 },
            vendor: "mock".into(),
            renderer: "mock".into(),
            version: "1.0".into(),
            extensions: vec![],
        })
    }

    fn close(&mut self) {
        let mut state = self.state();
        state.closed = true;
        state.sources.clear();
    }

    fn create_buffer(&mut self, _data: &BufferData<'_>) -> Result<BufferId> {
        let mut state = self.state();
        let id = BufferId(state.next());
        state.buffers.insert(id);
        Ok(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.state().buffers.remove(&buffer);
    }

    fn create_source(&mut self) -> Result<SourceId> {
        let mut state = self.state();
        if state.sources.len() >= state.max_voices {
            return Err(AmbivoxError::Backend("mock source limit".into()));
        }
        let id = SourceId(state.next());
        state.sources.insert(id, MockSource::default());
        Ok(id)
    }

    fn delete_source(&mut self, source: SourceId) {
        self.state().sources.remove(&source);
    }

    fn play(&mut self, source: SourceId) {
        self.source_mut(source, |s| s.state = PlaybackState::Playing);
    }

    fn pause(&mut self, source: SourceId) {
        self.source_mut(source, |s| {
            if s.state == PlaybackState::Playing {
                s.state = PlaybackState::Paused;
            }
        });
    }

    fn stop(&mut self, source: SourceId) {
        self.source_mut(source, |s| {
            if s.state != PlaybackState::Initial {
                s.state = PlaybackState::Stopped;
            }
        });
    }

    fn rewind(&mut self, source: SourceId) {
        self.source_mut(source, |s| {
            s.state = PlaybackState::Initial;
            s.rewinds += 1;
        });
    }

    fn source_state(&self, source: SourceId) -> PlaybackState {
        self.state()
            .sources
            .get(&source)
            .map(|s| s.state)
            .unwrap_or_default()
    }

    fn set_buffer(&mut self, source: SourceId, buffer: Option<BufferId>) {
        self.source_mut(source, |s| {
            s.queue.clear();
            s.buffer = buffer;
        });
    }

    fn queue_buffers(&mut self, source: SourceId, buffers: &[BufferId]) {
        self.source_mut(source, |s| s.queue.extend_from_slice(buffers));
    }

    fn unqueue_all(&mut self, source: SourceId) {
        self.source_mut(source, |s| s.queue.clear());
    }

    fn set_source_param(&mut self, source: SourceId, param: SourceParam) {
        self.source_mut(source, |s| s.params.push(param));
    }

    fn set_listener_param(&mut self, param: ListenerParam) {
        self.state().listener.push(param);
    }

    fn set_doppler_factor(&mut self, factor: f32) {
        self.state().doppler_factor = Some(factor);
    }

    fn set_speed_of_sound(&mut self, speed: f32) {
        self.state().speed_of_sound = Some(speed);
    }

    fn set_distance_model(&mut self, model: DistanceModel) {
        self.state().distance_model = Some(model);
    }

    fn create_effect_slot(&mut self) -> Result<SlotId> {
        let mut state = self.state();
        if state.max_sends == 0 {
            return Err(AmbivoxError::Unsupported("mock without effects".into()));
        }
        let id = SlotId(state.next());
        state.slots.insert(id, None);
        Ok(id)
    }

    fn delete_effect_slot(&mut self, slot: SlotId) {
        self.state().slots.remove(&slot);
    }

    fn create_effect(&mut self, _kind: &EffectKind) -> Result<EffectId> {
        let mut state = self.state();
        let id = EffectId(state.next());
        state.effects.insert(id);
        Ok(id)
    }

    fn delete_effect(&mut self, effect: EffectId) {
        self.state().effects.remove(&effect);
    }

    fn create_filter(&mut self, _kind: &FilterKind) -> Result<FilterId> {
        let mut state = self.state();
        let id = FilterId(state.next());
        state.filters.insert(id);
        Ok(id)
    }

    fn delete_filter(&mut self, filter: FilterId) {
        self.state().filters.remove(&filter);
    }

    fn attach_effect(&mut self, slot: SlotId, effect: Option<EffectId>) {
        if let Some(entry) = self.state().slots.get_mut(&slot) {
            *entry = effect;
        }
    }

    fn set_send(
        &mut self,
        source: SourceId,
        send: usize,
        slot: Option<SlotId>,
        filter: Option<FilterId>,
    ) {
        self.source_mut(source, |s| {
            s.sends.insert(send, (slot, filter));
        });
    }

    fn set_direct_filter(&mut self, source: SourceId, filter: Option<FilterId>) {
        self.source_mut(source, |s| s.direct_filter = filter);
    }
}
