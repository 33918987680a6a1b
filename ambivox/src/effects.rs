//! Effects, filters, and per-voice auxiliary effect slots.
//!
//! [`Effect`] and [`Filter`] are shared, reference-counted backend objects
//! created through [`AudioContext`](crate::AudioContext). A voice routes its
//! signal into an [`EffectSlot`] per auxiliary send index; a slot holds at
//! most one effect and one filter.
//!
//! Dropping the last reference of an effect or filter does not call the
//! backend directly. The id is posted to the owning context, which deletes
//! the backend object the next time it is touched.

use crate::backend::{
    AudioBackend, EchoParams, EffectId, EffectKind, FilterId, FilterKind, ReverbParams, SlotId,
    SourceId,
};
use crate::context::{ReleaseSender, Released};
use crate::error::Result;
use std::sync::Arc;

/// Shared handle to a backend effect object.
pub struct Effect {
    id: EffectId,
    kind: EffectKind,
    release: ReleaseSender,
}

impl Effect {
    pub(crate) fn new(id: EffectId, kind: EffectKind, release: ReleaseSender) -> Self {
        Self { id, kind, release }
    }

    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn kind(&self) -> &EffectKind {
        &self.kind
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        let _ = self.release.send(Released::Effect(self.id));
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Shared handle to a backend filter object.
pub struct Filter {
    id: FilterId,
    kind: FilterKind,
    release: ReleaseSender,
}

impl Filter {
    pub(crate) fn new(id: FilterId, kind: FilterKind, release: ReleaseSender) -> Self {
        Self { id, kind, release }
    }

    pub fn id(&self) -> FilterId {
        self.id
    }

    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }
}

impl Drop for Filter {
    fn drop(&mut self) {
        let _ = self.release.send(Released::Filter(self.id));
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// One auxiliary send target of a voice.
#[derive(Debug)]
pub struct EffectSlot {
    slot: SlotId,
    effect: Option<Arc<Effect>>,
    filter: Option<Arc<Filter>>,
    enabled: bool,
}

impl EffectSlot {
    pub fn create(backend: &mut dyn AudioBackend) -> Result<Self> {
        let slot = backend.create_effect_slot()?;
        Ok(Self {
            slot,
            effect: None,
            filter: None,
            enabled: true,
        })
    }

    pub fn effect(&self) -> Option<&Arc<Effect>> {
        self.effect.as_ref()
    }

    pub fn filter(&self) -> Option<&Arc<Filter>> {
        self.filter.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_effect(&mut self, backend: &mut dyn AudioBackend, effect: Option<Arc<Effect>>) {
        backend.attach_effect(self.slot, effect.as_ref().map(|e| e.id()));
        self.effect = effect;
    }

    pub fn set_filter(&mut self, filter: Option<Arc<Filter>>) {
        self.filter = filter;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Pushes this slot's routing for `send` of `source` to the backend.
    pub fn route(&self, backend: &mut dyn AudioBackend, source: SourceId, send: usize) {
        if self.enabled {
            backend.set_send(
                source,
                send,
                Some(self.slot),
                self.filter.as_ref().map(|f| f.id()),
            );
        } else {
            backend.set_send(source, send, None, None);
        }
    }

    /// Disconnects the send and deletes the backend slot.
    pub fn destroy(mut self, backend: &mut dyn AudioBackend, source: SourceId, send: usize) {
        backend.set_send(source, send, None, None);
        backend.attach_effect(self.slot, None);
        backend.delete_effect_slot(self.slot);
        self.effect = None;
        self.filter = None;
    }
}

impl ReverbParams {
    pub const GENERIC: Self = Self {
        density: 1.0,
        diffusion: 1.0,
        gain: 0.32,
        gain_hf: 0.89,
        decay_time: 1.49,
        decay_hf_ratio: 0.83,
        reflections_gain: 0.05,
        reflections_delay: 0.007,
        late_reverb_gain: 1.26,
        late_reverb_delay: 0.011,
    };

    pub const CAVE: Self = Self {
        density: 1.0,
        diffusion: 1.0,
        gain: 0.32,
        gain_hf: 0.59,
        decay_time: 3.0,
        decay_hf_ratio: 0.6,
        reflections_gain: 0.14,
        reflections_delay: 0.015,
        late_reverb_gain: 1.0,
        late_reverb_delay: 0.022,
    };

    pub const HALLWAY: Self = Self {
        density: 0.36,
        diffusion: 1.0,
        gain: 0.32,
        gain_hf: 0.89,
        decay_time: 1.49,
        decay_hf_ratio: 0.59,
        reflections_gain: 0.25,
        reflections_delay: 0.007,
        late_reverb_gain: 1.26,
        late_reverb_delay: 0.011,
    };

    /// Outdoor, natural echo from distant trees.
    pub const FOREST: Self = Self {
        density: 0.5,
        diffusion: 0.6,
        gain: 0.28,
        gain_hf: 0.70,
        decay_time: 1.8,
        decay_hf_ratio: 0.5,
        reflections_gain: 0.08,
        reflections_delay: 0.030,
        late_reverb_gain: 0.5,
        late_reverb_delay: 0.045,
    };

    pub const UNDERWATER: Self = Self {
        density: 0.36,
        diffusion: 1.0,
        gain: 0.32,
        gain_hf: 0.01,
        decay_time: 8.0,
        decay_hf_ratio: 0.2,
        reflections_gain: 0.4,
        reflections_delay: 0.02,
        late_reverb_gain: 1.0,
        late_reverb_delay: 0.04,
    };
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self::GENERIC
    }
}

impl Default for EchoParams {
    fn default() -> Self {
        Self {
            delay: 0.1,
            lr_delay: 0.1,
            damping: 0.5,
            feedback: 0.5,
            spread: -1.0,
        }
    }
}
