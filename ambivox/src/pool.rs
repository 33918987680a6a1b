//! Fixed-capacity voice pool.
//!
//! Slots are created once at context initialization and recycled through a
//! free list. A [`SlotKey`] carries the slot's generation at acquisition time,
//! so a key that outlived a release (or a shutdown) no longer resolves.

use crate::backend::AudioBackend;
use crate::voice::VoiceState;

/// Generation-checked reference to a pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    index: usize,
    generation: u32,
}

impl SlotKey {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

struct PoolSlot {
    generation: u32,
    held: bool,
    voice: VoiceState,
}

pub(crate) struct VoicePool {
    slots: Vec<PoolSlot>,
    free: Vec<usize>,
}

impl VoicePool {
    pub fn empty() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Creates up to `count` backend sources. Stops at the first failure.
    pub fn build(backend: &mut dyn AudioBackend, count: usize) -> Self {
        let mut slots = Vec::with_capacity(count);
        for created in 0..count {
            match backend.create_source() {
                Ok(source) => slots.push(PoolSlot {
                    generation: 0,
                    held: false,
                    voice: VoiceState::new(Some(source)),
                }),
                Err(e) => {
                    log::warn!("Created only {} of {} voices: {}", created, count, e);
                    break;
                }
            }
        }
        // Popped from the back, so slot 0 is handed out first
        let free = (0..slots.len()).rev().collect();
        Self { slots, free }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn acquire(&mut self) -> Option<SlotKey> {
        let index = self.free.pop()?;
        let slot = &mut self.slots[index];
        slot.held = true;
        Some(SlotKey {
            index,
            generation: slot.generation,
        })
    }

    fn slot_mut(&mut self, key: SlotKey) -> Option<&mut PoolSlot> {
        self.slots
            .get_mut(key.index)
            .filter(|slot| slot.held && slot.generation == key.generation)
    }

    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut VoiceState> {
        self.slot_mut(key).map(|slot| &mut slot.voice)
    }

    /// Resets the voice and returns the slot to the free list.
    pub fn release(&mut self, key: SlotKey, backend: &mut dyn AudioBackend) -> bool {
        let Some(slot) = self.slot_mut(key) else {
            return false;
        };
        slot.voice.reset(backend);
        slot.held = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        true
    }

    /// Deletes every backend source. All outstanding keys become stale.
    pub fn teardown(&mut self, backend: &mut dyn AudioBackend) {
        for slot in &mut self.slots {
            slot.voice.destroy(backend);
        }
        self.slots.clear();
        self.free.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;

    #[test]
    fn test_acquire_until_exhausted() {
        let (mut backend, _handle) = MockBackend::new(8, 0);
        let mut pool = VoicePool::build(&mut backend, 2);
        assert_eq!(pool.capacity(), 2);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert!(pool.acquire().is_none());
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_build_stops_at_backend_limit() {
        let (mut backend, _handle) = MockBackend::new(3, 0);
        let pool = VoicePool::build(&mut backend, 10);
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn test_release_invalidates_key() {
        let (mut backend, _handle) = MockBackend::new(4, 0);
        let mut pool = VoicePool::build(&mut backend, 1);

        let key = pool.acquire().unwrap();
        assert!(pool.get_mut(key).is_some());
        assert!(pool.release(key, &mut backend));
        assert!(pool.get_mut(key).is_none());
        assert!(!pool.release(key, &mut backend));

        let again = pool.acquire().unwrap();
        assert_eq!(again.index(), key.index());
        assert_ne!(again.generation(), key.generation());
    }

    #[test]
    fn test_teardown_deletes_sources() {
        let (mut backend, handle) = MockBackend::new(4, 0);
        let mut pool = VoicePool::build(&mut backend, 4);
        let key = pool.acquire().unwrap();
        assert_eq!(handle.state().sources.len(), 4);

        pool.teardown(&mut backend);
        assert!(handle.state().sources.is_empty());
        assert!(pool.get_mut(key).is_none());
        assert_eq!(pool.capacity(), 0);
    }
}
