//! Playback vocabulary shared by voices, ambience and music.
//!
//! - [`LoopMode`]: whether a voice repeats its playable
//! - [`Playable`]: a sound asset as seen by a voice
//! - [`PlaybackState`]: re-exported backend state of a voice

use crate::backend::BufferId;
use crate::resource::AssetId;
use std::time::Duration;

pub use crate::backend::PlaybackState;

/// Loop mode for voice playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Play once and stop
    #[default]
    Once,
    /// Loop until stopped
    Infinite,
}

impl LoopMode {
    pub fn is_looping(&self) -> bool {
        matches!(self, Self::Infinite)
    }
}

/// A sound or music asset that a voice can play.
///
/// A playable is a sequence of backend buffers ("chunks"). One chunk means
/// the voice binds it statically; more than one means the chunks are queued
/// in order and streamed. Implementations are produced by the resource layer
/// and may still be loading; voices refuse to play a playable that is not
/// loaded.
pub trait Playable: Send + Sync {
    /// Resource name, used in logs and load notifications
    fn name(&self) -> &str;

    /// Number of sequential buffer chunks (0 while not loaded)
    fn chunk_count(&self) -> usize;

    /// Backend buffer for a chunk index
    fn buffer(&self, chunk: usize) -> Option<BufferId>;

    /// Nominal play time at pitch 1.0
    fn duration(&self) -> Duration;

    fn is_loaded(&self) -> bool;

    /// Whether loading ended in failure (it will never become loaded)
    fn is_failed(&self) -> bool {
        false
    }

    /// Asset id to subscribe to for load notifications, if the playable has one
    fn asset_id(&self) -> Option<AssetId> {
        None
    }

    fn is_streamed(&self) -> bool {
        self.chunk_count() > 1
    }
}

impl std::fmt::Debug for dyn Playable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playable")
            .field("name", &self.name())
            .field("chunks", &self.chunk_count())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
