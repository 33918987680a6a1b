//! Voice-pooled spatial audio playback.
//!
//! An [`AudioContext`] owns the backend device and a fixed pool of voices.
//! Gameplay code borrows voices from the pool, drives them through
//! play/pause/stop, and gives them back by dropping the handle. On top of the
//! pool sit two schedulers: [`Ambience`] scatters one-shot sounds around the
//! listener over a looping bed, and [`TrackMixer`] crossfades background
//! music between two decks.

pub mod ambience;
pub mod backend;
pub mod config;
pub mod context;
pub mod decoder;
pub mod effects;
pub mod error;
pub mod events;
pub mod math;
pub mod mixer;
pub mod playback;
pub mod pool;
pub mod resource;
pub mod voice;

pub use ambience::{Ambience, AmbienceSound, LoopSound, SoundSet};
pub use backend::{
    AudioBackend, BackendCaps, DistanceModel, EffectKind, FilterKind, OutputDesc, OutputStream,
    ReverbParams, SoftwareBackend, SoftwareBackendDesc, SoftwareMixer,
};
pub use config::{AmbienceDesc, AudioDesc};
pub use context::{AudioContext, ContextStatus};
pub use decoder::{ConvertToMono, DecodeOptions, DecodedAudio, SymphoniaDecoder, WaveDecoder};
pub use effects::{Effect, EffectSlot, Filter};
pub use error::{AmbivoxError, Result};
pub use events::LoadEvent;
pub use math::{ListenerState, Pose};
pub use mixer::{CROSSFADE_STEP, Deck, TrackMixer};
pub use playback::{LoopMode, Playable, PlaybackState};
pub use pool::SlotKey;
pub use resource::{AssetId, AssetKind, AssetLoader, AudioAsset, LoadNotifier, LoadSubscription};
pub use voice::{Voice, VoiceFlags, VoiceParams};
