use super::{AssetKind, AudioAsset, LoadNotifier};
use crate::context::AudioContext;
use crate::decoder::{DecodeOptions, SymphoniaDecoder, WaveDecoder};
use crate::error::AmbivoxError;
use crate::events::LoadEvent;
use crate::playback::{LoopMode, Playable};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Named asset cache with deferred decoding.
///
/// `request_*` returns a pending asset immediately; the host calls
/// [`process_pending`](Self::process_pending) (typically once per tick, or
/// from a loader thread) to decode and upload queued assets. Every finished
/// or failed load is published through the shared [`LoadNotifier`].
///
/// Entries are keyed by name and [`AssetKind`], so the same file can be held
/// both as a sound and as a music track. A failed load is evicted and the
/// next request for it tries again.
pub struct AssetLoader {
    context: Arc<AudioContext>,
    decoder: Box<dyn WaveDecoder>,
    notifier: Arc<LoadNotifier>,
    assets: Mutex<HashMap<(String, AssetKind), Arc<AudioAsset>>>,
    pending: Mutex<VecDeque<Arc<AudioAsset>>>,
}

impl AssetLoader {
    pub fn new(context: Arc<AudioContext>, notifier: Arc<LoadNotifier>) -> Self {
        Self::with_decoder(context, notifier, SymphoniaDecoder)
    }

    pub fn with_decoder(
        context: Arc<AudioContext>,
        notifier: Arc<LoadNotifier>,
        decoder: impl WaveDecoder + 'static,
    ) -> Self {
        Self {
            context,
            decoder: Box::new(decoder),
            notifier,
            assets: Mutex::new(HashMap::new()),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn context(&self) -> &Arc<AudioContext> {
        &self.context
    }

    pub fn notifier(&self) -> &Arc<LoadNotifier> {
        &self.notifier
    }

    /// Queues a positional sound (decoded to mono).
    pub fn request_sound(&self, path: impl AsRef<Path>) -> Arc<AudioAsset> {
        self.request(path.as_ref(), AssetKind::Sound)
    }

    /// Queues a music track (kept up to stereo, streamed in chunks).
    pub fn request_music(&self, path: impl AsRef<Path>) -> Arc<AudioAsset> {
        self.request(path.as_ref(), AssetKind::Music)
    }

    fn request(&self, path: &Path, kind: AssetKind) -> Arc<AudioAsset> {
        let name = path.to_string_lossy().into_owned();
        let mut assets = self.assets();
        if let Some(asset) = assets.get(&(name.clone(), kind)) {
            return asset.clone();
        }

        let asset = Arc::new(AudioAsset::pending(
            name.clone(),
            kind,
            Some(PathBuf::from(path)),
        ));
        assets.insert((name, kind), asset.clone());
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(asset.clone());
        log::debug!("Queued {:?} '{}'", kind, asset.name());
        asset
    }

    /// Requests a sound and loads it before returning. `None` if the load failed.
    pub fn load_sound_now(&self, path: impl AsRef<Path>) -> Option<Arc<AudioAsset>> {
        let asset = self.request_sound(path);
        if asset.is_pending() {
            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|queued| !Arc::ptr_eq(queued, &asset));
            self.load(&asset);
        }
        asset.is_loaded().then_some(asset)
    }

    /// Loads every queued asset. Returns how many were processed.
    pub fn process_pending(&self) -> usize {
        let mut processed = 0;
        loop {
            let next = self
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front();
            let Some(asset) = next else {
                break;
            };
            self.load(&asset);
            processed += 1;
        }
        processed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn load(&self, asset: &AudioAsset) {
        let frequency = match self.context.capabilities().frequency {
            0 => self.context.desc().frequency,
            granted => granted,
        };
        let options = match asset.kind() {
            AssetKind::Sound => DecodeOptions::sound(frequency),
            AssetKind::Music => DecodeOptions::music(frequency),
        };

        let result = match asset.path() {
            Some(path) => self
                .decoder
                .decode(path, &options)
                .and_then(|audio| asset.upload(&self.context, &audio)),
            None => Err(AmbivoxError::Configuration(format!(
                "'{}' has no source path",
                asset.name()
            ))),
        };

        let event = match result {
            Ok(()) => {
                log::info!("Loaded '{}'", asset.name());
                LoadEvent::Finished {
                    asset: asset.id(),
                    name: asset.name().to_string(),
                }
            }
            Err(e) => {
                log::error!("Failed to load '{}': {}", asset.name(), e);
                asset.fail(e.to_string());
                self.evict(asset);
                LoadEvent::Failed {
                    asset: asset.id(),
                    name: asset.name().to_string(),
                    reason: e.to_string(),
                }
            }
        };
        self.notifier.publish(event);
    }

    fn assets(&self) -> MutexGuard<'_, HashMap<(String, AssetKind), Arc<AudioAsset>>> {
        self.assets.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drops the cache entry for `asset` unless it was replaced meanwhile.
    fn evict(&self, asset: &AudioAsset) {
        let mut assets = self.assets();
        let key = (asset.name().to_string(), asset.kind());
        if assets.get(&key).is_some_and(|cached| cached.id() == asset.id()) {
            assets.remove(&key);
            log::debug!("Evicted failed {:?} '{}'", asset.kind(), asset.name());
        }
    }

    /// Registers an already loaded asset under its name and kind.
    pub fn insert(&self, asset: Arc<AudioAsset>) {
        let key = (asset.name().to_string(), asset.kind());
        self.assets().insert(key, asset);
    }

    /// Looks up a cached asset, preferring the sound over the music entry.
    pub fn find(&self, name: &str) -> Option<Arc<AudioAsset>> {
        self.find_kind(name, AssetKind::Sound)
            .or_else(|| self.find_kind(name, AssetKind::Music))
    }

    pub fn find_kind(&self, name: &str, kind: AssetKind) -> Option<Arc<AudioAsset>> {
        self.assets().get(&(name.to_string(), kind)).cloned()
    }

    /// Drops every cache entry named `name`, returning the sound if there
    /// was one. Voices still playing an asset keep it alive.
    pub fn remove(&self, name: &str) -> Option<Arc<AudioAsset>> {
        let mut assets = self.assets();
        let sound = assets.remove(&(name.to_string(), AssetKind::Sound));
        let music = assets.remove(&(name.to_string(), AssetKind::Music));
        sound.or(music)
    }

    /// Plays a cached asset on the context's default voice.
    pub fn play_named(&self, name: &str, mode: LoopMode, gain: f32) -> bool {
        match self.find(name) {
            Some(asset) => self.context.play(asset, mode, gain),
            None => {
                log::warn!("No asset named '{}'", name);
                false
            }
        }
    }
}
