use crate::backend::{BufferData, BufferId};
use crate::context::{AudioContext, ReleaseSender, Released};
use crate::decoder::DecodedAudio;
use crate::error::{AmbivoxError, Result};
use crate::playback::Playable;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use uuid::Uuid;

/// Frames per backend buffer when a music track is split for streaming.
pub const MUSIC_CHUNK_FRAMES: usize = 65536;

/// Unique identifier of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetId(Uuid);

impl AssetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AssetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AssetId({})", self.0)
    }
}

/// How an asset is stored on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// One static buffer
    Sound,
    /// A queue of [`MUSIC_CHUNK_FRAMES`]-sized buffers
    Music,
}

struct LoadedBuffers {
    buffers: Vec<BufferId>,
    duration: Duration,
    release: ReleaseSender,
}

impl Drop for LoadedBuffers {
    fn drop(&mut self) {
        for buffer in self.buffers.drain(..) {
            let _ = self.release.send(Released::Buffer(buffer));
        }
    }
}

enum AssetState {
    Pending,
    Ready(LoadedBuffers),
    Failed(String),
}

/// A sound or music asset, possibly still loading.
pub struct AudioAsset {
    id: AssetId,
    name: String,
    kind: AssetKind,
    path: Option<PathBuf>,
    state: RwLock<AssetState>,
}

impl AudioAsset {
    pub(crate) fn pending(name: impl Into<String>, kind: AssetKind, path: Option<PathBuf>) -> Self {
        Self {
            id: AssetId::new(),
            name: name.into(),
            kind,
            path,
            state: RwLock::new(AssetState::Pending),
        }
    }

    /// Uploads in-memory PCM and returns a ready asset.
    pub fn from_samples(
        context: &AudioContext,
        name: impl Into<String>,
        kind: AssetKind,
        audio: DecodedAudio,
    ) -> Result<Arc<Self>> {
        let asset = Self::pending(name, kind, None);
        asset.upload(context, &audio)?;
        Ok(Arc::new(asset))
    }

    fn read(&self) -> RwLockReadGuard<'_, AssetState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AssetState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Splits `audio` into backend buffers and marks the asset ready.
    pub(crate) fn upload(&self, context: &AudioContext, audio: &DecodedAudio) -> Result<()> {
        if audio.is_empty() || audio.channels == 0 {
            return Err(AmbivoxError::AudioFormat(format!(
                "'{}' has no samples",
                self.name
            )));
        }

        let chunk_samples = match self.kind {
            AssetKind::Sound => audio.samples.len(),
            AssetKind::Music => MUSIC_CHUNK_FRAMES * audio.channels as usize,
        };

        // Buffers created so far are released if a later upload fails
        let mut loaded = LoadedBuffers {
            buffers: Vec::new(),
            duration: audio.duration(),
            release: context.release_sender(),
        };
        for chunk in audio.samples.chunks(chunk_samples) {
            let buffer = context.upload_buffer(&BufferData {
                samples: chunk,
                channels: audio.channels,
                sample_rate: audio.sample_rate,
            })?;
            loaded.buffers.push(buffer);
        }

        log::debug!(
            "Uploaded '{}' as {} buffer(s), {:.2}s",
            self.name,
            loaded.buffers.len(),
            loaded.duration.as_secs_f32()
        );
        *self.write() = AssetState::Ready(loaded);
        Ok(())
    }

    pub(crate) fn fail(&self, reason: impl Into<String>) {
        *self.write() = AssetState::Failed(reason.into());
    }

    pub fn id(&self) -> AssetId {
        self.id
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.read(), AssetState::Pending)
    }

    pub fn is_failed(&self) -> bool {
        matches!(*self.read(), AssetState::Failed(_))
    }

    /// Reason the load failed, if it did.
    pub fn failure(&self) -> Option<String> {
        match &*self.read() {
            AssetState::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }
}

impl Playable for AudioAsset {
    fn name(&self) -> &str {
        &self.name
    }

    fn chunk_count(&self) -> usize {
        match &*self.read() {
            AssetState::Ready(loaded) => loaded.buffers.len(),
            _ => 0,
        }
    }

    fn buffer(&self, chunk: usize) -> Option<BufferId> {
        match &*self.read() {
            AssetState::Ready(loaded) => loaded.buffers.get(chunk).copied(),
            _ => None,
        }
    }

    fn duration(&self) -> Duration {
        match &*self.read() {
            AssetState::Ready(loaded) => loaded.duration,
            _ => Duration::ZERO,
        }
    }

    fn is_loaded(&self) -> bool {
        matches!(*self.read(), AssetState::Ready(_))
    }

    fn is_failed(&self) -> bool {
        AudioAsset::is_failed(self)
    }

    fn asset_id(&self) -> Option<AssetId> {
        Some(self.id)
    }
}

impl std::fmt::Debug for AudioAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioAsset")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
