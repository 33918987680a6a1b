//! Ambient soundscapes: a looping bed plus randomly timed scatter sounds.
//!
//! An [`Ambience`] borrows voices from the context's pool when started and
//! gives them back when stopped. The host calls [`Ambience::update`] once per
//! tick with the elapsed time; each scatter channel either counts down or
//! plays one randomly chosen sound somewhere around the listener.

mod channel;
mod sound;
mod sound_set;

pub use channel::{AmbienceChannel, MIN_COUNTDOWN};
pub use sound::{AmbienceSound, LoopSound, random_delay};
pub use sound_set::{LoopEntry, SoundEntry, SoundSet};

use crate::config::AmbienceDesc;
use crate::context::AudioContext;
use crate::effects::Filter;
use crate::events::LoadEvent;
use crate::playback::{LoopMode, Playable};
use crate::resource::{AssetLoader, LoadNotifier, LoadSubscription};
use crate::voice::Voice;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use std::path::Path;
use std::sync::Arc;

pub struct Ambience {
    context: Arc<AudioContext>,
    notifier: Arc<LoadNotifier>,
    settings: AmbienceDesc,
    loop_sound: Option<LoopSound>,
    sounds: Vec<AmbienceSound>,
    loop_voice: Option<Voice>,
    channels: Vec<AmbienceChannel>,
    direct_filter: Option<Arc<Filter>>,
    playing: bool,
    pending_loop: Option<LoadSubscription>,
    rng: Pcg32,
}

impl Ambience {
    pub fn new(context: Arc<AudioContext>, notifier: Arc<LoadNotifier>) -> Self {
        Self::with_rng(context, notifier, Pcg32::from_rng(&mut rand::rng()))
    }

    /// Deterministic scheduling, for tests and replays.
    pub fn with_seed(context: Arc<AudioContext>, notifier: Arc<LoadNotifier>, seed: u64) -> Self {
        Self::with_rng(context, notifier, Pcg32::seed_from_u64(seed))
    }

    fn with_rng(context: Arc<AudioContext>, notifier: Arc<LoadNotifier>, rng: Pcg32) -> Self {
        let settings = context.desc().ambience.clone();
        Self {
            context,
            notifier,
            settings,
            loop_sound: None,
            sounds: Vec::new(),
            loop_voice: None,
            channels: Vec::new(),
            direct_filter: None,
            playing: false,
            pending_loop: None,
            rng,
        }
    }

    pub fn settings(&self) -> &AmbienceDesc {
        &self.settings
    }

    /// Replaces scheduling parameters. Channel count and radius changes
    /// take the same path as [`set_channel_count`](Self::set_channel_count)
    /// and [`set_radius`](Self::set_radius).
    pub fn set_settings(&mut self, settings: AmbienceDesc) {
        let channels = settings.channels;
        let radius = settings.radius;
        self.settings.min_delay = settings.min_delay;
        self.settings.max_delay = settings.max_delay;
        self.settings.random_velocity = settings.random_velocity;
        self.set_radius(radius);
        self.set_channel_count(channels);
    }

    pub fn set_loop_sound(&mut self, loop_sound: Option<LoopSound>) {
        self.loop_sound = loop_sound;
    }

    pub fn loop_sound(&self) -> Option<&LoopSound> {
        self.loop_sound.as_ref()
    }

    pub fn add_sound(&mut self, sound: AmbienceSound) {
        self.sounds.push(sound);
    }

    pub fn set_sounds(&mut self, sounds: Vec<AmbienceSound>) {
        self.sounds = sounds;
    }

    pub fn sounds(&self) -> &[AmbienceSound] {
        &self.sounds
    }

    /// Reads a sound-set file, requests its assets and replaces the configuration.
    ///
    /// A playing ambience is restarted with the new set.
    pub fn load_sound_set(&mut self, path: impl AsRef<Path>, loader: &AssetLoader) -> bool {
        let path = path.as_ref();
        let set = match SoundSet::from_json_file(path) {
            Ok(set) => set,
            Err(e) => {
                log::error!("Failed to read sound set '{}': {}", path.display(), e);
                return false;
            }
        };
        if !self.apply_sound_set(&set, loader) {
            return false;
        }
        log::info!(
            "Loaded sound set '{}' ({} scatter sound(s), loop: {})",
            path.display(),
            self.sounds.len(),
            self.loop_sound.is_some()
        );
        true
    }

    /// Replaces the configuration with `set`. An invalid set is rejected and
    /// the current configuration kept.
    pub fn apply_sound_set(&mut self, set: &SoundSet, loader: &AssetLoader) -> bool {
        if let Err(e) = set.validate() {
            log::error!("Rejected sound set: {}", e);
            return false;
        }
        let was_playing = self.playing;
        self.stop();

        self.settings = set.settings(&self.context.desc().ambience);
        self.loop_sound = set.loop_sound.as_ref().map(|entry| {
            let asset = loader.request_sound(set.resolve(&entry.file));
            LoopSound::new(asset, entry.gain)
        });
        self.sounds = set
            .sounds
            .iter()
            .map(|entry| {
                let asset = loader.request_sound(set.resolve(&entry.file));
                AmbienceSound::new(asset)
                    .gain(entry.gain)
                    .pitch_range(entry.min_pitch, entry.max_pitch)
                    .relative(entry.relative)
                    .velocity(entry.velocity)
            })
            .collect();

        if was_playing {
            self.start();
        }
        true
    }

    /// Takes voices from the pool for the loop bed and the scatter channels.
    ///
    /// Stops at the first exhausted allocation. Succeeds when at least one
    /// scatter voice was obtained, or, with no scatter sounds configured,
    /// when the loop voice was obtained. Voices already obtained are kept
    /// either way.
    pub fn allocate_sources(&mut self) -> bool {
        if self.loop_sound.is_some() && self.loop_voice.is_none() {
            match self.context.allocate_voice() {
                Some(voice) => {
                    self.configure_loop_voice(&voice);
                    self.loop_voice = Some(voice);
                }
                None => log::warn!("No voice available for the ambience loop"),
            }
        }

        if self.sounds.is_empty() {
            return self.loop_voice.is_some();
        }

        while self.channels.len() < self.settings.channels {
            let Some(voice) = self.context.allocate_voice() else {
                log::warn!(
                    "Voice pool exhausted after {} of {} ambience channels",
                    self.channels.len(),
                    self.settings.channels
                );
                break;
            };
            if let Some(filter) = &self.direct_filter {
                voice.set_direct_filter(filter.clone());
            }
            self.channels.push(AmbienceChannel::new(voice, &self.settings));
        }
        !self.channels.is_empty()
    }

    fn configure_loop_voice(&self, voice: &Voice) {
        let gain = self.loop_sound.as_ref().map_or(1.0, |l| l.gain);
        voice.set_relative(true);
        voice.set_position(crate::math::Vec3::ZERO);
        voice.set_gain(gain);
        if let Some(filter) = &self.direct_filter {
            voice.set_direct_filter(filter.clone());
        }
    }

    pub fn start(&mut self) -> bool {
        if self.loop_sound.is_none() && self.sounds.is_empty() {
            log::warn!("Ambience has no loop or scatter sounds configured, not starting");
            return false;
        }
        if self.playing {
            return true;
        }
        if !self.allocate_sources() {
            log::warn!("Ambience could not allocate any voices");
            self.release_voices();
            return false;
        }

        self.playing = true;
        self.start_loop();
        for channel in &mut self.channels {
            channel.schedule(&mut self.rng, &self.settings);
        }
        log::info!(
            "Ambience started ({} channel(s), loop: {})",
            self.channels.len(),
            self.loop_voice.is_some()
        );
        true
    }

    fn start_loop(&mut self) {
        let (Some(loop_sound), Some(voice)) = (&self.loop_sound, &self.loop_voice) else {
            return;
        };
        let playable = loop_sound.playable.clone();
        if playable.is_loaded() {
            voice.play(playable, LoopMode::Infinite);
            return;
        }
        if playable.is_failed() {
            log::warn!("Ambience loop '{}' failed to load", playable.name());
            return;
        }
        let Some(asset) = playable.asset_id() else {
            log::warn!(
                "Ambience loop '{}' is not loaded and can't be waited for",
                playable.name()
            );
            return;
        };

        log::debug!("Waiting for ambience loop '{}' to load", playable.name());
        self.pending_loop = Some(self.notifier.subscribe(asset));
        // Loaded between the first check and subscribing
        if playable.is_loaded() {
            self.pending_loop = None;
            voice.play(playable, LoopMode::Infinite);
        }
    }

    fn poll_loop_load(&mut self) {
        let Some(event) = self.pending_loop.as_ref().and_then(|sub| sub.try_recv()) else {
            return;
        };
        self.pending_loop = None;
        match event {
            LoadEvent::Finished { .. } => {
                if let (Some(loop_sound), Some(voice)) = (&self.loop_sound, &self.loop_voice) {
                    voice.play(loop_sound.playable.clone(), LoopMode::Infinite);
                }
            }
            LoadEvent::Failed { name, reason, .. } => {
                log::warn!("Ambience loop '{}' failed to load: {}", name, reason);
            }
        }
    }

    /// Advances the scheduler by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        if !self.playing {
            return;
        }
        self.poll_loop_load();

        let listener = self.context.listener();
        let Self {
            channels,
            sounds,
            settings,
            rng,
            ..
        } = self;
        for channel in channels.iter_mut() {
            channel.tick(dt, sounds, settings, &listener, &mut *rng);
        }
    }

    /// Returns every voice to the pool. Idempotent.
    pub fn stop(&mut self) {
        if !self.playing && self.loop_voice.is_none() && self.channels.is_empty() {
            return;
        }
        self.release_voices();
        self.playing = false;
        log::info!("Ambience stopped");
    }

    fn release_voices(&mut self) {
        self.pending_loop = None;
        self.loop_voice = None;
        self.channels.clear();
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn radius(&self) -> f32 {
        self.settings.radius
    }

    pub fn set_radius(&mut self, radius: f32) {
        if !radius.is_finite() || radius <= 0.0 {
            log::warn!("Ignoring ambience radius {}", radius);
            return;
        }
        self.settings.radius = radius;
        for channel in &self.channels {
            channel.apply_radius(radius);
        }
    }

    /// Takes effect on the next start; a playing ambience is restarted.
    pub fn set_channel_count(&mut self, count: usize) {
        if count == self.settings.channels {
            return;
        }
        self.settings.channels = count;
        if self.playing {
            self.stop();
            self.start();
        }
    }

    pub fn channel_count(&self) -> usize {
        self.settings.channels
    }

    /// Scatter channels currently holding a voice.
    pub fn channels(&self) -> &[AmbienceChannel] {
        &self.channels
    }

    pub fn loop_voice(&self) -> Option<&Voice> {
        self.loop_voice.as_ref()
    }

    pub fn enable_direct_filter(&mut self, filter: Arc<Filter>) {
        for voice in self.held_voices() {
            voice.set_direct_filter(filter.clone());
        }
        self.direct_filter = Some(filter);
    }

    pub fn disable_direct_filter(&mut self) {
        if self.direct_filter.take().is_none() {
            return;
        }
        for voice in self.held_voices() {
            voice.clear_direct_filter();
        }
    }

    pub fn direct_filter(&self) -> Option<&Arc<Filter>> {
        self.direct_filter.as_ref()
    }

    fn held_voices(&self) -> impl Iterator<Item = &Voice> {
        self.loop_voice
            .iter()
            .chain(self.channels.iter().map(AmbienceChannel::voice))
    }
}

impl Drop for Ambience {
    fn drop(&mut self) {
        self.stop();
    }
}
