//! Background music with linear crossfades between two decks.
//!
//! [`TrackMixer`] holds two voices for its whole lifetime. A new track either
//! replaces the current one in place or starts silent on the other deck and
//! fades in while the old deck fades out, one [`CROSSFADE_STEP`] per
//! [`update`](TrackMixer::update).

use crate::context::AudioContext;
use crate::events::LoadEvent;
use crate::playback::{LoopMode, Playable};
use crate::resource::{LoadNotifier, LoadSubscription};
use crate::voice::Voice;
use std::sync::Arc;

/// Gain change per tick while crossfading.
pub const CROSSFADE_STEP: f32 = 0.01;

/// Incoming gain this close to the target counts as arrived.
const SNAP_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deck {
    A,
    B,
}

impl Deck {
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

struct PendingTrack {
    track: Arc<dyn Playable>,
    fade: bool,
    subscription: LoadSubscription,
}

pub struct TrackMixer {
    notifier: Arc<LoadNotifier>,
    decks: Option<[Voice; 2]>,
    current: Option<Deck>,
    fading: bool,
    volume: f32,
    pending: Option<PendingTrack>,
}

impl TrackMixer {
    /// Takes two voices from the pool. Without them the mixer stays inert.
    pub fn new(context: Arc<AudioContext>, notifier: Arc<LoadNotifier>) -> Self {
        let volume = context.desc().music_volume.clamp(0.0, 1.0);
        let decks = match (context.allocate_voice(), context.allocate_voice()) {
            (Some(a), Some(b)) => {
                for voice in [&a, &b] {
                    voice.set_relative(true);
                    voice.set_gain(0.0);
                }
                Some([a, b])
            }
            _ => {
                log::warn!("Not enough voices for music playback");
                None
            }
        };
        Self {
            notifier,
            decks,
            current: None,
            fading: false,
            volume,
            pending: None,
        }
    }

    fn deck(&self, deck: Deck) -> Option<&Voice> {
        self.decks.as_ref().map(|decks| &decks[deck.index()])
    }

    /// Switches to `track`, crossfading when `fade` is set.
    ///
    /// A track that is still loading is started once its load finishes.
    pub fn set_sound_track(&mut self, track: Arc<dyn Playable>, fade: bool) -> bool {
        if self.decks.is_none() {
            log::warn!("Music playback unavailable, ignoring '{}'", track.name());
            return false;
        }
        self.pending = None;

        if !track.is_loaded() {
            if track.is_failed() {
                log::warn!("Music track '{}' failed to load", track.name());
                return false;
            }
            let Some(asset) = track.asset_id() else {
                log::warn!(
                    "Music track '{}' is not loaded and can't be waited for",
                    track.name()
                );
                return false;
            };
            let subscription = self.notifier.subscribe(asset);
            if !track.is_loaded() {
                log::debug!("Waiting for music track '{}' to load", track.name());
                self.pending = Some(PendingTrack {
                    track,
                    fade,
                    subscription,
                });
                return true;
            }
        }

        self.start_track(track, fade)
    }

    fn start_track(&mut self, track: Arc<dyn Playable>, fade: bool) -> bool {
        let Some(decks) = &self.decks else {
            return false;
        };

        if fade {
            let incoming = self.current.map_or(Deck::A, Deck::other);
            let voice = &decks[incoming.index()];
            voice.set_gain(0.0);
            if !voice.play(track.clone(), LoopMode::Infinite) {
                return false;
            }
            log::info!("Crossfading to '{}' on deck {:?}", track.name(), incoming);
            self.current = Some(incoming);
            if self.volume <= SNAP_EPSILON {
                // Silent target: the fade is already complete
                let outgoing = &decks[incoming.other().index()];
                voice.set_gain(self.volume);
                outgoing.set_gain(0.0);
                outgoing.stop();
                self.fading = false;
            } else {
                self.fading = true;
            }
        } else {
            let deck = self.current.unwrap_or(Deck::A);
            if self.fading {
                let outgoing = &decks[deck.other().index()];
                outgoing.stop();
                outgoing.set_gain(0.0);
            }
            let voice = &decks[deck.index()];
            voice.set_gain(self.volume);
            if !voice.play(track.clone(), LoopMode::Infinite) {
                return false;
            }
            log::info!("Playing '{}' on deck {:?}", track.name(), deck);
            self.current = Some(deck);
            self.fading = false;
        }
        true
    }

    fn poll_pending(&mut self) {
        let Some(event) = self
            .pending
            .as_ref()
            .and_then(|pending| pending.subscription.try_recv())
        else {
            return;
        };
        let Some(pending) = self.pending.take() else {
            return;
        };
        match event {
            LoadEvent::Finished { .. } => {
                self.start_track(pending.track, pending.fade);
            }
            LoadEvent::Failed { name, reason, .. } => {
                log::warn!("Music track '{}' failed to load: {}", name, reason);
            }
        }
    }

    /// Advances a running crossfade by one step.
    pub fn update(&mut self) {
        self.poll_pending();
        if !self.fading {
            return;
        }
        let (Some(current), Some(decks)) = (self.current, &self.decks) else {
            self.fading = false;
            return;
        };

        let target = self.volume;
        let incoming = &decks[current.index()];
        let outgoing = &decks[current.other().index()];
        let in_gain = (incoming.gain() + CROSSFADE_STEP).min(target);
        let out_gain = (outgoing.gain() - CROSSFADE_STEP).clamp(0.0, target);

        if in_gain >= target - SNAP_EPSILON {
            incoming.set_gain(target);
            outgoing.set_gain(0.0);
            outgoing.stop();
            self.fading = false;
            log::debug!("Crossfade to deck {:?} complete", current);
        } else {
            incoming.set_gain(in_gain);
            outgoing.set_gain(out_gain);
        }
    }

    /// Sets the music gain, clamped to `0.0..=1.0`, and applies it to the
    /// current deck. A running crossfade completes on the next update.
    pub fn set_volume(&mut self, gain: f32) {
        self.volume = gain.clamp(0.0, 1.0);
        if let Some(voice) = self.current.and_then(|deck| self.deck(deck)) {
            voice.set_gain(self.volume);
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn pause(&mut self) -> bool {
        let Some(current) = self.current else {
            return false;
        };
        if self.fading {
            if let Some(outgoing) = self.deck(current.other()) {
                outgoing.pause();
            }
        }
        self.deck(current).is_some_and(Voice::pause)
    }

    pub fn resume(&mut self) -> bool {
        let Some(current) = self.current else {
            return false;
        };
        if self.fading {
            if let Some(outgoing) = self.deck(current.other()) {
                outgoing.resume();
            }
        }
        self.deck(current).is_some_and(Voice::resume)
    }

    /// Stops both decks and drops any track still waiting to load.
    pub fn stop(&mut self) {
        self.pending = None;
        if let Some(decks) = &self.decks {
            for voice in decks {
                voice.stop();
            }
        }
        self.fading = false;
    }

    pub fn current(&self) -> Option<Deck> {
        self.current
    }

    pub fn is_fading(&self) -> bool {
        self.fading
    }

    pub fn has_pending_track(&self) -> bool {
        self.pending.is_some()
    }

    pub fn voice(&self, deck: Deck) -> Option<&Voice> {
        self.deck(deck)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::config::AudioDesc;
    use crate::decoder::DecodedAudio;
    use crate::playback::PlaybackState;
    use crate::resource::{AssetKind, AudioAsset};

    fn setup(music_volume: f32) -> (Arc<AudioContext>, Arc<LoadNotifier>, TrackMixer) {
        let (backend, _handle) = MockBackend::new(4, 0);
        let desc = AudioDesc::default().music_volume(music_volume);
        let context = AudioContext::new(desc, backend);
        assert!(context.initialize());
        let notifier = LoadNotifier::new();
        let mixer = TrackMixer::new(context.clone(), notifier.clone());
        (context, notifier, mixer)
    }

    fn track(context: &AudioContext, name: &str) -> Arc<dyn Playable> {
        let audio = DecodedAudio::new(vec![0.0; 4800 * 2], 48000, 2);
        AudioAsset::from_samples(context, name, AssetKind::Music, audio).unwrap()
    }

    #[test]
    fn test_direct_play_uses_deck_a() {
        let (context, _notifier, mut mixer) = setup(0.7);
        assert!(mixer.set_sound_track(track(&context, "intro"), false));
        assert_eq!(mixer.current(), Some(Deck::A));
        assert!(!mixer.is_fading());
        let a = mixer.voice(Deck::A).unwrap();
        assert_eq!(a.gain(), 0.7);
        assert_eq!(a.state(), PlaybackState::Playing);
        assert!(a.flags().looping);
    }

    #[test]
    fn test_crossfade_takes_ceil_volume_over_step_updates() {
        for volume in [0.0f32, 0.05, 0.33, 0.8, 1.0] {
            let (context, _notifier, mut mixer) = setup(volume);
            mixer.set_sound_track(track(&context, "first"), false);
            assert!(mixer.set_sound_track(track(&context, "second"), true));
            assert_eq!(mixer.current(), Some(Deck::B));

            // Tolerance absorbs f32 error in the quotient, e.g. 0.33 / 0.01
            let updates = (volume / CROSSFADE_STEP - 1e-3).ceil().max(0.0) as usize;
            if updates > 0 {
                for _ in 0..updates - 1 {
                    mixer.update();
                }
                assert!(mixer.is_fading(), "volume {volume}: finished early");
                let b = mixer.voice(Deck::B).unwrap().gain();
                assert!(b < volume, "volume {volume}: incoming already at {b}");
                mixer.update();
            }
            assert!(!mixer.is_fading(), "volume {volume}: still fading");
            assert_eq!(mixer.voice(Deck::B).unwrap().gain(), volume);
            let a = mixer.voice(Deck::A).unwrap();
            assert_eq!(a.gain(), 0.0);
            assert_eq!(a.state(), PlaybackState::Stopped);
        }
    }

    #[test]
    fn test_crossfade_moves_both_decks() {
        let (context, _notifier, mut mixer) = setup(0.5);
        mixer.set_sound_track(track(&context, "first"), false);
        assert!(mixer.set_sound_track(track(&context, "second"), true));
        assert_eq!(mixer.voice(Deck::B).unwrap().gain(), 0.0);

        for _ in 0..10 {
            mixer.update();
        }
        let b = mixer.voice(Deck::B).unwrap().gain();
        let a = mixer.voice(Deck::A).unwrap().gain();
        assert!((b - 0.1).abs() < 1e-4);
        assert!((a - 0.4).abs() < 1e-4);
    }

    #[test]
    fn test_set_volume_clamps_and_applies() {
        let (context, _notifier, mut mixer) = setup(0.5);
        mixer.set_sound_track(track(&context, "loop"), false);
        mixer.set_volume(1.4);
        assert_eq!(mixer.volume(), 1.0);
        assert_eq!(mixer.voice(Deck::A).unwrap().gain(), 1.0);
        mixer.set_volume(-1.0);
        assert_eq!(mixer.volume(), 0.0);
    }

    #[test]
    fn test_set_volume_during_fade_finishes_it() {
        let (context, _notifier, mut mixer) = setup(0.5);
        mixer.set_sound_track(track(&context, "first"), false);
        mixer.set_sound_track(track(&context, "second"), true);
        mixer.update();
        mixer.set_volume(0.4);
        assert_eq!(mixer.voice(Deck::B).unwrap().gain(), 0.4);
        mixer.update();
        assert!(!mixer.is_fading());
        assert_eq!(mixer.voice(Deck::A).unwrap().gain(), 0.0);
    }

    #[test]
    fn test_pause_resume_stop_without_track() {
        let (_context, _notifier, mut mixer) = setup(0.5);
        assert!(!mixer.pause());
        assert!(!mixer.resume());
        mixer.stop();
        assert_eq!(mixer.current(), None);
    }

    #[test]
    fn test_pause_and_resume_current() {
        let (context, _notifier, mut mixer) = setup(0.5);
        mixer.set_sound_track(track(&context, "loop"), false);
        assert!(mixer.pause());
        assert_eq!(mixer.voice(Deck::A).unwrap().state(), PlaybackState::Paused);
        assert!(mixer.resume());
        assert_eq!(mixer.voice(Deck::A).unwrap().state(), PlaybackState::Playing);
        mixer.stop();
        assert_eq!(mixer.voice(Deck::A).unwrap().state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_deferred_track_starts_on_load() {
        let (context, notifier, mut mixer) = setup(0.6);
        let asset = Arc::new(AudioAsset::pending("late", AssetKind::Music, None));
        assert!(mixer.set_sound_track(asset.clone(), false));
        assert!(mixer.has_pending_track());
        assert_eq!(mixer.current(), None);

        asset
            .upload(&context, &DecodedAudio::new(vec![0.0; 960], 48000, 2))
            .unwrap();
        notifier.publish(LoadEvent::Finished {
            asset: asset.id(),
            name: "late".into(),
        });
        mixer.update();
        assert!(!mixer.has_pending_track());
        assert_eq!(mixer.current(), Some(Deck::A));
        assert!(mixer.voice(Deck::A).unwrap().is_playing());
    }

    #[test]
    fn test_failed_track_is_abandoned() {
        let (_context, notifier, mut mixer) = setup(0.6);
        let asset = Arc::new(AudioAsset::pending("broken", AssetKind::Music, None));
        assert!(mixer.set_sound_track(asset.clone(), true));
        asset.fail("bad header");
        notifier.publish(LoadEvent::Failed {
            asset: asset.id(),
            name: "broken".into(),
            reason: "bad header".into(),
        });
        mixer.update();
        assert!(!mixer.has_pending_track());
        assert_eq!(mixer.current(), None);
        assert!(!mixer.set_sound_track(asset, true));
    }

    #[test]
    fn test_inert_without_voices() {
        let (backend, _handle) = MockBackend::new(1, 0);
        let context = AudioContext::new(AudioDesc::default(), backend);
        assert!(context.initialize());
        let mut mixer = TrackMixer::new(context.clone(), LoadNotifier::new());
        assert_eq!(context.available_voice_count(), 1);
        assert!(!mixer.set_sound_track(track(&context, "x"), false));
    }
}
