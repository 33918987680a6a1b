use super::sound::{AmbienceSound, random_delay};
use crate::config::AmbienceDesc;
use crate::math::{ListenerState, Vec3, random_point_in_sphere};
use crate::playback::LoopMode;
use crate::voice::{MAX_PITCH, MIN_PITCH, Voice};
use rand::Rng;

/// Shortest countdown a channel is rescheduled with, in seconds.
pub const MIN_COUNTDOWN: f32 = 1e-3;

/// One independently timed scatter source.
#[derive(Debug)]
pub struct AmbienceChannel {
    voice: Voice,
    position: Vec3,
    velocity: Vec3,
    countdown: f32,
}

impl AmbienceChannel {
    pub(crate) fn new(voice: Voice, settings: &AmbienceDesc) -> Self {
        voice.set_reference_distance(settings.radius * 0.5);
        voice.set_max_distance(settings.radius * 2.0);
        Self {
            voice,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            countdown: 0.0,
        }
    }

    pub fn voice(&self) -> &Voice {
        &self.voice
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Seconds until the channel plays its next sound.
    pub fn countdown(&self) -> f32 {
        self.countdown
    }

    pub(crate) fn schedule<R: Rng + ?Sized>(&mut self, rng: &mut R, settings: &AmbienceDesc) {
        self.countdown = random_delay(rng, settings.min_delay, settings.max_delay).max(MIN_COUNTDOWN);
    }

    pub(crate) fn apply_radius(&self, radius: f32) {
        self.voice.set_reference_distance(radius * 0.5);
        self.voice.set_max_distance(radius * 2.0);
    }

    /// Advances the countdown, or plays one sound and reschedules.
    ///
    /// Returns `true` when a sound was started this tick.
    pub(crate) fn tick<R: Rng + ?Sized>(
        &mut self,
        dt: f32,
        sounds: &[AmbienceSound],
        settings: &AmbienceDesc,
        listener: &ListenerState,
        rng: &mut R,
    ) -> bool {
        if self.velocity != Vec3::ZERO && self.voice.is_playing() {
            self.position += self.velocity * dt;
            self.voice.set_position(self.position);
        }

        if self.countdown > 0.0 {
            self.countdown -= dt;
            return false;
        }
        if sounds.is_empty() {
            self.schedule(rng, settings);
            return false;
        }

        let sound = &sounds[rng.random_range(0..sounds.len())];
        if !sound.playable.is_loaded() {
            log::debug!("Skipping '{}': not loaded yet", sound.playable.name());
            self.schedule(rng, settings);
            return false;
        }

        let pitch = sound.random_pitch(rng).clamp(MIN_PITCH, MAX_PITCH);
        let offset = random_point_in_sphere(rng, settings.radius);
        self.position = if sound.relative {
            offset
        } else {
            listener.pose.position + offset
        };
        self.velocity = if settings.random_velocity && sound.velocity > 0.0 {
            offset.normalize_or_zero() * rng.random_range(-sound.velocity..=sound.velocity)
        } else {
            Vec3::ZERO
        };

        self.voice.set_relative(sound.relative);
        self.voice.set_position(self.position);
        self.voice.set_velocity(self.velocity);
        self.voice.set_gain(sound.gain);
        self.voice.set_pitch(pitch);
        let started = self.voice.play(sound.playable.clone(), LoopMode::Once);

        let play_time = sound.playable.duration().as_secs_f32() / pitch;
        self.countdown = (random_delay(rng, settings.min_delay, settings.max_delay) + play_time)
            .max(MIN_COUNTDOWN);
        started
    }
}
