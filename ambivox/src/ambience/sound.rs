use crate::playback::Playable;
use rand::Rng;
use std::sync::Arc;

/// A scatter sound: one playable plus how it is randomized when played.
#[derive(Debug, Clone)]
pub struct AmbienceSound {
    pub playable: Arc<dyn Playable>,
    pub gain: f32,
    pub min_pitch: f32,
    pub max_pitch: f32,
    /// Positioned relative to the listener instead of around it in world space
    pub relative: bool,
    /// Magnitude of the simulated radial velocity
    pub velocity: f32,
}

impl AmbienceSound {
    pub fn new(playable: Arc<dyn Playable>) -> Self {
        Self {
            playable,
            gain: 1.0,
            min_pitch: 1.0,
            max_pitch: 1.0,
            relative: false,
            velocity: 0.0,
        }
    }

    pub fn gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn pitch_range(mut self, min: f32, max: f32) -> Self {
        self.min_pitch = min;
        self.max_pitch = max;
        self
    }

    pub fn relative(mut self, relative: bool) -> Self {
        self.relative = relative;
        self
    }

    pub fn velocity(mut self, velocity: f32) -> Self {
        self.velocity = velocity;
        self
    }

    /// Uniform pitch in the configured range; the bound itself when min == max.
    /// A non-finite bound is ignored, and with neither finite the pitch is 1.
    pub fn random_pitch<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        match finite_range(self.min_pitch, self.max_pitch) {
            Some((lo, hi)) if lo < hi => rng.random_range(lo..=hi),
            Some((lo, _)) => lo,
            None => 1.0,
        }
    }
}

/// The looping bed of an ambience.
#[derive(Debug, Clone)]
pub struct LoopSound {
    pub playable: Arc<dyn Playable>,
    pub gain: f32,
}

impl LoopSound {
    pub fn new(playable: Arc<dyn Playable>, gain: f32) -> Self {
        Self { playable, gain }
    }
}

/// Uniform delay in seconds between `min` and `max` (order-insensitive, never negative).
/// Non-finite bounds are ignored; with neither finite the delay is zero.
pub fn random_delay<R: Rng + ?Sized>(rng: &mut R, min: f32, max: f32) -> f32 {
    let Some((lo, hi)) = finite_range(min, max) else {
        return 0.0;
    };
    let (lo, hi) = (lo.max(0.0), hi.max(0.0));
    if lo == hi {
        return lo;
    }
    rng.random_range(lo..=hi)
}

/// Orders two bounds, dropping whichever is NaN or infinite.
fn finite_range(a: f32, b: f32) -> Option<(f32, f32)> {
    match (a.is_finite(), b.is_finite()) {
        (true, true) => Some((a.min(b), a.max(b))),
        (true, false) => Some((a, a)),
        (false, true) => Some((b, b)),
        (false, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BufferId;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;
    use std::time::Duration;

    struct Silence;

    impl Playable for Silence {
        fn name(&self) -> &str {
            "silence"
        }
        fn chunk_count(&self) -> usize {
            1
        }
        fn buffer(&self, _chunk: usize) -> Option<BufferId> {
            Some(BufferId(1))
        }
        fn duration(&self) -> Duration {
            Duration::from_secs(1)
        }
        fn is_loaded(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_fixed_pitch_unchanged() {
        let mut rng = Pcg32::seed_from_u64(7);
        let sound = AmbienceSound::new(Arc::new(Silence)).pitch_range(1.3, 1.3);
        for _ in 0..10 {
            assert_eq!(sound.random_pitch(&mut rng), 1.3);
        }
    }

    #[test]
    fn test_pitch_within_range_even_if_reversed() {
        let mut rng = Pcg32::seed_from_u64(7);
        let sound = AmbienceSound::new(Arc::new(Silence)).pitch_range(1.5, 0.8);
        for _ in 0..100 {
            let pitch = sound.random_pitch(&mut rng);
            assert!((0.8..=1.5).contains(&pitch));
        }
    }

    #[test]
    fn test_random_delay_bounds() {
        let mut rng = Pcg32::seed_from_u64(11);
        for _ in 0..100 {
            let delay = random_delay(&mut rng, 2.0, 5.0);
            assert!((2.0..=5.0).contains(&delay));
        }
        assert_eq!(random_delay(&mut rng, 3.0, 3.0), 3.0);
        assert_eq!(random_delay(&mut rng, -4.0, -1.0), 0.0);
    }

    #[test]
    fn test_non_finite_bounds_never_panic() {
        let mut rng = Pcg32::seed_from_u64(3);
        let nan_low = AmbienceSound::new(Arc::new(Silence)).pitch_range(f32::NAN, 1.4);
        assert_eq!(nan_low.random_pitch(&mut rng), 1.4);
        let inf_high = AmbienceSound::new(Arc::new(Silence)).pitch_range(0.9, f32::INFINITY);
        assert_eq!(inf_high.random_pitch(&mut rng), 0.9);
        let neither = AmbienceSound::new(Arc::new(Silence)).pitch_range(f32::NAN, f32::NAN);
        assert_eq!(neither.random_pitch(&mut rng), 1.0);

        assert_eq!(random_delay(&mut rng, f32::NAN, 2.5), 2.5);
        assert_eq!(random_delay(&mut rng, f32::NEG_INFINITY, f32::NAN), 0.0);
    }
}
