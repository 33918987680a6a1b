use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration descriptor for an audio context.
///
/// Voice counts are hints: the backend may grant fewer voices than requested,
/// and the pool is sized from what was actually granted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioDesc {
    /// Requested output frequency in Hz
    pub frequency: u32,
    /// Requested number of simultaneous mono voices
    pub mono_voices: usize,
    /// Requested number of simultaneous stereo voices
    pub stereo_voices: usize,
    /// Initial master gain (clamped to 0.0..=1.0)
    pub master_volume: f32,
    /// Target gain for background music (clamped to 0.0..=1.0)
    pub music_volume: f32,
    /// Whether auxiliary effects and filters should be used when the backend offers them
    pub enable_effects: bool,
    /// Defaults for ambience sound sets
    pub ambience: AmbienceDesc,
}

impl Default for AudioDesc {
    fn default() -> Self {
        Self {
            frequency: 48000,
            mono_voices: 32,
            stereo_voices: 4,
            master_volume: 1.0,
            music_volume: 0.8,
            enable_effects: true,
            ambience: AmbienceDesc::default(),
        }
    }
}

impl AudioDesc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a descriptor from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn frequency(mut self, frequency: u32) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn mono_voices(mut self, count: usize) -> Self {
        self.mono_voices = count;
        self
    }

    pub fn stereo_voices(mut self, count: usize) -> Self {
        self.stereo_voices = count;
        self
    }

    pub fn master_volume(mut self, gain: f32) -> Self {
        self.master_volume = gain;
        self
    }

    pub fn music_volume(mut self, gain: f32) -> Self {
        self.music_volume = gain;
        self
    }

    pub fn enable_effects(mut self, enable: bool) -> Self {
        self.enable_effects = enable;
        self
    }

    pub fn ambience(mut self, ambience: AmbienceDesc) -> Self {
        self.ambience = ambience;
        self
    }

    /// Total voices requested from the backend.
    pub fn requested_voices(&self) -> usize {
        self.mono_voices + self.stereo_voices
    }
}

/// Default ambience parameters, used when a sound set leaves them out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbienceDesc {
    /// Number of scatter channels
    pub channels: usize,
    /// Radius of the sphere scatter sounds are placed in
    pub radius: f32,
    /// Minimum delay between two scatter plays, in seconds
    pub min_delay: f32,
    /// Maximum delay between two scatter plays, in seconds
    pub max_delay: f32,
    /// Give scatter sounds a simulated constant velocity
    pub random_velocity: bool,
}

impl Default for AmbienceDesc {
    fn default() -> Self {
        Self {
            channels: 4,
            radius: 20.0,
            min_delay: 2.0,
            max_delay: 10.0,
            random_velocity: false,
        }
    }
}
